/// Coordinated library mutations
///
/// Every change that touches more than one artifact goes through here:
/// - create.rs: save a new snip with optional previews
/// - rename.rs: move all artifacts and the record to a new identifier
/// - delete.rs: remove all artifacts and the record
/// - previews.rs: description and preview edits on an existing snip
///
/// Filesystem changes come first, the index save last. Observers hear about
/// every identifier a mutation touched, whether it succeeded or not.

pub mod create;
pub mod delete;
pub mod previews;
pub mod rename;

use crate::config::PreviewConfig;
use crate::error::{Result, SnipError};
use crate::session::MutationObserver;
use crate::state::library::Library;
use crate::store::artifacts::ArtifactStore;

/// Everything a coordinator works on, borrowed from the session for one operation
pub struct LibraryContext<'a> {
    pub store: &'a ArtifactStore,
    pub library: &'a mut Library,
    pub preview: &'a PreviewConfig,
    /// Owner written into new records
    pub user: &'a str,
    observers: Vec<&'a mut dyn MutationObserver>,
}

impl<'a> LibraryContext<'a> {
    pub fn new(
        store: &'a ArtifactStore,
        library: &'a mut Library,
        preview: &'a PreviewConfig,
        user: &'a str,
    ) -> Self {
        Self {
            store,
            library,
            preview,
            user,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: &'a mut dyn MutationObserver) -> Self {
        self.observers.push(observer);
        self
    }

    pub(crate) fn notify(&mut self, identifier: &str) {
        for observer in self.observers.iter_mut() {
            observer.on_mutated(identifier);
        }
    }
}

/// Identifiers become file names, so anything that could escape the user root is refused
pub(crate) fn check_path_safe(identifier: &str) -> Result<()> {
    let unsafe_name = identifier.trim().is_empty()
        || identifier.contains(['/', '\\'])
        || identifier == "."
        || identifier == "..";

    if unsafe_name {
        return Err(SnipError::InvalidFormat {
            identifier: identifier.to_string(),
            reason: "not usable as a file name".to_string(),
        });
    }
    Ok(())
}
