/// Library session
///
/// One `LibrarySession` per open library. It owns the artifact store, the
/// index, the preview cache and the background loader, and it is the only
/// way to mutate them. Everything runs on the thread that owns the session;
/// only preview decoding happens elsewhere, and its results are applied when
/// the owner polls.

use crate::config::LibraryConfig;
use crate::coordinator::create::{self, CreateOutcome, CreateRequest};
use crate::coordinator::delete::{self, DeleteOutcome};
use crate::coordinator::previews;
use crate::coordinator::rename::{RenameCoordinator, RenameOutcome};
use crate::coordinator::LibraryContext;
use crate::error::{Result, SnipError};
use crate::preview::cache::{PreviewCache, PreviewEntry};
use crate::preview::loader::{AsyncPreviewLoader, ConsumerId, PreviewHandle, PreviewReady, PreviewRequest};
use crate::state::data::{ArtifactKind, SnipRecord};
use crate::state::library::Library;
use crate::state::name::NameField;
use crate::store::artifacts::ArtifactStore;
use crate::store::collaborators::SceneLoader;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Told about every identifier a mutation touched
pub trait MutationObserver {
    fn on_mutated(&mut self, identifier: &str);
}

/// Answer to a preview request
#[derive(Debug)]
pub enum PreviewStatus {
    /// Served from the cache
    Ready(Arc<PreviewEntry>),
    /// Decoding in the background; collect it with `poll_previews` or `wait_for_preview`
    Pending(PreviewHandle),
}

pub struct LibrarySession {
    config: LibraryConfig,
    store: ArtifactStore,
    library: Library,
    cache: PreviewCache,
    loader: AsyncPreviewLoader,
}

impl LibrarySession {
    pub fn open(config: LibraryConfig) -> Result<Self> {
        let store = ArtifactStore::new(config.user_root(), &config.extension);
        store
            .ensure_layout()
            .map_err(SnipError::io(ArtifactKind::Index, &config.user))?;

        let library = Library::load(&store.index_path());
        let cache = PreviewCache::new(config.preview.flush_interval());
        let loader = AsyncPreviewLoader::new(config.preview.workers, config.preview.max_size())?;

        info!(
            user = %config.user,
            root = %store.user_root().display(),
            snips = library.len(),
            "📚 library opened"
        );

        Ok(Self {
            config,
            store,
            library,
            cache,
            loader,
        })
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    /// Set when the index could not be read and the session started empty
    pub fn load_warning(&self) -> Option<&SnipError> {
        self.library.load_warning()
    }

    pub fn records(&self) -> &[SnipRecord] {
        self.library.records()
    }

    pub fn find(&self, identifier: &str) -> Option<&SnipRecord> {
        self.library.find(identifier)
    }

    pub fn search(&self, query: &str) -> Vec<&SnipRecord> {
        self.library.search(query)
    }

    pub fn group_by(&self, field: NameField) -> BTreeMap<String, Vec<&SnipRecord>> {
        self.library.group_by(field)
    }

    pub fn sources(&self) -> BTreeSet<String> {
        self.library.sources()
    }

    /// Records whose snip file is missing
    pub fn verify(&self) -> Vec<&SnipRecord> {
        self.library.verify(&self.store)
    }

    fn context(&mut self) -> LibraryContext<'_> {
        LibraryContext::new(&self.store, &mut self.library, &self.config.preview, &self.config.user)
            .with_observer(&mut self.cache)
            .with_observer(&mut self.loader)
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<RenameOutcome> {
        RenameCoordinator::new(&mut self.context()).rename(old, new)
    }

    pub fn rename_field(&mut self, identifier: &str, field: NameField, value: &str) -> Result<RenameOutcome> {
        RenameCoordinator::new(&mut self.context()).rename_field(identifier, field, value)
    }

    pub fn delete(&mut self, identifier: &str) -> Result<DeleteOutcome> {
        delete::delete(&mut self.context(), identifier)
    }

    pub fn create(&mut self, request: CreateRequest<'_>) -> Result<CreateOutcome> {
        create::create(&mut self.context(), request)
    }

    pub fn describe(&mut self, identifier: &str, summary: &str) -> Result<SnipRecord> {
        previews::describe(&mut self.context(), identifier, summary)
    }

    pub fn set_flipbook(&mut self, identifier: &str, frames: &[PathBuf]) -> Result<SnipRecord> {
        previews::set_flipbook(&mut self.context(), identifier, frames)
    }

    pub fn clear_flipbook(&mut self, identifier: &str) -> Result<SnipRecord> {
        previews::clear_flipbook(&mut self.context(), identifier)
    }

    pub fn set_snapshot(&mut self, identifier: &str, source: &Path) -> Result<SnipRecord> {
        previews::set_snapshot(&mut self.context(), identifier, source)
    }

    pub fn clear_snapshot(&mut self, identifier: &str) -> Result<SnipRecord> {
        previews::clear_snapshot(&mut self.context(), identifier)
    }

    /// Bring a snip into the host graph under `target_context`
    pub fn load_snip(&self, identifier: &str, loader: &dyn SceneLoader, target_context: &str) -> Result<()> {
        let path = self.store.snip_path(identifier);
        if !path.is_file() {
            return Err(SnipError::SnipNotFound(identifier.to_string()));
        }

        loader
            .load(&path, target_context)
            .map_err(|reason| SnipError::Collaborator {
                operation: "load",
                identifier: identifier.to_string(),
                reason,
            })?;
        info!(identifier, target_context, "📥 snip loaded");
        Ok(())
    }

    /// Files to decode for a snip's previews. Missing files are left out.
    pub fn preview_request(&self, identifier: &str) -> Result<PreviewRequest> {
        let record = self
            .library
            .find(identifier)
            .ok_or_else(|| SnipError::SnipNotFound(identifier.to_string()))?;

        let snapshot = record
            .snapshot
            .as_deref()
            .map(|reference| self.store.resolve_reference(reference))
            .filter(|path| path.is_file());

        let frames = if record.flipbook.is_some() {
            self.store.frames(identifier).unwrap_or_else(|err| {
                warn!(identifier, error = %err, "flipbook unreadable, previewing without it");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(PreviewRequest {
            record: record.clone(),
            snapshot,
            frames,
        })
    }

    /// Ask for a snip's previews on behalf of `consumer`.
    ///
    /// Whatever the consumer asked for before is cancelled either way.
    pub fn request_preview(&mut self, consumer: ConsumerId, identifier: &str) -> Result<PreviewStatus> {
        if let Some(entry) = self.cache.get(identifier) {
            self.loader.cancel(consumer);
            return Ok(PreviewStatus::Ready(entry));
        }

        let request = self.preview_request(identifier)?;
        Ok(PreviewStatus::Pending(self.loader.request(consumer, request)))
    }

    /// Apply finished background loads to the cache
    pub fn poll_previews(&mut self) -> Vec<PreviewReady> {
        self.loader.poll(&mut self.cache)
    }

    /// Block until one background load is applied, or `timeout` passes
    pub fn wait_for_preview(&mut self, timeout: Duration) -> Option<PreviewReady> {
        self.loader.wait(&mut self.cache, timeout)
    }

    /// Previews decoded on the calling thread, through the cache
    pub fn preview_blocking(&mut self, identifier: &str) -> Result<Arc<PreviewEntry>> {
        if let Some(entry) = self.cache.get(identifier) {
            return Ok(entry);
        }

        let request = self.preview_request(identifier)?;
        let max = self.config.preview.max_size();
        Ok(self.cache.get_or_load(identifier, move || request.decode(max)))
    }

    /// Drop the whole preview cache when the flush interval has passed
    pub fn flush_if_due(&mut self, now: Instant) -> bool {
        self.cache.flush_if_due(now)
    }

    pub fn clear_previews(&mut self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for LibrarySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibrarySession")
            .field("user", &self.config.user)
            .field("library", &self.library)
            .field("cached_previews", &self.cache.len())
            .finish()
    }
}
