//! Error types for the snip library.
//!
//! Every coordinator failure names the identifier and the artifact kind that
//! failed, plus what had already been moved or removed when it did.

use crate::state::data::ArtifactKind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnipError>;

/// What happened to the filesystem moves when a rename had to be undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Nothing had been moved, so there was nothing to undo
    NotNeeded,
    /// Every moved artifact is back under the old identifier
    Restored,
    /// These kinds are still stranded under the new identifier
    Incomplete(Vec<ArtifactKind>),
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackOutcome::NotNeeded => f.write_str("nothing to roll back"),
            RollbackOutcome::Restored => f.write_str("rolled back"),
            RollbackOutcome::Incomplete(stranded) => {
                write!(f, "rollback incomplete, still under new name: {}", kinds(stranded))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SnipError {
    #[error("invalid identifier '{identifier}': expected Context_Type_Name_Source_vNN, {reason}")]
    InvalidFormat { identifier: String, reason: String },

    #[error("invalid {field} '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("'{0}' already exists in the library")]
    NameCollision(String),

    #[error("snip '{0}' not found")]
    SnipNotFound(String),

    #[error("{kind} of '{identifier}' failed: {source}")]
    IoFailure {
        kind: ArtifactKind,
        identifier: String,
        #[source]
        source: std::io::Error,
    },

    #[error("index {path} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error(
        "rename '{from}' -> '{to}' failed at {failed}; moved: {}; not moved: {}; {rollback}",
        kinds(.moved),
        kinds(.unmoved)
    )]
    RenameFailed {
        from: String,
        to: String,
        failed: ArtifactKind,
        moved: Vec<ArtifactKind>,
        /// Previews whose move failed; they are still under the old identifier
        unmoved: Vec<ArtifactKind>,
        rollback: RollbackOutcome,
        #[source]
        source: Box<SnipError>,
    },

    #[error("delete of '{identifier}' failed at {failed}; removed: {}", kinds(.removed))]
    DeleteFailed {
        identifier: String,
        failed: ArtifactKind,
        removed: Vec<ArtifactKind>,
        #[source]
        source: Box<SnipError>,
    },

    #[error("create of '{identifier}' failed at {failed}; cleaned up: {}", kinds(.cleaned))]
    CreateFailed {
        identifier: String,
        failed: ArtifactKind,
        cleaned: Vec<ArtifactKind>,
        #[source]
        source: Box<SnipError>,
    },

    #[error("scene {operation} failed for '{identifier}': {reason}")]
    Collaborator {
        operation: &'static str,
        identifier: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("preview workers unavailable: {0}")]
    Runtime(String),
}

impl SnipError {
    /// Artifact kind a failure is attributed to, when there is one
    pub fn artifact_kind(&self) -> Option<ArtifactKind> {
        match self {
            SnipError::IoFailure { kind, .. } => Some(*kind),
            SnipError::IndexCorrupt { .. } => Some(ArtifactKind::Index),
            SnipError::RenameFailed { failed, .. }
            | SnipError::DeleteFailed { failed, .. }
            | SnipError::CreateFailed { failed, .. } => Some(*failed),
            SnipError::Collaborator { .. } => Some(ArtifactKind::Snip),
            _ => None,
        }
    }

    /// Build an `IoFailure` mapper for `map_err`
    pub(crate) fn io(kind: ArtifactKind, identifier: &str) -> impl FnOnce(std::io::Error) -> SnipError {
        let identifier = identifier.to_string();
        move |source| SnipError::IoFailure {
            kind,
            identifier,
            source,
        }
    }
}

impl From<config::ConfigError> for SnipError {
    fn from(err: config::ConfigError) -> Self {
        SnipError::Config(err.to_string())
    }
}

fn kinds(list: &[ArtifactKind]) -> String {
    if list.is_empty() {
        return "none".to_string();
    }
    list.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
