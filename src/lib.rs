//! Per-user library of reusable node snips.
//!
//! A snip is a saved graph fragment plus an optional flipbook, an optional
//! snapshot and a record in the user's master index, all keyed by one
//! canonical identifier. [`session::LibrarySession`] is the entry point.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod preview;
pub mod session;
pub mod state;
pub mod store;

pub use config::LibraryConfig;
pub use error::{Result, SnipError};
pub use session::{LibrarySession, MutationObserver, PreviewStatus};
pub use state::data::{ArtifactKind, SnipRecord};
pub use state::name::{NameField, SnipName};
