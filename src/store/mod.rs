/// Storage module
///
/// This module handles what lives outside the index:
/// - Snip files, flipbooks and snapshots on disk (artifacts.rs)
/// - Contracts for the host application's save, load and capture (collaborators.rs)

pub mod artifacts;
pub mod collaborators;
