/// Preview module
///
/// This module handles:
/// - Decoding and scaling snapshots and flipbook frames (processor.rs)
/// - Keeping decoded previews in memory (cache.rs)
/// - Decoding off the owning thread with cancellation (loader.rs)

pub mod cache;
pub mod loader;
pub mod processor;
