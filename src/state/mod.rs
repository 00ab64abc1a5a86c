/// State management module
///
/// This module handles everything the library knows about its snips:
/// - Canonical identifiers and their fields (name.rs)
/// - Shared data structures (data.rs)
/// - The master index of snip records (library.rs)
/// - Summary and keyword edits (edit.rs)

pub mod data;
pub mod edit;
pub mod library;
pub mod name;
