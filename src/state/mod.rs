/// State management module
///
/// This module handles all catalog state, including:
/// - The JSON record store and browsing (library.rs)
/// - Shared data structures (data.rs)
/// - Import and export of entries (transfer.rs)

pub mod data;
pub mod library;
pub mod transfer;
