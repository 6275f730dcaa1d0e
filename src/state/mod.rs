/// State management module
///
/// This module handles everything that outlives a single view, including:
/// - The local catalog database and its queries (library.rs)
/// - The data-source contract the view talks to (source.rs)
/// - Shared data structures (data.rs)
/// - Error types (error.rs)
/// - The persistent key-value store (store.rs)
/// - Best-effort caches built on that store (cache.rs)

pub mod cache;
pub mod data;
pub mod error;
pub mod library;
pub mod source;
pub mod store;
