//! Offline cache for application assets and quiz data.
//!
//! This module provides the `CacheManager`, which serves application
//! requests from named cache namespaces held in a `CacheStorage`:
//!
//! - a versioned namespace of precached static assets
//! - a data namespace for quiz JSON files (stale-while-revalidate)
//! - a font namespace (cache first)
//!
//! The data and font namespaces are trimmed to a fixed number of entries,
//! oldest first.

pub mod error;
pub mod manager;
pub mod storage;

pub use error::CacheError;
pub use manager::{trim_cache, CacheManager, Intercepted, ResponseSource, Strategy};
pub use storage::{Cache, CacheEntry, CacheStorage, NamespaceStatus};
