//! Named cache namespaces holding request URL to response entries.
//!
//! Entries keep insertion order, which is the eviction order: storing a key
//! again moves it to the newest position. A `Cache` is a cheap handle onto
//! one namespace, so the same namespace can be read and written from several
//! tasks at once.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::network::Response;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, response: Response) -> Self {
        Self {
            key: key.into(),
            response,
            stored_at: Utc::now(),
        }
    }

    /// Coarse age for listings, truncated to the largest whole unit.
    pub fn age_display(&self) -> String {
        let age = Utc::now().signed_duration_since(self.stored_at);
        if age.num_days() > 0 {
            format!("{}d ago", age.num_days())
        } else if age.num_hours() > 0 {
            format!("{}h ago", age.num_hours())
        } else if age.num_minutes() > 0 {
            format!("{}m ago", age.num_minutes())
        } else {
            // Includes entries stamped in the future
            "just now".to_string()
        }
    }
}

/// Handle to a single namespace.
#[derive(Debug, Clone)]
pub struct Cache {
    name: Arc<str>,
    entries: Arc<RwLock<Vec<CacheEntry>>>,
}

impl Cache {
    fn new(name: &str, entries: Vec<CacheEntry>) -> Self {
        Self {
            name: Arc::from(name),
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A copy of the stored response for `key`.
    pub async fn match_url(&self, key: &str) -> Option<Response> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.response.clone())
    }

    /// Store `response` under `key`, replacing and re-ordering any
    /// existing entry.
    pub async fn put(&self, key: &str, response: Response) {
        let mut entries = self.entries.write().await;
        entries.retain(|entry| entry.key != key);
        entries.push(CacheEntry::new(key, response));
        debug!(cache = %self.name, key, entries = entries.len(), "Stored cache entry");
    }

    pub async fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.key != key);
        entries.len() != before
    }

    /// Keys oldest first.
    pub async fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries.iter().map(|entry| entry.key.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.entries.read().await.clone()
    }
}

/// Summary of one namespace for status display.
#[derive(Debug, Clone)]
pub struct NamespaceStatus {
    pub name: String,
    pub entries: usize,
    pub newest: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    namespaces: Vec<NamespaceSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NamespaceSnapshot {
    name: String,
    entries: Vec<CacheEntry>,
}

/// Registry of namespaces, in creation order.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: RwLock<Vec<Cache>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a namespace, creating it if needed.
    pub async fn open(&self, name: &str) -> Cache {
        if let Some(cache) = self.find(name).await {
            return cache;
        }

        let mut caches = self.caches.write().await;
        // Another task may have created it while we waited for the lock
        if let Some(cache) = caches.iter().find(|cache| cache.name() == name) {
            return cache.clone();
        }
        let cache = Cache::new(name, Vec::new());
        caches.push(cache.clone());
        debug!(cache = name, "Created cache namespace");
        cache
    }

    async fn find(&self, name: &str) -> Option<Cache> {
        let caches = self.caches.read().await;
        caches.iter().find(|cache| cache.name() == name).cloned()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.find(name).await.is_some()
    }

    pub async fn delete(&self, name: &str) -> bool {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|cache| cache.name() != name);
        caches.len() != before
    }

    pub async fn keys(&self) -> Vec<String> {
        let caches = self.caches.read().await;
        caches.iter().map(|cache| cache.name().to_string()).collect()
    }

    /// Look `key` up in every namespace, oldest namespace first.
    pub async fn match_any(&self, key: &str) -> Option<Response> {
        let caches: Vec<Cache> = self.caches.read().await.clone();
        for cache in caches {
            if let Some(response) = cache.match_url(key).await {
                return Some(response);
            }
        }
        None
    }

    pub async fn status(&self) -> Vec<NamespaceStatus> {
        let caches: Vec<Cache> = self.caches.read().await.clone();
        let mut status = Vec::with_capacity(caches.len());
        for cache in caches {
            let entries = cache.entries().await;
            status.push(NamespaceStatus {
                name: cache.name().to_string(),
                entries: entries.len(),
                newest: entries.last().map(CacheEntry::age_display),
            });
        }
        status
    }

    // ===== Snapshot =====

    /// Load a snapshot written by [`CacheStorage::save`]. A missing file
    /// is an empty storage.
    pub async fn load(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to check cache snapshot: {}", path.display()))?;
        if !exists {
            debug!(path = %path.display(), "No cache snapshot, starting empty");
            return Ok(Self::new());
        }

        let contents = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read cache snapshot: {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to parse cache snapshot: {}", path.display()))?;

        let caches = snapshot
            .namespaces
            .into_iter()
            .map(|namespace| Cache::new(&namespace.name, namespace.entries))
            .collect::<Vec<_>>();
        info!(namespaces = caches.len(), saved_at = %snapshot.saved_at, "Loaded cache snapshot");

        Ok(Self {
            caches: RwLock::new(caches),
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let caches: Vec<Cache> = self.caches.read().await.clone();
        let mut namespaces = Vec::with_capacity(caches.len());
        for cache in caches {
            namespaces.push(NamespaceSnapshot {
                name: cache.name().to_string(),
                entries: cache.entries().await,
            });
        }

        let snapshot = Snapshot {
            saved_at: Utc::now(),
            namespaces,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_vec(&snapshot)?;
        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write cache snapshot: {}", path.display()))?;
        debug!(path = %path.display(), "Saved cache snapshot");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
