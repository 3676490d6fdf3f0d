//! File-backed verdict cache with a time-to-live.
//!
//! Keyed by a content hash of the lowercased address. Writes go through an
//! in-process async mutex and land via temp-file + atomic rename, so
//! concurrent verifications in one process cannot lose each other's
//! entries. Entries are only ever evicted by being overwritten; a stale
//! entry is treated as absent, not served.

use crate::core::error::Result;
use crate::core::models::FinalVerdict;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    timestamp: i64,
    result: FinalVerdict,
}

/// The persisted key→verdict map.
pub struct VerdictCache {
    path: PathBuf,
    ttl: Duration,
    /// Lazily hydrated in-memory view of the file.
    index: RwLock<Option<HashMap<String, CacheEntry>>>,
    /// Serializes the read-modify-write cycle on the backing file.
    io_lock: Mutex<()>,
}

/// Stable cache key for an address.
fn cache_key(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

impl VerdictCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            index: RwLock::new(None),
            io_lock: Mutex::new(()),
        }
    }

    /// Returns the cached verdict for `email` if a fresh entry exists.
    /// An entry older than the TTL is a miss.
    pub async fn lookup(&self, email: &str) -> Option<FinalVerdict> {
        self.hydrate().await;
        let key = cache_key(email);
        let now = chrono::Utc::now().timestamp();

        let guard = self.index.read();
        let entry = guard.as_ref()?.get(&key)?;
        let age = now.saturating_sub(entry.timestamp);
        if age < self.ttl.as_secs() as i64 {
            tracing::debug!(target: "pipeline_task",
                "Cache hit for <{}> (age: {}s)", email, age);
            Some(entry.result.clone())
        } else {
            tracing::debug!(target: "pipeline_task",
                "Cache entry for <{}> expired (age: {}s >= ttl {}s)",
                email, age, self.ttl.as_secs());
            None
        }
    }

    /// Stores `verdict` for `email`, overwriting any previous entry.
    pub async fn store(&self, email: &str, verdict: &FinalVerdict) -> Result<()> {
        self.store_at(email, verdict, chrono::Utc::now().timestamp())
            .await
    }

    async fn store_at(&self, email: &str, verdict: &FinalVerdict, timestamp: i64) -> Result<()> {
        let _io = self.io_lock.lock().await;
        self.hydrate().await;

        let snapshot = {
            let mut guard = self.index.write();
            let map = guard.get_or_insert_with(HashMap::new);
            map.insert(
                cache_key(email),
                CacheEntry {
                    timestamp,
                    result: verdict.clone(),
                },
            );
            map.clone()
        };

        let serialized = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp_path, &serialized).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(target: "pipeline_task",
            "Cached verdict for <{}> in {}", email, self.path.display());
        Ok(())
    }

    /// Loads the backing file into the in-memory index on first use.
    /// A missing or unreadable file hydrates to an empty map.
    async fn hydrate(&self) {
        if self.index.read().is_some() {
            return;
        }
        let loaded = read_cache_file(&self.path).await;
        let mut guard = self.index.write();
        if guard.is_none() {
            *guard = Some(loaded);
        }
    }
}

async fn read_cache_file(path: &Path) -> HashMap<String, CacheEntry> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("Cache file {} is unreadable, starting empty: {}", path.display(), e);
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}
