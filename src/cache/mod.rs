use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, ScraperError};
use crate::models::ItemDetail;

/// Cache-aside store for fetched item details, keyed by
/// `(namespace, listing id)` so marketplace variants never collide.
///
/// Read and write failures degrade to a miss/no-op instead of propagating:
/// a broken cache must never break enrichment. Only the administrative
/// `clear` surfaces errors.
#[async_trait]
pub trait DetailCache: Send + Sync {
    async fn get(&self, namespace: &str, id: &str) -> Option<ItemDetail>;
    async fn set(&self, namespace: &str, id: &str, detail: &ItemDetail);
    async fn clear(&self, namespace: &str) -> Result<()>;
}

/// In-process cache; the default for tests and single-run usage.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(String, String), ItemDetail>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DetailCache for MemoryCache {
    async fn get(&self, namespace: &str, id: &str) -> Option<ItemDetail> {
        let entries = self.entries.read().await;
        entries
            .get(&(namespace.to_string(), id.to_string()))
            .cloned()
    }

    async fn set(&self, namespace: &str, id: &str, detail: &ItemDetail) {
        let mut entries = self.entries.write().await;
        entries.insert((namespace.to_string(), id.to_string()), detail.clone());
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CachedDetail {
    fetched_at: DateTime<Utc>,
    detail: ItemDetail,
}

/// One JSON file per entry under `<directory>/<namespace>/<id>.json`.
///
/// Entries carry no TTL; they persist until `clear` removes the namespace.
/// The `fetched_at` stamp is recorded so an expiry policy can be layered on
/// later without a format change.
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn entry_path(&self, namespace: &str, id: &str) -> Option<PathBuf> {
        // ids come from URLs; anything that could escape the namespace
        // directory is treated as uncacheable
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            warn!("Refusing to cache suspicious id '{}'", id);
            return None;
        }
        Some(self.directory.join(namespace).join(format!("{}.json", id)))
    }
}

#[async_trait]
impl DetailCache for FileCache {
    async fn get(&self, namespace: &str, id: &str) -> Option<ItemDetail> {
        let path = self.entry_path(namespace, id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache read failed for {:?}, treating as miss: {}", path, e);
                return None;
            }
        };
        match serde_json::from_str::<CachedDetail>(&content) {
            Ok(entry) => {
                debug!("Cache hit for {}/{}", namespace, id);
                Some(entry.detail)
            }
            Err(e) => {
                warn!("Corrupt cache entry {:?}, treating as miss: {}", path, e);
                None
            }
        }
    }

    async fn set(&self, namespace: &str, id: &str, detail: &ItemDetail) {
        let Some(path) = self.entry_path(namespace, id) else {
            return;
        };
        let entry = CachedDetail {
            fetched_at: Utc::now(),
            detail: detail.clone(),
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            fs::write(&path, json)
        };
        if let Err(e) = write() {
            warn!("Cache write failed for {:?}, skipping: {}", path, e);
        }
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        let dir = self.directory.join(namespace);
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| ScraperError::Cache(format!("Failed to clear {:?}: {}", dir, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_detail() -> ItemDetail {
        ItemDetail {
            description: "mint condition".to_string(),
            seller_review_count: 12,
            seller_rating: 4.5,
            ..ItemDetail::default()
        }
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip_and_namespacing() {
        let cache = MemoryCache::new();
        cache.set("mercari", "m123", &sample_detail()).await;

        assert_eq!(
            cache.get("mercari", "m123").await.unwrap().description,
            "mint condition"
        );
        // same id, different namespace: miss
        assert!(cache.get("mercari_jp", "m123").await.is_none());

        cache.clear("mercari").await.unwrap();
        assert!(cache.get("mercari", "m123").await.is_none());
    }

    #[tokio::test]
    async fn test_file_cache_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());

        assert!(cache.get("mercari_jp", "m999").await.is_none());
        cache.set("mercari_jp", "m999", &sample_detail()).await;

        let loaded = cache.get("mercari_jp", "m999").await.unwrap();
        assert_eq!(loaded, sample_detail());
        assert!(dir.path().join("mercari_jp").join("m999.json").exists());
    }

    #[tokio::test]
    async fn test_file_cache_clear_is_namespaced() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());
        cache.set("mercari", "m1", &sample_detail()).await;
        cache.set("mercari_jp", "m1", &sample_detail()).await;

        cache.clear("mercari").await.unwrap();
        assert!(cache.get("mercari", "m1").await.is_none());
        assert!(cache.get("mercari_jp", "m1").await.is_some());

        // clearing an empty namespace is fine
        cache.clear("mercari").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_degrades_on_corrupt_entry() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());

        let ns_dir = dir.path().join("mercari");
        fs::create_dir_all(&ns_dir).unwrap();
        fs::write(ns_dir.join("m5.json"), "{ not json").unwrap();

        // corrupt entry reads as a miss, not an error
        assert!(cache.get("mercari", "m5").await.is_none());
    }

    #[tokio::test]
    async fn test_file_cache_rejects_path_escaping_ids() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());

        cache.set("mercari", "../evil", &sample_detail()).await;
        assert!(cache.get("mercari", "../evil").await.is_none());
        assert!(!dir.path().join("evil.json").exists());
    }
}
