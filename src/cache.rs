//! On-disk memo cache for idempotent fetch results.
//!
//! Keys are md5 digests of the fetch identifier; values are JSON blobs under
//! the cache directory with a memory tier in front. Content for a given key
//! is assumed stable, so concurrent writes are last-write-wins. Cache IO
//! failures degrade to warnings and a live fetch, never a hard error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::fetch::{ChannelFetcher, DocumentFetcher, FetchError};

pub struct FetchCache {
    dir: PathBuf,
    memory: Mutex<HashMap<String, Value>>,
}

impl FetchCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cache_key(identifier: &str) -> String {
        format!("{:x}", md5::compute(identifier))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn get(&self, identifier: &str) -> Option<Value> {
        let key = Self::cache_key(identifier);

        if let Some(value) = self
            .memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Some(value.clone());
        }

        let content = std::fs::read_to_string(self.entry_path(&key)).ok()?;
        let entry: Value = serde_json::from_str(&content).ok()?;
        let result = entry.get("result")?.clone();

        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, result.clone());
        Some(result)
    }

    pub fn put(&self, identifier: &str, value: &Value) {
        let key = Self::cache_key(identifier);
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), value.clone());

        let entry = json!({ "cache_key": key, "result": value });
        if let Err(err) = self.write_entry(&key, &entry) {
            tracing::warn!(key = %key, error = %err, "cache write failed");
        }
    }

    fn write_entry(&self, key: &str, entry: &Value) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache directory '{}'", self.dir.display()))?;
        let path = self.entry_path(key);
        let payload = serde_json::to_string_pretty(entry).context("failed to serialize cache entry")?;
        std::fs::write(&path, payload)
            .with_context(|| format!("failed to write cache entry '{}'", path.display()))
    }

    pub fn clear(&self) -> Result<()> {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).with_context(|| {
                format!("failed to remove cache directory '{}'", self.dir.display())
            })?;
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to recreate cache directory '{}'", self.dir.display()))
    }
}

/// Memoizing wrapper around a [`DocumentFetcher`].
pub struct CachedDocumentFetcher {
    inner: Arc<dyn DocumentFetcher>,
    cache: Arc<FetchCache>,
}

impl CachedDocumentFetcher {
    pub fn new(inner: Arc<dyn DocumentFetcher>, cache: Arc<FetchCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl DocumentFetcher for CachedDocumentFetcher {
    async fn fetch_document(&self, url: &str) -> Result<String, FetchError> {
        if let Some(cached) = self.cache.get(url)
            && let Some(text) = cached.as_str()
        {
            tracing::debug!(url = %url, "document cache hit");
            return Ok(text.to_string());
        }

        let content = self.inner.fetch_document(url).await?;
        self.cache.put(url, &Value::String(content.clone()));
        Ok(content)
    }
}

/// Memoizing wrapper around a [`ChannelFetcher`].
pub struct CachedChannelFetcher {
    inner: Arc<dyn ChannelFetcher>,
    cache: Arc<FetchCache>,
}

impl CachedChannelFetcher {
    pub fn new(inner: Arc<dyn ChannelFetcher>, cache: Arc<FetchCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl ChannelFetcher for CachedChannelFetcher {
    async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<String, FetchError> {
        let identifier = format!("slack:{channel_id}:{limit}");
        if let Some(cached) = self.cache.get(&identifier)
            && let Some(text) = cached.as_str()
        {
            tracing::debug!(channel = %channel_id, "channel cache hit");
            return Ok(text.to_string());
        }

        let content = self.inner.fetch_channel_messages(channel_id, limit).await?;
        self.cache.put(&identifier, &Value::String(content.clone()));
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = FetchCache::new(dir.path().join("cache"));

        cache.put("https://example.com/doc", &json!("document body"));

        // A fresh instance must hit the file tier.
        let reopened = FetchCache::new(dir.path().join("cache"));
        let value = reopened.get("https://example.com/doc").expect("cached value");
        assert_eq!(value, json!("document body"));
    }

    #[test]
    fn get_misses_on_unknown_key() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = FetchCache::new(dir.path().join("cache"));
        assert!(cache.get("never stored").is_none());
    }

    #[test]
    fn clear_removes_entries() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = FetchCache::new(dir.path().join("cache"));

        cache.put("key", &json!("value"));
        cache.clear().expect("clear should succeed");
        assert!(cache.get("key").is_none());
        assert!(cache.dir().exists());
    }
}
