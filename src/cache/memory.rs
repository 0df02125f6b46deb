use ahash::AHashMap;
use async_trait::async_trait;
use std::sync::Mutex;

use super::{CacheEntry, CacheError, CacheLayer};

/// In-memory cache layer. Entries live until the process exits or they are overwritten.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<AHashMap<String, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get(&self, key: &str, timestamp: i64) -> Result<CacheEntry, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.is_fresh(timestamp) => Ok(entry.clone()),
            _ => Err(CacheError::Miss),
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}
