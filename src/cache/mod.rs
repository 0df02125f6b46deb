//! Layered key/value cache used to memoize expensive idempotent calls such as logins.
//!
//! A [`Cache`] handle wraps a [`CacheChain`] of layers ordered from fastest to slowest:
//! an in-memory [`MemoryCache`] and, when it can be opened, a persistent [`DatabaseCache`].
//! Lookups stop at the first layer holding a fresh entry and copy it into the faster layers in
//! front of it; writes go to every layer.
//!
//! ```no_run
//! use gallery_downloader::cache::{Cache, CacheKey};
//!
//! async fn login(cache: &Cache, username: &str) -> Result<Vec<String>, std::io::Error> {
//!     let key = CacheKey::new("example.login").with_arg(username);
//!     cache
//!         .memoize(&key, 24 * 60 * 60, || async {
//!             // expensive call here
//!             Ok(vec![String::from("session=abc")])
//!         })
//!         .await
//! }
//! ```
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::env;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;

mod database;
mod memory;

pub use database::DatabaseCache;
pub use memory::MemoryCache;

/// File name of the persistent cache inside the temp directory.
pub const DEFAULT_CACHE_FILE: &str = ".gallery-dl.cache";

#[derive(Error, Debug)]
pub enum CacheError {
    /// The entry is either expired or does not exist.
    #[error("Cache entry is expired or does not exist")]
    Miss,

    #[error("Cache database error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },

    #[error("Failed to encode or decode cached value: {source}")]
    Encoding {
        #[from]
        source: bincode::Error,
    },

    #[error("Failed to prepare cache location: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },
}

/// A cached value together with its absolute expiry, in epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub expires: i64,
}

impl CacheEntry {
    /// An entry is fresh strictly before its expiry; at `timestamp == expires` it is stale.
    #[inline]
    #[must_use]
    pub const fn is_fresh(&self, timestamp: i64) -> bool {
        timestamp < self.expires
    }
}

/// One level of the cache.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Returns the entry for `key` if it is still fresh at `timestamp`, or [`CacheError::Miss`].
    ///
    /// Expired entries are reported as misses but left in place.
    async fn get(&self, key: &str, timestamp: i64) -> Result<CacheEntry, CacheError>;

    /// Store `entry` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Close the current write scope. Persistent layers flush pending writes here.
    async fn commit(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Ordered composition of cache layers, fastest first.
pub struct CacheChain {
    layers: Vec<Arc<dyn CacheLayer>>,
}

impl CacheChain {
    #[must_use]
    pub fn new(layers: Vec<Arc<dyn CacheLayer>>) -> Self {
        Self { layers }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[async_trait]
impl CacheLayer for CacheChain {
    async fn get(&self, key: &str, timestamp: i64) -> Result<CacheEntry, CacheError> {
        for (depth, layer) in self.layers.iter().enumerate() {
            let entry = match layer.get(key, timestamp).await {
                Ok(entry) => entry,
                Err(CacheError::Miss) => continue,
                Err(error) => {
                    warn!("Cache layer {} failed reading '{}': {}", depth, key, error);
                    continue;
                }
            };

            // Promote into every faster layer, keeping the expiry we found.
            for faster in self.layers[..depth].iter().rev() {
                if let Err(error) = faster.set(key, entry.clone()).await {
                    warn!("Failed to promote cache entry '{}': {}", key, error);
                }
            }
            return Ok(entry);
        }
        Err(CacheError::Miss)
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        for layer in &self.layers {
            if let Err(error) = layer.set(key, entry.clone()).await {
                warn!("Failed to write cache entry '{}': {}", key, error);
            }
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), CacheError> {
        for layer in &self.layers {
            if let Err(error) = layer.commit().await {
                warn!("Failed to commit cache layer: {}", error);
            }
        }
        Ok(())
    }
}

/// Key of a memoized call: the identity of the function plus, optionally, one of its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn new(identity: &str) -> Self {
        Self(identity.to_string())
    }

    /// Memoize per value of `arg` (e.g. one entry per username).
    #[must_use]
    pub fn with_arg<D: Display>(self, arg: D) -> Self {
        Self(format!("{}-{}", self.0, arg))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared handle to the cache chain. Cheap to clone.
#[derive(Clone)]
pub struct Cache {
    chain: Arc<dyn CacheLayer>,
    persistent: bool,
}

impl Cache {
    /// A cache that only lives as long as the process.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            chain: Arc::new(MemoryCache::new()),
            persistent: false,
        }
    }

    /// Build the memory + database chain.
    ///
    /// If `path` is `None` or the database cannot be opened, the handle silently degrades to a
    /// memory-only cache.
    pub async fn open(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            debug!("Persistent cache disabled");
            return Self::memory();
        };

        match DatabaseCache::open(&path).await {
            Ok(database) => {
                debug!("Using cache database at {}", path.display());
                let layers: Vec<Arc<dyn CacheLayer>> = vec![Arc::new(MemoryCache::new()), Arc::new(database)];
                let chain = CacheChain::new(layers);
                Self {
                    chain: Arc::new(chain),
                    persistent: true,
                }
            }
            Err(error) => {
                warn!(
                    "Unable to open cache database {}: {}. Falling back to memory cache.",
                    path.display(),
                    error
                );
                Self::memory()
            }
        }
    }

    /// Location of the cache database according to `cache.file`.
    ///
    /// Missing key → `<tempdir>/.gallery-dl.cache`; a string → that path; anything else
    /// (`false`, `null` given through `-o`) → no persistent layer.
    pub fn path_from_config(config: &Config) -> Option<PathBuf> {
        match config.get(&["cache", "file"]) {
            None => Some(env::temp_dir().join(DEFAULT_CACHE_FILE)),
            Some(toml::Value::String(path)) => Some(PathBuf::from(path)),
            Some(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Return the cached result for `key` or run `compute` and cache its successful result
    /// for `max_age` seconds.
    ///
    /// The timestamp is taken once, before the lookup. Cache failures are logged and treated as
    /// misses; only errors of `compute` are returned.
    pub async fn memoize<T, E, F, Fut>(&self, key: &CacheKey, max_age: u64, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.memoize_at(key, max_age, Utc::now().timestamp(), compute).await
    }

    pub(crate) async fn memoize_at<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        max_age: u64,
        timestamp: i64,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.chain.get(key.as_str(), timestamp).await {
            Ok(entry) => match bincode::deserialize::<T>(&entry.value) {
                Ok(value) => {
                    debug!("Cache hit for '{}'", key);
                    return Ok(value);
                }
                Err(error) => warn!("Discarding undecodable cache entry '{}': {}", key, error),
            },
            Err(CacheError::Miss) => debug!("Cache miss for '{}'", key),
            Err(error) => warn!("Cache lookup for '{}' failed: {}", key, error),
        }

        let result = compute().await;

        if let Ok(value) = &result {
            let expires = timestamp.saturating_add(i64::try_from(max_age).unwrap_or(i64::MAX));
            match bincode::serialize(value) {
                Ok(bytes) => {
                    if let Err(error) = self.chain.set(key.as_str(), CacheEntry { value: bytes, expires }).await {
                        warn!("Failed to cache '{}': {}", key, error);
                    }
                }
                Err(error) => warn!("Failed to encode value for '{}': {}", key, error),
            }
        }

        if let Err(error) = self.chain.commit().await {
            warn!("Failed to commit cache: {}", error);
        }

        result
    }
}
