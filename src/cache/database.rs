use async_trait::async_trait;
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::path::Path;
use std::time::Duration;
use tokio::fs::create_dir_all;
use tokio::sync::Mutex;

use super::{CacheEntry, CacheError, CacheLayer};

/// Persistent cache layer backed by a single SQLite table:
///
/// ```sql
/// CREATE TABLE data (key TEXT PRIMARY KEY, value BLOB, expires INTEGER)
/// ```
///
/// Writes are collected in a transaction that stays open until [`commit`](CacheLayer::commit).
pub struct DatabaseCache {
    inner: Mutex<Inner>,
}

struct Inner {
    conn: SqliteConnection,
    /// A write transaction is open and waiting for `commit`.
    pending: bool,
}

impl DatabaseCache {
    /// Open (or create) the cache database at `path`.
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));

        let mut conn = SqliteConnection::connect_with(&options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data (
                key TEXT PRIMARY KEY,
                value BLOB,
                expires INTEGER
            )
            "#,
        )
        .execute(&mut conn)
        .await?;

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                pending: false,
            }),
        })
    }
}

#[async_trait]
impl CacheLayer for DatabaseCache {
    async fn get(&self, key: &str, timestamp: i64) -> Result<CacheEntry, CacheError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        // Inside our own pending write transaction the read is already isolated.
        let exclusive = !inner.pending;
        if exclusive {
            sqlx::query("BEGIN EXCLUSIVE").execute(&mut inner.conn).await?;
        }

        let row: Result<Option<(Vec<u8>, i64)>, sqlx::Error> =
            sqlx::query_as("SELECT value, expires FROM data WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut inner.conn)
                .await;

        if exclusive {
            let end = if row.is_ok() { "COMMIT" } else { "ROLLBACK" };
            sqlx::query(end).execute(&mut inner.conn).await?;
        }

        match row? {
            Some((value, expires)) if timestamp < expires => Ok(CacheEntry { value, expires }),
            Some(_) => {
                debug!("Cache entry '{}' is expired", key);
                Err(CacheError::Miss)
            }
            None => Err(CacheError::Miss),
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if !inner.pending {
            sqlx::query("BEGIN IMMEDIATE").execute(&mut inner.conn).await?;
            inner.pending = true;
        }

        sqlx::query("INSERT OR REPLACE INTO data (key, value, expires) VALUES (?, ?, ?)")
            .bind(key)
            .bind(entry.value)
            .bind(entry.expires)
            .execute(&mut inner.conn)
            .await?;

        Ok(())
    }

    async fn commit(&self) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if inner.pending {
            inner.pending = false;
            sqlx::query("COMMIT").execute(&mut inner.conn).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatabaseCache::open(&dir.path().join("cache.db")).await.unwrap();

        let entry = CacheEntry {
            value: vec![0, 1, 2, 255],
            expires: 1_000,
        };
        cache.set("key", entry.clone()).await.unwrap();
        cache.commit().await.unwrap();

        assert_eq!(cache.get("key", 999).await.unwrap(), entry);
        assert!(matches!(cache.get("key", 1_000).await, Err(CacheError::Miss)));
        assert!(matches!(cache.get("missing", 0).await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn uncommitted_writes_are_visible_to_the_same_layer() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatabaseCache::open(&dir.path().join("cache.db")).await.unwrap();

        cache
            .set("key", CacheEntry { value: vec![1], expires: 50 })
            .await
            .unwrap();
        assert_eq!(cache.get("key", 0).await.unwrap().value, vec![1]);

        cache
            .set("key", CacheEntry { value: vec![2], expires: 80 })
            .await
            .unwrap();
        cache.commit().await.unwrap();
        assert_eq!(cache.get("key", 60).await.unwrap().value, vec![2]);
    }

    #[tokio::test]
    async fn committed_rows_are_shared_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let writer = DatabaseCache::open(&path).await.unwrap();
        writer
            .set("shared", CacheEntry { value: b"cookie".to_vec(), expires: i64::MAX })
            .await
            .unwrap();
        writer.commit().await.unwrap();

        let reader = DatabaseCache::open(&path).await.unwrap();
        assert_eq!(reader.get("shared", 0).await.unwrap().value, b"cookie".to_vec());
    }
}
