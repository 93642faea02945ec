//! SQLite membership store implementation

use super::{never_synced, KeySpace, MembershipStore, DEFAULT_KEY_PREFIX};
use crate::ids::{FollowerId, TargetId};
use crate::{FollowSyncError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// SQLite store configuration
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Namespace for set and scalar keys
    pub key_prefix: String,

    /// Enable WAL mode so queries can read while a sweep writes
    pub wal_mode: bool,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            wal_mode: true,
        }
    }
}

/// Default database location (~/.config/followsync/followers.db)
pub fn default_db_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("followsync");
    path.push("followers.db");
    path
}

/// Persistent [`MembershipStore`] backed by SQLite
///
/// Each follower set is the group of rows sharing one namespaced set key.
/// Batch writes run inside a single transaction.
pub struct SqliteMembershipStore {
    conn: Mutex<Connection>,
    keys: KeySpace,
    path: PathBuf,
}

impl SqliteMembershipStore {
    /// Open or create a store database
    pub fn open(config: SqliteStoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path.display(), "Opening membership store");

        let conn = Connection::open(&config.path)?;
        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        let store = Self {
            conn: Mutex::new(conn),
            keys: KeySpace::new(config.key_prefix),
            path: config.path,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS follower_sets (
                set_key TEXT NOT NULL,
                follower_id INTEGER NOT NULL,
                added_at INTEGER NOT NULL,
                PRIMARY KEY (set_key, follower_id)
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS sync_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            FollowSyncError::StorageUnavailable("SQLite connection lock poisoned".to_string())
        })
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the key namespace
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }
}

#[async_trait]
impl MembershipStore for SqliteMembershipStore {
    async fn add_batch_count_new(&self, target: &TargetId, ids: &[FollowerId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let key = self.keys.followers_key(target);
        let now = Utc::now().timestamp();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut added = 0u64;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO follower_sets (set_key, follower_id, added_at) VALUES (?1, ?2, ?3)",
            )?;
            for id in ids {
                added += stmt.execute(params![key, id.get(), now])? as u64;
            }
        }
        tx.commit()?;

        tracing::trace!(key = %key, batch = ids.len(), added, "Batch stored");
        Ok(added)
    }

    async fn contains(&self, target: &TargetId, id: FollowerId) -> Result<bool> {
        let key = self.keys.followers_key(target);
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM follower_sets WHERE set_key = ?1 AND follower_id = ?2",
                params![key, id.get()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn count(&self, target: &TargetId) -> Result<u64> {
        let key = self.keys.followers_key(target);
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM follower_sets WHERE set_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn clear(&self, target: &TargetId) -> Result<()> {
        let key = self.keys.followers_key(target);
        let removed = self
            .conn()?
            .execute("DELETE FROM follower_sets WHERE set_key = ?1", params![key])?;
        tracing::debug!(key = %key, removed, "Cleared follower set");
        Ok(())
    }

    async fn set_last_sync_time(&self, target: &TargetId, at: DateTime<Utc>) -> Result<()> {
        let key = self.keys.last_sync_key(target);
        self.conn()?.execute(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, at.timestamp(), Utc::now().timestamp()],
        )?;
        Ok(())
    }

    async fn get_last_sync_time(&self, target: &TargetId) -> Result<DateTime<Utc>> {
        let key = self.keys.last_sync_key(target);
        let secs: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT value FROM sync_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match secs {
            None => Ok(never_synced()),
            Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                FollowSyncError::StorageUnavailable(format!(
                    "Corrupt last sync value for {}: {}",
                    key, secs
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SqliteMembershipStore {
        SqliteMembershipStore::open(SqliteStoreConfig {
            path: dir.path().join("followers.db"),
            ..Default::default()
        })
        .unwrap()
    }

    fn ids(raw: &[i64]) -> Vec<FollowerId> {
        raw.iter().copied().map(FollowerId::new).collect()
    }

    #[test]
    fn test_store_creation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.path().exists());
        assert_eq!(store.keys().prefix(), "farcaster");
    }

    #[tokio::test]
    async fn test_add_and_count_new() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let target = TargetId::new("3");

        assert_eq!(store.add_batch_count_new(&target, &ids(&[1, 2, 3])).await.unwrap(), 3);
        assert_eq!(store.add_batch_count_new(&target, &ids(&[3, 4])).await.unwrap(), 1);
        assert_eq!(store.count(&target).await.unwrap(), 4);
        assert!(store.contains(&target, FollowerId::new(4)).await.unwrap());
        assert!(!store.contains(&target, FollowerId::new(9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_target() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let a = TargetId::new("a");
        let b = TargetId::new("b");

        store.add_batch(&a, &ids(&[1, 2])).await.unwrap();
        store.add_batch(&b, &ids(&[1])).await.unwrap();
        store.clear(&a).await.unwrap();

        assert_eq!(store.count(&a).await.unwrap(), 0);
        assert!(!store.contains(&a, FollowerId::new(1)).await.unwrap());
        assert!(store.contains(&b, FollowerId::new(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_last_sync_time_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let target = TargetId::new("3");

        assert_eq!(store.get_last_sync_time(&target).await.unwrap(), never_synced());

        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        store.set_last_sync_time(&target, at).await.unwrap();
        assert_eq!(store.get_last_sync_time(&target).await.unwrap(), at);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let target = TargetId::new("3");
        {
            let store = open_store(&dir);
            store.add_batch(&target, &ids(&[7, 8])).await.unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.count(&target).await.unwrap(), 2);
    }
}
