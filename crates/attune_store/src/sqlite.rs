//! SQLite backend for the keyed store.
//!
//! One table models the named sub-stores; records are opaque bytes. Native
//! sqlx failures are translated into the contractual store codes.

use crate::store::{KeyedStore, KeyedStoreError, StoreCode};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, KeyedStoreError> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database, handy for tests.
    pub async fn open_in_memory() -> Result<Self, KeyedStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), KeyedStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                store TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (store, key)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_records_store ON kv_records(store)")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;

        Ok(())
    }
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> KeyedStoreError {
    let message = format!("{}: {}", op, e);
    let lower = message.to_ascii_lowercase();
    let code = if lower.contains("full") || lower.contains("quota") {
        StoreCode::QuotaExceeded
    } else if matches!(e, sqlx::Error::RowNotFound) {
        StoreCode::NotFound
    } else {
        // Busy/locked and everything else transient maps to the retryable code.
        StoreCode::TransactionAborted
    };
    KeyedStoreError::new(code, message)
}

#[async_trait]
impl KeyedStore for SqliteStore {
    async fn open(&self) -> Result<(), KeyedStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("open", e))
    }

    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), KeyedStoreError> {
        sqlx::query(
            "INSERT INTO kv_records (store, key, value) VALUES (?, ?, ?)
             ON CONFLICT(store, key) DO UPDATE SET value = excluded.value",
        )
        .bind(store)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| map_sqlx_error("put", e))
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, KeyedStoreError> {
        let row = sqlx::query("SELECT value FROM kv_records WHERE store = ? AND key = ?")
            .bind(store)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn get_all(&self, store: &str) -> Result<Vec<Vec<u8>>, KeyedStoreError> {
        let rows = sqlx::query("SELECT value FROM kv_records WHERE store = ? ORDER BY key")
            .bind(store)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_all", e))?;
        Ok(rows.iter().map(|r| r.get::<Vec<u8>, _>("value")).collect())
    }

    async fn delete(&self, store: &str, key: &str) -> Result<(), KeyedStoreError> {
        sqlx::query("DELETE FROM kv_records WHERE store = ? AND key = ?")
            .bind(store)
            .bind(key)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("delete", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::STATE_CHECKS;

    #[tokio::test]
    async fn test_sqlite_roundtrip_in_memory() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.open().await.unwrap();
        store
            .put(STATE_CHECKS, "id1", b"payload".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.get(STATE_CHECKS, "id1").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert_eq!(store.get(STATE_CHECKS, "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_put_overwrites() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.put(STATE_CHECKS, "id", b"v1".to_vec()).await.unwrap();
        store.put(STATE_CHECKS, "id", b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get_all(STATE_CHECKS).await.unwrap().len(), 1);
        assert_eq!(
            store.get(STATE_CHECKS, "id").await.unwrap(),
            Some(b"v2".to_vec())
        );
    }

    #[tokio::test]
    async fn test_sqlite_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attune.db");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.put(STATE_CHECKS, "id", b"kept".to_vec()).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(STATE_CHECKS, "id").await.unwrap(),
            Some(b"kept".to_vec())
        );
    }
}
