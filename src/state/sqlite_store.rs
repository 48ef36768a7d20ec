//! 异步 SQLite 状态存储（sqlx）
//!
//! 需要启用 `async-sqlite` feature。状态以 JSON 文本存放，主键为 (document_id, section_id)。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::core::StoreError;
    use crate::state::{StateKey, StateStore, WorkflowState};

    impl From<sqlx::Error> for StoreError {
        fn from(e: sqlx::Error) -> Self {
            StoreError::Database(e.to_string())
        }
    }

    /// SQLite 状态存储
    pub struct SqliteStateStore {
        pool: SqlitePool,
    }

    impl SqliteStateStore {
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            let store = Self { pool };
            store.init_tables().await?;
            Ok(store)
        }

        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }

        async fn init_tables(&self) -> Result<(), StoreError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS workflow_states (
                    document_id TEXT NOT NULL,
                    section_id TEXT NOT NULL,
                    state TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (document_id, section_id)
                )",
            )
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }
    }

    #[async_trait]
    impl StateStore for SqliteStateStore {
        async fn get(&self, key: &StateKey) -> Result<Option<WorkflowState>, StoreError> {
            let row = sqlx::query(
                "SELECT state FROM workflow_states WHERE document_id = ? AND section_id = ?",
            )
            .bind(&key.document_id)
            .bind(&key.section_id)
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some(row) => {
                    let json: String = row.get("state");
                    Ok(Some(serde_json::from_str(&json)?))
                }
                None => Ok(None),
            }
        }

        async fn save(&self, state: &WorkflowState) -> Result<(), StoreError> {
            let json = serde_json::to_string(state)?;
            sqlx::query(
                "INSERT OR REPLACE INTO workflow_states (document_id, section_id, state, updated_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&state.document_id)
            .bind(&state.section_id)
            .bind(json)
            .bind(state.last_modified.to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete(&self, key: &StateKey) -> Result<(), StoreError> {
            sqlx::query("DELETE FROM workflow_states WHERE document_id = ? AND section_id = ?")
                .bind(&key.document_id)
                .bind(&key.section_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteStateStore;

#[cfg(all(test, feature = "async-sqlite"))]
mod tests {
    use super::*;
    use crate::state::{Limits, StateKey, StateStore, WorkflowState};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStateStore::new(dir.path().join("state.db"))
            .await
            .unwrap();

        let key = StateKey::new("doc", "methods");
        let mut state = WorkflowState::new(&key, "explain the method", Limits::default());
        store.save(&state).await.unwrap();
        state.pass_index = 1;
        store.save(&state).await.unwrap();

        let loaded = store.load(&key).await.unwrap();
        assert_eq!(loaded.pass_index, 1);

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
