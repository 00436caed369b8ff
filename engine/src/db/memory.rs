//! Durable session memory in SQLite

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::memory::{MemoryRecord, MemoryStore};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::memory::UserLocks;

/// `MemoryStore` over the `memories` table
pub struct SqliteMemoryStore {
    pool: SqlitePool,
    locks: Arc<UserLocks>,
}

impl SqliteMemoryStore {
    /// Handles over the same database must share `locks`
    pub fn new(pool: SqlitePool, locks: Arc<UserLocks>) -> Self {
        Self { pool, locks }
    }
}

fn db_err(context: &str, e: sqlx::Error) -> EngineError {
    EngineError::Database(format!("{}: {}", context, e))
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn store(&self, user_id: &str, content: &str) -> Result<bool, EngineError> {
        if content.trim().is_empty() {
            return Ok(false);
        }

        let _guard = self.locks.lock(user_id).await;
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO memories (id, user_id, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("Failed to store memory", e))?;

        tracing::debug!("Stored memory {} for user {}", id, user_id);
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<MemoryRecord>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content
            FROM memories
            WHERE user_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("Failed to list memories", e))?;

        Ok(rows
            .into_iter()
            .map(|row| MemoryRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                content: row.get("content"),
            })
            .collect())
    }

    async fn delete(&self, user_id: &str, record_id: &str) -> Result<bool, EngineError> {
        let _guard = self.locks.lock(user_id).await;
        let result = sqlx::query("DELETE FROM memories WHERE id = ? AND user_id = ?")
            .bind(record_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("Failed to delete memory", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, user_id: &str) -> Result<usize, EngineError> {
        let _guard = self.locks.lock(user_id).await;
        let result = sqlx::query("DELETE FROM memories WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("Failed to clear memories", e))?;

        tracing::info!("Cleared {} memories for user {}", result.rows_affected(), user_id);
        Ok(result.rows_affected() as usize)
    }
}
