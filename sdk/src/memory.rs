//! Memory store adapter contract
//!
//! Short text records keyed by a user (session) identifier. The store is the
//! long-lived owner of records; the engine only requests operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// A single remembered piece of user context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque identifier assigned by the store
    pub id: String,
    pub user_id: String,
    pub content: String,
}

/// Durable memory operations
///
/// Failure is signalled by `Ok(false)` / an error, never by a silent no-op
/// that looks like success.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append a record. Returns `false` if the store refused it.
    async fn store(&self, user_id: &str, content: &str) -> Result<bool, EngineError>;

    /// All records of a user, oldest first
    async fn list(&self, user_id: &str) -> Result<Vec<MemoryRecord>, EngineError>;

    /// Delete one record. Returns `false` if it did not exist.
    async fn delete(&self, user_id: &str, record_id: &str) -> Result<bool, EngineError>;

    /// Delete every record of a user, returning how many were removed.
    ///
    /// The default lists and deletes one by one, counting successes; stores
    /// that can do better (and serialise it against concurrent stores)
    /// should override it.
    async fn clear(&self, user_id: &str) -> Result<usize, EngineError> {
        let records = self.list(user_id).await?;
        let mut deleted = 0;
        for record in records {
            if self.delete(user_id, &record.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
