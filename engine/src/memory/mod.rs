//! In-process memory store and per-user write serialization
//!
//! `UserLocks` hands out one async mutex per `user_id`. Both store
//! implementations hold it around every mutating operation, so a bulk clear
//! never interleaves with a concurrent store for the same user while
//! different users proceed independently.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::memory::{MemoryRecord, MemoryStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, RwLock};

/// Map of per-user write locks
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for `user_id`, waiting if another write for
    /// the same user is in flight.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let user_lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on can go
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(user_id.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        user_lock.lock_owned().await
    }

    /// Number of users with a live lock entry
    pub fn tracked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Volatile `MemoryStore` used by tests and `--ephemeral` runs
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Vec<MemoryRecord>>>,
    locks: UserLocks,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, user_id: &str, content: &str) -> Result<bool, EngineError> {
        if content.trim().is_empty() {
            return Ok(false);
        }

        let _guard = self.locks.lock(user_id).await;
        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
        };
        self.records
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(record);
        Ok(true)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<MemoryRecord>, EngineError> {
        Ok(self
            .records
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, user_id: &str, record_id: &str) -> Result<bool, EngineError> {
        let _guard = self.locks.lock(user_id).await;
        let mut records = self.records.write().await;
        let Some(user_records) = records.get_mut(user_id) else {
            return Ok(false);
        };
        let before = user_records.len();
        user_records.retain(|r| r.id != record_id);
        Ok(user_records.len() < before)
    }

    async fn clear(&self, user_id: &str) -> Result<usize, EngineError> {
        let _guard = self.locks.lock(user_id).await;
        Ok(self
            .records
            .write()
            .await
            .remove(user_id)
            .map(|r| r.len())
            .unwrap_or(0))
    }
}
