//! In-process session store.

use super::{GameId, SessionPatch, SessionRecord, StateStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Store backed by a map behind an async read-write lock.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<GameId, SessionRecord>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    #[instrument(skip(self))]
    async fn get(&self, game_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.read().await.get(game_id).cloned())
    }

    #[instrument(skip(self, record))]
    async fn set(
        &self,
        game_id: &str,
        record: SessionRecord,
    ) -> Result<SessionRecord, StoreError> {
        let mut records = self.records.write().await;
        let version = records.get(game_id).map_or(0, |r| r.version) + 1;
        let stored = record.stamped(version);
        records.insert(game_id.to_string(), stored.clone());
        debug!(version, "Record set");
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn update(
        &self,
        game_id: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(game_id)
            .ok_or_else(|| StoreError::not_found(game_id))?;

        if let Some(expected) = patch.if_version
            && current.version != expected
        {
            return Err(StoreError::conflict(game_id, expected));
        }

        let mut next = current.clone();
        patch.apply_to(&mut next);
        *current = next.stamped(current.version + 1);
        debug!(version = current.version, "Record updated");
        Ok(current.clone())
    }

    #[instrument(skip(self, record))]
    async fn compare_and_set(
        &self,
        game_id: &str,
        expected_version: u64,
        record: SessionRecord,
    ) -> Result<SessionRecord, StoreError> {
        let mut records = self.records.write().await;
        match (records.get(game_id), expected_version) {
            (None, 0) => {}
            (Some(_), 0) => return Err(StoreError::already_exists(game_id)),
            (None, expected) => return Err(StoreError::conflict(game_id, expected)),
            (Some(current), expected) if current.version != expected => {
                return Err(StoreError::conflict(game_id, expected));
            }
            (Some(_), _) => {}
        }

        let stored = record.stamped(expected_version + 1);
        records.insert(game_id.to_string(), stored.clone());
        debug!(version = stored.version, "Record swapped");
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<GameId>, StoreError> {
        let mut ids: Vec<GameId> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn remove(&self, game_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(game_id).is_some())
    }
}
