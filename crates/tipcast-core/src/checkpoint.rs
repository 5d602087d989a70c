//! Checkpoint manager for each identity's cast-search position.
//!
//! A checkpoint stores the timestamp of the newest post already processed for
//! an identity. On the next run only posts strictly newer than it are fetched.
//! Checkpoints only ever move forward.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Fid;

/// A persisted checkpoint for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub fid: Fid,
    /// Newest post timestamp already processed.
    pub timestamp: DateTime<Utc>,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
///
/// `save` must be a forward-only upsert: an incoming checkpoint older than the
/// stored one leaves the stored timestamp untouched.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for `fid`.
    async fn load(&self, fid: Fid) -> Result<Option<Checkpoint>, EngineError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), EngineError>;

    /// Delete a checkpoint (forces a full re-scan of that identity).
    async fn delete(&self, fid: Fid) -> Result<(), EngineError>;
}

/// Manages checkpoint reads/writes for one identity during a sync run.
pub struct CheckpointManager<'a, S: CheckpointStore + ?Sized> {
    store: &'a S,
    fid: Fid,
    current: Option<DateTime<Utc>>,
}

impl<'a, S: CheckpointStore + ?Sized> CheckpointManager<'a, S> {
    /// Load the identity's checkpoint and wrap it.
    pub async fn load(store: &'a S, fid: Fid) -> Result<Self, EngineError> {
        let current = store.load(fid).await?.map(|cp| cp.timestamp);
        Ok(Self { store, fid, current })
    }

    /// The last synced timestamp, `None` if the identity was never synced.
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.current
    }

    /// Move the checkpoint to `timestamp` if it is newer than the current one.
    ///
    /// Call only after the page that produced `timestamp` has been persisted.
    /// Returns `true` if a new checkpoint was written.
    pub async fn advance(&mut self, timestamp: DateTime<Utc>) -> Result<bool, EngineError> {
        if self.current.is_some_and(|cur| timestamp <= cur) {
            return Ok(false);
        }
        self.store
            .save(Checkpoint {
                fid: self.fid,
                timestamp,
                updated_at: Utc::now().timestamp(),
            })
            .await?;
        self.current = Some(timestamp);
        Ok(true)
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory checkpoint store for tests and dry runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<Fid, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, fid: Fid) -> Result<Option<Checkpoint>, EngineError> {
        Ok(self.data.lock().unwrap().get(&fid).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), EngineError> {
        let mut data = self.data.lock().unwrap();
        match data.get(&checkpoint.fid) {
            Some(existing) if existing.timestamp >= checkpoint.timestamp => {}
            _ => {
                data.insert(checkpoint.fid, checkpoint);
            }
        }
        Ok(())
    }

    async fn delete(&self, fid: Fid) -> Result<(), EngineError> {
        self.data.lock().unwrap().remove(&fid);
        Ok(())
    }
}
