//! Persistence traits for allocations and tips.
//!
//! Implementations: `InMemoryStorage` and `SqliteStorage` in `tipcast-storage`.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::checkpoint::CheckpointStore;
use crate::error::EngineError;
use crate::types::{Allocation, Fid, Tip};
use crate::validator::ValidationReport;

/// Daily allocation rows, write-once per date.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Returns `true` if any allocation row exists for `date`.
    async fn has_allocations(&self, date: NaiveDate) -> Result<bool, EngineError>;

    /// Insert the allocation set for `date`.
    ///
    /// Fails with [`EngineError::Integrity`] if `date` already has rows.
    async fn insert_allocations(
        &self,
        date: NaiveDate,
        rows: &[Allocation],
    ) -> Result<(), EngineError>;

    /// All allocation rows for `date`, rank 1 first.
    async fn allocations_for_date(&self, date: NaiveDate) -> Result<Vec<Allocation>, EngineError>;
}

/// Persisted tips.
#[async_trait]
pub trait TipStore: Send + Sync {
    /// Return the subset of `hashes` that already have a tip row.
    async fn find_tips_by_hash(&self, hashes: &[String]) -> Result<HashSet<String>, EngineError>;

    /// Insert new tips. All rows are written or none are.
    async fn insert_tips(&self, tips: &[Tip]) -> Result<(), EngineError>;

    /// All tips counted against `date`, oldest first.
    async fn tips_for_date(&self, date: NaiveDate) -> Result<Vec<Tip>, EngineError>;

    /// Every tip the validator accepted, across all dates, oldest first.
    async fn valid_tips(&self) -> Result<Vec<Tip>, EngineError>;

    /// Every identity known to the store: allocation holders, tip senders and
    /// tip recipients, ascending.
    async fn list_distinct_identities(&self) -> Result<Vec<Fid>, EngineError>;

    /// Decide `is_valid` for every tip that is still undecided.
    ///
    /// Implementations apply [`crate::validator::reconcile`] to the affected
    /// sender/date groups. Running it again without new tips changes nothing.
    async fn mark_tips_valid(&self) -> Result<ValidationReport, EngineError>;
}

/// Everything the jobs need from a backend.
pub trait Store: AllocationStore + TipStore + CheckpointStore {}

impl<T: AllocationStore + TipStore + CheckpointStore + ?Sized> Store for T {}
