//! In-memory storage backend.
//!
//! Holds allocations, tips and checkpoints in RAM.
//! Useful for tests and dry runs that don't need persistence.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use tipcast_core::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use tipcast_core::error::EngineError;
use tipcast_core::store::{AllocationStore, TipStore};
use tipcast_core::types::{Allocation, Fid, Tip};
use tipcast_core::validator::{reconcile, Budgets, ValidationReport};

/// In-memory tipcast storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    allocations: Mutex<BTreeMap<NaiveDate, Vec<Allocation>>>,
    tips: Mutex<HashMap<String, Tip>>,
    checkpoints: MemoryCheckpointStore,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored tips.
    pub fn tip_count(&self) -> usize {
        self.tips.lock().unwrap().len()
    }

    /// Look up a tip by its post hash.
    pub fn tip(&self, cast_hash: &str) -> Option<Tip> {
        self.tips.lock().unwrap().get(cast_hash).cloned()
    }
}

#[async_trait]
impl AllocationStore for InMemoryStorage {
    async fn has_allocations(&self, date: NaiveDate) -> Result<bool, EngineError> {
        Ok(self
            .allocations
            .lock()
            .unwrap()
            .get(&date)
            .is_some_and(|rows| !rows.is_empty()))
    }

    async fn insert_allocations(&self, date: NaiveDate, rows: &[Allocation]) -> Result<(), EngineError> {
        let mut allocations = self.allocations.lock().unwrap();
        if allocations.get(&date).is_some_and(|r| !r.is_empty()) {
            return Err(EngineError::Integrity(format!("allocations for {date} already exist")));
        }
        if rows.is_empty() {
            return Ok(());
        }
        allocations.insert(date, rows.to_vec());
        Ok(())
    }

    async fn allocations_for_date(&self, date: NaiveDate) -> Result<Vec<Allocation>, EngineError> {
        let mut rows = self
            .allocations
            .lock()
            .unwrap()
            .get(&date)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|a| a.rank);
        Ok(rows)
    }
}

#[async_trait]
impl TipStore for InMemoryStorage {
    async fn find_tips_by_hash(&self, hashes: &[String]) -> Result<HashSet<String>, EngineError> {
        let tips = self.tips.lock().unwrap();
        Ok(hashes
            .iter()
            .filter(|h| tips.contains_key(h.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_tips(&self, rows: &[Tip]) -> Result<(), EngineError> {
        let mut tips = self.tips.lock().unwrap();
        let mut seen = HashSet::new();
        for tip in rows {
            if tips.contains_key(&tip.cast_hash) || !seen.insert(tip.cast_hash.as_str()) {
                return Err(EngineError::Integrity(format!(
                    "tip {} already exists",
                    tip.cast_hash
                )));
            }
        }
        for tip in rows {
            tips.insert(tip.cast_hash.clone(), tip.clone());
        }
        Ok(())
    }

    async fn tips_for_date(&self, date: NaiveDate) -> Result<Vec<Tip>, EngineError> {
        let mut rows: Vec<Tip> = self
            .tips
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.allocation_date == date)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.casted_at.cmp(&b.casted_at).then_with(|| a.cast_hash.cmp(&b.cast_hash)));
        Ok(rows)
    }

    async fn valid_tips(&self) -> Result<Vec<Tip>, EngineError> {
        let mut rows: Vec<Tip> = self
            .tips
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_valid == Some(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.casted_at.cmp(&b.casted_at).then_with(|| a.cast_hash.cmp(&b.cast_hash)));
        Ok(rows)
    }

    async fn list_distinct_identities(&self) -> Result<Vec<Fid>, EngineError> {
        let mut fids: BTreeSet<Fid> = self
            .allocations
            .lock()
            .unwrap()
            .values()
            .flatten()
            .map(|a| a.fid)
            .collect();
        fids.extend(
            self.tips
                .lock()
                .unwrap()
                .values()
                .flat_map(|t| [t.from_fid, t.to_fid]),
        );
        Ok(fids.into_iter().collect())
    }

    async fn mark_tips_valid(&self) -> Result<ValidationReport, EngineError> {
        let allocations = self.allocations.lock().unwrap();
        let mut tips = self.tips.lock().unwrap();

        let pending: HashSet<(Fid, NaiveDate)> = tips
            .values()
            .filter(|t| t.is_valid.is_none())
            .map(|t| (t.from_fid, t.allocation_date))
            .collect();
        if pending.is_empty() {
            return Ok(ValidationReport::default());
        }

        let affected: Vec<Tip> = tips
            .values()
            .filter(|t| pending.contains(&(t.from_fid, t.allocation_date)))
            .cloned()
            .collect();

        let budgets: Budgets = allocations
            .iter()
            .flat_map(|(date, rows)| rows.iter().map(move |a| ((a.fid, *date), a.amount)))
            .filter(|(key, _)| pending.contains(key))
            .collect();

        let (decisions, report) = reconcile(&affected, &budgets);
        for decision in decisions {
            if let Some(tip) = tips.get_mut(&decision.cast_hash) {
                tip.is_valid = Some(decision.is_valid);
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(&self, fid: Fid) -> Result<Option<Checkpoint>, EngineError> {
        self.checkpoints.load(fid).await
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), EngineError> {
        self.checkpoints.save(checkpoint).await
    }

    async fn delete(&self, fid: Fid) -> Result<(), EngineError> {
        self.checkpoints.delete(fid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn alloc(fid: Fid, amount: u64) -> Allocation {
        Allocation {
            fid,
            username: None,
            display_name: None,
            pfp_url: None,
            rank: fid,
            primary_address: format!("0x{fid}"),
            total_balance_a: 1.0,
            total_balance_b: 20_000.0,
            amount,
        }
    }

    fn tip(hash: &str, from: Fid, to: Fid, amount: u64, minute: u32) -> Tip {
        Tip {
            from_fid: from,
            from_username: None,
            from_display_name: None,
            from_pfp_url: None,
            to_fid: to,
            to_username: None,
            to_display_name: None,
            to_pfp_url: None,
            amount,
            cast_hash: hash.into(),
            cast_text: format!("{amount} $SPACE"),
            casted_at: Utc.with_ymd_and_hms(2024, 7, 1, 12, minute, 0).unwrap(),
            allocation_date: day(1),
            is_valid: None,
        }
    }

    #[tokio::test]
    async fn allocations_are_write_once() {
        let store = InMemoryStorage::new();
        assert!(!store.has_allocations(day(1)).await.unwrap());

        store.insert_allocations(day(1), &[alloc(2, 30), alloc(1, 70)]).await.unwrap();
        assert!(store.has_allocations(day(1)).await.unwrap());

        let err = store.insert_allocations(day(1), &[alloc(3, 1)]).await.unwrap_err();
        assert!(matches!(err, EngineError::Integrity(_)));

        let rows = store.allocations_for_date(day(1)).await.unwrap();
        assert_eq!(rows.iter().map(|a| a.fid).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn tip_insert_is_all_or_nothing() {
        let store = InMemoryStorage::new();
        store.insert_tips(&[tip("a", 1, 2, 5, 0)]).await.unwrap();

        let err = store
            .insert_tips(&[tip("b", 1, 2, 5, 1), tip("a", 1, 2, 5, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Integrity(_)));
        assert_eq!(store.tip_count(), 1);

        let found = store
            .find_tips_by_hash(&["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from(["a".to_string()]));
    }

    #[tokio::test]
    async fn distinct_identities_union() {
        let store = InMemoryStorage::new();
        store.insert_allocations(day(1), &[alloc(1, 10)]).await.unwrap();
        store.insert_tips(&[tip("a", 5, 9, 1, 0), tip("b", 1, 5, 1, 1)]).await.unwrap();
        assert_eq!(store.list_distinct_identities().await.unwrap(), vec![1, 5, 9]);
    }

    #[tokio::test]
    async fn mark_valid_spends_budget_oldest_first() {
        let store = InMemoryStorage::new();
        store.insert_allocations(day(1), &[alloc(1, 100)]).await.unwrap();
        store
            .insert_tips(&[
                tip("late", 1, 2, 30, 30),
                tip("mid", 1, 2, 50, 20),
                tip("early", 1, 2, 40, 10),
                tip("nobudget", 7, 2, 1, 5),
            ])
            .await
            .unwrap();

        let report = store.mark_tips_valid().await.unwrap();
        assert_eq!(report, ValidationReport { examined: 4, valid: 2, invalid: 2 });
        assert_eq!(store.tip("early").unwrap().is_valid, Some(true));
        assert_eq!(store.tip("mid").unwrap().is_valid, Some(true));
        assert_eq!(store.tip("late").unwrap().is_valid, Some(false));
        assert_eq!(store.tip("nobudget").unwrap().is_valid, Some(false));
        let valid: Vec<_> = store.valid_tips().await.unwrap().into_iter().map(|t| t.cast_hash).collect();
        assert_eq!(valid, vec!["early", "mid"]);

        // Second pass changes nothing.
        assert_eq!(store.mark_tips_valid().await.unwrap(), ValidationReport::default());

        // A later tip is charged against what was already spent.
        store.insert_tips(&[tip("after", 1, 2, 10, 40)]).await.unwrap();
        let report = store.mark_tips_valid().await.unwrap();
        assert_eq!(report.valid, 1);
        assert_eq!(store.tip("after").unwrap().is_valid, Some(true));
    }

    #[tokio::test]
    async fn checkpoints_delegate_forward_only() {
        let store = InMemoryStorage::new();
        let ts = |h| Utc.with_ymd_and_hms(2024, 7, 1, h, 0, 0).unwrap();
        store.save(Checkpoint { fid: 3, timestamp: ts(9), updated_at: 0 }).await.unwrap();
        store.save(Checkpoint { fid: 3, timestamp: ts(8), updated_at: 0 }).await.unwrap();
        assert_eq!(store.load(3).await.unwrap().unwrap().timestamp, ts(9));
    }
}
