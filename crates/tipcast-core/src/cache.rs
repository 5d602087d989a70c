//! Single-slot memo of the allocation result for the current day.

use std::future::Future;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::types::AllocationResult;

/// Holds at most one allocation result, keyed by its date.
///
/// A request for any other date recomputes and replaces the slot. Failures
/// leave the slot untouched.
#[derive(Default)]
pub struct AllocationCache {
    slot: Mutex<Option<AllocationResult>>,
}

impl AllocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn cached_date(&self) -> Option<NaiveDate> {
        self.slot.lock().await.as_ref().map(|r| r.params.date)
    }

    /// Return the cached result for `date`, or run `compute` and cache it.
    ///
    /// The lock is held while computing so concurrent callers for the same day
    /// trigger only one computation.
    pub async fn get_or_compute<F, Fut>(
        &self,
        date: NaiveDate,
        compute: F,
    ) -> Result<AllocationResult, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AllocationResult, EngineError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|r| r.params.date == date) {
            tracing::debug!(%date, "Allocation served from cache");
            return Ok(cached.clone());
        }

        let result = compute().await?;
        *slot = Some(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AllocationParams, HolderMap};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn result_for(date: NaiveDate) -> AllocationResult {
        AllocationResult {
            params: AllocationParams::for_date(date),
            allocations: vec![],
            token_a_holders: HolderMap::new(),
            token_b_holders: HolderMap::new(),
        }
    }

    #[tokio::test]
    async fn same_day_hits_cache_new_day_recomputes() {
        let cache = AllocationCache::new();
        let calls = AtomicU32::new(0);
        let d1 = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();

        for date in [d1, d1, d2, d2] {
            let r = cache
                .get_or_compute(date, || async {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Ok(result_for(date))
                })
                .await
                .unwrap();
            assert_eq!(r.params.date, date);
        }

        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(cache.cached_date().await, Some(d2));
    }

    #[tokio::test]
    async fn failure_keeps_previous_slot() {
        let cache = AllocationCache::new();
        let d1 = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();

        cache.get_or_compute(d1, || async { Ok(result_for(d1)) }).await.unwrap();
        let err = cache
            .get_or_compute(d2, || async { Err(EngineError::provider("rankings", "down")) })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.cached_date().await, Some(d1));
    }
}
