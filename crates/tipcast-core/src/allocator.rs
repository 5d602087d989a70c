//! Allocation job: validates inputs, dispatches on season, persists once per date.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::cache::AllocationCache;
use crate::error::EngineError;
use crate::provider::{HolderSnapshot, RankingSource};
use crate::season::Season;
use crate::store::AllocationStore;
use crate::types::{AllocationParams, AllocationResult};

/// Compute allocations for `date` using `season`'s strategy.
///
/// `params` defaults to [`AllocationParams::for_date`]. Rejected before any
/// provider call when the date lies after `today`, the params belong to a
/// different date, or the allowance is zero.
pub async fn compute_allocations(
    date: NaiveDate,
    season: Season,
    params: Option<AllocationParams>,
    today: NaiveDate,
    holders: &dyn HolderSnapshot,
    rankings: &dyn RankingSource,
) -> Result<AllocationResult, EngineError> {
    let params = params.unwrap_or_else(|| AllocationParams::for_date(date));
    check_params(date, &params, today)?;
    season.strategy().compute(params, holders, rankings).await
}

fn check_params(
    date: NaiveDate,
    params: &AllocationParams,
    today: NaiveDate,
) -> Result<(), EngineError> {
    if date > today {
        return Err(EngineError::Config(format!(
            "allocation date {date} is after today ({today})"
        )));
    }
    if params.date != date {
        return Err(EngineError::Config(format!(
            "params are for {} but allocation was requested for {date}",
            params.date
        )));
    }
    if params.total_daily_token_allowance == 0 {
        return Err(EngineError::Config("daily allowance must be positive".into()));
    }
    if !params.min_balance_threshold.is_finite() || params.min_balance_threshold < 0.0 {
        return Err(EngineError::Config(format!(
            "minimum balance must be a non-negative number, got {}",
            params.min_balance_threshold
        )));
    }
    Ok(())
}

/// Bundles providers and settings for the daily allocation job.
pub struct Allocator {
    holders: Arc<dyn HolderSnapshot>,
    rankings: Arc<dyn RankingSource>,
    season: Season,
    daily_allowance: u64,
    min_balance: f64,
}

impl Allocator {
    pub fn new(holders: Arc<dyn HolderSnapshot>, rankings: Arc<dyn RankingSource>) -> Self {
        Self {
            holders,
            rankings,
            season: Season::One,
            daily_allowance: AllocationParams::DEFAULT_DAILY_ALLOWANCE,
            min_balance: AllocationParams::DEFAULT_MIN_BALANCE,
        }
    }

    /// Set the season strategy.
    pub fn season(mut self, season: Season) -> Self {
        self.season = season;
        self
    }

    /// Set the total allowance split each day.
    pub fn daily_allowance(mut self, total: u64) -> Self {
        self.daily_allowance = total;
        self
    }

    /// Set the token-B balance required for eligibility.
    pub fn min_balance(mut self, min: f64) -> Self {
        self.min_balance = min;
        self
    }

    fn params(&self, date: NaiveDate) -> AllocationParams {
        AllocationParams::for_date(date)
            .allowance(self.daily_allowance)
            .min_balance(self.min_balance)
    }

    /// Compute (without saving) the allocation for `date`.
    pub async fn compute(
        &self,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<AllocationResult, EngineError> {
        compute_allocations(
            date,
            self.season,
            Some(self.params(date)),
            today,
            self.holders.as_ref(),
            self.rankings.as_ref(),
        )
        .await
    }

    /// Compute and persist the allocation for `date`.
    ///
    /// Refuses a date that already has rows; allocations are write-once.
    pub async fn allocate_for_date<S: AllocationStore + ?Sized>(
        &self,
        store: &S,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<AllocationResult, EngineError> {
        check_params(date, &self.params(date), today)?;
        if store.has_allocations(date).await? {
            return Err(EngineError::Integrity(format!(
                "allocations for {date} already exist"
            )));
        }

        let result = self.compute(date, today).await?;
        store.insert_allocations(date, &result.allocations).await?;
        tracing::info!(
            %date,
            season = %self.season,
            rows = result.allocations.len(),
            total = result.total_allocated(),
            "Daily allocations saved"
        );
        Ok(result)
    }

    /// Today's allocation, memoized in `cache` until the date changes.
    ///
    /// Only long-lived callers that preview repeatedly benefit; a fresh cache
    /// per call always computes.
    pub async fn preview(
        &self,
        cache: &AllocationCache,
        today: NaiveDate,
    ) -> Result<AllocationResult, EngineError> {
        cache
            .get_or_compute(today, || self.compute(today, today))
            .await
    }
}
