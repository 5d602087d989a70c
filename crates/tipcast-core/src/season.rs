//! Season-specific allocation strategies.
//!
//! Each season may change how the daily allowance is split. Seasons are keyed
//! by number; an unknown number is a configuration error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::allocation::{build_allocations, eligible_addresses, fetch_rankings};
use crate::error::EngineError;
use crate::provider::{HolderSnapshot, RankingSource};
use crate::types::{AllocationParams, AllocationResult};

/// A supported allocation season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    /// Rank-weighted split among holders of both tokens.
    One,
}

impl Season {
    /// The strategy that computes allocations for this season.
    pub fn strategy(self) -> &'static dyn AllocationStrategy {
        match self {
            Self::One => &SeasonOne,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            Self::One => 1,
        }
    }
}

impl TryFrom<u32> for Season {
    type Error = EngineError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Self::One),
            other => Err(EngineError::Config(format!("unsupported season {other}"))),
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "season {}", self.number())
    }
}

/// Computes a full allocation result from the providers.
#[async_trait]
pub trait AllocationStrategy: Send + Sync {
    async fn compute(
        &self,
        params: AllocationParams,
        holders: &dyn HolderSnapshot,
        rankings: &dyn RankingSource,
    ) -> Result<AllocationResult, EngineError>;
}

/// Season 1: holders of both tokens, weighted by social-capital rank.
pub struct SeasonOne;

#[async_trait]
impl AllocationStrategy for SeasonOne {
    async fn compute(
        &self,
        params: AllocationParams,
        holders: &dyn HolderSnapshot,
        rankings: &dyn RankingSource,
    ) -> Result<AllocationResult, EngineError> {
        let token_a_holders = holders.token_a_holders().await?;
        let token_b_holders = holders
            .token_b_holders(params.min_balance_threshold)
            .await?;

        let eligible = eligible_addresses(&token_a_holders, &token_b_holders);
        tracing::info!(
            date = %params.date,
            token_a = token_a_holders.len(),
            token_b = token_b_holders.len(),
            eligible = eligible.len(),
            "Holder snapshots loaded"
        );

        let ranked = if eligible.is_empty() {
            vec![]
        } else {
            fetch_rankings(rankings, &eligible).await?
        };

        let allocations = build_allocations(
            &ranked,
            &token_a_holders,
            &token_b_holders,
            params.total_daily_token_allowance,
        )?;

        tracing::info!(
            date = %params.date,
            ranked = ranked.len(),
            allocated = allocations.len(),
            "Allocations computed"
        );

        Ok(AllocationResult {
            params,
            allocations,
            token_a_holders,
            token_b_holders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_dispatch() {
        assert_eq!(Season::try_from(1).unwrap(), Season::One);
        let err = Season::try_from(2).unwrap_err();
        assert!(err.is_config());
        assert_eq!(Season::One.to_string(), "season 1");
    }
}
