//! Shared types for the allocation and tip pipelines.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A social-account identifier (Farcaster fid). Distinct from any address.
pub type Fid = u64;

/// Address → balance for one token contract. Keys are lowercased; ordered so
/// serialized results are stable.
pub type HolderMap = BTreeMap<String, f64>;

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// One identity in the social-capital ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub fid: Fid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
    /// 1 = best.
    pub rank: u64,
    /// Linked addresses in provider order, lowercased.
    pub addresses: Vec<String>,
}

/// A single page of ranking results.
#[derive(Debug, Clone, Default)]
pub struct RankingPage {
    pub entries: Vec<RankingEntry>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

// ─── Allocation ──────────────────────────────────────────────────────────────

/// Inputs that produced an allocation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationParams {
    pub date: NaiveDate,
    pub total_daily_token_allowance: u64,
    pub min_balance_threshold: f64,
}

impl AllocationParams {
    pub const DEFAULT_DAILY_ALLOWANCE: u64 = 50_000;
    pub const DEFAULT_MIN_BALANCE: f64 = 11_111.0;

    /// Default params for `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            total_daily_token_allowance: Self::DEFAULT_DAILY_ALLOWANCE,
            min_balance_threshold: Self::DEFAULT_MIN_BALANCE,
        }
    }

    /// Override the daily allowance.
    pub fn allowance(mut self, total: u64) -> Self {
        self.total_daily_token_allowance = total;
        self
    }

    /// Override the token-B minimum balance.
    pub fn min_balance(mut self, min: f64) -> Self {
        self.min_balance_threshold = min;
        self
    }
}

/// One identity's share of the daily allowance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub fid: Fid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
    pub rank: u64,
    pub primary_address: String,
    pub total_balance_a: f64,
    pub total_balance_b: f64,
    pub amount: u64,
}

/// Full output of an allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    pub params: AllocationParams,
    pub allocations: Vec<Allocation>,
    pub token_a_holders: HolderMap,
    pub token_b_holders: HolderMap,
}

impl AllocationResult {
    /// Sum of all allocated amounts.
    pub fn total_allocated(&self) -> u64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

// ─── Feed ────────────────────────────────────────────────────────────────────

/// Display metadata for an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub fid: Fid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
}

/// A social post as returned by the feed search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub hash: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub author: Profile,
    /// Author of the post this one replies to, if resolved.
    pub parent_fid: Option<Fid>,
}

/// A single page of search results, newest first.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}

// ─── Tips ────────────────────────────────────────────────────────────────────

/// A tip extracted from a post.
///
/// `is_valid` is `None` until the validator has run over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tip {
    pub from_fid: Fid,
    pub from_username: Option<String>,
    pub from_display_name: Option<String>,
    pub from_pfp_url: Option<String>,
    pub to_fid: Fid,
    pub to_username: Option<String>,
    pub to_display_name: Option<String>,
    pub to_pfp_url: Option<String>,
    pub amount: u64,
    pub cast_hash: String,
    pub cast_text: String,
    pub casted_at: DateTime<Utc>,
    pub allocation_date: NaiveDate,
    pub is_valid: Option<bool>,
}

impl Tip {
    /// Fill in recipient display fields.
    pub fn with_recipient(mut self, profile: Option<&Profile>) -> Self {
        if let Some(p) = profile {
            self.to_username = p.username.clone();
            self.to_display_name = p.display_name.clone();
            self.to_pfp_url = p.pfp_url.clone();
        }
        self
    }
}

/// UTC calendar date a post's tip counts against.
pub fn allocation_date_of(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
