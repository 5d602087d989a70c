//! Read-side views over allocations and tips: per-identity balances and the
//! recipient leaderboard. Only tips the validator accepted count.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{Allocation, Fid, Tip};

/// One identity's tipping balance for a day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSummary {
    pub fid: Fid,
    pub date: NaiveDate,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
    pub allocated: u64,
    pub sent: u64,
    pub received: u64,
    /// `allocated - sent`, floored at zero.
    pub remaining: u64,
    pub tips_sent: usize,
    pub tips_received: usize,
}

/// Summaries for `date`.
///
/// With `identity` set, returns exactly one summary for it (zeros if it has
/// no activity). Otherwise returns one summary per identity that was
/// allocated, sent, or received anything that day, ordered by fid.
pub fn summarize(
    date: NaiveDate,
    allocations: &[Allocation],
    tips: &[Tip],
    identity: Option<Fid>,
) -> Vec<AllocationSummary> {
    let allocations: Vec<&Allocation> = allocations.iter().collect();
    let tips: Vec<&Tip> = tips
        .iter()
        .filter(|t| t.allocation_date == date)
        .collect();

    let fids: BTreeSet<Fid> = match identity {
        Some(fid) => BTreeSet::from([fid]),
        None => allocations
            .iter()
            .map(|a| a.fid)
            .chain(tips.iter().flat_map(|t| [t.from_fid, t.to_fid]))
            .collect(),
    };

    fids.into_iter()
        .map(|fid| summary_for(fid, date, &allocations, &tips))
        .collect()
}

fn summary_for(fid: Fid, date: NaiveDate, allocations: &[&Allocation], tips: &[&Tip]) -> AllocationSummary {
    let mut s = AllocationSummary {
        fid,
        date,
        ..Default::default()
    };

    if let Some(a) = allocations.iter().find(|a| a.fid == fid) {
        s.allocated = a.amount;
        s.username = a.username.clone();
        s.display_name = a.display_name.clone();
        s.pfp_url = a.pfp_url.clone();
    }

    for tip in tips.iter().filter(|t| t.is_valid == Some(true)) {
        if tip.from_fid == fid {
            s.sent += tip.amount;
            s.tips_sent += 1;
            if s.username.is_none() {
                s.username = tip.from_username.clone();
                s.display_name = tip.from_display_name.clone();
                s.pfp_url = tip.from_pfp_url.clone();
            }
        }
        if tip.to_fid == fid {
            s.received += tip.amount;
            s.tips_received += 1;
            if s.username.is_none() {
                s.username = tip.to_username.clone();
                s.display_name = tip.to_display_name.clone();
                s.pfp_url = tip.to_pfp_url.clone();
            }
        }
    }

    s.remaining = s.allocated.saturating_sub(s.sent);
    s
}

/// A recipient's standing on the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub fid: Fid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
    pub total_amount: u64,
    pub tip_count: usize,
}

/// Rank recipients of valid tips by total amount received, then tip count,
/// then fid. `limit` of `None` returns everyone.
pub fn leaderboard(tips: &[Tip], limit: Option<usize>) -> Vec<LeaderboardEntry> {
    let mut by_fid: HashMap<Fid, LeaderboardEntry> = HashMap::new();
    for tip in tips.iter().filter(|t| t.is_valid == Some(true)) {
        let entry = by_fid.entry(tip.to_fid).or_insert_with(|| LeaderboardEntry {
            fid: tip.to_fid,
            username: None,
            display_name: None,
            pfp_url: None,
            total_amount: 0,
            tip_count: 0,
        });
        entry.total_amount += tip.amount;
        entry.tip_count += 1;
        if entry.username.is_none() {
            entry.username = tip.to_username.clone();
            entry.display_name = tip.to_display_name.clone();
            entry.pfp_url = tip.to_pfp_url.clone();
        }
    }

    let mut entries: Vec<LeaderboardEntry> = by_fid.into_values().collect();
    entries.sort_by(|a, b| {
        b.total_amount
            .cmp(&a.total_amount)
            .then(b.tip_count.cmp(&a.tip_count))
            .then(a.fid.cmp(&b.fid))
    });
    if let Some(n) = limit {
        entries.truncate(n);
    }
    entries
}
