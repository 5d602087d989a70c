//! Rank-weighted split of the daily token allowance.
//!
//! # Algorithm
//!
//! ```text
//! eligible   = token-A holders ∩ token-B holders (B already thresholded)
//! rankings   = all ranking pages for the eligible addresses, rank order kept
//! weight(i)  = (N - i + 1) / (N(N+1)/2)          i = 1..N
//! raw(i)     = round(weight(i) * total)          half away from zero
//! difference = total - Σ raw
//! rows 1..|difference| get sign(difference) added
//! ```
//!
//! Every rounding moves a row by at most 0.5, so `|difference| <= N / 2` and
//! the adjusted amounts always sum to `total` exactly.

use std::collections::HashSet;

use crate::error::EngineError;
use crate::provider::RankingSource;
use crate::types::{Allocation, HolderMap, RankingEntry};

/// Addresses holding both tokens, sorted so provider queries are deterministic.
pub fn eligible_addresses(token_a: &HolderMap, token_b: &HolderMap) -> Vec<String> {
    let mut eligible: Vec<String> = token_a
        .keys()
        .filter(|addr| token_b.contains_key(*addr))
        .cloned()
        .collect();
    eligible.sort();
    eligible
}

/// Linearly decreasing weights for `n` ranked rows. Sums to 1.
pub fn rank_weights(n: usize) -> Vec<f64> {
    let rank_sum = (n * (n + 1)) as f64 / 2.0;
    (0..n).map(|i| (n - i) as f64 / rank_sum).collect()
}

/// Split `total` over `n` ranked rows so the result sums to exactly `total`.
///
/// Returns an empty vector for `n == 0`.
pub fn split_allowance(n: usize, total: u64) -> Result<Vec<u64>, EngineError> {
    let mut amounts: Vec<u64> = rank_weights(n)
        .into_iter()
        .map(|w| (w * total as f64).round() as u64)
        .collect();
    if n > 0 {
        apply_remainder(&mut amounts, total)?;
    }
    Ok(amounts)
}

/// Spread `total - Σ amounts` as ±1 over the highest-ranked rows.
pub fn apply_remainder(amounts: &mut [u64], total: u64) -> Result<(), EngineError> {
    let sum: u64 = amounts.iter().sum();
    let difference = total as i64 - sum as i64;
    if difference == 0 {
        return Ok(());
    }

    let rows = amounts.len();
    let overflow = || EngineError::RemainderOverflow { difference, rows };
    if difference.unsigned_abs() as usize > rows {
        return Err(overflow());
    }

    let step = difference.signum();
    for amount in amounts.iter_mut().take(difference.unsigned_abs() as usize) {
        *amount = amount.checked_add_signed(step).ok_or_else(overflow)?;
    }
    Ok(())
}

/// Drain every ranking page for `filter_addresses`, preserving provider order.
pub async fn fetch_rankings<R: RankingSource + ?Sized>(
    source: &R,
    filter_addresses: &[String],
) -> Result<Vec<RankingEntry>, EngineError> {
    let mut rankings = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = source
            .rankings_page(filter_addresses, cursor.as_deref())
            .await?;
        pages += 1;
        tracing::debug!(page = pages, entries = page.entries.len(), "Ranking page fetched");
        rankings.extend(page.entries);

        if !page.has_next_page {
            break;
        }
        match page.next_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => {
                return Err(EngineError::provider(
                    "rankings",
                    format!("page {pages} claims more results without a new cursor"),
                ))
            }
        }
    }

    Ok(rankings)
}

/// Turn a rank-ordered list into allocation rows.
///
/// Identities without any eligible linked address are skipped; the remaining
/// ones keep their relative order. Identities sharing addresses are each
/// credited with the full balances.
pub fn build_allocations(
    rankings: &[RankingEntry],
    token_a: &HolderMap,
    token_b: &HolderMap,
    total: u64,
) -> Result<Vec<Allocation>, EngineError> {
    let eligible: HashSet<String> = eligible_addresses(token_a, token_b).into_iter().collect();

    let ranked: Vec<(&RankingEntry, &String)> = rankings
        .iter()
        .filter(|r| r.addresses.iter().any(|a| eligible.contains(a)))
        .filter_map(|r| {
            r.addresses
                .iter()
                .find(|a| token_b.contains_key(*a))
                .map(|primary| (r, primary))
        })
        .collect();

    let amounts = split_allowance(ranked.len(), total)?;

    Ok(ranked
        .into_iter()
        .zip(amounts)
        .map(|((r, primary), amount)| Allocation {
            fid: r.fid,
            username: r.username.clone(),
            display_name: r.display_name.clone(),
            pfp_url: r.pfp_url.clone(),
            rank: r.rank,
            primary_address: primary.clone(),
            total_balance_a: sum_balances(&r.addresses, token_a),
            total_balance_b: sum_balances(&r.addresses, token_b),
            amount,
        })
        .collect())
}

fn sum_balances(addresses: &[String], holders: &HolderMap) -> f64 {
    addresses
        .iter()
        .map(|a| holders.get(a).copied().unwrap_or(0.0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RankingPage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn holders(entries: &[(&str, f64)]) -> HolderMap {
        entries.iter().map(|(a, b)| (a.to_string(), *b)).collect()
    }

    fn entry(fid: u64, rank: u64, addresses: &[&str]) -> RankingEntry {
        RankingEntry {
            fid,
            username: Some(format!("user{fid}")),
            display_name: None,
            pfp_url: None,
            rank,
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn three_rows_of_one_hundred() {
        assert_eq!(split_allowance(3, 100).unwrap(), vec![50, 33, 17]);
    }

    #[test]
    fn two_rows_of_ten() {
        assert_eq!(split_allowance(2, 10).unwrap(), vec![7, 3]);
    }

    #[test]
    fn empty_split() {
        assert!(split_allowance(0, 50_000).unwrap().is_empty());
    }

    #[test]
    fn conservation_across_sizes() {
        for total in [1u64, 7, 10, 99, 100, 12_345, 50_000] {
            for n in 1..=200 {
                let amounts = split_allowance(n, total).unwrap();
                assert_eq!(amounts.len(), n);
                assert_eq!(amounts.iter().sum::<u64>(), total, "n={n} total={total}");
            }
        }
    }

    #[test]
    fn weights_non_increasing() {
        let w = rank_weights(25);
        assert!(w.windows(2).all(|p| p[0] >= p[1]));
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn remainder_goes_to_top_rows() {
        let mut amounts = vec![3, 3, 3];
        apply_remainder(&mut amounts, 11).unwrap();
        assert_eq!(amounts, vec![4, 4, 3]);

        let mut amounts = vec![5, 4, 3];
        apply_remainder(&mut amounts, 11).unwrap();
        assert_eq!(amounts, vec![4, 4, 3]);
    }

    #[test]
    fn remainder_larger_than_rows_is_an_error() {
        let mut amounts = vec![1, 1];
        let err = apply_remainder(&mut amounts, 10).unwrap_err();
        assert!(matches!(err, EngineError::RemainderOverflow { difference: 8, rows: 2 }));
    }

    #[test]
    fn remainder_cannot_take_a_row_below_zero() {
        let mut amounts = vec![0, 5];
        let err = apply_remainder(&mut amounts, 4).unwrap_err();
        assert!(matches!(err, EngineError::RemainderOverflow { difference: -1, rows: 2 }));
    }

    #[test]
    fn eligibility_requires_both_tokens() {
        let a = holders(&[("0xa", 1.0), ("0xb", 2.0), ("0xc", 1.0)]);
        let b = holders(&[("0xb", 20_000.0), ("0xc", 15_000.0), ("0xd", 99_999.0)]);
        assert_eq!(eligible_addresses(&a, &b), vec!["0xb", "0xc"]);
    }

    #[test]
    fn build_allocations_primary_and_totals() {
        let a = holders(&[("0x1", 2.0), ("0x2", 1.0), ("0x3", 4.0)]);
        let b = holders(&[("0x2", 20_000.0), ("0x3", 30_000.0)]);
        let rankings = vec![
            // 0x1 has no token B, so 0x2 is primary; totals span all addresses.
            entry(10, 1, &["0x1", "0x2"]),
            entry(20, 2, &["0x3"]),
            // Holds nothing eligible; skipped and not counted in N.
            entry(30, 3, &["0x9"]),
        ];
        let rows = build_allocations(&rankings, &a, &b, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fid, 10);
        assert_eq!(rows[0].primary_address, "0x2");
        assert_eq!(rows[0].total_balance_a, 3.0);
        assert_eq!(rows[0].total_balance_b, 20_000.0);
        assert_eq!(rows[0].amount, 7);
        assert_eq!(rows[1].fid, 20);
        assert_eq!(rows[1].amount, 3);
    }

    #[test]
    fn shared_addresses_are_counted_for_each_identity() {
        let a = holders(&[("0xs", 1.0)]);
        let b = holders(&[("0xs", 50_000.0)]);
        let rankings = vec![entry(1, 1, &["0xs"]), entry(2, 2, &["0xs"])];
        let rows = build_allocations(&rankings, &a, &b, 100).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].total_balance_b, 50_000.0);
        assert_eq!(rows[1].total_balance_b, 50_000.0);
    }

    #[test]
    fn build_is_deterministic_and_keeps_order() {
        let a = holders(&[("0x1", 1.0), ("0x2", 1.0), ("0x3", 1.0)]);
        let b = holders(&[("0x1", 1.0), ("0x2", 1.0), ("0x3", 1.0)]);
        // Provider order is authoritative even if ranks look unsorted.
        let rankings = vec![entry(3, 5, &["0x3"]), entry(1, 1, &["0x1"]), entry(2, 2, &["0x2"])];
        let first = build_allocations(&rankings, &a, &b, 100).unwrap();
        let second = build_allocations(&rankings, &a, &b, 100).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|r| r.fid).collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    struct PagedRankings {
        pages: Vec<RankingPage>,
        calls: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl RankingSource for PagedRankings {
        async fn rankings_page(
            &self,
            _filter: &[String],
            cursor: Option<&str>,
        ) -> Result<RankingPage, EngineError> {
            let mut calls = self.calls.lock().unwrap();
            let idx = calls.len();
            calls.push(cursor.map(str::to_string));
            Ok(self.pages[idx].clone())
        }
    }

    #[tokio::test]
    async fn fetch_rankings_drains_all_pages() {
        let source = PagedRankings {
            pages: vec![
                RankingPage {
                    entries: vec![entry(1, 1, &["0x1"])],
                    next_cursor: Some("c1".into()),
                    has_next_page: true,
                },
                RankingPage {
                    entries: vec![entry(2, 2, &["0x2"])],
                    next_cursor: None,
                    has_next_page: false,
                },
            ],
            calls: Mutex::new(vec![]),
        };
        let rankings = fetch_rankings(&source, &["0x1".into()]).await.unwrap();
        assert_eq!(rankings.len(), 2);
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![None, Some("c1".to_string())]
        );
    }

    #[tokio::test]
    async fn fetch_rankings_rejects_stuck_cursor() {
        let stuck = RankingPage {
            entries: vec![],
            next_cursor: Some("same".into()),
            has_next_page: true,
        };
        let source = PagedRankings {
            pages: vec![stuck.clone(), stuck],
            calls: Mutex::new(vec![]),
        };
        let err = fetch_rankings(&source, &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider { .. }));
    }
}
