//! Tip validation against daily allocation budgets.
//!
//! Tips are synced newest-first, but budgets are spent oldest-first, so
//! validation only runs after a complete sync pass. Within each
//! (sender, allocation date) group tips are replayed in chronological order:
//! a tip is valid if the sender's allocation still covers it after every
//! earlier valid tip of that day.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::store::TipStore;
use crate::types::{Fid, Tip};

/// Outcome of a validation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Tips that were undecided before the pass.
    pub examined: usize,
    pub valid: usize,
    pub invalid: usize,
}

/// A validity decision for one tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipDecision {
    pub cast_hash: String,
    pub is_valid: bool,
}

/// Budget per (sender, date). Missing entries mean a budget of zero.
pub type Budgets = HashMap<(Fid, NaiveDate), u64>;

/// Decide validity for every undecided tip in `tips`.
///
/// `tips` must contain *all* tips of each (sender, date) group that has an
/// undecided tip, so earlier valid tips are charged against the budget.
/// Already-decided tips keep their flag.
pub fn reconcile(tips: &[Tip], budgets: &Budgets) -> (Vec<TipDecision>, ValidationReport) {
    let mut groups: BTreeMap<(Fid, NaiveDate), Vec<&Tip>> = BTreeMap::new();
    for tip in tips {
        groups
            .entry((tip.from_fid, tip.allocation_date))
            .or_default()
            .push(tip);
    }

    let mut decisions = Vec::new();
    let mut report = ValidationReport::default();

    for (key, mut group) in groups {
        if group.iter().all(|t| t.is_valid.is_some()) {
            continue;
        }
        group.sort_by(|a, b| {
            a.casted_at
                .cmp(&b.casted_at)
                .then_with(|| a.cast_hash.cmp(&b.cast_hash))
        });

        let budget = budgets.get(&key).copied().unwrap_or(0);
        let mut spent: u64 = 0;
        for tip in group {
            let valid = match tip.is_valid {
                Some(decided) => decided,
                None => {
                    let valid = spent.saturating_add(tip.amount) <= budget;
                    report.examined += 1;
                    if valid {
                        report.valid += 1;
                    } else {
                        report.invalid += 1;
                    }
                    decisions.push(TipDecision {
                        cast_hash: tip.cast_hash.clone(),
                        is_valid: valid,
                    });
                    valid
                }
            };
            if valid {
                spent = spent.saturating_add(tip.amount);
            }
        }
    }

    (decisions, report)
}

/// Run the validator over the store. Safe to call repeatedly.
pub async fn validate_tips<S: TipStore + ?Sized>(store: &S) -> Result<ValidationReport, EngineError> {
    let report = store.mark_tips_valid().await?;
    tracing::info!(
        examined = report.examined,
        valid = report.valid,
        invalid = report.invalid,
        "Tip validation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn tip(hash: &str, from: Fid, amount: u64, minute: u32, is_valid: Option<bool>) -> Tip {
        Tip {
            from_fid: from,
            from_username: None,
            from_display_name: None,
            from_pfp_url: None,
            to_fid: 99,
            to_username: None,
            to_display_name: None,
            to_pfp_url: None,
            amount,
            cast_hash: hash.into(),
            cast_text: String::new(),
            casted_at: Utc.with_ymd_and_hms(2024, 7, 1, 12, minute, 0).unwrap(),
            allocation_date: day(),
            is_valid,
        }
    }

    fn verdict(decisions: &[TipDecision], hash: &str) -> bool {
        decisions.iter().find(|d| d.cast_hash == hash).unwrap().is_valid
    }

    #[test]
    fn cumulative_budget_in_chronological_order() {
        let budgets = Budgets::from([((1, day()), 100)]);
        // Supplied newest-first, as the sync engine stores them.
        let tips = vec![
            tip("c", 1, 30, 30, None),
            tip("b", 1, 50, 20, None),
            tip("a", 1, 40, 10, None),
        ];
        let (decisions, report) = reconcile(&tips, &budgets);
        assert!(verdict(&decisions, "a")); // 40
        assert!(verdict(&decisions, "b")); // 90
        assert!(!verdict(&decisions, "c")); // 120 > 100
        assert_eq!(report, ValidationReport { examined: 3, valid: 2, invalid: 1 });
    }

    #[test]
    fn invalid_tips_do_not_consume_budget() {
        let budgets = Budgets::from([((1, day()), 50)]);
        let tips = vec![
            tip("a", 1, 60, 1, None),
            tip("b", 1, 50, 2, None),
        ];
        let (decisions, _) = reconcile(&tips, &budgets);
        assert!(!verdict(&decisions, "a"));
        assert!(verdict(&decisions, "b"));
    }

    #[test]
    fn decided_tips_keep_flag_and_count() {
        let budgets = Budgets::from([((1, day()), 100)]);
        let tips = vec![
            tip("a", 1, 80, 1, Some(true)),
            tip("b", 1, 30, 2, None),
        ];
        let (decisions, report) = reconcile(&tips, &budgets);
        assert_eq!(decisions.len(), 1);
        assert!(!verdict(&decisions, "b"));
        assert_eq!(report.examined, 1);
    }

    #[test]
    fn missing_allocation_means_zero_budget() {
        let (decisions, _) = reconcile(&[tip("a", 5, 1, 0, None)], &Budgets::new());
        assert!(!verdict(&decisions, "a"));
    }

    #[test]
    fn rerun_is_noop() {
        let budgets = Budgets::from([((1, day()), 100)]);
        let tips = vec![tip("a", 1, 10, 1, Some(true)), tip("b", 1, 10, 2, Some(false))];
        let (decisions, report) = reconcile(&tips, &budgets);
        assert!(decisions.is_empty());
        assert_eq!(report, ValidationReport::default());
    }
}
