// 🏆 Ranker - Simple LTV score per customer + top-K selection
//
// ltv = (spending / visits) * (visits / weeks) * 52 * 10
//
// Ordering contract: ltv descending, then customer id ascending.

use crate::aggregator::{Aggregator, CustomerSummary};
use crate::error::{LtvError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::debug;

pub const WEEKS_PER_YEAR: f64 = 52.0;
pub const HORIZON_YEARS: f64 = 10.0;
pub const DEFAULT_TOP_K: usize = 10;

const SECONDS_PER_WEEK: i64 = 7 * 24 * 60 * 60;

// ============================================================================
// SCORE
// ============================================================================

/// LtvScore - every intermediate of the LTV derivation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LtvScore {
    pub avg_expenditure_per_visit: f64,
    pub week_count: u64,
    pub avg_weekly_visits: f64,
    pub avg_weekly_expenditure: f64,
    pub ltv: f64,
}

/// Occurrences of a weekly schedule starting at `entry`, bounded by `exit`
///
/// The schedule starts on `entry` truncated to whole seconds, so sub-second
/// parts of the entry time never push `exit` below a week boundary. That
/// start is week 0, so equal timestamps give 1. Returns 0 when `exit`
/// precedes the start.
pub fn week_count(entry: DateTime<Utc>, exit: DateTime<Utc>) -> u64 {
    let start = entry.trunc_subsecs(0);
    if exit < start {
        return 0;
    }
    let span = exit.signed_duration_since(start).num_seconds();
    (span / SECONDS_PER_WEEK) as u64 + 1
}

/// Score one customer
///
/// Zero visits gives expenditure-per-visit 0 (and so ltv 0). Missing entry
/// time or a zero week count is `IncompleteCustomer`.
pub fn score(customer_id: &str, summary: &CustomerSummary) -> Result<LtvScore> {
    let (entry, exit) = match (summary.entry_time, summary.exit_time) {
        (Some(entry), Some(exit)) => (entry, exit),
        _ => return Err(LtvError::incomplete(customer_id)),
    };

    let weeks = week_count(entry, exit);
    if weeks == 0 {
        return Err(LtvError::incomplete(customer_id));
    }

    let visits = summary.visit_count as f64;
    let avg_expenditure_per_visit = if summary.visit_count > 0 {
        summary.total_spending / visits
    } else {
        0.0
    };
    let avg_weekly_visits = visits / weeks as f64;
    let avg_weekly_expenditure = avg_expenditure_per_visit * avg_weekly_visits;

    Ok(LtvScore {
        avg_expenditure_per_visit,
        week_count: weeks,
        avg_weekly_visits,
        avg_weekly_expenditure,
        ltv: avg_weekly_expenditure * WEEKS_PER_YEAR * HORIZON_YEARS,
    })
}

// ============================================================================
// RANKED CUSTOMER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCustomer {
    pub customer_id: String,
    pub ltv: f64,
    pub score: LtvScore,
}

impl RankedCustomer {
    pub fn new(customer_id: &str, score: LtvScore) -> Self {
        RankedCustomer {
            customer_id: customer_id.to_string(),
            ltv: score.ltv,
            score,
        }
    }

    /// Rank order: `Less` means `self` ranks ahead of `other`
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .ltv
            .total_cmp(&self.ltv)
            .then_with(|| self.customer_id.cmp(&other.customer_id))
    }
}

/// Heap key: greater means ranks better
struct Candidate(RankedCustomer);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.rank_cmp(&self.0)
    }
}

/// Keep the `k` best candidates with a bounded min-heap, O(n log k)
pub fn select_top_k<I>(candidates: I, k: usize) -> Vec<RankedCustomer>
where
    I: IntoIterator<Item = RankedCustomer>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
    for candidate in candidates {
        heap.push(Reverse(Candidate(candidate)));
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut top: Vec<RankedCustomer> = heap.into_iter().map(|Reverse(c)| c.0).collect();
    top.sort_by(|a, b| a.rank_cmp(b));
    top
}

// ============================================================================
// RANKER
// ============================================================================

/// What to do with customers that never had a CUSTOMER event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompletePolicy {
    /// Leave them out of the ranking
    #[default]
    Exclude,

    /// Fail the ranking with `IncompleteCustomer`
    Fail,
}

/// Ranking - selected entries plus bookkeeping for reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub entries: Vec<RankedCustomer>,

    /// Customers that had a score
    pub eligible: usize,

    /// Customers left out for lack of an entry time, sorted
    pub excluded: Vec<String>,
}

impl Ranking {
    /// The `(customer_id, ltv)` pairs in rank order
    pub fn pairs(&self) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .map(|r| (r.customer_id.clone(), r.ltv))
            .collect()
    }
}

pub struct Ranker<'a> {
    aggregator: &'a Aggregator,
    policy: IncompletePolicy,
}

impl<'a> Ranker<'a> {
    pub fn new(aggregator: &'a Aggregator) -> Self {
        Ranker {
            aggregator,
            policy: IncompletePolicy::default(),
        }
    }

    /// Builder pattern: set incomplete-customer policy
    pub fn with_policy(mut self, policy: IncompletePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Score everyone, then keep the best `k` (all when `None`)
    pub fn rank(&self, k: Option<usize>) -> Result<Ranking> {
        let mut scored = Vec::with_capacity(self.aggregator.len());
        let mut excluded = Vec::new();

        for (id, summary) in self.aggregator.summaries() {
            match score(id, summary) {
                Ok(s) => scored.push(RankedCustomer::new(id, s)),
                Err(LtvError::IncompleteCustomer { customer_id }) => {
                    debug!(customer_id = %customer_id, "customer has no entry time");
                    excluded.push(customer_id);
                }
                Err(other) => return Err(other),
            }
        }

        excluded.sort();
        if self.policy == IncompletePolicy::Fail {
            if let Some(first) = excluded.first() {
                return Err(LtvError::incomplete(first));
            }
        }

        let eligible = scored.len();
        let entries = match k {
            Some(k) => select_top_k(scored, k),
            None => {
                scored.sort_by(|a, b| a.rank_cmp(b));
                scored
            }
        };

        Ok(Ranking {
            entries,
            eligible,
            excluded,
        })
    }

    /// The `k` highest-ltv customers, descending
    pub fn top_k(&self, k: usize) -> Result<Vec<RankedCustomer>> {
        Ok(self.rank(Some(k))?.entries)
    }

    /// Every eligible customer, descending
    pub fn rank_all(&self) -> Result<Vec<RankedCustomer>> {
        Ok(self.rank(None)?.entries)
    }
}

/// Top `k` `(customer_id, ltv)` pairs with the default policy
pub fn top_customers(aggregator: &Aggregator, k: usize) -> Result<Vec<(String, f64)>> {
    Ok(Ranker::new(aggregator).rank(Some(k))?.pairs())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{aggregate, IngestPolicy};
    use crate::event::{parse_event_time, RawEvent};
    use std::collections::HashMap;

    fn t(s: &str) -> DateTime<Utc> {
        parse_event_time(s).unwrap()
    }

    /// Complete summary with one visit spanning a single week
    fn summary_with_ltv(ltv_over_520: f64) -> CustomerSummary {
        CustomerSummary {
            visit_count: 1,
            total_spending: ltv_over_520,
            entry_time: Some(t("2024-01-01")),
            exit_time: Some(t("2024-01-01")),
            ..Default::default()
        }
    }

    fn table(rows: Vec<(&str, CustomerSummary)>) -> Aggregator {
        let map: HashMap<String, CustomerSummary> =
            rows.into_iter().map(|(id, s)| (id.to_string(), s)).collect();
        Aggregator::from(map)
    }

    #[test]
    fn test_week_count() {
        assert_eq!(week_count(t("2024-01-01"), t("2024-01-01")), 1);
        assert_eq!(week_count(t("2024-01-01"), t("2024-01-07T23:59:59")), 1);
        assert_eq!(week_count(t("2024-01-01"), t("2024-01-08")), 2);
        assert_eq!(week_count(t("2024-01-01"), t("2024-01-15")), 3);
        assert_eq!(week_count(t("2024-01-01"), t("2024-12-30")), 53);
        assert_eq!(week_count(t("2024-01-08"), t("2024-01-01")), 0);
    }

    #[test]
    fn test_week_count_drops_entry_subseconds() {
        let entry = t("2017-01-06T12:46:46.384Z");

        assert_eq!(week_count(entry, t("2017-01-13T12:46:46.200Z")), 2);
        assert_eq!(week_count(entry, t("2017-01-13T12:46:45.999Z")), 1);
        assert_eq!(week_count(entry, entry), 1);
    }

    #[test]
    fn test_customer_a_scenario() {
        let events = vec![
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "A", "2024-01-08"),
            RawEvent::new("ORDER", "A", "2024-01-08").with_amount("100 USD"),
        ];
        let (agg, _) = aggregate(&events, IngestPolicy::Abort).unwrap();

        let s = score("A", agg.get("A").unwrap()).unwrap();
        assert_eq!(s.week_count, 2);
        assert_eq!(s.avg_expenditure_per_visit, 50.0);
        assert_eq!(s.avg_weekly_visits, 1.0);
        assert_eq!(s.avg_weekly_expenditure, 50.0);
        assert_eq!(s.ltv, 26000.0);

        let top = top_customers(&agg, 10).unwrap();
        assert_eq!(top, vec![("A".to_string(), 26000.0)]);
    }

    #[test]
    fn test_zero_visits_scores_zero() {
        let summary = CustomerSummary {
            total_spending: 250.0,
            entry_time: Some(t("2024-01-01")),
            exit_time: Some(t("2024-03-01")),
            ..Default::default()
        };

        let s = score("C", &summary).unwrap();
        assert_eq!(s.avg_expenditure_per_visit, 0.0);
        assert_eq!(s.ltv, 0.0);
    }

    #[test]
    fn test_missing_entry_time_is_incomplete() {
        let summary = CustomerSummary {
            visit_count: 3,
            exit_time: Some(t("2024-01-01")),
            ..Default::default()
        };
        assert!(score("B", &summary).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_exit_before_entry_is_incomplete() {
        let summary = CustomerSummary {
            visit_count: 1,
            entry_time: Some(t("2024-02-01")),
            exit_time: Some(t("2024-01-01")),
            ..Default::default()
        };
        assert!(score("X", &summary).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_customer_without_entry_is_excluded_by_default() {
        let events = vec![
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "B", "2024-01-02"),
            RawEvent::new("SITE_VISIT", "B", "2024-01-03"),
        ];
        let (agg, _) = aggregate(&events, IngestPolicy::Abort).unwrap();

        let ranking = Ranker::new(&agg).rank(Some(10)).unwrap();
        assert_eq!(ranking.entries.len(), 1);
        assert_eq!(ranking.entries[0].customer_id, "A");
        assert_eq!(ranking.eligible, 1);
        assert_eq!(ranking.excluded, vec!["B".to_string()]);
    }

    #[test]
    fn test_customer_without_entry_fails_under_fail_policy() {
        let events = vec![
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "C", "2024-01-02"),
            RawEvent::new("SITE_VISIT", "B", "2024-01-02"),
        ];
        let (agg, _) = aggregate(&events, IngestPolicy::Abort).unwrap();

        let err = Ranker::new(&agg)
            .with_policy(IncompletePolicy::Fail)
            .top_k(10)
            .unwrap_err();

        match err {
            LtvError::IncompleteCustomer { customer_id } => assert_eq!(customer_id, "B"),
            other => panic!("expected incomplete customer, got {:?}", other),
        }
    }

    #[test]
    fn test_top_1_of_two() {
        let agg = table(vec![
            ("low", summary_with_ltv(100.0 / 520.0)),
            ("high", summary_with_ltv(200.0 / 520.0)),
        ]);

        let top = Ranker::new(&agg).top_k(1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].customer_id, "high");
        assert!((top[0].ltv - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_zero_is_empty() {
        let agg = table(vec![("a", summary_with_ltv(1.0))]);
        assert!(Ranker::new(&agg).top_k(0).unwrap().is_empty());
    }

    #[test]
    fn test_large_k_returns_all_sorted() {
        let agg = table(vec![
            ("a", summary_with_ltv(3.0)),
            ("b", summary_with_ltv(1.0)),
            ("c", summary_with_ltv(2.0)),
        ]);

        let top = Ranker::new(&agg).top_k(50).unwrap();
        let ids: Vec<&str> = top.iter().map(|r| r.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(top, Ranker::new(&agg).rank_all().unwrap());
    }

    #[test]
    fn test_ties_break_by_id_ascending() {
        let agg = table(vec![
            ("delta", summary_with_ltv(5.0)),
            ("alpha", summary_with_ltv(5.0)),
            ("charlie", summary_with_ltv(5.0)),
            ("bravo", summary_with_ltv(9.0)),
        ]);

        let top = Ranker::new(&agg).top_k(3).unwrap();
        let ids: Vec<&str> = top.iter().map(|r| r.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["bravo", "alpha", "charlie"]);
    }

    #[test]
    fn test_heap_selection_matches_full_sort() {
        let rows: Vec<(String, CustomerSummary)> = (0..40)
            .map(|i| (format!("c{:02}", i), summary_with_ltv(((i * 7) % 13) as f64)))
            .collect();
        let agg = Aggregator::from(rows.into_iter().collect::<HashMap<_, _>>());
        let ranker = Ranker::new(&agg);

        let all = ranker.rank_all().unwrap();
        for k in [1, 5, 13, 39, 40] {
            assert_eq!(ranker.top_k(k).unwrap(), all[..k].to_vec());
        }
    }

    #[test]
    fn test_more_spending_never_lowers_ltv() {
        let base = CustomerSummary {
            visit_count: 4,
            total_spending: 80.0,
            entry_time: Some(t("2024-01-01")),
            exit_time: Some(t("2024-02-20")),
            ..Default::default()
        };
        let mut richer = base.clone();
        richer.total_spending = 120.0;

        assert!(score("x", &richer).unwrap().ltv >= score("x", &base).unwrap().ltv);
    }
}
