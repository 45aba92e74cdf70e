// 📥 Aggregator - Fold events into per-customer summaries
// One owned table per run, keyed by customer identifier

use crate::error::{LtvError, Result};
use crate::event::{Event, RawEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

// ============================================================================
// CUSTOMER SUMMARY
// ============================================================================

/// CustomerSummary - running aggregate for one customer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub visit_count: u64,

    /// Tracked for reporting, not used in scoring
    pub image_count: u64,

    pub order_count: u64,

    /// Every event seen for this id, including ignored types
    pub event_count: u64,

    pub total_spending: f64,

    /// First CUSTOMER event wins; never overwritten
    pub entry_time: Option<DateTime<Utc>>,

    /// Running maximum over all event times
    pub exit_time: Option<DateTime<Utc>>,
}

impl CustomerSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one validated event to this summary
    pub fn apply(&mut self, event: &Event) {
        let t = event.event_time();
        self.event_count += 1;

        // Unset exit time compares as negative infinity
        self.exit_time = Some(match self.exit_time {
            Some(exit) if exit >= t => exit,
            _ => t,
        });

        match event {
            Event::Customer { .. } => {
                if self.entry_time.is_none() {
                    self.entry_time = Some(t);
                }
            }
            Event::SiteVisit { .. } => self.visit_count += 1,
            Event::Image { .. } => self.image_count += 1,
            Event::Order { amount, .. } => {
                self.order_count += 1;
                self.total_spending += amount;
            }
            Event::Other { tag, customer_id, .. } => {
                debug!(tag = %tag, customer_id = %customer_id, "ignoring unscored event type");
            }
        }
    }

    /// Both entry and exit time are known
    pub fn is_complete(&self) -> bool {
        self.entry_time.is_some() && self.exit_time.is_some()
    }
}

// ============================================================================
// INGEST POLICY
// ============================================================================

/// What to do when one event in a batch is malformed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPolicy {
    /// Stop at the first malformed event and return its error
    #[default]
    Abort,

    /// Log, count and continue with the next event
    Skip,
}

/// Outcome of a batch ingestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub ingested: usize,
    pub skipped: usize,
    pub customers: usize,
}

impl IngestStats {
    pub fn summary(&self) -> String {
        format!(
            "{} events ingested, {} skipped, {} customers",
            self.ingested, self.skipped, self.customers
        )
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Aggregator - owns the customer table for a single run
///
/// Not shared between threads; ingestion takes `&mut self`.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    customers: HashMap<String, CustomerSummary>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary for `customer_id`, created empty on first use
    pub fn get_or_create(&mut self, customer_id: &str) -> &mut CustomerSummary {
        self.customers
            .entry(customer_id.to_string())
            .or_default()
    }

    /// Ingest one validated event
    pub fn ingest_event(&mut self, event: &Event) {
        self.get_or_create(event.customer_id()).apply(event);
    }

    /// Validate and ingest one raw record
    ///
    /// A malformed record fails before the table is touched.
    pub fn ingest(&mut self, raw: &RawEvent) -> Result<()> {
        let event = Event::from_raw(raw)?;
        self.ingest_event(&event);
        Ok(())
    }

    /// Ingest a whole batch under the given policy
    ///
    /// With `IngestPolicy::Abort` the error carries the 0-based index of the
    /// failing record; events before it remain ingested.
    pub fn ingest_all<'a, I>(&mut self, events: I, policy: IngestPolicy) -> Result<IngestStats>
    where
        I: IntoIterator<Item = &'a RawEvent>,
    {
        let mut stats = IngestStats::default();

        for (index, raw) in events.into_iter().enumerate() {
            match self.ingest(raw) {
                Ok(()) => stats.ingested += 1,
                Err(err) if err.is_malformed() && policy == IngestPolicy::Skip => {
                    warn!(index, error = %err, "skipping malformed event");
                    stats.skipped += 1;
                }
                Err(err) => return Err(err.at_index(index)),
            }
        }

        stats.customers = self.customers.len();
        debug!(
            ingested = stats.ingested,
            skipped = stats.skipped,
            customers = stats.customers,
            "batch ingested"
        );
        Ok(stats)
    }

    pub fn get(&self, customer_id: &str) -> Option<&CustomerSummary> {
        self.customers.get(customer_id)
    }

    /// All (id, summary) pairs, in no particular order
    pub fn summaries(&self) -> impl Iterator<Item = (&str, &CustomerSummary)> {
        self.customers.iter().map(|(id, s)| (id.as_str(), s))
    }

    pub fn into_summaries(self) -> HashMap<String, CustomerSummary> {
        self.customers
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

impl From<HashMap<String, CustomerSummary>> for Aggregator {
    fn from(customers: HashMap<String, CustomerSummary>) -> Self {
        Aggregator { customers }
    }
}

/// Ingest a batch into a fresh aggregator
pub fn aggregate(events: &[RawEvent], policy: IngestPolicy) -> Result<(Aggregator, IngestStats)> {
    let mut aggregator = Aggregator::new();
    let stats = aggregator.ingest_all(events, policy)?;
    Ok((aggregator, stats))
}

/// Validate a batch without ingesting it; returns the first failure
pub fn validate_all(events: &[RawEvent]) -> Result<()> {
    for (index, raw) in events.iter().enumerate() {
        Event::from_raw(raw).map_err(|e: LtvError| e.at_index(index))?;
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event_time;

    fn t(s: &str) -> DateTime<Utc> {
        parse_event_time(s).unwrap()
    }

    fn customer_a_events() -> Vec<RawEvent> {
        vec![
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "A", "2024-01-08"),
            RawEvent::new("ORDER", "A", "2024-01-08").with_amount("100 USD"),
        ]
    }

    #[test]
    fn test_customer_a_summary() {
        let (agg, stats) = aggregate(&customer_a_events(), IngestPolicy::Abort).unwrap();

        assert_eq!(stats.ingested, 4);
        assert_eq!(stats.customers, 1);

        let a = agg.get("A").unwrap();
        assert_eq!(a.visit_count, 2);
        assert_eq!(a.image_count, 0);
        assert_eq!(a.order_count, 1);
        assert_eq!(a.event_count, 4);
        assert_eq!(a.total_spending, 100.0);
        assert_eq!(a.entry_time, Some(t("2024-01-01")));
        assert_eq!(a.exit_time, Some(t("2024-01-08")));
        assert!(a.is_complete());
    }

    #[test]
    fn test_padded_ids_are_distinct_customers() {
        let events = vec![
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("CUSTOMER", " A ", "2024-01-02"),
            RawEvent::new("SITE_VISIT", "A ", "2024-01-03"),
        ];

        let (agg, stats) = aggregate(&events, IngestPolicy::Abort).unwrap();

        assert_eq!(stats.customers, 3);
        assert_eq!(agg.get("A").unwrap().visit_count, 0);
        assert_eq!(agg.get(" A ").unwrap().entry_time, Some(t("2024-01-02")));
        assert_eq!(agg.get("A ").unwrap().visit_count, 1);
        assert!(agg.get("A ").unwrap().entry_time.is_none());
    }

    #[test]
    fn test_exit_time_is_max_regardless_of_order() {
        let events = vec![
            RawEvent::new("IMAGE", "A", "2024-03-01"),
            RawEvent::new("SITE_VISIT", "A", "2024-05-01"),
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("ORDER", "A", "2024-02-01").with_amount("5 USD"),
        ];

        let (agg, _) = aggregate(&events, IngestPolicy::Abort).unwrap();
        let a = agg.get("A").unwrap();

        assert_eq!(a.exit_time, Some(t("2024-05-01")));
        assert_eq!(a.entry_time, Some(t("2024-01-01")));
        assert_eq!(a.image_count, 1);
    }

    #[test]
    fn test_first_customer_event_wins() {
        let events = vec![
            RawEvent::new("CUSTOMER", "A", "2024-02-01"),
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
        ];

        let (agg, _) = aggregate(&events, IngestPolicy::Abort).unwrap();
        let a = agg.get("A").unwrap();

        assert_eq!(a.entry_time, Some(t("2024-02-01")));
        assert_eq!(a.exit_time, Some(t("2024-02-01")));
    }

    #[test]
    fn test_entry_time_independent_of_other_event_order() {
        let mut events = customer_a_events();
        let (forward, _) = aggregate(&events, IngestPolicy::Abort).unwrap();

        events.reverse();
        let (reversed, _) = aggregate(&events, IngestPolicy::Abort).unwrap();

        assert_eq!(forward.get("A"), reversed.get("A"));
    }

    #[test]
    fn test_unknown_type_touches_summary() {
        let events = vec![RawEvent::new("REFUND", "Z", "2024-04-04")];
        let (agg, stats) = aggregate(&events, IngestPolicy::Abort).unwrap();

        assert_eq!(stats.ingested, 1);
        let z = agg.get("Z").unwrap();
        assert_eq!(z.event_count, 1);
        assert_eq!(z.visit_count, 0);
        assert_eq!(z.exit_time, Some(t("2024-04-04")));
        assert_eq!(z.entry_time, None);
        assert!(!z.is_complete());
    }

    #[test]
    fn test_malformed_event_leaves_table_untouched() {
        let mut agg = Aggregator::new();
        let bad = RawEvent::new("ORDER", "A", "2024-01-01").with_amount("lots USD");

        assert!(agg.ingest(&bad).unwrap_err().is_malformed());
        assert!(agg.is_empty());
    }

    #[test]
    fn test_abort_policy_reports_index() {
        let events = vec![
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "A", "garbage"),
            RawEvent::new("SITE_VISIT", "A", "2024-01-02"),
        ];

        let mut agg = Aggregator::new();
        let err = agg.ingest_all(&events, IngestPolicy::Abort).unwrap_err();

        assert!(matches!(err, LtvError::MalformedEventAt { index: 1, .. }));
        // Events before the failure stay ingested
        assert_eq!(agg.get("A").unwrap().visit_count, 0);
        assert!(agg.get("A").unwrap().entry_time.is_some());
    }

    #[test]
    fn test_skip_policy_continues() {
        let events = vec![
            RawEvent::new("CUSTOMER", "A", "2024-01-01"),
            RawEvent::new("SITE_VISIT", "A", "garbage"),
            RawEvent::default(),
            RawEvent::new("SITE_VISIT", "A", "2024-01-02"),
        ];

        let (agg, stats) = aggregate(&events, IngestPolicy::Skip).unwrap();

        assert_eq!(stats.ingested, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.customers, 1);
        assert_eq!(agg.get("A").unwrap().visit_count, 1);
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let events = customer_a_events();

        let (first, _) = aggregate(&events, IngestPolicy::Abort).unwrap();
        let (second, _) = aggregate(&events, IngestPolicy::Abort).unwrap();

        assert_eq!(first.into_summaries(), second.into_summaries());
    }

    #[test]
    fn test_counts_match_event_types() {
        let mut events = vec![RawEvent::new("CUSTOMER", "B", "2024-01-01")];
        for day in 1..=5 {
            events.push(RawEvent::new("SITE_VISIT", "B", &format!("2024-01-0{}", day)));
        }
        for day in 1..=3 {
            events.push(RawEvent::new("IMAGE", "B", &format!("2024-01-0{}", day)));
        }

        let (agg, _) = aggregate(&events, IngestPolicy::Abort).unwrap();
        let b = agg.get("B").unwrap();

        assert_eq!(b.visit_count, 5);
        assert_eq!(b.image_count, 3);
        assert_eq!(b.event_count, 9);
    }

    #[test]
    fn test_validate_all() {
        assert!(validate_all(&customer_a_events()).is_ok());

        let mut events = customer_a_events();
        events.push(RawEvent::new("ORDER", "A", "2024-01-09"));
        let err = validate_all(&events).unwrap_err();
        assert!(matches!(err, LtvError::MalformedEventAt { index: 4, .. }));
    }
}
