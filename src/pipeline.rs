// 🔁 Pipeline - ingest everything, then rank
// Two phases, no overlap: the ranker only sees a finished table

use crate::aggregator::{Aggregator, IngestPolicy, IngestStats};
use crate::error::Result;
use crate::event::RawEvent;
use crate::loader::EventBatch;
use crate::ranker::{IncompletePolicy, Ranker, Ranking};
use crate::report::RankingReport;
use tracing::info;

/// Knobs for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// `None` ranks every eligible customer
    pub top_k: Option<usize>,
    pub ingest_policy: IngestPolicy,
    pub incomplete_policy: IncompletePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            top_k: Some(crate::ranker::DEFAULT_TOP_K),
            ingest_policy: IngestPolicy::default(),
            incomplete_policy: IncompletePolicy::default(),
        }
    }
}

impl From<&crate::config::RankingConfig> for PipelineOptions {
    fn from(config: &crate::config::RankingConfig) -> Self {
        PipelineOptions {
            top_k: Some(config.ranking.top_k),
            ingest_policy: config.ingest.on_malformed,
            incomplete_policy: config.ranking.incomplete,
        }
    }
}

/// Everything a run produced; the aggregator is kept for drill-down views
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub aggregator: Aggregator,
    pub stats: IngestStats,
    pub ranking: Ranking,
}

pub fn run(events: &[RawEvent], options: &PipelineOptions) -> Result<PipelineOutput> {
    let mut aggregator = Aggregator::new();
    let stats = aggregator.ingest_all(events, options.ingest_policy)?;
    info!(
        ingested = stats.ingested,
        skipped = stats.skipped,
        customers = stats.customers,
        "ingestion complete"
    );

    let ranking = Ranker::new(&aggregator)
        .with_policy(options.incomplete_policy)
        .rank(options.top_k)?;
    info!(
        eligible = ranking.eligible,
        excluded = ranking.excluded.len(),
        returned = ranking.entries.len(),
        "ranking complete"
    );

    Ok(PipelineOutput {
        aggregator,
        stats,
        ranking,
    })
}

/// Run over a loaded batch and wrap the result in a report
pub fn run_batch(batch: &EventBatch, options: &PipelineOptions) -> Result<(PipelineOutput, RankingReport)> {
    let output = run(&batch.events, options)?;
    let top_k = options.top_k.unwrap_or(output.ranking.eligible);
    let report = RankingReport::new(&batch.source, &batch.digest, top_k, output.stats, &output.ranking);
    Ok((output, report))
}
