// Customer LTV - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod event;
pub mod loader;
pub mod aggregator;     // Phase 1: fold events into per-customer summaries
pub mod ranker;         // Phase 2: score + top-K
pub mod pipeline;
pub mod report;
pub mod config;
pub mod cli;

// Re-export commonly used types
pub use error::{LtvError, Result};
pub use event::{
    Event, EventKind, RawEvent,
    parse_amount, parse_event_time,
};
pub use loader::{
    EventBatch, InputFormat,
    load_events, load_events_as, parse_csv_events, parse_json_events, compute_digest,
};
pub use aggregator::{
    Aggregator, CustomerSummary, IngestPolicy, IngestStats,
    aggregate, validate_all,
};
pub use ranker::{
    LtvScore, RankedCustomer, Ranker, Ranking, IncompletePolicy,
    score, select_top_k, top_customers, week_count,
    DEFAULT_TOP_K, HORIZON_YEARS, WEEKS_PER_YEAR,
};
pub use pipeline::{PipelineOptions, PipelineOutput};
pub use report::{OutputFormat, RankingReport, ReportEntry, text_line};
pub use config::RankingConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
