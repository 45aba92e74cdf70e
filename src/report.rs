// 📝 Ranking Report - Serialize top-K results
// Text lines (`Customer ID: <id>, LTV: <ltv>`), JSON, or CSV

use crate::aggregator::IngestStats;
use crate::error::{LtvError, Result};
use crate::ranker::{RankedCustomer, Ranking};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = LtvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(LtvError::Config(format!("unknown output format: {}", other))),
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// ReportEntry - one ranked customer, flat so it fits a CSV row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub rank: usize,
    pub customer_id: String,
    pub ltv: f64,
    pub avg_expenditure_per_visit: f64,
    pub week_count: u64,
    pub avg_weekly_visits: f64,
    pub avg_weekly_expenditure: f64,
}

impl ReportEntry {
    pub fn from_ranked(rank: usize, ranked: &RankedCustomer) -> Self {
        ReportEntry {
            rank,
            customer_id: ranked.customer_id.clone(),
            ltv: ranked.ltv,
            avg_expenditure_per_visit: ranked.score.avg_expenditure_per_visit,
            week_count: ranked.score.week_count,
            avg_weekly_visits: ranked.score.avg_weekly_visits,
            avg_weekly_expenditure: ranked.score.avg_weekly_expenditure,
        }
    }
}

/// RankingReport - one run's result with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingReport {
    /// Unique per run
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,

    /// SHA-256 of the input file; equal digests mean equal inputs
    pub input_digest: String,

    pub top_k: usize,
    pub ingest: IngestStats,
    pub eligible_customers: usize,
    pub excluded_customers: usize,
    pub entries: Vec<ReportEntry>,
}

impl RankingReport {
    pub fn new(
        source: &str,
        input_digest: &str,
        top_k: usize,
        ingest: IngestStats,
        ranking: &Ranking,
    ) -> Self {
        let entries = ranking
            .entries
            .iter()
            .enumerate()
            .map(|(i, r)| ReportEntry::from_ranked(i + 1, r))
            .collect();

        RankingReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            source: source.to_string(),
            input_digest: input_digest.to_string(),
            top_k,
            ingest,
            eligible_customers: ranking.eligible,
            excluded_customers: ranking.excluded.len(),
            entries,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} | {} eligible, {} excluded | top {} of {}",
            self.ingest.summary(),
            self.eligible_customers,
            self.excluded_customers,
            self.entries.len(),
            self.top_k
        )
    }

    pub fn write(&self, format: OutputFormat, out: &mut impl Write) -> Result<()> {
        match format {
            OutputFormat::Text => {
                for entry in &self.entries {
                    writeln!(out, "{}", text_line(&entry.customer_id, entry.ltv))?;
                }
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, self)?;
                writeln!(out)?;
            }
            OutputFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(&mut *out);
                for entry in &self.entries {
                    wtr.serialize(entry)?;
                }
                wtr.flush()?;
            }
        }
        Ok(())
    }

    pub fn write_to_file(&self, path: &Path, format: OutputFormat) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write(format, &mut out)?;
        out.flush()?;
        Ok(())
    }
}

/// `Customer ID: <id>, LTV: <ltv>`
pub fn text_line(customer_id: &str, ltv: f64) -> String {
    format!("Customer ID: {}, LTV: {}", customer_id, format_ltv(ltv))
}

/// Shortest round-trip decimal, `26000.0` for whole numbers
///
/// Debug formatting picks the same digits and the same switch to exponent
/// form (>= 1e16, < 1e-4); exponents are written signed with at least two
/// digits (`1e+16`, `2.5e-05`).
fn format_ltv(ltv: f64) -> String {
    let repr = format!("{:?}", ltv);
    let Some((mantissa, exponent)) = repr.split_once('e') else {
        return repr;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{}e{}{:0>2}", mantissa, sign, digits)
}

// ============================================================================
// TESTS
// ============================================================================
