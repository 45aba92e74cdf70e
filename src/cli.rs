//! Command-line interface definitions and argument parsing

use crate::aggregator::IngestPolicy;
use crate::config::RankingConfig;
use crate::ranker::IncompletePolicy;
use crate::report::OutputFormat;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Rank customers by simple lifetime value from an event log
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Optional TOML config; flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Compute the top-K ranking and write it out (default)
    Rank(RankArgs),

    /// Validate every event without ranking
    Check(CheckArgs),

    /// Browse the ranking in a terminal UI
    View(ViewArgs),
}

/// Input selection shared by every subcommand
#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct InputArgs {
    /// Event file: JSON array, or CSV when the extension is .csv
    #[arg(short, long, default_value = "input.txt")]
    pub input: PathBuf,

    /// Skip malformed events instead of aborting the batch
    #[arg(long)]
    pub skip_malformed: bool,

    /// Fail when a customer has no CUSTOMER event instead of leaving it out
    #[arg(long)]
    pub fail_on_incomplete: bool,
}

impl Default for InputArgs {
    fn default() -> Self {
        InputArgs {
            input: PathBuf::from("input.txt"),
            skip_malformed: false,
            fail_on_incomplete: false,
        }
    }
}

/// Validation only; ranking policies do not apply
#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct CheckArgs {
    /// Event file: JSON array, or CSV when the extension is .csv
    #[arg(short, long, default_value = "input.txt")]
    pub input: PathBuf,

    /// Count malformed events instead of stopping at the first one
    #[arg(long)]
    pub skip_malformed: bool,
}

#[derive(ClapArgs, Debug, Clone, Default, PartialEq)]
pub struct RankArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output file [default: output.txt]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of customers to report [default: 10]
    #[arg(short = 'k', long)]
    pub top: Option<usize>,

    /// Output format: text, json or csv [default: text]
    #[arg(short, long)]
    pub format: Option<OutputFormat>,
}

#[derive(ClapArgs, Debug, Clone, Default, PartialEq)]
pub struct ViewArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Number of customers to show [default: all]
    #[arg(short = 'k', long)]
    pub top: Option<usize>,
}

impl Args {
    /// Subcommand to run; bare invocation means `rank` with defaults
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Rank(RankArgs::default()))
    }
}

impl InputArgs {
    /// Fold flags into a config loaded from file
    pub fn apply(&self, config: &mut RankingConfig) {
        if self.skip_malformed {
            config.ingest.on_malformed = IngestPolicy::Skip;
        }
        if self.fail_on_incomplete {
            config.ranking.incomplete = IncompletePolicy::Fail;
        }
    }
}

impl CheckArgs {
    pub fn apply(&self, config: &mut RankingConfig) {
        if self.skip_malformed {
            config.ingest.on_malformed = IngestPolicy::Skip;
        }
    }
}

impl RankArgs {
    pub fn apply(&self, config: &mut RankingConfig) {
        self.input.apply(config);
        if let Some(top) = self.top {
            config.ranking.top_k = top;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(ref output) = self.output {
            config.output.path = output.display().to_string();
        }
    }
}
