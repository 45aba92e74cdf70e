// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use customer_ltv::cli::{Args, CheckArgs, Command, RankArgs, ViewArgs};
use customer_ltv::{aggregate, load_events, pipeline, PipelineOptions, RankingConfig};
use std::path::Path;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = RankingConfig::load(args.config.as_deref())?;

    match args.command() {
        Command::Rank(rank) => run_rank(&rank, &mut config),
        Command::Check(check) => run_check(&check, &mut config),
        Command::View(view) => run_view(&view, &mut config),
    }
}

fn run_rank(rank: &RankArgs, config: &mut RankingConfig) -> Result<()> {
    rank.apply(config);

    println!("📂 Loading events from {}...", rank.input.input.display());
    let batch = load_events(&rank.input.input)
        .with_context(|| format!("Failed to load events from {}", rank.input.input.display()))?;
    println!("✓ Loaded {} events ({})", batch.len(), batch.format.name());

    let options = PipelineOptions::from(&*config);
    let (_, report) = pipeline::run_batch(&batch, &options).context("Ranking failed")?;
    println!("✓ {}", report.summary());

    let output_path = Path::new(&config.output.path);
    report
        .write_to_file(output_path, config.output.format)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    info!(
        run_id = %report.run_id,
        output = %output_path.display(),
        entries = report.entries.len(),
        "report written"
    );
    println!("💾 Top {} customers written to {}", report.entries.len(), output_path.display());

    Ok(())
}

fn run_check(check: &CheckArgs, config: &mut RankingConfig) -> Result<()> {
    check.apply(config);

    let batch = load_events(&check.input)
        .with_context(|| format!("Failed to load events from {}", check.input.display()))?;

    let (_, stats) =
        aggregate(&batch.events, config.ingest.on_malformed).context("Validation failed")?;
    if stats.skipped > 0 {
        println!("⚠️  {} of {} events are malformed", stats.skipped, batch.len());
    } else {
        println!("✓ All {} events are well-formed", batch.len());
    }
    println!("  {}", stats.summary());
    println!("  sha256: {}", batch.digest);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_view(view: &ViewArgs, config: &mut RankingConfig) -> Result<()> {
    view.input.apply(config);

    let batch = load_events(&view.input.input)
        .with_context(|| format!("Failed to load events from {}", view.input.input.display()))?;

    let options = PipelineOptions {
        top_k: view.top,
        ..PipelineOptions::from(&*config)
    };
    let output = pipeline::run(&batch.events, &options).context("Ranking failed")?;

    let mut app = ui::App::new(output, &batch.source);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_view(_view: &ViewArgs, _config: &mut RankingConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: customer-ltv rank --format json");
    std::process::exit(1);
}
