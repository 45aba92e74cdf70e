// Customer LTV - Web Server
// Read-only REST API over a ranking computed once at startup

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use customer_ltv::cli::InputArgs;
use customer_ltv::{
    load_events, pipeline, CustomerSummary, IngestStats, LtvScore, PipelineOptions,
    PipelineOutput, RankedCustomer, RankingConfig,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Serve the LTV ranking of an event file over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ServerArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Optional TOML config; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address [default: 0.0.0.0:3000]
    #[arg(short, long)]
    addr: Option<String>,
}

/// Shared application state; immutable after startup
#[derive(Clone)]
struct AppState {
    output: Arc<PipelineOutput>,
    source: Arc<str>,
    digest: Arc<str>,
    default_k: usize,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn api_error(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct RankedResponse {
    rank: usize,
    customer_id: String,
    ltv: f64,
}

#[derive(Serialize)]
struct StatsResponse {
    source: String,
    input_digest: String,
    ingest: IngestStats,
    eligible_customers: usize,
    excluded_customers: usize,
}

#[derive(Serialize)]
struct CustomerResponse {
    customer_id: String,
    summary: CustomerSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<LtvScore>,
}

#[derive(Deserialize)]
struct TopQuery {
    k: Option<usize>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/top?k=N - Top N customers by LTV
async fn get_top(State(state): State<AppState>, Query(query): Query<TopQuery>) -> Response {
    let k = query.k.unwrap_or(state.default_k);

    let response: Vec<RankedResponse> = state
        .output
        .ranking
        .entries
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, r)| RankedResponse {
            rank: i + 1,
            customer_id: r.customer_id.clone(),
            ltv: r.ltv,
        })
        .collect();

    ApiResponse::ok(response)
}

/// GET /api/stats - Ingestion and ranking statistics
async fn get_stats(State(state): State<AppState>) -> Response {
    let output = &state.output;
    ApiResponse::ok(StatsResponse {
        source: state.source.to_string(),
        input_digest: state.digest.to_string(),
        ingest: output.stats,
        eligible_customers: output.ranking.eligible,
        excluded_customers: output.ranking.excluded.len(),
    })
}

/// GET /api/excluded - Customers without an entry time
async fn get_excluded(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.output.ranking.excluded.clone())
}

/// GET /api/customers/:id - Summary and score for one customer
async fn get_customer(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(summary) = state.output.aggregator.get(&id) else {
        return api_error(StatusCode::NOT_FOUND, format!("customer {} not found", id));
    };

    let ranked: Option<(usize, &RankedCustomer)> = state
        .output
        .ranking
        .entries
        .iter()
        .enumerate()
        .find(|(_, r)| r.customer_id == id);

    ApiResponse::ok(CustomerResponse {
        customer_id: id.clone(),
        summary: summary.clone(),
        rank: ranked.map(|(i, _)| i + 1),
        score: ranked.map(|(_, r)| r.score),
    })
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/top", get(get_top))
        .route("/stats", get(get_stats))
        .route("/excluded", get(get_excluded))
        .route("/customers/:id", get(get_customer))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = ServerArgs::parse();
    let mut config = RankingConfig::load(args.config.as_deref())?;
    args.input.apply(&mut config);
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    let batch = load_events(&args.input.input)
        .with_context(|| format!("Failed to load events from {}", args.input.input.display()))?;

    // Rank everyone once; /api/top slices the result
    let options = PipelineOptions {
        top_k: None,
        ..PipelineOptions::from(&config)
    };
    let output = pipeline::run(&batch.events, &options).context("Ranking failed")?;

    let state = AppState {
        output: Arc::new(output),
        source: batch.source.as_str().into(),
        digest: batch.digest.as_str().into(),
        default_k: config.ranking.top_k,
    };

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.addr))?;

    info!(addr = %config.server.addr, source = %batch.source, "server listening");
    println!("\n🚀 Server running on http://{}", config.server.addr);
    println!("   API: http://{}/api/top", config.server.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, build_router(state))
        .await
        .context("Server error")?;

    Ok(())
}
