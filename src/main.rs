//! News Consensus Service, Binary Entrypoint.
//! Boots the Axum HTTP server, wiring the aggregation pipeline, quote cache,
//! shared rate limiter, and the Prometheus exporter.

use news_consensus_analyzer::metrics::Metrics;
use news_consensus_analyzer::{api, build_state, PipelineConfig};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - PIPELINE_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("PIPELINE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pipeline=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This lets the
    // provider endpoint vars and PIPELINE_CONFIG_PATH come from .env.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let cfg = PipelineConfig::load_default();

    // Prometheus recorder must be installed before the first counter fires.
    let metrics = Metrics::init(cfg.quote_ttl_secs, cfg.quote_bucket_secs);

    let state = build_state(&cfg);
    let router = api::create_router(state).merge(metrics.router());

    Ok(router.into())
}
