// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod analyze;
pub mod api;
pub mod config;
pub mod consensus;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod persist;
pub mod pipeline;
pub mod quotes;
pub mod ratelimit;
pub mod rolling;

// ---- Re-exports for stable public API ----
pub use crate::analyze::types::{Direction, ModelOutput};
pub use crate::config::PipelineConfig;
pub use crate::consensus::{ConsensusConfig, ConsensusResult, RecommendedAction, SignalStrength};
pub use crate::ingest::types::{AggregatedNewsResult, NewsArticle, ProviderError, ProviderKind};
pub use crate::pipeline::{AnalysisPipeline, SymbolReport};

use std::sync::Arc;
use std::time::Duration;

use crate::analyze::narrative::build_backend_from_env;
use crate::analyze::DualModelAnalyzer;
use crate::history::History;
use crate::ingest::providers::financial_api::FinancialApiProvider;
use crate::ingest::providers::newswire_rss::NewswireRssProvider;
use crate::ingest::providers::pooled_cache::{ArticlePool, PooledCacheProvider};
use crate::ingest::providers::quote_headlines::QuoteHeadlinesProvider;
use crate::ingest::types::NewsProvider;
use crate::ingest::weekend::MemoryWeekendStore;
use crate::ingest::NewsAggregator;
use crate::persist::TracingErrorSink;
use crate::quotes::{HttpQuoteUpstream, MemoryQuoteStore, QuoteService};
use crate::ratelimit::WindowLimiter;
use crate::rolling::RollingWindow;

/// Wire the default component graph from config + environment.
///
/// HTTP providers are only registered when their endpoint env vars are set
/// (`FINANCIAL_API_URL`/`FINANCIAL_API_KEY`, `NEWSWIRE_RSS_URL`,
/// `QUOTE_API_URL`); the pooled cache is always first in priority order.
pub fn build_state(cfg: &PipelineConfig) -> api::AppState {
    let limiter = Arc::new(WindowLimiter::new(
        cfg.rate_limit_per_window,
        Duration::from_secs(cfg.rate_limit_window_secs),
    ));

    let pool = Arc::new(ArticlePool::new());
    let mut providers: Vec<Arc<dyn NewsProvider>> = vec![Arc::new(
        PooledCacheProvider::new(Arc::clone(&pool)).with_timeout(cfg.pooled_cache_timeout_secs),
    )];

    if let Ok(url) = std::env::var("FINANCIAL_API_URL") {
        let key = std::env::var("FINANCIAL_API_KEY").unwrap_or_default();
        providers.push(Arc::new(
            FinancialApiProvider::from_url(url, key)
                .with_rate_limiter(Arc::clone(&limiter))
                .with_timeout(cfg.provider_timeout_secs),
        ));
    }
    if let Ok(url) = std::env::var("NEWSWIRE_RSS_URL") {
        providers.push(Arc::new(
            NewswireRssProvider::from_url_template(url)
                .with_rate_limiter(Arc::clone(&limiter))
                .with_timeout(cfg.provider_timeout_secs),
        ));
    }
    let quote_base = std::env::var("QUOTE_API_URL").ok();
    if let Some(url) = &quote_base {
        providers.push(Arc::new(
            QuoteHeadlinesProvider::from_url(url.clone())
                .with_rate_limiter(Arc::clone(&limiter))
                .with_timeout(cfg.provider_timeout_secs),
        ));
    }

    let aggregator = NewsAggregator::new(
        providers,
        Arc::new(MemoryWeekendStore::new()),
        cfg.dedup_similarity,
        cfg.weekend_valid_hours,
    );
    let analyzer = DualModelAnalyzer::new(build_backend_from_env(), cfg);
    let pipeline = AnalysisPipeline::new(
        aggregator,
        analyzer,
        cfg.consensus.clone(),
        Arc::new(TracingErrorSink),
        Arc::new(RollingWindow::new_48h()),
        Arc::new(History::with_capacity(2000)),
    );

    let upstream = HttpQuoteUpstream::new(
        quote_base.unwrap_or_else(|| "http://127.0.0.1:9".to_string()),
    );
    let quotes = QuoteService::new(
        Arc::new(MemoryQuoteStore::new(
            10_000,
            Duration::from_secs(cfg.quote_ttl_secs.saturating_mul(2).max(60)),
        )),
        Arc::new(upstream),
        limiter,
        cfg,
    );

    api::AppState {
        pipeline: Arc::new(pipeline),
        quotes: Arc::new(quotes),
    }
}

/// Build the in-process app router (used by the binary and HTTP tests).
pub async fn app() -> anyhow::Result<axum::Router> {
    let cfg = PipelineConfig::load_default();
    Ok(api::create_router(build_state(&cfg)))
}
