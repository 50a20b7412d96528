//! Aggregator integration tests: priority fallback, typed error capture,
//! the zero-article convention, dedup, and the weekend snapshot policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use news_consensus_analyzer::ingest::types::{
    AdapterError, ArticleOrigin, NewsArticle, NewsProvider, ProviderErrorCode, ProviderKind,
};
use news_consensus_analyzer::ingest::weekend::{MemoryWeekendStore, WeekendCacheEntry, WeekendStore};
use news_consensus_analyzer::ingest::NewsAggregator;

fn article(title: &str) -> NewsArticle {
    NewsArticle {
        title: title.to_string(),
        summary: "summary text".to_string(),
        source: "Test Wire".to_string(),
        published_at: Utc::now(),
        source_type: ArticleOrigin::PooledCache,
    }
}

/// Scripted provider: returns a fixed batch or a fixed failure.
struct ScriptedProvider {
    kind: ProviderKind,
    outcome: Outcome,
}

enum Outcome {
    Articles(Vec<NewsArticle>),
    Empty,
    Fail(String),
}

#[async_trait::async_trait]
impl NewsProvider for ScriptedProvider {
    async fn fetch(&self, _symbol: &str) -> Result<Vec<NewsArticle>, AdapterError> {
        match &self.outcome {
            Outcome::Articles(v) => Ok(v.clone()),
            Outcome::Empty => Ok(Vec::new()),
            Outcome::Fail(msg) => Err(AdapterError::Upstream(msg.clone())),
        }
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(2)
    }
}

fn provider(kind: ProviderKind, outcome: Outcome) -> Arc<dyn NewsProvider> {
    Arc::new(ScriptedProvider { kind, outcome })
}

fn aggregator(providers: Vec<Arc<dyn NewsProvider>>) -> NewsAggregator {
    NewsAggregator::new(providers, Arc::new(MemoryWeekendStore::new()), 0.92, 72)
}

/// A Friday and the following Saturday, both 13:00 UTC.
fn friday() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 15, 13, 0, 0).unwrap()
}
fn saturday() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 16, 13, 0, 0).unwrap()
}

#[tokio::test]
async fn scenario_pooled_cache_succeeds_others_report_no_data() {
    let titles = [
        "Acme beats third-quarter profit estimates",
        "Regulators clear the pending Zenith merger",
        "Supply chain costs weigh on full-year outlook",
        "Analysts lift price targets after earnings call",
        "New product line ships ahead of schedule",
        "Dividend raised for the ninth straight year",
        "Union talks stall at midwest plants",
        "Chief financial officer to retire in March",
        "Buyback program expanded by two billion",
        "Shares added to the large-cap index",
    ];
    let articles: Vec<NewsArticle> = titles.iter().map(|t| article(t)).collect();

    let agg = aggregator(vec![
        provider(ProviderKind::PooledCache, Outcome::Articles(articles)),
        provider(ProviderKind::StructuredFinancialApi, Outcome::Empty),
        provider(ProviderKind::GenericNewsApi, Outcome::Empty),
        provider(ProviderKind::QuoteIntegratedHeadlines, Outcome::Empty),
    ]);

    let result = agg.aggregate_at("ACME", friday()).await;

    assert_eq!(result.articles.len(), 10);
    assert_eq!(result.provider_errors.len(), 3);
    assert!(result
        .provider_errors
        .iter()
        .all(|e| e.code == ProviderErrorCode::NoData && !e.retryable));
    assert_eq!(result.metadata.total_providers, 4);
    assert_eq!(result.metadata.successful_providers, 1);
    assert_eq!(result.metadata.failed_providers, 3);
}

#[tokio::test]
async fn invariant_successful_plus_failed_equals_total() {
    let agg = aggregator(vec![
        provider(ProviderKind::PooledCache, Outcome::Empty),
        provider(
            ProviderKind::StructuredFinancialApi,
            Outcome::Articles(vec![article("One live story")]),
        ),
        provider(
            ProviderKind::GenericNewsApi,
            Outcome::Fail("connection refused".to_string()),
        ),
    ]);

    let result = agg.aggregate_at("ACME", friday()).await;
    let m = result.metadata;
    assert_eq!(m.successful_providers + m.failed_providers, m.total_providers);
    assert_eq!(m.successful_providers, 1);
}

#[tokio::test]
async fn at_most_one_error_per_provider_per_call() {
    let agg = aggregator(vec![
        provider(ProviderKind::PooledCache, Outcome::Empty),
        provider(ProviderKind::StructuredFinancialApi, Outcome::Fail("boom".into())),
        provider(ProviderKind::GenericNewsApi, Outcome::Fail("boom".into())),
        provider(ProviderKind::QuoteIntegratedHeadlines, Outcome::Empty),
    ]);

    let result = agg.aggregate_at("ACME", friday()).await;
    let providers_seen: std::collections::HashSet<ProviderKind> =
        result.provider_errors.iter().map(|e| e.provider).collect();
    assert_eq!(providers_seen.len(), result.provider_errors.len());
}

#[tokio::test]
async fn total_failure_still_returns_a_valid_empty_result() {
    let agg = aggregator(vec![
        provider(ProviderKind::PooledCache, Outcome::Fail("dead".into())),
        provider(
            ProviderKind::StructuredFinancialApi,
            Outcome::Fail("HTTP 429 Too Many Requests".into()),
        ),
        provider(ProviderKind::GenericNewsApi, Outcome::Fail("dead".into())),
        provider(ProviderKind::QuoteIntegratedHeadlines, Outcome::Fail("dead".into())),
    ]);

    let result = agg.aggregate_at("ACME", friday()).await;
    assert!(result.articles.is_empty());
    assert_eq!(result.provider_errors.len(), 4);
    assert_eq!(result.metadata.successful_providers, 0);

    // Rate-limit messages come back typed and retryable.
    let rate_limited = result
        .provider_errors
        .iter()
        .find(|e| e.provider == ProviderKind::StructuredFinancialApi)
        .unwrap();
    assert_eq!(rate_limited.code, ProviderErrorCode::RateLimit);
    assert!(rate_limited.retryable);
}

#[tokio::test]
async fn cross_provider_duplicates_are_removed_highest_priority_wins() {
    let mut pooled = article("Acme Corp beats quarterly estimates");
    pooled.source = "Pool".to_string();
    let mut wire = article("Acme Corp Beats Quarterly Estimates");
    wire.source = "Wire".to_string();

    let agg = aggregator(vec![
        provider(ProviderKind::PooledCache, Outcome::Articles(vec![pooled])),
        provider(ProviderKind::GenericNewsApi, Outcome::Articles(vec![wire])),
    ]);

    let result = agg.aggregate_at("ACME", friday()).await;
    assert_eq!(result.articles.len(), 1);
    assert_eq!(result.articles[0].source_type, ArticleOrigin::PooledCache);
}

#[tokio::test]
async fn weekend_fallback_adopts_a_valid_snapshot() {
    let weekend = Arc::new(MemoryWeekendStore::new());
    weekend
        .put(WeekendCacheEntry::new(
            "ACME",
            vec![article("Friday closing wrap")],
            vec![ProviderKind::PooledCache],
            friday(),
            72,
        ))
        .await;

    let agg = NewsAggregator::new(
        vec![provider(ProviderKind::PooledCache, Outcome::Empty)],
        weekend,
        0.92,
        72,
    );

    let result = agg.aggregate_at("ACME", saturday()).await;
    assert_eq!(result.articles.len(), 1);
    assert_eq!(result.articles[0].source_type, ArticleOrigin::WeekendFallback);
    assert_eq!(result.metadata.cache_hits, 1);
    // The pooled provider still reported NO_DATA; the fallback does not
    // rewrite provider accounting.
    assert_eq!(result.metadata.successful_providers, 0);
}

#[tokio::test]
async fn weekend_fallback_ignores_expired_snapshots() {
    let weekend = Arc::new(MemoryWeekendStore::new());
    // Valid for 2 hours only; Saturday 13:00 is long past it.
    weekend
        .put(WeekendCacheEntry::new(
            "ACME",
            vec![article("Stale wrap")],
            vec![ProviderKind::PooledCache],
            friday(),
            2,
        ))
        .await;

    let agg = NewsAggregator::new(
        vec![provider(ProviderKind::PooledCache, Outcome::Empty)],
        weekend,
        0.92,
        72,
    );

    let result = agg.aggregate_at("ACME", saturday()).await;
    assert!(result.articles.is_empty());
    assert_eq!(result.metadata.cache_hits, 0);
}

#[tokio::test]
async fn weekday_fetch_writes_the_weekend_snapshot() {
    let weekend = Arc::new(MemoryWeekendStore::new());
    let agg = NewsAggregator::new(
        vec![provider(
            ProviderKind::PooledCache,
            Outcome::Articles(vec![article("Friday story")]),
        )],
        Arc::clone(&weekend) as Arc<dyn WeekendStore>,
        0.92,
        72,
    );

    let _ = agg.aggregate_at("ACME", friday()).await;
    let entry = weekend.get("ACME", saturday()).await.expect("snapshot written");
    assert_eq!(entry.articles.len(), 1);
    assert_eq!(entry.fetch_date, friday().date_naive());
}

#[tokio::test]
async fn weekend_fallback_not_used_on_trading_days() {
    let weekend = Arc::new(MemoryWeekendStore::new());
    weekend
        .put(WeekendCacheEntry::new(
            "ACME",
            vec![article("Old wrap")],
            vec![ProviderKind::PooledCache],
            friday(),
            72,
        ))
        .await;

    // Monday with zero live articles: no fallback, empty result stands.
    let monday = Utc.with_ymd_and_hms(2025, 8, 18, 13, 0, 0).unwrap();
    let agg = NewsAggregator::new(
        vec![provider(ProviderKind::PooledCache, Outcome::Empty)],
        weekend,
        0.92,
        72,
    );

    let result = agg.aggregate_at("ACME", monday).await;
    assert!(result.articles.is_empty());
    assert_eq!(result.metadata.cache_hits, 0);
}
