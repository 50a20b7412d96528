// src/ingest/mod.rs
//! Multi-provider news aggregation with typed error capture.
//!
//! `aggregate` never fails: every provider problem becomes a `ProviderError`
//! in the result, and a total wipeout still yields a valid empty result that
//! downstream turns into a neutral zero-confidence signal.

pub mod providers;
pub mod types;
pub mod weekend;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

use crate::ingest::types::{
    AggregatedNewsResult, AggregationMetadata, ArticleOrigin, NewsArticle, NewsProvider,
    ProviderError, ProviderErrorCode,
};
use crate::ingest::weekend::{is_trading_day, WeekendCacheEntry, WeekendStore};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_articles_total", "Articles collected from providers.");
        describe_counter!(
            "news_provider_errors_total",
            "Provider fetch errors (incl. NO_DATA)."
        );
        describe_counter!(
            "news_dedup_dropped_total",
            "Articles removed as cross-provider duplicates."
        );
        describe_counter!(
            "news_weekend_fallback_hits_total",
            "Aggregations served from the weekend snapshot."
        );
        describe_gauge!(
            "news_aggregate_last_run_ts",
            "Unix ts when aggregation last ran."
        );
    });
}

/// Normalize text: decode entities, strip tags and stray typography,
/// collapse whitespace. Applied to every article field before dedup/analysis.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Canonical form of a title used for duplicate detection.
fn normalize_title_key(title: &str) -> String {
    normalize_text(title)
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cross-provider dedup: exact normalized-title match first, then a
/// Jaro-Winkler near-duplicate sweep. First occurrence (highest-priority
/// provider) wins, preserving display order. Returns (kept, dropped count).
pub fn dedup_articles(articles: Vec<NewsArticle>, similarity: f64) -> (Vec<NewsArticle>, usize) {
    let mut seen_fingerprints: HashSet<String> = HashSet::new();
    let mut kept_keys: Vec<String> = Vec::new();
    let mut kept = Vec::with_capacity(articles.len());
    let mut dropped = 0usize;

    'outer: for article in articles {
        let key = normalize_title_key(&article.title);
        if key.is_empty() {
            dropped += 1;
            continue;
        }
        if !seen_fingerprints.insert(title_fingerprint(&key)) {
            dropped += 1;
            continue;
        }
        for prior in &kept_keys {
            if strsim::jaro_winkler(prior, &key) >= similarity {
                dropped += 1;
                continue 'outer;
            }
        }
        kept_keys.push(key);
        kept.push(article);
    }

    (kept, dropped)
}

pub struct NewsAggregator {
    providers: Vec<Arc<dyn NewsProvider>>,
    weekend: Arc<dyn WeekendStore>,
    dedup_similarity: f64,
    weekend_valid_hours: i64,
}

impl NewsAggregator {
    pub fn new(
        providers: Vec<Arc<dyn NewsProvider>>,
        weekend: Arc<dyn WeekendStore>,
        dedup_similarity: f64,
        weekend_valid_hours: i64,
    ) -> Self {
        Self {
            providers,
            weekend,
            dedup_similarity,
            weekend_valid_hours,
        }
    }

    /// Aggregate news for `symbol` across all providers. Never fails.
    pub async fn aggregate(&self, symbol: &str) -> AggregatedNewsResult {
        self.aggregate_at(symbol, Utc::now()).await
    }

    /// Clock-injected variant so the weekend policy is testable.
    pub async fn aggregate_at(&self, symbol: &str, now: DateTime<Utc>) -> AggregatedNewsResult {
        ensure_metrics_described();

        // Fan out: every provider fetches concurrently under its own budget.
        let mut tasks = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let kind = provider.kind();
            let provider = Arc::clone(provider);
            let symbol = symbol.to_string();
            let handle = tokio::spawn(async move {
                let budget = provider.timeout();
                match tokio::time::timeout(budget, provider.fetch(&symbol)).await {
                    Ok(r) => r,
                    Err(_) => Err(types::AdapterError::Timeout(budget)),
                }
            });
            tasks.push((kind, handle));
        }

        // Fan in, then assemble in priority order (spawn order == config order).
        let mut articles: Vec<NewsArticle> = Vec::new();
        let mut provider_errors: Vec<ProviderError> = Vec::new();

        for (kind, handle) in tasks {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) => {
                    // A panicked adapter is still just one provider error.
                    tracing::error!(provider = kind.as_str(), error = %e, "provider task panicked");
                    Err(types::AdapterError::Upstream(format!(
                        "provider task panicked: {e}"
                    )))
                }
            };
            match result {
                Ok(batch) if !batch.is_empty() => {
                    counter!("news_articles_total").increment(batch.len() as u64);
                    articles.extend(batch.into_iter().map(|mut a| {
                        a.source_type = ArticleOrigin::from(kind);
                        a
                    }));
                }
                Ok(_) => {
                    counter!("news_provider_errors_total").increment(1);
                    provider_errors.push(ProviderError::new(
                        kind,
                        ProviderErrorCode::NoData,
                        format!("{} returned no articles for {symbol}", kind.as_str()),
                    ));
                }
                Err(e) => {
                    counter!("news_provider_errors_total").increment(1);
                    let (code, retryable) = e.classify();
                    tracing::warn!(provider = kind.as_str(), error = %e, retryable, "provider error");
                    let mut err = ProviderError::new(kind, code, e.to_string());
                    err.retryable = retryable;
                    provider_errors.push(err);
                }
            }
        }

        let (mut articles, dropped) = dedup_articles(articles, self.dedup_similarity);
        if dropped > 0 {
            counter!("news_dedup_dropped_total").increment(dropped as u64);
        }

        let mut cache_hits = 0usize;
        let today = now.date_naive();
        if articles.is_empty() && !is_trading_day(today) {
            if let Some(entry) = self.weekend.get(symbol, now).await {
                counter!("news_weekend_fallback_hits_total").increment(1);
                tracing::info!(symbol, fetch_date = %entry.fetch_date, "adopting weekend snapshot");
                articles = entry
                    .articles
                    .into_iter()
                    .map(|mut a| {
                        a.source_type = ArticleOrigin::WeekendFallback;
                        a
                    })
                    .collect();
                cache_hits = 1;
            }
        } else if !articles.is_empty() && is_trading_day(today) {
            // Snapshot for the coming non-trading days.
            let source_providers = self
                .providers
                .iter()
                .map(|p| p.kind())
                .filter(|k| articles.iter().any(|a| a.source_type == ArticleOrigin::from(*k)))
                .collect();
            self.weekend
                .put(WeekendCacheEntry::new(
                    symbol,
                    articles.clone(),
                    source_providers,
                    now,
                    self.weekend_valid_hours,
                ))
                .await;
        }

        let total_providers = self.providers.len();
        let failed_providers = provider_errors.len();
        gauge!("news_aggregate_last_run_ts").set(now.timestamp().max(0) as f64);

        AggregatedNewsResult {
            articles,
            provider_errors,
            metadata: AggregationMetadata {
                total_providers,
                successful_providers: total_providers - failed_providers,
                failed_providers,
                cache_hits,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(title: &str, origin: ArticleOrigin) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            summary: "s".to_string(),
            source: "Wire".to_string(),
            published_at: Utc::now(),
            source_type: origin,
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_entities() {
        let s = "  Acme&nbsp;&nbsp;beats <b>estimates</b>  ";
        assert_eq!(normalize_text(s), "Acme beats estimates");
    }

    #[test]
    fn exact_duplicate_titles_are_dropped_first_wins() {
        let input = vec![
            article("Acme beats estimates", ArticleOrigin::PooledCache),
            article("ACME Beats Estimates!", ArticleOrigin::GenericNewsApi),
        ];
        let (kept, dropped) = dedup_articles(input, 0.92);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 1);
        assert_eq!(kept[0].source_type, ArticleOrigin::PooledCache);
    }

    #[test]
    fn near_duplicate_titles_are_dropped() {
        let input = vec![
            article(
                "Acme Corp raises full-year guidance after strong quarter",
                ArticleOrigin::PooledCache,
            ),
            article(
                "Acme Corp raises full-year guidance after strong quarters",
                ArticleOrigin::GenericNewsApi,
            ),
        ];
        let (kept, dropped) = dedup_articles(input, 0.92);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn distinct_stories_survive_dedup() {
        let input = vec![
            article("Acme beats estimates", ArticleOrigin::PooledCache),
            article("Regulator opens probe into Zenith", ArticleOrigin::GenericNewsApi),
        ];
        let (kept, dropped) = dedup_articles(input, 0.92);
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped, 0);
    }
}
