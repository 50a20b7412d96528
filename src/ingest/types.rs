// src/ingest/types.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four configured upstream providers, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    PooledCache,
    StructuredFinancialApi,
    GenericNewsApi,
    QuoteIntegratedHeadlines,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::PooledCache => "pooled-cache",
            ProviderKind::StructuredFinancialApi => "structured-financial-api",
            ProviderKind::GenericNewsApi => "generic-news-api",
            ProviderKind::QuoteIntegratedHeadlines => "quote-integrated-headlines",
        }
    }
}

/// Where an article came from. Weekend fallback is not a provider; articles
/// adopted from the weekend store carry their own tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticleOrigin {
    PooledCache,
    StructuredFinancialApi,
    GenericNewsApi,
    QuoteIntegratedHeadlines,
    WeekendFallback,
}

impl From<ProviderKind> for ArticleOrigin {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::PooledCache => ArticleOrigin::PooledCache,
            ProviderKind::StructuredFinancialApi => ArticleOrigin::StructuredFinancialApi,
            ProviderKind::GenericNewsApi => ArticleOrigin::GenericNewsApi,
            ProviderKind::QuoteIntegratedHeadlines => ArticleOrigin::QuoteIntegratedHeadlines,
        }
    }
}

/// A single news item, immutable once built by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub summary: String,
    /// Publisher name as reported upstream (e.g. "Reuters").
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub source_type: ArticleOrigin,
}

/// Error codes persisted alongside results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorCode {
    NotFound,
    NoData,
    Error,
    RateLimit,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorCode::NotFound => "NOT_FOUND",
            ProviderErrorCode::NoData => "NO_DATA",
            ProviderErrorCode::Error => "ERROR",
            ProviderErrorCode::RateLimit => "RATE_LIMIT",
        }
    }
}

/// One captured failure. At most one per provider per aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderError {
    pub provider: ProviderKind,
    pub code: ProviderErrorCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(provider: ProviderKind, code: ProviderErrorCode, message: impl Into<String>) -> Self {
        let retryable = code == ProviderErrorCode::RateLimit;
        Self {
            provider,
            code,
            message: message.into(),
            timestamp: Utc::now(),
            retryable,
        }
    }
}

/// What an adapter call can fail with. Everything else (zero articles) is a
/// successful call and handled by the aggregator.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("symbol not found: {0}")]
    NotFound(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl AdapterError {
    /// Map a failure onto the persisted error code, sniffing rate-limit
    /// indicators out of upstream messages.
    pub fn classify(&self) -> (ProviderErrorCode, bool) {
        match self {
            AdapterError::NotFound(_) => (ProviderErrorCode::NotFound, false),
            AdapterError::Timeout(_) => (ProviderErrorCode::Error, false),
            AdapterError::Upstream(msg) => {
                let m = msg.to_ascii_lowercase();
                if m.contains("429") || m.contains("rate limit") || m.contains("too many requests")
                {
                    (ProviderErrorCode::RateLimit, true)
                } else {
                    (ProviderErrorCode::Error, false)
                }
            }
        }
    }
}

#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<Vec<NewsArticle>, AdapterError>;
    fn kind(&self) -> ProviderKind;
    /// Upstream budget for one fetch; the aggregator enforces it.
    fn timeout(&self) -> Duration {
        Duration::from_secs(8)
    }
}

/// Per-aggregation bookkeeping handed downstream together with the articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AggregationMetadata {
    pub total_providers: usize,
    pub successful_providers: usize,
    pub failed_providers: usize,
    pub cache_hits: usize,
}

/// The aggregator's only output shape. `articles` may be empty even when
/// some providers succeeded; that is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedNewsResult {
    pub articles: Vec<NewsArticle>,
    pub provider_errors: Vec<ProviderError>,
    pub metadata: AggregationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classification_from_message() {
        let (code, retryable) =
            AdapterError::Upstream("HTTP 429 Too Many Requests".into()).classify();
        assert_eq!(code, ProviderErrorCode::RateLimit);
        assert!(retryable);

        let (code, retryable) = AdapterError::Upstream("connection reset".into()).classify();
        assert_eq!(code, ProviderErrorCode::Error);
        assert!(!retryable);
    }

    #[test]
    fn timeout_is_plain_error_not_retryable() {
        let (code, retryable) = AdapterError::Timeout(Duration::from_secs(5)).classify();
        assert_eq!(code, ProviderErrorCode::Error);
        assert!(!retryable);
    }

    #[test]
    fn provider_kind_serializes_kebab_case() {
        let v = serde_json::to_value(ProviderKind::StructuredFinancialApi).unwrap();
        assert_eq!(v, serde_json::json!("structured-financial-api"));
    }
}
