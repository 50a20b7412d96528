// src/ingest/providers/financial_api.rs
//! Structured financial API adapter. The upstream answers JSON with a
//! `feed` of sentiment-tagged stories and compact `YYYYMMDDTHHMMSS`
//! timestamps; rate-limit responses surface as retryable errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::ingest::types::{AdapterError, ArticleOrigin, NewsArticle, NewsProvider, ProviderKind};
use crate::ratelimit::WindowLimiter;

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    title: Option<String>,
    summary: Option<String>,
    source: Option<String>,
    time_published: Option<String>,
}

fn parse_compact_ts(ts: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(ts, "%Y%m%dT%H%M%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default())
}

pub struct FinancialApiProvider {
    mode: Mode,
    timeout: Duration,
}

enum Mode {
    /// Canned JSON body, used in tests.
    Fixture(String),
    Http {
        base_url: String,
        api_key: String,
        client: reqwest::Client,
        limiter: Option<Arc<WindowLimiter>>,
    },
}

impl FinancialApiProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            timeout: Duration::from_secs(8),
        }
    }

    pub fn from_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                base_url: base_url.into(),
                api_key: api_key.into(),
                client: reqwest::Client::new(),
                limiter: None,
            },
            timeout: Duration::from_secs(8),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<WindowLimiter>) -> Self {
        if let Mode::Http { limiter: slot, .. } = &mut self.mode {
            *slot = Some(limiter);
        }
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn parse_body(body: &str, symbol: &str) -> Result<Vec<NewsArticle>, AdapterError> {
        let parsed: FeedResponse = serde_json::from_str(body)
            .map_err(|e| AdapterError::Upstream(format!("malformed feed json: {e}")))?;

        let mut out = Vec::with_capacity(parsed.feed.len());
        for item in parsed.feed {
            let title = crate::ingest::normalize_text(item.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            out.push(NewsArticle {
                title,
                summary: crate::ingest::normalize_text(item.summary.as_deref().unwrap_or_default()),
                source: item.source.unwrap_or_else(|| "Financial API".to_string()),
                published_at: item
                    .time_published
                    .as_deref()
                    .map(parse_compact_ts)
                    .unwrap_or_else(Utc::now),
                source_type: ArticleOrigin::StructuredFinancialApi,
            });
        }
        tracing::debug!(symbol, count = out.len(), "financial api feed parsed");
        Ok(out)
    }
}

#[async_trait::async_trait]
impl NewsProvider for FinancialApiProvider {
    async fn fetch(&self, symbol: &str) -> Result<Vec<NewsArticle>, AdapterError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body, symbol),
            Mode::Http {
                base_url,
                api_key,
                client,
                limiter,
            } => {
                if let Some(limiter) = limiter {
                    limiter.acquire().await;
                }
                let url = format!("{base_url}?symbol={symbol}&apikey={api_key}");
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| AdapterError::Upstream(e.to_string()))?;

                let status = resp.status();
                if status.as_u16() == 404 {
                    return Err(AdapterError::NotFound(symbol.to_string()));
                }
                if !status.is_success() {
                    return Err(AdapterError::Upstream(format!(
                        "HTTP {status} from financial api"
                    )));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| AdapterError::Upstream(e.to_string()))?;
                Self::parse_body(&body, symbol)
            }
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::StructuredFinancialApi
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
