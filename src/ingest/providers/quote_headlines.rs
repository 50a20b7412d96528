// src/ingest/providers/quote_headlines.rs
//! Lowest-priority provider: headlines bundled with quote lookups. The
//! upstream is the most rate-limited of the four, so it runs last and its
//! 429s must come back retryable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ingest::types::{AdapterError, ArticleOrigin, NewsArticle, NewsProvider, ProviderKind};
use crate::ratelimit::WindowLimiter;

#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    news: Vec<HeadlineItem>,
}

#[derive(Debug, Deserialize)]
struct HeadlineItem {
    headline: Option<String>,
    summary: Option<String>,
    publisher: Option<String>,
    /// Unix seconds.
    datetime: Option<i64>,
}

pub struct QuoteHeadlinesProvider {
    mode: Mode,
    timeout: Duration,
}

enum Mode {
    Fixture(String),
    Http {
        base_url: String,
        client: reqwest::Client,
        limiter: Option<Arc<WindowLimiter>>,
    },
}

impl QuoteHeadlinesProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            timeout: Duration::from_secs(8),
        }
    }

    pub fn from_url(base_url: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                base_url: base_url.into(),
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

    fn parse_body(body: &str) -> Result<Vec<NewsArticle>, AdapterError> {
        let parsed: HeadlinesResponse = serde_json::from_str(body)
            .map_err(|e| AdapterError::Upstream(format!("malformed headlines json: {e}")))?;

        let mut out = Vec::with_capacity(parsed.news.len());
        for item in parsed.news {
            let title = crate::ingest::normalize_text(item.headline.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            out.push(NewsArticle {
                title,
                summary: crate::ingest::normalize_text(item.summary.as_deref().unwrap_or_default()),
                source: item.publisher.unwrap_or_else(|| "Quote Desk".to_string()),
                published_at: item
                    .datetime
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .unwrap_or_default(),
                source_type: ArticleOrigin::QuoteIntegratedHeadlines,
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl NewsProvider for QuoteHeadlinesProvider {
    async fn fetch(&self, symbol: &str) -> Result<Vec<NewsArticle>, AdapterError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body),
            Mode::Http {
                base_url,
                client,
                limiter,
            } => {
                if let Some(limiter) = limiter {
                    limiter.acquire().await;
                }
                let url = format!("{base_url}/news?symbol={symbol}");
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| AdapterError::Upstream(e.to_string()))?;
                let status = resp.status();
                if status.as_u16() == 404 {
                    return Err(AdapterError::NotFound(symbol.to_string()));
                }
                if status.as_u16() == 429 {
                    return Err(AdapterError::Upstream(
                        "HTTP 429 rate limit from quote upstream".to_string(),
                    ));
                }
                if !status.is_success() {
                    return Err(AdapterError::Upstream(format!(
                        "HTTP {status} from quote upstream"
                    )));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| AdapterError::Upstream(e.to_string()))?;
                Self::parse_body(&body)
            }
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::QuoteIntegratedHeadlines
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
