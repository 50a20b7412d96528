// src/ingest/providers/newswire_rss.rs
use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::types::{AdapterError, ArticleOrigin, NewsArticle, NewsProvider, ProviderKind};
use crate::ratelimit::WindowLimiter;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<String>,
}

fn parse_rfc2822_to_utc(ts: &str) -> chrono::DateTime<chrono::Utc> {
    let unix = OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .unwrap_or(0);
    chrono::DateTime::<chrono::Utc>::from_timestamp(unix, 0).unwrap_or_default()
}

/// Generic newswire provider: an RSS search feed queried per symbol.
pub struct NewswireRssProvider {
    mode: Mode,
    timeout: Duration,
}

enum Mode {
    Fixture(String),
    Http {
        /// URL template with a `{symbol}` placeholder.
        url_template: String,
        client: reqwest::Client,
        limiter: Option<Arc<WindowLimiter>>,
    },
}

impl NewswireRssProvider {
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_url_template(url_template: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                url_template: url_template.into(),
                client: reqwest::Client::new(),
                limiter: None,
            },
            timeout: Duration::from_secs(10),
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

    fn parse_items_from_str(s: &str) -> Result<Vec<NewsArticle>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing newswire rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = crate::ingest::normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }

            out.push(NewsArticle {
                title,
                summary: crate::ingest::normalize_text(it.description.as_deref().unwrap_or_default()),
                source: it.source.unwrap_or_else(|| "Newswire".to_string()),
                published_at: it
                    .pub_date
                    .as_deref()
                    .map(parse_rfc2822_to_utc)
                    .unwrap_or_default(),
                source_type: ArticleOrigin::GenericNewsApi,
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl NewsProvider for NewswireRssProvider {
    async fn fetch(&self, symbol: &str) -> Result<Vec<NewsArticle>, AdapterError> {
        match &self.mode {
            Mode::Fixture(s) => {
                Self::parse_items_from_str(s).map_err(|e| AdapterError::Upstream(e.to_string()))
            }
            Mode::Http {
                url_template,
                client,
                limiter,
            } => {
                if let Some(limiter) = limiter {
                    limiter.acquire().await;
                }
                let url = url_template.replace("{symbol}", symbol);
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| AdapterError::Upstream(e.to_string()))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(AdapterError::Upstream(format!(
                        "HTTP {status} from newswire"
                    )));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| AdapterError::Upstream(e.to_string()))?;
                Self::parse_items_from_str(&body).map_err(|e| AdapterError::Upstream(e.to_string()))
            }
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::GenericNewsApi
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Newswire search</title>
    <item>
      <title>Acme shares rally after earnings&nbsp;beat</title>
      <description>Acme Corp reported a surprise profit.</description>
      <pubDate>Fri, 15 Aug 2025 13:30:00 GMT</pubDate>
      <source>Newswire</source>
    </item>
    <item>
      <title>Zenith recalls flagship product</title>
      <description>Regulator opened a probe.</description>
      <pubDate>Fri, 15 Aug 2025 12:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_rss_items_with_rfc2822_dates() {
        let provider = NewswireRssProvider::from_fixture(FIXTURE);
        let got = provider.fetch("ACME").await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].title, "Acme shares rally after earnings beat");
        assert_eq!(got[0].source_type, ArticleOrigin::GenericNewsApi);
        assert_eq!(
            got[0].published_at,
            parse_rfc2822_to_utc("Fri, 15 Aug 2025 13:30:00 GMT")
        );
        assert_eq!(got[1].source, "Newswire");
    }

    #[tokio::test]
    async fn broken_xml_is_an_adapter_error() {
        let provider = NewswireRssProvider::from_fixture("<rss><channel><item>");
        assert!(provider.fetch("ACME").await.is_err());
    }
}
