//! # Quote Fetch Cache
//! Time-bucketed quote lookups with stampede protection.
//!
//! All requests for a symbol within one bucket share a cache key. On a
//! durable-cache miss the in-flight registry guarantees at most one upstream
//! fetch per key is running at any time; every concurrent caller awaits the
//! same shared future. Registry entries are removed by a drop guard on every
//! path, success or failure, so a dead fetch can never wedge a key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use metrics::{counter, describe_counter};
use moka::future::Cache;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::ratelimit::WindowLimiter;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("quote_cache_hits_total", "Durable quote cache hits.");
        describe_counter!("quote_cache_misses_total", "Durable quote cache misses.");
        describe_counter!(
            "quote_stampede_joins_total",
            "Callers that joined an in-flight fetch instead of going upstream."
        );
        describe_counter!("quote_upstream_fetches_total", "Upstream quote fetches issued.");
        describe_counter!(
            "quote_upstream_failures_total",
            "Upstream quote fetches that failed or timed out."
        );
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    pub as_of: DateTime<Utc>,
}

/// Durable cache collaborator. The real binding lives outside this crate;
/// the moka-backed implementation below serves local runs and tests.
#[async_trait::async_trait]
pub trait QuoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Quote>;
    async fn put(&self, key: &str, quote: Quote, ttl: Duration);
}

/// In-memory TTL store. Entries carry their own deadline; the cache-level
/// TTL is only an eviction backstop.
pub struct MemoryQuoteStore {
    inner: Cache<String, (Quote, std::time::Instant)>,
}

impl MemoryQuoteStore {
    pub fn new(max_capacity: u64, backstop_ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(backstop_ttl)
                .build(),
        }
    }
}

#[async_trait::async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn get(&self, key: &str) -> Option<Quote> {
        match self.inner.get(key).await {
            Some((quote, deadline)) if std::time::Instant::now() < deadline => Some(quote),
            _ => None,
        }
    }

    async fn put(&self, key: &str, quote: Quote, ttl: Duration) {
        let deadline = std::time::Instant::now() + ttl;
        self.inner.insert(key.to_string(), (quote, deadline)).await;
    }
}

/// Upstream market-data source for quotes.
#[async_trait::async_trait]
pub trait QuoteUpstream: Send + Sync {
    async fn fetch(&self, symbol: &str) -> anyhow::Result<Quote>;
}

/// JSON HTTP upstream: `GET {base_url}/quote?symbol=`.
pub struct HttpQuoteUpstream {
    base_url: String,
    client: reqwest::Client,
}

impl HttpQuoteUpstream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl QuoteUpstream for HttpQuoteUpstream {
    async fn fetch(&self, symbol: &str) -> anyhow::Result<Quote> {
        use anyhow::Context;

        #[derive(Deserialize)]
        struct Resp {
            symbol: String,
            price: f64,
            change_percent: Option<f64>,
        }

        let url = format!("{}/quote?symbol={symbol}", self.base_url);
        let resp = self.client.get(&url).send().await.context("quote get")?;
        let resp = resp.error_for_status().context("quote non-2xx")?;
        let body: Resp = resp.json().await.context("quote json")?;
        Ok(Quote {
            symbol: body.symbol,
            price: body.price,
            change_percent: body.change_percent,
            as_of: Utc::now(),
        })
    }
}

type SharedFetch = Shared<BoxFuture<'static, Option<Quote>>>;
type InflightMap = Arc<Mutex<HashMap<String, SharedFetch>>>;

/// Removes the registry entry on every exit path of the owning future.
struct InflightGuard {
    key: String,
    registry: InflightMap,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut reg = self.registry.lock().expect("inflight registry poisoned");
        reg.remove(&self.key);
    }
}

/// Compute the bucketed cache key shared by all requests in one window.
pub fn cache_key(symbol: &str, bucket_secs: u64, now_unix: i64) -> String {
    let bucket = now_unix.max(0) as u64 / bucket_secs.max(1);
    format!("{}:{bucket}", symbol.to_ascii_uppercase())
}

pub struct QuoteService {
    store: Arc<dyn QuoteStore>,
    upstream: Arc<dyn QuoteUpstream>,
    limiter: Arc<WindowLimiter>,
    inflight: InflightMap,
    bucket_secs: u64,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl QuoteService {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        upstream: Arc<dyn QuoteUpstream>,
        limiter: Arc<WindowLimiter>,
        cfg: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            upstream,
            limiter,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            bucket_secs: cfg.quote_bucket_secs,
            ttl: Duration::from_secs(cfg.quote_ttl_secs),
            fetch_timeout: Duration::from_secs(cfg.quote_timeout_secs),
        }
    }

    /// Cached quote lookup. Returns `None` when upstream has nothing (or
    /// failed); failures are never written to the durable cache, so the
    /// next bucket-mate retries instead of caching the outage.
    pub async fn get_quote(&self, symbol: &str) -> Option<Quote> {
        ensure_metrics_described();
        let key = cache_key(symbol, self.bucket_secs, Utc::now().timestamp());

        if let Some(quote) = self.store.get(&key).await {
            counter!("quote_cache_hits_total").increment(1);
            return Some(quote);
        }
        counter!("quote_cache_misses_total").increment(1);

        let fetch = {
            let mut reg = self.inflight.lock().expect("inflight registry poisoned");
            if let Some(existing) = reg.get(&key) {
                counter!("quote_stampede_joins_total").increment(1);
                existing.clone()
            } else {
                let fetch = self.spawn_fetch(symbol.to_string(), key.clone());
                reg.insert(key, fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    /// Build the single shared fetch future for a key. The guard inside it
    /// removes the registry entry whether the fetch succeeds, fails, times
    /// out, or the future is dropped by all waiters.
    fn spawn_fetch(&self, symbol: String, key: String) -> SharedFetch {
        let store = Arc::clone(&self.store);
        let upstream = Arc::clone(&self.upstream);
        let limiter = Arc::clone(&self.limiter);
        let registry = Arc::clone(&self.inflight);
        let ttl = self.ttl;
        let fetch_timeout = self.fetch_timeout;

        async move {
            let _guard = InflightGuard {
                key: key.clone(),
                registry,
            };

            limiter.acquire().await;
            counter!("quote_upstream_fetches_total").increment(1);

            match tokio::time::timeout(fetch_timeout, upstream.fetch(&symbol)).await {
                Ok(Ok(quote)) => {
                    store.put(&key, quote.clone(), ttl).await;
                    Some(quote)
                }
                Ok(Err(e)) => {
                    counter!("quote_upstream_failures_total").increment(1);
                    tracing::warn!(symbol = %symbol, error = %e, "quote upstream failed");
                    None
                }
                Err(_) => {
                    counter!("quote_upstream_failures_total").increment(1);
                    tracing::warn!(symbol = %symbol, timeout = ?fetch_timeout, "quote upstream timed out");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Number of fetches currently in flight (diagnostics/tests).
    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().expect("inflight registry poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingUpstream {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl QuoteUpstream for CountingUpstream {
        async fn fetch(&self, symbol: &str) -> anyhow::Result<Quote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Hold the fetch open long enough for callers to pile up.
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                anyhow::bail!("upstream down");
            }
            Ok(Quote {
                symbol: symbol.to_string(),
                price: 101.25,
                change_percent: Some(0.4),
                as_of: Utc::now(),
            })
        }
    }

    fn service(upstream: Arc<CountingUpstream>) -> QuoteService {
        let cfg = PipelineConfig::default();
        QuoteService::new(
            Arc::new(MemoryQuoteStore::new(1000, Duration::from_secs(600))),
            upstream,
            Arc::new(WindowLimiter::new(100, Duration::from_secs(60))),
            &cfg,
        )
    }

    #[test]
    fn cache_key_buckets_by_window() {
        assert_eq!(cache_key("acme", 300, 1000), cache_key("ACME", 300, 1299));
        assert_ne!(cache_key("ACME", 300, 1000), cache_key("ACME", 300, 1500));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_upstream_fetch() {
        let upstream = Arc::new(CountingUpstream {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = Arc::new(service(Arc::clone(&upstream)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = Arc::clone(&service);
            handles.push(tokio::spawn(async move { s.get_quote("ACME").await }));
        }
        for h in handles {
            let quote = h.await.unwrap().expect("all waiters get the quote");
            assert_eq!(quote.symbol, "ACME");
        }
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.inflight_len(), 0);
    }

    #[tokio::test]
    async fn failure_resolves_waiters_to_none_and_does_not_cache() {
        let upstream = Arc::new(CountingUpstream {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let service = Arc::new(service(Arc::clone(&upstream)));

        let a = service.get_quote("ACME").await;
        assert!(a.is_none());
        assert_eq!(service.inflight_len(), 0);

        // Next caller in the same bucket retries upstream instead of
        // hitting a cached failure.
        let b = service.get_quote("ACME").await;
        assert!(b.is_none());
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_call_hits_durable_cache() {
        let upstream = Arc::new(CountingUpstream {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = service(Arc::clone(&upstream));

        assert!(service.get_quote("ACME").await.is_some());
        assert!(service.get_quote("ACME").await.is_some());
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }
}
