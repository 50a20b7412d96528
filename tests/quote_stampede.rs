//! Stampede-protection contract: N concurrent callers inside one time bucket
//! produce exactly one upstream fetch, failures resolve every waiter without
//! poisoning the durable cache, and the in-flight registry never leaks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use news_consensus_analyzer::config::PipelineConfig;
use news_consensus_analyzer::quotes::{
    MemoryQuoteStore, Quote, QuoteService, QuoteUpstream,
};
use news_consensus_analyzer::ratelimit::WindowLimiter;

struct SlowUpstream {
    calls: AtomicUsize,
    fail: bool,
    delay_ms: u64,
}

#[async_trait::async_trait]
impl QuoteUpstream for SlowUpstream {
    async fn fetch(&self, symbol: &str) -> anyhow::Result<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        if self.fail {
            anyhow::bail!("upstream outage");
        }
        Ok(Quote {
            symbol: symbol.to_string(),
            price: 250.5,
            change_percent: Some(-1.2),
            as_of: Utc::now(),
        })
    }
}

fn service(upstream: Arc<SlowUpstream>) -> Arc<QuoteService> {
    let cfg = PipelineConfig::default();
    Arc::new(QuoteService::new(
        Arc::new(MemoryQuoteStore::new(1000, Duration::from_secs(600))),
        upstream,
        Arc::new(WindowLimiter::new(1000, Duration::from_secs(60))),
        &cfg,
    ))
}

#[tokio::test]
async fn n_concurrent_callers_one_upstream_fetch() {
    let upstream = Arc::new(SlowUpstream {
        calls: AtomicUsize::new(0),
        fail: false,
        delay_ms: 80,
    });
    let service = service(Arc::clone(&upstream));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let s = Arc::clone(&service);
        handles.push(tokio::spawn(async move { s.get_quote("ACME").await }));
    }

    for h in handles {
        let quote = h.await.unwrap().expect("every waiter resolves");
        assert_eq!(quote.symbol, "ACME");
        assert!((quote.price - 250.5).abs() < f64::EPSILON);
    }

    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.inflight_len(), 0, "registry entry must be cleaned up");
}

#[tokio::test]
async fn distinct_symbols_fetch_independently() {
    let upstream = Arc::new(SlowUpstream {
        calls: AtomicUsize::new(0),
        fail: false,
        delay_ms: 30,
    });
    let service = service(Arc::clone(&upstream));

    let (a, b) = tokio::join!(service.get_quote("ACME"), service.get_quote("ZENT"));
    assert!(a.is_some());
    assert!(b.is_some());
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn upstream_failure_resolves_all_waiters_to_none() {
    let upstream = Arc::new(SlowUpstream {
        calls: AtomicUsize::new(0),
        fail: true,
        delay_ms: 40,
    });
    let service = service(Arc::clone(&upstream));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let s = Arc::clone(&service);
        handles.push(tokio::spawn(async move { s.get_quote("ACME").await }));
    }
    for h in handles {
        assert!(h.await.unwrap().is_none());
    }
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.inflight_len(), 0);

    // Failure was not cached: a later caller goes upstream again.
    assert!(service.get_quote("ACME").await.is_none());
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn success_populates_the_durable_cache_for_the_bucket() {
    let upstream = Arc::new(SlowUpstream {
        calls: AtomicUsize::new(0),
        fail: false,
        delay_ms: 5,
    });
    let service = service(Arc::clone(&upstream));

    for _ in 0..5 {
        assert!(service.get_quote("ACME").await.is_some());
    }
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}
