// src/ingest/providers/pooled_cache.rs
//! Highest-priority provider: a shared in-process article pool fed by
//! earlier fetches and background loads. Local, cheap, and first in line,
//! so live upstreams are only consulted when the pool has nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ingest::types::{AdapterError, NewsArticle, NewsProvider, ProviderKind};

/// Shared pool keyed by upper-cased symbol.
#[derive(Debug, Default)]
pub struct ArticlePool {
    inner: Mutex<HashMap<String, Vec<NewsArticle>>>,
}

impl ArticlePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, symbol: &str, articles: Vec<NewsArticle>) {
        let mut map = self.inner.lock().expect("article pool mutex poisoned");
        map.insert(symbol.to_ascii_uppercase(), articles);
    }

    pub fn get(&self, symbol: &str) -> Vec<NewsArticle> {
        let map = self.inner.lock().expect("article pool mutex poisoned");
        map.get(&symbol.to_ascii_uppercase()).cloned().unwrap_or_default()
    }
}

pub struct PooledCacheProvider {
    pool: Arc<ArticlePool>,
    timeout: Duration,
}

impl PooledCacheProvider {
    pub fn new(pool: Arc<ArticlePool>) -> Self {
        Self {
            pool,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl NewsProvider for PooledCacheProvider {
    async fn fetch(&self, symbol: &str) -> Result<Vec<NewsArticle>, AdapterError> {
        // A pool miss is a successful zero-article fetch, not a failure.
        Ok(self.pool.get(symbol))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::PooledCache
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
