// src/ingest/weekend.rs
//! Weekend/stale-news fallback store.
//!
//! On trading days the aggregator snapshots a successful fetch; on
//! non-trading days with zero live articles the most recent still-valid
//! snapshot is adopted instead. The durable binding is an external
//! collaborator; the in-memory implementation here backs tests and local
//! runs.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::ingest::types::{NewsArticle, ProviderKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekendCacheEntry {
    pub symbol: String,
    pub articles: Vec<NewsArticle>,
    pub fetch_date: NaiveDate,
    pub valid_until: DateTime<Utc>,
    pub source_providers: Vec<ProviderKind>,
}

impl WeekendCacheEntry {
    pub fn new(
        symbol: &str,
        articles: Vec<NewsArticle>,
        source_providers: Vec<ProviderKind>,
        now: DateTime<Utc>,
        valid_hours: i64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            articles,
            fetch_date: now.date_naive(),
            valid_until: now + Duration::hours(valid_hours),
            source_providers,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

/// Saturday/Sunday are non-trading. Exchange holidays are out of scope for
/// the calendar; the fallback only has to cover the predictable gap.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[async_trait::async_trait]
pub trait WeekendStore: Send + Sync {
    /// Most recent entry for `symbol` still valid at `as_of`, if any.
    async fn get(&self, symbol: &str, as_of: DateTime<Utc>) -> Option<WeekendCacheEntry>;
    async fn put(&self, entry: WeekendCacheEntry);
}

/// Keeps the latest snapshot per symbol. Lock is held only for map access.
#[derive(Debug, Default)]
pub struct MemoryWeekendStore {
    inner: Mutex<HashMap<String, WeekendCacheEntry>>,
}

impl MemoryWeekendStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WeekendStore for MemoryWeekendStore {
    async fn get(&self, symbol: &str, as_of: DateTime<Utc>) -> Option<WeekendCacheEntry> {
        let map = self.inner.lock().expect("weekend store mutex poisoned");
        map.get(symbol)
            .filter(|entry| entry.is_valid_at(as_of))
            .cloned()
    }

    async fn put(&self, entry: WeekendCacheEntry) {
        let mut map = self.inner.lock().expect("weekend store mutex poisoned");
        // Newer fetch_date wins; same-day snapshots overwrite.
        match map.get(&entry.symbol) {
            Some(existing) if existing.fetch_date > entry.fetch_date => {}
            _ => {
                map.insert(entry.symbol.clone(), entry);
            }
        }
    }
}
