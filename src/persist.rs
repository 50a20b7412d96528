//! Bounded, serializable error summaries handed to the persistence
//! collaborator. The cap and truncation below bound one persisted record to
//! roughly 3 KB no matter how noisy the providers were.

use std::sync::Mutex;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ingest::types::{ProviderError, ProviderErrorCode, ProviderKind};

pub const MAX_PERSISTED_ERRORS: usize = 10;
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Compact single-error record. Field names are part of the storage contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedError {
    #[serde(rename = "p")]
    pub provider: ProviderKind,
    #[serde(rename = "c")]
    pub code: ProviderErrorCode,
    #[serde(rename = "m")]
    pub message: String,
    #[serde(rename = "t")]
    pub date: NaiveDate,
    #[serde(rename = "r")]
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: usize,
    pub errors: Vec<PersistedError>,
}

impl ErrorSummary {
    pub fn from_errors(errors: &[ProviderError]) -> Self {
        let errors: Vec<PersistedError> = errors
            .iter()
            .take(MAX_PERSISTED_ERRORS)
            .map(|e| PersistedError {
                provider: e.provider,
                code: e.code,
                message: truncate_chars(&e.message, MAX_MESSAGE_CHARS),
                date: e.timestamp.date_naive(),
                retryable: e.retryable,
            })
            .collect();
        Self {
            kind: "provider_errors".to_string(),
            count: errors.len(),
            errors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Persistence collaborator boundary.
#[async_trait::async_trait]
pub trait ErrorSink: Send + Sync {
    async fn record(&self, symbol: &str, summary: &ErrorSummary) -> anyhow::Result<()>;
}

/// Default sink when no durable binding is wired: structured log lines only.
pub struct TracingErrorSink;

#[async_trait::async_trait]
impl ErrorSink for TracingErrorSink {
    async fn record(&self, symbol: &str, summary: &ErrorSummary) -> anyhow::Result<()> {
        tracing::info!(
            symbol,
            count = summary.count,
            payload = %serde_json::to_string(summary).unwrap_or_default(),
            "provider error summary"
        );
        Ok(())
    }
}

/// Test/diagnostics sink keeping summaries in memory.
#[derive(Debug, Default)]
pub struct MemoryErrorSink {
    records: Mutex<Vec<(String, ErrorSummary)>>,
}

impl MemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<(String, ErrorSummary)> {
        self.records.lock().expect("error sink mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl ErrorSink for MemoryErrorSink {
    async fn record(&self, symbol: &str, summary: &ErrorSummary) -> anyhow::Result<()> {
        self.records
            .lock()
            .expect("error sink mutex poisoned")
            .push((symbol.to_string(), summary.clone()));
        Ok(())
    }
}
