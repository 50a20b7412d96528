// src/config.rs
//! Pipeline configuration loaded from `config/pipeline.toml`.
//!
//! Every field has a serde default so a partial (or missing) file still
//! yields a fully usable config. Lookup order:
//! 1) $PIPELINE_CONFIG_PATH
//! 2) config/pipeline.toml
//! 3) built-in defaults

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;

use crate::consensus::ConsensusConfig;

const ENV_PATH: &str = "PIPELINE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/pipeline.toml";

fn default_provider_timeout_secs() -> u64 {
    8
}
fn default_pooled_cache_timeout_secs() -> u64 {
    5
}
fn default_quote_bucket_secs() -> u64 {
    300
}
fn default_quote_ttl_secs() -> u64 {
    300
}
fn default_quote_timeout_secs() -> u64 {
    5
}
fn default_rate_limit_per_window() -> u32 {
    30
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_narrative_top_k() -> usize {
    8
}
fn default_classifier_max_articles() -> usize {
    10
}
fn default_model_timeout_secs() -> u64 {
    12
}
fn default_dedup_similarity() -> f64 {
    0.92
}
fn default_weekend_valid_hours() -> i64 {
    72
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Budget for each external news provider fetch.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// The pooled cache is local and cheap; it gets a tighter budget.
    #[serde(default = "default_pooled_cache_timeout_secs")]
    pub pooled_cache_timeout_secs: u64,

    /// Quote cache key bucket width. All requests inside one bucket share a key.
    #[serde(default = "default_quote_bucket_secs")]
    pub quote_bucket_secs: u64,
    #[serde(default = "default_quote_ttl_secs")]
    pub quote_ttl_secs: u64,
    #[serde(default = "default_quote_timeout_secs")]
    pub quote_timeout_secs: u64,

    /// Shared upstream rate limiter policy (requests per window).
    #[serde(default = "default_rate_limit_per_window")]
    pub rate_limit_per_window: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Model A reads the top-K articles as one context.
    #[serde(default = "default_narrative_top_k")]
    pub narrative_top_k: usize,
    /// Model B classifies up to this many articles independently.
    #[serde(default = "default_classifier_max_articles")]
    pub classifier_max_articles: usize,
    /// Budget for one model invocation (either model).
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Jaro-Winkler threshold above which two normalized titles are the same story.
    #[serde(default = "default_dedup_similarity")]
    pub dedup_similarity: f64,

    /// How long a weekend snapshot remains a valid fallback source.
    #[serde(default = "default_weekend_valid_hours")]
    pub weekend_valid_hours: i64,

    #[serde(default)]
    pub consensus: ConsensusConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Round-trips through serde so the field defaults stay the single
        // source of truth.
        toml::from_str("").expect("empty pipeline config must deserialize")
    }
}

impl PipelineConfig {
    /// Load from a TOML file. Falls back to defaults on read/parse error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path.as_ref()) {
            Ok(s) => match toml::from_str(&s) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.as_ref().display(), "invalid pipeline config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Env-aware loader used at boot.
    pub fn load_default() -> Self {
        let path = env::var(ENV_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PATH));
        Self::load_from_file(path)
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn model_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.model_timeout_secs)
    }
}
