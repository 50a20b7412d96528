// src/analyze/types.rs
//! Shared vocabulary for the two sentiment models.
//!
//! Backends may answer with anything; everything is parsed into the closed
//! `ModelVerdict` set before it crosses the analyzer boundary, so callers
//! can never observe an unparsable model response.

use serde::{Deserialize, Serialize};

/// Directional call of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    /// Sign used in weighted scoring: bullish +1, bearish -1, neutral 0.
    pub fn sign(&self) -> f32 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

/// Closed set a raw model response is parsed into. `ParseFailure` carries the
/// description that ends up in `reasoning`; it never escapes as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelVerdict {
    Bullish(f32),
    Bearish(f32),
    Neutral(f32),
    ParseFailure(String),
}

impl ModelVerdict {
    pub fn direction(&self) -> Direction {
        match self {
            ModelVerdict::Bullish(_) => Direction::Bullish,
            ModelVerdict::Bearish(_) => Direction::Bearish,
            ModelVerdict::Neutral(_) | ModelVerdict::ParseFailure(_) => Direction::Neutral,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            ModelVerdict::Bullish(c) | ModelVerdict::Bearish(c) | ModelVerdict::Neutral(c) => {
                clamp01(*c)
            }
            ModelVerdict::ParseFailure(_) => 0.0,
        }
    }
}

/// Per-article detail attached by the classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleBreakdown {
    pub title: String,
    pub label: Direction,
    pub confidence: f32,
}

/// One model's finished analysis. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub model_id: String,
    pub direction: Direction,
    pub confidence: f32,
    pub reasoning: String,
    pub articles_analyzed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<ArticleBreakdown>>,
}

impl ModelOutput {
    /// Canonical output for "there was nothing to analyze".
    pub fn no_data(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            direction: Direction::Neutral,
            confidence: 0.0,
            reasoning: "No news data available".to_string(),
            articles_analyzed: 0,
            breakdown: None,
        }
    }
}

/// Invocation-level failure of one model (timeout, backend transport, panic).
/// Parse failures are NOT this; they degrade to a neutral `ModelOutput`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model_id: String,
    pub message: String,
}

/// What the analyzer hands the pipeline for each model.
pub type ModelOutcome = Result<ModelOutput, ModelFailure>;

pub(crate) fn clamp01(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}
