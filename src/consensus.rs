//! # Consensus Engine
//! Pure, deterministic mapping from two independent model outputs to a single
//! calibrated signal. No I/O, suitable for unit tests and offline evaluation.
//!
//! Policy: a lookup table scores directional agreement, a weighted signed
//! score picks the dominant sentiment, and confidence is calibrated with an
//! agreement bonus and a spread penalty before the categorical signal and
//! risk level are derived. The caller applies the fallback ladder first, so
//! this engine only ever sees two well-formed outputs.

use serde::{Deserialize, Serialize};

use crate::analyze::types::{clamp01, Direction, ModelFailure, ModelOutput};

fn default_weight_narrative() -> f32 {
    0.6
}
fn default_weight_classifier() -> f32 {
    0.4
}
fn default_dominant_threshold() -> f32 {
    0.3
}
fn default_agreement_bonus_high() -> f32 {
    0.15
}
fn default_agreement_bonus_mid() -> f32 {
    0.05
}
fn default_agreement_high_threshold() -> f32 {
    0.8
}
fn default_agreement_mid_threshold() -> f32 {
    0.6
}
fn default_spread_penalty_threshold() -> f32 {
    0.3
}
fn default_spread_penalty() -> f32 {
    0.1
}
fn default_confidence_floor() -> f32 {
    0.05
}
fn default_confidence_ceiling() -> f32 {
    0.95
}
fn default_combined_confidence_weight() -> f32 {
    0.7
}
fn default_combined_agreement_weight() -> f32 {
    0.3
}
fn default_disagreement_threshold() -> f32 {
    0.4
}
fn default_strong_band() -> f32 {
    0.8
}
fn default_act_band() -> f32 {
    0.65
}
fn default_hold_band() -> f32 {
    0.4
}
fn default_fallback_multiplier() -> f32 {
    0.8
}
fn default_risk_spread_threshold() -> f32 {
    0.4
}

/// Every tunable of the engine in one place, with the documented defaults.
/// Loaded as the `[consensus]` table of the pipeline config.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    /// Contextual model weight (trusted slightly more for nuance).
    #[serde(default = "default_weight_narrative")]
    pub weight_narrative: f32,
    #[serde(default = "default_weight_classifier")]
    pub weight_classifier: f32,
    /// |weighted score| above this picks a directional dominant sentiment.
    #[serde(default = "default_dominant_threshold")]
    pub dominant_threshold: f32,
    #[serde(default = "default_agreement_high_threshold")]
    pub agreement_high_threshold: f32,
    #[serde(default = "default_agreement_mid_threshold")]
    pub agreement_mid_threshold: f32,
    #[serde(default = "default_agreement_bonus_high")]
    pub agreement_bonus_high: f32,
    #[serde(default = "default_agreement_bonus_mid")]
    pub agreement_bonus_mid: f32,
    #[serde(default = "default_spread_penalty_threshold")]
    pub spread_penalty_threshold: f32,
    #[serde(default = "default_spread_penalty")]
    pub spread_penalty: f32,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,
    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f32,
    #[serde(default = "default_combined_confidence_weight")]
    pub combined_confidence_weight: f32,
    #[serde(default = "default_combined_agreement_weight")]
    pub combined_agreement_weight: f32,
    /// Below this agreement the signal is DISAGREEMENT regardless of confidence.
    #[serde(default = "default_disagreement_threshold")]
    pub disagreement_threshold: f32,
    #[serde(default = "default_strong_band")]
    pub strong_band: f32,
    #[serde(default = "default_act_band")]
    pub act_band: f32,
    #[serde(default = "default_hold_band")]
    pub hold_band: f32,
    /// Surviving model's confidence is scaled by this in single-model fallback.
    #[serde(default = "default_fallback_multiplier")]
    pub fallback_multiplier: f32,
    #[serde(default = "default_risk_spread_threshold")]
    pub risk_spread_threshold: f32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty consensus config must deserialize")
    }
}

/// Categorical recommendation strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    StrongBuy,
    StrongSell,
    Buy,
    Sell,
    Hold,
    Caution,
    Disagreement,
    Fallback,
    Skip,
}

/// What a downstream consumer should do with the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    StrongBuy,
    StrongSell,
    Buy,
    Sell,
    Hold,
    Caution,
    Avoid,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Per-model slice of the blend, kept for explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelContribution {
    pub model_id: String,
    pub direction: Direction,
    pub confidence: f32,
    pub weight: f32,
}

/// The blended signal. Derived purely from the two model outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub dominant_sentiment: Direction,
    pub overall_confidence: f32,
    pub weighted_score: f32,
    pub model_agreement: f32,
    pub confidence_spread: f32,
    pub signal_strength: SignalStrength,
    pub risk_level: RiskLevel,
    pub recommended_action: RecommendedAction,
    pub model_contributions: Vec<ModelContribution>,
    /// Invocation failures that forced the fallback ladder, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_errors: Vec<ModelFailure>,
}

/// Directional agreement lookup. Asymmetric on purpose: a neutral first model
/// hedging against a directional second one (0.6) reads differently than a
/// directional call diluted by a neutral partner (0.3).
pub fn agreement_score(a: Direction, b: Direction) -> f32 {
    use Direction::*;
    match (a, b) {
        (x, y) if x == y => 1.0,
        (Bullish, Bearish) | (Bearish, Bullish) => 0.0,
        (Neutral, Bullish) | (Neutral, Bearish) => 0.6,
        (Bullish, Neutral) | (Bearish, Neutral) => 0.3,
        _ => unreachable!("agreement table is total over Direction x Direction"),
    }
}

/// Combine two well-formed model outputs into the calibrated signal.
pub fn consensus(a: &ModelOutput, b: &ModelOutput, cfg: &ConsensusConfig) -> ConsensusResult {
    // 1) Agreement
    let agreement = agreement_score(a.direction, b.direction);

    // 2) Weighted signed score
    let weighted_score = cfg.weight_narrative * a.direction.sign() * a.confidence
        + cfg.weight_classifier * b.direction.sign() * b.confidence;

    // 3) Dominant sentiment
    let dominant_sentiment = if weighted_score > cfg.dominant_threshold {
        Direction::Bullish
    } else if weighted_score < -cfg.dominant_threshold {
        Direction::Bearish
    } else {
        Direction::Neutral
    };

    // 4) Calibrated confidence
    let base = (a.confidence + b.confidence) / 2.0;
    let bonus = if agreement > cfg.agreement_high_threshold {
        cfg.agreement_bonus_high
    } else if agreement > cfg.agreement_mid_threshold {
        cfg.agreement_bonus_mid
    } else {
        0.0
    };
    let confidence_spread = (a.confidence - b.confidence).abs();
    let penalty = if confidence_spread > cfg.spread_penalty_threshold {
        cfg.spread_penalty
    } else {
        0.0
    };
    let overall_confidence =
        (base + bonus - penalty).clamp(cfg.confidence_floor, cfg.confidence_ceiling);

    // 5) Signal strength
    let combined = cfg.combined_confidence_weight * overall_confidence
        + cfg.combined_agreement_weight * agreement;
    let signal_strength = if agreement < cfg.disagreement_threshold {
        SignalStrength::Disagreement
    } else if combined >= cfg.strong_band {
        match dominant_sentiment {
            Direction::Bullish => SignalStrength::StrongBuy,
            Direction::Bearish => SignalStrength::StrongSell,
            Direction::Neutral => SignalStrength::Hold,
        }
    } else if combined >= cfg.act_band {
        match dominant_sentiment {
            Direction::Bullish => SignalStrength::Buy,
            Direction::Bearish => SignalStrength::Sell,
            Direction::Neutral => SignalStrength::Hold,
        }
    } else if combined >= cfg.hold_band {
        SignalStrength::Hold
    } else {
        SignalStrength::Caution
    };

    // 6) Risk level
    let risk_level = risk_for(agreement, overall_confidence, confidence_spread, cfg);

    ConsensusResult {
        dominant_sentiment,
        overall_confidence,
        weighted_score,
        model_agreement: agreement,
        confidence_spread,
        signal_strength,
        risk_level,
        recommended_action: action_for(signal_strength, dominant_sentiment),
        model_contributions: vec![
            ModelContribution {
                model_id: a.model_id.clone(),
                direction: a.direction,
                confidence: a.confidence,
                weight: cfg.weight_narrative,
            },
            ModelContribution {
                model_id: b.model_id.clone(),
                direction: b.direction,
                confidence: b.confidence,
                weight: cfg.weight_classifier,
            },
        ],
        model_errors: Vec::new(),
    }
}

/// Single-model fallback: exactly one model failed. The survivor is used
/// directly with degraded confidence and an explicit FALLBACK strength.
pub fn fallback_from_single(
    survivor: &ModelOutput,
    failed: ModelFailure,
    cfg: &ConsensusConfig,
) -> ConsensusResult {
    let confidence = clamp01(survivor.confidence * cfg.fallback_multiplier);
    let weighted_score = survivor.direction.sign() * confidence;
    ConsensusResult {
        dominant_sentiment: survivor.direction,
        overall_confidence: confidence,
        weighted_score,
        model_agreement: 0.0,
        confidence_spread: 0.0,
        signal_strength: SignalStrength::Fallback,
        risk_level: risk_for(0.0, confidence, 0.0, cfg),
        recommended_action: fallback_action(survivor.direction, confidence, cfg),
        model_contributions: vec![ModelContribution {
            model_id: survivor.model_id.clone(),
            direction: survivor.direction,
            confidence: survivor.confidence,
            weight: 1.0,
        }],
        model_errors: vec![failed],
    }
}

/// Canonical no-signal result: both models failed, or there was nothing to
/// analyze in the first place. Always well-formed, never an error.
pub fn skip_result(model_errors: Vec<ModelFailure>) -> ConsensusResult {
    ConsensusResult {
        dominant_sentiment: Direction::Neutral,
        overall_confidence: 0.0,
        weighted_score: 0.0,
        model_agreement: 0.0,
        confidence_spread: 0.0,
        signal_strength: SignalStrength::Skip,
        risk_level: RiskLevel::High,
        recommended_action: RecommendedAction::Skip,
        model_contributions: Vec::new(),
        model_errors,
    }
}

fn risk_for(agreement: f32, confidence: f32, spread: f32, cfg: &ConsensusConfig) -> RiskLevel {
    if agreement < cfg.disagreement_threshold || confidence < cfg.hold_band {
        RiskLevel::High
    } else if spread > cfg.risk_spread_threshold || agreement < cfg.agreement_mid_threshold {
        RiskLevel::Medium
    } else if confidence >= cfg.strong_band && agreement >= cfg.agreement_high_threshold {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

fn action_for(strength: SignalStrength, dominant: Direction) -> RecommendedAction {
    match strength {
        SignalStrength::StrongBuy => RecommendedAction::StrongBuy,
        SignalStrength::StrongSell => RecommendedAction::StrongSell,
        SignalStrength::Buy => RecommendedAction::Buy,
        SignalStrength::Sell => RecommendedAction::Sell,
        SignalStrength::Hold => RecommendedAction::Hold,
        SignalStrength::Caution => RecommendedAction::Caution,
        SignalStrength::Disagreement => RecommendedAction::Avoid,
        SignalStrength::Skip => RecommendedAction::Skip,
        // Fallback actions are derived separately; this arm is for symmetry.
        SignalStrength::Fallback => match dominant {
            Direction::Bullish => RecommendedAction::Buy,
            Direction::Bearish => RecommendedAction::Sell,
            Direction::Neutral => RecommendedAction::Hold,
        },
    }
}

fn fallback_action(
    direction: Direction,
    confidence: f32,
    cfg: &ConsensusConfig,
) -> RecommendedAction {
    if confidence < cfg.hold_band {
        return RecommendedAction::Caution;
    }
    match direction {
        Direction::Bullish => RecommendedAction::Buy,
        Direction::Bearish => RecommendedAction::Sell,
        Direction::Neutral => RecommendedAction::Hold,
    }
}
