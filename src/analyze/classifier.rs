//! Model B: independent per-article classification.
//!
//! Each article's title+summary fragment is scored against a financial
//! lexicon (with a short negation window) and labeled positive/negative/
//! neutral with a per-article confidence. The batch aggregate applies the
//! 1.5x dominance rule. A single unusable article is excluded from the
//! aggregate, never fatal to the batch.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::analyze::types::{ArticleBreakdown, Direction, ModelOutput};
use crate::ingest::types::NewsArticle;

pub const MODEL_ID: &str = "article-classifier";

/// Ratio by which one directional count must beat the other to win the batch.
const DOMINANCE_RATIO: f32 = 1.5;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

#[derive(Debug, Clone)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (score, token count). A negator within the previous 1..=3
    /// tokens inverts the sign of a lexicon hit.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let w = tokens[i].as_str();
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));

            let base = self.word_score(w);
            if base != 0 {
                score += if negated { -base } else { base };
            }
        }

        (score, tokens.len())
    }

    /// Classify one fragment. `None` means the fragment is unusable (no
    /// tokens) and must be excluded from the batch aggregate.
    pub fn classify_fragment(&self, text: &str) -> Option<(Direction, f32)> {
        let (score, tokens) = self.score_text(text);
        if tokens == 0 {
            return None;
        }
        let label = if score > 0 {
            Direction::Bullish
        } else if score < 0 {
            Direction::Bearish
        } else {
            Direction::Neutral
        };
        Some((label, fragment_confidence(score)))
    }

    /// Batch aggregation over up to `max_articles` articles.
    pub fn classify_articles(&self, articles: &[NewsArticle], max_articles: usize) -> ModelOutput {
        let mut breakdown = Vec::new();
        let mut bullish_count = 0usize;
        let mut bearish_count = 0usize;
        let mut neutral_count = 0usize;
        let mut confidence_sum = 0.0f32;

        for article in articles.iter().take(max_articles) {
            let fragment = format!("{}. {}", article.title, article.summary);
            let Some((label, confidence)) = self.classify_fragment(&fragment) else {
                continue;
            };
            match label {
                Direction::Bullish => bullish_count += 1,
                Direction::Bearish => bearish_count += 1,
                Direction::Neutral => neutral_count += 1,
            }
            confidence_sum += confidence;
            breakdown.push(ArticleBreakdown {
                title: article.title.clone(),
                label,
                confidence,
            });
        }

        let analyzed = breakdown.len();
        if analyzed == 0 {
            return ModelOutput::no_data(MODEL_ID);
        }

        let direction = if bullish_count as f32 > bearish_count as f32 * DOMINANCE_RATIO {
            Direction::Bullish
        } else if bearish_count as f32 > bullish_count as f32 * DOMINANCE_RATIO {
            Direction::Bearish
        } else {
            Direction::Neutral
        };
        let confidence = confidence_sum / analyzed as f32;

        let reasoning = format!(
            "{bullish_count} positive / {bearish_count} negative / {neutral_count} neutral across {analyzed} articles"
        );

        ModelOutput {
            model_id: MODEL_ID.to_string(),
            direction,
            confidence,
            reasoning,
            articles_analyzed: analyzed,
            breakdown: Some(breakdown),
        }
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Confidence of one fragment's label from its absolute score.
/// Zero-score fragments are a weak but valid neutral read.
fn fragment_confidence(score: i32) -> f32 {
    if score == 0 {
        0.4
    } else {
        (0.5 + 0.1 * score.unsigned_abs().min(4) as f32).min(0.9)
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "without"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::ingest::types::ArticleOrigin;

    fn article(title: &str, summary: &str) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            summary: summary.to_string(),
            source: "Test Wire".to_string(),
            published_at: Utc::now(),
            source_type: ArticleOrigin::PooledCache,
        }
    }

    #[test]
    fn positive_headline_scores_positive() {
        let c = LexiconClassifier::new();
        let (score, _) = c.score_text("Record profit beats expectations, strong growth");
        assert!(score > 0, "got {score}");
    }

    #[test]
    fn negation_flips_the_sign() {
        let c = LexiconClassifier::new();
        let (pos, _) = c.score_text("growth is strong");
        let (neg, _) = c.score_text("growth is not strong");
        assert!(pos > 0);
        assert!(neg < pos);
    }

    #[test]
    fn empty_fragment_is_excluded() {
        let c = LexiconClassifier::new();
        assert!(c.classify_fragment("   ...   ").is_none());
    }

    #[test]
    fn dominance_ratio_gates_direction() {
        let c = LexiconClassifier::new();
        // 2 bullish vs 1 bearish: 2 > 1.5 is true -> bullish
        let articles = vec![
            article("Shares surge on record profit", "Strong quarter, raised guidance."),
            article("Upgrade fuels rally", "Analysts bullish after beat."),
            article("Lawsuit risk weighs", "Shares slump on downgrade fears."),
        ];
        let out = c.classify_articles(&articles, 10);
        assert_eq!(out.direction, Direction::Bullish);
        assert_eq!(out.articles_analyzed, 3);

        // 1 bullish vs 1 bearish: neither clears the ratio -> neutral
        let articles = vec![
            article("Shares surge on record profit", "Strong quarter."),
            article("Shares slump after miss", "Weak outlook, downgrade."),
        ];
        let out = c.classify_articles(&articles, 10);
        assert_eq!(out.direction, Direction::Neutral);
    }

    #[test]
    fn aggregate_confidence_is_mean_of_fragments() {
        let c = LexiconClassifier::new();
        let articles = vec![
            article("Record profit, strong growth, beats", ""),
            article("Quiet session expected", "Calendar light."),
        ];
        let out = c.classify_articles(&articles, 10);
        let expected: f32 = {
            let a = c
                .classify_fragment("Record profit, strong growth, beats. ")
                .unwrap()
                .1;
            let b = c
                .classify_fragment("Quiet session expected. Calendar light.")
                .unwrap()
                .1;
            (a + b) / 2.0
        };
        assert!((out.confidence - expected).abs() < 1e-6);
    }

    #[test]
    fn cap_respects_max_articles() {
        let c = LexiconClassifier::new();
        let articles: Vec<_> = (0..15)
            .map(|i| article(&format!("Strong rally continues {i}"), "Gains broaden."))
            .collect();
        let out = c.classify_articles(&articles, 10);
        assert_eq!(out.articles_analyzed, 10);
    }

    #[test]
    fn empty_batch_returns_no_data() {
        let c = LexiconClassifier::new();
        let out = c.classify_articles(&[], 10);
        assert_eq!(out.direction, Direction::Neutral);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.reasoning, "No news data available");
    }
}
