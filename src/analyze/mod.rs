// src/analyze/mod.rs
//! Dual-model sentiment analysis: Model A (contextual narrative) and Model B
//! (per-article classification) run concurrently with independent failure
//! isolation. One model being slow or dead never delays or corrupts the
//! other's result.

pub mod classifier;
pub mod narrative;
pub mod types;

use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::analyze::classifier::LexiconClassifier;
use crate::analyze::narrative::DynNarrativeBackend;
use crate::analyze::types::{ModelFailure, ModelOutcome, ModelOutput};
use crate::config::PipelineConfig;
use crate::ingest::types::NewsArticle;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("analyze_runs_total", "Dual-model analysis invocations.");
        describe_counter!(
            "analyze_model_failures_total",
            "Model invocations that failed or timed out."
        );
        describe_counter!(
            "analyze_empty_short_circuits_total",
            "Analyses short-circuited because no articles were available."
        );
    });
}

/// Runs both models over an aggregated article set.
pub struct DualModelAnalyzer {
    backend: DynNarrativeBackend,
    classifier: LexiconClassifier,
    top_k: usize,
    max_articles: usize,
    model_timeout: Duration,
}

impl DualModelAnalyzer {
    pub fn new(backend: DynNarrativeBackend, cfg: &PipelineConfig) -> Self {
        Self {
            backend,
            classifier: LexiconClassifier::new(),
            top_k: cfg.narrative_top_k,
            max_articles: cfg.classifier_max_articles,
            model_timeout: cfg.model_timeout(),
        }
    }

    /// Fan out to both models, join on both, and hand back one outcome per
    /// model. Never returns an error itself; per-model failures are data.
    pub async fn analyze(
        &self,
        symbol: &str,
        articles: &[NewsArticle],
    ) -> (ModelOutcome, ModelOutcome) {
        ensure_metrics_described();
        counter!("analyze_runs_total").increment(1);

        if articles.is_empty() {
            counter!("analyze_empty_short_circuits_total").increment(1);
            return (
                Ok(ModelOutput::no_data(narrative::MODEL_ID)),
                Ok(ModelOutput::no_data(classifier::MODEL_ID)),
            );
        }

        let narrative_task = {
            let backend = self.backend.clone();
            let symbol = symbol.to_string();
            let articles = articles.to_vec();
            let top_k = self.top_k;
            let budget = self.model_timeout;
            tokio::spawn(async move {
                match tokio::time::timeout(
                    budget,
                    narrative::analyze_narrative(backend.as_ref(), &symbol, &articles, top_k),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ModelFailure {
                        model_id: narrative::MODEL_ID.to_string(),
                        message: format!("timed out after {budget:?}"),
                    }),
                }
            })
        };

        let classifier_task = {
            let classifier = self.classifier.clone();
            let articles = articles.to_vec();
            let max_articles = self.max_articles;
            let budget = self.model_timeout;
            tokio::spawn(async move {
                // Classification is CPU-only, but it runs under the same
                // per-model budget and isolation as the narrative model.
                match tokio::time::timeout(budget, async move {
                    classifier.classify_articles(&articles, max_articles)
                })
                .await
                {
                    Ok(output) => Ok(output),
                    Err(_) => Err(ModelFailure {
                        model_id: classifier::MODEL_ID.to_string(),
                        message: format!("timed out after {budget:?}"),
                    }),
                }
            })
        };

        let (narrative_joined, classifier_joined) = tokio::join!(narrative_task, classifier_task);

        let a = flatten_join(narrative_joined, narrative::MODEL_ID);
        let b = flatten_join(classifier_joined, classifier::MODEL_ID);

        for outcome in [&a, &b] {
            if let Err(failure) = outcome {
                counter!("analyze_model_failures_total").increment(1);
                tracing::warn!(model = %failure.model_id, error = %failure.message, "model invocation failed");
            }
        }

        (a, b)
    }
}

/// A panicked model task is an invocation failure like any other.
fn flatten_join(
    joined: Result<ModelOutcome, tokio::task::JoinError>,
    model_id: &str,
) -> ModelOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => Err(ModelFailure {
            model_id: model_id.to_string(),
            message: format!("model task panicked: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::narrative::{DisabledBackend, MockNarrativeBackend};
    use crate::analyze::types::Direction;
    use crate::ingest::types::ArticleOrigin;
    use chrono::Utc;
    use std::sync::Arc;

    fn article(title: &str) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            summary: "Shares rally on strong profit.".to_string(),
            source: "Wire".to_string(),
            published_at: Utc::now(),
            source_type: ArticleOrigin::PooledCache,
        }
    }

    fn analyzer(backend: DynNarrativeBackend) -> DualModelAnalyzer {
        DualModelAnalyzer::new(backend, &PipelineConfig::default())
    }

    #[tokio::test]
    async fn empty_articles_short_circuit_both_models() {
        let a = analyzer(Arc::new(DisabledBackend));
        let (ma, mb) = a.analyze("ACME", &[]).await;
        let ma = ma.unwrap();
        let mb = mb.unwrap();
        assert_eq!(ma.direction, Direction::Neutral);
        assert_eq!(ma.confidence, 0.0);
        assert_eq!(mb.direction, Direction::Neutral);
        assert_eq!(mb.confidence, 0.0);
    }

    #[tokio::test]
    async fn one_dead_backend_does_not_take_down_the_classifier() {
        let a = analyzer(Arc::new(DisabledBackend));
        let (ma, mb) = a.analyze("ACME", &[article("Rally extends")]).await;
        assert!(ma.is_err());
        let mb = mb.unwrap();
        assert_eq!(mb.articles_analyzed, 1);
    }

    #[tokio::test]
    async fn both_models_complete_independently() {
        let a = analyzer(Arc::new(MockNarrativeBackend {
            fixed: "bullish, confidence 0.8, improving guidance".to_string(),
        }));
        let (ma, mb) = a.analyze("ACME", &[article("Rally extends")]).await;
        let ma = ma.unwrap();
        assert_eq!(ma.direction, Direction::Bullish);
        assert!((ma.confidence - 0.8).abs() < 1e-6);
        assert!(mb.is_ok());
    }
}
