//! # Analysis Pipeline
//! The one exposed entry point: aggregate news, fan out to both models,
//! apply the fallback ladder, and blend the consensus. Internally concurrent,
//! externally a single call that never fails under normal operation; data
//! problems come back inside the report, not as errors.

use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::analyze::types::ModelOutput;
use crate::analyze::DualModelAnalyzer;
use crate::consensus::{self, ConsensusConfig, ConsensusResult};
use crate::history::History;
use crate::ingest::types::{AggregationMetadata, NewsArticle, ProviderError};
use crate::ingest::NewsAggregator;
use crate::persist::{ErrorSink, ErrorSummary};
use crate::rolling::RollingWindow;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Symbol analyses served.");
        describe_counter!(
            "pipeline_fallback_total",
            "Analyses resolved via the single-model fallback."
        );
        describe_counter!(
            "pipeline_skips_total",
            "Analyses that produced a SKIP (no actionable signal)."
        );
    });
}

/// Everything a reporting/dashboard consumer needs for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub articles: Vec<NewsArticle>,
    pub provider_errors: Vec<ProviderError>,
    pub metadata: AggregationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_a: Option<ModelOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_b: Option<ModelOutput>,
    pub consensus: ConsensusResult,
}

pub struct AnalysisPipeline {
    aggregator: NewsAggregator,
    analyzer: DualModelAnalyzer,
    consensus_cfg: ConsensusConfig,
    error_sink: Arc<dyn ErrorSink>,
    rolling: Arc<RollingWindow>,
    history: Arc<History>,
}

impl AnalysisPipeline {
    pub fn new(
        aggregator: NewsAggregator,
        analyzer: DualModelAnalyzer,
        consensus_cfg: ConsensusConfig,
        error_sink: Arc<dyn ErrorSink>,
        rolling: Arc<RollingWindow>,
        history: Arc<History>,
    ) -> Self {
        Self {
            aggregator,
            analyzer,
            consensus_cfg,
            error_sink,
            rolling,
            history,
        }
    }

    /// Analyze one symbol end to end. Any error escaping this function is a
    /// programming/configuration defect, never a data-availability condition.
    pub async fn analyze_symbol(&self, symbol: &str) -> SymbolReport {
        ensure_metrics_described();
        counter!("pipeline_runs_total").increment(1);

        let aggregated = self.aggregator.aggregate(symbol).await;
        let (outcome_a, outcome_b) = self
            .analyzer
            .analyze(symbol, &aggregated.articles)
            .await;

        let no_articles = aggregated.articles.is_empty();
        let (model_a, model_b, consensus) = match (outcome_a, outcome_b) {
            _ if no_articles => {
                // Nothing to analyze: canonical no-signal outcome regardless
                // of how the (short-circuited) models answered.
                counter!("pipeline_skips_total").increment(1);
                (
                    Some(ModelOutput::no_data(crate::analyze::narrative::MODEL_ID)),
                    Some(ModelOutput::no_data(crate::analyze::classifier::MODEL_ID)),
                    consensus::skip_result(Vec::new()),
                )
            }
            (Ok(a), Ok(b)) => {
                let result = consensus::consensus(&a, &b, &self.consensus_cfg);
                (Some(a), Some(b), result)
            }
            (Ok(a), Err(fb)) => {
                counter!("pipeline_fallback_total").increment(1);
                let result = consensus::fallback_from_single(&a, fb, &self.consensus_cfg);
                (Some(a), None, result)
            }
            (Err(fa), Ok(b)) => {
                counter!("pipeline_fallback_total").increment(1);
                let result = consensus::fallback_from_single(&b, fa, &self.consensus_cfg);
                (None, Some(b), result)
            }
            (Err(fa), Err(fb)) => {
                counter!("pipeline_skips_total").increment(1);
                (None, None, consensus::skip_result(vec![fa, fb]))
            }
        };

        if !aggregated.provider_errors.is_empty() {
            let summary = ErrorSummary::from_errors(&aggregated.provider_errors);
            if let Err(e) = self.error_sink.record(symbol, &summary).await {
                tracing::warn!(symbol, error = %e, "error sink rejected summary");
            }
        }

        self.rolling.record(consensus.weighted_score, None);
        self.history.push(symbol, &consensus);

        tracing::info!(
            symbol,
            articles = aggregated.articles.len(),
            provider_errors = aggregated.provider_errors.len(),
            dominant = consensus.dominant_sentiment.as_str(),
            confidence = consensus.overall_confidence,
            signal = ?consensus.signal_strength,
            "symbol analysis complete"
        );

        SymbolReport {
            symbol: symbol.to_string(),
            articles: aggregated.articles,
            provider_errors: aggregated.provider_errors,
            metadata: aggregated.metadata,
            model_a,
            model_b,
            consensus,
        }
    }

    pub fn rolling(&self) -> &Arc<RollingWindow> {
        &self.rolling
    }

    pub fn history(&self) -> &Arc<History> {
        &self.history
    }
}
