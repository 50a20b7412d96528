use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::pipeline::{AnalysisPipeline, SymbolReport};
use crate::quotes::{Quote, QuoteService};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub quotes: Arc<QuoteService>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/analyze", get(analyze_symbol))
        .route("/quote", get(quote))
        .route("/debug/rolling", get(debug_rolling))
        .route("/debug/history", get(debug_history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn symbol_from(params: &HashMap<String, String>) -> String {
    params
        .get("symbol")
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "DJI".to_string())
}

async fn analyze_symbol(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<SymbolReport> {
    let symbol = symbol_from(&params);
    Json(state.pipeline.analyze_symbol(&symbol).await)
}

async fn quote(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Option<Quote>> {
    let symbol = symbol_from(&params);
    Json(state.quotes.get_quote(&symbol).await)
}

#[derive(serde::Serialize)]
struct RollingInfo {
    window_secs: u64,
    average: f32,
    count: usize,
}

async fn debug_rolling(State(state): State<AppState>) -> Json<RollingInfo> {
    let rolling = state.pipeline.rolling();
    let (avg, n) = rolling.average_and_count();
    Json(RollingInfo {
        window_secs: rolling.window_secs(),
        average: avg,
        count: n,
    })
}

#[derive(serde::Serialize)]
struct HistoryOut {
    ts_unix: u64,
    symbol: String,
    dominant: String,
    confidence: f32,
    agreement: f32,
    signal: crate::consensus::SignalStrength,
    action: crate::consensus::RecommendedAction,
}

async fn debug_history(State(state): State<AppState>) -> Json<Vec<HistoryOut>> {
    let rows = state.pipeline.history().snapshot_last_n(10);
    let out = rows
        .into_iter()
        .map(|h| HistoryOut {
            ts_unix: h.ts_unix,
            symbol: h.symbol,
            dominant: h.dominant.as_str().to_string(),
            confidence: h.confidence,
            agreement: h.agreement,
            signal: h.signal,
            action: h.action,
        })
        .collect::<Vec<_>>();
    Json(out)
}
