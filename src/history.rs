//! history.rs: bounded in-memory log of recent consensus outcomes, for the
//! debug surface and quick production diagnostics.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analyze::types::Direction;
use crate::consensus::{ConsensusResult, RecommendedAction, SignalStrength};

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub ts_unix: u64,
    pub symbol: String,
    pub dominant: Direction,
    pub confidence: f32,
    pub agreement: f32,
    pub signal: SignalStrength,
    pub action: RecommendedAction,
}

#[derive(Debug)]
pub struct History {
    inner: Mutex<Vec<HistoryEntry>>,
    cap: usize,
}

impl History {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.min(10_000),
        }
    }

    pub fn push(&self, symbol: &str, result: &ConsensusResult) {
        let entry = HistoryEntry {
            ts_unix: now_unix(),
            symbol: symbol.to_string(),
            dominant: result.dominant_sentiment,
            confidence: result.overall_confidence,
            agreement: result.model_agreement,
            signal: result.signal_strength,
            action: result.recommended_action,
        };

        let mut v = self.inner.lock().expect("history mutex poisoned");
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<HistoryEntry> {
        let v = self.inner.lock().expect("history mutex poisoned");
        let len = v.len();
        let start = len.saturating_sub(n);
        v[start..].to_vec()
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::skip_result;

    #[test]
    fn capacity_is_enforced_oldest_dropped() {
        let h = History::with_capacity(3);
        for i in 0..5 {
            h.push(&format!("SYM{i}"), &skip_result(Vec::new()));
        }
        let rows = h.snapshot_last_n(10);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].symbol, "SYM2");
        assert_eq!(rows[2].symbol, "SYM4");
    }
}
