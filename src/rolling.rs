//! # Rolling Window
//! Sliding window over recent weighted consensus scores (default 48h).
//!
//! Informational only: the window feeds the debug surface and never gates a
//! signal. Samples are pruned on insert, so memory stays bounded by traffic.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Thread-safe rolling time window over weighted scores.
#[derive(Debug)]
pub struct RollingWindow {
    inner: Mutex<Inner>,
    window: Duration,
}

#[derive(Debug)]
struct Inner {
    /// Stored samples as `(unix_seconds, weighted_score)`.
    buf: VecDeque<(u64, f32)>,
}

impl RollingWindow {
    pub fn with_window(window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
            }),
            window,
        }
    }

    /// Convenience constructor for 48h window.
    pub fn new_48h() -> Self {
        Self::with_window(Duration::from_secs(48 * 3600))
    }

    /// Record a new observation. If `ts_unix` is `None`, current time is used.
    pub fn record(&self, score: f32, ts_unix: Option<u64>) {
        let now = now_unix();
        let ts = ts_unix.unwrap_or(now);
        let cutoff = now.saturating_sub(self.window.as_secs());

        let mut inner = self.inner.lock().expect("rolling window mutex poisoned");

        inner.buf.push_back((ts, score));
        while let Some(&(t, _)) = inner.buf.front() {
            if t < cutoff {
                inner.buf.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average weighted score and sample count within the window.
    pub fn average_and_count(&self) -> (f32, usize) {
        let now = now_unix();
        let cutoff = now.saturating_sub(self.window.as_secs());

        let inner = self.inner.lock().expect("rolling window mutex poisoned");
        let mut sum = 0.0f64;
        let mut n: usize = 0;

        for &(t, s) in inner.buf.iter().rev() {
            if t < cutoff {
                break; // older values are at the front; can stop early
            }
            sum += s as f64;
            n += 1;
        }

        let avg = if n > 0 { (sum / n as f64) as f32 } else { 0.0 };
        (avg, n)
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_over_recent_samples() {
        let w = RollingWindow::new_48h();
        w.record(0.4, None);
        w.record(-0.2, None);
        let (avg, n) = w.average_and_count();
        assert_eq!(n, 2);
        assert!((avg - 0.1).abs() < 1e-6);
    }

    #[test]
    fn samples_outside_window_are_pruned() {
        let w = RollingWindow::with_window(Duration::from_secs(100));
        let now = now_unix();
        w.record(1.0, Some(now - 500));
        w.record(0.5, Some(now));
        let (avg, n) = w.average_and_count();
        assert_eq!(n, 1);
        assert!((avg - 0.5).abs() < 1e-6);
    }
}
