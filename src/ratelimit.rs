//! # Window Rate Limiter
//! Shared requests-per-window limiter consulted before upstream calls.
//!
//! Thread-safe and cheap: a mutex-guarded deque of recent call instants,
//! pruned on every check. `allow` is the non-blocking probe; `acquire` parks
//! the caller until a slot frees up.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, Instant},
};

#[derive(Debug)]
pub struct WindowLimiter {
    inner: Mutex<VecDeque<Instant>>,
    max_per_window: u32,
    window: Duration,
}

impl WindowLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            max_per_window: max_per_window.max(1),
            window,
        }
    }

    /// Take a slot if one is free. Never blocks.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut buf = self.inner.lock().expect("rate limiter mutex poisoned");
        while let Some(&front) = buf.front() {
            if now.duration_since(front) >= self.window {
                buf.pop_front();
            } else {
                break;
            }
        }
        if buf.len() < self.max_per_window as usize {
            buf.push_back(now);
            true
        } else {
            false
        }
    }

    /// Wait until a slot is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let now = Instant::now();
                let mut buf = self.inner.lock().expect("rate limiter mutex poisoned");
                while let Some(&front) = buf.front() {
                    if now.duration_since(front) >= self.window {
                        buf.pop_front();
                    } else {
                        break;
                    }
                }
                if buf.len() < self.max_per_window as usize {
                    buf.push_back(now);
                    return;
                }
                // Oldest entry decides when the next slot opens.
                buf.front()
                    .map(|&front| self.window.saturating_sub(now.duration_since(front)))
                    .unwrap_or(self.window)
            };
            tokio::time::sleep(wait.max(Duration::from_millis(5))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_cap_then_denies() {
        let limiter = WindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn window_expiry_frees_slots() {
        let limiter = WindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.allow());
        assert!(!limiter.allow());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.allow());
    }

    #[tokio::test]
    async fn acquire_waits_for_a_slot() {
        let limiter = WindowLimiter::new(1, Duration::from_millis(30));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
