use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub max_requests: u32,
    pub window_ms: u64,
    pub in_window: u32,
    /// Estimated wait time until a slot frees up (ms), if currently full.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimiterConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(60_000))
    }
}

/// Sliding-window pacer for callers.
///
/// The client itself never blocks on this; it reflects the advisory
/// `rate_limit` settings so callers can pace themselves before calling it.
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    // Start times of the requests inside the current window, oldest first.
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self {
            cfg,
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.cfg.window {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    // Time until `oldest` leaves the window. Avoids `Instant` arithmetic so
    // very long windows cannot overflow.
    fn wait_for(&self, oldest: Instant, now: Instant) -> Duration {
        self.cfg.window.saturating_sub(now.duration_since(oldest))
    }

    /// Takes a slot, sleeping until one is free.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                self.prune(&mut window, now);
                if (window.len() as u32) < self.cfg.max_requests {
                    window.push_back(now);
                    return;
                }
                match window.front() {
                    Some(oldest) => self.wait_for(*oldest, now),
                    None => Duration::ZERO,
                }
            };
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter full, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes a slot if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        self.prune(&mut window, now);
        if (window.len() as u32) < self.cfg.max_requests {
            window.push_back(now);
            true
        } else {
            false
        }
    }

    pub async fn remaining(&self) -> u32 {
        let mut window = self.window.lock().await;
        self.prune(&mut window, Instant::now());
        self.cfg.max_requests.saturating_sub(window.len() as u32)
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        self.prune(&mut window, now);
        let in_window = window.len() as u32;
        let estimated_wait_ms = if in_window >= self.cfg.max_requests {
            window
                .front()
                .map(|oldest| millis(self.wait_for(*oldest, now)))
        } else {
            None
        };
        RateLimiterSnapshot {
            max_requests: self.cfg.max_requests,
            window_ms: millis(self.cfg.window),
            in_window,
            estimated_wait_ms,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
