//! Per-backend request pacing over a sliding one-minute window

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request limiter
pub struct RateLimiter {
    requests_per_minute: u32,
    last_requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter; 0 disables limiting
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            last_requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Wait until a request fits in the window, then record it
    pub async fn acquire(&self) {
        if self.requests_per_minute == 0 {
            return;
        }
        loop {
            match self.try_acquire().await {
                None => return,
                Some(wait) => {
                    tracing::debug!("Rate limit reached, waiting {}ms", wait.as_millis());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Record a request if the window has room, else return how long to wait
    async fn try_acquire(&self) -> Option<Duration> {
        let mut last = self.last_requests.lock().await;
        let now = Instant::now();

        while let Some(&front) = last.front() {
            if now.duration_since(front) > WINDOW {
                last.pop_front();
            } else {
                break;
            }
        }

        if last.len() >= self.requests_per_minute as usize {
            if let Some(&oldest) = last.front() {
                let elapsed = now.duration_since(oldest);
                if elapsed < WINDOW {
                    return Some(WINDOW - elapsed + Duration::from_millis(10));
                }
            }
        }

        last.push_back(now);
        None
    }

    /// Requests recorded in the current window
    pub async fn in_flight_window(&self) -> usize {
        let last = self.last_requests.lock().await;
        let now = Instant::now();
        last.iter().filter(|&&t| now.duration_since(t) <= WINDOW).count()
    }
}
