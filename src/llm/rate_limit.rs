//! Sliding-window admission control.

use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

const WINDOW: Duration = Duration::from_secs(60);

/// Admits at most `max_requests` calls in any trailing 60-second window.
///
/// The lock is held while waiting, so concurrent callers are admitted
/// strictly one at a time in the order they reached the lock.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests_per_minute: usize) -> Self {
        Self {
            max_requests: max_requests_per_minute.max(1),
            window: WINDOW,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Suspend until a request may be sent, then record it.
    pub async fn acquire(&self) {
        let mut admitted = self.admitted.lock().await;
        loop {
            let now = Instant::now();
            while admitted
                .front()
                .is_some_and(|&t| now.duration_since(t) >= self.window)
            {
                admitted.pop_front();
            }

            if admitted.len() < self.max_requests {
                admitted.push_back(now);
                debug!("Request admitted ({}/{} in window)", admitted.len(), self.max_requests);
                return;
            }

            let Some(&oldest) = admitted.front() else {
                continue;
            };
            let resume_at = oldest + self.window;
            warn!(
                "Rate limit reached ({} requests/min), waiting {:.1}s",
                self.max_requests,
                resume_at.saturating_duration_since(now).as_secs_f64()
            );
            sleep_until(resume_at).await;
        }
    }

    /// Requests admitted within the current window.
    pub async fn in_window(&self) -> usize {
        let admitted = self.admitted.lock().await;
        let now = Instant::now();
        admitted
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }
}
