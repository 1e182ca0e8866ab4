use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::{Duration, Instant};

use crate::core::config;

/// Result of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request accepted; `remaining` more fit in the current window
    Allowed { remaining: usize },
    /// Window is full; the oldest request expires after `retry_after`
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Sliding-window rate limiter keyed by user id.
///
/// Each user may make at most `max_requests` requests inside any rolling
/// `window`. Only accepted requests are recorded.
#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<DashMap<i64, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(config::rate_limit::MAX_REQUESTS, config::rate_limit::window())
    }
}

impl RateLimiter {
    /// Creates a limiter.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Requests allowed per window (clamped to at least 1)
    /// * `window` - Length of the rolling window
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            hits: Arc::new(DashMap::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Records a request for `user_id` if the window has room.
    ///
    /// # Returns
    ///
    /// [`RateDecision::Allowed`] with the remaining budget, or
    /// [`RateDecision::Limited`] with the time until a slot frees up.
    pub fn try_acquire(&self, user_id: i64) -> RateDecision {
        let now = Instant::now();
        let mut entry = self.hits.entry(user_id).or_default();
        let hits = entry.value_mut();
        Self::evict_expired(hits, now, self.window);

        if hits.len() >= self.max_requests {
            let retry_after = hits
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or_default();
            return RateDecision::Limited { retry_after };
        }

        hits.push_back(now);
        RateDecision::Allowed {
            remaining: self.max_requests - hits.len(),
        }
    }

    /// Requests still available to `user_id` in the current window
    pub fn remaining(&self, user_id: i64) -> usize {
        let now = Instant::now();
        match self.hits.get_mut(&user_id) {
            Some(mut entry) => {
                Self::evict_expired(entry.value_mut(), now, self.window);
                self.max_requests.saturating_sub(entry.len())
            }
            None => self.max_requests,
        }
    }

    /// Forgets all recorded requests of `user_id`
    pub fn reset(&self, user_id: i64) {
        self.hits.remove(&user_id);
    }

    /// Drops users whose windows are empty
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.hits.retain(|_, hits| {
            Self::evict_expired(hits, now, window);
            !hits.is_empty()
        });
    }

    fn evict_expired(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while hits.front().is_some_and(|t| now.duration_since(*t) >= window) {
            hits.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limit_reached_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        assert_eq!(limiter.try_acquire(1), RateDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.try_acquire(1), RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.try_acquire(1), RateDecision::Allowed { remaining: 0 });

        match limiter.try_acquire(1) {
            RateDecision::Limited { retry_after } => assert_eq!(retry_after, Duration::from_secs(60)),
            other => panic!("expected limit, got {other:?}"),
        }
        // Other users are independent
        assert!(limiter.try_acquire(2).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire(7).is_allowed());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.try_acquire(7).is_allowed());
        assert!(!limiter.try_acquire(7).is_allowed());

        // First hit expires, one slot frees up
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(limiter.remaining(7), 1);
        assert!(limiter.try_acquire(7).is_allowed());
        assert!(!limiter.try_acquire(7).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_cleanup() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        assert!(limiter.try_acquire(5).is_allowed());
        limiter.reset(5);
        assert!(limiter.try_acquire(5).is_allowed());

        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.cleanup();
        assert!(limiter.hits.is_empty());
        assert_eq!(limiter.remaining(5), 1);
    }

    #[test]
    fn test_default_uses_hourly_budget() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.max_requests, 10);
        assert_eq!(limiter.window, Duration::from_secs(3600));
    }
}
