//! Fixed-window request counting per client address
//!
//! Each key owns one window. The read-modify-write of a window happens while
//! holding its `DashMap` shard lock, so concurrent bursts from the same address
//! are never undercounted.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Budget left for a key after an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Returned when a key has used up its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit of {limit} requests exceeded, retry after {retry_after:?}")]
pub struct RateLimited {
    pub limit: u32,
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds until the window resets, rounded up and never zero.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Counts one request for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] when the key has already used its budget for the
    /// current window. Rejected requests are not counted.
    pub fn check(
        &self,
        key: &str,
    ) -> Result<Quota, RateLimited> {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(
        &self,
        key: &str,
        now: Instant,
    ) -> Result<Quota, RateLimited> {
        let RateLimitConfig { max_requests, window } = self.config;

        let mut entry = self.windows.entry(key.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = window.saturating_sub(now.duration_since(entry.started));

        if entry.count >= max_requests {
            return Err(RateLimited {
                limit: max_requests,
                retry_after: reset_after,
            });
        }

        entry.count += 1;

        Ok(Quota {
            limit: max_requests,
            remaining: max_requests - entry.count,
            reset_after,
        })
    }

    /// Drops every window that has fully elapsed and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn purge_expired_at(
        &self,
        now: Instant,
    ) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.config.window);
        before.saturating_sub(self.windows.len())
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(900),
        })
    }

    #[test]
    fn test_allows_up_to_ceiling() {
        let limiter = limiter(3);
        let now = Instant::now();

        assert_eq!(limiter.check_at("1.2.3.4", now).unwrap().remaining, 2);
        assert_eq!(limiter.check_at("1.2.3.4", now).unwrap().remaining, 1);
        assert_eq!(limiter.check_at("1.2.3.4", now).unwrap().remaining, 0);

        let limited = limiter.check_at("1.2.3.4", now).unwrap_err();
        assert_eq!(limited.limit, 3);
        assert_eq!(limited.retry_after, Duration::from_secs(900));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1);
        let now = Instant::now();

        assert!(limiter.check_at("10.0.0.1", now).is_ok());
        assert!(limiter.check_at("10.0.0.1", now).is_err());
        assert!(limiter.check_at("10.0.0.2", now).is_ok());
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(1);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).is_ok());

        let later = start + Duration::from_secs(600);
        let limited = limiter.check_at("k", later).unwrap_err();
        assert_eq!(limited.retry_after, Duration::from_secs(300));

        let after_window = start + Duration::from_secs(900);
        assert!(limiter.check_at("k", after_window).is_ok());
    }

    #[test]
    fn test_retry_after_secs_rounds_up() {
        let limited = RateLimited {
            limit: 1,
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(limited.retry_after_secs(), 2);

        let limited = RateLimited {
            limit: 1,
            retry_after: Duration::ZERO,
        };
        assert_eq!(limited.retry_after_secs(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let limiter = limiter(5);
        let start = Instant::now();

        limiter.check_at("old", start).unwrap();
        limiter.check_at("fresh", start + Duration::from_secs(800)).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.purge_expired_at(start + Duration::from_secs(901)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_concurrent_bursts_are_not_undercounted() {
        let limiter = Arc::new(limiter(100));
        let accepted = Arc::new(AtomicU32::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let limiter = Arc::clone(&limiter);
                let accepted = Arc::clone(&accepted);
                scope.spawn(move || {
                    for _ in 0..50 {
                        if limiter.check("203.0.113.7").is_ok() {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(accepted.load(Ordering::Relaxed), 100);
    }
}
