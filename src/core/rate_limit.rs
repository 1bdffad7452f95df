//! Sliding-window rate limiting and exponential back-off
//!
//! Two composable pieces: a per-identifier sliding-window limiter used in
//! front of registry and advisory calls, and a `Throttler` that wraps an
//! operation with exponential back-off. Callers compose them as
//! "if allowed, run; else wait; then run under back-off".

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::core::error::{NullVoidError, Result};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Blocked until the contained deadline passes.
    Blocked { retry_after: Duration },
}

impl RateDecision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Default)]
struct WindowState {
    accepted: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

/// Sliding-window counter per identifier.
///
/// Accepted request timestamps are recorded; when the count within `window`
/// reaches `max_requests` the identifier is blocked for a full window and
/// subsequent checks report `Blocked` until that instant passes. State
/// mutations are serialized per identifier via the keyed map entry.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    states: DashMap<String, WindowState>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            states: DashMap::new(),
        }
    }

    /// Try to record one request for `identifier`.
    pub fn check(&self, identifier: &str) -> RateDecision {
        self.check_at(identifier, Instant::now())
    }

    fn check_at(&self, identifier: &str, now: Instant) -> RateDecision {
        let mut state = self.states.entry(identifier.to_string()).or_default();

        if let Some(blocked_until) = state.blocked_until {
            if now < blocked_until {
                return RateDecision::Blocked {
                    retry_after: blocked_until - now,
                };
            }
            state.blocked_until = None;
        }

        while let Some(front) = state.accepted.front() {
            if now.duration_since(*front) > self.window {
                state.accepted.pop_front();
            } else {
                break;
            }
        }

        if state.accepted.len() >= self.max_requests {
            let blocked_until = now + self.window;
            state.blocked_until = Some(blocked_until);
            return RateDecision::Blocked {
                retry_after: self.window,
            };
        }

        state.accepted.push_back(now);
        RateDecision::Allowed
    }

    /// Force a block on `identifier` for `duration`, e.g. after a provider
    /// answered 403/429. Extends an existing block, never shortens it.
    pub fn block_for(&self, identifier: &str, duration: Duration) {
        let mut state = self.states.entry(identifier.to_string()).or_default();
        let deadline = Instant::now() + duration;
        state.blocked_until = Some(match state.blocked_until {
            Some(existing) if existing > deadline => existing,
            _ => deadline,
        });
    }

    /// Remaining block time for `identifier`, if any.
    #[must_use]
    pub fn blocked_remaining(&self, identifier: &str) -> Option<Duration> {
        let state = self.states.get(identifier)?;
        let blocked_until = state.blocked_until?;
        blocked_until.checked_duration_since(Instant::now())
    }

    /// Suspend the calling thread until `identifier` is no longer blocked.
    pub fn wait_for_reset(&self, identifier: &str) {
        if let Some(remaining) = self.blocked_remaining(identifier) {
            std::thread::sleep(remaining);
        }
    }
}

/// Exponential back-off wrapper around a fallible operation.
///
/// `delay = base * factor^attempt`, capped at `max_delay`. Attempts stop at
/// `max_retries`; success resets nothing persistent (the throttler is
/// stateless between calls). Non-retryable error kinds bubble immediately.
#[derive(Debug, Clone)]
pub struct Throttler {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for Throttler {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl Throttler {
    #[must_use]
    pub fn new(base_delay: Duration, factor: f64, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            factor,
            max_delay,
            max_retries,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis(scaled as u64).min(self.max_delay)
    }

    /// Run `op`, retrying retryable failures with exponential back-off.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after back-off"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `op` for `identifier`: wait out any block, then execute under
/// back-off. The composition callers reach for by default.
pub fn run_limited<T>(
    limiter: &SlidingWindowLimiter,
    throttler: &Throttler,
    identifier: &str,
    op: impl FnMut() -> Result<T>,
) -> Result<T> {
    if !limiter.check(identifier).is_allowed() {
        limiter.wait_for_reset(identifier);
        if let RateDecision::Blocked { retry_after } = limiter.check(identifier) {
            return Err(NullVoidError::RateLimit {
                identifier: identifier.to_string(),
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }
    }
    throttler.run(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sliding_window_accepts_up_to_max() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("reg").is_allowed());
        assert!(limiter.check("reg").is_allowed());
        assert!(limiter.check("reg").is_allowed());
        assert!(!limiter.check("reg").is_allowed());
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").is_allowed());
        assert!(limiter.check("b").is_allowed());
        assert!(!limiter.check("a").is_allowed());
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(50));
        assert!(limiter.check("reg").is_allowed());
        assert!(limiter.check("reg").is_allowed());
        assert!(!limiter.check("reg").is_allowed());

        // After the block expires and old timestamps age out, requests pass.
        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.check("reg").is_allowed());
    }

    #[test]
    fn test_block_for_extends() {
        let limiter = SlidingWindowLimiter::new(100, Duration::from_millis(10));
        limiter.block_for("gh", Duration::from_secs(60));
        assert!(!limiter.check("gh").is_allowed());
        let remaining = limiter.blocked_remaining("gh").unwrap();
        assert!(remaining > Duration::from_secs(50));

        // A shorter re-block must not shorten the existing deadline.
        limiter.block_for("gh", Duration::from_millis(1));
        assert!(limiter.blocked_remaining("gh").unwrap() > Duration::from_secs(50));
    }

    #[test]
    fn test_throttler_delays_grow_and_cap() {
        let throttler = Throttler::new(Duration::from_millis(100), 2.0, Duration::from_secs(1), 5);
        assert_eq!(throttler.delay_for(0), Duration::from_millis(100));
        assert_eq!(throttler.delay_for(1), Duration::from_millis(200));
        assert_eq!(throttler.delay_for(2), Duration::from_millis(400));
        assert_eq!(throttler.delay_for(10), Duration::from_secs(1));
    }

    #[test]
    fn test_throttler_retries_then_succeeds() {
        let throttler = Throttler::new(Duration::from_millis(1), 2.0, Duration::from_millis(4), 3);
        let mut calls = 0;
        let result: Result<u32> = throttler.run(|| {
            calls += 1;
            if calls < 3 {
                Err(NullVoidError::Timeout(10))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_throttler_gives_up_after_max_retries() {
        let throttler = Throttler::new(Duration::from_millis(1), 2.0, Duration::from_millis(2), 2);
        let mut calls = 0;
        let result: Result<()> = throttler.run(|| {
            calls += 1;
            Err(NullVoidError::Timeout(10))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3); // initial try + 2 retries
    }

    #[test]
    fn test_throttler_non_retryable_bubbles() {
        let throttler = Throttler::default();
        let mut calls = 0;
        let result: Result<()> = throttler.run(|| {
            calls += 1;
            Err(NullVoidError::Validation("bad".into()))
        });
        assert!(matches!(result, Err(NullVoidError::Validation(_))));
        assert_eq!(calls, 1);
    }
}
