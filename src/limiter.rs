//! Client-side pacing for the Discogs API: a sliding-window token bucket
//! plus the backoff schedule used when a 429 does get through.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub trait Clock: Send {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Admits at most `capacity` requests per `window`, counting grant times in
/// a sliding window. `acquire` blocks through the injected clock, so tests
/// drive it with a manual clock and never sleep for real.
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    grants: VecDeque<Instant>,
    not_before: Option<Instant>,
    clock: Box<dyn Clock>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1) as usize,
            window,
            grants: VecDeque::new(),
            not_before: None,
            clock,
        }
    }

    pub fn per_minute(capacity: u32) -> Self {
        Self::new(capacity, Duration::from_secs(60), Box::new(SystemClock))
    }

    /// Block until the next request may go out, then record the grant.
    pub fn acquire(&mut self) {
        let now = self.clock.now();
        let delay = self.next_delay(now);
        if !delay.is_zero() {
            self.clock.sleep(delay);
        }
        let granted = self.clock.now();
        self.expire(granted);
        self.grants.push_back(granted);
        self.not_before = None;
    }

    /// Push the next grant out by at least `duration`. Used when the server
    /// answers 429 or reports an exhausted rate-limit window.
    pub fn penalize(&mut self, duration: Duration) {
        let until = self.clock.now() + duration;
        self.not_before = Some(match self.not_before {
            Some(existing) => existing.max(until),
            None => until,
        });
    }

    fn next_delay(&mut self, now: Instant) -> Duration {
        self.expire(now);
        let mut delay = Duration::ZERO;
        if let Some(not_before) = self.not_before {
            delay = not_before.saturating_duration_since(now);
        }
        if self.grants.len() >= self.capacity {
            if let Some(oldest) = self.grants.front() {
                delay = delay.max((*oldest + self.window).saturating_duration_since(now));
            }
        }
        delay
    }

    fn expire(&mut self, now: Instant) {
        while let Some(front) = self.grants.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }
}

const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_MAX_SHIFT: u32 = 5;

/// Delay before retry number `attempt` (zero-based). A server-provided
/// `Retry-After` always wins over the exponential schedule.
pub fn backoff_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    retry_after
        .unwrap_or_else(|| Duration::from_secs(BACKOFF_BASE_SECS << attempt.min(BACKOFF_MAX_SHIFT)))
}
