//! A pluggable retry policy for replay reads (§4.5 "Replay: ... retries
//! with exponential backoff up to an implementation-selected ceiling").

use std::fmt::Debug;
use std::time::Duration;

pub use exponential_backoff::Backoff;

/// Determines which errors to retry and how long to wait before doing so.
pub trait Retry: Debug + Clone {
    /// Reset internal state after a successful read, so a later failure
    /// starts backing off from the minimum again.
    fn reset(&mut self);

    /// Return the wait before the next attempt, or `None` to give up and
    /// surface the error to the caller.
    fn next_backoff(&mut self, attempt: u32) -> Option<Duration>;
}

/// A `Retry` that doesn't: the first error aborts the replay.
#[derive(Debug, Clone, Default)]
pub struct NoRetry;

impl Retry for NoRetry {
    fn reset(&mut self) {}

    fn next_backoff(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    backoff: Backoff,
}

impl ExponentialBackoff {
    pub fn new(max_retries: impl Into<Option<u32>>) -> Self {
        Self {
            backoff: Backoff::new(
                max_retries.into().unwrap_or(u32::MAX),
                Duration::from_millis(100),
                Some(Duration::from_secs(300)),
            ),
        }
    }

    pub fn with_min(mut self, min: Duration) -> Self {
        self.backoff.set_min(min);
        self
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.backoff.set_max(Some(max));
        self
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.backoff.set_jitter(jitter);
        self
    }
}

impl Retry for ExponentialBackoff {
    fn reset(&mut self) {}

    fn next_backoff(&mut self, attempt: u32) -> Option<Duration> {
        self.backoff.next(attempt)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_no_retry_always_gives_up() {
        let mut retry = NoRetry;
        assert_eq!(retry.next_backoff(1), None);
    }

    #[test]
    fn test_exponential_backoff_respects_ceiling() {
        let mut retry = ExponentialBackoff::new(5).with_max(Duration::from_secs(1));
        for attempt in 1..=5 {
            let wait = retry.next_backoff(attempt).expect("within max_retries");
            assert!(wait <= Duration::from_secs(1));
        }
        assert_eq!(retry.next_backoff(6), None);
    }
}
