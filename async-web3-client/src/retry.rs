//! Retry strategies for opening a connection
//!
//! The client never reconnects on its own: once a connection is lost every
//! pending call fails and every subscription ends, and it is up to the
//! application to call `connect()` again. What a strategy controls is how
//! hard a single `connect()` call tries before giving up, which matters at
//! startup when the node may still be booting.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: doubling delays with an upper bound
//! - **FixedDelay**: constant delay between attempts
//! - **NoRetry**: one attempt only (the default)
//!
//! ```rust
//! use async_web3_client::{ExponentialBackoff, RetryStrategy};
//! use std::time::Duration;
//!
//! let strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(5))
//!     .with_max_attempts(4);
//! assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
//! assert_eq!(strategy.next_delay(4), None);
//! ```

use std::time::Duration;

/// Decides whether and when a failed connection attempt is retried
///
/// `attempt` counts failed attempts so far, starting at 0 after the first
/// failure. Returning `None` makes `connect()` give up with the last error.
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt, or `None` to give up
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a strategy doubling from `min_delay` up to `max_delay`
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Give up after this many retries
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random jitter to each delay
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
            .with_max_attempts(10)
            .with_jitter()
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let base = (self.min_delay.as_millis() as u64).saturating_mul(factor);
        let delay = base.min(self.max_delay.as_millis() as u64);

        if self.jitter {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            return Some(Duration::from_millis(delay + jitter_ms));
        }

        Some(Duration::from_millis(delay))
    }
}

/// Constant delay between attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Create a fixed delay strategy
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after this many retries
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Single attempt, no retries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}
