//! Exponential reconnect backoff
//!
//! Pure mapping from retry attempt to wait time:
//! `min(initial * 2^attempt, max)`, optionally with bounded jitter.

use rand::Rng;
use std::time::Duration;

/// Jitter spread applied around the exponential delay (±20%)
const JITTER_RATIO: f64 = 0.2;

/// Reconnect backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry (attempt 0)
    initial_ms: u64,
    /// Upper bound for any delay
    max_ms: u64,
    /// Randomize delays to spread reconnect storms
    jitter: bool,
}

impl BackoffPolicy {
    /// Create policy without jitter
    ///
    /// `max` below `initial` is raised to `initial`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial_ms = initial.as_millis().min(u64::MAX as u128) as u64;
        let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            jitter: false,
        }
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Deterministic delay in milliseconds for `attempt`
    ///
    /// Saturates at `max` for any attempt, including ones whose
    /// exponential term does not fit in 64 bits.
    #[inline]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.initial_ms.saturating_mul(factor).min(self.max_ms)
    }

    /// Deterministic delay for `attempt`
    #[inline]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }

    /// Delay actually used for scheduling
    ///
    /// Equal to [`delay`](Self::delay) unless jitter is enabled, in which case
    /// the value is spread by ±20% and clamped to `[initial, max]`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_ms(attempt);
        if !self.jitter {
            return Duration::from_millis(base);
        }

        let factor = rand::thread_rng().gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
        let jittered = (base as f64 * factor) as u64;
        Duration::from_millis(jittered.clamp(self.initial_ms, self.max_ms))
    }

    /// Initial delay
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    /// Maximum delay
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Whether jitter is applied
    pub fn is_jittered(&self) -> bool {
        self.jitter
    }
}
