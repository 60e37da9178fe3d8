//! Backoff schedule for failed delivery attempts.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// How the delivery worker spaces out retries of a failing ticket.
///
/// The n-th consecutive failure waits
/// `min(initial_backoff * multiplier^(n-1), max_backoff)` plus a random
/// `0..=jitter`, so a flapping mail API isn't hammered by every pending
/// ticket at once.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Wait after the first failure. Default: 500 ms.
    pub initial_backoff: Duration,
    /// Ceiling for the exponential curve (before jitter). Default: 60 s.
    pub max_backoff: Duration,
    /// Growth factor per failure. Default: 2.0.
    pub multiplier: f64,
    /// Upper bound of the random extra delay. Default: 250 ms.
    pub jitter: Duration,
    /// Attempts before a ticket is dead-lettered. `None` retries forever.
    /// Default: `Some(10)`.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: Duration::from_millis(250),
            max_attempts: Some(10),
        }
    }
}

impl RetryPolicy {
    /// Smallest accepted initial backoff.
    pub const MIN_BACKOFF: Duration = Duration::from_millis(1);

    /// A policy without jitter: every delay is exactly the curve value.
    pub fn fixed(initial_backoff: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial_backoff,
            max_backoff: initial_backoff,
            multiplier: 1.0,
            jitter: Duration::ZERO,
            max_attempts,
        }
    }

    /// Clamps out-of-range values so the policy is safe to use.
    ///
    /// Called by [`DeliveryQueue::spawn`](crate::DeliveryQueue::spawn). Rules:
    /// - `initial_backoff` raised to at least [`Self::MIN_BACKOFF`].
    /// - `max_backoff` raised to at least `initial_backoff`.
    /// - `multiplier` below 1.0 (or not finite) becomes 1.0.
    /// - `max_attempts` of `Some(0)` becomes `Some(1)`.
    pub fn validated(mut self) -> Self {
        if self.initial_backoff < Self::MIN_BACKOFF {
            warn!(backoff = ?self.initial_backoff, "initial_backoff too small, clamping");
            self.initial_backoff = Self::MIN_BACKOFF;
        }
        if self.max_backoff < self.initial_backoff {
            self.max_backoff = self.initial_backoff;
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            warn!(multiplier = self.multiplier, "multiplier must be >= 1.0, clamping");
            self.multiplier = 1.0;
        }
        if self.max_attempts == Some(0) {
            self.max_attempts = Some(1);
        }
        self
    }

    /// Delay before retrying after the `failures`-th consecutive failure,
    /// without jitter. `failures` starts at 1.
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(64) as i32;
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled)
    }

    /// [`base_delay`](Self::base_delay) plus random jitter.
    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.base_delay(failures);
        if self.jitter.is_zero() {
            return base;
        }
        let ceiling = u64::try_from(self.jitter.as_micros()).unwrap_or(u64::MAX);
        let extra = rand::rng().random_range(0..=ceiling);
        base.saturating_add(Duration::from_micros(extra))
    }

    /// Whether a ticket that has made `attempts` attempts is out of retries.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}
