//! Bounded exponential backoff for stream reconnection

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// Immutable reconnection policy
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,

    /// Growth factor applied after each attempt
    pub multiplier: f64,

    /// Upper bound for the delay
    pub max_delay: Duration,

    /// Attempts allowed in one failure streak
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Mutable reconnection state for one client
///
/// Jitter is disabled so the delay sequence is exactly
/// `initial, initial * m, initial * m², ...` clamped to `max_delay`.
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl std::fmt::Debug for ReconnectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectState")
            .field("attempts", &self.attempts)
            .field("current_delay", &self.current_delay())
            .field("max_attempts", &self.policy.max_attempts)
            .finish()
    }
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let backoff = ExponentialBackoff {
            current_interval: policy.initial_delay,
            initial_interval: policy.initial_delay,
            randomization_factor: 0.0,
            multiplier: policy.multiplier,
            max_interval: policy.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        };

        Self {
            policy,
            attempts: 0,
            backoff,
        }
    }

    /// Attempts taken in the current failure streak
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay the next attempt will wait
    pub fn current_delay(&self) -> Duration {
        self.backoff.current_interval.min(self.policy.max_delay)
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Whether another attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_attempts
    }

    /// Take one attempt from the budget
    ///
    /// Returns the delay to sleep before reconnecting and grows the delay
    /// for the attempt after that, or `None` once the budget is spent.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        self.attempts += 1;
        let delay = self.current_delay();
        // Advances current_interval; the returned value is `delay` itself
        // because jitter is off.
        let _ = self.backoff.next_backoff();
        Some(delay)
    }

    /// Back to the initial values after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }
}
