use std::time::Duration;

/// Bounded exponential back-off with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Fraction of the delay to spread either side, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `sample` is a uniform draw from `[0, 1)`; `0.5` yields the un-jittered delay.
    pub fn backoff(&self, attempt: u32, sample: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let base = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay = (base * self.factor.powi(exponent)).min(max_ms);
        let spread = self.jitter.clamp(0.0, 1.0) * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
        let jittered = (delay * (1.0 + spread)).clamp(0.0, max_ms);

        Duration::from_millis(jittered.round() as u64)
    }
}

/// Attempt accounting for a single request.
///
/// Callers invoke [`RetrySchedule::start_attempt`] before each call and ask
/// [`RetrySchedule::next_delay`] after a transient failure; `None` means the
/// attempt cap is reached.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetrySchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Records the start of an attempt and returns its 1-based number.
    pub fn start_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn next_delay(&self, sample: f64) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts.max(1) {
            return None;
        }
        Some(self.policy.backoff(self.attempts, sample))
    }
}
