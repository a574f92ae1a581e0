use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rand::Rng;

use crate::VpcError;

/// Retry settings supplied to [`crate::VpcClient::enable_retries`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Upper bound for any single backoff delay.
    pub max_retry_interval: Duration,
    /// Delay ceiling of the first retry.
    pub initial_delay: Duration,
    /// Growth factor between consecutive delay ceilings.
    pub scaling: f64,
    /// Randomize each delay within its band.
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 4,
            max_retry_interval: Duration::from_secs(30),
            initial_delay: Duration::from_secs(1),
            scaling: 2.0,
            jitter: true,
        }
    }
}

/// Truncated exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
    jitter: bool,
}

impl Backoff {
    /// Creates a backoff, clamping inputs to a usable range: scaling to
    /// `[1.0, 32.0]` and the initial delay to `[1ms, maximum_delay]`.
    pub fn new(initial_delay: Duration, maximum_delay: Duration, scaling: f64, jitter: bool) -> Self {
        let maximum_delay = maximum_delay.max(Duration::from_millis(1));
        let scaling = if scaling.is_finite() {
            scaling.clamp(1.0, 32.0)
        } else {
            2.0
        };
        Self {
            initial_delay: initial_delay.clamp(Duration::from_millis(1), maximum_delay),
            maximum_delay,
            scaling,
            jitter,
        }
    }

    pub fn maximum_delay(&self) -> Duration {
        self.maximum_delay
    }

    /// Delay ceiling after the `attempt`-th failure (1-based).
    ///
    /// Non-decreasing in `attempt` and never above the maximum delay.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay / 2;
        }
        let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let scaling = self.scaling.powi(exp);
        if scaling >= self.maximum_delay.as_secs_f64() / self.initial_delay.as_secs_f64() {
            self.maximum_delay
        } else {
            self.initial_delay.mul_f64(scaling)
        }
    }

    /// Sleep before the retry following the `attempt`-th failure.
    ///
    /// With jitter the value is drawn from `[ceiling(attempt - 1), ceiling(attempt)]`,
    /// so consecutive delays never shrink.
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let upper = self.ceiling(attempt);
        if !self.jitter {
            return upper;
        }
        let lower = self.ceiling(attempt.saturating_sub(1)).min(upper);
        rng.random_range(lower..=upper)
    }
}

/// Whether and how the dispatcher retries failed attempts.
///
/// A disabled policy performs exactly one attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        let options = RetryOptions::default();
        Self {
            enabled: false,
            ..Self::enabled(options)
        }
    }

    pub fn enabled(options: RetryOptions) -> Self {
        Self {
            enabled: true,
            max_retries: options.max_retries,
            backoff: Backoff::new(
                options.initial_delay,
                options.max_retry_interval,
                options.scaling,
                options.jitter,
            ),
        }
    }

    /// Decides whether the call retries after its `attempt`-th failure.
    ///
    /// Only transient errors qualify, and never more than `max_retries` times.
    pub fn should_retry(&self, attempt: u32, error: &VpcError) -> bool {
        self.enabled && attempt <= self.max_retries && error.is_transient()
    }

    /// Sleep before the next attempt.
    ///
    /// A server-provided `Retry-After` raises the delay, still capped at the
    /// maximum interval.
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.backoff.delay(attempt, &mut rand::rng());
        match retry_after {
            Some(retry_after) => delay.max(retry_after.min(self.backoff.maximum_delay())),
            None => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Retry policy shared by a client and its clones.
///
/// Writes are last-write-wins. The dispatcher reads a snapshot after each
/// failure and again after each backoff, so toggles also reach in-flight calls.
#[derive(Clone, Debug, Default)]
pub struct SharedRetryPolicy(Arc<RwLock<RetryPolicy>>);

impl SharedRetryPolicy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self(Arc::new(RwLock::new(policy)))
    }

    pub fn get(&self) -> RetryPolicy {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, policy: RetryPolicy) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }
}
