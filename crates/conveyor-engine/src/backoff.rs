//! Backoff policies for unproductive loop iterations.
//!
//! Separates "how fast to back off" (the policy, a pure curve over an
//! attempt counter) from "when backing off is warranted" (the loop's call
//! sites): the processor advances the counter after every iteration that
//! found nothing to do or failed, and resets it after every successfully
//! handled item. Jitter spreads concurrent processors apart so they do not
//! hammer an empty queue in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Curve configuration mapping consecutive unproductive iterations to wait
/// durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Strategy for growing the delay across attempts.
    pub strategy: BackoffStrategy,

    /// Delay after the first unproductive iteration; also the floor of the
    /// curve and the effective poll cadence while the queue stays busy with
    /// failures.
    pub base_delay: Duration,

    /// Ceiling the delay never exceeds, jitter included.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0); the delay is randomized by up to this
    /// share in either direction.
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.2,
        }
    }
}

/// Strategy for growing backoff delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Same delay after every unproductive iteration.
    Fixed,
    /// Delay grows by `base_delay` per consecutive unproductive iteration.
    Linear,
    /// Delay doubles per consecutive unproductive iteration.
    Exponential,
}

impl BackoffPolicy {
    /// Creates a jitter-free fixed-interval policy, useful as a plain poll
    /// cadence.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay: interval,
            max_delay: interval,
            jitter_factor: 0.0,
        }
    }

    /// Creates an exponential policy with the default jitter.
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self { strategy: BackoffStrategy::Exponential, base_delay, max_delay, ..Self::default() }
    }

    /// Returns the wait duration for the given 1-based attempt number.
    ///
    /// Without jitter the result is non-decreasing in `attempt` and capped
    /// at `max_delay`; jitter keeps it within `max_delay` as well.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let grown = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let exponent = (attempt - 1).min(20);
                self.base_delay.saturating_mul(2_u32.saturating_pow(exponent))
            },
        };

        let capped = grown.min(self.max_delay);
        apply_jitter(capped, self.jitter_factor).min(self.max_delay)
    }
}

/// Attempt counter private to one running processor.
///
/// The counter advances on every iteration that found the queue empty, saw
/// the handler fail, or hit an unexpected error, and resets to zero when an
/// item is handled successfully.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackoffState {
    attempt: u32,
}

impl BackoffState {
    /// Creates a fresh state with a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the counter and returns the wait before the next poll.
    pub fn next(&mut self, policy: &BackoffPolicy) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        policy.delay_for(self.attempt)
    }

    /// Resets the counter after a productive iteration.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the current consecutive-unproductive-iteration count.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Randomizes a delay by up to `jitter_factor` in either direction.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}
