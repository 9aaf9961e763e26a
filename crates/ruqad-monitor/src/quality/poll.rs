//! Polling primitive with an injectable clock
//!
//! [`poll_until`] calls a probe until it yields a value, sleeping between
//! attempts according to a [`PollPolicy`]. The default policy is unbounded:
//! it keeps polling until the probe reports completion or fails.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::trace;

/// Source of delays between poll attempts
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Delay schedule and limits for [`poll_until`]
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Factor applied to the delay after every attempt; `1.0` keeps it fixed
    pub multiplier: f64,
    pub max_interval: Option<Duration>,
    pub max_attempts: Option<u32>,
    /// Upper bound on the total time spent sleeping
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            multiplier: 1.0,
            max_interval: None,
            max_attempts: None,
            deadline: None,
        }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Option<Duration>) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_interval = max_interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Delay after the given 1-based attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.interval.mul_f64(self.multiplier.powi(exponent));
        match self.max_interval {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// The policy's limits were reached before the probe completed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Gave up after {attempts} attempts ({elapsed:?} spent waiting)")]
pub struct PollExhausted {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Call `probe` until it returns `Ok(Some(_))`
///
/// `Ok(None)` means "not yet": the clock sleeps and the probe runs again.
/// Probe errors are returned immediately. The probe receives the 1-based
/// attempt number.
pub async fn poll_until<C, T, E, F, Fut>(
    clock: &C,
    policy: &PollPolicy,
    mut probe: F,
) -> Result<T, E>
where
    C: Clock + ?Sized,
    E: From<PollExhausted>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let mut attempt = 0u32;
    let mut elapsed = Duration::ZERO;

    loop {
        attempt = attempt.saturating_add(1);
        if let Some(value) = probe(attempt).await? {
            return Ok(value);
        }

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(PollExhausted { attempts: attempt, elapsed }.into());
        }

        let delay = policy.delay_after(attempt);
        if policy.deadline.is_some_and(|deadline| elapsed + delay > deadline) {
            return Err(PollExhausted { attempts: attempt, elapsed }.into());
        }

        trace!(attempt, delay_ms = delay.as_millis() as u64, "Not ready, sleeping");
        clock.sleep(delay).await;
        elapsed += delay;
    }
}
