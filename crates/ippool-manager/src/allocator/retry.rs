//! Optimistic-concurrency retry driver
//!
//! Every engine operation is the same loop: reload the record, compute the
//! next status, compare-and-swap it. Only version conflicts are retried, with
//! exponential backoff plus jitter, up to a fixed number of attempts.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Backoff policy for version conflicts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Growth factor applied per retry
    pub factor: f64,
    /// Random extra delay as a fraction of the base delay (0.1 = up to +10%)
    pub jitter: f64,
    /// Upper bound on the base delay
    pub max_delay: Duration,
}

/// Default upper bound on a single backoff sleep
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            factor: 1.5,
            jitter: 0.1,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Build a policy, rejecting a factor below 1.0 or jitter outside `[0, 1]`
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        factor: f64,
        jitter: f64,
    ) -> Result<Self> {
        if !(factor >= 1.0 && factor.is_finite()) {
            return Err(Error::Config(format!(
                "backoff factor must be a finite number of at least 1.0, got {}",
                factor
            )));
        }
        if !(0.0..=1.0).contains(&jitter) {
            return Err(Error::Config(format!(
                "jitter must be within [0, 1], got {}",
                jitter
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            factor,
            jitter,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
        })
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Base delay before retry number `retry` (1-based), without jitter
    ///
    /// Grows by `factor` per retry and saturates at `max_delay`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Base delay plus a random share of up to `jitter` of it
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !(self.jitter > 0.0) {
            return base;
        }
        let share = (self.jitter.min(1.0) * rand::random::<f64>()).clamp(0.0, 1.0);
        base + base.mul_f64(share)
    }
}

/// Deadline and cancellation supplied by the caller of one operation
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl CallContext {
    /// No deadline, no cancellation
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Abort once the watched value becomes `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fail fast if the call was cancelled or ran out of time
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` unless the deadline passes or the call is cancelled first
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            _ = self.expired() => Err(Error::DeadlineExceeded),
            result = fut => result,
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    async fn cancelled(&self) {
        let Some(mut rx) = self.cancel.clone() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone: nobody can cancel any more
                return std::future::pending().await;
            }
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

/// Outcome of one reload/compute/write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    /// The write lost a race; the caller should reload
    Conflict,
}

/// Run `attempt` until it is done, fails, or has conflicted `max_attempts` times
///
/// `attempt` receives the 1-based attempt number. Errors returned by it are
/// surfaced unchanged and never retried.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    pool: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        ctx.check()?;

        match ctx.run(attempt(n)).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Conflict => {
                tracing::debug!(pool = %pool, attempt = n, "Version conflict, reloading pool");
                if n < max_attempts {
                    ctx.sleep(policy.delay(n)).await?;
                }
            }
        }
    }

    tracing::warn!(pool = %pool, attempts = max_attempts, "Exhausted conflict retries");
    Err(Error::RetriesExhausted {
        pool: pool.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay(1), Duration::from_millis(10));
        assert_eq!(policy.base_delay(2), Duration::from_millis(15));
        assert_eq!(policy.base_delay(3), Duration::from_micros(22_500));
    }

    #[test]
    fn test_delay_saturates_at_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(130), DEFAULT_MAX_RETRY_DELAY);
        assert_eq!(policy.base_delay(u32::MAX), DEFAULT_MAX_RETRY_DELAY);
        assert!(policy.delay(130) <= DEFAULT_MAX_RETRY_DELAY.mul_f64(1.1));

        let capped = policy.with_max_delay(Duration::from_millis(100));
        assert_eq!(capped.base_delay(3), Duration::from_micros(22_500));
        assert_eq!(capped.base_delay(20), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_initial_delay_never_sleeps() {
        let policy = RetryPolicy::new(u32::MAX, Duration::ZERO, 1.5, 0.1).unwrap();
        assert_eq!(policy.delay(2_000), Duration::ZERO);
        assert_eq!(policy.delay(u32::MAX), Duration::ZERO);
    }

    #[test]
    fn test_out_of_range_fields_do_not_panic() {
        let policy = RetryPolicy {
            factor: -1.5,
            jitter: f64::NAN,
            ..RetryPolicy::default()
        };
        assert!(policy.delay(2) <= DEFAULT_MAX_RETRY_DELAY);
        assert!(policy.delay(3) <= DEFAULT_MAX_RETRY_DELAY);
    }

    #[test]
    fn test_new_validates_factor_and_jitter() {
        assert!(RetryPolicy::new(5, Duration::from_millis(10), 1.5, 0.1).is_ok());
        assert!(matches!(
            RetryPolicy::new(5, Duration::from_millis(10), 0.5, 0.1),
            Err(Error::Config(_))
        ));
        assert!(RetryPolicy::new(5, Duration::from_millis(10), f64::INFINITY, 0.1).is_err());
        assert!(RetryPolicy::new(5, Duration::from_millis(10), 1.5, -0.1).is_err());
        assert!(RetryPolicy::new(5, Duration::from_millis(10), 1.5, f64::NAN).is_err());
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay(2);
            assert!(delay >= Duration::from_millis(15));
            assert!(delay <= Duration::from_micros(16_500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_exhaust_after_exact_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_conflict(
            &RetryPolicy::default(),
            &CallContext::background(),
            "pool-a",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Attempt::Conflict) }
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 5, ref pool }) if pool == "pool-a"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_conflicts() {
        let result = retry_on_conflict(
            &RetryPolicy::default(),
            &CallContext::background(),
            "pool-a",
            |n| async move {
                if n < 3 {
                    Ok(Attempt::Conflict)
                } else {
                    Ok(Attempt::Done(n))
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_conflict(
            &RetryPolicy::default(),
            &CallContext::background(),
            "pool-a",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::IpUsedOut {
                        pool: "pool-a".to_string(),
                        reason: "no free address".to_string(),
                    })
                }
            },
        )
        .await;
        assert!(matches!(result, Err(Error::IpUsedOut { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retrying() {
        let (tx, rx) = watch::channel(false);
        let ctx = CallContext::background().with_cancellation(rx);
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_on_conflict(&RetryPolicy::default(), &ctx, "pool-a", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(true);
            async { Ok(Attempt::Conflict) }
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_slow_round_trip() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let result: Result<()> =
            retry_on_conflict(&RetryPolicy::default(), &ctx, "pool-a", |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Attempt::Done(()))
            })
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }
}
