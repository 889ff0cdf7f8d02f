//! Bounded retry with exponential backoff for every remote call.
//!
//! # Overview
//!
//! Each failure is classified through [`Retryable`] into a [`RetryClass`]:
//! - [`RetryClass::Transient`] - may succeed on retry; consumes one retry
//! - [`RetryClass::Fatal`] - stop immediately (e.g. HTTP 403)
//! - [`RetryClass::ServerWait`] - the server asked us to wait; sleep that long
//!   (plus a safety margin) and try again *without* consuming a retry
//!
//! [`RetryExecutor::run`] drives the loop and always returns a `Result`; it
//! never panics or propagates past its boundary.
//!
//! # Delay Calculation
//!
//! ```text
//! delay(i) = min(initial_delay * multiplier^i, max_delay) (+ optional jitter)
//! ```
//!
//! where `i` is the number of retries already used. With defaults the waits
//! are exactly 1s, 2s, 4s.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use songsync_core::retry::{RetryExecutor, RetryPolicy};
//! use songsync_core::transport::TransportError;
//!
//! # async fn example() {
//! let executor = RetryExecutor::new(RetryPolicy::new(2, Duration::from_millis(10), 2.0));
//! let result = executor
//!     .run("example", || async { Ok::<_, TransportError>(42) })
//!     .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

mod wait_hint;

pub use wait_hint::{MAX_SERVER_WAIT, parse_retry_after, parse_wait_hint};

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry (1 second).
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default backoff multiplier (doubles each retry).
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Safety margin added on top of a server-requested wait.
const DEFAULT_SERVER_WAIT_MARGIN: Duration = Duration::from_secs(1);

/// Cooperative waits honored per run before they start consuming retries.
const DEFAULT_MAX_SERVER_WAITS: u32 = 5;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Temporary failure; retry after exponential backoff.
    Transient,
    /// Permanent failure; do not retry.
    Fatal,
    /// Server-specified wait; retry after it without consuming an attempt.
    ServerWait(Duration),
}

/// Errors that know how they should be retried.
pub trait Retryable {
    /// Classifies this failure.
    fn retry_class(&self) -> RetryClass;
}

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `max_retries`: 3 (so up to 4 calls)
/// - `initial_delay`: 1 second
/// - `multiplier`: 2.0
/// - `max_delay`: 32 seconds
/// - `server_wait_margin`: 1 second
/// - `max_server_waits`: 5
/// - jitter: none
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    server_wait_margin: Duration,
    max_server_waits: u32,
    jitter: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            server_wait_margin: DEFAULT_SERVER_WAIT_MARGIN,
            max_server_waits: DEFAULT_MAX_SERVER_WAITS,
            jitter: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit backoff numerics and default limits.
    ///
    /// A multiplier below 1.0 is clamped to 1.0 (delays never shrink).
    #[must_use]
    pub fn new(max_retries: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            multiplier: if multiplier.is_finite() {
                multiplier.max(1.0)
            } else {
                DEFAULT_MULTIPLIER
            },
            ..Self::default()
        }
    }

    /// Creates a default policy with a custom retry count.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Sets the maximum backoff delay.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the margin added to server-requested waits.
    #[must_use]
    pub fn server_wait_margin(mut self, margin: Duration) -> Self {
        self.server_wait_margin = margin;
        self
    }

    /// Sets how many cooperative waits are honored per run.
    #[must_use]
    pub fn max_server_waits(mut self, count: u32) -> Self {
        self.max_server_waits = count;
        self
    }

    /// Adds random jitter in `0..=max` to every backoff delay.
    #[must_use]
    pub fn jitter(mut self, max: Duration) -> Self {
        self.jitter = Some(max);
        self
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff delay after `retries_used` retries have already been spent.
    #[must_use]
    pub fn backoff_delay(&self, retries_used: u32) -> Duration {
        let base_ms = self.initial_delay.as_secs_f64() * 1000.0;
        let exponent = i32::try_from(retries_used).unwrap_or(i32::MAX);
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_secs_f64() * 1000.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(capped_ms.round() as u64);
        delay + self.calculate_jitter()
    }

    fn calculate_jitter(&self) -> Duration {
        let Some(max) = self.jitter else {
            return Duration::ZERO;
        };
        #[allow(clippy::cast_possible_truncation)]
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every allowed attempt failed.
    #[error("{label} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Operation label used in logs.
        label: String,
        /// Number of calls made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: E,
    },

    /// The operation reported a non-retryable failure.
    #[error("{label} failed permanently after {attempts} attempt(s): {source}")]
    Fatal {
        /// Operation label used in logs.
        label: String,
        /// Number of calls made.
        attempts: u32,
        /// The non-retryable error.
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// Number of calls made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Fatal { attempts, .. } => *attempts,
        }
    }

    /// Returns true when the run stopped on a non-retryable failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Borrows the last underlying error.
    #[must_use]
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { source, .. } => source,
        }
    }

    /// Consumes the wrapper and returns the last underlying error.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { source, .. } => source,
        }
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Creates an executor for the given policy.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the configured policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls `operation` until it succeeds, fails fatally, or retries run out.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Fatal`] on the first non-retryable failure and
    /// [`RetryError::Exhausted`] once `max_retries + 1` counted attempts failed.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut calls: u32 = 0;
        let mut retries_used: u32 = 0;
        let mut server_waits: u32 = 0;

        loop {
            calls += 1;
            debug!(label, call = calls, "attempting operation");

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let delay = match error.retry_class() {
                RetryClass::Fatal => {
                    debug!(label, error = %error, "not retrying: non-retryable failure");
                    return Err(RetryError::Fatal {
                        label: label.to_string(),
                        attempts: calls,
                        source: error,
                    });
                }
                RetryClass::ServerWait(wait) if server_waits < self.policy.max_server_waits => {
                    server_waits += 1;
                    let delay = wait + self.policy.server_wait_margin;
                    info!(
                        label,
                        wait_ms = delay.as_millis(),
                        server_waits,
                        error = %error,
                        "server asked to wait, pausing without consuming a retry"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                RetryClass::ServerWait(_) | RetryClass::Transient => {
                    if retries_used >= self.policy.max_retries {
                        warn!(label, attempts = calls, error = %error, "retries exhausted");
                        return Err(RetryError::Exhausted {
                            label: label.to_string(),
                            attempts: calls,
                            last: error,
                        });
                    }
                    let delay = self.policy.backoff_delay(retries_used);
                    retries_used += 1;
                    delay
                }
            };

            info!(
                label,
                retry = retries_used,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis(),
                error = %error,
                "retrying operation"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
        #[error("wait")]
        Wait(Duration),
    }

    impl Retryable for TestError {
        fn retry_class(&self) -> RetryClass {
            match self {
                Self::Transient => RetryClass::Transient,
                Self::Fatal => RetryClass::Fatal,
                Self::Wait(wait) => RetryClass::ServerWait(*wait),
            }
        }
    }

    /// Runs `script` errors in order (then succeeds) and returns the gaps between calls.
    async fn call_gaps(
        policy: RetryPolicy,
        script: Vec<TestError>,
    ) -> (Result<u32, RetryError<TestError>>, Vec<Duration>) {
        let executor = RetryExecutor::new(policy);
        let calls: RefCell<Vec<Instant>> = RefCell::new(Vec::new());
        let script = RefCell::new(script.into_iter());

        let result = executor
            .run("test", || {
                calls.borrow_mut().push(Instant::now());
                let next = script.borrow_mut().next();
                let count = u32::try_from(calls.borrow().len()).unwrap();
                async move {
                    match next {
                        Some(error) => Err(error),
                        None => Ok(count),
                    }
                }
            })
            .await;

        let calls = calls.into_inner();
        let gaps = calls.windows(2).map(|pair| pair[1] - pair[0]).collect();
        (result, gaps)
    }

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(policy.max_delay, Duration::from_secs(32));
        assert_eq!(policy.server_wait_margin, Duration::from_secs(1));
        assert!(policy.jitter.is_none());
    }

    #[test]
    fn test_backoff_delay_sequence_is_exact_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500), 3.0);
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1500));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(4500));
    }

    #[test]
    fn test_backoff_delay_respects_max_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), 2.0).max_delay(Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(6), Duration::from_secs(5));
    }

    #[test]
    fn test_multiplier_below_one_is_clamped() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 0.5);
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy =
            RetryPolicy::new(3, Duration::from_secs(1), 2.0).jitter(Duration::from_millis(200));
        for _ in 0..100 {
            let delay = policy.backoff_delay(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_plain_failures_follow_exponential_sequence() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        let (result, gaps) = call_gaps(
            policy,
            vec![TestError::Transient, TestError::Transient, TestError::Transient],
        )
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exhausts_after_max_retries_plus_one_calls() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100), 2.0);
        let (result, gaps) = call_gaps(
            policy,
            vec![
                TestError::Transient,
                TestError::Transient,
                TestError::Transient,
                TestError::Transient,
            ],
        )
        .await;

        let error = result.unwrap_err();
        assert!(matches!(error, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(
            gaps,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fatal_stops_immediately() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        let (result, gaps) = call_gaps(policy, vec![TestError::Fatal]).await;

        let error = result.unwrap_err();
        assert!(error.is_fatal());
        assert_eq!(error.attempts(), 1);
        assert!(gaps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_server_wait_overrides_delay_without_consuming_retry() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1), 2.0);
        let (result, gaps) = call_gaps(
            policy,
            vec![
                TestError::Transient,
                TestError::Wait(Duration::from_secs(5)),
                TestError::Wait(Duration::from_secs(3)),
            ],
        )
        .await;

        // One retry budget: the transient failure uses it, both waits are free.
        assert_eq!(result.unwrap(), 4);
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(6),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_server_wait_keeps_backoff_index() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        let (result, gaps) = call_gaps(
            policy,
            vec![
                TestError::Transient,
                TestError::Wait(Duration::from_secs(2)),
                TestError::Transient,
            ],
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(2)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_server_waits_are_bounded() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1), 2.0)
            .max_server_waits(2)
            .server_wait_margin(Duration::ZERO);
        let (result, gaps) = call_gaps(
            policy,
            vec![
                TestError::Wait(Duration::from_secs(10)),
                TestError::Wait(Duration::from_secs(10)),
                TestError::Wait(Duration::from_secs(10)),
                TestError::Wait(Duration::from_secs(10)),
            ],
        )
        .await;

        // Two free waits, then waits count as transient failures against one retry.
        let error = result.unwrap_err();
        assert!(matches!(error, RetryError::Exhausted { attempts: 4, .. }));
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(1)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_zero_retries_calls_once() {
        let policy = RetryPolicy::with_max_retries(0);
        let (result, gaps) = call_gaps(policy, vec![TestError::Transient]).await;
        assert_eq!(result.unwrap_err().attempts(), 1);
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_retry_error_accessors() {
        let error: RetryError<TestError> = RetryError::Exhausted {
            label: "search".to_string(),
            attempts: 4,
            last: TestError::Transient,
        };
        assert!(!error.is_fatal());
        assert!(error.to_string().contains("search failed after 4 attempt(s)"));
        assert!(matches!(error.last_error(), TestError::Transient));
        assert!(matches!(error.into_inner(), TestError::Transient));
    }
}
