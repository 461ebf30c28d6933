//! The retry loop.
//!
//! [`Retry`] owns a validated [`RetryPolicy`] and runs operations against it.
//! Each attempt calls the operation factory again, so every attempt gets a
//! fresh future (new request, new connection) rather than a replayed one.

use std::convert::Infallible;
use std::future::Future;
use std::pin::pin;
use std::task::Poll;
use std::time::Duration;

use tokio::time::Instant;

use super::config::RetryConfig;
use super::error::{PolicyError, RetryError, TimeoutError};
use super::policy::{Backoff, RetryEvent, RetryPolicy, RetryStrategy};

/// A validated retry policy, ready to run operations.
///
/// A `Retry` can only be built from a policy that passes
/// [`RetryPolicy::validate`], so running it always makes at least one
/// attempt. It holds no per-run state: one `Retry` can drive any number of
/// concurrent runs.
///
/// # Examples
///
/// ```rust
/// use undertow::Retry;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// # tokio_test::block_on(async {
/// let calls = AtomicU32::new(0);
/// let retry = Retry::new(3, 1).unwrap();
///
/// let result = retry
///     .run(|| async {
///         if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///             Err("503 Service Unavailable")
///         } else {
///             Ok("profile")
///         }
///     })
///     .await;
///
/// assert_eq!(result, Ok("profile"));
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # });
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Retry<B = RetryStrategy> {
    policy: RetryPolicy<B>,
}

/// Why the loop stopped without a value.
enum Halt<E, X> {
    Failed(E),
    Cancelled { attempts: u32, signal: X },
}

impl Retry {
    /// Build a constant-delay retry from raw settings.
    ///
    /// `max_attempts` must be at least 1 and `delay_ms` must not be negative.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::{PolicyError, Retry};
    /// use std::time::Duration;
    ///
    /// let retry = Retry::new(5, 250).unwrap();
    /// assert_eq!(retry.policy().max_attempts(), 5);
    /// assert_eq!(retry.policy().delay_after(1), Some(Duration::from_millis(250)));
    ///
    /// assert_eq!(Retry::new(-1, 250).unwrap_err(), PolicyError::InvalidMaxAttempts(-1));
    /// ```
    pub fn new(max_attempts: i64, delay_ms: i64) -> Result<Self, PolicyError> {
        let attempts = checked_attempts(max_attempts)?;
        let delay = checked_delay("delay_ms", delay_ms)?;
        Self::from_policy(RetryPolicy::constant(delay).with_max_attempts(attempts))
    }

    /// Build a retry from a [`RetryConfig`], typically loaded from a config file.
    pub fn from_config(config: RetryConfig) -> Result<Self, PolicyError> {
        Self::from_policy(RetryPolicy::from_config(config)?)
    }
}

impl Default for Retry {
    /// 3 attempts, 500ms apart.
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }
}

impl<B> Retry<B> {
    /// Validate a policy and wrap it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::{Retry, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(50)).with_max_attempts(4);
    /// assert!(Retry::from_policy(policy.clone()).is_ok());
    /// assert!(Retry::from_policy(policy.with_max_attempts(0)).is_err());
    /// ```
    pub fn from_policy(policy: RetryPolicy<B>) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// Get the policy this retry runs.
    pub fn policy(&self) -> &RetryPolicy<B> {
        &self.policy
    }

    /// Unwrap the policy.
    pub fn into_policy(self) -> RetryPolicy<B> {
        self.policy
    }
}

impl<B: Backoff> Retry<B> {
    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Returns the first successful value. When every attempt fails, returns
    /// the error of the last attempt exactly as the operation produced it;
    /// earlier errors are dropped.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with_hooks(operation, |_: &RetryEvent<'_, E>| {})
            .await
    }

    /// Retry only when the predicate returns true for the error.
    ///
    /// Non-retryable errors are returned immediately, without waiting and
    /// without using the rest of the budget.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::Retry;
    /// use std::sync::atomic::{AtomicU32, Ordering};
    ///
    /// #[derive(Debug, PartialEq)]
    /// enum ApiError { Unavailable, NotFound }
    ///
    /// # tokio_test::block_on(async {
    /// let calls = AtomicU32::new(0);
    /// let result = Retry::new(5, 1)
    ///     .unwrap()
    ///     .run_if(
    ///         || async {
    ///             calls.fetch_add(1, Ordering::SeqCst);
    ///             Err::<(), _>(ApiError::NotFound)
    ///         },
    ///         |err| matches!(err, ApiError::Unavailable),
    ///     )
    ///     .await;
    ///
    /// assert_eq!(result, Err(ApiError::NotFound));
    /// assert_eq!(calls.load(Ordering::SeqCst), 1);
    /// # });
    /// ```
    pub async fn run_if<T, E, F, Fut, P>(&self, operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let run = self.drive(
            operation,
            should_retry,
            |_: &RetryEvent<'_, E>| {},
            std::future::pending::<Infallible>(),
        );
        settle(instrument(run, self.policy.max_attempts()).await)
    }

    /// Run with a hook called after every failed attempt.
    ///
    /// The hook sees the failed attempt's number and error, the delay before
    /// the next attempt (`None` after the last one) and the time elapsed so
    /// far. It runs synchronously between attempts and should not block.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::Retry;
    ///
    /// # tokio_test::block_on(async {
    /// let mut seen = Vec::new();
    /// let result = Retry::new(2, 1)
    ///     .unwrap()
    ///     .run_with_hooks(
    ///         || async { Err::<(), _>("timeout") },
    ///         |event| seen.push((event.attempt, event.next_delay.is_some())),
    ///     )
    ///     .await;
    ///
    /// assert_eq!(result, Err("timeout"));
    /// assert_eq!(seen, vec![(1, true), (2, false)]);
    /// # });
    /// ```
    pub async fn run_with_hooks<T, E, F, Fut, H>(&self, operation: F, on_retry: H) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&RetryEvent<'_, E>),
    {
        let run = self.drive(
            operation,
            |_: &E| true,
            on_retry,
            std::future::pending::<Infallible>(),
        );
        settle(instrument(run, self.policy.max_attempts()).await)
    }

    /// Run until success, budget exhaustion, or `cancel` completes.
    ///
    /// The signal is checked before every attempt and raced against every
    /// delay. An attempt that has already started is allowed to finish. Any
    /// future works as a signal: a `oneshot::Receiver`, `Notify::notified()`,
    /// a `sleep` acting as an overall deadline.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::{Retry, RetryError};
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    /// let retry = Retry::new(10, 1_000).unwrap();
    ///
    /// let run = retry.run_until(|| async { Err::<(), _>("offline") }, rx);
    /// tx.send(()).unwrap();
    ///
    /// assert_eq!(run.await, Err(RetryError::Cancelled { attempts: 0 }));
    /// # });
    /// ```
    pub async fn run_until<T, E, F, Fut, C>(
        &self,
        operation: F,
        cancel: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Future,
    {
        let run = self.drive(operation, |_: &E| true, |_: &RetryEvent<'_, E>| {}, cancel);
        instrument(run, self.policy.max_attempts())
            .await
            .map_err(|halt| match halt {
                Halt::Failed(e) => RetryError::Failed(e),
                Halt::Cancelled { attempts, .. } => RetryError::Cancelled { attempts },
            })
    }

    /// Run with a deadline on every attempt.
    ///
    /// An attempt that overruns `per_attempt` is dropped and counts as a
    /// failed attempt, so it is retried like any other failure. If the last
    /// attempt times out, the result is [`TimeoutError::Timeout`].
    pub async fn run_with_timeout<T, E, F, Fut>(
        &self,
        mut operation: F,
        per_attempt: Duration,
    ) -> Result<T, TimeoutError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(|| with_timeout(per_attempt, operation())).await
    }

    async fn drive<T, E, X, F, Fut, P, H, C>(
        &self,
        mut operation: F,
        should_retry: P,
        mut on_retry: H,
        cancel: C,
    ) -> Result<T, Halt<E, X>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        H: FnMut(&RetryEvent<'_, E>),
        C: Future<Output = X>,
    {
        let mut cancel = pin!(cancel);
        let start = Instant::now();
        let mut attempt = 0u32;
        let mut prev_delay: Option<Duration> = None;

        loop {
            if let Poll::Ready(signal) = futures::poll!(cancel.as_mut()) {
                #[cfg(feature = "tracing")]
                tracing::info!(attempts = attempt, "retry cancelled");
                return Err(Halt::Cancelled {
                    attempts: attempt,
                    signal,
                });
            }

            let delay = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;

                    let retryable = should_retry(&error);
                    let delay = if retryable {
                        self.policy.delay_with_jitter(attempt, prev_delay)
                    } else {
                        None
                    };

                    on_retry(&RetryEvent {
                        attempt,
                        error: &error,
                        next_delay: delay,
                        elapsed: start.elapsed(),
                    });

                    match delay {
                        Some(d) => d,
                        None => {
                            #[cfg(feature = "tracing")]
                            {
                                if retryable {
                                    tracing::debug!(attempts = attempt, "retry budget exhausted");
                                } else {
                                    tracing::debug!(attempt, "error is not retryable");
                                }
                            }
                            return Err(Halt::Failed(error));
                        }
                    }
                }
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                max_attempts = self.policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "attempt failed, retrying"
            );

            // Zero delay skips the timer; cancellation is still checked before the next attempt.
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    signal = cancel.as_mut() => {
                        #[cfg(feature = "tracing")]
                        tracing::info!(attempts = attempt, "retry cancelled during delay");
                        return Err(Halt::Cancelled { attempts: attempt, signal });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            prev_delay = Some(delay);
        }
    }
}

/// Run `operation` with the default policy: 3 attempts, 500ms apart.
///
/// # Examples
///
/// ```rust
/// use undertow::retry;
///
/// # tokio_test::block_on(async {
/// let product = retry(|| async { Ok::<_, String>("sku-42") }).await;
/// assert_eq!(product, Ok("sku-42"));
/// # });
/// ```
pub async fn retry<T, E, F, Fut>(operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    Retry::default().run(operation).await
}

/// Give a single future a deadline.
///
/// Returns [`TimeoutError::Timeout`] if `future` has not completed within
/// `duration`, and wraps its own error in [`TimeoutError::Inner`] otherwise.
pub async fn with_timeout<T, E, Fut>(duration: Duration, future: Fut) -> Result<T, TimeoutError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Timeout { duration }),
    }
}

pub(crate) fn checked_attempts(max_attempts: i64) -> Result<u32, PolicyError> {
    u32::try_from(max_attempts)
        .ok()
        .filter(|n| *n > 0)
        .ok_or(PolicyError::InvalidMaxAttempts(max_attempts))
}

pub(crate) fn checked_delay(field: &'static str, value_ms: i64) -> Result<Duration, PolicyError> {
    u64::try_from(value_ms)
        .map(Duration::from_millis)
        .map_err(|_| PolicyError::NegativeDelay { field, value_ms })
}

fn settle<T, E>(result: Result<T, Halt<E, Infallible>>) -> Result<T, E> {
    result.map_err(|halt| match halt {
        Halt::Failed(e) => e,
        Halt::Cancelled { signal, .. } => match signal {},
    })
}

#[cfg(feature = "tracing")]
fn instrument<Fut: Future>(run: Fut, max_attempts: u32) -> impl Future<Output = Fut::Output> {
    use tracing::Instrument as _;
    run.instrument(tracing::debug_span!("retry", max_attempts))
}

#[cfg(not(feature = "tracing"))]
fn instrument<Fut: Future>(run: Fut, _max_attempts: u32) -> Fut {
    run
}
