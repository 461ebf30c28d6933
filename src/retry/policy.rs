//! Retry policy types and configuration.

use std::time::Duration;

use super::error::PolicyError;

/// Attempt budget used when none is given.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Inter-attempt delay used when none is given.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// A retry policy describing how a failed operation is re-attempted.
///
/// Policies are pure data - they describe retry behavior but don't execute it.
/// Running a policy is the job of [`Retry`](crate::Retry), which refuses
/// policies that fail [`validate`](RetryPolicy::validate).
///
/// # Attempt budget
///
/// `max_attempts` counts invocations of the operation, not retries:
/// `with_max_attempts(3)` means one initial attempt plus up to two retries.
/// A budget of `1` means a single attempt and no delay at all.
///
/// # Examples
///
/// ```rust
/// use undertow::RetryPolicy;
/// use std::time::Duration;
///
/// // The default: 3 attempts, 500ms apart
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(500)));
///
/// // Exponential backoff with a cap
/// let policy = RetryPolicy::exponential(Duration::from_millis(100))
///     .with_max_attempts(6)
///     .with_max_delay(Duration::from_secs(1));
/// assert_eq!(policy.delay_after(5), Some(Duration::from_secs(1)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy<B = RetryStrategy> {
    backoff: B,
    max_attempts: u32,
    max_delay: Option<Duration>,
    jitter: JitterStrategy,
}

/// The built-in backoff strategies for retry delays.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Fixed delay between attempts.
    Constant(Duration),
    /// Delay increases linearly: base * attempt.
    Linear {
        /// Base delay duration.
        base: Duration,
    },
    /// Delay doubles: base * 2^(attempt - 1).
    Exponential {
        /// Base delay duration.
        base: Duration,
    },
    /// Delay follows the Fibonacci sequence: base * fib(attempt).
    Fibonacci {
        /// Base delay duration.
        base: Duration,
    },
}

/// Strategy for adding randomness to delays.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±percentage randomness to delay.
    Proportional(f64),
    /// Random delay between 0 and calculated delay.
    Full,
    /// Random delay between the calculated delay and 3x the previous delay.
    Decorrelated,
}

/// A delay as a function of the failed attempt number.
///
/// `attempt` is 1-indexed: `delay(1)` is the wait after the first attempt
/// failed. Every `Fn(u32) -> Duration` is a `Backoff`, so a one-off schedule
/// needs no new type:
///
/// ```rust
/// use undertow::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::from_backoff(|attempt: u32| Duration::from_millis(10 * attempt as u64 * attempt as u64))
///     .with_max_attempts(4);
///
/// assert_eq!(policy.delay_after(3), Some(Duration::from_millis(90)));
/// ```
pub trait Backoff {
    /// Delay to wait after the given failed attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

impl Backoff for RetryStrategy {
    fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            RetryStrategy::Constant(d) => *d,
            RetryStrategy::Linear { base } => base.saturating_mul(attempt),
            RetryStrategy::Exponential { base } => {
                base.saturating_mul(2u32.saturating_pow(attempt - 1))
            }
            RetryStrategy::Fibonacci { base } => base.saturating_mul(fibonacci(attempt)),
        }
    }
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// Information about a failed attempt, passed to hooks.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a E,
    /// Delay before the next attempt, `None` if this was the last one.
    pub next_delay: Option<Duration>,
    /// Total elapsed time since the first attempt started.
    pub elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::constant(DEFAULT_DELAY)
    }
}

impl RetryPolicy {
    /// Create a policy with constant delay between attempts.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::constant(Duration::from_millis(100));
    ///
    /// // Every retry waits 100ms, and the final attempt gets no delay
    /// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_after(2), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_after(3), None);
    /// ```
    pub fn constant(delay: Duration) -> Self {
        Self::from_backoff(RetryStrategy::Constant(delay))
    }

    /// Create a policy with linearly increasing delay.
    ///
    /// Delay = base * attempt
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::linear(Duration::from_millis(100))
    ///     .with_max_attempts(5);
    ///
    /// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_after(3), Some(Duration::from_millis(300)));
    /// ```
    pub fn linear(base: Duration) -> Self {
        Self::from_backoff(RetryStrategy::Linear { base })
    }

    /// Create a policy with exponentially increasing delay.
    ///
    /// Delay = base * 2^(attempt - 1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100))
    ///     .with_max_attempts(5);
    ///
    /// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_after(3), Some(Duration::from_millis(400)));
    /// ```
    pub fn exponential(base: Duration) -> Self {
        Self::from_backoff(RetryStrategy::Exponential { base })
    }

    /// Create a policy with Fibonacci-based delay.
    ///
    /// Delay = base * fib(attempt)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::fibonacci(Duration::from_millis(100))
    ///     .with_max_attempts(6);
    ///
    /// // 100ms, 100ms, 200ms, 300ms, 500ms
    /// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_after(2), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_after(3), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_after(4), Some(Duration::from_millis(300)));
    /// assert_eq!(policy.delay_after(5), Some(Duration::from_millis(500)));
    /// ```
    pub fn fibonacci(base: Duration) -> Self {
        Self::from_backoff(RetryStrategy::Fibonacci { base })
    }

    /// Get the built-in strategy.
    pub fn strategy(&self) -> &RetryStrategy {
        &self.backoff
    }
}

impl<B> RetryPolicy<B> {
    /// Create a policy around any [`Backoff`], with the default attempt budget.
    pub fn from_backoff(backoff: B) -> Self {
        Self {
            backoff,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: None,
            jitter: JitterStrategy::None,
        }
    }

    /// Set the total number of attempts, including the first one.
    ///
    /// Zero is accepted here and rejected by [`validate`](Self::validate).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::constant(Duration::from_millis(100))
    ///     .with_max_attempts(1);
    ///
    /// // A single attempt never waits
    /// assert_eq!(policy.delay_after(1), None);
    /// ```
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the maximum delay cap.
    ///
    /// Delays never exceed this value, whatever the backoff or jitter says.
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Add proportional jitter to delays.
    ///
    /// `0.25` means the actual delay lands within ±25% of the calculated one.
    /// The factor is clamped to `[0, 1]`.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, delays are unchanged.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        let factor = if factor.is_nan() { 0.0 } else { factor };
        self.jitter = JitterStrategy::Proportional(factor.clamp(0.0, 1.0));
        self
    }

    /// Use full jitter: a random delay between 0 and the calculated delay.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, delays are unchanged.
    pub fn with_full_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Full;
        self
    }

    /// Use decorrelated jitter: random between the calculated delay and 3x the
    /// previous delay.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, delays are unchanged.
    pub fn with_decorrelated_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Decorrelated;
        self
    }

    /// Get the attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the maximum delay cap.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Get the jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// Get the backoff function.
    pub fn backoff(&self) -> &B {
        &self.backoff
    }

    /// Check that the policy can run at least one attempt.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::{PolicyError, RetryPolicy};
    ///
    /// assert!(RetryPolicy::default().validate().is_ok());
    /// assert_eq!(
    ///     RetryPolicy::default().with_max_attempts(0).validate(),
    ///     Err(PolicyError::InvalidMaxAttempts(0)),
    /// );
    /// ```
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            Err(PolicyError::InvalidMaxAttempts(0))
        } else {
            Ok(())
        }
    }
}

impl<B: Backoff> RetryPolicy<B> {
    /// Calculate the delay to wait after failed attempt N (1-indexed).
    ///
    /// Returns None if attempt N was the last one the budget allows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100))
    ///     .with_max_attempts(3);
    ///
    /// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.delay_after(3), None); // budget spent
    /// ```
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let base_delay = self.backoff.delay(attempt);

        Some(match self.max_delay {
            Some(max) => base_delay.min(max),
            None => base_delay,
        })
    }

    /// Calculate the delay after failed attempt N with jitter applied.
    ///
    /// This is used internally by the retry executor.
    #[doc(hidden)]
    pub fn delay_with_jitter(&self, attempt: u32, prev_delay: Option<Duration>) -> Option<Duration> {
        let base_delay = self.delay_after(attempt)?;
        Some(self.jitter.apply(base_delay, prev_delay, self.max_delay))
    }
}

impl JitterStrategy {
    /// Apply jitter to a base delay.
    ///
    /// # Arguments
    ///
    /// * `base_delay` - The calculated delay before jitter
    /// * `prev_delay` - The previous delay (for decorrelated jitter)
    /// * `max_delay` - Optional cap on the final delay
    pub fn apply(
        &self,
        base_delay: Duration,
        #[cfg_attr(not(feature = "jitter"), allow(unused_variables))] prev_delay: Option<Duration>,
        max_delay: Option<Duration>,
    ) -> Duration {
        let jittered = match self {
            JitterStrategy::None => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let base_millis = base_delay.as_millis() as f64;
                let spread = base_millis * factor;
                let low = (base_millis - spread).max(0.0);
                let high = base_millis + spread;
                if high <= low {
                    base_delay
                } else {
                    Duration::from_millis(rand::rng().random_range(low..=high) as u64)
                }
            }
            #[cfg(feature = "jitter")]
            JitterStrategy::Full => {
                use rand::Rng;
                let max_millis = base_delay.as_millis() as u64;
                if max_millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=max_millis))
                }
            }
            #[cfg(feature = "jitter")]
            JitterStrategy::Decorrelated => {
                use rand::Rng;
                let prev = prev_delay.unwrap_or(base_delay);
                let base_millis = base_delay.as_millis() as u64;
                let max_millis = prev.as_millis().saturating_mul(3) as u64;
                if max_millis <= base_millis {
                    base_delay
                } else {
                    Duration::from_millis(rand::rng().random_range(base_millis..=max_millis))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) | JitterStrategy::Full | JitterStrategy::Decorrelated => {
                base_delay
            }
        };

        match max_delay {
            Some(max) => jittered.min(max),
            None => jittered,
        }
    }
}

/// Calculate the nth Fibonacci number.
fn fibonacci(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut a = 0u32;
    let mut b = 1u32;
    for _ in 1..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    b
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.strategy(), &RetryStrategy::Constant(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn test_single_attempt_never_waits() {
        let policy = RetryPolicy::constant(Duration::from_millis(100)).with_max_attempts(1);

        assert_eq!(policy.delay_after(1), None);
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::linear(Duration::from_millis(100)).with_max_attempts(5);

        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_after(5), None);
    }

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100)).with_max_attempts(5);

        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_exponential_saturates() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1)).with_max_attempts(u32::MAX);

        assert!(policy.delay_after(200).is_some());
    }

    #[test]
    fn test_fibonacci_delay() {
        let policy = RetryPolicy::fibonacci(Duration::from_millis(100)).with_max_attempts(7);

        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_after(5), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(6), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100))
            .with_max_attempts(10)
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_millis(500))); // capped
        assert_eq!(policy.delay_after(9), Some(Duration::from_millis(500))); // capped
    }

    #[test]
    fn test_closure_backoff() {
        let policy = RetryPolicy::from_backoff(|attempt: u32| Duration::from_millis(attempt as u64 * 7))
            .with_max_attempts(4);

        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(7)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(21)));
        assert_eq!(policy.delay_after(4), None);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let policy = RetryPolicy::default().with_max_attempts(0);

        assert_eq!(policy.validate(), Err(PolicyError::InvalidMaxAttempts(0)));
        assert_eq!(policy.delay_after(1), None);
    }

    #[test]
    fn test_validate_accepts_single_attempt() {
        assert!(RetryPolicy::default().with_max_attempts(1).validate().is_ok());
    }

    #[test]
    fn test_jitter_factor_is_clamped() {
        let policy = RetryPolicy::default().with_jitter(4.0);
        assert_eq!(policy.jitter(), &JitterStrategy::Proportional(1.0));

        let policy = RetryPolicy::default().with_jitter(f64::NAN);
        assert_eq!(policy.jitter(), &JitterStrategy::Proportional(0.0));
    }

    #[test]
    fn test_jitter_none_returns_base_delay() {
        let base = Duration::from_millis(100);
        assert_eq!(JitterStrategy::None.apply(base, None, None), base);
    }

    #[cfg(not(feature = "jitter"))]
    #[test]
    fn test_jitter_is_inert_without_feature() {
        let policy = RetryPolicy::constant(Duration::from_millis(100)).with_full_jitter();

        assert_eq!(
            policy.delay_with_jitter(1, None),
            Some(Duration::from_millis(100))
        );
    }

    #[cfg(feature = "jitter")]
    #[test]
    fn test_jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..200 {
            let d = JitterStrategy::Proportional(0.25).apply(base, None, None);
            assert!(d >= Duration::from_millis(75) && d <= Duration::from_millis(125));

            let d = JitterStrategy::Full.apply(base, None, None);
            assert!(d <= base);

            let d = JitterStrategy::Decorrelated.apply(base, Some(base), Some(Duration::from_millis(250)));
            assert!(d >= base && d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_fibonacci_function() {
        let expected = [0, 1, 1, 2, 3, 5, 8, 13];
        for (n, want) in expected.iter().enumerate() {
            assert_eq!(fibonacci(n as u32), *want);
        }
        assert_eq!(fibonacci(200), u32::MAX);
    }
}
