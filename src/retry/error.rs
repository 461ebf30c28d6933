//! Error types for retry operations.

use std::time::Duration;

/// Error returned when retry settings cannot describe a runnable policy.
///
/// Raised when a [`Retry`](crate::Retry) is built, so a misconfigured budget
/// is reported before the operation is ever invoked.
///
/// # Examples
///
/// ```rust
/// use undertow::{PolicyError, Retry};
///
/// assert_eq!(Retry::new(0, 500).unwrap_err(), PolicyError::InvalidMaxAttempts(0));
/// assert_eq!(
///     Retry::new(3, -1).unwrap_err(),
///     PolicyError::NegativeDelay { field: "delay_ms", value_ms: -1 },
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The attempt budget was zero, negative, or too large to count.
    InvalidMaxAttempts(i64),
    /// A delay setting was negative.
    NegativeDelay {
        /// Name of the offending setting.
        field: &'static str,
        /// The rejected value, in milliseconds.
        value_ms: i64,
    },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be between 1 and {}, got {}", u32::MAX, n)
            }
            Self::NegativeDelay { field, value_ms } => {
                write!(f, "{} must not be negative, got {}ms", field, value_ms)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Error returned by a cancellable retry.
///
/// Keeps a cancelled run apart from a run whose attempts all failed.
///
/// # Examples
///
/// ```rust
/// use undertow::{Retry, RetryError};
///
/// # tokio_test::block_on(async {
/// let retry = Retry::new(3, 1).unwrap();
///
/// // The signal is already complete, so no attempt is made
/// let result = retry
///     .run_until(|| async { Ok::<(), &str>(()) }, async {})
///     .await;
///
/// assert_eq!(result, Err(RetryError::Cancelled { attempts: 0 }));
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt allowed failed (or a non-retryable error was hit).
    /// Holds the error of the final attempt.
    Failed(E),
    /// The cancellation signal fired before the run completed.
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Returns true if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get the final attempt's error, if the run was not cancelled.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Cancelled { .. } => None,
        }
    }

    /// Get a reference to the final attempt's error, if any.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Cancelled { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::Cancelled { attempts } => {
                write!(f, "retry cancelled after {} attempts", attempts)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Error returned when an attempt runs past its deadline.
///
/// Can wrap either a timeout or an inner error from the operation.
///
/// # Examples
///
/// ```rust
/// use undertow::{with_timeout, TimeoutError};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let result = with_timeout(Duration::from_millis(10), async {
///     tokio::time::sleep(Duration::from_secs(10)).await;
///     Ok::<_, String>(42)
/// })
/// .await;
///
/// match result {
///     Err(TimeoutError::Timeout { duration }) => {
///         assert_eq!(duration, Duration::from_millis(10));
///     }
///     _ => panic!("Expected timeout"),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError<E> {
    /// The operation timed out.
    Timeout {
        /// The timeout duration that was exceeded.
        duration: Duration,
    },
    /// An inner error occurred before timeout.
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an inner error.
    pub fn inner(error: E) -> Self {
        Self::Inner(error)
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this is an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { duration } => write!(f, "operation timed out after {:?}", duration),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}
