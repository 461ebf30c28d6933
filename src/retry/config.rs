//! Raw retry settings, as they appear in an application's configuration.
//!
//! [`RetryConfig`] keeps every field in the loosest type a config file can
//! carry (signed integers, an optional jitter factor) and is only trusted
//! once converted into a [`RetryPolicy`]. With the `serde` feature it can be
//! embedded directly in a deserialized config struct:
//!
//! ```rust,ignore
//! #[derive(serde::Deserialize)]
//! struct ApiSettings {
//!     base_url: String,
//!     #[serde(default)]
//!     retry: undertow::RetryConfig,
//! }
//! ```

use super::error::PolicyError;
use super::invoke::{checked_attempts, checked_delay};
use super::policy::{RetryPolicy, DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS};

/// Unvalidated retry settings.
///
/// Missing fields fall back to the defaults: 3 attempts, 500ms constant delay,
/// no cap, no jitter.
///
/// # Examples
///
/// ```rust
/// use undertow::{BackoffKind, RetryConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = RetryConfig {
///     max_attempts: 4,
///     delay_ms: 100,
///     backoff: BackoffKind::Exponential,
///     max_delay_ms: Some(250),
///     ..RetryConfig::default()
/// };
///
/// let policy = RetryPolicy::from_config(config).unwrap();
/// assert_eq!(policy.delay_after(3), Some(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: i64,
    /// Base delay in milliseconds.
    pub delay_ms: i64,
    /// How the delay grows between attempts.
    pub backoff: BackoffKind,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: Option<i64>,
    /// Proportional jitter factor in `[0, 1]`. Needs the `jitter` feature to
    /// take effect.
    pub jitter: Option<f64>,
}

/// Name of a built-in backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackoffKind {
    /// Same delay every time.
    #[default]
    Constant,
    /// `delay_ms * attempt`.
    Linear,
    /// `delay_ms * 2^(attempt - 1)`.
    Exponential,
    /// `delay_ms * fib(attempt)`.
    Fibonacci,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: i64::from(DEFAULT_MAX_ATTEMPTS),
            delay_ms: DEFAULT_DELAY.as_millis() as i64,
            backoff: BackoffKind::Constant,
            max_delay_ms: None,
            jitter: None,
        }
    }
}

impl RetryPolicy {
    /// Validate raw settings into a policy.
    pub fn from_config(config: RetryConfig) -> Result<Self, PolicyError> {
        let attempts = checked_attempts(config.max_attempts)?;
        let delay = checked_delay("delay_ms", config.delay_ms)?;

        let mut policy = match config.backoff {
            BackoffKind::Constant => RetryPolicy::constant(delay),
            BackoffKind::Linear => RetryPolicy::linear(delay),
            BackoffKind::Exponential => RetryPolicy::exponential(delay),
            BackoffKind::Fibonacci => RetryPolicy::fibonacci(delay),
        }
        .with_max_attempts(attempts);

        if let Some(max_delay_ms) = config.max_delay_ms {
            let cap = checked_delay("max_delay_ms", max_delay_ms)?;
            policy = policy.with_max_delay(cap);
        }
        if let Some(factor) = config.jitter {
            policy = policy.with_jitter(factor);
        }

        Ok(policy)
    }
}

impl TryFrom<RetryConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(config: RetryConfig) -> Result<Self, Self::Error> {
        Self::from_config(config)
    }
}
