//! Bounded retry for fallible async operations.
//!
//! The pieces, in the order a caller meets them:
//!
//! - [`RetryPolicy`]: pure data describing the attempt budget and the delay
//!   between attempts. Easy to build, clone, compare and test without a runtime.
//! - [`Retry`]: a policy that has passed validation, and the loop that runs
//!   operations against it.
//! - [`RetryConfig`]: raw settings from a config file, validated into a policy.
//!
//! # Quick Start
//!
//! ```rust
//! use undertow::{Retry, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let retry = Retry::from_policy(
//!     RetryPolicy::constant(Duration::from_millis(1)).with_max_attempts(3),
//! )
//! .unwrap();
//!
//! let value = retry.run(|| async { Ok::<_, String>(42) }).await;
//! assert_eq!(value, Ok(42));
//! # });
//! ```
//!
//! # Delay Strategies
//!
//! - **Constant**: Fixed delay between attempts (the default, 500ms)
//! - **Linear**: Delay increases linearly (100ms, 200ms, 300ms, ...)
//! - **Exponential**: Delay doubles each retry (100ms, 200ms, 400ms, ...)
//! - **Fibonacci**: Delay follows Fibonacci sequence
//! - **Custom**: any `Fn(u32) -> Duration`, see [`Backoff`]
//!
//! # Jitter Support
//!
//! Enable the `jitter` feature to randomize delays:
//!
//! ```toml
//! undertow = { version = "...", features = ["jitter"] }
//! ```
//!
//! # Error Types
//!
//! - [`PolicyError`]: Settings that cannot make a runnable policy
//! - [`RetryError`]: Returned by [`Retry::run_until`], separates cancellation from failure
//! - [`TimeoutError`]: Returned when an attempt overruns its deadline

mod config;
mod error;
mod invoke;
mod policy;

pub use config::{BackoffKind, RetryConfig};
pub use error::{PolicyError, RetryError, TimeoutError};
pub use invoke::{retry, with_timeout, Retry};
pub use policy::{
    Backoff, JitterStrategy, RetryEvent, RetryPolicy, RetryStrategy, DEFAULT_DELAY,
    DEFAULT_MAX_ATTEMPTS,
};
