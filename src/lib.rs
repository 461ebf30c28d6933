//! # Undertow
//!
//! > *"What pulls you back for another try"*
//!
//! Bounded retry for fallible async operations.
//!
//! Network calls behind a mobile storefront fail in boring ways: a dropped
//! connection, a 503 from a rate-limited endpoint. `undertow` wraps such a
//! call, re-invokes it a bounded number of times with a delay in between, and
//! hands back the first success or the last failure, untouched.
//!
//! ## Quick Example
//!
//! ```rust
//! use undertow::retry;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! # tokio_test::block_on(async {
//! let calls = AtomicU32::new(0);
//!
//! // 3 attempts, 500ms apart
//! let profile = retry(|| async {
//!     match calls.fetch_add(1, Ordering::SeqCst) {
//!         0 => Err("connection reset"),
//!         _ => Ok("ada@example.com"),
//!     }
//! })
//! .await;
//!
//! assert_eq!(profile, Ok("ada@example.com"));
//! assert_eq!(calls.load(Ordering::SeqCst), 2);
//! # });
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit `tracing` events and spans from the retry loop
//! - `jitter`: randomize delays (`rand`)
//! - `serde`: deserialize [`RetryConfig`] from configuration files
//! - `proptest`: `Arbitrary` implementations for policies

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod retry;
pub mod testing;

// Re-exports
pub use retry::{
    retry, with_timeout, Backoff, BackoffKind, JitterStrategy, PolicyError, Retry, RetryConfig,
    RetryError, RetryEvent, RetryPolicy, RetryStrategy, TimeoutError,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::retry::{
        retry, with_timeout, Backoff, PolicyError, Retry, RetryError, RetryPolicy, TimeoutError,
    };
}
