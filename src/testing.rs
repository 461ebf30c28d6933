//! Testing utilities for code that retries
//!
//! Checking a retry means checking what happened to the operation: how many
//! times it ran, when, and what it returned each time. [`ScriptedOperation`]
//! replays a fixed script of outcomes and records every call, so those
//! questions have exact answers. Pair it with tokio's paused clock
//! (`#[tokio::test(start_paused = true)]`) and call gaps are exact too.
//!
//! # Examples
//!
//! ```rust
//! use undertow::{assert_attempts, Retry};
//! use undertow::testing::ScriptedOperation;
//!
//! # tokio_test::block_on(async {
//! let op = ScriptedOperation::new([Err("503"), Err("503"), Ok("product")]);
//!
//! let result = Retry::new(3, 1).unwrap().run(|| op.call()).await;
//!
//! assert_eq!(result, Ok("product"));
//! assert_attempts!(op, 3);
//! # });
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// An operation that replays a script of outcomes.
///
/// Each [`call`](Self::call) takes the next outcome from the script. Once the
/// script is down to its last outcome, that outcome repeats forever, so
/// `ScriptedOperation::new([Err(e)])` always fails.
///
/// Clones share the same script and call log.
#[derive(Debug, Clone)]
pub struct ScriptedOperation<T, E> {
    inner: Arc<Mutex<Script<T, E>>>,
}

#[derive(Debug)]
struct Script<T, E> {
    pending: VecDeque<Result<T, E>>,
    last: Result<T, E>,
    latency: Duration,
    calls: Vec<Instant>,
}

impl<T, E> ScriptedOperation<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Create an operation from a non-empty script.
    ///
    /// # Panics
    ///
    /// Panics if `outcomes` is empty.
    pub fn new(outcomes: impl IntoIterator<Item = Result<T, E>>) -> Self {
        let mut pending: VecDeque<_> = outcomes.into_iter().collect();
        let last = match pending.pop_back() {
            Some(last) => last,
            None => panic!("ScriptedOperation needs at least one outcome"),
        };
        Self {
            inner: Arc::new(Mutex::new(Script {
                pending,
                last,
                latency: Duration::ZERO,
                calls: Vec::new(),
            })),
        }
    }

    /// An operation that fails with `error` every time.
    pub fn always_failing(error: E) -> Self {
        Self::new([Err(error)])
    }

    /// An operation that fails `failures` times, then succeeds with `value`.
    pub fn failing_then(failures: usize, error: E, value: T) -> Self {
        let script = std::iter::repeat_n(Err(error), failures).chain(std::iter::once(Ok(value)));
        Self::new(script)
    }

    /// Make every call take `latency` before it resolves.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Run the next step of the script.
    ///
    /// The call is recorded when this method is invoked, not when the
    /// returned future completes.
    pub fn call(&self) -> impl Future<Output = Result<T, E>> + Send + 'static
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let (outcome, latency) = {
            let mut script = self.lock();
            script.calls.push(Instant::now());
            let outcome = match script.pending.pop_front() {
                Some(outcome) => outcome,
                None => script.last.clone(),
            };
            (outcome, script.latency)
        };

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            outcome
        }
    }
}

impl<T, E> ScriptedOperation<T, E> {
    /// Number of times the operation has been called.
    pub fn calls(&self) -> u32 {
        self.lock().calls.len() as u32
    }

    /// When each call was made.
    pub fn call_times(&self) -> Vec<Instant> {
        self.lock().calls.clone()
    }

    /// Time between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        self.lock()
            .calls
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script<T, E>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Assert how many times a [`ScriptedOperation`] was called.
///
/// # Example
///
/// ```rust
/// use undertow::assert_attempts;
/// use undertow::testing::ScriptedOperation;
///
/// let op = ScriptedOperation::<(), _>::always_failing("down");
/// assert_attempts!(op, 0);
/// ```
#[macro_export]
macro_rules! assert_attempts {
    ($operation:expr, $expected:expr) => {{
        let actual = $operation.calls();
        let expected: u32 = $expected;
        if actual != expected {
            panic!("Expected {} attempts, got {}", expected, actual);
        }
    }};
}

/// Assert that a run failed with a specific error.
///
/// # Example
///
/// ```rust
/// use undertow::assert_final_error;
///
/// let result: Result<(), &str> = Err("timeout");
/// assert_final_error!(result, "timeout");
/// ```
#[macro_export]
macro_rules! assert_final_error {
    ($result:expr, $expected:expr) => {
        match $result {
            Err(error) => assert_eq!(error, $expected),
            Ok(value) => panic!(
                "Expected final error {:?}, got Ok: {:?}",
                $expected, value
            ),
        }
    };
}

#[cfg(feature = "proptest")]
use proptest::prelude::*;

#[cfg(feature = "proptest")]
impl Arbitrary for crate::RetryStrategy {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let base = (0u64..10_000).prop_map(Duration::from_millis);
        prop_oneof![
            base.clone().prop_map(crate::RetryStrategy::Constant),
            base.clone().prop_map(|base| crate::RetryStrategy::Linear { base }),
            base.clone().prop_map(|base| crate::RetryStrategy::Exponential { base }),
            base.prop_map(|base| crate::RetryStrategy::Fibonacci { base }),
        ]
        .boxed()
    }
}

#[cfg(feature = "proptest")]
impl Arbitrary for crate::RetryPolicy {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<crate::RetryStrategy>(),
            1u32..20,
            proptest::option::of((0u64..60_000).prop_map(Duration::from_millis)),
        )
            .prop_map(|(strategy, attempts, cap)| {
                let policy = crate::RetryPolicy::from_backoff(strategy).with_max_attempts(attempts);
                match cap {
                    Some(cap) => policy.with_max_delay(cap),
                    None => policy,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replays_in_order() {
        let op = ScriptedOperation::new([Err("a"), Err("b"), Ok(1)]);

        assert_eq!(op.call().await, Err("a"));
        assert_eq!(op.call().await, Err("b"));
        assert_eq!(op.call().await, Ok(1));
        assert_attempts!(op, 3);
    }

    #[tokio::test]
    async fn scripted_repeats_last_outcome() {
        let op = ScriptedOperation::<i32, _>::always_failing("down");

        for _ in 0..4 {
            assert_eq!(op.call().await, Err("down"));
        }
        assert_attempts!(op, 4);
    }

    #[tokio::test]
    async fn failing_then_succeeds_after_failures() {
        let op = ScriptedOperation::failing_then(2, "busy", "ok");

        assert_eq!(op.call().await, Err("busy"));
        assert_eq!(op.call().await, Err("busy"));
        assert_eq!(op.call().await, Ok("ok"));
        assert_eq!(op.call().await, Ok("ok"));
    }

    #[tokio::test]
    async fn clones_share_the_call_log() {
        let op = ScriptedOperation::new([Ok::<_, ()>(1)]);
        let clone = op.clone();

        let _ = clone.call().await;
        assert_attempts!(op, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_and_gaps() {
        let op = ScriptedOperation::new([Ok::<_, ()>(())]).with_latency(Duration::from_millis(30));

        let start = Instant::now();
        let _ = op.call().await;
        assert!(start.elapsed() >= Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(70)).await;
        let _ = op.call().await;

        let gaps = op.gaps();
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0] >= Duration::from_millis(100) && gaps[0] < Duration::from_millis(105));
        assert_eq!(op.call_times().len(), 2);
    }

    #[test]
    #[should_panic(expected = "at least one outcome")]
    fn empty_script_panics() {
        let _ = ScriptedOperation::<(), ()>::new([]);
    }

    #[test]
    #[should_panic(expected = "Expected 2 attempts, got 0")]
    fn assert_attempts_panics_on_mismatch() {
        let op = ScriptedOperation::<(), _>::always_failing(());
        assert_attempts!(op, 2);
    }

    #[test]
    fn assert_final_error_macro() {
        let result: Result<(), _> = Err("last");
        assert_final_error!(result, "last");
    }

    #[test]
    #[should_panic(expected = "Expected final error")]
    fn assert_final_error_panics_on_ok() {
        let result: Result<i32, &str> = Ok(1);
        assert_final_error!(result, "last");
    }

    #[cfg(feature = "proptest")]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_policies_are_valid(policy in any::<crate::RetryPolicy>()) {
                prop_assert!(policy.validate().is_ok());
                prop_assert!(policy.delay_after(policy.max_attempts()).is_none());
            }
        }
    }
}
