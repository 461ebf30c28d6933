//! Retry Patterns Example
//!
//! Demonstrates the ways a flaky call can be wrapped:
//! - Basic retry with the default policy
//! - Different backoff strategies
//! - Conditional retry (run_if)
//! - Retry with observability hooks
//! - Per-attempt timeouts
//! - Cancellation

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use undertow::prelude::*;

// ==================== Basic Retry ====================

/// Example 1: Basic retry with the default policy
///
/// 3 attempts, 500ms apart.
async fn example_basic_retry() {
    println!("\n=== Example 1: Basic Retry ===");

    let attempts = AtomicU32::new(0);

    let result = retry(|| async {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        println!("  Attempt {}", n + 1);
        if n < 2 {
            Err("transient failure")
        } else {
            Ok("success!")
        }
    })
    .await;

    match result {
        Ok(value) => println!(
            "Success after {} attempts: {}",
            attempts.load(Ordering::SeqCst),
            value
        ),
        Err(error) => println!("Failed: {}", error),
    }
}

// ==================== Different Backoff Strategies ====================

/// Example 2: Comparing different backoff strategies
///
/// Shows how delay grows with each strategy.
async fn example_backoff_strategies() {
    println!("\n=== Example 2: Backoff Strategies ===");

    let base = Duration::from_millis(100);
    let policies = [
        ("Constant", RetryPolicy::constant(base)),
        ("Linear", RetryPolicy::linear(base)),
        ("Exponential", RetryPolicy::exponential(base)),
        ("Fibonacci", RetryPolicy::fibonacci(base)),
    ];

    for (name, policy) in policies {
        let policy = policy.with_max_attempts(6);
        println!("{} delays:", name);
        for attempt in 1..policy.max_attempts() {
            if let Some(d) = policy.delay_after(attempt) {
                println!("  After attempt {}: {:?}", attempt, d);
            }
        }
    }

    let capped = RetryPolicy::exponential(base)
        .with_max_attempts(10)
        .with_max_delay(Duration::from_millis(500));
    println!("Exponential with 500ms cap:");
    for attempt in 1..capped.max_attempts() {
        if let Some(d) = capped.delay_after(attempt) {
            println!("  After attempt {}: {:?}", attempt, d);
        }
    }
}

// ==================== Conditional Retry ====================

/// Example 3: Retry only on specific errors
///
/// A rejected login is not going to succeed on the second try.
async fn example_conditional_retry() {
    println!("\n=== Example 3: Conditional Retry ===");

    #[derive(Debug, Clone, PartialEq)]
    enum AuthError {
        Unreachable,
        BadCredentials,
    }

    let retry = Retry::new(5, 100).expect("valid policy");
    let attempts = AtomicU32::new(0);

    let result = retry
        .run_if(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                println!("  Attempting login...");
                Err::<(), _>(AuthError::BadCredentials)
            },
            |err| matches!(err, AuthError::Unreachable),
        )
        .await;

    println!("Permanent error (no retries): {:?}", result.unwrap_err());
    println!("Total attempts: {}", attempts.load(Ordering::SeqCst));

    attempts.store(0, Ordering::SeqCst);

    let result = retry
        .run_if(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                println!("  Attempt {}", n + 1);
                if n < 2 {
                    Err(AuthError::Unreachable)
                } else {
                    Ok("token")
                }
            },
            |err| matches!(err, AuthError::Unreachable),
        )
        .await;

    println!("\nTransient errors then success: {:?}", result);
    println!("Total attempts: {}", attempts.load(Ordering::SeqCst));
}

// ==================== Retry with Observability ====================

/// Example 4: Retry with hooks for logging/metrics
async fn example_retry_with_hooks() {
    println!("\n=== Example 4: Retry with Hooks ===");

    let attempts = AtomicU32::new(0);
    let retry = Retry::from_policy(
        RetryPolicy::exponential(Duration::from_millis(50)).with_max_attempts(6),
    )
    .expect("valid policy");

    let result = retry
        .run_with_hooks(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err(format!("error on attempt {}", n + 1))
                } else {
                    Ok("finally succeeded!")
                }
            },
            |event| {
                println!(
                    "  [HOOK] Attempt {} failed with: {}",
                    event.attempt, event.error
                );
                match event.next_delay {
                    Some(delay) => println!("         Waiting {:?} before retry...", delay),
                    None => println!("         No more retries!"),
                }
                println!("         Total elapsed: {:?}", event.elapsed);
            },
        )
        .await;

    println!("\nResult: {:?}", result);
}

// ==================== Retry with Per-Attempt Timeout ====================

/// Example 5: Bounding every attempt
///
/// Slow attempts are cut off and retried like any other failure.
async fn example_retry_with_timeout() {
    println!("\n=== Example 5: Retry with Timeout ===");

    let attempts = AtomicU32::new(0);
    let retry = Retry::new(5, 50).expect("valid policy");

    let result = retry
        .run_with_timeout(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                println!("  Attempt {} starting...", n + 1);
                if n < 2 {
                    // First two attempts hang
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok::<_, String>("connected!")
            },
            Duration::from_millis(100),
        )
        .await;

    match result {
        Ok(value) => println!(
            "\nSuccess after {} attempts: {}",
            attempts.load(Ordering::SeqCst),
            value
        ),
        Err(TimeoutError::Timeout { duration }) => {
            println!("\nLast attempt timed out after {:?}", duration)
        }
        Err(TimeoutError::Inner(e)) => println!("\nLast attempt failed: {}", e),
    }
}

// ==================== Cancellation ====================

/// Example 6: Abandoning a retry
///
/// The user navigates away while the fetch is still backing off.
async fn example_cancellation() {
    println!("\n=== Example 6: Cancellation ===");

    let (leave, left) = tokio::sync::oneshot::channel::<()>();
    let retry = Retry::new(10, 200).expect("valid policy");

    let fetch = retry.run_until(
        || async {
            println!("  Fetching...");
            Err::<(), _>("503")
        },
        left,
    );

    let navigate_away = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        println!("  User left the screen");
        let _ = leave.send(());
    };

    let (result, ()) = tokio::join!(fetch, navigate_away);
    match result {
        Err(RetryError::Cancelled { attempts }) => {
            println!("Cancelled after {} attempts", attempts)
        }
        other => println!("Finished: {:?}", other),
    }
}

#[tokio::main]
async fn main() {
    println!("Retry Patterns Examples");
    println!("=======================");

    example_basic_retry().await;
    example_backoff_strategies().await;
    example_conditional_retry().await;
    example_retry_with_hooks().await;
    example_retry_with_timeout().await;
    example_cancellation().await;

    println!("\n=== All examples completed! ===");
}
