//! End-to-end tests of the public retry API
//!
//! The fixtures mimic how storefront screens use the crate: a fake API
//! client whose calls fail a scripted number of times, wrapped in a retry
//! before the result reaches the screen.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use undertow::prelude::*;
use undertow::testing::ScriptedOperation;
use undertow::{assert_attempts, RetryConfig};

#[derive(Debug, Clone, PartialEq)]
struct Product {
    id: u32,
    title: String,
}

#[derive(Debug, Clone, PartialEq)]
enum ApiError {
    Network(String),
    Status(u16),
}

impl ApiError {
    fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status(code) => *code == 429 || *code >= 500,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "network error: {}", msg),
            ApiError::Status(code) => write!(f, "HTTP {}", code),
        }
    }
}

impl std::error::Error for ApiError {}

/// An API client whose responses are queued up front.
#[derive(Clone, Default)]
struct FakeClient {
    responses: Arc<Mutex<VecDeque<Result<Product, ApiError>>>>,
    requests: Arc<Mutex<Vec<u32>>>,
}

impl FakeClient {
    fn with_responses(responses: Vec<Result<Product, ApiError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        }
    }

    async fn product_by_id(&self, id: u32) -> Result<Product, ApiError> {
        self.requests.lock().unwrap().push(id);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::Network("no response queued".into())))
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn shoe() -> Product {
    Product {
        id: 7,
        title: "Trail Runner".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn product_detail_survives_transient_failures() {
    let client = FakeClient::with_responses(vec![
        Err(ApiError::Status(503)),
        Err(ApiError::Network("connection reset".into())),
        Ok(shoe()),
    ]);

    let product = Retry::new(3, 100)
        .unwrap()
        .run(|| client.product_by_id(7))
        .await;

    assert_eq!(product, Ok(shoe()));
    assert_eq!(client.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn product_detail_surfaces_last_error() {
    let client = FakeClient::with_responses(vec![
        Err(ApiError::Status(500)),
        Err(ApiError::Status(502)),
        Err(ApiError::Status(504)),
    ]);

    let product = Retry::new(3, 100)
        .unwrap()
        .run(|| client.product_by_id(7))
        .await;

    assert_eq!(product, Err(ApiError::Status(504)));
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let client = FakeClient::with_responses(vec![Err(ApiError::Status(404)), Ok(shoe())]);

    let product = Retry::default()
        .run_if(|| client.product_by_id(7), ApiError::is_transient)
        .await;

    assert_eq!(product, Err(ApiError::Status(404)));
    assert_eq!(client.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn final_error_works_with_question_mark() {
    async fn load_screen(client: &FakeClient) -> Result<String, Box<dyn std::error::Error>> {
        let product = retry(|| client.product_by_id(7)).await?;
        Ok(product.title)
    }

    let ok = FakeClient::with_responses(vec![Err(ApiError::Status(429)), Ok(shoe())]);
    assert_eq!(load_screen(&ok).await.unwrap(), "Trail Runner");

    let down = FakeClient::default();
    let err = load_screen(&down).await.unwrap_err();
    assert_eq!(err.to_string(), "network error: no response queued");
    assert_eq!(down.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn leaving_the_screen_cancels_the_fetch() {
    let client = FakeClient::default();
    let (leave_screen, screen_closed) = tokio::sync::oneshot::channel::<()>();

    let fetch = tokio::spawn({
        let client = client.clone();
        async move {
            Retry::new(10, 1_000)
                .unwrap()
                .run_until(|| client.product_by_id(7), screen_closed)
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    leave_screen.send(()).unwrap();

    let result = fetch.await.unwrap();
    assert_eq!(result, Err(RetryError::Cancelled { attempts: 2 }));
    assert_eq!(client.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn overall_deadline_as_cancel_signal() {
    let op = ScriptedOperation::<(), _>::always_failing(ApiError::Status(503));
    let start = Instant::now();

    let result = Retry::from_policy(
        RetryPolicy::exponential(Duration::from_millis(100)).with_max_attempts(10),
    )
    .unwrap()
    .run_until(|| op.call(), tokio::time::sleep(Duration::from_millis(500)))
    .await;

    // attempts at 0, 100, 300; the 700ms attempt is cut off by the deadline
    assert!(result.unwrap_err().is_cancelled());
    assert_attempts!(op, 3);
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn hung_request_is_retried_after_timeout() {
    let op = ScriptedOperation::new([Ok::<_, ApiError>(shoe())]).with_latency(Duration::from_secs(30));

    let result = Retry::new(2, 0)
        .unwrap()
        .run_with_timeout(|| op.call(), Duration::from_secs(5))
        .await;

    assert_eq!(
        result,
        Err(TimeoutError::Timeout {
            duration: Duration::from_secs(5)
        })
    );
    assert_attempts!(op, 2);
}

#[tokio::test(start_paused = true)]
async fn timeout_inside_cancellable_run() {
    let op = ScriptedOperation::new([Ok::<_, ApiError>(shoe())]).with_latency(Duration::from_secs(1));

    let result = Retry::new(3, 10)
        .unwrap()
        .run_until(
            || with_timeout(Duration::from_secs(2), op.call()),
            std::future::pending::<()>(),
        )
        .await;

    assert_eq!(result, Ok(shoe()));
}

#[test]
fn misconfiguration_is_caught_before_running() {
    assert_eq!(Retry::new(0, 500).unwrap_err(), PolicyError::InvalidMaxAttempts(0));
    assert_eq!(Retry::new(-5, 500).unwrap_err(), PolicyError::InvalidMaxAttempts(-5));
    assert!(matches!(
        Retry::new(3, -1).unwrap_err(),
        PolicyError::NegativeDelay { .. }
    ));
    assert!(Retry::from_policy(RetryPolicy::default().with_max_attempts(0)).is_err());
    assert!(Retry::from_config(RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    })
    .is_err());
}

#[test]
fn policy_error_is_a_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(Retry::new(0, 1).unwrap_err());
    assert!(err.to_string().contains("max_attempts"));
}
