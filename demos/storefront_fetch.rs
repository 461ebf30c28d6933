//! Storefront Fetch Example
//!
//! The two network calls a storefront screen wraps in a retry:
//! - the profile screen loading the signed-in user
//! - the product detail screen loading one product
//!
//! The backend is simulated. Run with the `tracing` feature to see the
//! retry loop's own events:
//!
//! ```text
//! RUST_LOG=debug cargo run --example storefront_fetch --features tracing
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use undertow::prelude::*;
use undertow::RetryConfig;

#[derive(Debug, Clone)]
struct User {
    email: String,
    name: String,
}

#[derive(Debug, Clone)]
struct Product {
    id: u32,
    title: String,
    price_cents: u64,
}

#[derive(Debug)]
enum ApiError {
    Network(&'static str),
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

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "network error: {}", msg),
            ApiError::Status(code) => write!(f, "server responded with {}", code),
        }
    }
}

impl std::error::Error for ApiError {}

/// A backend that is having a bad day: the first `flaky` calls fail.
struct Backend {
    calls: AtomicU32,
    flaky: u32,
}

impl Backend {
    fn new(flaky: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            flaky,
        }
    }

    async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.flaky {
            return Err(ApiError::Network("connection reset by peer"));
        }
        if token.is_empty() {
            return Err(ApiError::Status(401));
        }
        Ok(User {
            email: "ada@example.com".into(),
            name: "Ada".into(),
        })
    }

    async fn product_by_id(&self, id: u32) -> Result<Product, ApiError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.flaky {
            return Err(ApiError::Status(503));
        }
        if id == 0 {
            return Err(ApiError::Status(404));
        }
        Ok(Product {
            id,
            title: format!("Product #{}", id),
            price_cents: 1999,
        })
    }
}

/// Profile screen: load the signed-in user.
async fn load_profile(
    backend: &Backend,
    retry: &Retry,
    token: &str,
) -> Result<User, Box<dyn std::error::Error>> {
    let user = retry
        .run_if(|| backend.current_user(token), ApiError::is_transient)
        .await?;
    Ok(user)
}

/// Product detail screen: load one product, giving up if the user leaves.
async fn load_product(
    backend: &Backend,
    retry: &Retry,
    id: u32,
    screen_closed: impl std::future::Future,
) -> Result<Product, RetryError<ApiError>> {
    retry
        .run_until(|| backend.product_by_id(id), screen_closed)
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let retry = Retry::from_config(RetryConfig {
        max_attempts: 4,
        delay_ms: 200,
        ..RetryConfig::default()
    })?;

    println!("=== Profile ===");
    let backend = Backend::new(2);
    let user = load_profile(&backend, &retry, "session-token").await?;
    println!("Signed in as {} <{}>", user.name, user.email);

    println!("\n=== Profile with expired session ===");
    let backend = Backend::new(0);
    match load_profile(&backend, &retry, "").await {
        Ok(user) => println!("Unexpectedly signed in as {}", user.name),
        Err(e) => println!("Sign-in required: {}", e),
    }

    println!("\n=== Product detail ===");
    let backend = Backend::new(1);
    let product = load_product(&backend, &retry, 42, std::future::pending::<()>()).await?;
    println!(
        "{} (#{}) costs ${}.{:02}",
        product.title,
        product.id,
        product.price_cents / 100,
        product.price_cents % 100
    );

    println!("\n=== Product detail, user navigates away ===");
    let backend = Backend::new(u32::MAX);
    let navigated_away = tokio::time::sleep(Duration::from_millis(300));
    match load_product(&backend, &retry, 42, navigated_away).await {
        Err(RetryError::Cancelled { attempts }) => {
            println!("Fetch abandoned after {} attempts", attempts)
        }
        other => println!("Finished: {:?}", other.map(|p| p.title)),
    }

    Ok(())
}
