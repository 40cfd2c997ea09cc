//! Example: Driving remote calls through the retry engine
//!
//! This example demonstrates:
//! 1. Blocking retry with exponential backoff
//! 2. Non-retryable errors surfacing after one attempt
//! 3. Cancelling a spawned retry during backoff
//! 4. A caller deadline bounding an otherwise unlimited policy
//!
//! Run with:
//! ```bash
//! cargo run -p turboflow-core --example retry_example
//! ```

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use turboflow_core::prelude::*;

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("service unavailable on attempt {0}")]
    Unavailable(u32),
    #[error("workflow not found")]
    NotFound,
}

impl Classify for ApiError {
    fn code(&self) -> &str {
        match self {
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

/// A simulated service that fails the first few times
struct UnreliableService {
    attempts: Arc<AtomicU32>,
    fail_count: u32,
}

impl UnreliableService {
    fn new(fail_count: u32) -> Self {
        Self {
            attempts: Arc::new(AtomicU32::new(0)),
            fail_count,
        }
    }

    fn call(&self) -> Result<String, ApiError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_count {
            println!("  Attempt {attempt}: FAILED (simulating transient error)");
            Err(ApiError::Unavailable(attempt))
        } else {
            println!("  Attempt {attempt}: SUCCESS");
            Ok("describe namespace response".to_string())
        }
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

fn policy() -> Result<RetryPolicy, ConfigurationError> {
    RetryPolicy::builder()
        .initial_interval(Duration::from_millis(100))
        .backoff_coefficient(2.0)
        .maximum_attempts(5)
        .do_not_retry(ErrorMatcher::code("NOT_FOUND"))
        .jitter(0.0) // No jitter for predictable output
        .build()
}

/// Example 1: Blocking retry with exponential backoff
fn example_blocking_retry(retryer: &Retryer) -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Blocking Retry with Exponential Backoff ===\n");

    let service = UnreliableService::new(2);
    let options = retryer.options(None)?;
    let start = Instant::now();

    let result = retryer.retry_with_result(&options, || service.call())?;

    println!("\nResult: {result}");
    println!("Total attempts: {}", service.total_attempts());
    println!("Total time: {:?}", start.elapsed());
    println!("Expected delays: 100ms + 200ms = ~300ms");

    Ok(())
}

/// Example 2: Non-retryable errors are not retried
fn example_non_retryable(retryer: &Retryer) -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Non-Retryable Error ===\n");

    let options = retryer.options(None)?;
    let calls = AtomicU32::new(0);

    let err = retryer
        .retry_with_result(&options, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ApiError::NotFound)
        })
        .unwrap_err();

    println!("Error: {err}");
    println!("Attempts: {}", calls.load(Ordering::SeqCst));

    Ok(())
}

/// Example 3: Cancelling a spawned retry
async fn example_cancellation(retryer: &Retryer) -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Cancel During Backoff ===\n");

    let options = retryer.options(None)?;
    let service = Arc::new(UnreliableService::new(u32::MAX));

    let handle = retryer.spawn_with_result(&options, {
        let service = Arc::clone(&service);
        move || {
            let result = service.call();
            async move { result }
        }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    println!("Cancelling after {} attempt(s)", handle.attempts());
    handle.cancel();

    let err = handle.await.unwrap_err();
    println!("Outcome: {err}");

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("Attempts after waiting: {}", service.total_attempts());

    Ok(())
}

/// Example 4: A caller deadline bounds an unlimited policy
async fn example_caller_deadline() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 4: Caller Deadline ===\n");

    let unlimited = RetryPolicy::builder()
        .initial_interval(Duration::from_millis(50))
        .build()?;
    let retryer = Retryer::new(unlimited);

    match retryer.options(None) {
        Ok(_) => println!("unexpected: unbounded options accepted"),
        Err(err) => println!("Without a deadline: {err}"),
    }

    let options = retryer.options(Some(Deadline::after(Duration::from_millis(400))))?;
    let service = UnreliableService::new(u32::MAX);
    let start = Instant::now();

    let err = retryer
        .retry_with_result_async(&options, || {
            let result = service.call();
            async move { result }
        })
        .await
        .unwrap_err();

    println!("Outcome after {:?}: {err}", start.elapsed());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing to see the engine's retry logs
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("==============================================");
    println!("   TurboFlow Core: Retry Engine Examples");
    println!("==============================================");

    let retryer = Retryer::new(policy()?);

    example_blocking_retry(&retryer)?;
    example_non_retryable(&retryer)?;
    example_cancellation(&retryer).await?;
    example_caller_deadline().await?;

    println!("\n==============================================");
    println!("   All examples completed successfully!");
    println!("==============================================\n");

    Ok(())
}
