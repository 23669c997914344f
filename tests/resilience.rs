//! Error dispatcher, retry strategies and circuit breakers working together.

use resilient_api_client::logging::{LogLevel, LoggerConfig, MemoryTransport};
use resilient_api_client::resilience::{
    CircuitBreakerConfig, HandledBy, RetryOptions, RetryStrategy, NETWORK_STRATEGY,
};
use resilient_api_client::{
    ApiError, CircuitState, Classify, ErrorDispatcher, ErrorKind, StructuredLogger,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

fn dispatcher() -> (ErrorDispatcher, MemoryTransport) {
    let memory = MemoryTransport::new("memory");
    let logger = StructuredLogger::with_config(
        "resilience-test",
        LoggerConfig::new()
            .with_level(LogLevel::Debug)
            .with_transports(vec![Arc::new(memory.clone())]),
    );
    (ErrorDispatcher::new(logger), memory)
}

fn unreachable_host() -> ApiError {
    ApiError::new(ErrorKind::Transport, "connection refused", "https://db.test")
}

#[tokio::test(start_paused = true)]
async fn test_retry_uses_the_named_strategy() {
    let (d, _) = dispatcher();
    let linear: RetryStrategy =
        Arc::new(|_err: &dyn Classify, attempt: u32| Duration::from_millis(10 * attempt as u64));
    d.set_retry_strategy("linear", linear);

    let delays = Arc::new(Mutex::new(Vec::new()));
    let sink = delays.clone();
    let options = RetryOptions::new()
        .with_max_attempts(4)
        .with_strategy("linear")
        .with_on_retry(move |_err: &dyn Classify, attempt: u32, delay: Duration| {
            sink.lock().unwrap().push((attempt, delay));
        });

    let counter = AtomicU32::new(0);
    let calls = &counter;
    let started = Instant::now();
    let value = d
        .retry(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unreachable_host())
                } else {
                    Ok("connected")
                }
            },
            options,
        )
        .await
        .unwrap();

    assert_eq!(value, "connected");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            (1, Duration::from_millis(10)),
            (2, Duration::from_millis(20)),
        ]
    );
    assert_eq!(started.elapsed(), Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_back_the_last_error() {
    let (d, memory) = dispatcher();
    let counter = AtomicU32::new(0);
    let calls = &counter;

    let err = d
        .retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ApiError::timeout(format!("https://api.test/{}", n), 100))
            },
            RetryOptions::new()
                .with_max_attempts(3)
                .with_strategy(NETWORK_STRATEGY),
        )
        .await
        .unwrap_err();

    assert_eq!(err.url, "https://api.test/2");
    assert!(memory
        .entries()
        .iter()
        .any(|e| e.level == LogLevel::Error && e.message.contains("after 3 attempts")));
}

#[tokio::test]
async fn test_wrapped_function_routes_errors_to_handlers() {
    let (d, _) = dispatcher();
    let handled = Arc::new(Mutex::new(Vec::<(String, Option<Value>)>::new()));
    let sink = handled.clone();
    d.register_handler(ErrorKind::Transport, move |err, ctx| {
        sink.lock().unwrap().push((err.to_string(), ctx.cloned()));
    });

    let fetch_user = d.wrap_async(
        "fetch_user",
        |id: u32| async move {
            if id == 0 {
                Err(unreachable_host())
            } else {
                Ok(format!("user-{}", id))
            }
        },
        None,
    );

    assert_eq!(fetch_user(7).await.unwrap(), "user-7");
    let err = fetch_user(0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);

    let handled = handled.lock().unwrap();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].0, "connection refused");
    assert_eq!(handled[0].1, Some(json!({ "function": "fetch_user" })));
}

#[test]
fn test_unclaimed_errors_are_reported_back() {
    let (d, memory) = dispatcher();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    d.subscribe(move |event| sink.lock().unwrap().push(event.handled_by));

    let unhandled = d
        .handle_error(&unreachable_host(), Some(json!({ "job": "sync" })))
        .unwrap_err();
    assert_eq!(unhandled.kind, ErrorKind::Transport);

    d.set_fallback_handler(|_, _| {});
    assert_eq!(
        d.handle_error(&unreachable_host(), None),
        Ok(HandledBy::Fallback)
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![HandledBy::Unhandled, HandledBy::Fallback]
    );
    assert!(memory
        .entries()
        .iter()
        .any(|e| e.message == "Unhandled error type"));
}

#[tokio::test(start_paused = true)]
async fn test_guarded_operation_trips_and_recovers() {
    let (d, memory) = dispatcher();
    let guarded = d.create_circuit_breaker(
        "inventory",
        |fail: bool| async move {
            if fail {
                Err(unreachable_host())
            } else {
                Ok(42)
            }
        },
        CircuitBreakerConfig::new()
            .with_failure_threshold(2)
            .with_reset_timeout(Duration::from_secs(1)),
    );

    assert!(assert_err!(guarded.call(true).await).into_inner().is_some());
    assert_eq!(guarded.breaker().state(), CircuitState::Closed);
    assert!(guarded.call(true).await.is_err());
    assert_eq!(guarded.breaker().state(), CircuitState::Open);

    let rejected = assert_err!(guarded.call(false).await);
    assert!(rejected.is_open());
    assert_eq!(rejected.kind(), ErrorKind::CircuitOpen);

    tokio::time::advance(Duration::from_millis(1001)).await;
    assert_eq!(assert_ok!(guarded.call(false).await), 42);
    assert_eq!(guarded.breaker().state(), CircuitState::Closed);
    assert_eq!(guarded.breaker().failure_count(), 0);

    let messages: Vec<String> = memory.entries().into_iter().map(|e| e.message).collect();
    assert!(messages.iter().any(|m| m == "Circuit breaker inventory opened after 2 failures"));
    assert!(messages.iter().any(|m| m == "Circuit breaker inventory is HALF_OPEN"));
    assert!(messages.iter().any(|m| m == "Circuit breaker inventory is CLOSED"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_the_circuit() {
    let (d, _) = dispatcher();
    let guarded = d.create_circuit_breaker(
        "search",
        |_: ()| async { Err::<(), _>(unreachable_host()) },
        CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_reset_timeout(Duration::from_millis(500)),
    );

    assert!(guarded.call(()).await.is_err());
    assert_eq!(guarded.breaker().state(), CircuitState::Open);

    tokio::time::advance(Duration::from_millis(501)).await;
    let trial = assert_err!(guarded.call(()).await);
    assert!(!trial.is_open());
    assert_eq!(guarded.breaker().state(), CircuitState::Open);
    assert!(guarded.call(()).await.unwrap_err().is_open());
}
