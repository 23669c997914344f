use super::circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
use super::retry::{RetryOptions, RetryStrategy, RetryStrategyRegistry};
use crate::error::Classify;
use crate::error_code::ErrorKind;
use crate::events::{panic_message, ListenerId, ListenerSet};
use crate::logging::{LogData, StructuredLogger};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::time::Instant;

/// Kind-specific handler: `(error, context)`.
pub type ErrorHandler = Arc<dyn Fn(&dyn Classify, Option<&Value>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandledBy {
    #[serde(rename = "custom")]
    Custom,
    #[serde(rename = "default")]
    Fallback,
    /// Neither a handler nor a fallback ran.
    #[serde(rename = "unhandled")]
    Unhandled,
}

/// Notification sent after every `handle_error`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorHandledEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
    pub handled_by: HandledBy,
    pub message: String,
    pub context: Option<Value>,
}

/// Returned when no handler matched and no fallback is installed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unhandled {kind} error: {message}")]
pub struct UnhandledError {
    pub kind: ErrorKind,
    pub message: String,
}

impl Classify for UnhandledError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Unhandled
    }
}

/// A panic captured by the process-wide hook.
#[derive(Debug, Clone, thiserror::Error)]
#[error("panic: {message}")]
pub struct PanicError {
    pub message: String,
    pub location: Option<String>,
}

impl Classify for PanicError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Unhandled
    }
}

struct Inner {
    logger: StructuredLogger,
    handlers: RwLock<HashMap<ErrorKind, ErrorHandler>>,
    fallback: RwLock<Option<ErrorHandler>>,
    strategies: RetryStrategyRegistry,
    listeners: ListenerSet<ErrorHandledEvent>,
}

/// Routes errors to kind-specific handlers, owns the retry loop and builds
/// circuit breakers. Cloning shares state.
#[derive(Clone)]
pub struct ErrorDispatcher {
    inner: Arc<Inner>,
}

impl ErrorDispatcher {
    pub fn new(logger: StructuredLogger) -> Self {
        Self::with_strategies(logger, RetryStrategyRegistry::new())
    }

    pub fn with_strategies(logger: StructuredLogger, strategies: RetryStrategyRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                logger,
                handlers: RwLock::new(HashMap::new()),
                fallback: RwLock::new(None),
                strategies,
                listeners: ListenerSet::new(),
            }),
        }
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.inner.logger
    }

    pub fn strategies(&self) -> &RetryStrategyRegistry {
        &self.inner.strategies
    }

    pub fn register_handler<F>(&self, kind: ErrorKind, handler: F)
    where
        F: Fn(&dyn Classify, Option<&Value>) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(handler));
    }

    pub fn set_fallback_handler<F>(&self, handler: F)
    where
        F: Fn(&dyn Classify, Option<&Value>) + Send + Sync + 'static,
    {
        *self
            .inner
            .fallback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn set_retry_strategy(&self, name: impl Into<String>, strategy: RetryStrategy) {
        self.inner.strategies.register(name, strategy);
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ErrorHandledEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    fn fallback(&self) -> Option<ErrorHandler> {
        self.inner
            .fallback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Routes `err` to its kind's handler, or to the fallback.
    ///
    /// Without either, the error is reported as [`UnhandledError`] to the caller.
    pub fn handle_error(
        &self,
        err: &dyn Classify,
        context: Option<Value>,
    ) -> Result<HandledBy, UnhandledError> {
        let kind = err.kind();
        let handler = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned();

        let handled_by = match handler {
            Some(handler) => {
                self.inner.logger.debug_with(
                    format!("Handling {} error with registered handler", kind.name()),
                    json!({ "code": kind.code(), "message": err.to_string() }),
                );
                handler(err, context.as_ref());
                HandledBy::Custom
            }
            None => {
                self.inner.logger.log(
                    crate::logging::LogLevel::Error,
                    "Unhandled error type",
                    Some(LogData::error_parts(kind.name(), err.to_string(), err.source())),
                    Some(LogData::from(json!({
                        "kind": kind.name(),
                        "code": kind.code(),
                        "context": context,
                    }))),
                );
                match self.fallback() {
                    Some(fallback) => {
                        fallback(err, context.as_ref());
                        HandledBy::Fallback
                    }
                    None => HandledBy::Unhandled,
                }
            }
        };

        self.inner.listeners.emit(&ErrorHandledEvent {
            timestamp: Utc::now(),
            kind,
            handled_by,
            message: err.to_string(),
            context,
        });

        match handled_by {
            HandledBy::Unhandled => Err(UnhandledError {
                kind,
                message: err.to_string(),
            }),
            handled => Ok(handled),
        }
    }

    /// Invokes `op` up to `max_attempts` times, sleeping per the named strategy
    /// between attempts. Returns the last error once attempts are exhausted.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F, options: RetryOptions) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + 'static,
    {
        let max_attempts = options.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => {
                    self.inner.logger.error_with(
                        format!("All retry attempts failed after {} attempts", max_attempts),
                        json!({
                            "strategy": options.strategy,
                            "code": err.code(),
                            "error": err.to_string(),
                        }),
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.inner.strategies.delay(&options.strategy, &err, attempt);
                    self.inner.logger.warn_with(
                        format!(
                            "Retry attempt {}/{} after {}ms",
                            attempt,
                            max_attempts,
                            delay.as_millis()
                        ),
                        json!({
                            "strategy": options.strategy,
                            "code": err.code(),
                            "error": err.to_string(),
                        }),
                    );
                    if let Some(on_retry) = &options.on_retry {
                        on_retry(&err, attempt, delay);
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Instrumented async variant of `op`: TRACE on entry, PERF on exit,
    /// optional retry, errors routed through [`handle_error`](Self::handle_error)
    /// and then returned unchanged.
    pub fn wrap_async<A, T, E, F, Fut>(
        &self,
        name: &str,
        op: F,
        retry: Option<RetryOptions>,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync
    where
        A: Clone + Send + Sync + 'static,
        T: Send + 'static,
        E: Classify + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let dispatcher = self.clone();
        let op = Arc::new(op);
        let name: Arc<str> = Arc::from(name);
        move |arg: A| {
            let dispatcher = dispatcher.clone();
            let op = op.clone();
            let name = name.clone();
            let retry = retry.clone();
            Box::pin(async move {
                let logger = dispatcher.inner.logger.clone();
                logger.trace_with(format!("Entering {}", name), json!({ "function": &*name }));
                let started = Instant::now();
                let result = match retry {
                    Some(options) => dispatcher.retry(|| op(arg.clone()), options).await,
                    None => op(arg).await,
                };
                match &result {
                    Ok(_) => {
                        logger.performance(&name, started, None);
                    }
                    Err(err) => {
                        logger.performance(
                            &name,
                            started,
                            Some(LogData::from(json!({ "error": err.to_string() }))),
                        );
                        logger.error_with(
                            format!("Error in {}", name),
                            json!({ "function": &*name, "code": err.code(), "error": err.to_string() }),
                        );
                        let _ = dispatcher.handle_error(err, Some(json!({ "function": &*name })));
                    }
                }
                result
            }) as BoxFuture<'static, Result<T, E>>
        }
    }

    /// Instrumented synchronous variant of `op`.
    pub fn wrap_sync<A, T, E, F>(&self, name: &str, op: F) -> impl Fn(A) -> Result<T, E> + Send + Sync
    where
        E: Classify + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        let dispatcher = self.clone();
        let name = name.to_string();
        move |arg: A| {
            let logger = &dispatcher.inner.logger;
            logger.trace_with(format!("Entering {}", name), json!({ "function": name }));
            let started = Instant::now();
            let result = op(arg);
            match &result {
                Ok(_) => {
                    logger.performance(&name, started, None);
                }
                Err(err) => {
                    logger.performance(
                        &name,
                        started,
                        Some(LogData::from(json!({ "error": err.to_string() }))),
                    );
                    logger.error_with(
                        format!("Error in {}", name),
                        json!({ "function": name, "code": err.code(), "error": err.to_string() }),
                    );
                    let _ = dispatcher.handle_error(err, Some(json!({ "function": name })));
                }
            }
            result
        }
    }

    /// Binds a fresh [`CircuitBreaker`] to `op`.
    pub fn create_circuit_breaker<F>(
        &self,
        name: impl Into<String>,
        op: F,
        config: CircuitBreakerConfig,
    ) -> Guarded<F> {
        let name = name.into();
        let logger = self.inner.logger.child("circuit_breaker");
        Guarded {
            breaker: Arc::new(CircuitBreaker::new(name, config, logger)),
            op,
        }
    }

    /// Installs a process-wide panic hook that logs FATAL and runs the fallback,
    /// then defers to the previously installed hook.
    pub fn install_panic_hook(&self) {
        let dispatcher = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let err = PanicError {
                message: panic_message(info.payload()),
                location: info.location().map(|l| format!("{}:{}", l.file(), l.line())),
            };
            let context = json!({ "source": "panic_hook", "location": err.location });
            dispatcher.inner.logger.fatal_with(
                "Uncaught panic",
                json!({ "message": err.message, "location": err.location }),
            );
            if let Some(fallback) = dispatcher.fallback() {
                fallback(&err, Some(&context));
            }
            previous(info);
        }));
    }
}

/// An operation bound to its own circuit breaker.
pub struct Guarded<F> {
    breaker: Arc<CircuitBreaker>,
    op: F,
}

impl<F> Guarded<F> {
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn call<A, T, E, Fut>(&self, arg: A) -> Result<T, BreakerError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker.call(|| (self.op)(arg)).await
    }
}
