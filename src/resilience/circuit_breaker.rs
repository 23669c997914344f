use crate::error::Classify;
use crate::error_code::ErrorKind;
use crate::logging::StructuredLogger;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub failures: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub trial_in_flight: bool,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set how long the circuit stays open before a trial call
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

/// Rejection returned while the circuit is open (or a half-open trial is running).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circuit breaker {name} is OPEN")]
pub struct CircuitOpenError {
    pub name: String,
}

impl Classify for CircuitOpenError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::CircuitOpen
    }
}

/// Result error of a guarded call.
#[derive(Debug)]
pub enum BreakerError<E> {
    Open(CircuitOpenError),
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(e) => fmt::Display::fmt(e, f),
            Self::Inner(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(_) => None,
            Self::Inner(e) => Some(e),
        }
    }
}

impl<E: Classify + 'static> Classify for BreakerError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Open(_) => ErrorKind::CircuitOpen,
            Self::Inner(e) => e.kind(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Open(_) => false,
            Self::Inner(e) => e.retryable(),
        }
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

enum Transition {
    None,
    HalfOpened,
    Closed,
    Opened(u32),
}

/// Failure-count circuit breaker guarding one logical operation.
///
/// - Closed: calls pass; each failure is counted, successes do not reset the count
/// - Open: calls are rejected until `reset_timeout` has passed since the last failure
/// - HalfOpen: exactly one trial call; success closes, failure re-opens
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
    logger: StructuredLogger,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig, logger: StructuredLogger) -> Self {
        Self {
            name: name.into(),
            cfg,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
            logger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks to make a call. The permit must be resolved with
    /// [`BreakerPermit::success`] or [`BreakerPermit::failure`]; dropping it
    /// unresolved frees a half-open trial slot without changing state.
    pub fn acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpenError> {
        let (result, transition) = {
            let mut st = self.lock();
            match st.state {
                CircuitState::Closed => (Ok(false), Transition::None),
                CircuitState::Open => {
                    let cooled = st
                        .last_failure
                        .map(|t| t.elapsed() > self.cfg.reset_timeout)
                        .unwrap_or(true);
                    if cooled {
                        st.state = CircuitState::HalfOpen;
                        st.trial_in_flight = true;
                        (Ok(true), Transition::HalfOpened)
                    } else {
                        (Err(()), Transition::None)
                    }
                }
                CircuitState::HalfOpen => {
                    if st.trial_in_flight {
                        (Err(()), Transition::None)
                    } else {
                        st.trial_in_flight = true;
                        (Ok(true), Transition::None)
                    }
                }
            }
        };
        self.report(transition);
        match result {
            Ok(trial) => Ok(BreakerPermit {
                breaker: self,
                trial,
                resolved: false,
            }),
            Err(()) => Err(CircuitOpenError {
                name: self.name.clone(),
            }),
        }
    }

    /// Runs `op` through the breaker.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire().map_err(BreakerError::Open)?;
        match op().await {
            Ok(v) => {
                permit.success();
                Ok(v)
            }
            Err(e) => {
                permit.failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn on_success(&self) {
        let transition = {
            let mut st = self.lock();
            st.trial_in_flight = false;
            if st.state == CircuitState::HalfOpen {
                st.state = CircuitState::Closed;
                st.failures = 0;
                Transition::Closed
            } else {
                Transition::None
            }
        };
        self.report(transition);
    }

    fn on_failure(&self) {
        let transition = {
            let mut st = self.lock();
            st.trial_in_flight = false;
            st.failures = st.failures.saturating_add(1);
            st.last_failure = Some(Instant::now());
            if st.state == CircuitState::HalfOpen || st.failures >= self.cfg.failure_threshold {
                st.state = CircuitState::Open;
                Transition::Opened(st.failures)
            } else {
                Transition::None
            }
        };
        self.report(transition);
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    // Logging happens outside the state lock so listeners may inspect the breaker.
    fn report(&self, transition: Transition) {
        match transition {
            Transition::None => {}
            Transition::HalfOpened => self.logger.info_with(
                format!("Circuit breaker {} is HALF_OPEN", self.name),
                serde_json::json!({ "breaker": self.name }),
            ),
            Transition::Closed => self.logger.info_with(
                format!("Circuit breaker {} is CLOSED", self.name),
                serde_json::json!({ "breaker": self.name }),
            ),
            Transition::Opened(failures) => self.logger.error_with(
                format!("Circuit breaker {} opened after {} failures", self.name, failures),
                serde_json::json!({
                    "breaker": self.name,
                    "failures": failures,
                    "threshold": self.cfg.failure_threshold,
                }),
            ),
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let open_remaining_ms = match (st.state, st.last_failure) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = at.elapsed();
                if elapsed < self.cfg.reset_timeout {
                    Some((self.cfg.reset_timeout - elapsed).as_millis() as u64)
                } else {
                    None
                }
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            reset_timeout_ms: self.cfg.reset_timeout.as_millis() as u64,
            failures: st.failures,
            open_remaining_ms,
            trial_in_flight: st.trial_in_flight,
        }
    }
}

/// Permission to make one call through a [`CircuitBreaker`].
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    resolved: bool,
}

impl BreakerPermit<'_> {
    /// Whether this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.on_success();
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.trial {
            self.breaker.release_trial();
        }
    }
}
