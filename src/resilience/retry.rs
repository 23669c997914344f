use crate::error::Classify;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// `(error, attempt) -> delay`; `attempt` is 1-based.
pub type RetryStrategy = Arc<dyn Fn(&dyn Classify, u32) -> Duration + Send + Sync>;

/// Callback invoked before each retry sleep with `(error, attempt, delay)`.
pub type OnRetry = Arc<dyn Fn(&dyn Classify, u32, Duration) + Send + Sync>;

pub const DEFAULT_STRATEGY: &str = "default";
pub const NETWORK_STRATEGY: &str = "network";
pub const DATABASE_STRATEGY: &str = "database";

/// `min(base * 2^attempt, cap)`, saturating.
pub fn capped_exponential(base: Duration, cap: Duration) -> RetryStrategy {
    Arc::new(move |_err: &dyn Classify, attempt: u32| capped_delay(base, cap, attempt))
}

pub(crate) fn capped_delay(base: Duration, cap: Duration, exponent: u32) -> Duration {
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// Named backoff functions.
pub struct RetryStrategyRegistry {
    strategies: RwLock<HashMap<String, RetryStrategy>>,
}

impl RetryStrategyRegistry {
    /// Registry with `default`, `network` and `database` registered.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(
            DEFAULT_STRATEGY,
            capped_exponential(Duration::from_millis(1000), Duration::from_millis(30_000)),
        );
        registry.register(
            NETWORK_STRATEGY,
            capped_exponential(Duration::from_millis(500), Duration::from_millis(10_000)),
        );
        registry.register(
            DATABASE_STRATEGY,
            capped_exponential(Duration::from_millis(2000), Duration::from_millis(60_000)),
        );
        registry
    }

    pub fn empty() -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
        }
    }

    /// Registers or replaces a strategy.
    pub fn register(&self, name: impl Into<String>, strategy: RetryStrategy) {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<RetryStrategy> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// The named strategy, else `default`, else the built-in default curve.
    pub fn resolve(&self, name: &str) -> RetryStrategy {
        self.get(name)
            .or_else(|| self.get(DEFAULT_STRATEGY))
            .unwrap_or_else(|| {
                capped_exponential(Duration::from_millis(1000), Duration::from_millis(30_000))
            })
    }

    pub fn delay(&self, name: &str, err: &dyn Classify, attempt: u32) -> Duration {
        (self.resolve(name))(err, attempt)
    }
}

impl Default for RetryStrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`ErrorDispatcher::retry`](super::ErrorDispatcher::retry).
#[derive(Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub strategy: String,
    pub on_retry: Option<OnRetry>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: DEFAULT_STRATEGY.to_string(),
            on_retry: None,
        }
    }
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("strategy", &self.strategy)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = name.into();
        self
    }

    pub fn with_on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Classify, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }
}
