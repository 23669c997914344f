//! Batch executor.

use crate::logging::StructuredLogger;
use futures::future::join_all;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct BatchResult<T, E> {
    /// `(item index, output)` in input order.
    pub successes: Vec<(usize, T)>,
    pub failures: Vec<(usize, E)>,
    pub execution_time: Duration,
    pub total_processed: usize,
    pub batches: usize,
}

impl<T, E> BatchResult<T, E> {
    pub fn new() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
            execution_time: Duration::ZERO,
            total_processed: 0,
            batches: 0,
        }
    }
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            self.successes.len() as f64 / self.total_processed as f64
        }
    }
    /// Outputs of the items that succeeded, in input order.
    pub fn into_values(self) -> Vec<T> {
        self.successes.into_iter().map(|(_, v)| v).collect()
    }
}

impl<T, E> Default for BatchResult<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Pause between consecutive batches; none after the last one.
    pub delay_between: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay_between: Duration::from_millis(1000),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
    pub fn with_delay_between(mut self, delay: Duration) -> Self {
        self.delay_between = delay;
        self
    }
}

/// Runs a processor over items in fixed-size batches. Items within a batch
/// run concurrently on the calling task; batches run one after another.
pub struct BatchExecutor {
    config: BatchConfig,
    logger: StructuredLogger,
}

impl BatchExecutor {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            config: BatchConfig::default(),
            logger,
        }
    }
    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Every item is processed; a failed item is logged and recorded, never fatal.
    pub async fn execute<T, R, E, F, Fut>(&self, items: Vec<T>, processor: F) -> BatchResult<R, E>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let total = items.len();
        let batch_size = self.config.batch_size.max(1);
        let mut result = BatchResult::new();

        let mut remaining = items.into_iter().enumerate().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<(usize, T)> = remaining.by_ref().take(batch_size).collect();
            result.batches += 1;
            self.logger.debug(format!(
                "Processing batch {} ({} items)",
                result.batches,
                batch.len()
            ));

            let outcomes = join_all(batch.into_iter().map(|(index, item)| {
                let fut = processor(item);
                async move { (index, fut.await) }
            }))
            .await;

            for (index, outcome) in outcomes {
                match outcome {
                    Ok(value) => result.successes.push((index, value)),
                    Err(e) => {
                        self.logger.error_with(
                            "Batch item failed",
                            json!({ "index": index, "reason": e.to_string() }),
                        );
                        result.failures.push((index, e));
                    }
                }
            }

            if remaining.peek().is_some() && !self.config.delay_between.is_zero() {
                tokio::time::sleep(self.config.delay_between).await;
            }
        }

        result.execution_time = start.elapsed();
        result.total_processed = total;
        result
    }
}

/// Convenience over [`BatchExecutor`]: outputs of the items that succeeded, in input order.
pub async fn process_in_batches<T, R, E, F, Fut>(
    items: Vec<T>,
    processor: F,
    batch_size: usize,
    delay_between: Duration,
    logger: &StructuredLogger,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: std::fmt::Display,
{
    BatchExecutor::new(logger.clone())
        .with_config(
            BatchConfig::new()
                .with_batch_size(batch_size)
                .with_delay_between(delay_between),
        )
        .execute(items, processor)
        .await
        .into_values()
}
