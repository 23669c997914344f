//! 批处理模块：按固定批次并发执行任务，批次之间暂停，以配合服务端限流。
//!
//! # Batch Processing Module
//!
//! Runs many calls against a rate-limited service without bursting: items are
//! processed concurrently within a batch, with a pause between batches.
//! Failed items are logged and skipped.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchExecutor`] | Executes items in batches and reports per-item outcomes |
//! | [`BatchConfig`] | Batch size and pause between batches |
//! | [`BatchResult`] | Successes and failures with their item indices |
//! | [`process_in_batches`] | One-call helper returning the successful outputs |
//!
//! ## Example
//!
//! ```rust,no_run
//! use resilient_api_client::batch::process_in_batches;
//! use resilient_api_client::{ResilientHttpClient, StructuredLogger};
//! use std::time::Duration;
//!
//! # async fn demo(client: &ResilientHttpClient) {
//! let ids = vec![1, 2, 3];
//! let names = process_in_batches(
//!     ids,
//!     |id| async move {
//!         client
//!             .get::<serde_json::Value>(&format!("/pokemon/{}", id))
//!             .await
//!             .map(|r| r.data["name"].clone())
//!     },
//!     2,
//!     Duration::from_millis(500),
//!     &StructuredLogger::new("batch"),
//! )
//! .await;
//! # let _ = names;
//! # }
//! ```

mod executor;

pub use executor::{process_in_batches, BatchConfig, BatchExecutor, BatchResult};
