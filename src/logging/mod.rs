//! 结构化日志模块：分级日志、多输出通道、历史缓冲与事件通知。
//!
//! # Structured Logging Module
//!
//! A severity-gated logger that records every accepted entry into a bounded
//! history, notifies listeners, and fans the entry out to pluggable transports.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StructuredLogger`] | Leveled logger with history, stats, timing helpers and child loggers |
//! | [`LogTransport`] | Trait for log sinks |
//! | [`TracingTransport`] | Default sink, forwards to `tracing` |
//! | [`ConsoleTransport`] | Severity-colored stderr output |
//! | [`FileTransport`] | Queued JSON-lines file output |
//! | [`MemoryTransport`] | In-memory sink for inspection and tests |
//! | [`LoggerRegistry`] | Per-module loggers and dispatchers, global level, file transports |
//! | [`LogData`] | Payload tree with cycle-safe serialization |
//!
//! ## Example
//!
//! ```rust
//! use resilient_api_client::logging::{LoggerConfig, LogLevel, MemoryTransport, StructuredLogger};
//! use std::sync::Arc;
//!
//! let memory = MemoryTransport::new("memory");
//! let logger = StructuredLogger::with_config(
//!     "orders",
//!     LoggerConfig::new()
//!         .with_level("debug")
//!         .with_transports(vec![Arc::new(memory.clone())]),
//! );
//! logger.child("db").debug("connected");
//!
//! let entries = memory.entries();
//! assert_eq!(entries[0].module, "orders.db");
//! assert_eq!(entries[0].level, LogLevel::Debug);
//! ```

mod entry;
mod level;
mod logger;
mod registry;
mod serialize;
mod transport;

pub use entry::{new_trace_id, LogEntry};
pub use level::{LogLevel, Threshold, UnknownLevel};
pub use logger::{
    LogStats, LoggerConfig, LoggerEvent, StructuredLogger, DEFAULT_MAX_HISTORY,
    DEFAULT_PERFORMANCE_THRESHOLD,
};
pub use registry::{LoggerRegistry, RegistryStats};
pub use serialize::{safe_serialize, LogData, SharedData, CIRCULAR, UNSERIALIZABLE};
pub use transport::{
    ConsoleTransport, FileTransport, LogTransport, MemoryTransport, TracingTransport,
};
