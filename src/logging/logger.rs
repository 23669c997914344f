use super::entry::LogEntry;
use super::level::{LogLevel, Threshold};
use super::serialize::{safe_serialize, LogData};
use super::transport::{LogTransport, TracingTransport};
use crate::events::{ListenerId, ListenerSet};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_HISTORY: usize = 10_000;
pub const DEFAULT_PERFORMANCE_THRESHOLD: Duration = Duration::from_millis(1000);

#[derive(Clone)]
pub struct LoggerConfig {
    pub level: LogLevel,
    pub max_history: usize,
    pub performance_threshold: Duration,
    pub transports: Vec<Arc<dyn LogTransport>>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            max_history: DEFAULT_MAX_HISTORY,
            performance_threshold: DEFAULT_PERFORMANCE_THRESHOLD,
            transports: vec![Arc::new(TracingTransport)],
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: impl Into<Threshold>) -> Self {
        self.level = level.into().0;
        self
    }

    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max.max(1);
        self
    }

    pub fn with_performance_threshold(mut self, threshold: Duration) -> Self {
        self.performance_threshold = threshold;
        self
    }

    /// Replaces the default transport list.
    pub fn with_transports(mut self, transports: Vec<Arc<dyn LogTransport>>) -> Self {
        self.transports = transports;
        self
    }
}

/// Notification emitted for every recorded entry.
#[derive(Debug, Clone)]
pub enum LoggerEvent {
    Log(LogEntry),
    Error(LogEntry),
    Fatal(LogEntry),
    SlowPerformance(LogEntry),
}

impl LoggerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Error(_) => "error",
            Self::Fatal(_) => "fatal",
            Self::SlowPerformance(_) => "slow_performance",
        }
    }

    pub fn entry(&self) -> &LogEntry {
        match self {
            Self::Log(e) | Self::Error(e) | Self::Fatal(e) | Self::SlowPerformance(e) => e,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub by_level: BTreeMap<String, u64>,
    pub by_module: BTreeMap<String, u64>,
}

impl LogStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut stats = LogStats::default();
        for e in entries {
            stats.total += 1;
            *stats.by_level.entry(e.level.to_string()).or_default() += 1;
            *stats.by_module.entry(e.module.clone()).or_default() += 1;
        }
        stats
    }
}

/// Threshold and transports, shared between a logger and its children.
struct Settings {
    threshold: AtomicU8,
    performance_threshold_ms: AtomicU64,
    transports: RwLock<Vec<Arc<dyn LogTransport>>>,
}

struct Inner {
    module: String,
    settings: Arc<Settings>,
    max_history: usize,
    history: Mutex<VecDeque<LogEntry>>,
    listeners: ListenerSet<LoggerEvent>,
}

/// Severity-gated, multi-transport logger with a bounded history.
///
/// Cloning is cheap and shares everything. Each recorded entry is appended to
/// the history, announced to listeners, then written to every transport.
#[derive(Clone)]
pub struct StructuredLogger {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("module", &self.inner.module)
            .field("level", &self.level())
            .field("transports", &self.transport_names())
            .finish()
    }
}

impl StructuredLogger {
    pub fn new(module: impl Into<String>) -> Self {
        Self::with_config(module, LoggerConfig::default())
    }

    pub fn with_config(module: impl Into<String>, config: LoggerConfig) -> Self {
        let settings = Arc::new(Settings {
            threshold: AtomicU8::new(config.level.as_u8()),
            performance_threshold_ms: AtomicU64::new(config.performance_threshold.as_millis() as u64),
            transports: RwLock::new(config.transports),
        });
        Self::from_settings(module.into(), settings, config.max_history)
    }

    fn from_settings(module: String, settings: Arc<Settings>, max_history: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                module,
                settings,
                max_history,
                history: Mutex::new(VecDeque::new()),
                listeners: ListenerSet::new(),
            }),
        }
    }

    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logger named `parent.name` sharing this logger's threshold and transports.
    /// History and listeners are its own.
    pub fn child(&self, name: &str) -> StructuredLogger {
        Self::from_settings(
            format!("{}.{}", self.inner.module, name),
            self.inner.settings.clone(),
            self.inner.max_history,
        )
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8_clamped(self.inner.settings.threshold.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: impl Into<Threshold>) {
        self.inner
            .settings
            .threshold
            .store(level.into().0.as_u8(), Ordering::Relaxed);
    }

    pub fn performance_threshold(&self) -> Duration {
        Duration::from_millis(
            self.inner
                .settings
                .performance_threshold_ms
                .load(Ordering::Relaxed),
        )
    }

    pub fn set_performance_threshold(&self, threshold: Duration) {
        self.inner
            .settings
            .performance_threshold_ms
            .store(threshold.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn add_transport(&self, transport: Arc<dyn LogTransport>) {
        self.inner
            .settings
            .transports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transport);
    }

    /// Removes every transport with the given name.
    pub fn remove_transport(&self, name: &str) -> bool {
        let mut transports = self
            .inner
            .settings
            .transports
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = transports.len();
        transports.retain(|t| t.name() != name);
        transports.len() != before
    }

    pub fn transport_names(&self) -> Vec<String> {
        self.inner
            .settings
            .transports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LoggerEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    pub fn off_event(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level.passes(self.level())
    }

    /// Records an entry if `level` passes the threshold.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<LogData>,
        metadata: Option<LogData>,
    ) -> Option<LogEntry> {
        if !self.is_enabled(level) {
            return None;
        }
        let mut entry = LogEntry::new(level, self.inner.module.clone(), message);
        entry.data = data.as_ref().map(safe_serialize);
        entry.metadata = metadata.as_ref().map(safe_serialize);
        Some(self.record(entry))
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message, None, None);
    }

    pub fn fatal_with(&self, message: impl Into<String>, data: impl Into<LogData>) {
        self.log(LogLevel::Fatal, message, Some(data.into()), None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None, None);
    }

    pub fn error_with(&self, message: impl Into<String>, data: impl Into<LogData>) {
        self.log(LogLevel::Error, message, Some(data.into()), None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None, None);
    }

    pub fn warn_with(&self, message: impl Into<String>, data: impl Into<LogData>) {
        self.log(LogLevel::Warn, message, Some(data.into()), None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None, None);
    }

    pub fn info_with(&self, message: impl Into<String>, data: impl Into<LogData>) {
        self.log(LogLevel::Info, message, Some(data.into()), None);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None, None);
    }

    pub fn debug_with(&self, message: impl Into<String>, data: impl Into<LogData>) {
        self.log(LogLevel::Debug, message, Some(data.into()), None);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message, None, None);
    }

    pub fn trace_with(&self, message: impl Into<String>, data: impl Into<LogData>) {
        self.log(LogLevel::Trace, message, Some(data.into()), None);
    }

    /// Emits a PERF entry `"{label} completed"` timed from `started`.
    pub fn performance(
        &self,
        label: &str,
        started: Instant,
        metadata: Option<LogData>,
    ) -> LogEntry {
        self.record_performance(label, started.elapsed(), metadata, None)
    }

    /// Times a synchronous operation; on failure the error message is attached
    /// to the PERF entry's metadata.
    pub fn measure<T, E, F>(&self, label: &str, op: F, metadata: Option<LogData>) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let result = op();
        let error = result.as_ref().err().map(|e| e.to_string());
        self.record_performance(label, started.elapsed(), metadata, error);
        result
    }

    pub async fn measure_async<T, E, Fut>(
        &self,
        label: &str,
        fut: Fut,
        metadata: Option<LogData>,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let result = fut.await;
        let error = result.as_ref().err().map(|e| e.to_string());
        self.record_performance(label, started.elapsed(), metadata, error);
        result
    }

    fn record_performance(
        &self,
        label: &str,
        elapsed: Duration,
        metadata: Option<LogData>,
        error: Option<String>,
    ) -> LogEntry {
        let mut entry = LogEntry::new(
            LogLevel::Perf,
            self.inner.module.clone(),
            format!("{} completed", label),
        );
        entry.duration_ms = Some(elapsed.as_secs_f64() * 1000.0);
        let meta = metadata.as_ref().map(safe_serialize);
        entry.metadata = match (meta, error) {
            (Some(serde_json::Value::Object(mut map)), Some(err)) => {
                map.insert("error".to_string(), serde_json::Value::String(err));
                Some(serde_json::Value::Object(map))
            }
            (Some(other), Some(err)) => Some(serde_json::json!({ "value": other, "error": err })),
            (None, Some(err)) => Some(serde_json::json!({ "error": err })),
            (meta, None) => meta,
        };
        self.record(entry)
    }

    fn record(&self, entry: LogEntry) -> LogEntry {
        {
            let mut history = self
                .inner
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            history.push_back(entry.clone());
            while history.len() > self.inner.max_history {
                history.pop_front();
            }
        }

        let listeners = &self.inner.listeners;
        if !listeners.is_empty() {
            listeners.emit(&LoggerEvent::Log(entry.clone()));
            match entry.level {
                LogLevel::Fatal => {
                    listeners.emit(&LoggerEvent::Error(entry.clone()));
                    listeners.emit(&LoggerEvent::Fatal(entry.clone()));
                }
                LogLevel::Error => {
                    listeners.emit(&LoggerEvent::Error(entry.clone()));
                }
                LogLevel::Perf => {
                    let threshold = self.performance_threshold().as_secs_f64() * 1000.0;
                    if entry.duration_ms.unwrap_or_default() > threshold {
                        listeners.emit(&LoggerEvent::SlowPerformance(entry.clone()));
                    }
                }
                _ => {}
            }
        }

        let transports: Vec<Arc<dyn LogTransport>> = self
            .inner
            .settings
            .transports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for transport in transports {
            transport.write(&entry);
        }
        entry
    }

    pub fn history(&self) -> Vec<LogEntry> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear_history(&self) {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> LogStats {
        let history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        LogStats::from_entries(history.iter())
    }
}
