//! Log transports.
//!
//! A transport receives every entry that passed the logger's threshold.
//! `write` is synchronous; transports that do I/O hand the entry off to a queue.

use super::entry::LogEntry;
use super::level::LogLevel;
use crate::{Error, ErrorContext, Result};
use chrono::Utc;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub trait LogTransport: Send + Sync {
    /// Name used by `remove_transport`.
    fn name(&self) -> &str;
    fn write(&self, entry: &LogEntry);
}

/// Forwards entries to `tracing`, so an application's subscriber sees them.
#[derive(Debug, Default, Clone)]
pub struct TracingTransport;

impl LogTransport for TracingTransport {
    fn name(&self) -> &str {
        "tracing"
    }

    fn write(&self, entry: &LogEntry) {
        let data = entry.data.as_ref().map(|d| d.to_string());
        let module = entry.module.as_str();
        let trace_id = entry.trace_id.as_str();
        let message = entry.message.as_str();
        match entry.level {
            LogLevel::Fatal => {
                tracing::error!(module, trace_id, fatal = true, data = ?data, "{}", message)
            }
            LogLevel::Error => tracing::error!(module, trace_id, data = ?data, "{}", message),
            LogLevel::Warn => tracing::warn!(module, trace_id, data = ?data, "{}", message),
            LogLevel::Info => tracing::info!(module, trace_id, data = ?data, "{}", message),
            LogLevel::Debug => tracing::debug!(module, trace_id, data = ?data, "{}", message),
            LogLevel::Trace => tracing::trace!(module, trace_id, data = ?data, "{}", message),
            LogLevel::Perf => tracing::info!(
                module,
                trace_id,
                duration_ms = entry.duration_ms.unwrap_or_default(),
                "{}",
                message
            ),
        }
    }
}

const RESET: &str = "\x1b[0m";
const CYAN: &str = "\x1b[36m";
const MAGENTA: &str = "\x1b[35m";

/// Human-readable, severity-colored output on stderr.
#[derive(Debug, Clone)]
pub struct ConsoleTransport {
    colors: bool,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self { colors: true }
    }

    pub fn plain() -> Self {
        Self { colors: false }
    }

    fn color(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Fatal => "\x1b[41m\x1b[37m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Debug => "\x1b[34m",
            LogLevel::Trace => MAGENTA,
            LogLevel::Perf => CYAN,
        }
    }

    /// `[LEVEL] timestamp [module] [trace] - message`, plus data/meta/duration lines.
    pub fn format(&self, entry: &LogEntry) -> String {
        let paint = |color: &str, text: &str| {
            if self.colors {
                format!("{}{}{}", color, text, RESET)
            } else {
                text.to_string()
            }
        };
        let color = Self::color(entry.level);
        let mut out = format!(
            "{} {} {} {} - {}",
            paint(color, &format!("[{}]", entry.level)),
            entry.iso_timestamp(),
            paint(CYAN, &format!("[{}]", entry.module)),
            paint(MAGENTA, &format!("[{}]", entry.trace_id)),
            entry.message
        );
        if let Some(data) = &entry.data {
            out.push_str(&format!("\n{} {}", paint(color, "╰─ Data:"), data));
        }
        if let Some(meta) = &entry.metadata {
            out.push_str(&format!("\n{} {}", paint(color, "╰─ Meta:"), meta));
        }
        if let Some(duration) = entry.duration_ms {
            out.push_str(&format!("\n{} {:.2}ms", paint(color, "╰─ Duration:"), duration));
        }
        out
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LogTransport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&self, entry: &LogEntry) {
        let line = self.format(entry);
        let stderr = std::io::stderr();
        let mut lock = stderr.lock();
        let _ = writeln!(lock, "{}", line);
    }
}

/// Keeps entries in memory; cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    name: String,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogTransport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, entry: &LogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}

enum FileCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Appends one JSON object per line to a file.
///
/// All writes go through a single queue drained by one writer task, so lines
/// from concurrent loggers never interleave. Must be opened inside a tokio runtime.
pub struct FileTransport {
    name: String,
    path: PathBuf,
    sender: Mutex<Option<mpsc::UnboundedSender<FileCommand>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl FileTransport {
    /// Default file name: `app-YYYY-MM-DD.log`.
    pub fn default_filename() -> String {
        format!("app-{}.log", Utc::now().format("%Y-%m-%d"))
    }

    pub async fn open(dir: impl AsRef<Path>, filename: Option<&str>) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Error::configuration_with_context(
                format!("cannot create log directory: {}", e),
                ErrorContext::new()
                    .with_field_path(dir.display().to_string())
                    .with_source("file_transport"),
            )
        })?;
        let filename = filename
            .map(str::to_string)
            .unwrap_or_else(Self::default_filename);
        let path = dir.join(&filename);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(file, rx, path.clone()));

        Ok(Self {
            name: format!("file:{}", path.display()),
            path,
            sender: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Waits until every line queued so far is on disk.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        let sent = match self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(sender) => sender.send(FileCommand::Flush(tx)).is_ok(),
            None => false,
        };
        if sent {
            let _ = rx.await;
        }
    }

    /// Drains the queue and stops the writer. Later writes are dropped.
    pub async fn close(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = writer {
            if let Err(e) = handle.await {
                tracing::warn!(path = %self.path.display(), error = %e, "log writer task failed");
            }
        }
    }
}

impl LogTransport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, entry: &LogEntry) {
        let mut value = match serde_json::to_value(entry) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "log entry could not be serialized");
                return;
            }
        };
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "written_at".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        let line = format!("{}\n", value);
        if let Some(sender) = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = sender.send(FileCommand::Line(line));
        }
    }
}

async fn run_writer(
    mut file: tokio::fs::File,
    mut rx: mpsc::UnboundedReceiver<FileCommand>,
    path: PathBuf,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            FileCommand::Line(line) => {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to write log line");
                }
            }
            FileCommand::Flush(done) => {
                if let Err(e) = file.flush().await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to flush log file");
                }
                let _ = done.send(());
            }
        }
    }
    if let Err(e) = file.flush().await {
        tracing::warn!(path = %path.display(), error = %e, "failed to flush log file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: LogLevel) -> LogEntry {
        let mut e = LogEntry::new(level, "orders", "placed");
        e.data = Some(serde_json::json!({"id": 7}));
        e
    }

    #[test]
    fn test_console_plain_format() {
        let mut e = entry(LogLevel::Perf);
        e.duration_ms = Some(12.5);
        let text = ConsoleTransport::plain().format(&e);
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("[PERF] "));
        assert!(first.contains("[orders]"));
        assert!(first.ends_with(&format!("[{}] - placed", e.trace_id)));
        assert!(text.contains("╰─ Data: {\"id\":7}"));
        assert!(text.contains("╰─ Duration: 12.50ms"));
    }

    #[test]
    fn test_console_colored_format() {
        let text = ConsoleTransport::new().format(&entry(LogLevel::Error));
        assert!(text.starts_with("\x1b[31m[ERROR]\x1b[0m"));
    }

    #[test]
    fn test_memory_transport_shares_buffer() {
        let t = MemoryTransport::new("mem");
        let view = t.clone();
        t.write(&entry(LogLevel::Info));
        assert_eq!(view.entries().len(), 1);
        view.clear();
        assert!(t.entries().is_empty());
    }

    #[tokio::test]
    async fn test_file_transport_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::open(dir.path(), Some("test.log")).await.unwrap();
        transport.write(&entry(LogLevel::Info));
        transport.write(&entry(LogLevel::Warn));
        transport.close().await;
        assert!(transport.is_closed());

        let contents = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["level"], "INFO");
        assert_eq!(first["module"], "orders");
        assert!(first["written_at"].is_string());

        // Reopening appends instead of truncating.
        let again = FileTransport::open(dir.path(), Some("test.log")).await.unwrap();
        again.write(&entry(LogLevel::Debug));
        again.close().await;
        let contents = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_file_transport_flush_and_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::open(dir.path().join("nested"), None).await.unwrap();
        let name = transport.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("app-") && name.ends_with(".log"));

        transport.write(&entry(LogLevel::Error));
        transport.flush().await;
        let contents = std::fs::read_to_string(transport.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        transport.close().await;

        // Writes after close are dropped silently.
        transport.write(&entry(LogLevel::Error));
        transport.flush().await;
    }
}
