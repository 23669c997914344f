use super::entry::LogEntry;
use super::level::{LogLevel, Threshold};
use super::logger::{LogStats, LoggerConfig, StructuredLogger};
use super::transport::{FileTransport, LogTransport};
use crate::resilience::ErrorDispatcher;
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub loggers: usize,
    pub dispatchers: usize,
    pub file_transports: usize,
    pub logs: LogStats,
}

/// Owns one logger and one error dispatcher per module name.
///
/// Construct one per application and pass it where it is needed; loggers
/// created later inherit the registry's level, performance threshold and any
/// transport attached to all modules.
pub struct LoggerRegistry {
    defaults: RwLock<LoggerConfig>,
    loggers: RwLock<HashMap<String, StructuredLogger>>,
    dispatchers: RwLock<HashMap<String, ErrorDispatcher>>,
    file_transports: Mutex<Vec<(Option<String>, Arc<FileTransport>)>>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::with_defaults(LoggerConfig::default())
    }

    pub fn with_defaults(defaults: LoggerConfig) -> Self {
        Self {
            defaults: RwLock::new(defaults),
            loggers: RwLock::new(HashMap::new()),
            dispatchers: RwLock::new(HashMap::new()),
            file_transports: Mutex::new(Vec::new()),
        }
    }

    pub fn logger(&self, module: &str) -> StructuredLogger {
        if let Some(logger) = self
            .loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
        {
            return logger.clone();
        }
        let defaults = self
            .defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.loggers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(module.to_string())
            .or_insert_with(|| StructuredLogger::with_config(module, defaults))
            .clone()
    }

    pub fn dispatcher(&self, module: &str) -> ErrorDispatcher {
        if let Some(dispatcher) = self
            .dispatchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
        {
            return dispatcher.clone();
        }
        let logger = self.logger(module);
        self.dispatchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(module.to_string())
            .or_insert_with(|| ErrorDispatcher::new(logger))
            .clone()
    }

    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Opens a file transport and attaches it to `module`, or to every logger
    /// (present and future) when no module is given.
    pub async fn add_file_transport(
        &self,
        dir: impl AsRef<Path>,
        module: Option<&str>,
        filename: Option<&str>,
    ) -> Result<Arc<FileTransport>> {
        let transport = Arc::new(FileTransport::open(dir, filename).await?);
        let as_dyn: Arc<dyn LogTransport> = transport.clone();
        match module {
            Some(name) => self.logger(name).add_transport(as_dyn),
            None => {
                self.defaults
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .transports
                    .push(as_dyn.clone());
                for logger in self.all_loggers() {
                    logger.add_transport(as_dyn.clone());
                }
            }
        }
        self.file_transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((module.map(str::to_string), transport.clone()));
        Ok(transport)
    }

    pub fn set_global_level(&self, level: impl Into<Threshold>) {
        let level: LogLevel = level.into().0;
        self.defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .level = level;
        for logger in self.all_loggers() {
            logger.set_level(level);
        }
    }

    pub fn set_global_performance_threshold(&self, threshold: Duration) {
        self.defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .performance_threshold = threshold;
        for logger in self.all_loggers() {
            logger.set_performance_threshold(threshold);
        }
    }

    /// Every logger's history, oldest first.
    pub fn all_logs(&self) -> Vec<LogEntry> {
        let mut entries: Vec<LogEntry> = self
            .all_loggers()
            .iter()
            .flat_map(|l| l.history())
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        entries
    }

    pub fn clear_all_logs(&self) {
        for logger in self.all_loggers() {
            logger.clear_history();
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let logs = self.all_logs();
        RegistryStats {
            loggers: self
                .loggers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            dispatchers: self
                .dispatchers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            file_transports: self
                .file_transports
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            logs: LogStats::from_entries(logs.iter()),
        }
    }

    /// Detaches and closes every file transport, draining queued lines.
    pub async fn close_file_transports(&self) {
        let transports: Vec<(Option<String>, Arc<FileTransport>)> = self
            .file_transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for (_, transport) in &transports {
            let name = transport.name().to_string();
            self.defaults
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .transports
                .retain(|t| t.name() != name);
            for logger in self.all_loggers() {
                logger.remove_transport(&name);
            }
        }
        for (_, transport) in transports {
            transport.close().await;
        }
    }

    fn all_loggers(&self) -> Vec<StructuredLogger> {
        self.loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
