use super::level::LogLevel;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One immutable log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub module: String,
    pub trace_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl LogEntry {
    pub fn new(level: LogLevel, module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            module: module.into(),
            trace_id: new_trace_id(),
            message: message.into(),
            data: None,
            metadata: None,
            duration_ms: None,
        }
    }

    pub fn iso_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Short random correlation id.
pub fn new_trace_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_ids_are_unique() {
        let a = LogEntry::new(LogLevel::Info, "m", "x");
        let b = LogEntry::new(LogLevel::Info, "m", "x");
        assert_ne!(a.trace_id, b.trace_id);
        assert_eq!(a.trace_id.len(), 12);
    }

    #[test]
    fn test_iso_timestamp_format() {
        let entry = LogEntry::new(LogLevel::Warn, "m", "x");
        let ts = entry.iso_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn test_optional_fields_skipped_in_json() {
        let entry = LogEntry::new(LogLevel::Info, "client", "hello");
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("data").is_none());
        assert!(json.get("duration_ms").is_none());
        assert_eq!(json["level"], "INFO");
    }
}
