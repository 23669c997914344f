//! Log severities and thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log entry. Lower numeric value is more severe.
///
/// `Perf` sits outside the ordering: performance entries are never filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Fatal = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
    Perf = 6,
}

impl LogLevel {
    pub const FILTERABLE: [LogLevel; 6] = [
        Self::Fatal,
        Self::Error,
        Self::Warn,
        Self::Info,
        Self::Debug,
        Self::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
            Self::Perf => "PERF",
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Numeric threshold, clamped into `0..=5`.
    pub fn from_u8_clamped(n: u8) -> Self {
        match n {
            0 => Self::Fatal,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Named threshold; unknown names map to `Info`.
    pub fn from_name_or_info(name: &str) -> Self {
        name.parse().unwrap_or(Self::Info)
    }

    /// Whether an entry at `self` passes `threshold`.
    pub fn passes(&self, threshold: LogLevel) -> bool {
        match self {
            Self::Perf | Self::Fatal => true,
            level => level.as_u8() <= threshold.as_u8(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}'", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" => Ok(Self::Fatal),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            "perf" => Ok(Self::Perf),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

/// A threshold setting, accepted as a level, a number or a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold(pub LogLevel);

impl From<LogLevel> for Threshold {
    fn from(level: LogLevel) -> Self {
        // PERF is not a threshold; treat it as the most verbose one.
        if level == LogLevel::Perf {
            Threshold(LogLevel::Trace)
        } else {
            Threshold(level)
        }
    }
}

impl From<u8> for Threshold {
    fn from(n: u8) -> Self {
        Threshold(LogLevel::from_u8_clamped(n))
    }
}

impl From<&str> for Threshold {
    fn from(name: &str) -> Self {
        Threshold::from(LogLevel::from_name_or_info(name))
    }
}

impl From<String> for Threshold {
    fn from(name: String) -> Self {
        Threshold::from(name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_filtering() {
        assert!(LogLevel::Error.passes(LogLevel::Info));
        assert!(LogLevel::Info.passes(LogLevel::Info));
        assert!(!LogLevel::Debug.passes(LogLevel::Info));
        assert!(LogLevel::Fatal.passes(LogLevel::Fatal));
        assert!(!LogLevel::Error.passes(LogLevel::Fatal));
        assert!(LogLevel::Perf.passes(LogLevel::Fatal));
    }

    #[test]
    fn test_numeric_threshold_is_clamped() {
        assert_eq!(Threshold::from(0u8).0, LogLevel::Fatal);
        assert_eq!(Threshold::from(4u8).0, LogLevel::Debug);
        assert_eq!(Threshold::from(42u8).0, LogLevel::Trace);
    }

    #[test]
    fn test_named_threshold_defaults_to_info() {
        assert_eq!(Threshold::from("debug").0, LogLevel::Debug);
        assert_eq!(Threshold::from("WARN").0, LogLevel::Warn);
        assert_eq!(Threshold::from("verbose").0, LogLevel::Info);
        assert_eq!(Threshold::from("perf").0, LogLevel::Trace);
    }

    #[test]
    fn test_level_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"WARN\"");
        assert_eq!(LogLevel::Perf.to_string(), "PERF");
    }
}
