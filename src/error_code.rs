//! 错误分类码：为每一类失败定义稳定的错误码、严重级别与重试语义。
//!
//! Stable error kinds and codes.
//!
//! Every failure surfaced by the client or routed through the
//! [`ErrorDispatcher`](crate::resilience::ErrorDispatcher) carries an
//! [`ErrorKind`]. The kind is the lookup key for registered handlers, so it
//! stays a closed enum with stable code strings instead of a runtime class name.
//!
//! ## Error Code Categories
//!
//! | Prefix | Category   | Description                               |
//! |--------|------------|-------------------------------------------|
//! | E1xxx  | input      | Rejected before any I/O                   |
//! | E2xxx  | transport  | Connection failures and timeouts          |
//! | E3xxx  | http       | Non-2xx responses                         |
//! | E4xxx  | parse      | Malformed response bodies                 |
//! | E5xxx  | isolation  | Calls rejected by a circuit breaker       |
//! | E9xxx  | unhandled  | Nothing claimed the error                 |
//!
//! ## Example
//!
//! ```rust
//! use resilient_api_client::error_code::{ErrorKind, ErrorSeverity};
//!
//! let kind = ErrorKind::Timeout;
//! assert_eq!(kind.code(), "E2002");
//! assert!(kind.retryable());
//! assert_eq!(kind.severity(), ErrorSeverity::Medium);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// E1001: malformed input, rejected before any network or cache access
    Validation,
    /// E2001: DNS or connection failure
    Transport,
    /// E2002: attempt aborted by the per-attempt timeout
    Timeout,
    /// E3001: non-2xx HTTP status
    HttpStatus,
    /// E4001: response body could not be decoded
    Parse,
    /// E5001: call rejected by an open circuit breaker
    CircuitOpen,
    /// E9999: no handler and no fallback claimed the error
    Unhandled,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        Self::Validation,
        Self::Transport,
        Self::Timeout,
        Self::HttpStatus,
        Self::Parse,
        Self::CircuitOpen,
        Self::Unhandled,
    ];

    /// Returns the stable code string (e.g. `"E2002"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "E1001",
            Self::Transport => "E2001",
            Self::Timeout => "E2002",
            Self::HttpStatus => "E3001",
            Self::Parse => "E4001",
            Self::CircuitOpen => "E5001",
            Self::Unhandled => "E9999",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Parse => "parse",
            Self::CircuitOpen => "circuit_open",
            Self::Unhandled => "unhandled",
        }
    }

    /// Default retry semantics for the kind.
    ///
    /// `HttpStatus` is not retryable by kind alone; use [`ErrorKind::status_retryable`]
    /// when a status code is known.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::Timeout)
    }

    /// `429` and every `5xx` status are worth another attempt.
    #[inline]
    pub fn status_retryable(status: u16) -> bool {
        status == 429 || status >= 500
    }

    #[inline]
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Validation | Self::CircuitOpen => ErrorSeverity::Low,
            Self::Transport | Self::Timeout | Self::HttpStatus => ErrorSeverity::Medium,
            Self::Parse => ErrorSeverity::High,
            Self::Unhandled => ErrorSeverity::Critical,
        }
    }

    /// Parses a code string back into a kind.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// How loudly an error should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
