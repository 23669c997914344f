use crate::error_code::{ErrorKind, ErrorSeverity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.base_url", "request.endpoint")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected format, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "client_builder", "file_transport")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that can be routed by kind.
///
/// Handlers in the [`ErrorDispatcher`](crate::resilience::ErrorDispatcher) and
/// retry strategies see errors through this trait.
pub trait Classify: std::error::Error + Send + Sync {
    fn kind(&self) -> ErrorKind;

    fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Retry hint; defaults to the kind's semantics.
    fn retryable(&self) -> bool {
        self.kind().retryable()
    }
}

/// The error shape every client method surfaces.
///
/// Built at each failure boundary (validation, transport, timeout, status, parse)
/// so callers always get a message, code, status, url and timestamp.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub kind: ErrorKind,
    pub code: &'static str,
    pub status: Option<u16>,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub details: Option<serde_json::Value>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            code: kind.code(),
            status: None,
            url: url.into(),
            timestamp: Utc::now(),
            details: None,
            severity: kind.severity(),
            retryable: kind.retryable(),
        }
    }

    pub fn validation(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, url)
    }

    pub fn timeout(url: impl Into<String>, after_ms: u64) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Request timed out after {}ms", after_ms),
            url,
        )
        .with_details(serde_json::json!({ "timeout_ms": after_ms }))
    }

    /// Non-2xx response. The body text is kept under `details.response_body`.
    pub fn http_status(status: u16, status_text: &str, url: impl Into<String>, body: &str) -> Self {
        let mut err = Self::new(
            ErrorKind::HttpStatus,
            format!("HTTP {}: {}", status, status_text),
            url,
        )
        .with_details(serde_json::json!({ "response_body": body }));
        err.status = Some(status);
        err.retryable = ErrorKind::status_retryable(status);
        err
    }

    pub fn parse(message: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        let mut err = Self::new(ErrorKind::Parse, message, url);
        err.status = Some(status);
        err
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Response body text of a status error, if captured.
    pub fn response_body(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("response_body"))
            .and_then(|v| v.as_str())
    }
}

impl Classify for ApiError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn retryable(&self) -> bool {
        self.retryable
    }
}

/// Crate-level error for everything outside the request path
/// (construction, configuration, file transports).
#[derive(Debug, Error)]
pub enum Error {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Api(e) => e.kind,
            Error::Configuration { .. } => ErrorKind::Validation,
            Error::Transport(e) => e.kind(),
            Error::Io(_) => ErrorKind::Transport,
            Error::Serialization(_) => ErrorKind::Parse,
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Error::Api(e) => e.retryable,
            other => other.kind().retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_error_shape() {
        let err = ApiError::http_status(404, "Not Found", "https://api.test/x", "{\"code\":0}");
        assert_eq!(err.kind, ErrorKind::HttpStatus);
        assert_eq!(err.code, "E3001");
        assert_eq!(err.status, Some(404));
        assert_eq!(err.message, "HTTP 404: Not Found");
        assert_eq!(err.response_body(), Some("{\"code\":0}"));
        assert!(!err.retryable);
    }

    #[test]
    fn test_server_status_is_retryable() {
        assert!(ApiError::http_status(503, "Service Unavailable", "u", "").retryable);
        assert!(ApiError::http_status(429, "Too Many Requests", "u", "").retryable);
    }

    #[test]
    fn test_timeout_error_details() {
        let err = ApiError::timeout("https://api.test/slow", 250);
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);
        assert_eq!(err.details.as_ref().unwrap()["timeout_ms"], 250);
        assert!(err.status.is_none());
    }

    #[test]
    fn test_error_context_display() {
        let err = Error::configuration_with_context(
            "base_url must be absolute",
            ErrorContext::new()
                .with_field_path("config.base_url")
                .with_source("client_builder"),
        );
        let text = err.to_string();
        assert!(text.contains("field: config.base_url"));
        assert!(text.contains("source: client_builder"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_api_error_serializes() {
        let err = ApiError::validation("Endpoint must start with '/'", "x");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["code"], "E1001");
        assert_eq!(json["severity"], "low");
    }
}
