//! 传输层模块：定义客户端与网络之间的 HTTP 抽象接口，并提供基于 reqwest 的默认实现。
//!
//! # Transport Module
//!
//! The seam between [`ResilientHttpClient`](crate::ResilientHttpClient) and the
//! network. The client builds an [`HttpRequest`], hands it to an
//! [`HttpTransport`] and interprets the [`HttpResponse`]; status handling,
//! retries and timeouts stay in the client.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`HttpTransport`] | One async `send` operation; implement it to script responses in tests |
//! | [`ReqwestTransport`] | Production implementation on `reqwest` |
//! | [`TransportError`] | Connection / timeout / other failures below HTTP |

mod http;

pub use http::ReqwestTransport;

use crate::error::Classify;
use crate::error_code::ErrorKind;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL, query string included.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Reason phrase for the statuses the client reports on.
pub fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Other(String),
}

impl Classify for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Connect(_) | TransportError::Other(_) => ErrorKind::Transport,
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
