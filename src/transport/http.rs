use super::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::error::ErrorContext;
use async_trait::async_trait;
use reqwest::Proxy;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

/// [`HttpTransport`] on a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(
                env::var("API_CLIENT_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("API_CLIENT_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("API_CLIENT_PROXY_URL") {
            match Proxy::all(&proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => tracing::warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy url"),
            }
        }

        let client = builder.build().map_err(|e| {
            crate::Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("reqwest_transport"),
            )
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn map_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect(describe(&err))
    } else {
        TransportError::Other(describe(&err))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Head => self.client.head(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.timeout(request.timeout);

        let response = builder
            .send()
            .await
            .map_err(|e| map_error(e, request.timeout))?;

        let status = response.status();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            match value.to_str() {
                Ok(v) => {
                    headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
                }
                Err(_) => tracing::debug!(header = %name, "skipping non-ASCII response header"),
            }
        }

        let body = match request.method {
            HttpMethod::Head => bytes::Bytes::new(),
            HttpMethod::Get => response
                .bytes()
                .await
                .map_err(|e| map_error(e, request.timeout))?,
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}
