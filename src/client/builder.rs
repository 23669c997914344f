use super::config::ClientConfig;
use super::core::ResilientHttpClient;
use crate::events::ApiEvent;
use crate::logging::{LoggerConfig, StructuredLogger};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

type BoxedListener = Box<dyn Fn(&ApiEvent) + Send + Sync>;

/// Builder for [`ResilientHttpClient`].
///
/// Only the base URL is required. Without an explicit transport the client
/// uses [`ReqwestTransport`]; without an explicit logger it gets one named
/// `api-client` at the configured level.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    logger: Option<StructuredLogger>,
    listeners: Vec<BoxedListener>,
}

impl ClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(base_url))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            logger: None,
            listeners: Vec::new(),
        }
    }

    /// Replaces the whole configuration, base URL included.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn max_rate_limit_waits(mut self, waits: u32) -> Self {
        self.config.max_rate_limit_waits = waits;
        self
    }

    pub fn cache(mut self, enabled: bool, ttl: Duration) -> Self {
        self.config.cache.enabled = enabled;
        self.config.cache.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logger.level = level.into();
        self
    }

    pub fn events(mut self, enabled: bool) -> Self {
        self.config.events.enabled = enabled;
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.config.health_path = path.into();
        self
    }

    /// Swaps the network layer, e.g. for a scripted transport in tests.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Registers a listener before the first call.
    pub fn listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&ApiEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn build(self) -> Result<ResilientHttpClient> {
        self.config.validate()?;

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let logger = self.logger.unwrap_or_else(|| {
            StructuredLogger::with_config(
                "api-client",
                LoggerConfig::new().with_level(self.config.logger.threshold()),
            )
        });

        let client = ResilientHttpClient::from_parts(self.config, transport, logger);
        for listener in self.listeners {
            client.add_event_listener(listener);
        }
        client.logger.debug_with(
            "Client created",
            serde_json::json!({
                "base_url": client.config.load().base_url,
                "retries": client.config.load().retries,
                "cache_enabled": client.config.load().cache.enabled,
            }),
        );
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_relative_base_url() {
        let err = ClientBuilder::new("/relative").build().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_builder_applies_settings() {
        let client = ClientBuilder::new("https://api.test")
            .retries(5)
            .retry_delay(Duration::from_millis(10))
            .cache(false, Duration::from_secs(1))
            .header("X-Key", "k")
            .build()
            .unwrap();
        let cfg = client.config();
        assert_eq!(cfg.retries, 5);
        assert_eq!(cfg.retry_delay_ms, 10);
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.headers.get("X-Key").map(String::as_str), Some("k"));
    }
}
