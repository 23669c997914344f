//! Event fan-out.
//!
//! [`ListenerSet`] is the shared registration/fan-out primitive used by the
//! client's [`EventBus`], the structured logger and the error dispatcher.
//! Listeners are invoked synchronously in registration order; a panicking
//! listener is caught, reported, and never stops delivery to the others or
//! unwinds into the emitting call.

use crate::client::rate_limit::RateLimitInfo;
use crate::logging::StructuredLogger;
use crate::transport::HttpMethod;
use crate::ApiError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Handle returned on registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct ListenerSet<E> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> ListenerSet<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Delivers `event` to every listener and returns the panics that were caught,
    /// as `(listener, panic message)` pairs.
    pub fn emit(&self, event: &E) -> Vec<(ListenerId, String)> {
        // Snapshot so listeners may register or remove listeners while running.
        let snapshot: Vec<(ListenerId, Listener<E>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut panics = Vec::new();
        for (id, listener) in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                let message = panic_message(payload.as_ref());
                warn!(listener_id = id.0, panic = %message, "event listener panicked");
                panics.push((id, message));
            }
        }
        panics
    }
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Observable client activity.
#[derive(Debug, Clone, Serialize)]
pub struct ApiEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(flatten)]
    pub kind: ApiEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiEventKind {
    Request {
        url: String,
        method: HttpMethod,
    },
    Response {
        url: String,
        status: u16,
        duration_ms: u64,
        cached: bool,
    },
    Error {
        url: String,
        error: ApiError,
    },
    CacheHit {
        key: String,
        duration_ms: u64,
    },
    CacheMiss {
        key: String,
    },
    CacheClear {
        /// The pattern that was cleared, or `"all"`.
        key: String,
        removed: usize,
    },
    RateLimit {
        limit: u64,
        remaining: u64,
        reset: u64,
        window_ms: u64,
    },
}

impl ApiEvent {
    pub fn name(&self) -> &'static str {
        match self.kind {
            ApiEventKind::Request { .. } => "request",
            ApiEventKind::Response { .. } => "response",
            ApiEventKind::Error { .. } => "error",
            ApiEventKind::CacheHit { .. } => "cache_hit",
            ApiEventKind::CacheMiss { .. } => "cache_miss",
            ApiEventKind::CacheClear { .. } => "cache_clear",
            ApiEventKind::RateLimit { .. } => "rate_limit",
        }
    }
}

impl From<&RateLimitInfo> for ApiEventKind {
    fn from(info: &RateLimitInfo) -> Self {
        ApiEventKind::RateLimit {
            limit: info.limit,
            remaining: info.remaining,
            reset: info.reset,
            window_ms: info.window_ms,
        }
    }
}

/// The client's event bus: stamps events and fans them out.
pub struct EventBus {
    source: String,
    enabled: AtomicBool,
    listeners: ListenerSet<ApiEvent>,
    logger: StructuredLogger,
}

impl EventBus {
    pub fn new(source: impl Into<String>, enabled: bool, logger: StructuredLogger) -> Self {
        Self {
            source: source.into(),
            enabled: AtomicBool::new(enabled),
            listeners: ListenerSet::new(),
            logger,
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ApiEvent) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn emit(&self, kind: ApiEventKind) {
        if !self.is_enabled() || self.listeners.is_empty() {
            return;
        }
        let event = ApiEvent {
            timestamp: Utc::now(),
            source: self.source.clone(),
            kind,
        };
        for (id, message) in self.listeners.emit(&event) {
            self.logger.warn_with(
                format!("Event listener failed while handling '{}'", event.name()),
                serde_json::json!({ "listener_id": id.value(), "panic": message }),
            );
        }
    }
}
