//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_api_client::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use resilient_api_client::{ApiEvent, ClientBuilder, ResilientHttpClient};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const BASE_URL: &str = "https://api.test/v1";

/// One scripted reaction of the transport.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Never answers; only the client's timeout ends the attempt.
    Hang,
}

pub fn json(status: u16, body: &str) -> Step {
    Step::Respond(
        HttpResponse::new(status, body.to_string()).with_header("content-type", "application/json"),
    )
}

pub fn status(status: u16) -> Step {
    Step::Respond(HttpResponse::new(status, format!("status {}", status)))
}

pub fn rate_limited(retry_after_secs: u64) -> Step {
    Step::Respond(
        HttpResponse::new(429, "slow down").with_header("Retry-After", retry_after_secs.to_string()),
    )
}

/// Plays back a fixed script; once exhausted it keeps answering `200 {}`.
/// Records each request together with the (paused) clock time it arrived.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    steps: Arc<Mutex<VecDeque<Step>>>,
    seen: Arc<Mutex<Vec<(Instant, HttpRequest)>>>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            seen: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Gaps between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        let seen = self.seen.lock().unwrap();
        seen.windows(2).map(|w| w[1].0 - w[0].0).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push((Instant::now(), request));
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(HttpResponse::new(200, "{}")),
        }
    }
}

pub fn builder(transport: &ScriptedTransport) -> ClientBuilder {
    ResilientHttpClient::builder(BASE_URL).transport(Arc::new(transport.clone()))
}

/// Collects every event the client emits.
pub fn record_events(client: &ResilientHttpClient) -> Arc<Mutex<Vec<ApiEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.add_event_listener(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

pub fn event_names(events: &Arc<Mutex<Vec<ApiEvent>>>) -> Vec<&'static str> {
    events.lock().unwrap().iter().map(|e| e.name()).collect()
}
