//! Scripted collaborators for tests.
//!
//! [`ScriptedTransport`] replays canned outcomes per host and records every
//! request it sees. [`RecordingProvider`] is a fixed-list provider that
//! remembers the failures reported to it.

use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::provider::EndpointProvider;
use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

type ErrorFactory = Arc<dyn Fn() -> TransportError + Send + Sync>;

/// One canned outcome.
#[derive(Clone)]
pub enum Scripted {
    /// Respond with this status and body.
    Status(StatusCode, &'static str),
    /// Fail with the error the factory builds.
    Error(ErrorFactory),
}

impl Scripted {
    /// Respond with `status` and an empty body.
    pub fn status(code: u16) -> Self {
        Self::Status(StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), "")
    }

    /// Fail with errors built by `factory`.
    pub fn error(factory: impl Fn() -> TransportError + Send + Sync + 'static) -> Self {
        Self::Error(Arc::new(factory))
    }

    fn realize(&self) -> std::result::Result<HttpResponse, TransportError> {
        match self {
            Self::Status(status, body) => Ok(HttpResponse::new(*status).with_body(*body)),
            Self::Error(factory) => Err(factory()),
        }
    }
}

impl fmt::Debug for Scripted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status, _) => f.debug_tuple("Status").field(status).finish(),
            Self::Error(factory) => f.debug_tuple("Error").field(&factory().to_string()).finish(),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    outcomes: HashMap<String, VecDeque<Scripted>>,
    requests: Vec<HttpRequest>,
}

/// A [`Transport`] that replays scripted outcomes keyed by `host:port`.
///
/// Each authority has a queue; the last outcome repeats once the queue is
/// down to one entry. Unscripted authorities fail with a refused connection.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `outcome` for requests to `endpoint`.
    #[must_use]
    pub fn on(self, endpoint: &Endpoint, outcome: Scripted) -> Self {
        self.script
            .lock()
            .outcomes
            .entry(authority_of(endpoint))
            .or_default()
            .push_back(outcome);
        self
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().requests.clone()
    }

    /// The `host:port` of every request sent so far.
    pub fn authorities(&self) -> Vec<String> {
        self.script
            .lock()
            .requests
            .iter()
            .map(|r| authority_of_url(r.url()))
            .collect()
    }
}

fn authority_of(endpoint: &Endpoint) -> String {
    format!("{}:{}", endpoint.url_host(), endpoint.port_or(80))
}

fn authority_of_url(url: &url::Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or(80)
    )
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let authority = authority_of_url(request.url());
        let mut script = self.script.lock();
        script.requests.push(request);
        let outcome = match script.outcomes.get_mut(&authority) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        drop(script);

        match outcome {
            Some(outcome) => outcome.realize(),
            None => Err(TransportError::io(
                std::io::ErrorKind::ConnectionRefused,
                format!("nothing scripted for {authority}"),
            )),
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    failures: Vec<Endpoint>,
}

/// A fixed-order provider that records failure feedback.
#[derive(Debug, Clone)]
pub struct RecordingProvider {
    endpoints: Vec<Endpoint>,
    supports_all: bool,
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingProvider {
    /// Offer `endpoints` in order and support exactly them.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            supports_all: false,
            recorded: Arc::default(),
        }
    }

    /// Support every endpoint, offered or not.
    #[must_use]
    pub fn supporting_all(mut self) -> Self {
        self.supports_all = true;
        self
    }

    /// Failures reported so far, in order.
    pub fn failures(&self) -> Vec<Endpoint> {
        self.recorded.lock().failures.clone()
    }
}

#[async_trait]
impl EndpointProvider for RecordingProvider {
    async fn endpoints(&self, _supplied: &Endpoint) -> Vec<Endpoint> {
        self.endpoints.clone()
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        if !self.supports(endpoint) {
            return Err(ResilienceError::UnmanagedEndpoint(endpoint.clone()));
        }
        self.recorded.lock().failures.push(endpoint.clone());
        Ok(())
    }

    fn supports(&self, endpoint: &Endpoint) -> bool {
        self.supports_all || self.endpoints.contains(endpoint)
    }
}
