//! Per-attempt and per-request log events.

use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::stats::RequestStats;
use regex::RegexSet;
use reqwest::header::{HeaderMap, USER_AGENT};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::Level;

/// Headers never written to logs.
const HIDDEN_HEADERS: &[&str] = &[
    "^User-Agent$",
    "^Referer$",
    "^X-Request-Id$",
    "^X-Api-Key$",
    "^X-Varnish$",
    "^X-Timer$",
    "^Connection$",
    "^Content-Length$",
    "^Cdn-Loop$",
    "^Fastly",
];

/// Emit an event whose level is only known at runtime.
macro_rules! event_at {
    ($level:expr, $($rest:tt)+) => {{
        let level: Level = $level;
        if level == Level::ERROR {
            tracing::event!(Level::ERROR, $($rest)+)
        } else if level == Level::WARN {
            tracing::event!(Level::WARN, $($rest)+)
        } else if level == Level::INFO {
            tracing::event!(Level::INFO, $($rest)+)
        } else if level == Level::DEBUG {
            tracing::event!(Level::DEBUG, $($rest)+)
        } else {
            tracing::event!(Level::TRACE, $($rest)+)
        }
    }};
}

/// Case-insensitive header deny-list.
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    hidden: RegexSet,
}

impl HeaderFilter {
    /// The default deny-list.
    pub fn new() -> Result<Self> {
        Self::with_extra::<&str>(&[])
    }

    /// The default deny-list plus `extra` patterns.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Result<Self> {
        let patterns = HIDDEN_HEADERS
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref))
            .map(|p| format!("(?i){p}"));
        let hidden = RegexSet::new(patterns)
            .map_err(|e| ResilienceError::configuration(format!("hidden header pattern: {e}")))?;
        Ok(Self { hidden })
    }

    /// Whether `name` may be logged.
    pub fn is_visible(&self, name: &str) -> bool {
        !self.hidden.is_match(name)
    }

    /// The loggable subset of `headers`.
    pub fn visible(&self, headers: &HeaderMap) -> BTreeMap<String, String> {
        headers
            .iter()
            .filter(|(name, _)| self.is_visible(name.as_str()))
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    /// A response arrived.
    Response(&'a HttpResponse),
    /// The transport failed.
    Error(&'a TransportError),
}

/// One attempt against one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRecord<'a> {
    /// The request as sent.
    pub request: &'a HttpRequest,
    /// The endpoint tried.
    pub endpoint: &'a Endpoint,
    /// What happened.
    pub outcome: AttemptOutcome<'a>,
    /// Time spent in the transport.
    pub elapsed: Duration,
    /// Correlation id, if any.
    pub transaction_id: Option<&'a str>,
}

/// Writes the attempt and request events of one client.
#[derive(Debug, Clone)]
pub struct AttemptLogger {
    short_name: String,
    filter: HeaderFilter,
}

impl AttemptLogger {
    /// Create a logger for the client named `short_name`.
    pub fn new(short_name: impl Into<String>, filter: HeaderFilter) -> Self {
        Self {
            short_name: short_name.into(),
            filter,
        }
    }

    /// The client short name.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Log one finished attempt.
    ///
    /// Errors and 5xx responses log at `error`, everything else at `debug`.
    pub fn attempt(&self, record: &AttemptRecord<'_>) {
        let request = record.request;
        let url = request.url();
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let request_headers = self.filter.visible(request.headers());

        let (status, size, content_type, response_headers, error) = match record.outcome {
            AttemptOutcome::Response(response) => (
                response.status().as_u16(),
                response.content_length().unwrap_or(0),
                response.content_type().unwrap_or_default().to_owned(),
                self.filter.visible(response.headers()),
                None,
            ),
            AttemptOutcome::Error(err) => (0, 0, String::new(), BTreeMap::new(), Some(err.to_string())),
        };
        let level = if error.is_some() || status >= 500 {
            Level::ERROR
        } else {
            Level::DEBUG
        };

        event_at!(
            level,
            short_name = %self.short_name,
            transaction_id = record.transaction_id.unwrap_or_default(),
            endpoint = %record.endpoint,
            response_time_ms = record.elapsed.as_millis() as u64,
            protocol = url.scheme(),
            uri = %url,
            path = url.path(),
            method = %request.method(),
            status,
            size,
            content_type = %content_type,
            user_agent,
            request_headers = ?request_headers,
            response_headers = ?response_headers,
            exception_was_thrown = error.is_some(),
            error = error.as_deref().unwrap_or_default(),
            "Attempt finished"
        );
    }

    /// Log the end of a logical request.
    ///
    /// Logs at `error` when nothing was attempted, the final status is 5xx
    /// or the request ended in an error.
    pub fn request_finished(&self, outcome: &Result<HttpResponse>, stats: &RequestStats) {
        let (label, failed) = match outcome {
            Ok(response) => {
                let status = response.status();
                (status.as_u16().to_string(), status.is_server_error())
            }
            Err(ResilienceError::Transport(_)) => ("exception".to_owned(), true),
            Err(_) => ("unknown".to_owned(), true),
        };
        let level = if stats.attempts == 0 || failed {
            Level::ERROR
        } else {
            Level::DEBUG
        };

        event_at!(
            level,
            short_name = %self.short_name,
            outcome = %label,
            total_attempts = stats.attempts,
            failed_attempts = stats.failed_attempts,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Request finished"
        );
    }
}
