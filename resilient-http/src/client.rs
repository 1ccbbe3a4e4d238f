//! The resilient client and its attempt loop.

use crate::attempt::{AttemptLogger, AttemptOutcome, AttemptRecord};
use crate::builder::ResilientClientBuilder;
use crate::config::Protocol;
use crate::context::RequestContext;
use crate::continuation::{ContinuationPolicy, ContinuationSession};
use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::provider::SharedProvider;
use crate::stats::{ClientStats, RequestStats, StatsSnapshot};
use crate::transport::Transport;
use reqwest::header::{HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Port assumed for a logical endpoint that names none.
pub const DEFAULT_SUPPLIED_PORT: u16 = 80;
/// Port assumed for a candidate endpoint that names none.
pub const DEFAULT_CANDIDATE_PORT: u16 = 8080;

/// Statuses that trigger failover to the next candidate.
pub const RECOVERABLE_STATUSES: [StatusCode; 3] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Whether `status` triggers failover.
pub fn is_recoverable(status: StatusCode) -> bool {
    RECOVERABLE_STATUSES.contains(&status)
}

/// Whether repeating `method` is safe when the first try may have landed.
///
/// POST and PATCH are not.
pub fn is_idempotent(method: &Method) -> bool {
    *method != Method::POST && *method != Method::PATCH
}

/// The User-Agent sent with every attempt.
pub fn user_agent(short_name: &str, transaction_id: Option<&str>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    match transaction_id {
        Some(id) => format!("Resilient Client (v={version}, sn={short_name}, transaction_id={id})"),
        None => format!("Resilient Client (v={version}, sn={short_name})"),
    }
}

/// An HTTP client that fails over across the endpoints its provider offers.
///
/// Cheap to clone; clones share the provider, transport and counters.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    pub(crate) short_name: String,
    pub(crate) protocol: Protocol,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) provider: Arc<SharedProvider>,
    pub(crate) continuation: Arc<dyn ContinuationPolicy>,
    pub(crate) retry_non_idempotent_methods: bool,
    pub(crate) transaction_header: Option<HeaderName>,
    pub(crate) logger: AttemptLogger,
    pub(crate) stats: Arc<ClientStats>,
}

impl ResilientClient {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> ResilientClientBuilder {
        ResilientClientBuilder::new()
    }

    /// The client's short name.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// The configured node protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The header carrying the transaction id, if propagation is on.
    pub fn transaction_header(&self) -> Option<&HeaderName> {
        self.transaction_header.as_ref()
    }

    /// Whether POST and PATCH are retried after a read timeout.
    pub fn retries_non_idempotent_methods(&self) -> bool {
        self.retry_non_idempotent_methods
    }

    /// The shared provider.
    pub fn provider(&self) -> &Arc<SharedProvider> {
        &self.provider
    }

    /// Request counters so far.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Send `request` with an empty context.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute(request, &RequestContext::default()).await
    }

    /// Send `request`, failing over across candidate endpoints.
    ///
    /// Returns the first non-recoverable response. When every candidate
    /// failed, returns the last response seen, or else the last transport
    /// error. HTTPS requests go straight to the transport.
    pub async fn execute(&self, request: HttpRequest, context: &RequestContext) -> Result<HttpResponse> {
        if request.is_secure() {
            return Ok(self.transport.send(request).await?);
        }

        let supplied = request.endpoint()?;
        if !self.provider.supports(&supplied) {
            return Err(ResilienceError::UnknownEndpoint(supplied));
        }
        let supplied = supplied.with_default_port(DEFAULT_SUPPLIED_PORT);

        let started = Instant::now();
        let mut stats = RequestStats::default();
        let outcome = self.run(&request, &supplied, context, &mut stats).await;
        stats.elapsed = started.elapsed();

        self.logger.request_finished(&outcome, &stats);
        self.stats.record(&stats);
        outcome
    }

    async fn run(
        &self,
        request: &HttpRequest,
        supplied: &Endpoint,
        context: &RequestContext,
        stats: &mut RequestStats,
    ) -> Result<HttpResponse> {
        let mut session = self
            .continuation
            .start_session(supplied, Arc::clone(&self.provider), context.cancellation().clone())
            .await;

        let mut last_response: Option<HttpResponse> = None;
        let mut last_error: Option<TransportError> = None;

        while session.should_continue() {
            let candidate = match session.next_host().await {
                Ok(candidate) => candidate,
                Err(err) if last_response.is_none() && last_error.is_none() => return Err(err),
                Err(err) => {
                    debug!(error = %err, "Continuation ended early");
                    break;
                }
            };
            if candidate.host().is_empty() {
                return Err(ResilienceError::InvariantViolation(format!(
                    "provider offered a candidate with an empty host for {supplied}"
                )));
            }

            let attempt = self.prepare(request, &candidate, context)?;

            if let Some(previous) = last_response.as_mut() {
                if let Err(err) = previous.drain().await {
                    warn!(short_name = %self.short_name, error = %err, "Failed to release previous response");
                }
            }

            stats.attempts += 1;
            let started = Instant::now();
            let result = self.transport.send(attempt.clone()).await;
            let elapsed = started.elapsed();

            match result {
                Ok(response) => {
                    self.log_attempt(&attempt, &candidate, AttemptOutcome::Response(&response), elapsed, context);
                    if !is_recoverable(response.status()) {
                        return Ok(response);
                    }
                    stats.failed_attempts += 1;
                    self.report_failure(&*session, &candidate);
                    last_response = Some(response);
                }
                Err(err) => {
                    self.log_attempt(&attempt, &candidate, AttemptOutcome::Error(&err), elapsed, context);
                    stats.failed_attempts += 1;
                    if !err.is_io() {
                        warn!(
                            short_name = %self.short_name,
                            endpoint = %candidate,
                            error = %err,
                            "Unexpected failure, not retrying"
                        );
                        return Err(err.into());
                    }

                    self.report_failure(&*session, &candidate);

                    if err.is_remote_state_uncertain()
                        && !is_idempotent(request.method())
                        && !self.retry_non_idempotent_methods
                    {
                        warn!(
                            short_name = %self.short_name,
                            endpoint = %candidate,
                            method = %request.method(),
                            error = %err,
                            "Remote state unknown, not retrying non-idempotent request"
                        );
                        return Err(err.into());
                    }

                    warn!(
                        short_name = %self.short_name,
                        endpoint = %candidate,
                        error = %err,
                        "I/O failure, trying next endpoint"
                    );
                    last_error = Some(err);
                }
            }
        }

        match (last_response, last_error) {
            (Some(response), _) => Ok(response),
            (None, Some(err)) => Err(err.into()),
            (None, None) => Err(ResilienceError::NoAttempts),
        }
    }

    fn prepare(&self, request: &HttpRequest, candidate: &Endpoint, context: &RequestContext) -> Result<HttpRequest> {
        let target = candidate.clone().with_default_port(DEFAULT_CANDIDATE_PORT);
        let mut attempt = request.retarget(&target)?;
        let transaction_id = context.transaction_id();

        let agent = HeaderValue::from_str(&user_agent(&self.short_name, transaction_id))
            .map_err(|e| ResilienceError::invalid_request(format!("User-Agent: {e}")))?;
        attempt.headers_mut().insert(USER_AGENT, agent);

        if let (Some(header), Some(id)) = (&self.transaction_header, transaction_id) {
            let value = HeaderValue::from_str(id)
                .map_err(|e| ResilienceError::invalid_request(format!("{header}: {e}")))?;
            attempt.headers_mut().insert(header.clone(), value);
        }
        Ok(attempt)
    }

    fn report_failure(&self, session: &dyn ContinuationSession, candidate: &Endpoint) {
        if let Err(err) = session.handle_failed_host(candidate) {
            warn!(short_name = %self.short_name, endpoint = %candidate, error = %err, "Failure feedback rejected");
        }
    }

    fn log_attempt(
        &self,
        request: &HttpRequest,
        endpoint: &Endpoint,
        outcome: AttemptOutcome<'_>,
        elapsed: std::time::Duration,
        context: &RequestContext,
    ) {
        self.logger.attempt(&AttemptRecord {
            request,
            endpoint,
            outcome,
            elapsed,
            transaction_id: context.transaction_id(),
        });
    }
}
