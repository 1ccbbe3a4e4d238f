//! Continuation policies and sessions.
//!
//! A [`ContinuationPolicy`] is a stateless factory. Every logical request
//! opens its own [`ContinuationSession`], which hands out candidate endpoints
//! one at a time and decides when to stop.

mod backoff;
mod default;

pub use backoff::{ExponentialBackoffPolicy, ExponentialBackoffSession};
pub use default::{DefaultContinuationPolicy, DefaultContinuationSession};

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::provider::SharedProvider;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Opens continuation sessions.
#[async_trait]
pub trait ContinuationPolicy: Send + Sync + fmt::Debug {
    /// Start a session for a request against `supplied`.
    async fn start_session(
        &self,
        supplied: &Endpoint,
        provider: Arc<SharedProvider>,
        cancellation: CancellationToken,
    ) -> Box<dyn ContinuationSession>;
}

/// Per-request continuation state.
///
/// `should_continue` returning `true` guarantees the next call to
/// `next_host` yields an endpoint.
#[async_trait]
pub trait ContinuationSession: Send {
    /// Whether another attempt may be made.
    fn should_continue(&self) -> bool;

    /// The next candidate endpoint.
    async fn next_host(&mut self) -> Result<Endpoint>;

    /// Report `endpoint` as failed to the shared provider.
    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()>;

    /// Hosts handed out so far.
    fn attempts(&self) -> u32;
}
