use super::{ContinuationPolicy, ContinuationSession};
use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result};
use crate::provider::SharedProvider;
use async_trait::async_trait;
use std::sync::Arc;
use std::vec;
use tokio_util::sync::CancellationToken;

/// Try every candidate once, in provider order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContinuationPolicy;

impl DefaultContinuationPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContinuationPolicy for DefaultContinuationPolicy {
    async fn start_session(
        &self,
        supplied: &Endpoint,
        provider: Arc<SharedProvider>,
        _cancellation: CancellationToken,
    ) -> Box<dyn ContinuationSession> {
        let candidates = provider.endpoints(supplied).await;
        Box::new(DefaultContinuationSession {
            candidates: candidates.into_iter(),
            provider,
            attempts: 0,
        })
    }
}

/// Single pass over one candidate list.
#[derive(Debug)]
pub struct DefaultContinuationSession {
    candidates: vec::IntoIter<Endpoint>,
    provider: Arc<SharedProvider>,
    attempts: u32,
}

#[async_trait]
impl ContinuationSession for DefaultContinuationSession {
    fn should_continue(&self) -> bool {
        self.candidates.len() > 0
    }

    async fn next_host(&mut self) -> Result<Endpoint> {
        let host = self
            .candidates
            .next()
            .ok_or(ResilienceError::SessionExhausted {
                attempts: self.attempts,
            })?;
        self.attempts += 1;
        Ok(host)
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        self.provider.report_failure(endpoint)
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}
