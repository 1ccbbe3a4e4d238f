//! Exponential backoff continuation.

use super::{ContinuationPolicy, ContinuationSession};
use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result};
use crate::provider::SharedProvider;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use std::vec;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A bounded number of attempts with exponentially growing pauses between
/// them, cycling through the candidate list as often as the budget allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoffPolicy {
    max_attempts: u32,
    backoff_multiplier: Duration,
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_multiplier: Duration::from_millis(100),
        }
    }
}

impl ExponentialBackoffPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(max_attempts: u32, backoff_multiplier: Duration) -> Self {
        Self {
            max_attempts,
            backoff_multiplier,
        }
    }

    /// Set the attempt budget.
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base pause.
    #[must_use]
    pub fn backoff_multiplier(mut self, d: Duration) -> Self {
        self.backoff_multiplier = d;
        self
    }

    /// Attempt budget.
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts
    }

    /// Base pause.
    pub fn multiplier(&self) -> Duration {
        self.backoff_multiplier
    }

    /// Pause before the attempt following `attempts` completed ones.
    ///
    /// Zero before the first attempt, then `m`, `2m`, `4m`, ...
    pub fn delay_after(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempts - 1).unwrap_or(u32::MAX);
        self.backoff_multiplier.saturating_mul(factor)
    }
}

#[async_trait]
impl ContinuationPolicy for ExponentialBackoffPolicy {
    async fn start_session(
        &self,
        supplied: &Endpoint,
        provider: Arc<SharedProvider>,
        cancellation: CancellationToken,
    ) -> Box<dyn ContinuationSession> {
        let candidates = provider.endpoints(supplied).await;
        Box::new(ExponentialBackoffSession {
            policy: *self,
            supplied: supplied.clone(),
            has_candidates: !candidates.is_empty(),
            candidates: candidates.into_iter(),
            provider,
            cancellation,
            cancelled: false,
            attempts: 0,
        })
    }
}

/// Session state for [`ExponentialBackoffPolicy`].
#[derive(Debug)]
pub struct ExponentialBackoffSession {
    policy: ExponentialBackoffPolicy,
    supplied: Endpoint,
    candidates: vec::IntoIter<Endpoint>,
    has_candidates: bool,
    provider: Arc<SharedProvider>,
    cancellation: CancellationToken,
    cancelled: bool,
    attempts: u32,
}

impl ExponentialBackoffSession {
    async fn pause(&mut self) {
        let delay = self.policy.delay_after(self.attempts);
        if delay.is_zero() {
            return;
        }
        debug!(
            attempt = self.attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Backing off before next attempt"
        );
        tokio::select! {
            _ = self.cancellation.cancelled() => {
                debug!("Backoff interrupted by cancellation");
                self.cancelled = true;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[async_trait]
impl ContinuationSession for ExponentialBackoffSession {
    fn should_continue(&self) -> bool {
        !self.cancelled
            && !self.cancellation.is_cancelled()
            && self.has_candidates
            && self.attempts < self.policy.max_attempts
    }

    async fn next_host(&mut self) -> Result<Endpoint> {
        if self.attempts >= self.policy.max_attempts {
            return Err(ResilienceError::SessionExhausted {
                attempts: self.attempts,
            });
        }

        self.pause().await;

        let host = match self.candidates.next() {
            Some(host) => host,
            None => {
                self.has_candidates = false;
                return Err(ResilienceError::SessionExhausted {
                    attempts: self.attempts,
                });
            }
        };
        self.attempts += 1;

        if self.candidates.as_slice().is_empty() && self.attempts < self.policy.max_attempts {
            let refreshed = self.provider.endpoints(&self.supplied).await;
            self.has_candidates = !refreshed.is_empty();
            self.candidates = refreshed.into_iter();
        }
        Ok(host)
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        self.provider.report_failure(endpoint)
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingProvider;
    use crate::provider::{EndpointProvider, StaticOrderedProvider};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn nodes() -> Vec<Endpoint> {
        vec![Endpoint::new("a", 1), Endpoint::new("b", 2)]
    }

    async fn session(policy: ExponentialBackoffPolicy, token: CancellationToken) -> Box<dyn ContinuationSession> {
        let provider = SharedProvider::new(StaticOrderedProvider::new(nodes()));
        policy.start_session(&Endpoint::new("a", 1), provider, token).await
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(4, 800)]
    fn test_delay_after(#[case] attempts: u32, #[case] expected_ms: u64) {
        let policy = ExponentialBackoffPolicy::new(10, Duration::from_millis(100));
        assert_eq!(policy.delay_after(attempts), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = ExponentialBackoffPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.delay_after(64), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_timing() {
        let m = Duration::from_millis(50);
        let mut session = session(ExponentialBackoffPolicy::new(4, m), CancellationToken::new()).await;

        let mut gaps = Vec::new();
        let mut last = Instant::now();
        while session.should_continue() {
            session.next_host().await.unwrap();
            let now = Instant::now();
            gaps.push(now - last);
            last = now;
        }

        assert_eq!(gaps, vec![Duration::ZERO, m, m * 2, m * 4]);
        assert!(matches!(
            session.next_host().await,
            Err(ResilienceError::SessionExhausted { attempts: 4 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wraps_around_candidate_list() {
        let mut session = session(
            ExponentialBackoffPolicy::new(5, Duration::from_millis(1)),
            CancellationToken::new(),
        )
        .await;

        let mut seen = Vec::new();
        while session.should_continue() {
            seen.push(session.next_host().await.unwrap());
        }

        assert_eq!(
            seen,
            vec![
                Endpoint::new("a", 1),
                Endpoint::new("b", 2),
                Endpoint::new("a", 1),
                Endpoint::new("b", 2),
                Endpoint::new("a", 1),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_sleep_still_yields_host() {
        let token = CancellationToken::new();
        let mut session = session(ExponentialBackoffPolicy::new(4, Duration::from_secs(60)), token.clone()).await;

        session.next_host().await.unwrap();
        assert!(session.should_continue());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let host = session.next_host().await.unwrap();

        assert_eq!(host, Endpoint::new("b", 2));
        assert!(Instant::now() - started < Duration::from_secs(60));
        assert!(!session.should_continue());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let session = session(ExponentialBackoffPolicy::new(4, Duration::from_millis(1)), token).await;

        assert!(!session.should_continue());
    }

    #[tokio::test]
    async fn test_empty_provider_never_continues() {
        let provider = SharedProvider::new(StaticOrderedProvider::new(Vec::new()));
        let mut session = ExponentialBackoffPolicy::new(3, Duration::from_millis(1))
            .start_session(&Endpoint::new("a", 1), provider, CancellationToken::new())
            .await;

        assert!(!session.should_continue());
        assert!(session.next_host().await.is_err());
    }

    /// Offers its endpoints on the first call only.
    #[derive(Debug, Default)]
    struct DrainingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EndpointProvider for DrainingProvider {
        async fn endpoints(&self, _supplied: &Endpoint) -> Vec<Endpoint> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                vec![Endpoint::new("a", 1)]
            } else {
                Vec::new()
            }
        }

        fn handle_failed_host(&self, _endpoint: &Endpoint) -> Result<()> {
            Ok(())
        }

        fn supports(&self, _endpoint: &Endpoint) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_refetch_comes_back_empty() {
        let provider = SharedProvider::new(DrainingProvider::default());
        let mut session = ExponentialBackoffPolicy::new(3, Duration::from_millis(1))
            .start_session(&Endpoint::new("a", 1), provider, CancellationToken::new())
            .await;

        assert!(session.should_continue());
        assert_eq!(session.next_host().await.unwrap(), Endpoint::new("a", 1));
        assert!(!session.should_continue());
        assert_eq!(session.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failures_reach_the_provider() {
        let recording = RecordingProvider::new(nodes());
        let provider = SharedProvider::new(recording.clone());
        let session = ExponentialBackoffPolicy::default()
            .start_session(&Endpoint::new("a", 1), provider, CancellationToken::new())
            .await;

        session.handle_failed_host(&Endpoint::new("b", 2)).unwrap();

        assert_eq!(recording.failures(), vec![Endpoint::new("b", 2)]);
    }
}
