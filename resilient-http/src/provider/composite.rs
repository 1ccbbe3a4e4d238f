//! Chained providers.

use super::{BoxedProvider, EndpointProvider};
use crate::endpoint::Endpoint;
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

/// Chains providers: all candidates of the first, then the second, and so on.
///
/// Failure feedback goes to the first child that supports the endpoint.
#[derive(Debug)]
pub struct CompositeProvider {
    providers: Vec<BoxedProvider>,
}

impl CompositeProvider {
    /// Chain `providers` in order.
    pub fn new(providers: Vec<BoxedProvider>) -> Self {
        Self { providers }
    }

    /// Chain a primary and a secondary provider.
    pub fn pair(primary: BoxedProvider, secondary: BoxedProvider) -> Self {
        Self::new(vec![primary, secondary])
    }

    /// Number of chained providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl EndpointProvider for CompositeProvider {
    async fn endpoints(&self, supplied: &Endpoint) -> Vec<Endpoint> {
        let mut candidates = Vec::new();
        for provider in &self.providers {
            candidates.extend(provider.endpoints(supplied).await);
        }
        candidates
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        match self.providers.iter().find(|p| p.supports(endpoint)) {
            Some(provider) => provider.handle_failed_host(endpoint),
            None => {
                // Resolved IPs are not recognized by name-based children.
                debug!(endpoint = %endpoint, "No provider claims failed endpoint");
                Ok(())
            }
        }
    }

    fn supports(&self, endpoint: &Endpoint) -> bool {
        self.providers.iter().any(|p| p.supports(endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingProvider;
    use crate::provider::{NullProvider, RandomizedProvider, StaticOrderedProvider};
    use pretty_assertions::assert_eq;

    fn primary() -> Vec<Endpoint> {
        vec![Endpoint::new("p1", 80), Endpoint::new("p2", 80), Endpoint::new("p3", 80)]
    }

    fn secondary() -> Vec<Endpoint> {
        vec![Endpoint::new("s1", 80), Endpoint::new("s2", 80)]
    }

    #[tokio::test]
    async fn test_primary_candidates_come_first() {
        let composite = CompositeProvider::pair(
            Box::new(RandomizedProvider::new(primary())),
            Box::new(RandomizedProvider::new(secondary())),
        );

        for _ in 0..20 {
            let candidates = composite.endpoints(&Endpoint::new("p1", 80)).await;
            assert_eq!(candidates.len(), 5);
            assert!(candidates[..3].iter().all(|e| primary().contains(e)));
            assert!(candidates[3..].iter().all(|e| secondary().contains(e)));
        }
    }

    #[tokio::test]
    async fn test_null_secondary_adds_nothing() {
        let composite = CompositeProvider::pair(
            Box::new(StaticOrderedProvider::new(primary())),
            Box::new(NullProvider),
        );

        assert_eq!(composite.endpoints(&Endpoint::new("p1", 80)).await, primary());
    }

    #[test]
    fn test_supports_is_any_child() {
        let composite = CompositeProvider::pair(
            Box::new(StaticOrderedProvider::new(primary())),
            Box::new(StaticOrderedProvider::new(secondary())),
        );

        assert!(composite.supports(&Endpoint::new("p2", 80)));
        assert!(composite.supports(&Endpoint::new("s2", 80)));
        assert!(!composite.supports(&Endpoint::new("x", 80)));
        assert!(!CompositeProvider::new(Vec::new()).supports(&Endpoint::new("p2", 80)));
    }

    #[test]
    fn test_feedback_goes_to_first_supporting_child_only() {
        let first = RecordingProvider::new(vec![Endpoint::new("shared", 80)]);
        let second = RecordingProvider::new(vec![Endpoint::new("shared", 80), Endpoint::new("s1", 80)]);
        let composite = CompositeProvider::pair(Box::new(first.clone()), Box::new(second.clone()));

        composite.handle_failed_host(&Endpoint::new("shared", 80)).unwrap();
        composite.handle_failed_host(&Endpoint::new("s1", 80)).unwrap();

        assert_eq!(first.failures(), vec![Endpoint::new("shared", 80)]);
        assert_eq!(second.failures(), vec![Endpoint::new("s1", 80)]);
    }

    #[test]
    fn test_feedback_for_unclaimed_endpoint_is_ignored() {
        let composite = CompositeProvider::pair(Box::new(NullProvider), Box::new(NullProvider));
        assert!(composite.handle_failed_host(&Endpoint::new("10.0.0.1", 80)).is_ok());
    }
}
