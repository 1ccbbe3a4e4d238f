//! Providers over a fixed list of endpoints.

use super::EndpointProvider;
use crate::endpoint::Endpoint;
use crate::error::Result;
use async_trait::async_trait;
use tracing::{debug, info};

/// A configured list of endpoints shared by the static strategies.
#[derive(Debug, Clone, Default)]
pub struct StaticEndpoints {
    endpoints: Vec<Endpoint>,
}

impl StaticEndpoints {
    /// Wrap a list.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    /// The configured endpoints, in configured order.
    pub fn as_slice(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Whether `endpoint` names a configured host.
    ///
    /// Ports must match, except that a missing port on either side matches
    /// any port.
    pub fn has_host(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.iter().any(|candidate| {
            if candidate.host() != endpoint.host() {
                return false;
            }
            match (candidate.port(), endpoint.port()) {
                (Some(a), Some(b)) => a == b,
                _ => {
                    debug!(endpoint = %endpoint, "Using wildcard port");
                    true
                }
            }
        })
    }

    /// Failure feedback only gets logged.
    pub fn log_failure(&self, endpoint: &Endpoint) {
        info!(host = endpoint.host(), endpoint = %endpoint, "Host failed to respond correctly");
    }
}

/// Tries the configured endpoints in a fixed order.
#[derive(Debug, Clone)]
pub struct StaticOrderedProvider {
    endpoints: StaticEndpoints,
}

impl StaticOrderedProvider {
    /// Create a provider over `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints: StaticEndpoints::new(endpoints),
        }
    }
}

#[async_trait]
impl EndpointProvider for StaticOrderedProvider {
    async fn endpoints(&self, _supplied: &Endpoint) -> Vec<Endpoint> {
        self.endpoints.as_slice().to_vec()
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        self.endpoints.log_failure(endpoint);
        Ok(())
    }

    fn supports(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.has_host(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn nodes() -> Vec<Endpoint> {
        vec![
            Endpoint::new("node-1", 8080),
            Endpoint::new("node-2", 8080),
            Endpoint::new("node-3", 9090),
        ]
    }

    #[tokio::test]
    async fn test_returns_configured_order_every_call() {
        let provider = StaticOrderedProvider::new(nodes());
        let supplied = Endpoint::new("node-1", 8080);

        assert_eq!(provider.endpoints(&supplied).await, nodes());
        assert_eq!(provider.endpoints(&supplied).await, nodes());
    }

    #[rstest]
    #[case(Endpoint::new("node-1", 8080), true)]
    #[case(Endpoint::new("node-3", 9090), true)]
    #[case(Endpoint::new("node-1", 9090), false)]
    #[case(Endpoint::host_only("node-2"), true)]
    #[case(Endpoint::new("elsewhere", 8080), false)]
    fn test_supports(#[case] endpoint: Endpoint, #[case] expected: bool) {
        let provider = StaticOrderedProvider::new(nodes());
        assert_eq!(provider.supports(&endpoint), expected);
    }

    #[test]
    fn test_configured_endpoint_without_port_is_a_wildcard() {
        let provider = StaticOrderedProvider::new(vec![Endpoint::host_only("svc")]);
        assert!(provider.supports(&Endpoint::new("svc", 1234)));
    }

    #[tokio::test]
    async fn test_failure_feedback_does_not_change_order() {
        let provider = StaticOrderedProvider::new(nodes());
        provider.handle_failed_host(&Endpoint::new("node-1", 8080)).unwrap();

        assert_eq!(provider.endpoints(&Endpoint::new("node-1", 8080)).await, nodes());
    }
}
