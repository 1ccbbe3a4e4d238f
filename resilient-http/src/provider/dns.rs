//! DNS-driven provider.

use super::EndpointProvider;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::resolver::EndpointResolver;
use async_trait::async_trait;
use tracing::info;

/// Fails over across whatever addresses DNS currently returns for the
/// requested host, in the order DNS returns them.
#[derive(Debug, Clone)]
pub struct DynamicDnsProvider {
    resolver: EndpointResolver,
}

impl DynamicDnsProvider {
    /// Create a provider over `resolver`.
    pub fn new(resolver: EndpointResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl EndpointProvider for DynamicDnsProvider {
    async fn endpoints(&self, supplied: &Endpoint) -> Vec<Endpoint> {
        self.resolver.resolve(supplied).await
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        info!(host = endpoint.host(), endpoint = %endpoint, "Host failed to respond correctly");
        Ok(())
    }

    /// There is no fixed set of routes to check against.
    fn supports(&self, _endpoint: &Endpoint) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MockHostResolver, StaticResolver};
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_resolves_on_every_call() {
        let mut hosts = MockHostResolver::new();
        hosts
            .expect_lookup()
            .times(2)
            .returning(|_| Ok(vec![IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1))]));
        let provider = DynamicDnsProvider::new(EndpointResolver::new(hosts));
        let supplied = Endpoint::new("svc.internal", 8080);

        assert_eq!(provider.endpoints(&supplied).await, vec![Endpoint::new("10.1.1.1", 8080)]);
        assert_eq!(provider.endpoints(&supplied).await, vec![Endpoint::new("10.1.1.1", 8080)]);
    }

    #[tokio::test]
    async fn test_preserves_resolver_order() {
        let ips = [
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        ];
        let provider = DynamicDnsProvider::new(EndpointResolver::new(
            StaticResolver::new().with_host("svc", ips),
        ));

        let candidates = provider.endpoints(&Endpoint::new("svc", 80)).await;

        assert_eq!(
            candidates,
            vec![
                Endpoint::new("10.0.0.3", 80),
                Endpoint::new("10.0.0.1", 80),
                Endpoint::new("10.0.0.2", 80),
            ]
        );
    }

    #[test]
    fn test_supports_anything() {
        let provider = DynamicDnsProvider::new(EndpointResolver::new(StaticResolver::new()));
        assert!(provider.supports(&Endpoint::new("anything.example", 1)));
        assert!(provider.handle_failed_host(&Endpoint::new("x", 1)).is_ok());
    }
}
