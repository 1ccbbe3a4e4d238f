use super::EndpointProvider;
use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result};
use async_trait::async_trait;

/// Offers nothing and recognizes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProvider;

impl NullProvider {
    /// Create a null provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EndpointProvider for NullProvider {
    async fn endpoints(&self, _supplied: &Endpoint) -> Vec<Endpoint> {
        Vec::new()
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        Err(ResilienceError::UnmanagedEndpoint(endpoint.clone()))
    }

    fn supports(&self, _endpoint: &Endpoint) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_provider() {
        let provider = NullProvider::new();
        let endpoint = Endpoint::new("a", 1);

        assert!(provider.endpoints(&endpoint).await.is_empty());
        assert!(!provider.supports(&endpoint));
        assert!(matches!(
            provider.handle_failed_host(&endpoint),
            Err(ResilienceError::UnmanagedEndpoint(_))
        ));
    }
}
