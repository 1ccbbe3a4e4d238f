//! Endpoint providers.
//!
//! A provider turns the endpoint a caller asked for into an ordered list of
//! candidate endpoints, receives feedback about failed candidates and says
//! whether it recognizes an endpoint at all.
//!
//! - [`NullProvider`]: never offers anything
//! - [`StaticOrderedProvider`]: fixed list, fixed order (pure failover)
//! - [`RandomizedProvider`]: fixed list, fresh random permutation per call
//! - [`RandomizedIpProvider`]: fixed list expanded to IPs, then permuted
//! - [`DynamicDnsProvider`]: re-resolves the requested host on every call
//! - [`CompositeProvider`]: primary/secondary chains of the above

mod composite;
mod dns;
mod null;
mod randomized;
mod static_list;

pub use composite::CompositeProvider;
pub use dns::DynamicDnsProvider;
pub use null::NullProvider;
pub use randomized::{RandomizedIpProvider, RandomizedProvider};
pub use static_list::{StaticEndpoints, StaticOrderedProvider};

use crate::endpoint::Endpoint;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Source of candidate endpoints.
#[async_trait]
pub trait EndpointProvider: Send + Sync + fmt::Debug {
    /// Candidates for `supplied`, in the order they should be tried.
    ///
    /// Every call produces a fresh, finite list.
    async fn endpoints(&self, supplied: &Endpoint) -> Vec<Endpoint>;

    /// Feedback that a request to `endpoint` failed.
    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()>;

    /// Whether `endpoint` is one this provider can stand in for.
    fn supports(&self, endpoint: &Endpoint) -> bool;
}

/// Boxed provider.
pub type BoxedProvider = Box<dyn EndpointProvider>;

/// A provider shared by every request of one client.
///
/// Failure feedback is serialized through a single lock per provider.
pub struct SharedProvider {
    provider: BoxedProvider,
    feedback: Mutex<()>,
}

impl fmt::Debug for SharedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedProvider")
            .field("provider", &self.provider)
            .finish()
    }
}

impl SharedProvider {
    /// Share a provider.
    pub fn new(provider: impl EndpointProvider + 'static) -> Arc<Self> {
        Self::from_boxed(Box::new(provider))
    }

    /// Share an already boxed provider.
    pub fn from_boxed(provider: BoxedProvider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            feedback: Mutex::new(()),
        })
    }

    /// Candidates for `supplied`.
    pub async fn endpoints(&self, supplied: &Endpoint) -> Vec<Endpoint> {
        self.provider.endpoints(supplied).await
    }

    /// Whether the provider recognizes `endpoint`.
    pub fn supports(&self, endpoint: &Endpoint) -> bool {
        self.provider.supports(endpoint)
    }

    /// Report a failed endpoint while holding the feedback lock.
    pub fn report_failure(&self, endpoint: &Endpoint) -> Result<()> {
        let _guard = self.feedback.lock();
        self.provider.handle_failed_host(endpoint)
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &dyn EndpointProvider {
        self.provider.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingProvider;
    use std::thread;

    #[test]
    fn test_concurrent_reports_are_all_delivered() {
        let recording = RecordingProvider::new(vec![Endpoint::new("a", 1)]);
        let shared = SharedProvider::new(recording.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..50 {
                        shared.report_failure(&Endpoint::new("a", 1)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(recording.failures().len(), 400);
    }

    #[tokio::test]
    async fn test_delegates_to_provider() {
        let shared = SharedProvider::new(StaticOrderedProvider::new(vec![Endpoint::new("a", 1)]));

        assert!(shared.supports(&Endpoint::new("a", 1)));
        assert!(!shared.supports(&Endpoint::new("b", 1)));
        assert_eq!(
            shared.endpoints(&Endpoint::new("a", 1)).await,
            vec![Endpoint::new("a", 1)]
        );
    }
}
