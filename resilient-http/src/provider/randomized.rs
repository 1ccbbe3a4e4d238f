//! Load-spreading providers.

use super::static_list::StaticEndpoints;
use super::EndpointProvider;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::resolver::EndpointResolver;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Draws random permutations by sampling without replacement.
struct Shuffler {
    rng: Mutex<StdRng>,
}

impl Shuffler {
    fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn permute(&self, mut remaining: Vec<Endpoint>) -> Vec<Endpoint> {
        let mut rng = self.rng.lock();
        let mut permutation = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let index = rng.gen_range(0..remaining.len());
            permutation.push(remaining.remove(index));
        }
        permutation
    }
}

/// Tries the configured endpoints in a random order.
pub struct RandomizedProvider {
    endpoints: StaticEndpoints,
    shuffler: Shuffler,
}

impl fmt::Debug for RandomizedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomizedProvider")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl RandomizedProvider {
    /// Create a provider over `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints: StaticEndpoints::new(endpoints),
            shuffler: Shuffler::from_entropy(),
        }
    }

    /// Create a provider with a deterministic random source.
    pub fn with_seed(endpoints: Vec<Endpoint>, seed: u64) -> Self {
        Self {
            endpoints: StaticEndpoints::new(endpoints),
            shuffler: Shuffler::seeded(seed),
        }
    }
}

#[async_trait]
impl EndpointProvider for RandomizedProvider {
    async fn endpoints(&self, _supplied: &Endpoint) -> Vec<Endpoint> {
        self.shuffler.permute(self.endpoints.as_slice().to_vec())
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        self.endpoints.log_failure(endpoint);
        Ok(())
    }

    fn supports(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.has_host(endpoint)
    }
}

/// Resolves the configured hosts to IPs on every call, then tries the IPs in
/// a random order.
///
/// `supports` answers against the configured (unresolved) list.
pub struct RandomizedIpProvider {
    endpoints: StaticEndpoints,
    resolver: EndpointResolver,
    shuffler: Shuffler,
}

impl fmt::Debug for RandomizedIpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomizedIpProvider")
            .field("endpoints", &self.endpoints)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl RandomizedIpProvider {
    /// Create a provider over `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>, resolver: EndpointResolver) -> Self {
        Self {
            endpoints: StaticEndpoints::new(endpoints),
            resolver,
            shuffler: Shuffler::from_entropy(),
        }
    }

    /// Create a provider with a deterministic random source.
    pub fn with_seed(endpoints: Vec<Endpoint>, resolver: EndpointResolver, seed: u64) -> Self {
        Self {
            endpoints: StaticEndpoints::new(endpoints),
            resolver,
            shuffler: Shuffler::seeded(seed),
        }
    }
}

#[async_trait]
impl EndpointProvider for RandomizedIpProvider {
    async fn endpoints(&self, _supplied: &Endpoint) -> Vec<Endpoint> {
        let resolved = self.resolver.resolve_all(self.endpoints.as_slice()).await;
        self.shuffler.permute(resolved)
    }

    fn handle_failed_host(&self, endpoint: &Endpoint) -> Result<()> {
        self.endpoints.log_failure(endpoint);
        Ok(())
    }

    fn supports(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.has_host(endpoint)
    }
}
