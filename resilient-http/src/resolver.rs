//! Hostname to IP resolution.
//!
//! [`HostResolver`] is the raw lookup (mockable); [`EndpointResolver`] turns
//! endpoints into IP-bound endpoints and fails open when a lookup fails.

use crate::endpoint::Endpoint;
use async_trait::async_trait;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

const NODES_PER_HOSTNAME_GUESS: usize = 6;

/// Maps a hostname to its IP addresses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Look up every address for `host`.
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        let unique: IndexSet<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        Ok(unique.into_iter().collect())
    }
}

/// Resolver answering from a fixed table.
///
/// Unknown hosts fail with [`io::ErrorKind::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.table.insert(host.into(), ips.into_iter().collect());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.table.get(host).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}"))
        })
    }
}

/// Expands endpoints into IP-bound endpoints on the same port.
#[derive(Clone)]
pub struct EndpointResolver {
    hosts: Arc<dyn HostResolver>,
}

impl fmt::Debug for EndpointResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointResolver").finish_non_exhaustive()
    }
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::system()
    }
}

impl EndpointResolver {
    /// Create a resolver over the given lookup.
    pub fn new(hosts: impl HostResolver + 'static) -> Self {
        Self {
            hosts: Arc::new(hosts),
        }
    }

    /// Create a resolver using the operating system.
    pub fn system() -> Self {
        Self::new(SystemResolver)
    }

    /// Resolve one endpoint.
    ///
    /// A failed or empty lookup yields the endpoint itself.
    pub async fn resolve(&self, endpoint: &Endpoint) -> Vec<Endpoint> {
        match self.hosts.lookup(endpoint.host()).await {
            Ok(ips) if !ips.is_empty() => {
                debug!(host = endpoint.host(), addresses = ips.len(), "Resolved host");
                ips.into_iter()
                    .map(|ip| Endpoint::from_ip(ip, endpoint.port()))
                    .collect()
            }
            Ok(_) => {
                warn!(host = endpoint.host(), "Host resolved to no addresses");
                vec![endpoint.clone()]
            }
            Err(err) => {
                warn!(host = endpoint.host(), error = %err, "Unable to resolve host");
                vec![endpoint.clone()]
            }
        }
    }

    /// Resolve several endpoints into one de-duplicated list, keeping the
    /// order of first appearance.
    pub async fn resolve_all(&self, endpoints: &[Endpoint]) -> Vec<Endpoint> {
        let mut resolved = IndexSet::with_capacity(endpoints.len() * NODES_PER_HOSTNAME_GUESS);
        for endpoint in endpoints {
            resolved.extend(self.resolve(endpoint).await);
        }
        resolved.into_iter().collect()
    }
}
