//! Resilience strategies and the provider factory.

use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result};
use crate::provider::{
    BoxedProvider, DynamicDnsProvider, NullProvider, RandomizedIpProvider, RandomizedProvider,
    StaticOrderedProvider,
};
use crate::resolver::EndpointResolver;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How candidate endpoints are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResilienceStrategy {
    /// No hosts.
    #[serde(alias = "EMPTY_STRATEGY")]
    Empty,
    /// Configured hosts in fixed order.
    #[serde(alias = "SIMPLE_FAILOVER_STRATEGY")]
    SimpleFailover,
    /// Configured hosts in random order.
    #[default]
    #[serde(alias = "LOAD_BALANCED_STRATEGY")]
    LoadBalanced,
    /// Configured hosts resolved to IPs, in random order.
    #[serde(alias = "LOAD_BALANCED_IP_STRATEGY")]
    LoadBalancedIp,
    /// Whatever the requested host resolves to.
    #[serde(alias = "DYNAMIC_RANDOM_IP_STRATEGY")]
    DynamicRandomIp,
}

impl ResilienceStrategy {
    /// One-line description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Empty => "No hosts - for testing.",
            Self::SimpleFailover => "Tries in fixed sequence.",
            Self::LoadBalanced => "Tries using random host.",
            Self::LoadBalancedIp => "Resolves host names to IPs, then tries using a random IP.",
            Self::DynamicRandomIp => "Resolves host names to IPs on any feasible route.",
        }
    }

    /// Whether the strategy works without configured nodes.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::DynamicRandomIp)
    }
}

impl fmt::Display for ResilienceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::SimpleFailover => "simple_failover",
            Self::LoadBalanced => "load_balanced",
            Self::LoadBalancedIp => "load_balanced_ip",
            Self::DynamicRandomIp => "dynamic_random_ip",
        };
        f.write_str(name)
    }
}

/// Builds the provider for one node group.
#[derive(Debug, Clone, Default)]
pub struct ProviderFactory {
    strategy: ResilienceStrategy,
    use_admin_ports: bool,
    resolver: EndpointResolver,
}

impl ProviderFactory {
    /// Factory for `strategy`.
    pub fn new(strategy: ResilienceStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    /// Address nodes by their admin ports.
    #[must_use]
    pub fn using_admin_ports(mut self, use_admin_ports: bool) -> Self {
        self.use_admin_ports = use_admin_ports;
        self
    }

    /// Resolver for the IP-aware strategies.
    #[must_use]
    pub fn with_resolver(mut self, resolver: EndpointResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The strategy.
    pub fn strategy(&self) -> ResilienceStrategy {
        self.strategy
    }

    /// Build a provider over `nodes`.
    pub fn build(&self, nodes: &[Endpoint]) -> Result<BoxedProvider> {
        let nodes = self.convert(nodes);

        let provider: BoxedProvider = match self.strategy {
            ResilienceStrategy::DynamicRandomIp => {
                if !nodes.is_empty() {
                    return Err(ResilienceError::configuration(
                        "You should not provide default routes for use with a dynamic strategy",
                    ));
                }
                Box::new(DynamicDnsProvider::new(self.resolver.clone()))
            }
            _ if nodes.is_empty() => Box::new(NullProvider),
            ResilienceStrategy::Empty => Box::new(NullProvider),
            ResilienceStrategy::SimpleFailover => Box::new(StaticOrderedProvider::new(nodes)),
            ResilienceStrategy::LoadBalanced => Box::new(RandomizedProvider::new(nodes)),
            ResilienceStrategy::LoadBalancedIp => {
                Box::new(RandomizedIpProvider::new(nodes, self.resolver.clone()))
            }
        };
        Ok(provider)
    }

    fn convert(&self, nodes: &[Endpoint]) -> Vec<Endpoint> {
        nodes
            .iter()
            .map(|node| {
                if self.use_admin_ports {
                    Endpoint::from_parts(node.host(), node.admin_port())
                } else {
                    node.clone()
                }
            })
            .collect()
    }
}
