//! Client builder.

use crate::attempt::{AttemptLogger, HeaderFilter};
use crate::client::ResilientClient;
use crate::config::{EndpointConfiguration, Protocol, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_TIMEOUT_MS};
use crate::continuation::{ContinuationPolicy, DefaultContinuationPolicy};
use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result};
use crate::provider::{BoxedProvider, CompositeProvider, EndpointProvider, SharedProvider};
use crate::resolver::EndpointResolver;
use crate::stats::ClientStats;
use crate::strategy::{ProviderFactory, ResilienceStrategy};
use crate::transport::{ReqwestTransport, Transport};
use reqwest::header::HeaderName;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Header used by [`ResilientClientBuilder::with_transaction_propagation`].
pub const DEFAULT_TRANSACTION_HEADER: &str = "X-Request-Id";

/// Builder for [`ResilientClient`].
#[derive(Default)]
pub struct ResilientClientBuilder {
    short_name: Option<String>,
    configuration: Option<EndpointConfiguration>,
    primary_nodes: Vec<Endpoint>,
    secondary_nodes: Vec<Endpoint>,
    primary: Option<BoxedProvider>,
    secondary: Option<BoxedProvider>,
    strategy: ResilienceStrategy,
    use_admin_ports: bool,
    retry_non_idempotent_methods: bool,
    continuation: Option<Arc<dyn ContinuationPolicy>>,
    transaction_header: Option<String>,
    resolver: Option<EndpointResolver>,
    transport: Option<Arc<dyn Transport>>,
    protocol: Option<Protocol>,
    hidden_headers: Vec<String>,
}

impl fmt::Debug for ResilientClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClientBuilder")
            .field("short_name", &self.short_name)
            .field("strategy", &self.strategy)
            .field("primary_nodes", &self.primary_nodes)
            .field("secondary_nodes", &self.secondary_nodes)
            .field("use_admin_ports", &self.use_admin_ports)
            .finish_non_exhaustive()
    }
}

impl ResilientClientBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a single local test server.
    #[must_use]
    pub fn in_testing(host: &str, port: u16) -> Self {
        Self::new().using(EndpointConfiguration::for_testing(host, port))
    }

    /// Take nodes, strategy, retry flag, timeouts and continuation from
    /// `configuration`.
    #[must_use]
    pub fn using(mut self, configuration: EndpointConfiguration) -> Self {
        self.primary_nodes = configuration.primary_nodes().to_vec();
        self.secondary_nodes = configuration.secondary_nodes().to_vec();
        self.retry_non_idempotent_methods = configuration.retry_non_idempotent_methods();
        self.strategy = configuration.resilience_strategy();
        if self.continuation.is_none() {
            self.continuation = Some(configuration.continuation().policy());
        }
        if let Some(header) = configuration.transaction_header() {
            self.transaction_header = Some(header.to_owned());
        }
        self.configuration = Some(configuration);
        self
    }

    /// Use explicit node lists.
    #[must_use]
    pub fn using_nodes(mut self, primary: Vec<Endpoint>, secondary: Vec<Endpoint>) -> Self {
        self.primary_nodes = primary;
        self.secondary_nodes = secondary;
        self
    }

    /// Set the short name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.short_name = Some(name.into());
        self
    }

    /// Use `provider` instead of building one from primary nodes.
    #[must_use]
    pub fn with_primary(mut self, provider: impl EndpointProvider + 'static) -> Self {
        self.primary = Some(Box::new(provider));
        self
    }

    /// Chain `provider` after the primary one.
    #[must_use]
    pub fn with_secondary(mut self, provider: impl EndpointProvider + 'static) -> Self {
        self.secondary = Some(Box::new(provider));
        self
    }

    /// Set the strategy for node-built providers.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ResilienceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Fail over across whatever the requested host resolves to.
    #[must_use]
    pub fn using_dns(self) -> Self {
        self.with_strategy(ResilienceStrategy::DynamicRandomIp)
    }

    /// Address nodes by their admin ports.
    #[must_use]
    pub fn using_admin_ports(mut self) -> Self {
        self.use_admin_ports = true;
        self
    }

    /// Allow retrying POST and PATCH after a read timeout.
    #[must_use]
    pub fn retrying_non_idempotent_methods(mut self, retry: bool) -> Self {
        self.retry_non_idempotent_methods = retry;
        self
    }

    /// Set the continuation policy.
    #[must_use]
    pub fn with_continuation_policy(mut self, policy: impl ContinuationPolicy + 'static) -> Self {
        self.continuation = Some(Arc::new(policy));
        self
    }

    /// Propagate transaction ids in `X-Request-Id`.
    #[must_use]
    pub fn with_transaction_propagation(self) -> Self {
        self.with_transaction_header(DEFAULT_TRANSACTION_HEADER)
    }

    /// Propagate transaction ids in `header`.
    #[must_use]
    pub fn with_transaction_header(mut self, header: impl Into<String>) -> Self {
        self.transaction_header = Some(header.into());
        self
    }

    /// Resolver for the IP-aware strategies.
    #[must_use]
    pub fn with_resolver(mut self, resolver: EndpointResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Send through `transport` instead of a reqwest client.
    #[must_use]
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Override the protocol reported by the client.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Keep headers matching `pattern` (case-insensitive regex) out of logs.
    #[must_use]
    pub fn hiding_header(mut self, pattern: impl Into<String>) -> Self {
        self.hidden_headers.push(pattern.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ResilientClient> {
        let short_name = self.short_name()?;
        let resolver = self.resolver.clone().unwrap_or_default();
        let factory = ProviderFactory::new(self.strategy)
            .using_admin_ports(self.use_admin_ports)
            .with_resolver(resolver);

        let primary = match self.primary {
            Some(provider) => provider,
            None => {
                if self.primary_nodes.is_empty()
                    && !matches!(self.strategy, ResilienceStrategy::Empty | ResilienceStrategy::DynamicRandomIp)
                {
                    return Err(ResilienceError::configuration(format!(
                        "Missing provider configuration for {short_name}"
                    )));
                }
                factory.build(&self.primary_nodes)?
            }
        };

        let secondary = match self.secondary {
            Some(provider) => Some(provider),
            None if !self.secondary_nodes.is_empty() => Some(factory.build(&self.secondary_nodes)?),
            None => None,
        };

        let provider: BoxedProvider = match secondary {
            Some(secondary) => Box::new(CompositeProvider::pair(primary, secondary)),
            None => primary,
        };
        debug!(short_name = %short_name, strategy = %self.strategy, provider = ?provider, "Built provider");

        let transaction_header = self
            .transaction_header
            .as_deref()
            .map(|h| {
                HeaderName::from_bytes(h.as_bytes())
                    .map_err(|e| ResilienceError::configuration(format!("transaction header `{h}`: {e}")))
            })
            .transpose()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let (timeout, connect_timeout) = match &self.configuration {
                    Some(config) => (config.timeout(), config.connect_timeout()),
                    None => (
                        Duration::from_millis(DEFAULT_TIMEOUT_MS),
                        Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
                    ),
                };
                Arc::new(
                    ReqwestTransport::builder()
                        .timeout(timeout)
                        .connect_timeout(connect_timeout)
                        .build()?,
                )
            }
        };

        let protocol = self
            .protocol
            .or_else(|| self.configuration.as_ref().map(EndpointConfiguration::protocol))
            .unwrap_or_default();

        Ok(ResilientClient {
            logger: AttemptLogger::new(short_name.clone(), HeaderFilter::with_extra(self.hidden_headers.as_slice())?),
            short_name,
            protocol,
            transport,
            provider: SharedProvider::from_boxed(provider),
            continuation: self
                .continuation
                .unwrap_or_else(|| Arc::new(DefaultContinuationPolicy)),
            retry_non_idempotent_methods: self.retry_non_idempotent_methods,
            transaction_header,
            stats: Arc::new(ClientStats::new()),
        })
    }

    fn short_name(&self) -> Result<String> {
        if let Some(name) = &self.short_name {
            return Ok(name.clone());
        }
        let config = self
            .configuration
            .as_ref()
            .ok_or_else(|| ResilienceError::configuration("An explicit short name is required"))?;

        let name = match (config.short_name(), config.first_node()) {
            (Some(name), _) => name.to_owned(),
            (None, Some(node)) => {
                let port = if self.use_admin_ports {
                    node.admin_port()
                } else {
                    node.port()
                };
                format!("{}-{}", node.host(), port.unwrap_or(config.protocol().default_port()))
            }
            (None, None) => {
                return Err(ResilienceError::configuration("An explicit short name is required"));
            }
        };
        Ok(if self.use_admin_ports {
            format!("{name}-admin")
        } else {
            name
        })
    }
}
