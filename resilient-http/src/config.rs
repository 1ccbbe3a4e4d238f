//! Client configuration.
//!
//! The JSON form mirrors what services already ship:
//!
//! ```json
//! {
//!   "shortName": "content-api",
//!   "primaryNodes": ["http://content-a:8080:8081", "content-b:8080:8081"],
//!   "secondaryNodes": ["content-dr:8080"],
//!   "resilienceStrategy": "load_balanced",
//!   "continuation": { "type": "exponential_backoff", "maxAttempts": 4, "backoffMultiplierMs": 50 }
//! }
//! ```

use crate::continuation::{ContinuationPolicy, DefaultContinuationPolicy, ExponentialBackoffPolicy};
use crate::endpoint::Endpoint;
use crate::error::{ResilienceError, Result};
use crate::strategy::ResilienceStrategy;
use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const NODE_PATTERN: &str = r"^(https?://)?([^:]+)(:\d+)?(:\d+)?$";

/// Default whole-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;

/// Scheme shared by every node of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Protocol {
    /// URL scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Port used when a node names none.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which continuation policy a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContinuationConfig {
    /// Each candidate once.
    #[default]
    Default,
    /// Bounded attempts with exponential pauses.
    #[serde(rename_all = "camelCase")]
    ExponentialBackoff {
        /// Attempt budget.
        max_attempts: u32,
        /// Base pause in milliseconds.
        backoff_multiplier_ms: u64,
    },
}

impl ContinuationConfig {
    /// Build the policy.
    pub fn policy(&self) -> Arc<dyn ContinuationPolicy> {
        match *self {
            Self::Default => Arc::new(DefaultContinuationPolicy),
            Self::ExponentialBackoff {
                max_attempts,
                backoff_multiplier_ms,
            } => Arc::new(ExponentialBackoffPolicy::new(
                max_attempts,
                Duration::from_millis(backoff_multiplier_ms),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpointConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default)]
    primary_nodes: Vec<String>,
    #[serde(default)]
    secondary_nodes: Vec<String>,
    #[serde(default)]
    retry_non_idempotent_methods: bool,
    #[serde(default)]
    resilience_strategy: ResilienceStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_header: Option<String>,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    connect_timeout_ms: u64,
    #[serde(default)]
    continuation: ContinuationConfig,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Everything needed to build a resilient client for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "RawEndpointConfiguration",
    into = "RawEndpointConfiguration"
)]
pub struct EndpointConfiguration {
    short_name: Option<String>,
    path: String,
    protocol: Protocol,
    primary_nodes: Vec<Endpoint>,
    secondary_nodes: Vec<Endpoint>,
    retry_non_idempotent_methods: bool,
    resilience_strategy: ResilienceStrategy,
    transaction_header: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
    continuation: ContinuationConfig,
}

impl EndpointConfiguration {
    /// Parse node strings of the form `[http[s]://]host[:port[:adminPort]]`.
    ///
    /// Secondary nodes inherit the protocol of the primary ones.
    pub fn new<P, S>(short_name: Option<String>, primary: &[P], secondary: &[S]) -> Result<Self>
    where
        P: AsRef<str>,
        S: AsRef<str>,
    {
        let parser = NodeParser::new()?;
        let (primary_nodes, protocol) = parser.parse_group(primary, None)?;
        let (secondary_nodes, protocol) = parser.parse_group(secondary, protocol)?;

        Ok(Self {
            short_name,
            path: "/".to_owned(),
            protocol: protocol.unwrap_or_default(),
            primary_nodes,
            secondary_nodes,
            retry_non_idempotent_methods: false,
            resilience_strategy: ResilienceStrategy::default(),
            transaction_header: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            continuation: ContinuationConfig::default(),
        })
    }

    /// A single-node configuration for a local test server.
    ///
    /// The admin port is `port + 1`.
    pub fn for_testing(host: &str, port: u16) -> Self {
        Self {
            short_name: Some(format!("test-{host}-{port}")),
            path: "/".to_owned(),
            protocol: Protocol::Http,
            primary_nodes: vec![Endpoint::new(host, port).with_admin_port(port.saturating_add(1))],
            secondary_nodes: Vec::new(),
            retry_non_idempotent_methods: false,
            resilience_strategy: ResilienceStrategy::default(),
            transaction_header: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            continuation: ContinuationConfig::default(),
        }
    }

    /// Set the base path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Allow retrying POST and PATCH after a read timeout.
    #[must_use]
    pub fn with_retry_non_idempotent_methods(mut self, retry: bool) -> Self {
        self.retry_non_idempotent_methods = retry;
        self
    }

    /// Set the strategy.
    #[must_use]
    pub fn with_resilience_strategy(mut self, strategy: ResilienceStrategy) -> Self {
        self.resilience_strategy = strategy;
        self
    }

    /// Propagate the transaction id in `header`.
    #[must_use]
    pub fn with_transaction_header(mut self, header: impl Into<String>) -> Self {
        self.transaction_header = Some(header.into());
        self
    }

    /// Set the whole-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the continuation policy.
    #[must_use]
    pub fn with_continuation(mut self, continuation: ContinuationConfig) -> Self {
        self.continuation = continuation;
        self
    }

    /// Configured short name.
    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref()
    }

    /// Base path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Node protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Primary nodes.
    pub fn primary_nodes(&self) -> &[Endpoint] {
        &self.primary_nodes
    }

    /// Secondary nodes.
    pub fn secondary_nodes(&self) -> &[Endpoint] {
        &self.secondary_nodes
    }

    /// First primary node.
    pub fn first_node(&self) -> Option<&Endpoint> {
        self.primary_nodes.first()
    }

    /// Whether POST and PATCH are retried after a read timeout.
    pub fn retry_non_idempotent_methods(&self) -> bool {
        self.retry_non_idempotent_methods
    }

    /// The strategy.
    pub fn resilience_strategy(&self) -> ResilienceStrategy {
        self.resilience_strategy
    }

    /// Transaction propagation header.
    pub fn transaction_header(&self) -> Option<&str> {
        self.transaction_header.as_deref()
    }

    /// Whole-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Continuation policy.
    pub fn continuation(&self) -> ContinuationConfig {
        self.continuation
    }

    fn render_nodes(&self, nodes: &[Endpoint]) -> Vec<String> {
        let prefix = match self.protocol {
            Protocol::Http => String::new(),
            Protocol::Https => "https://".to_owned(),
        };
        nodes
            .iter()
            .map(|node| {
                let port = node.port_or(self.protocol.default_port());
                let admin = node.admin_port().unwrap_or(port);
                format!("{prefix}{}:{port}:{admin}", node.host())
            })
            .collect()
    }
}

impl TryFrom<RawEndpointConfiguration> for EndpointConfiguration {
    type Error = ResilienceError;

    fn try_from(raw: RawEndpointConfiguration) -> Result<Self> {
        let config = Self::new(
            raw.short_name,
            raw.primary_nodes.as_slice(),
            raw.secondary_nodes.as_slice(),
        )?;
        Ok(Self {
            path: raw.path.unwrap_or_else(|| "/".to_owned()),
            retry_non_idempotent_methods: raw.retry_non_idempotent_methods,
            resilience_strategy: raw.resilience_strategy,
            transaction_header: raw.transaction_header,
            timeout: Duration::from_millis(raw.timeout_ms),
            connect_timeout: Duration::from_millis(raw.connect_timeout_ms),
            continuation: raw.continuation,
            ..config
        })
    }
}

impl From<EndpointConfiguration> for RawEndpointConfiguration {
    fn from(config: EndpointConfiguration) -> Self {
        Self {
            primary_nodes: config.render_nodes(&config.primary_nodes),
            secondary_nodes: config.render_nodes(&config.secondary_nodes),
            short_name: config.short_name,
            path: Some(config.path),
            retry_non_idempotent_methods: config.retry_non_idempotent_methods,
            resilience_strategy: config.resilience_strategy,
            transaction_header: config.transaction_header,
            timeout_ms: u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
            connect_timeout_ms: u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            continuation: config.continuation,
        }
    }
}

struct NodeParser {
    pattern: Regex,
}

impl NodeParser {
    fn new() -> Result<Self> {
        let pattern = Regex::new(NODE_PATTERN)
            .map_err(|e| ResilienceError::configuration(format!("node pattern: {e}")))?;
        Ok(Self { pattern })
    }

    fn parse_group<S: AsRef<str>>(
        &self,
        raw: &[S],
        mut protocol: Option<Protocol>,
    ) -> Result<(Vec<Endpoint>, Option<Protocol>)> {
        let mut nodes = IndexSet::with_capacity(raw.len());
        for raw_node in raw {
            let raw_node = raw_node.as_ref().trim();
            let captures = self.pattern.captures(raw_node).ok_or_else(|| {
                ResilienceError::configuration(format!("`{raw_node}` is not a valid endpoint value."))
            })?;

            let node_protocol = captures.get(1).map(|m| match m.as_str() {
                "https://" => Protocol::Https,
                _ => Protocol::Http,
            });
            let group_protocol = match (protocol, node_protocol) {
                (Some(group), Some(node)) if group != node => {
                    return Err(ResilienceError::configuration(format!(
                        "All nodes in a group must use the same protocol ({group} conflicts with {raw_node})"
                    )));
                }
                (Some(group), _) => group,
                (None, node) => node.unwrap_or_default(),
            };
            protocol = Some(group_protocol);

            let host = captures.get(2).map_or("", |m| m.as_str());
            let port = match captures.get(3) {
                Some(m) => parse_port(&m.as_str()[1..], raw_node)?,
                None => group_protocol.default_port(),
            };
            let admin_port = match captures.get(4) {
                Some(m) => parse_port(&m.as_str()[1..], raw_node)?,
                None => port,
            };

            nodes.insert(Endpoint::new(host, port).with_admin_port(admin_port));
        }
        Ok((nodes.into_iter().collect(), protocol))
    }
}

fn parse_port(digits: &str, raw_node: &str) -> Result<u16> {
    digits
        .parse()
        .map_err(|_| ResilienceError::configuration(format!("`{raw_node}` has an invalid port")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(json: &str) -> Result<EndpointConfiguration> {
        serde_json::from_str(json).map_err(|e| ResilienceError::configuration(e.to_string()))
    }

    #[rstest]
    #[case("host", "host", 80, 80)]
    #[case("host:8080", "host", 8080, 8080)]
    #[case("host:8080:8081", "host", 8080, 8081)]
    #[case("http://host:8080:8081", "host", 8080, 8081)]
    #[case("https://host", "host", 443, 443)]
    #[case("  padded:1  ", "padded", 1, 1)]
    fn test_node_parsing(#[case] raw: &str, #[case] host: &str, #[case] port: u16, #[case] admin: u16) {
        let config = EndpointConfiguration::new::<_, &str>(None, &[raw], &[]).unwrap();
        let node = config.first_node().unwrap();

        assert_eq!(node.host(), host);
        assert_eq!(node.port(), Some(port));
        assert_eq!(node.admin_port(), Some(admin));
    }

    #[rstest]
    #[case("host:notaport")]
    #[case("host:1:2:3")]
    #[case("host:99999")]
    #[case("ftp://host")]
    fn test_invalid_nodes(#[case] raw: &str) {
        assert!(matches!(
            EndpointConfiguration::new::<_, &str>(None, &[raw], &[]),
            Err(ResilienceError::Configuration(_))
        ));
    }

    #[test]
    fn test_mixed_protocols_rejected() {
        let result = EndpointConfiguration::new::<_, &str>(None, &["http://a", "https://b"], &[]);
        assert!(matches!(result, Err(ResilienceError::Configuration(_))));

        let result = EndpointConfiguration::new(None, &["https://a"], &["http://b"]);
        assert!(matches!(result, Err(ResilienceError::Configuration(_))));
    }

    #[test]
    fn test_secondary_inherits_protocol() {
        let config = EndpointConfiguration::new(None, &["https://a"], &["b"]).unwrap();
        assert_eq!(config.protocol(), Protocol::Https);
        assert_eq!(config.secondary_nodes()[0].port(), Some(443));
    }

    #[test]
    fn test_duplicates_collapse() {
        let config = EndpointConfiguration::new::<_, &str>(None, &["a:1", "b:1", "a:1:9"], &[]).unwrap();
        assert_eq!(config.primary_nodes(), &[Endpoint::new("a", 1), Endpoint::new("b", 1)]);
    }

    #[test]
    fn test_json_defaults() {
        let config = parse(r#"{"primaryNodes": ["a:8080"]}"#).unwrap();

        assert_eq!(config.short_name(), None);
        assert_eq!(config.path(), "/");
        assert_eq!(config.resilience_strategy(), ResilienceStrategy::LoadBalanced);
        assert!(!config.retry_non_idempotent_methods());
        assert_eq!(config.timeout(), Duration::from_millis(5_000));
        assert_eq!(config.connect_timeout(), Duration::from_millis(1_000));
        assert_eq!(config.continuation(), ContinuationConfig::Default);
        assert!(config.secondary_nodes().is_empty());
    }

    #[test]
    fn test_json_full() {
        let config = parse(
            r#"{
                "shortName": "content",
                "path": "/content",
                "primaryNodes": ["a:8080:8081", "b:8080:8081"],
                "secondaryNodes": ["dr:8080"],
                "retryNonIdempotentMethods": true,
                "resilienceStrategy": "simple_failover",
                "transactionHeader": "X-Request-Id",
                "timeoutMs": 250,
                "connectTimeoutMs": 50,
                "continuation": {"type": "exponential_backoff", "maxAttempts": 4, "backoffMultiplierMs": 20}
            }"#,
        )
        .unwrap();

        assert_eq!(config.short_name(), Some("content"));
        assert_eq!(config.path(), "/content");
        assert_eq!(config.primary_nodes().len(), 2);
        assert_eq!(config.secondary_nodes(), &[Endpoint::new("dr", 8080)]);
        assert!(config.retry_non_idempotent_methods());
        assert_eq!(config.resilience_strategy(), ResilienceStrategy::SimpleFailover);
        assert_eq!(config.transaction_header(), Some("X-Request-Id"));
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(
            config.continuation(),
            ContinuationConfig::ExponentialBackoff {
                max_attempts: 4,
                backoff_multiplier_ms: 20
            }
        );
    }

    #[test]
    fn test_json_invalid_node_is_an_error() {
        assert!(parse(r#"{"primaryNodes": ["a:b:c:d"]}"#).is_err());
    }

    #[test]
    fn test_serializes_nodes_with_ports() {
        let config = EndpointConfiguration::new::<_, &str>(Some("svc".into()), &["a:1:2"], &[]).unwrap();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["primaryNodes"], serde_json::json!(["a:1:2"]));
        assert_eq!(json["shortName"], "svc");
        assert_eq!(json["continuation"], serde_json::json!({"type": "default"}));
    }

    #[test]
    fn test_for_testing() {
        let config = EndpointConfiguration::for_testing("localhost", 9000);

        assert_eq!(config.short_name(), Some("test-localhost-9000"));
        let node = config.first_node().unwrap();
        assert_eq!(node.port(), Some(9000));
        assert_eq!(node.admin_port(), Some(9001));
    }
}
