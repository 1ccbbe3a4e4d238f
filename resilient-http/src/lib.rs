//! # resilient-http
//!
//! Endpoint failover, retries and backoff in front of an HTTP transport.
//!
//! A [`ResilientClient`] sends each request to a logical endpoint. An
//! [`EndpointProvider`] expands that endpoint into concrete candidates, a
//! [`ContinuationPolicy`] decides which candidate to try next and how long
//! to wait, and the client fails over on connection errors and on
//! `500`/`503`/`504` responses.
//!
//! ## Core Concepts
//!
//! - **[`Endpoint`]**: Host, optional port and admin port
//! - **[`EndpointProvider`]**: Candidate endpoints plus failure feedback
//! - **[`ContinuationPolicy`]**: Per-request candidate iteration and backoff
//! - **[`ResilienceStrategy`]**: Which provider to build from configured nodes
//! - **[`EndpointConfiguration`]**: Serializable client configuration
//! - **[`Transport`]**: Sends one HTTP attempt
//!
//! ## Strategies
//!
//! - [`ResilienceStrategy::SimpleFailover`]: Configured nodes in order
//! - [`ResilienceStrategy::LoadBalanced`]: Configured nodes shuffled per request
//! - [`ResilienceStrategy::LoadBalancedIp`]: Configured nodes resolved to IPs, shuffled
//! - [`ResilienceStrategy::DynamicRandomIp`]: The requested host's IPs
//! - [`ResilienceStrategy::Empty`]: Nothing, for tests
//!
//! ## Example
//!
//! ```ignore
//! use resilient_http::prelude::*;
//! use std::time::Duration;
//!
//! let config: EndpointConfiguration = serde_json::from_str(r#"{
//!     "shortName": "content",
//!     "resilienceStrategy": "simple_failover",
//!     "primaryNodes": ["content-1:8080", "content-2:8080"]
//! }"#)?;
//!
//! let client = ResilientClient::builder()
//!     .using(config)
//!     .with_continuation_policy(ExponentialBackoffPolicy::new(3, Duration::from_millis(100)))
//!     .build()?;
//!
//! let response = client.send(HttpRequest::get("http://content-1:8080/items")?).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod attempt;
pub mod builder;
pub mod client;
pub mod config;
pub mod context;
pub mod continuation;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod mock;
pub mod provider;
pub mod resolver;
pub mod stats;
pub mod strategy;
pub mod transport;

// Re-exports
pub use attempt::{AttemptLogger, HeaderFilter};
pub use builder::{ResilientClientBuilder, DEFAULT_TRANSACTION_HEADER};
pub use client::{is_idempotent, is_recoverable, ResilientClient};
pub use config::{ContinuationConfig, EndpointConfiguration, Protocol};
pub use context::RequestContext;
pub use continuation::{
    ContinuationPolicy, ContinuationSession, DefaultContinuationPolicy, ExponentialBackoffPolicy,
};
pub use endpoint::Endpoint;
pub use error::{ResilienceError, Result, TimeoutPhase, TransportError};
pub use http::{HttpRequest, HttpResponse, ResponseBody};
pub use provider::{
    BoxedProvider, CompositeProvider, DynamicDnsProvider, EndpointProvider, NullProvider,
    RandomizedIpProvider, RandomizedProvider, SharedProvider, StaticOrderedProvider,
};
pub use resolver::{EndpointResolver, HostResolver, StaticResolver, SystemResolver};
pub use stats::{ClientStats, RequestStats, StatsSnapshot};
pub use strategy::{ProviderFactory, ResilienceStrategy};
pub use transport::{ReqwestTransport, ReqwestTransportBuilder, Transport};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        Endpoint, EndpointConfiguration, EndpointProvider, ExponentialBackoffPolicy, HttpRequest,
        HttpResponse, RequestContext, ResilienceError, ResilienceStrategy, ResilientClient,
        Result,
    };
}
