//! Host and port value type.

use crate::error::{ResilienceError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use url::Url;

/// A host, an optional port and an optional admin port.
///
/// Identity is host and port only: two endpoints that differ just in their
/// admin port are equal, hash the same and sort together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    admin_port: Option<u16>,
}

impl Endpoint {
    /// Create an endpoint with an explicit port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_parts(host, Some(port))
    }

    /// Create an endpoint without a port.
    pub fn host_only(host: impl Into<String>) -> Self {
        Self::from_parts(host, None)
    }

    /// Create an endpoint from a host and an optional port.
    pub fn from_parts(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
            admin_port: None,
        }
    }

    /// Create an IP-bound endpoint.
    pub fn from_ip(ip: IpAddr, port: Option<u16>) -> Self {
        Self::from_parts(ip.to_string(), port)
    }

    /// The logical endpoint a URL points at.
    ///
    /// The port is only present when the URL spells out a non-default one.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ResilienceError::invalid_request(format!("`{url}` has no host")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::from_parts(host, url.port()))
    }

    /// Set the admin port.
    #[must_use]
    pub fn with_admin_port(mut self, admin_port: u16) -> Self {
        self.admin_port = Some(admin_port);
        self
    }

    /// Fill in `port` if none is set.
    #[must_use]
    pub fn with_default_port(mut self, port: u16) -> Self {
        if self.port.is_none() {
            self.port = Some(port);
        }
        self
    }

    /// The host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The port, or `default` when none is set.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// Whether a port is set.
    pub fn has_port(&self) -> bool {
        self.port.is_some()
    }

    /// The admin port, falling back to the port.
    pub fn admin_port(&self) -> Option<u16> {
        self.admin_port.or(self.port)
    }

    /// The host as it must appear in a URL authority.
    pub fn url_host(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.host
            .cmp(&other.host)
            .then_with(|| self.port.cmp(&other.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.url_host(), port),
            None => f.write_str(&self.url_host()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ResilienceError;

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ResilienceError::InvalidEndpoint(s.to_string());
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, rest) = rest.split_once(']').ok_or_else(invalid)?;
            match rest {
                "" => (host, None),
                _ => (host, Some(rest.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else if s.parse::<Ipv6Addr>().is_ok() {
            (s, None)
        } else {
            match s.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = port
            .map(|p| p.parse::<u16>().map_err(|_| invalid()))
            .transpose()?;

        Ok(Self::from_parts(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_admin_port() {
        let a = Endpoint::new("node-1", 8080).with_admin_port(8081);
        let b = Endpoint::new("node-1", 8080).with_admin_port(9999);

        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_equality_uses_host_and_port() {
        assert_ne!(Endpoint::new("node-1", 8080), Endpoint::new("node-1", 8081));
        assert_ne!(Endpoint::new("node-1", 8080), Endpoint::new("node-2", 8080));
        assert_ne!(Endpoint::new("node-1", 8080), Endpoint::host_only("node-1"));
    }

    #[test]
    fn test_admin_port_defaults_to_port() {
        assert_eq!(Endpoint::new("node", 80).admin_port(), Some(80));
        assert_eq!(Endpoint::new("node", 80).with_admin_port(81).admin_port(), Some(81));
        assert_eq!(Endpoint::host_only("node").admin_port(), None);
    }

    #[test]
    fn test_ordering() {
        let mut endpoints = vec![
            Endpoint::new("b", 1),
            Endpoint::new("a", 2),
            Endpoint::new("a", 1),
        ];
        endpoints.sort();
        assert_eq!(
            endpoints,
            vec![Endpoint::new("a", 1), Endpoint::new("a", 2), Endpoint::new("b", 1)]
        );
    }

    #[test]
    fn test_with_default_port() {
        assert_eq!(Endpoint::host_only("h").with_default_port(80).port(), Some(80));
        assert_eq!(Endpoint::new("h", 9000).with_default_port(80).port(), Some(9000));
    }

    #[test]
    fn test_parse() {
        assert_eq!("svc:8080".parse::<Endpoint>().unwrap(), Endpoint::new("svc", 8080));
        assert_eq!("svc".parse::<Endpoint>().unwrap(), Endpoint::host_only("svc"));
        assert_eq!("[::1]:80".parse::<Endpoint>().unwrap(), Endpoint::new("::1", 80));
        assert_eq!("::1".parse::<Endpoint>().unwrap(), Endpoint::host_only("::1"));
        assert!("svc:notaport".parse::<Endpoint>().is_err());
        assert!(":80".parse::<Endpoint>().is_err());
        assert!("[::1".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Endpoint::new("svc", 8080).to_string(), "svc:8080");
        assert_eq!(Endpoint::host_only("svc").to_string(), "svc");
        assert_eq!(Endpoint::new("::1", 80).to_string(), "[::1]:80");
    }

    #[test]
    fn test_from_url() {
        let url = Url::parse("http://svc:9000/path").unwrap();
        assert_eq!(Endpoint::from_url(&url).unwrap(), Endpoint::new("svc", 9000));

        // The scheme default port is implicit.
        let url = Url::parse("http://svc:80/path").unwrap();
        assert_eq!(Endpoint::from_url(&url).unwrap(), Endpoint::host_only("svc"));

        let url = Url::parse("http://[::1]:9000/").unwrap();
        assert_eq!(Endpoint::from_url(&url).unwrap(), Endpoint::new("::1", 9000));
    }
}
