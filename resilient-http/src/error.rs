//! Error types.
//!
//! [`TransportError`] describes what went wrong while talking to one
//! endpoint; [`ResilienceError`] is what callers of the client see.

use crate::endpoint::Endpoint;
use std::fmt;
use std::io;
use thiserror::Error;

/// Which phase of an exchange ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Establishing the connection.
    Connect,
    /// Waiting for the response after the request was written.
    Read,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Read => f.write_str("read"),
        }
    }
}

/// Failure raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O failure talking to the endpoint.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// The exchange timed out.
    #[error("{0} timed out")]
    Timeout(TimeoutPhase),

    /// Another transport error with added context.
    #[error("{context}: {source}")]
    Wrapped {
        /// What the transport was doing.
        context: String,
        /// The wrapped failure.
        #[source]
        source: Box<TransportError>,
    },

    /// Anything that is not an I/O problem (bad request construction,
    /// decoding, misconfiguration).
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    /// Create an I/O error.
    pub fn io(kind: io::ErrorKind, msg: impl Into<String>) -> Self {
        Self::Io(io::Error::new(kind, msg.into()))
    }

    /// Create a read timeout.
    pub fn read_timeout() -> Self {
        Self::Timeout(TimeoutPhase::Read)
    }

    /// Create a connect timeout.
    pub fn connect_timeout() -> Self {
        Self::Timeout(TimeoutPhase::Connect)
    }

    /// Create a non-I/O error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(anyhow::anyhow!(msg.into()))
    }

    /// Wrap this error with context.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Self::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Peel off every [`TransportError::Wrapped`] layer.
    pub fn root_cause(&self) -> &TransportError {
        let mut cause = self;
        while let Self::Wrapped { source, .. } = cause {
            cause = source;
        }
        cause
    }

    /// Whether the root cause is an I/O failure (timeouts included).
    pub fn is_io(&self) -> bool {
        matches!(self.root_cause(), Self::Io(_) | Self::Timeout(_))
    }

    /// Whether the remote side may already have processed the request.
    ///
    /// Only read timeouts qualify: the request left, but nothing came back.
    pub fn is_remote_state_uncertain(&self) -> bool {
        match self.root_cause() {
            Self::Timeout(phase) => *phase == TimeoutPhase::Read,
            Self::Io(err) => {
                err.kind() == io::ErrorKind::TimedOut
                    && err.to_string().to_ascii_lowercase().contains("read")
            }
            _ => false,
        }
    }
}

/// Errors returned by the resilient client and its building blocks.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The client or one of its providers is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request targets an endpoint no configured provider recognizes.
    #[error("Unknown host and port {0}")]
    UnknownEndpoint(Endpoint),

    /// A failure was reported for an endpoint the provider never offered.
    #[error("Not a managed node: {0}")]
    UnmanagedEndpoint(Endpoint),

    /// An endpoint string could not be parsed.
    #[error("Invalid endpoint `{0}`")]
    InvalidEndpoint(String),

    /// The request itself cannot be sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The last transport failure observed for the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A provider produced something it never should.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The continuation session was asked for a host it cannot give.
    #[error("No more endpoints available after {attempts} attempts")]
    SessionExhausted {
        /// Hosts handed out before exhaustion.
        attempts: u32,
    },

    /// The request finished without a single attempt being made.
    #[error("Request failed: no attempt was made")]
    NoAttempts,
}

impl ResilienceError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// The transport failure behind this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for resilient client operations.
pub type Result<T> = std::result::Result<T, ResilienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_layers() {
        let err = TransportError::read_timeout()
            .wrap("executing request")
            .wrap("client handler");

        assert!(matches!(
            err.root_cause(),
            TransportError::Timeout(TimeoutPhase::Read)
        ));
        assert!(err.is_io());
        assert!(err.is_remote_state_uncertain());
    }

    #[test]
    fn test_io_classification() {
        assert!(TransportError::io(io::ErrorKind::ConnectionRefused, "refused").is_io());
        assert!(TransportError::connect_timeout().is_io());
        assert!(!TransportError::other("bad header").is_io());
        assert!(!TransportError::other("bad header").wrap("ctx").is_io());
    }

    #[test]
    fn test_remote_state_uncertainty() {
        assert!(TransportError::io(io::ErrorKind::TimedOut, "Read timed out").is_remote_state_uncertain());
        assert!(!TransportError::io(io::ErrorKind::TimedOut, "connect timed out").is_remote_state_uncertain());
        assert!(!TransportError::connect_timeout().is_remote_state_uncertain());
        assert!(!TransportError::io(io::ErrorKind::ConnectionReset, "reset").is_remote_state_uncertain());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransportError::read_timeout().to_string(), "read timed out");
        assert_eq!(
            TransportError::connect_timeout().wrap("sending").to_string(),
            "sending: connect timed out"
        );

        let err = ResilienceError::UnknownEndpoint(Endpoint::new("foreign", 9000));
        assert_eq!(err.to_string(), "Unknown host and port foreign:9000");
    }

    #[test]
    fn test_transport_accessor() {
        let err: ResilienceError = TransportError::read_timeout().into();
        assert!(err.transport().is_some());
        assert!(ResilienceError::NoAttempts.transport().is_none());
    }
}
