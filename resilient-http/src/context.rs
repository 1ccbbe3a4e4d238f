//! Per-call request context.

use tokio_util::sync::CancellationToken;

/// What a caller hands the client alongside a request: the correlation id to
/// propagate and the token that cancels backoff waits.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    transaction_id: Option<String>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transaction id.
    #[must_use]
    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    /// Use `token` for cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The transaction id, without any `key=` prefix.
    pub fn transaction_id(&self) -> Option<&str> {
        let id = self.transaction_id.as_deref()?;
        let id = match id.split_once('=') {
            Some((_, value)) => value,
            None => id,
        };
        Some(id).filter(|id| !id.is_empty())
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
