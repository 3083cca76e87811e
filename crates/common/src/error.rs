use thiserror::Error;

/// Error taxonomy for the onion transport and resolver
#[derive(Debug, Error)]
pub enum OnionError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error("{op} failed: {reason}")]
    ClientUnavailable { op: &'static str, reason: String },

    #[error("onion address does not match: requested {requested}, got {returned}")]
    IdentityMismatch { requested: String, returned: String },

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("upgrade failed: {0}")]
    Upgrade(String),

    #[error("resolve error: {0}")]
    Resolve(String),

    #[error("SOCKS error: {0}")]
    Socks(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for onion transport operations
pub type Result<T> = std::result::Result<T, OnionError>;

impl OnionError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedAddress(msg.into())
    }

    pub fn client_unavailable(op: &'static str, reason: impl ToString) -> Self {
        Self::ClientUnavailable {
            op,
            reason: reason.to_string(),
        }
    }

    pub fn resolve(msg: impl Into<String>) -> Self {
        Self::Resolve(msg.into())
    }

    /// True when the caller gave up rather than the operation failing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}

/// Why a caller context stopped waiting
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl From<ContextError> for OnionError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => Self::Canceled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<crate::MultiaddrError> for OnionError {
    fn from(err: crate::MultiaddrError) -> Self {
        Self::MalformedAddress(err.to_string())
    }
}
