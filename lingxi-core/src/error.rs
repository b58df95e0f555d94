//! Error types for Lingxi operations

use thiserror::Error;

/// Result alias for anything that talks to the backend.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failure classes the client reacts to differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport failure, timeout, or an unreadable response.
    Network,
    /// 401 - recovered by a single refresh-and-retry.
    AuthExpired,
    /// 403 - out of token balance, never retried.
    Quota,
    /// 429 - surfaced distinctly, never retried.
    RateLimited,
    /// 500 on a destructive path; the caller decides whether it is benign.
    ServerInconsistency,
    /// Anything else.
    Other,
}

/// Errors surfaced at the backend boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication expired")]
    AuthExpired,

    #[error("Insufficient balance: {message}")]
    QuotaExceeded { message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request rejected with code {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not signed in")]
    NotAuthenticated,
}

impl ApiError {
    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthExpired,
            403 => Self::QuotaExceeded { message },
            429 => Self::RateLimited { message },
            _ => Self::Status { status, message },
        }
    }

    /// HTTP status this error was produced from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExpired => Some(401),
            Self::QuotaExceeded { .. } => Some(403),
            Self::RateLimited { .. } => Some(429),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) | Self::Timeout | Self::InvalidResponse(_) => FailureKind::Network,
            Self::AuthExpired | Self::NotAuthenticated => FailureKind::AuthExpired,
            Self::QuotaExceeded { .. } => FailureKind::Quota,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Status { status: 500, .. } => FailureKind::ServerInconsistency,
            Self::Status { .. } | Self::Rejected { .. } => FailureKind::Other,
        }
    }

    /// The server's own explanation, when it sent a non-empty one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::QuotaExceeded { message }
            | Self::RateLimited { message }
            | Self::Status { message, .. }
            | Self::Rejected { message, .. }
                if !message.is_empty() =>
            {
                Some(message.as_str())
            }
            _ => None,
        }
    }

    /// Text to show the learner. `fallback` names the failed operation.
    pub fn user_message(&self, fallback: &str) -> String {
        match self.kind() {
            FailureKind::Quota => "insufficient balance".to_string(),
            FailureKind::RateLimited => "rate limited".to_string(),
            _ => fallback.to_string(),
        }
    }
}
