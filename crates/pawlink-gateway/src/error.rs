use thiserror::Error;

/// Failure of a chat / notification / alert operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not a participant")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    /// Short machine-readable code used in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not-found",
            Self::Forbidden => "forbidden",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "internal",
        }
    }

    /// Message safe to show a client. Storage details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Why a WebSocket handshake was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    #[error("token expired - please refresh")]
    Expired,

    #[error("invalid token")]
    Invalid,
}

/// Policy violation (RFC 6455).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Application-defined: the client should refresh its token and reconnect.
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;

impl AuthError {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Expired => CLOSE_TOKEN_EXPIRED,
            Self::MissingToken | Self::Invalid => CLOSE_POLICY_VIOLATION,
        }
    }
}
