//! Error types for authentication operations

/// Errors from authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("redirect state does not match the sign-in attempt")]
    StateMismatch,

    #[error("no sign-in attempt in flight")]
    PkceMissing,

    #[error("identity provider returned an error: {0}")]
    Provider(String),

    #[error("sign-in flow cannot accept this event: {0}")]
    FlowState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

impl Error {
    /// Whether a refresh attempt hitting this error is worth retrying.
    /// Credential rejection and anti-CSRF failures are permanent; transport
    /// and server-side failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::InvalidCredentials(_) | Error::StateMismatch | Error::PkceMissing => false,
            Error::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Error::Http(_) | Error::Exchange(_) | Error::UnexpectedResponse(_) => true,
            _ => false,
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
