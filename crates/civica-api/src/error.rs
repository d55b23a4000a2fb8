//! Caller-facing error taxonomy
//!
//! Every API failure surfaces as one of these variants so screens can render
//! a uniform dismissible notice with an optional retry. `classify_status`
//! centralizes the HTTP mapping; transport failures come in through the
//! `From<reqwest::Error>` impl.

/// Errors surfaced by the authenticated API layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("connectivity failure: {0}")]
    Connectivity(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Whether re-invoking the same operation can reasonably succeed.
    /// Drives the retry affordance on the error notice.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout
                | ApiError::Connectivity(_)
                | ApiError::RateLimited(_)
                | ApiError::Server { .. }
                | ApiError::Io(_)
        )
    }

    /// Stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ApiError::Timeout => "timeout",
            ApiError::Connectivity(_) => "connectivity",
            ApiError::Validation(_) => "validation",
            ApiError::Authentication(_) => "authentication",
            ApiError::Authorization(_) => "authorization",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited(_) => "rate_limit",
            ApiError::Server { .. } => "server",
            ApiError::Io(_) => "io",
            ApiError::Unknown(_) => "unknown",
        }
    }
}

/// Map a non-success HTTP status and server message into the taxonomy.
pub fn classify_status(status: u16, message: &str) -> ApiError {
    match status {
        400 | 422 => ApiError::Validation(message.to_owned()),
        401 => ApiError::Authentication(message.to_owned()),
        403 => ApiError::Authorization(message.to_owned()),
        404 => ApiError::NotFound(message.to_owned()),
        408 => ApiError::Timeout,
        409 => ApiError::Conflict(message.to_owned()),
        429 => ApiError::RateLimited(message.to_owned()),
        500..=599 => ApiError::Server {
            status,
            message: message.to_owned(),
        },
        _ => ApiError::Unknown(format!("HTTP {status}: {message}")),
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::Connectivity(e.to_string())
        } else if e.is_body() || e.is_decode() {
            ApiError::Io(e.to_string())
        } else {
            ApiError::Unknown(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_400_validation() {
        assert_eq!(
            classify_status(400, "email is malformed"),
            ApiError::Validation("email is malformed".into())
        );
    }

    #[test]
    fn classify_401_authentication() {
        assert!(matches!(
            classify_status(401, "token expired"),
            ApiError::Authentication(_)
        ));
    }

    #[test]
    fn classify_403_authorization() {
        assert!(matches!(
            classify_status(403, "not yours"),
            ApiError::Authorization(_)
        ));
    }

    #[test]
    fn classify_404_not_found() {
        assert!(matches!(
            classify_status(404, "no quiz for that date"),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn classify_408_timeout() {
        assert_eq!(classify_status(408, "slow"), ApiError::Timeout);
    }

    #[test]
    fn classify_409_conflict() {
        assert!(matches!(
            classify_status(409, "session already started"),
            ApiError::Conflict(_)
        ));
    }

    #[test]
    fn classify_429_rate_limited() {
        assert!(matches!(
            classify_status(429, "slow down"),
            ApiError::RateLimited(_)
        ));
    }

    #[test]
    fn classify_5xx_server() {
        for status in [500, 502, 503, 504] {
            assert!(
                matches!(
                    classify_status(status, "boom"),
                    ApiError::Server { status: s, .. } if s == status
                ),
                "status {status}"
            );
        }
    }

    #[test]
    fn classify_unmapped_is_unknown() {
        assert!(matches!(classify_status(418, "teapot"), ApiError::Unknown(_)));
    }

    #[test]
    fn retryable_split() {
        assert!(ApiError::Timeout.is_retryable());
        assert!(ApiError::Connectivity("reset".into()).is_retryable());
        assert!(
            ApiError::Server {
                status: 503,
                message: "maintenance".into()
            }
            .is_retryable()
        );
        assert!(!ApiError::Validation("bad".into()).is_retryable());
        assert!(!ApiError::Authentication("expired".into()).is_retryable());
        assert!(!ApiError::NotFound("gone".into()).is_retryable());
    }
}
