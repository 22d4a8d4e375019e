use thiserror::Error;

/// Failures surfaced by the source API boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("401 unauthorized")]
    Unauthorized,
    #[error("429 too many requests")]
    RateLimited,
    #[error("503 service unavailable")]
    Unavailable,
    #[error("204 no content")]
    NoContent,
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// How the pipeline reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retried with exponential backoff, bounded.
    Transient,
    /// Token is refreshed, then the call is retried a bounded number of times.
    AuthExpired,
    /// Valid but empty answer: zero output for this unit of work.
    Empty,
    /// Skip the item, no retry.
    Timeout,
    Unexpected,
}

impl ApiError {
    /// Maps an HTTP status onto an error, `None` for success statuses other
    /// than 204.
    pub fn from_status(status: u16, body: impl Into<String>) -> Option<Self> {
        match status {
            204 => Some(ApiError::NoContent),
            200..=299 => None,
            401 => Some(ApiError::Unauthorized),
            429 => Some(ApiError::RateLimited),
            503 => Some(ApiError::Unavailable),
            408 | 504 => Some(ApiError::Timeout),
            _ => Some(ApiError::Status {
                status,
                body: body.into(),
            }),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            ApiError::RateLimited | ApiError::Unavailable => FailureClass::Transient,
            ApiError::Unauthorized => FailureClass::AuthExpired,
            ApiError::NoContent => FailureClass::Empty,
            ApiError::Timeout => FailureClass::Timeout,
            ApiError::Status { .. } | ApiError::Transport(_) | ApiError::Decode(_) => {
                FailureClass::Unexpected
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ApiError::Timeout;
        }
        if e.is_decode() {
            return ApiError::Decode(e.to_string());
        }
        match e.status().map(|s| s.as_u16()) {
            Some(status) => ApiError::from_status(status, e.to_string())
                .unwrap_or_else(|| ApiError::Transport(e.to_string())),
            None => ApiError::Transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classes() {
        assert!(ApiError::from_status(200, "").is_none());
        assert_eq!(
            ApiError::from_status(204, "").unwrap().class(),
            FailureClass::Empty
        );
        assert_eq!(
            ApiError::from_status(401, "").unwrap().class(),
            FailureClass::AuthExpired
        );
        assert_eq!(
            ApiError::from_status(429, "").unwrap().class(),
            FailureClass::Transient
        );
        assert_eq!(
            ApiError::from_status(503, "").unwrap().class(),
            FailureClass::Transient
        );
        assert_eq!(
            ApiError::from_status(500, "boom").unwrap().class(),
            FailureClass::Unexpected
        );
    }
}
