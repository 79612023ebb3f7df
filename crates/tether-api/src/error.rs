/// Errors from the request/response backend. Classified so callers can
/// decide whether a retry action makes sense.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn from_status(status: u16, body: String) -> Self {
        Self::Status { status, body }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ApiError::Network("connection refused".into()).is_retryable());
        assert!(ApiError::from_status(429, "slow down".into()).is_retryable());
        assert!(ApiError::from_status(500, "internal".into()).is_retryable());
        assert!(ApiError::from_status(503, "unavailable".into()).is_retryable());
    }

    #[test]
    fn client_errors_not_retryable() {
        assert!(!ApiError::from_status(400, "bad request".into()).is_retryable());
        assert!(!ApiError::from_status(404, "not found".into()).is_retryable());
        assert!(!ApiError::Decode("missing field".into()).is_retryable());
    }

    #[test]
    fn display_includes_status_and_body() {
        let err = ApiError::from_status(502, "bad gateway".into());
        let text = err.to_string();
        assert!(text.contains("502"));
        assert!(text.contains("bad gateway"));
    }
}
