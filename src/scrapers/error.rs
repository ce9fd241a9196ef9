//! Fetch error types.

use thiserror::Error;

/// Failure to acquire a page. Fatal for that page, not for the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("Timed out after {secs}s fetching {url}")]
    Timeout { url: String, secs: u64 },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("Browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Browser(_) => false,
        }
    }

    pub(crate) fn network(url: &str, err: impl std::fmt::Display) -> Self {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let status = |status| FetchError::Status {
            url: "https://example.org".into(),
            status,
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(FetchError::network("https://example.org", "reset").is_retryable());
        assert!(!FetchError::Browser("no chrome".into()).is_retryable());
    }
}
