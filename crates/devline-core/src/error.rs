//! Error type for a single API call

use std::time::Duration;

use crate::retry::jittered_backoff;

/// Outcome of a failed HTTP call, classified by status.
///
/// 404 on a paged endpoint means the user has no (more) data ("user done"),
/// so callers usually treat [`FetchError::NotFound`] as end-of-stream rather
/// than as a failure.
#[derive(Debug)]
pub enum FetchError {
    NotFound,
    RateLimited,
    Unauthorized,
    Server(u16),
    Unexpected(u16),
    /// Transport failure without a status (DNS, reset, timeout)
    Request(String),
    /// 200 but the body was not JSON
    Decode(String),
    /// 200 with an `"error"` key in the body
    ApiError(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("HTTP 404: user done"),
            Self::RateLimited => f.write_str("HTTP 429: too many requests"),
            Self::Unauthorized => f.write_str("HTTP 401: token rejected"),
            Self::Server(s) => write!(f, "HTTP {s}: server error"),
            Self::Unexpected(s) => write!(f, "HTTP {s}: unexpected status"),
            Self::Request(msg) => write!(f, "request failed: {msg}"),
            Self::Decode(msg) => write!(f, "invalid JSON: {msg}"),
            Self::ApiError(msg) => write!(f, "API error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Classify a non-200 status.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            429 => Self::RateLimited,
            401 => Self::Unauthorized,
            500..=599 => Self::Server(status),
            s => Self::Unexpected(s),
        }
    }

    /// Create request error from reqwest error, keeping the status if there is one
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        match e.status() {
            Some(s) => Self::from_status(s.as_u16()),
            // Strip URL: query strings may carry the access token
            None => Self::Request(e.without_url_message()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unauthorized | Self::Server(_) | Self::Request(_)
        )
    }

    pub fn is_user_done(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Wait before retry number `attempt` (0-based).
    ///
    /// Rate limits get a longer jitter window (5-10s) than transport errors (0-1s).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::RateLimited => jittered_backoff(attempt, 5.0..10.0),
            _ => jittered_backoff(attempt, 0.0..1.0),
        }
    }
}

/// Message of a reqwest error without the URL part.
trait WithoutUrl {
    fn without_url_message(&self) -> String;
}

impl WithoutUrl for reqwest::Error {
    fn without_url_message(&self) -> String {
        let kind = if self.is_timeout() {
            "timeout"
        } else if self.is_connect() {
            "connect"
        } else if self.is_body() {
            "body"
        } else if self.is_decode() {
            "decode"
        } else {
            "request"
        };
        match std::error::Error::source(self) {
            Some(src) => format!("{kind}: {src}"),
            None => kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_404_is_user_done() {
        let err = FetchError::from_status(404);
        assert!(err.is_user_done());
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_429_retryable() {
        let err = FetchError::from_status(429);
        assert!(matches!(err, FetchError::RateLimited));
        assert!(err.is_retryable());
    }

    #[test]
    fn status_401_retryable() {
        assert!(FetchError::from_status(401).is_retryable());
    }

    #[test]
    fn status_5xx_retryable() {
        assert!(matches!(FetchError::from_status(500), FetchError::Server(500)));
        assert!(FetchError::from_status(503).is_retryable());
    }

    #[test]
    fn status_403_unexpected_not_retryable() {
        let err = FetchError::from_status(403);
        assert!(matches!(err, FetchError::Unexpected(403)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn decode_and_api_errors_not_retryable() {
        assert!(!FetchError::Decode("eof".into()).is_retryable());
        assert!(!FetchError::ApiError("invalid_request".into()).is_retryable());
    }

    #[test]
    fn request_error_retryable() {
        assert!(FetchError::Request("connect".into()).is_retryable());
    }

    #[test]
    fn rate_limit_delay_window() {
        let d = FetchError::RateLimited.retry_delay(1);
        // 2^1 + [5, 10)
        assert!(d >= Duration::from_secs(7));
        assert!(d < Duration::from_secs(12));
    }

    #[test]
    fn request_delay_window() {
        let d = FetchError::Request("reset".into()).retry_delay(2);
        // 2^2 + [0, 1)
        assert!(d >= Duration::from_secs(4));
        assert!(d < Duration::from_secs(5));
    }

    #[test]
    fn display_messages() {
        assert_eq!(format!("{}", FetchError::NotFound), "HTTP 404: user done");
        assert_eq!(
            format!("{}", FetchError::Server(502)),
            "HTTP 502: server error"
        );
        assert!(format!("{}", FetchError::ApiError("x".into())).contains("API error"));
    }
}
