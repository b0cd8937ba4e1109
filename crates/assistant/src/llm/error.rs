//! Error types for the model gateway.

use thiserror::Error;

/// Errors that can occur when calling the model endpoint.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not finish within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The endpoint returned an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the body.
        message: String,
    },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Failed to parse response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Client could not be built from the configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether a single retry may succeed: transport failures, timeouts and 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            Self::RateLimited(_) | Self::Unauthorized(_) | Self::Parse(_) | Self::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::RateLimited(30);
        assert_eq!(err.to_string(), "rate limited, retry after 30 seconds");

        let err = GatewayError::Api {
            status: 400,
            message: "max_tokens is too large".to_string(),
        };
        assert_eq!(err.to_string(), "API error (400): max_tokens is too large");
    }

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Timeout.is_transient());
        assert!(
            GatewayError::Api {
                status: 503,
                message: "overloaded".to_string()
            }
            .is_transient()
        );
        assert!(
            !GatewayError::Api {
                status: 422,
                message: "bad tools".to_string()
            }
            .is_transient()
        );
        assert!(!GatewayError::RateLimited(5).is_transient());
        assert!(!GatewayError::Unauthorized("bad key".to_string()).is_transient());
    }
}
