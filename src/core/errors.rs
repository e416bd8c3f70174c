use thiserror::Error;

/// Error taxonomy for the Sodex client.
///
/// API error codes are mapped onto the variants below when the response
/// envelope is unwrapped: 1001..=1013 are authentication failures, 429 is
/// throttling, everything else non-zero surfaces as `Api`.
#[derive(Error, Debug)]
pub enum SodexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {code} - {message}")]
    Api { code: i64, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

impl From<crate::core::config::ConfigError> for SodexError {
    fn from(err: crate::core::config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl SodexError {
    /// Map a non-zero Sodex envelope code to the matching variant.
    pub fn from_api_code(code: i64, message: String) -> Self {
        match code {
            1001..=1013 => Self::Authentication(message),
            429 => Self::RateLimit(message),
            _ => Self::Api { code, message },
        }
    }
}
