use secrecy::{ExposeSecret, Secret};
use std::env;
use thiserror::Error;

const DEFAULT_SPOT_REST_URL: &str = "https://gateway.sodex.dev";
const DEFAULT_SPOT_REST_URL_EXT: &str = "https://gateway.sodex.dev";
const DEFAULT_SPOT_WS_URL: &str = "wss://gateway.sodex.dev/spot/ws";
const DEFAULT_FUTURES_REST_URL: &str = "https://tiger-gateway.sodex.dev";
const DEFAULT_FUTURES_WS_URL: &str = "wss://tiger-gateway.sodex.dev/fut/ws";

/// Explicit client configuration.
///
/// Credentials are held behind [`Secret`] so they never leak through `Debug`
/// output. There is deliberately no process-wide configuration singleton:
/// construct one of these and hand it to the client constructors.
#[derive(Debug, Clone)]
pub struct SodexConfig {
    api_key: Secret<String>,
    secret_key: Secret<String>,
    pub spot_rest_url: String,
    /// Extended gateway used by a handful of endpoints (symbol list).
    pub spot_rest_url_ext: String,
    pub spot_ws_url: String,
    pub futures_rest_url: String,
    pub futures_ws_url: String,
    /// Request timeout in seconds for REST calls.
    pub timeout_seconds: u64,
}

impl SodexConfig {
    /// Create a configuration with API credentials and default endpoints.
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            spot_rest_url: DEFAULT_SPOT_REST_URL.to_string(),
            spot_rest_url_ext: DEFAULT_SPOT_REST_URL_EXT.to_string(),
            spot_ws_url: DEFAULT_SPOT_WS_URL.to_string(),
            futures_rest_url: DEFAULT_FUTURES_REST_URL.to_string(),
            futures_ws_url: DEFAULT_FUTURES_WS_URL.to_string(),
            timeout_seconds: 10,
        }
    }

    /// Configuration without credentials, for public market-data endpoints.
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `SODEX_API_KEY`, `SODEX_SECRET_KEY`. Optional overrides:
    /// `SODEX_SPOT_BASE_URL`, `SODEX_SPOT_BASE_URL_EXT`, `SODEX_SPOT_WS_URL`,
    /// `SODEX_FUTURES_BASE_URL`, `SODEX_FUTURES_WS_URL`, `SODEX_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("SODEX_API_KEY")
            .map_err(|_| ConfigError::MissingEnvironmentVariable("SODEX_API_KEY".to_string()))?;
        let secret_key = env::var("SODEX_SECRET_KEY")
            .map_err(|_| ConfigError::MissingEnvironmentVariable("SODEX_SECRET_KEY".to_string()))?;

        let mut config = Self::new(api_key, secret_key);

        if let Ok(url) = env::var("SODEX_SPOT_BASE_URL") {
            config.spot_rest_url = url;
        }
        if let Ok(url) = env::var("SODEX_SPOT_BASE_URL_EXT") {
            config.spot_rest_url_ext = url;
        }
        if let Ok(url) = env::var("SODEX_SPOT_WS_URL") {
            config.spot_ws_url = url;
        }
        if let Ok(url) = env::var("SODEX_FUTURES_BASE_URL") {
            config.futures_rest_url = url;
        }
        if let Ok(url) = env::var("SODEX_FUTURES_WS_URL") {
            config.futures_ws_url = url;
        }
        if let Ok(timeout) = env::var("SODEX_TIMEOUT_SECONDS") {
            config.timeout_seconds = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidConfiguration(format!(
                    "SODEX_TIMEOUT_SECONDS must be an integer, got '{timeout}'"
                )))?;
        }

        Ok(config)
    }

    /// Load from a `.env` file (if present) and then the environment.
    ///
    /// **Security warning**: never commit `.env` files to version control.
    #[cfg(feature = "env-file")]
    pub fn from_env_file() -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(".env")
    }

    /// Load from a specific `.env` file path, then the environment.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // Missing file is fine, fall through to system env vars.
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{env_file_path}': {e}"
                )));
            }
        }
        Self::from_env()
    }

    /// Whether this configuration can sign authenticated requests.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    /// Override the spot REST base URL.
    #[must_use]
    pub fn spot_rest_url(mut self, url: String) -> Self {
        self.spot_rest_url = url;
        self
    }

    /// Override the spot WebSocket URL.
    #[must_use]
    pub fn spot_ws_url(mut self, url: String) -> Self {
        self.spot_ws_url = url;
        self
    }

    /// Override the futures REST base URL.
    #[must_use]
    pub fn futures_rest_url(mut self, url: String) -> Self {
        self.futures_rest_url = url;
        self
    }

    /// Override the futures WebSocket URL.
    #[must_use]
    pub fn futures_ws_url(mut self, url: String) -> Self {
        self.futures_ws_url = url;
        self
    }

    /// Set the REST request timeout.
    #[must_use]
    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Get the API key (use carefully - exposes the secret).
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get the secret key (use carefully - exposes the secret).
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
