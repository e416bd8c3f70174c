use crate::core::errors::SodexError;
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{instrument, trace};

/// REST client trait for the Sodex HTTP API.
///
/// All endpoints share the `{code, msg, data}` response envelope; the
/// implementations below unwrap the envelope and return the `data` payload.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Make a GET request, returning the envelope's `data` payload.
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError>;

    /// GET with a strongly-typed payload.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<T, SodexError>;

    /// Make a POST request. Sodex carries POST parameters in the query
    /// string, the same way the signed form is computed.
    async fn post(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError>;

    /// POST with a strongly-typed payload.
    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<T, SodexError>;

    /// Make a PUT request.
    async fn put(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError>;

    /// Make a DELETE request.
    async fn delete(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError>;
}

/// Configuration for the REST client.
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API.
    pub base_url: String,
    /// Label used in logs and traces (e.g. "sodex-spot").
    pub client_name: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// User agent string to include in requests.
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, client_name: String) -> Self {
        Self {
            base_url,
            client_name,
            timeout_seconds: 10,
            user_agent: "sodex-rs/0.1".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances.
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, SodexError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                SodexError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Unwrap the Sodex `{code, msg, data}` response envelope.
///
/// Code 0 yields `data` (null when the endpoint has nothing to return);
/// non-zero codes map onto the error taxonomy.
pub fn unwrap_envelope(value: Value) -> Result<Value, SodexError> {
    let code = value
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            SodexError::Deserialization("response envelope missing 'code'".to_string())
        })?;

    if code != 0 {
        let message = value
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(SodexError::from_api_code(code, message));
    }

    Ok(value.get("data").cloned().unwrap_or(Value::Null))
}

/// Implementation of [`RestClient`] using reqwest.
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn new(
        base_url: String,
        client_name: String,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, SodexError> {
        let config = RestClientConfig::new(base_url, client_name);
        let mut builder = RestClientBuilder::new(config);
        if let Some(signer) = signer {
            builder = builder.with_signer(signer);
        }
        builder.build()
    }

    /// Current timestamp in milliseconds.
    #[allow(clippy::cast_possible_truncation)]
    fn get_timestamp() -> Result<u64, SodexError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .map_err(|e| SodexError::Configuration(format!("system clock error: {e}")))
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url, endpoint)
    }

    fn create_query_string(params: &[(&str, &str)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    #[instrument(skip(self, response), fields(client = %self.config.client_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, SodexError> {
        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| SodexError::Network(format!("failed to read response body: {e}")))?;

        trace!("response body: {}", response_text);

        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(SodexError::RateLimit(response_text));
            }
            return Err(SodexError::Api {
                code: i64::from(status.as_u16()),
                message: response_text,
            });
        }

        let value: Value = serde_json::from_str(&response_text).map_err(|e| {
            SodexError::Deserialization(format!("failed to parse JSON response: {e}"))
        })?;
        unwrap_envelope(value)
    }

    #[instrument(skip(self), fields(client = %self.config.client_name, method = %method, endpoint = %endpoint))]
    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError> {
        let url = self.build_url(endpoint);
        let mut request = self.client.request(method.clone(), &url);

        if signed {
            let signer = self.signer.as_ref().ok_or_else(|| {
                SodexError::Authentication(
                    "authenticated request attempted without credentials".to_string(),
                )
            })?;
            let timestamp = Self::get_timestamp()?;
            let query_string = Self::create_query_string(query_params);
            let (headers, signed_params) =
                signer.sign_request(method.as_str(), endpoint, &query_string, &[], timestamp)?;

            for (key, value) in headers {
                request = request.header(&key, &value);
            }
            for (key, value) in signed_params {
                request = request.query(&[(key, value)]);
            }
        } else {
            for (key, value) in query_params {
                request = request.query(&[(key, value)]);
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SodexError::Network(format!("request timeout for {endpoint}"))
            } else {
                SodexError::Network(format!("request failed for {endpoint}: {e}"))
            }
        })?;

        self.handle_response(response).await
    }

    fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, SodexError> {
        serde_json::from_value(value)
            .map_err(|e| SodexError::Deserialization(format!("failed to deserialize payload: {e}")))
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError> {
        self.make_request(Method::GET, endpoint, query_params, signed)
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<T, SodexError> {
        self.make_request(Method::GET, endpoint, query_params, signed)
            .await
            .and_then(Self::from_value)
    }

    async fn post(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError> {
        self.make_request(Method::POST, endpoint, query_params, signed)
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<T, SodexError> {
        self.make_request(Method::POST, endpoint, query_params, signed)
            .await
            .and_then(Self::from_value)
    }

    async fn put(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError> {
        self.make_request(Method::PUT, endpoint, query_params, signed)
            .await
    }

    async fn delete(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        signed: bool,
    ) -> Result<Value, SodexError> {
        self.make_request(Method::DELETE, endpoint, query_params, signed)
            .await
    }
}
