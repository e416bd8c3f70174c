use crate::core::errors::SodexError;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Result type for signing operations: (headers, `query_params`).
pub type SignatureResult = Result<(Vec<(String, String)>, Vec<(String, String)>), SodexError>;

/// Signer trait for request authentication.
///
/// The REST client calls this for every authenticated request; the returned
/// headers and query parameters are attached to the outgoing request.
pub trait Signer: Send + Sync {
    /// Sign a request and return headers and query parameters.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, ...)
    /// * `endpoint` - API endpoint path
    /// * `query_string` - Query string without the leading '?'
    /// * `body` - Raw request body bytes
    /// * `timestamp` - Request timestamp in milliseconds
    fn sign_request(
        &self,
        method: &str,
        endpoint: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult;
}

/// Ordered request parameters.
///
/// Keys are kept in lexicographic order so the canonical form is independent
/// of insertion order.
#[derive(Debug, Clone, Default)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a parameter with a value that has a canonical string form.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Insert a parameter from a JSON value.
    ///
    /// Only strings, numbers, and booleans have a canonical form; anything
    /// else fails with [`SodexError::Serialization`].
    pub fn insert_json(&mut self, key: impl Into<String>, value: &Value) -> Result<&mut Self, SodexError> {
        let key = key.into();
        let canonical = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(SodexError::Serialization(format!(
                    "parameter '{key}' has no canonical string form: {other}"
                )))
            }
        };
        self.0.insert(key, canonical);
        Ok(self)
    }

    /// Parse a raw `k=v&k=v` query string.
    #[must_use]
    pub fn from_query_string(query: &str) -> Self {
        let mut params = Self::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((k, v)) => params.insert(k, v),
                None => params.insert(pair, ""),
            };
        }
        params
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical query-string form: lexicographically ordered `k=v` pairs
    /// joined with '&', then `&timestamp={timestamp}` appended. The
    /// timestamp segment always carries its '&', so an empty parameter set
    /// signs over `&timestamp={timestamp}`.
    #[must_use]
    pub fn canonical_string(&self, timestamp: u64) -> String {
        let joined = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{joined}&timestamp={timestamp}")
    }

    /// The parameters as ordered pairs, ready for the query string.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A signed request envelope: the parameters, the timestamp that was signed,
/// and the hex-encoded HMAC-SHA256 digest. Created fresh per request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub params: Vec<(String, String)>,
    pub timestamp: u64,
    pub signature: String,
}

/// HMAC-SHA256 request signer for the Sodex API.
///
/// The signature covers the canonical parameter string plus the timestamp;
/// authentication material travels in headers, never in the query string.
/// Signing is a pure function of (params, secret, timestamp).
pub struct SodexSigner {
    api_key: String,
    secret_key: String,
}

impl SodexSigner {
    /// Create a signer, rejecting empty credentials up front so a
    /// misconfigured client fails at construction rather than on first use.
    pub fn new(api_key: String, secret_key: String) -> Result<Self, SodexError> {
        if api_key.is_empty() {
            return Err(SodexError::Configuration("API key is empty".to_string()));
        }
        if secret_key.is_empty() {
            return Err(SodexError::Configuration("secret key is empty".to_string()));
        }
        Ok(Self {
            api_key,
            secret_key,
        })
    }

    /// Sign the parameter set for the given timestamp.
    pub fn sign(&self, params: &Params, timestamp: u64) -> Result<SignedRequest, SodexError> {
        let payload = params.canonical_string(timestamp);
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| SodexError::Authentication(format!("failed to create HMAC: {e}")))?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(SignedRequest {
            params: params.to_pairs(),
            timestamp,
            signature,
        })
    }

    /// Authentication headers for a signed request. The nonce is fresh per
    /// call; the signature itself does not cover it.
    #[must_use]
    pub fn auth_headers(&self, signed: &SignedRequest) -> Vec<(String, String)> {
        vec![
            ("X-Access-Key".to_string(), self.api_key.clone()),
            (
                "X-Request-Timestamp".to_string(),
                signed.timestamp.to_string(),
            ),
            (
                "X-Request-Nonce".to_string(),
                uuid::Uuid::new_v4().to_string(),
            ),
            ("X-Signature".to_string(), signed.signature.clone()),
        ]
    }
}

impl Signer for SodexSigner {
    fn sign_request(
        &self,
        _method: &str,
        _endpoint: &str,
        query_string: &str,
        _body: &[u8],
        timestamp: u64,
    ) -> SignatureResult {
        let params = Params::from_query_string(query_string);
        let signed = self.sign(&params, timestamp)?;
        let headers = self.auth_headers(&signed);
        Ok((headers, signed.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signer() -> SodexSigner {
        SodexSigner::new("test_api_key".to_string(), "test_secret_key".to_string()).unwrap()
    }

    fn order_params() -> Params {
        let mut params = Params::new();
        params
            .insert("symbol", "btc_usdt")
            .insert("direction", "BUY")
            .insert("price", "27500.50")
            .insert("totalAmount", "0.0150");
        params
    }

    #[test]
    fn signature_matches_known_vector() {
        // HMAC-SHA256("test_secret_key",
        //   "direction=BUY&price=27500.50&symbol=btc_usdt&totalAmount=0.0150&timestamp=1700000000000")
        let signed = signer().sign(&order_params(), 1_700_000_000_000).unwrap();
        assert_eq!(
            signed.signature,
            "2138cff25301b1619b417816b8bf771418f7b5e342984ac65739db7bd21c8a14"
        );
    }

    #[test]
    fn empty_params_keep_the_leading_ampersand() {
        // Balance, WS-token, and listen-key requests all sign an empty
        // parameter set; the canonical form is "&timestamp={ts}".
        assert_eq!(Params::new().canonical_string(1), "&timestamp=1");

        // HMAC-SHA256("test_secret_key", "&timestamp=1700000000000")
        let signed = signer().sign(&Params::new(), 1_700_000_000_000).unwrap();
        assert_eq!(
            signed.signature,
            "3a7589fe4a569feec544ca4e7fd4dbd0bd7815b206e3d6d61c9aa14269f1aa0d"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let a = signer().sign(&order_params(), 1_700_000_000_000).unwrap();
        let b = signer().sign(&order_params(), 1_700_000_000_000).unwrap();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut reversed = Params::new();
        reversed
            .insert("totalAmount", "0.0150")
            .insert("price", "27500.50")
            .insert("direction", "BUY")
            .insert("symbol", "btc_usdt");
        assert_eq!(
            order_params().canonical_string(1_700_000_000_000),
            reversed.canonical_string(1_700_000_000_000)
        );
    }

    #[test]
    fn changing_any_parameter_changes_the_signature() {
        let base = signer().sign(&order_params(), 1_700_000_000_000).unwrap();

        let mut changed = order_params();
        changed.insert("price", "27500.51");
        let signed = signer().sign(&changed, 1_700_000_000_000).unwrap();
        assert_ne!(base.signature, signed.signature);
    }

    #[test]
    fn changing_the_timestamp_changes_the_signature() {
        let s = signer();
        let a = s.sign(&order_params(), 1_700_000_000_000).unwrap();
        let b = s.sign(&order_params(), 1_700_000_000_001).unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn empty_secret_key_is_a_configuration_error() {
        let result = SodexSigner::new("key".to_string(), String::new());
        assert!(matches!(result, Err(SodexError::Configuration(_))));
    }

    #[test]
    fn unsupported_parameter_value_is_a_serialization_error() {
        let mut params = Params::new();
        let result = params.insert_json("levels", &json!([1, 2, 3]));
        assert!(matches!(result, Err(SodexError::Serialization(_))));
        assert!(params.insert_json("limit", &json!(100)).is_ok());
        assert!(params.insert_json("active", &json!(true)).is_ok());
    }

    #[test]
    fn auth_headers_carry_the_envelope() {
        let s = signer();
        let signed = s.sign(&order_params(), 1_700_000_000_000).unwrap();
        let headers = s.auth_headers(&signed);
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            [
                "X-Access-Key",
                "X-Request-Timestamp",
                "X-Request-Nonce",
                "X-Signature"
            ]
        );
        assert_eq!(headers[1].1, "1700000000000");
        assert_eq!(headers[3].1, signed.signature);
    }

    #[test]
    fn query_string_round_trip_signs_identically() {
        let params = order_params();
        let from_query = Params::from_query_string(
            "totalAmount=0.0150&symbol=btc_usdt&price=27500.50&direction=BUY",
        );
        assert_eq!(
            params.canonical_string(1),
            from_query.canonical_string(1)
        );
    }
}
