/// Exchange-agnostic transport kernel.
///
/// The kernel carries only transport and authentication machinery; spot and
/// futures endpoint knowledge lives in the client modules built on top.
///
/// # Components
///
/// - [`RestClient`] / [`ReqwestRest`]: HTTP transport with response-envelope
///   handling and pluggable signing.
/// - [`Signer`] / [`SodexSigner`]: HMAC-SHA256 request authentication.
/// - [`WsTransport`] / [`TungsteniteWs`]: raw WebSocket transport.
/// - [`WsCodec`]: per-product message encoding/decoding.
/// - [`SessionManager`]: listen-key lifecycle, reconnection, subscription
///   replay, and handler dispatch over a single streaming connection.
pub mod codec;
pub mod rest;
pub mod session;
pub mod signer;
pub mod ws;

pub use codec::WsCodec;
pub use rest::{unwrap_envelope, ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use session::{
    ListenKey, ListenKeyProvider, SessionConfig, SessionHandle, SessionManager, SessionState,
    DEFAULT_LISTEN_KEY_TTL,
};
pub use signer::{Params, SignatureResult, SignedRequest, Signer, SodexSigner};
pub use ws::{TungsteniteWs, WsConfig, WsTransport};

/// Raw WebSocket frame type used across the codec and transport seams.
pub use tokio_tungstenite::tungstenite::Message;
