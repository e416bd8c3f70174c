//! Rust client for the Sodex exchange.
//!
//! The crate is split into a transport kernel and per-product clients:
//!
//! - [`core`]: configuration, errors, HMAC request signing, the REST
//!   transport, and the WebSocket session manager.
//! - [`spot`]: spot REST endpoints and market stream codec.
//! - [`futures`]: USDT-margined futures REST endpoints and the combined
//!   market/user stream codec.
//!
//! # Quick start
//!
//! ```no_run
//! use sodex::{SodexConfig, SpotClient};
//!
//! # async fn run() -> Result<(), sodex::SodexError> {
//! let config = SodexConfig::from_env()?;
//! let client = SpotClient::new(&config)?;
//! let ticker = client.get_ticker("BTCUSDT").await?;
//! println!("last price: {}", ticker.close);
//! # Ok(())
//! # }
//! ```
//!
//! # Streaming
//!
//! Streaming sessions manage the listen-key lifecycle (renewal before
//! expiry, re-issue on failure), reconnect with capped exponential
//! backoff, and replay subscriptions after every reconnect:
//!
//! ```no_run
//! use sodex::{spot_session, SodexConfig};
//! use sodex::spot::streams;
//!
//! # async fn run() -> Result<(), sodex::SodexError> {
//! let config = SodexConfig::from_env()?;
//! let mut session = spot_session(&config)?;
//! session.on_channel(streams::depth("BTCUSDT"), |message| {
//!     println!("{message:?}");
//! });
//! session.subscribe(&streams::depth("BTCUSDT")).await?;
//! session.connect().await?;
//! session.run().await
//! # }
//! ```

pub mod core;
pub mod futures;
pub mod spot;

pub use crate::core::config::SodexConfig;
pub use crate::core::errors::SodexError;
pub use crate::core::kernel::{
    ListenKey, ListenKeyProvider, SessionConfig, SessionHandle, SessionManager, SessionState,
};
pub use crate::core::types::{KlineInterval, OrderSide, OrderType, PositionSide, TimeInForce};
pub use crate::futures::{FuturesClient, FuturesCodec, FuturesOrderRequest};
pub use crate::spot::{SpotClient, SpotCodec};

use crate::core::kernel::TungsteniteWs;

/// Spot streaming session type returned by [`spot_session`].
pub type SpotSession = SessionManager<SpotCodec, TungsteniteWs, SpotClient>;

/// Historical name for [`SpotClient`], kept for callers of early releases.
pub type SodexClient = SpotClient;

/// Historical name for [`SpotSession`].
pub type SodexWebSocketSession = SpotSession;

/// Futures streaming session type returned by [`futures_session`].
pub type FuturesSession = SessionManager<FuturesCodec, TungsteniteWs, FuturesClient>;

/// Build a spot streaming session wired to the configured endpoints.
pub fn spot_session(config: &SodexConfig) -> Result<SpotSession, SodexError> {
    let client = SpotClient::new(config)?;
    Ok(SessionManager::new(
        SpotCodec,
        TungsteniteWs::new("sodex-spot".to_string()),
        client,
        SessionConfig::new(config.spot_ws_url.clone()).with_key_param("token".to_string()),
    ))
}

/// Build a futures streaming session carrying both market and user
/// stream channels.
pub fn futures_session(config: &SodexConfig) -> Result<FuturesSession, SodexError> {
    let client = FuturesClient::new(config)?;
    Ok(SessionManager::new(
        FuturesCodec,
        TungsteniteWs::new("sodex-futures".to_string()),
        client,
        SessionConfig::new(config.futures_ws_url.clone()),
    ))
}
