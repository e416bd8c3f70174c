//! USDT-margined futures: REST client, typed models, and stream codec.

pub mod client;
pub mod codec;
pub mod types;

pub use client::{FuturesClient, FuturesOrderRequest};
pub use codec::{streams, FuturesCodec, FuturesEvent, FuturesMessage};
pub use types::{
    FuturesBalance, FuturesFill, FuturesKline, FuturesOrder, FuturesOrderbook, FuturesSymbol,
    FuturesTicker, FuturesTrade, PositionUpdate,
};
