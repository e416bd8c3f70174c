//! Spot market: REST client, typed models, and the market stream codec.

pub mod client;
pub mod codec;
pub mod types;

pub use client::{BatchOrder, SpotClient};
pub use codec::{streams, SpotCodec, SpotEvent, SpotMessage};
pub use types::{
    Balance, Kline, Order, OrderFill, Orderbook, Page, PriceLevel, SymbolInfo, Ticker, Trade,
};
