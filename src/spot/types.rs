use crate::core::types::{flexible_f64, flexible_f64_opt, flexible_i64};
use serde::Deserialize;

/// One side of the book at a single price.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "LevelWire")]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

#[derive(Deserialize)]
struct LevelWire(
    #[serde(deserialize_with = "flexible_f64")] f64,
    #[serde(deserialize_with = "flexible_f64")] f64,
);

impl From<LevelWire> for PriceLevel {
    fn from(wire: LevelWire) -> Self {
        Self {
            price: wire.0,
            quantity: wire.1,
        }
    }
}

/// Orderbook snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct Orderbook {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", deserialize_with = "flexible_i64")]
    pub timestamp: i64,
    #[serde(rename = "b", default)]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a", default)]
    pub asks: Vec<PriceLevel>,
}

impl Orderbook {
    /// Highest bid, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids
            .iter()
            .max_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// Lowest ask, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks
            .iter()
            .min_by(|a, b| a.price.total_cmp(&b.price))
    }

    #[must_use]
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }
}

/// Account balance for one asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub coin: String,
    #[serde(rename = "availableBalance", deserialize_with = "flexible_f64")]
    pub available: f64,
    #[serde(rename = "freeze", deserialize_with = "flexible_f64", default)]
    pub frozen: f64,
}

impl Balance {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.available + self.frozen
    }
}

/// A spot order as reported by the exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(deserialize_with = "string_from_any")]
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub symbol: String,
    #[serde(rename = "orderSide")]
    pub side: String,
    #[serde(rename = "origQty", deserialize_with = "flexible_f64")]
    pub quantity: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub price: f64,
    #[serde(rename = "orderType")]
    pub order_type: String,
    #[serde(rename = "state")]
    pub status: String,
    #[serde(rename = "createdTime", deserialize_with = "flexible_i64", default)]
    pub timestamp: i64,
}

/// A single execution against an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFill {
    #[serde(deserialize_with = "string_from_any")]
    pub order_id: String,
    #[serde(deserialize_with = "string_from_any")]
    pub exec_id: String,
    pub symbol: String,
    #[serde(deserialize_with = "flexible_f64")]
    pub quantity: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub price: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub fee: f64,
    #[serde(default)]
    pub fee_coin: String,
    #[serde(rename = "orderSide", default)]
    pub side: String,
    #[serde(deserialize_with = "flexible_i64", default)]
    pub timestamp: i64,
}

/// Candlestick data. Wire fields are single letters: s/t/o/h/l/c plus
/// `a` (base volume) and `v` (quote volume).
#[derive(Debug, Clone, Deserialize)]
pub struct Kline {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", deserialize_with = "flexible_i64")]
    pub timestamp: i64,
    #[serde(rename = "o", deserialize_with = "flexible_f64")]
    pub open: f64,
    #[serde(rename = "h", deserialize_with = "flexible_f64")]
    pub high: f64,
    #[serde(rename = "l", deserialize_with = "flexible_f64")]
    pub low: f64,
    #[serde(rename = "c", deserialize_with = "flexible_f64")]
    pub close: f64,
    #[serde(rename = "a", deserialize_with = "flexible_f64")]
    pub volume: f64,
    #[serde(rename = "v", deserialize_with = "flexible_f64")]
    pub quote_volume: f64,
    /// Interval tag, present on streaming klines.
    #[serde(rename = "i", default)]
    pub interval: Option<String>,
}

/// 24h rolling ticker.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", deserialize_with = "flexible_i64")]
    pub timestamp: i64,
    #[serde(rename = "o", deserialize_with = "flexible_f64")]
    pub open: f64,
    #[serde(rename = "h", deserialize_with = "flexible_f64")]
    pub high: f64,
    #[serde(rename = "l", deserialize_with = "flexible_f64")]
    pub low: f64,
    #[serde(rename = "c", deserialize_with = "flexible_f64")]
    pub close: f64,
    #[serde(rename = "a", deserialize_with = "flexible_f64")]
    pub volume: f64,
    #[serde(rename = "v", deserialize_with = "flexible_f64")]
    pub quote_volume: f64,
    #[serde(rename = "r", deserialize_with = "flexible_f64", default)]
    pub price_change_percent: f64,
}

/// A public trade print.
#[derive(Debug, Clone, Deserialize)]
pub struct Trade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", deserialize_with = "flexible_i64")]
    pub timestamp: i64,
    #[serde(rename = "p", deserialize_with = "flexible_f64")]
    pub price: f64,
    #[serde(rename = "a", deserialize_with = "flexible_f64")]
    pub quantity: f64,
    /// Taker side marker as reported by the exchange.
    #[serde(rename = "m", default)]
    pub side: String,
}

/// Symbol configuration from the extended gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    #[serde(deserialize_with = "flexible_i64", default)]
    pub id: i64,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub trade_switch: bool,
    #[serde(default)]
    pub buy_coin: String,
    #[serde(default)]
    pub sell_coin: String,
    #[serde(default)]
    pub quantity_precision: i32,
    #[serde(default)]
    pub price_precision: i32,
    #[serde(default)]
    pub support_order_type: String,
    #[serde(default)]
    pub support_time_in_force: String,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub min_price: Option<f64>,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub min_qty: Option<f64>,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub min_notional: Option<f64>,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub maker_fee: Option<f64>,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub taker_fee: Option<f64>,
    #[serde(deserialize_with = "flexible_i64", default)]
    pub onboard_date: i64,
    #[serde(default)]
    pub hot: bool,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(deserialize_with = "flexible_i64", default)]
    pub page: i64,
    #[serde(rename = "ps", deserialize_with = "flexible_i64", default)]
    pub page_size: i64,
    #[serde(deserialize_with = "flexible_i64", default)]
    pub total: i64,
}

impl<T> Page<T> {
    /// Whether another page follows this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.page * self.page_size < self.total
    }
}

/// Deserialize IDs that arrive as either strings or integers.
pub(crate) fn string_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Any {
        String(String),
        Int(i64),
    }
    Ok(match Any::deserialize(deserializer)? {
        Any::String(s) => s,
        Any::Int(n) => n.to_string(),
    })
}
