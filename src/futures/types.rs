use crate::core::types::{flexible_f64, flexible_f64_opt, flexible_i64};
use serde::Deserialize;

pub use crate::spot::types::{Page, PriceLevel};

/// Futures wallet balance for one margin asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesBalance {
    pub coin: String,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub wallet_balance: f64,
    #[serde(rename = "availableBalance", deserialize_with = "flexible_f64", default)]
    pub available: f64,
    #[serde(
        rename = "openOrderMarginFrozen",
        deserialize_with = "flexible_f64",
        default
    )]
    pub order_margin_frozen: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub isolated_margin: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub crossed_margin: f64,
}

/// Contract configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesSymbol {
    pub symbol: String,
    #[serde(default)]
    pub contract_type: Option<String>,
    #[serde(default)]
    pub base_coin: String,
    #[serde(default)]
    pub quote_coin: String,
    #[serde(default)]
    pub price_precision: i32,
    #[serde(default)]
    pub quantity_precision: i32,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub contract_size: Option<f64>,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub min_qty: Option<f64>,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub min_notional: Option<f64>,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub max_leverage: Option<f64>,
}

/// A futures order as reported by the exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesOrder {
    #[serde(deserialize_with = "crate::spot::types::string_from_any")]
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub symbol: String,
    #[serde(rename = "orderSide")]
    pub side: String,
    #[serde(rename = "orderType", default)]
    pub order_type: String,
    #[serde(default)]
    pub position_side: String,
    #[serde(rename = "origQty", deserialize_with = "flexible_f64")]
    pub quantity: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub price: f64,
    #[serde(rename = "executedQty", deserialize_with = "flexible_f64", default)]
    pub executed_quantity: f64,
    #[serde(rename = "avgPrice", deserialize_with = "flexible_f64", default)]
    pub average_price: f64,
    #[serde(rename = "state")]
    pub status: String,
    #[serde(default)]
    pub time_in_force: Option<String>,
    #[serde(rename = "createdTime", deserialize_with = "flexible_i64", default)]
    pub timestamp: i64,
}

/// A fill on a futures order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesFill {
    #[serde(deserialize_with = "crate::spot::types::string_from_any")]
    pub order_id: String,
    #[serde(deserialize_with = "crate::spot::types::string_from_any", default)]
    pub exec_id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(deserialize_with = "flexible_f64")]
    pub quantity: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub price: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub fee: f64,
    #[serde(default)]
    pub fee_coin: String,
    #[serde(deserialize_with = "flexible_i64", default)]
    pub timestamp: i64,
}

/// Futures 24h ticker; the wire uses the same single-letter keys as spot.
#[derive(Debug, Clone, Deserialize)]
pub struct FuturesTicker {
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

#[derive(Debug, Clone, Deserialize)]
pub struct FuturesKline {
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
    #[serde(rename = "i", default)]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuturesOrderbook {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", deserialize_with = "flexible_i64")]
    pub timestamp: i64,
    /// Book update id, used to sequence incremental frames.
    #[serde(rename = "u", deserialize_with = "flexible_i64", default)]
    pub update_id: i64,
    #[serde(rename = "b", default)]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a", default)]
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuturesTrade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", deserialize_with = "flexible_i64")]
    pub timestamp: i64,
    #[serde(rename = "p", deserialize_with = "flexible_f64")]
    pub price: f64,
    #[serde(rename = "a", deserialize_with = "flexible_f64")]
    pub quantity: f64,
    #[serde(rename = "m", default)]
    pub side: String,
}

/// Position change pushed on the user stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub symbol: String,
    #[serde(default)]
    pub position_side: String,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub position_size: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub entry_price: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    pub unrealized_profit: f64,
    #[serde(deserialize_with = "flexible_f64_opt", default)]
    pub leverage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_parses_string_amounts() {
        let balance: FuturesBalance = serde_json::from_str(
            r#"{"coin":"USDT","walletBalance":"1000.5","availableBalance":"900",
                "openOrderMarginFrozen":"50.5","isolatedMargin":0,"crossedMargin":"50"}"#,
        )
        .unwrap();
        assert_eq!(balance.wallet_balance, 1000.5);
        assert_eq!(balance.order_margin_frozen, 50.5);
    }

    #[test]
    fn order_fills_defaults_for_missing_fields() {
        let order: FuturesOrder = serde_json::from_str(
            r#"{"orderId":"77","symbol":"btc_usdt","orderSide":"SELL",
                "origQty":"1.5","state":"PARTIALLY_FILLED","executedQty":"0.5"}"#,
        )
        .unwrap();
        assert_eq!(order.executed_quantity, 0.5);
        assert_eq!(order.average_price, 0.0);
        assert!(order.time_in_force.is_none());
    }

    #[test]
    fn orderbook_carries_update_id() {
        let book: FuturesOrderbook = serde_json::from_str(
            r#"{"s":"btc_usdt","t":1700000000000,"u":42,
                "b":[["27000","1.0"]],"a":[["27001","2.0"]]}"#,
        )
        .unwrap();
        assert_eq!(book.update_id, 42);
        assert_eq!(book.bids[0].quantity, 1.0);
    }
}
