use crate::core::errors::SodexError;
use crate::core::kernel::{Message, WsCodec};
use crate::futures::types::{
    FuturesBalance, FuturesKline, FuturesOrder, FuturesOrderbook, FuturesTicker, FuturesTrade,
    PositionUpdate,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// A decoded futures stream frame.
#[derive(Debug, Clone)]
pub struct FuturesMessage {
    pub channel: Option<String>,
    pub event: FuturesEvent,
}

#[derive(Debug, Clone)]
pub enum FuturesEvent {
    Orderbook(FuturesOrderbook),
    Trade(FuturesTrade),
    Kline(FuturesKline),
    Ticker(FuturesTicker),
    /// Own-order change on the user stream.
    OrderUpdate(FuturesOrder),
    /// Wallet change on the user stream.
    BalanceUpdate(FuturesBalance),
    /// Position change on the user stream.
    PositionUpdate(PositionUpdate),
    Raw(Value),
}

/// Codec for the futures stream. Market channels use the spot naming
/// scheme (`<symbol>@<topic>`); user-stream pushes arrive on the
/// `user.order`, `user.balance`, and `user.position` channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuturesCodec;

impl FuturesCodec {
    fn control_frame(method: &str, streams: &[impl AsRef<str> + Send + Sync]) -> Message {
        let params: Vec<&str> = streams.iter().map(AsRef::as_ref).collect();
        Message::Text(
            json!({
                "method": method,
                "params": params,
                "id": 1,
            })
            .to_string(),
        )
    }

    fn decode_text(text: &str) -> Result<Option<FuturesMessage>, SodexError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SodexError::Deserialization(format!("invalid stream frame: {e}")))?;

        let channel = value
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let Some(channel_name) = channel.as_deref() else {
            return Ok(Some(FuturesMessage {
                channel: None,
                event: FuturesEvent::Raw(value),
            }));
        };

        let data = value.get("data").cloned().unwrap_or(Value::Null);
        let event = match channel_name {
            "user.order" => FuturesEvent::OrderUpdate(parse(data)?),
            "user.balance" => FuturesEvent::BalanceUpdate(parse(data)?),
            "user.position" => FuturesEvent::PositionUpdate(parse(data)?),
            name => match name.rsplit('@').next().unwrap_or_default() {
                "depth" => FuturesEvent::Orderbook(parse(data)?),
                "deal" => FuturesEvent::Trade(parse(data)?),
                t if t.starts_with("kline") => FuturesEvent::Kline(parse(data)?),
                "ticker" => FuturesEvent::Ticker(parse(data)?),
                _ => FuturesEvent::Raw(data),
            },
        };

        Ok(Some(FuturesMessage { channel, event }))
    }
}

fn parse<T: for<'de> Deserialize<'de>>(data: Value) -> Result<T, SodexError> {
    serde_json::from_value(data)
        .map_err(|e| SodexError::Deserialization(format!("stream payload: {e}")))
}

impl WsCodec for FuturesCodec {
    type Message = FuturesMessage;

    fn encode_subscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, SodexError> {
        Ok(Self::control_frame("SUBSCRIBE", streams))
    }

    fn encode_unsubscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, SodexError> {
        Ok(Self::control_frame("UNSUBSCRIBE", streams))
    }

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, SodexError> {
        match message {
            Message::Text(text) => Self::decode_text(&text),
            _ => Ok(None),
        }
    }

    fn channel_of<'a>(&self, message: &'a Self::Message) -> Option<&'a str> {
        message.channel.as_deref()
    }
}

/// Stream name helpers for futures channels.
pub mod streams {
    use crate::core::types::{to_wire_symbol, KlineInterval};

    pub const USER_ORDERS: &str = "user.order";
    pub const USER_BALANCES: &str = "user.balance";
    pub const USER_POSITIONS: &str = "user.position";

    #[must_use]
    pub fn depth(symbol: &str) -> String {
        format!("{}@depth", to_wire_symbol(symbol))
    }

    #[must_use]
    pub fn trades(symbol: &str) -> String {
        format!("{}@deal", to_wire_symbol(symbol))
    }

    #[must_use]
    pub fn kline(symbol: &str, interval: KlineInterval) -> String {
        format!("{}@kline_{}", to_wire_symbol(symbol), interval.as_str())
    }

    #[must_use]
    pub fn ticker(symbol: &str) -> String {
        format!("{}@ticker", to_wire_symbol(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_user_order_push() {
        let raw = r#"{"channel":"user.order",
            "data":{"orderId":"31","symbol":"btc_usdt","orderSide":"BUY",
                    "origQty":"0.25","state":"FILLED","executedQty":"0.25",
                    "avgPrice":"27100"}}"#;
        let codec = FuturesCodec;
        let message = codec
            .decode_message(Message::Text(raw.into()))
            .unwrap()
            .unwrap();
        assert_eq!(codec.channel_of(&message), Some("user.order"));
        let FuturesEvent::OrderUpdate(order) = message.event else {
            panic!("expected order update");
        };
        assert_eq!(order.status, "FILLED");
        assert_eq!(order.average_price, 27100.0);
    }

    #[test]
    fn decodes_position_push() {
        let raw = r#"{"channel":"user.position",
            "data":{"symbol":"eth_usdt","positionSide":"LONG",
                    "positionSize":"2","entryPrice":"1800","unrealizedProfit":"12.5"}}"#;
        let codec = FuturesCodec;
        let message = codec
            .decode_message(Message::Text(raw.into()))
            .unwrap()
            .unwrap();
        let FuturesEvent::PositionUpdate(position) = message.event else {
            panic!("expected position update");
        };
        assert_eq!(position.position_size, 2.0);
    }

    #[test]
    fn market_channels_decode_like_spot() {
        let raw = r#"{"channel":"btc_usdt@ticker",
            "data":{"s":"btc_usdt","t":1700000000000,"o":"27000","h":"27500",
                    "l":"26800","c":"27400","a":"120","v":"3270000","r":"1.48"}}"#;
        let codec = FuturesCodec;
        let message = codec
            .decode_message(Message::Text(raw.into()))
            .unwrap()
            .unwrap();
        let FuturesEvent::Ticker(ticker) = message.event else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.price_change_percent, 1.48);
    }

    #[test]
    fn unknown_channel_falls_back_to_raw() {
        let raw = r#"{"channel":"btc_usdt@mystery","data":{"x":1}}"#;
        let codec = FuturesCodec;
        let message = codec
            .decode_message(Message::Text(raw.into()))
            .unwrap()
            .unwrap();
        assert!(matches!(message.event, FuturesEvent::Raw(_)));
    }
}
