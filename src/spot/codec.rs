use crate::core::errors::SodexError;
use crate::core::kernel::{Message, WsCodec};
use crate::spot::types::{Kline, Orderbook, Ticker, Trade};
use serde::Deserialize;
use serde_json::{json, Value};

/// A decoded spot stream frame. The channel tag keeps the raw stream
/// name so sessions can route to per-channel handlers.
#[derive(Debug, Clone)]
pub struct SpotMessage {
    pub channel: Option<String>,
    pub event: SpotEvent,
}

#[derive(Debug, Clone)]
pub enum SpotEvent {
    Orderbook(Orderbook),
    Trade(Trade),
    Kline(Kline),
    Ticker(Ticker),
    /// Acknowledgements and frames on channels we do not model.
    Raw(Value),
}

/// Codec for the spot market-data stream.
///
/// Streams are named `<symbol>@<topic>`, e.g. `btc_usdt@depth`, and
/// control frames carry the shape
/// `{"method": "SUBSCRIBE", "params": [...], "id": n}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpotCodec;

impl SpotCodec {
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

    fn decode_text(text: &str) -> Result<Option<SpotMessage>, SodexError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SodexError::Deserialization(format!("invalid stream frame: {e}")))?;

        let channel = value
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let Some(channel_name) = channel.as_deref() else {
            // Subscription acks and pings have no channel tag.
            return Ok(Some(SpotMessage {
                channel: None,
                event: SpotEvent::Raw(value),
            }));
        };

        let data = value.get("data").cloned().unwrap_or(Value::Null);
        let topic = channel_name.rsplit('@').next().unwrap_or_default();
        let event = match topic {
            "depth" => SpotEvent::Orderbook(parse(data)?),
            "deal" => SpotEvent::Trade(parse(data)?),
            t if t.starts_with("kline") => SpotEvent::Kline(parse(data)?),
            "ticker" => SpotEvent::Ticker(parse(data)?),
            _ => SpotEvent::Raw(data),
        };

        Ok(Some(SpotMessage { channel, event }))
    }
}

fn parse<T: for<'de> Deserialize<'de>>(data: Value) -> Result<T, SodexError> {
    serde_json::from_value(data)
        .map_err(|e| SodexError::Deserialization(format!("stream payload: {e}")))
}

impl WsCodec for SpotCodec {
    type Message = SpotMessage;

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
            // Control frames are handled by the transport.
            _ => Ok(None),
        }
    }

    fn channel_of<'a>(&self, message: &'a Self::Message) -> Option<&'a str> {
        message.channel.as_deref()
    }
}

/// Stream name helpers, so callers do not hand-build channel strings.
pub mod streams {
    use crate::core::types::{to_wire_symbol, KlineInterval};

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
    fn subscribe_frame_shape() {
        let codec = SpotCodec;
        let frame = codec
            .encode_subscription(&["btc_usdt@depth", "eth_usdt@deal"])
            .unwrap();
        let Message::Text(text) = frame else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"][0], "btc_usdt@depth");
        assert_eq!(value["params"][1], "eth_usdt@deal");
    }

    #[test]
    fn decodes_depth_frame() {
        let raw = r#"{"channel":"btc_usdt@depth",
            "data":{"s":"btc_usdt","t":1700000000000,
                    "b":[["27000","0.5"]],"a":[["27001","0.2"]]}}"#;
        let codec = SpotCodec;
        let message = codec
            .decode_message(Message::Text(raw.into()))
            .unwrap()
            .unwrap();
        assert_eq!(codec.channel_of(&message), Some("btc_usdt@depth"));
        let SpotEvent::Orderbook(book) = message.event else {
            panic!("expected orderbook event");
        };
        assert_eq!(book.bids[0].price, 27000.0);
    }

    #[test]
    fn decodes_kline_frame_with_interval_suffix() {
        let raw = r#"{"channel":"eth_usdt@kline_1m",
            "data":{"s":"eth_usdt","t":1700000000000,"o":"1800","h":"1801",
                    "l":"1799","c":"1800.5","a":"10","v":"18000","i":"1m"}}"#;
        let codec = SpotCodec;
        let message = codec
            .decode_message(Message::Text(raw.into()))
            .unwrap()
            .unwrap();
        let SpotEvent::Kline(kline) = message.event else {
            panic!("expected kline event");
        };
        assert_eq!(kline.interval.as_deref(), Some("1m"));
    }

    #[test]
    fn ack_frame_has_no_channel() {
        let codec = SpotCodec;
        let message = codec
            .decode_message(Message::Text(r#"{"result":null,"id":1}"#.into()))
            .unwrap()
            .unwrap();
        assert!(message.channel.is_none());
        assert!(matches!(message.event, SpotEvent::Raw(_)));
    }

    #[test]
    fn malformed_frame_is_a_decode_error() {
        let codec = SpotCodec;
        let err = codec
            .decode_message(Message::Text("{not json".into()))
            .unwrap_err();
        assert!(matches!(err, SodexError::Deserialization(_)));
    }

    #[test]
    fn binary_frames_are_ignored() {
        let codec = SpotCodec;
        assert!(codec
            .decode_message(Message::Binary(vec![1, 2, 3]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn stream_helpers_use_wire_symbols() {
        assert_eq!(streams::depth("BTCUSDT"), "btc_usdt@depth");
        assert_eq!(
            streams::kline("ETHUSDT", crate::core::types::KlineInterval::OneMinute),
            "eth_usdt@kline_1m"
        );
    }
}
