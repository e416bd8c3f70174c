use crate::core::errors::SodexError;
use tokio_tungstenite::tungstenite::Message;

/// Codec for the exchange's WebSocket message formats.
///
/// Converts between raw frames and typed stream messages. Control frames
/// (ping, pong, close) never reach the codec; they are handled at the
/// transport level.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed stream messages.
    type Message: Send;

    /// Encode a subscription request for the given channels.
    fn encode_subscription(
        &self,
        channels: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, SodexError>;

    /// Encode an unsubscription request for the given channels.
    fn encode_unsubscription(
        &self,
        channels: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, SodexError>;

    /// Decode a raw frame into a typed message.
    ///
    /// Returns `Ok(None)` when the codec chooses to ignore the frame
    /// (subscription acks, unknown frame kinds).
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, SodexError>;

    /// The channel a decoded message belongs to, used to route it to the
    /// matching handler. `None` for messages with no channel affinity.
    fn channel_of<'a>(&self, message: &'a Self::Message) -> Option<&'a str>;
}
