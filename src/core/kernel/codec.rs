use crate::core::errors::ExchangeError;
use flate2::read::GzDecoder;
use std::io::Read;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for handling exchange-specific WebSocket message decoding
///
/// Converts raw frames into exchange-specific typed messages and names the
/// dispatch lane each message belongs to. Frames for the same lane are
/// handled strictly one at a time in arrival order.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages from this exchange
    type Message: Send + 'static;

    /// Decode a text frame
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(error)` - Malformed frame; the session logs and drops it
    fn decode_text(&self, text: &str) -> Result<Option<Self::Message>, ExchangeError>;

    /// Decode a binary frame. Ignored unless the exchange compresses payloads.
    fn decode_binary(&self, _data: &[u8]) -> Result<Option<Self::Message>, ExchangeError> {
        Ok(None)
    }

    /// Dispatch lane for a decoded message, e.g. `"depth"` or `"record"`.
    fn lane(&self, message: &Self::Message) -> &'static str;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// Control messages (ping, pong, close) are handled at the transport level
    /// and never reach the codec.
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        match message {
            Message::Text(text) => self.decode_text(&text),
            Message::Binary(data) => self.decode_binary(&data),
            _ => Ok(None),
        }
    }
}

/// Inflate a gzip payload into UTF-8 text.
pub fn gunzip(data: &[u8]) -> Result<String, ExchangeError> {
    let mut decoder = GzDecoder::new(data);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| ExchangeError::ProtocolError(format!("gzip decode failed: {}", e)))?;
    Ok(text)
}
