//! Embedding signaling payloads in chat message text
//!
//! A call message is the configured prefix immediately followed by the JSON
//! payload: `__CALL__:{"type":"answer","sdp":"v=0..."}`.

use vault_call_core::SignalMessage;

use crate::error::{RelayError, RelayResult};

/// Whether a message body carries a call payload
pub fn is_signal_text(prefix: &str, text: &str) -> bool {
    text.starts_with(prefix)
}

/// Frame a payload as chat text
pub fn encode_signal(prefix: &str, message: &SignalMessage) -> RelayResult<String> {
    let body = message.to_json()?;
    Ok(format!("{prefix}{body}"))
}

/// Extract a payload from chat text.
///
/// `None` for ordinary user messages, `Some(Err(..))` for prefixed bodies
/// that do not parse.
pub fn decode_signal(prefix: &str, text: &str) -> Option<RelayResult<SignalMessage>> {
    let body = text.strip_prefix(prefix)?;
    Some(SignalMessage::from_json(body).map_err(RelayError::from))
}
