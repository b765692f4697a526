//! De-duplicating extraction of inbound call payloads
//!
//! The chat backend hands out full history snapshots, so the same message is
//! seen many times. Every message id is processed once; only prefixed
//! messages written by someone else are call payloads for us.

use std::collections::HashSet;

use tracing::debug;
use vault_call_core::SignalMessage;

use crate::framing::decode_signal;
use crate::message::ChatMessage;

/// Per-channel record of processed messages
#[derive(Debug)]
pub struct SignalInbox {
    prefix: String,
    self_id: String,
    seen: HashSet<String>,
}

impl SignalInbox {
    pub fn new(prefix: impl Into<String>, self_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            self_id: self_id.into(),
            seen: HashSet::new(),
        }
    }

    /// Payloads for us among the messages not processed yet, in chat order
    pub fn ingest(&mut self, messages: &[ChatMessage]) -> Vec<SignalMessage> {
        let mut signals = Vec::new();
        for message in messages {
            if !self.seen.insert(message.id.clone()) {
                continue;
            }
            if message.is_from(&self.self_id) {
                continue;
            }
            let Some(text) = message.text.as_deref() else {
                continue;
            };
            match decode_signal(&self.prefix, text) {
                Some(Ok(signal)) => signals.push(signal),
                Some(Err(e)) => debug!("Ignoring malformed call payload in {}: {}", message.id, e),
                None => {}
            }
        }
        signals
    }

    pub fn has_seen(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CALL_PREFIX;

    fn msg(id: &str, sender: &str, text: &str) -> ChatMessage {
        ChatMessage::new(id, sender, sender, text)
    }

    #[test]
    fn test_each_message_once() {
        let mut inbox = SignalInbox::new(CALL_PREFIX, "me");
        let history = vec![msg("1", "peer", r#"__CALL__:{"type":"end"}"#)];

        assert_eq!(inbox.ingest(&history), vec![SignalMessage::End]);
        assert!(inbox.ingest(&history).is_empty());
    }

    #[test]
    fn test_own_and_plain_messages_are_marked_but_skipped() {
        let mut inbox = SignalInbox::new(CALL_PREFIX, "me");
        let history = vec![
            msg("1", "me", r#"__CALL__:{"type":"offer","sdp":"v=0","video":false}"#),
            msg("2", "peer", "are you there?"),
        ];

        assert!(inbox.ingest(&history).is_empty());
        assert!(inbox.has_seen("1"));
        assert!(inbox.has_seen("2"));
    }

    #[test]
    fn test_malformed_payload_is_swallowed() {
        let mut inbox = SignalInbox::new(CALL_PREFIX, "me");
        let history = vec![
            msg("1", "peer", "__CALL__:not json"),
            msg("2", "peer", r#"__CALL__:{"type":"answer","sdp":"v=0"}"#),
        ];

        assert_eq!(inbox.ingest(&history), vec![SignalMessage::answer("v=0")]);
        assert_eq!(inbox.seen_count(), 2);
    }

    #[test]
    fn test_growing_snapshots_keep_order() {
        let mut inbox = SignalInbox::new(CALL_PREFIX, "me");
        let mut history = vec![msg("1", "peer", r#"__CALL__:{"type":"offer","sdp":"o","video":true}"#)];
        assert_eq!(inbox.ingest(&history).len(), 1);

        history.push(msg("2", "peer", r#"__CALL__:{"type":"end"}"#));
        history.push(msg("3", "peer", r#"__CALL__:{"type":"answer","sdp":"a"}"#));
        assert_eq!(
            inbox.ingest(&history),
            vec![SignalMessage::End, SignalMessage::answer("a")]
        );
    }
}
