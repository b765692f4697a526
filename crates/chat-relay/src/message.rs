//! Chat channel messages as delivered by the chat backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::framing::is_signal_text;

/// One message of a channel's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    /// Attachments-only messages carry no text
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            text: Some(text.into()),
            created_at: Utc::now(),
        }
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    /// Whether this message carries a call payload under `prefix`
    pub fn is_signal(&self, prefix: &str) -> bool {
        self.text
            .as_deref()
            .map(|text| is_signal_text(prefix, text))
            .unwrap_or(false)
    }
}

/// Messages a chat view should render: everything except call payloads
pub fn visible_messages<'a>(prefix: &str, messages: &'a [ChatMessage]) -> Vec<&'a ChatMessage> {
    messages.iter().filter(|m| !m.is_signal(prefix)).collect()
}
