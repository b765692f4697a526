//! Outbound signaling over the chat backend

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vault_call_core::{CallResult, SignalMessage, SignalRelay};

use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::framing::encode_signal;

/// Posts a text message into a chat channel (the backend's `sendMessage`)
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: String) -> RelayResult<()>;
}

/// [`SignalRelay`] that frames payloads as chat messages in one channel
pub struct ChatSignalRelay {
    transport: Arc<dyn ChatTransport>,
    channel_id: String,
    prefix: String,
}

impl ChatSignalRelay {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        channel_id: impl Into<String>,
        config: &RelayConfig,
    ) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            channel_id: channel_id.into(),
            prefix: config.prefix.clone(),
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

#[async_trait]
impl SignalRelay for ChatSignalRelay {
    async fn send_signal(&self, message: SignalMessage) -> CallResult<()> {
        let text = encode_signal(&self.prefix, &message)?;
        debug!("Posting {} signal to channel {}", message.kind(), self.channel_id);
        self.transport.send_message(&self.channel_id, text).await?;
        Ok(())
    }
}
