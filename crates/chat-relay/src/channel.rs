//! Binding a call controller to one chat channel

use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info};
use vault_call_core::{
    CallConfig, CallController, CallControllerBuilder, MediaDevices, PeerConnectionFactory,
};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::inbox::SignalInbox;
use crate::message::ChatMessage;
use crate::relay::{ChatSignalRelay, ChatTransport};

/// Feeds the call payloads of one channel into one controller
pub struct CallChannel {
    channel_id: String,
    controller: Arc<CallController>,
    inbox: Mutex<SignalInbox>,
}

impl CallChannel {
    pub fn new(
        channel_id: impl Into<String>,
        self_id: impl Into<String>,
        config: &RelayConfig,
        controller: Arc<CallController>,
    ) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self {
            channel_id: channel_id.into(),
            controller,
            inbox: Mutex::new(SignalInbox::new(config.prefix.clone(), self_id)),
        })
    }

    /// Build a controller whose outbound payloads go to `channel_id` through
    /// `transport`, and bind it to the same channel.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect(
        transport: Arc<dyn ChatTransport>,
        channel_id: impl Into<String>,
        self_id: impl Into<String>,
        relay_config: &RelayConfig,
        call_config: CallConfig,
        media: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerConnectionFactory>,
    ) -> RelayResult<Self> {
        let channel_id = channel_id.into();
        let relay = ChatSignalRelay::new(transport, channel_id.clone(), relay_config)?;
        let controller = CallControllerBuilder::new()
            .config(call_config)
            .relay(Arc::new(relay))
            .media_devices(media)
            .peer_factory(peers)
            .build()
            .map_err(|e| RelayError::config(e.to_string()))?;
        Self::new(channel_id, self_id, relay_config, Arc::new(controller))
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn controller(&self) -> &Arc<CallController> {
        &self.controller
    }

    /// Process a snapshot of the channel history.
    ///
    /// Offers are answered in the background (capture can sit on a
    /// permission prompt), so a later `end` or candidate in the same or the
    /// next snapshot is not stuck behind them. Returns the number of payloads
    /// handed to the controller.
    pub async fn on_messages(&self, messages: &[ChatMessage]) -> usize {
        let signals = self.inbox.lock().ingest(messages);
        let count = signals.len();
        for signal in signals {
            if self.controller.dispatch_signal(signal).await.is_some() {
                debug!("Answering offer from {} in the background", self.channel_id);
            }
        }
        count
    }

    /// Drive the channel from history snapshots until the stream ends
    pub async fn run<S>(&self, snapshots: S)
    where
        S: Stream<Item = Vec<ChatMessage>>,
    {
        info!("Listening for call signals on channel {}", self.channel_id);
        futures::pin_mut!(snapshots);
        while let Some(batch) = snapshots.next().await {
            let handled = self.on_messages(&batch).await;
            if handled > 0 {
                debug!("Handled {} call signal(s) from {}", handled, self.channel_id);
            }
        }
        info!("Message stream for channel {} closed", self.channel_id);
    }
}
