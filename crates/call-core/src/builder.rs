//! Builder for [`CallController`]

use std::sync::Arc;

use crate::config::{CallConfig, IceServer};
use crate::controller::CallController;
use crate::error::{CallError, CallResult};
use crate::platform::{MediaDevices, PeerConnectionFactory, SignalRelay};

/// Builder for a [`CallController`]
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use vault_call_core::{CallControllerBuilder, MediaDevices, PeerConnectionFactory, SignalRelay};
/// # async fn example(
/// #     relay: Arc<dyn SignalRelay>,
/// #     media: Arc<dyn MediaDevices>,
/// #     peers: Arc<dyn PeerConnectionFactory>,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let controller = CallControllerBuilder::new()
///     .relay(relay)
///     .media_devices(media)
///     .peer_factory(peers)
///     .build()?;
/// controller.start_call(true).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct CallControllerBuilder {
    config: CallConfig,
    relay: Option<Arc<dyn SignalRelay>>,
    media: Option<Arc<dyn MediaDevices>>,
    peers: Option<Arc<dyn PeerConnectionFactory>>,
}

impl CallControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ice_server(mut self, server: IceServer) -> Self {
        self.config.ice_servers.push(server);
        self
    }

    /// The `sendSignal` capability (required)
    pub fn relay(mut self, relay: Arc<dyn SignalRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Capture device access (required)
    pub fn media_devices(mut self, media: Arc<dyn MediaDevices>) -> Self {
        self.media = Some(media);
        self
    }

    /// Peer connection primitive (required)
    pub fn peer_factory(mut self, peers: Arc<dyn PeerConnectionFactory>) -> Self {
        self.peers = Some(peers);
        self
    }

    /// Validate and build. Must be called inside a tokio runtime.
    pub fn build(self) -> CallResult<CallController> {
        self.config.validate()?;
        let relay = self
            .relay
            .ok_or_else(|| CallError::config("a signal relay is required"))?;
        let media = self
            .media
            .ok_or_else(|| CallError::config("media devices are required"))?;
        let peers = self
            .peers
            .ok_or_else(|| CallError::config("a peer connection factory is required"))?;
        Ok(CallController::new(self.config, relay, media, peers))
    }
}
