//! # Vault Chat Relay
//!
//! Carries call signaling through an ordinary chat channel. Outbound
//! payloads are posted as messages prefixed with [`CALL_PREFIX`]; inbound
//! history snapshots are scanned once per message id and the payloads other
//! participants wrote are fed to a [`vault_call_core::CallController`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vault_call_core::{CallConfig, MediaDevices, PeerConnectionFactory};
//! use vault_chat_relay::{CallChannel, ChatMessage, ChatTransport, RelayConfig};
//!
//! async fn attach(
//!     transport: Arc<dyn ChatTransport>,
//!     media: Arc<dyn MediaDevices>,
//!     peers: Arc<dyn PeerConnectionFactory>,
//!     history: Vec<ChatMessage>,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = CallChannel::connect(
//!         transport,
//!         "channel-42",
//!         "user-7",
//!         &RelayConfig::default(),
//!         CallConfig::default(),
//!         media,
//!         peers,
//!     )?;
//!     channel.on_messages(&history).await;
//!     channel.controller().start_call(true).await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod framing;
pub mod inbox;
pub mod message;
pub mod relay;

pub use channel::CallChannel;
pub use config::{RelayConfig, CALL_PREFIX};
pub use error::{RelayError, RelayResult};
pub use framing::{decode_signal, encode_signal, is_signal_text};
pub use inbox::SignalInbox;
pub use message::{visible_messages, ChatMessage};
pub use relay::{ChatSignalRelay, ChatTransport};
