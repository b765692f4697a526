//! Signaling payloads exchanged between two controllers
//!
//! The payload is JSON, internally tagged by `"type"`:
//!
//! ```text
//! {"type":"offer","sdp":"v=0...","video":true}
//! {"type":"answer","sdp":"v=0..."}
//! {"type":"candidate","candidate":{"candidate":"candidate:1 1 udp ...","sdpMid":"0","sdpMLineIndex":0}}
//! {"type":"end"}
//! ```
//!
//! How the payload travels (chat message, marker prefix) is the host's business.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A network candidate in the platform's `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    /// The candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidateInit {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, m_line_index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_m_line_index = Some(m_line_index);
        self
    }
}

/// `null` and a missing field both mean false
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// One signaling payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    /// Caller's session description
    Offer {
        sdp: String,
        #[serde(default, deserialize_with = "lenient_flag")]
        video: bool,
    },
    /// Callee's session description
    Answer { sdp: String },
    /// A network candidate discovered by the sender
    Candidate { candidate: IceCandidateInit },
    /// Hang-up
    End,
    /// Any `type` this version does not understand
    #[serde(other)]
    Unknown,
}

/// Discriminant of a [`SignalMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    End,
    Unknown,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
            SignalKind::End => "end",
            SignalKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl SignalMessage {
    pub fn offer(sdp: impl Into<String>, video: bool) -> Self {
        SignalMessage::Offer {
            sdp: sdp.into(),
            video,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        SignalMessage::Answer { sdp: sdp.into() }
    }

    pub fn candidate(candidate: IceCandidateInit) -> Self {
        SignalMessage::Candidate { candidate }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            SignalMessage::Offer { .. } => SignalKind::Offer,
            SignalMessage::Answer { .. } => SignalKind::Answer,
            SignalMessage::Candidate { .. } => SignalKind::Candidate,
            SignalMessage::End => SignalKind::End,
            SignalMessage::Unknown => SignalKind::Unknown,
        }
    }

    /// Serialize to the JSON body carried by the relay
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON body received from the relay
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}
