//! JSON wire messages exchanged with the relay.
//!
//! The client sends `{"action": ...}` control messages; the relay answers with
//! `{"type": ...}` events. Each transport frame carries exactly one message.

use serde::{Deserialize, Serialize};

/// Client to relay control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Ask the relay to bridge to a platform target.
    Connect { username: String },
    /// Ask the relay to tear the bridge down.
    Disconnect,
}

impl ClientMessage {
    /// Encode as a single JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Relay to client event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayMessage {
    /// One chat event; absent fields are defaulted at ingestion.
    Comment {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        comment: Option<String>,
    },
    /// Relay status update.
    Status {
        #[serde(default)]
        message: Option<String>,
        /// `true` once the bridge to the target is live, `false` when it ended
        #[serde(default)]
        connected: Option<bool>,
    },
}

impl RelayMessage {
    /// Parse one inbound frame.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame.trim()).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Whether this is a status message signalling the bridge is active.
    pub fn is_bridge_active(&self) -> bool {
        matches!(
            self,
            RelayMessage::Status {
                connected: Some(true),
                ..
            }
        )
    }

    /// Whether this is a status message signalling the bridge has ended.
    pub fn is_bridge_ended(&self) -> bool {
        matches!(
            self,
            RelayMessage::Status {
                connected: Some(false),
                ..
            }
        )
    }
}

/// Wire protocol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound frame was not a recognizable relay message
    Malformed(String),
    /// Outbound message could not be encoded
    Encode(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Malformed(e) => write!(f, "Malformed relay frame: {e}"),
            ProtocolError::Encode(e) => write!(f, "Could not encode client message: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
