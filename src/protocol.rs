//! Control-message vocabulary
//!
//! Every secure-channel frame carries one UTF-8 JSON object with exactly
//! one recognized top-level key: `offer`, `answer`, `transit`, `command`,
//! or `error`. The serde enums here are externally tagged so the derived
//! encodings match the deployed wire format byte-for-byte.
//!
//! Inbound frames are decoded tolerantly: the session walks the top-level
//! keys of a `serde_json::Value` and ignores anything it does not
//! recognize, so a newer peer never kills the channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer value signalling success
pub const ACK_OK: &str = "ok";

/// A control message sent over the secure channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMessage {
    /// Offer a text message, file, or directory to the peer
    Offer(Offer),
    /// Acknowledge a peer's offer
    Answer(Answer),
    /// Bulk-transport handshake (abilities and connection hints)
    Transit(TransitMessage),
    /// Session command; only `shutdown` is defined
    Command(String),
    /// Report a local failure to the peer
    Error(String),
}

impl ControlMessage {
    /// Encode for the secure channel (one JSON object per frame).
    pub fn to_frame(&self) -> Vec<u8> {
        // These types contain no non-string map keys or other
        // serde_json failure modes.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Offer payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Offer {
    /// A short text message
    Message(String),
    /// A single file
    File(FileOffer),
    /// A directory, sent as one compressed archive
    Directory(DirectoryOffer),
}

/// Descriptor for an offered file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOffer {
    pub filename: String,
    pub filesize: u64,
}

/// Descriptor for an offered directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryOffer {
    /// Archive format; always `zipfile/deflated`
    pub mode: String,
    pub dirname: String,
    /// On-wire (compressed) size of the archive
    pub zipsize: u64,
    /// Total uncompressed size of the members
    pub numbytes: u64,
    pub numfiles: u64,
}

/// Mode string for deflate-compressed ZIP directory offers
pub const DIRECTORY_MODE: &str = "zipfile/deflated";

/// Answer payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    /// Response to a text offer (`ok` or an error string)
    MessageAck(String),
    /// Response to a file or directory offer (`ok` or an error string)
    FileAck(String),
}

/// Transit handshake payload.
///
/// Abilities and hints are opaque to this layer; their structure belongs
/// to the external transit implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitMessage {
    #[serde(rename = "abilities-v1")]
    pub abilities: Value,
    #[serde(rename = "hints-v1", default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<Value>,
}

/// Acknowledgement record exchanged over the bulk transport after a
/// transfer, carrying the receiver's hash of the received bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRecord {
    pub ack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl AckRecord {
    pub fn ok(sha256_hex: String) -> Self {
        Self {
            ack: ACK_OK.to_string(),
            sha256: Some(sha256_hex),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ack == ACK_OK
    }

    /// Encode for the bulk-channel record framing
    pub fn to_record(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// The peer's declared protocol versions, received once during the secure
/// channel's key exchange and immutable for the rest of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCapabilities {
    /// Whether the channel stays open for multiple offer/answer
    /// round-trips instead of closing after one.
    pub connect_mode: bool,
}

impl PeerCapabilities {
    /// Parse a version-exchange payload.
    ///
    /// Absent or foreign shapes simply yield no capabilities; old peers
    /// that advertise nothing get the single-round-trip behavior.
    pub fn from_versions(versions: &Value) -> Self {
        let connect_mode = versions
            .get("v0")
            .and_then(|v0| v0.get("mode"))
            .and_then(Value::as_str)
            == Some("connect");
        Self { connect_mode }
    }
}
