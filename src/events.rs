//! Notification surface
//!
//! [`Event`] is everything the presentation layer can observe; the session
//! and the transfer tasks push events onto one unbounded channel, so
//! dispatch stays exhaustive and testable. [`ChannelEvent`] is the inbound
//! direction: the secure-channel implementation reports its lifecycle and
//! received frames through the sender handed to its factory.

use serde_json::Value;

use crate::errors::Error;

/// Events emitted by a [`crate::Session`]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The rendezvous server allocated (or accepted) a human-readable code
    CodeAllocated { code: String },
    /// Key exchange finished and the peer's versions arrived
    Connected,
    /// Peer sent a text message (already acknowledged)
    MessageReceived { text: String },
    /// Peer acknowledged our text offer
    MessageSent { success: bool },
    /// Peer offered a file; accept with `receive_file` or `refuse_file`
    FileOfferPending { name: String, size: u64 },
    /// Rate-limited byte-count update for an active transfer
    TransferProgress {
        id: u64,
        transferred: u64,
        total: u64,
    },
    /// A transfer finished and was acknowledged
    TransferComplete { id: u64, name: String },
    /// A handshake or bulk transfer failed
    TransferError { error: Error, context: String },
    /// A local failure unrelated to a specific transfer
    Error { error: Error },
    /// Peer reported a failure over the control channel
    RemoteError { message: String },
    /// Peer requested a shutdown; the channel is closing
    PeerShutdown,
    /// The secure channel closed
    Closed,
    /// The secure channel closed as part of a local shutdown
    Shutdown,
}

/// Why the secure channel closed
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// Normal close after a completed exchange
    Happy,
    /// We gave up before any peer arrived; expected, not an error
    Lonely,
    /// The channel failed
    Error(String),
}

/// Events reported by the external secure-channel implementation
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Server welcome blob; informational
    Welcome(Value),
    /// The channel's human-readable code is known
    Code(String),
    /// The peer's version advertisement; arrives once, after key exchange
    Versions(Value),
    /// One opaque frame from the peer
    Message(Vec<u8>),
    /// The channel is gone
    Closed(CloseReason),
}
