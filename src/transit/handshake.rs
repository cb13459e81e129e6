//! Shared transit handshake state
//!
//! Both direction machines own a [`TransitHalf`]: the external connector
//! plus the at-most-one byte-pipe obtained from it. The handshake installs
//! the peer's hints and the derived transit key; the pipe is established
//! lazily on first transfer and reused for the rest of the session.

use std::io;

use crate::TRANSIT_KEY_APPID;
use crate::channel::SecureChannel;
use crate::protocol::TransitMessage;
use crate::transit::traits::{TransitConnector, TransitStream};

/// Purpose suffix for transit key derivation
const TRANSIT_KEY_PURPOSE: &str = "/transit-key";

/// One direction's transport state: connector plus cached pipe
pub(crate) struct TransitHalf {
    connector: Box<dyn TransitConnector>,
    pipe: Option<Box<dyn TransitStream>>,
}

impl TransitHalf {
    pub fn new(connector: Box<dyn TransitConnector>) -> Self {
        Self {
            connector,
            pipe: None,
        }
    }

    /// Build our half of the transit handshake message.
    ///
    /// Hint enumeration may query the transport asynchronously and can
    /// fail; the caller reports that as a transfer error.
    pub async fn our_transit_message(&self) -> io::Result<TransitMessage> {
        let abilities = self.connector.abilities();
        let hints = self.connector.hints().await?;
        Ok(TransitMessage {
            abilities,
            hints: Some(hints),
        })
    }

    /// Install the peer's hints and derive the transit key.
    ///
    /// The key purpose uses the fixed compatibility app id
    /// ([`TRANSIT_KEY_APPID`]), not the configured one.
    pub fn complete_handshake(&mut self, channel: &dyn SecureChannel, message: &TransitMessage) {
        if let Some(hints) = &message.hints {
            self.connector.add_peer_hints(hints.clone());
        }
        let purpose = format!("{TRANSIT_KEY_APPID}{TRANSIT_KEY_PURPOSE}");
        let key = channel.derive_key(&purpose, self.connector.key_length());
        self.connector.set_key(key);
    }

    /// Drop the cached pipe so the transport closes; a later transfer
    /// reconnects.
    pub fn reset_pipe(&mut self) {
        self.pipe = None;
    }

    /// The connected byte-pipe, establishing it on first use
    pub async fn pipe(&mut self) -> io::Result<&mut dyn TransitStream> {
        if self.pipe.is_none() {
            self.pipe = Some(self.connector.connect().await?);
        }
        match self.pipe.as_deref_mut() {
            Some(pipe) => Ok(pipe),
            None => Err(io::Error::other("transit pipe unavailable")),
        }
    }
}
