//! Session configuration
//!
//! Defaults point at the public magic-wormhole infrastructure; embedders
//! running their own rendezvous or transit relay override these.

use serde_json::{Value, json};

use crate::APPID;

/// Public rendezvous relay operated by the magic-wormhole project
pub const RENDEZVOUS_RELAY: &str = "ws://relay.magic-wormhole.io:4000/v1";

/// Public transit relay operated by the magic-wormhole project
pub const TRANSIT_RELAY: &str = "tcp:transit.magic-wormhole.io:4001";

/// Configuration for a [`crate::Session`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application identifier sent to the rendezvous server
    pub appid: String,
    /// Rendezvous relay URL
    pub rendezvous_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            appid: APPID.to_string(),
            rendezvous_url: RENDEZVOUS_RELAY.to_string(),
        }
    }
}

impl SessionConfig {
    /// Version advertisement sent during the secure channel's key exchange.
    ///
    /// `mode: connect` declares that we keep the channel open for multiple
    /// offer/answer round-trips instead of closing after the first.
    pub fn versions(&self) -> Value {
        json!({ "v0": { "mode": "connect" } })
    }
}
