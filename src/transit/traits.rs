//! Transit transport seam
//!
//! The relay/direct connection negotiation lives outside this crate. A
//! [`TransitConnector`] is one direction's handle to that machinery:
//! it advertises abilities, enumerates connection hints (possibly
//! asynchronously, e.g. querying the relay), accepts the peer's hints and
//! the derived transit key, and finally yields a connected byte-pipe.

use std::io;

use async_trait::async_trait;
use serde_json::Value;

/// One direction's bulk-transport connection machinery
#[async_trait]
pub trait TransitConnector: Send {
    /// Our transport capability advertisement (`abilities-v1`)
    fn abilities(&self) -> Value;

    /// Our connection hints (`hints-v1`); may need to enumerate local and
    /// relay addresses asynchronously
    async fn hints(&self) -> io::Result<Value>;

    /// Record the peer's connection hints
    fn add_peer_hints(&mut self, hints: Value);

    /// Required transit key length in bytes
    fn key_length(&self) -> usize;

    /// Install the derived transit key
    fn set_key(&mut self, key: Vec<u8>);

    /// Establish the bulk connection (relay or direct)
    async fn connect(&mut self) -> io::Result<Box<dyn TransitStream>>;
}

/// A connected bulk byte-pipe with record framing for acknowledgements
#[async_trait]
pub trait TransitStream: Send {
    /// Read some bytes; `Ok(0)` means the pipe closed
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf`
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Send one framed record (used for the transfer acknowledgement)
    async fn send_record(&mut self, record: &[u8]) -> io::Result<()>;

    /// Receive one framed record
    async fn receive_record(&mut self) -> io::Result<Vec<u8>>;

    /// Human-readable description of the route (direct/relay), for logging
    fn describe(&self) -> String;
}

/// Creates the two per-direction connectors for a session
pub trait TransitFactory: Send + Sync {
    /// Connector for the sending direction
    fn new_sender(&self) -> Box<dyn TransitConnector>;

    /// Connector for the receiving direction
    fn new_receiver(&self) -> Box<dyn TransitConnector>;
}
