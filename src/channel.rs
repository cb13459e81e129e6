//! Secure channel seam
//!
//! The rendezvous-matched, key-agreed message channel is an external
//! collaborator. Calls on [`SecureChannel`] are fire-and-forget; results
//! (allocated code, peer versions, received frames, close) come back as
//! [`ChannelEvent`]s on the sender given to the factory, mirroring the
//! delegate model of the underlying wormhole object.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::errors::Error;
use crate::events::ChannelEvent;

/// Parameters for constructing a secure channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Application identifier registered with the rendezvous server
    pub appid: String,
    /// Rendezvous relay URL
    pub rendezvous_url: String,
    /// Our protocol version advertisement
    pub versions: Value,
}

/// An open secure channel.
///
/// Implementations are expected to be internally synchronized; all methods
/// take `&self` and may be called from the session or its transfer tasks.
pub trait SecureChannel: Send + Sync {
    /// Request a newly allocated human-readable code
    fn allocate_code(&self);

    /// Join the channel identified by an existing code
    fn set_code(&self, code: &str);

    /// Queue one opaque frame for the peer
    fn send_frame(&self, frame: Vec<u8>);

    /// Derive a sub-key from the channel's session key.
    ///
    /// Only valid once key exchange has completed, which the session
    /// guarantees by deriving transit keys strictly after the peer's
    /// versions arrived.
    fn derive_key(&self, purpose: &str, length: usize) -> Vec<u8>;

    /// Ask the channel to close; completion is reported via
    /// [`ChannelEvent::Closed`]
    fn close(&self);
}

/// Constructs secure channels for the session
pub trait ChannelFactory: Send + Sync {
    /// Open a channel, wiring its lifecycle events to `events`.
    ///
    /// Fails only by forwarding the channel implementation's own
    /// construction errors.
    fn open(
        &self,
        config: ChannelConfig,
        events: UnboundedSender<ChannelEvent>,
    ) -> Result<std::sync::Arc<dyn SecureChannel>, Error>;
}
