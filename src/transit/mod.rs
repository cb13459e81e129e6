//! Bulk transfer machinery
//!
//! One [`pair::TransitPair`] per secure-channel session multiplexes a
//! sending and a receiving state machine onto the shared `transit`
//! control-message stream. The machines drive the external transport
//! (behind [`traits::TransitConnector`]) and the file-handling leaves:
//! [`source::PayloadSource`], [`dest::DestFile`], [`progress::Progress`].

pub mod dest;
mod handshake;
pub mod pair;
pub mod progress;
pub mod receiver;
pub mod sender;
pub mod source;
pub mod traits;

pub use dest::DestFile;
pub use pair::TransitPair;
pub use source::PayloadSource;
pub use traits::{TransitConnector, TransitFactory, TransitStream};
