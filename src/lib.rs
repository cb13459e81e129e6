//! Burrow transfer orchestration
//!
//! Core protocol layer for exchanging short text messages, single files, or
//! directories between two peers over an already-established secure,
//! rendezvous-matched channel (the magic-wormhole `text-or-file-xfer`
//! application protocol).
//!
//! The secure channel itself and the bulk "transit" transport are external
//! collaborators, consumed through the traits in [`channel`] and
//! [`transit`]. This crate owns everything in between:
//!
//! - [`protocol`] - the JSON control-message vocabulary (offers, answers,
//!   transit handshakes, commands, errors)
//! - [`transit`] - the per-direction handshake/transfer state machines, the
//!   pair coordinator that multiplexes both onto one control stream, and
//!   the payload source / destination sink file handling
//! - [`session`] - the public orchestrator consumed by the presentation
//!   layer: open/close/shutdown, send/receive operations, and the event
//!   stream
//!
//! All notifications (received messages, pending offers, progress,
//! completion, errors) arrive as [`events::Event`] values on the unbounded
//! channel returned by [`session::Session::new`].

pub mod channel;
pub mod config;
pub mod errors;
pub mod events;
pub mod protocol;
pub mod session;
pub mod transit;

pub use channel::{ChannelConfig, ChannelFactory, SecureChannel};
pub use config::SessionConfig;
pub use errors::Error;
pub use events::{ChannelEvent, CloseReason, Event};
pub use session::Session;

/// Application identifier registered with the rendezvous server.
pub const APPID: &str = "lothar.com/wormhole/text-or-file-xfer";

/// Application identifier used for transit key derivation.
///
/// Historically the reference implementation derived the transit key from a
/// hard-coded app id rather than the configured one (magic-wormhole bug
/// 339). Deployed peers expect this exact string, so it is a separate
/// constant: it must not drift if [`APPID`] or the configured app id ever
/// changes.
pub const TRANSIT_KEY_APPID: &str = "lothar.com/wormhole/text-or-file-xfer";

/// Buffer size for bulk transfer I/O (64KB)
pub const TRANSFER_BUFFER_SIZE: usize = 64 * 1024;
