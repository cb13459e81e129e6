//! Error taxonomy for the transfer protocol
//!
//! Errors fall into three classes:
//!
//! - **Peer-reportable** errors (bad offer shape, insufficient disk space,
//!   user refusal) are serialized to the peer as an `{"error": ...}`
//!   control message before being surfaced or suppressed locally.
//! - **Transport** errors (handshake failure, dropped pipe) are reported
//!   through `Event::TransferError`, never returned across a spawned task
//!   boundary.
//! - Everything else is local-only and surfaces as `Event::Error` or a
//!   `Result` from the public operations.

use std::fmt;

/// Errors raised by the transfer protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A received frame was empty or not a JSON object
    Decode(String),
    /// Peer answered a text offer with something other than `ok`
    SendText(String),
    /// Sending a file failed (peer rejection, bad remote hash, bad source)
    SendFile(String),
    /// The transit connection closed before the full file arrived
    ReceiveFile(String),
    /// Peer sent an offer this implementation cannot accept
    Offer(String),
    /// Destination filesystem reports too little free space
    DiskSpace { needed: u64 },
    /// The local user refused the transfer
    Refused,
    /// Secure channel or transit transport failure
    Transport(String),
    /// A send is already in progress for this session
    SendInProgress,
    /// A receive is already in progress for this session
    ReceiveInProgress,
    /// No file offer is pending acceptance
    NoOfferPending,
    /// No secure channel is open
    NotConnected,
    /// A secure channel is already open
    AlreadyOpen,
}

impl Error {
    /// Whether this error must be serialized to the peer as an `error`
    /// control message before local handling.
    pub fn is_peer_reportable(&self) -> bool {
        matches!(
            self,
            Error::Offer(_) | Error::DiskSpace { .. } | Error::Refused
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(detail) => write!(f, "unable to decode message: {detail}"),
            Error::SendText(result) => write!(f, "message rejected by peer: {result}"),
            Error::SendFile(detail) => write!(f, "file send failed: {detail}"),
            Error::ReceiveFile(detail) => write!(f, "file receive failed: {detail}"),
            Error::Offer(detail) => write!(f, "unknown offer: {detail}"),
            Error::DiskSpace { needed } => {
                write!(f, "insufficient free disk space (need {needed}B)")
            }
            Error::Refused => write!(f, "transfer refused"),
            Error::Transport(detail) => write!(f, "transport failure: {detail}"),
            Error::SendInProgress => write!(f, "a file send is already in progress"),
            Error::ReceiveInProgress => write!(f, "a file receive is already in progress"),
            Error::NoOfferPending => write!(f, "no file offer is pending"),
            Error::NotConnected => write!(f, "no channel is open"),
            Error::AlreadyOpen => write!(f, "a channel is already open"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_reportable_classes() {
        assert!(Error::Offer("x".into()).is_peer_reportable());
        assert!(Error::DiskSpace { needed: 1 }.is_peer_reportable());
        assert!(Error::Refused.is_peer_reportable());

        assert!(!Error::Decode("x".into()).is_peer_reportable());
        assert!(!Error::SendFile("x".into()).is_peer_reportable());
        assert!(!Error::Transport("x".into()).is_peer_reportable());
        assert!(!Error::SendInProgress.is_peer_reportable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::DiskSpace { needed: 42 }.to_string(),
            "insufficient free disk space (need 42B)"
        );
        assert_eq!(
            Error::SendFile("bad remote hash".into()).to_string(),
            "file send failed: bad remote hash"
        );
    }
}
