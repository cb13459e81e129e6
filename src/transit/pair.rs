//! Transfer pair coordination
//!
//! One [`TransitPair`] per secure-channel session runs the sending and the
//! receiving machine concurrently while serializing both onto the shared
//! `transit` control-message stream. It enforces at-most-one active
//! transfer per direction and owns the first-message-wins routing rule for
//! incoming transit handshakes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::channel::SecureChannel;
use crate::errors::Error;
use crate::events::Event;
use crate::protocol::{ACK_OK, Answer, ControlMessage, Offer, TransitMessage};
use crate::session::Notice;
use crate::transit::dest::DestFile;
use crate::transit::receiver::TransitReceiver;
use crate::transit::sender::TransitSender;
use crate::transit::source::PayloadSource;
use crate::transit::traits::TransitFactory;

/// Per-direction transfer-active flags, shared with the transfer tasks so
/// status queries stay accurate while a task is in flight.
pub struct PairFlags {
    pub sending: AtomicBool,
    pub receiving: AtomicBool,
}

impl PairFlags {
    fn new() -> Self {
        Self {
            sending: AtomicBool::new(false),
            receiving: AtomicBool::new(false),
        }
    }
}

pub struct TransitPair {
    channel: Arc<dyn SecureChannel>,
    events: UnboundedSender<Event>,
    notices: UnboundedSender<Notice>,
    sender: TransitSender,
    receiver: TransitReceiver,
    flags: Arc<PairFlags>,

    source: Option<PayloadSource>,
    dest: Option<DestFile>,

    // Handshake-completed is sticky for the lifetime of one channel; a
    // fresh pair is created per session.
    send_handshake_complete: bool,
    receive_handshake_complete: bool,
    awaiting_transit_response: bool,
}

impl TransitPair {
    pub(crate) fn new(
        channel: Arc<dyn SecureChannel>,
        transits: &dyn TransitFactory,
        events: UnboundedSender<Event>,
        notices: UnboundedSender<Notice>,
    ) -> Self {
        Self {
            channel,
            events,
            notices,
            sender: TransitSender::new(transits.new_sender()),
            receiver: TransitReceiver::new(transits.new_receiver()),
            flags: Arc::new(PairFlags::new()),
            source: None,
            dest: None,
            send_handshake_complete: false,
            receive_handshake_complete: false,
            awaiting_transit_response: false,
        }
    }

    pub fn is_sending_file(&self) -> bool {
        self.flags.sending.load(Ordering::Acquire)
    }

    pub fn is_receiving_file(&self) -> bool {
        self.flags.receiving.load(Ordering::Acquire)
    }

    /// Open `path` and start the offer sequence for it.
    ///
    /// The first send of a session emits our transit handshake and defers
    /// the offer until the peer's response arrives; later sends offer
    /// immediately.
    pub async fn send_file(&mut self, id: u64, path: &Path) -> Result<(), Error> {
        debug!("TransitPair::send_file({id})");
        if self.is_sending_file() {
            return Err(Error::SendInProgress);
        }
        self.flags.sending.store(true, Ordering::Release);

        let source = match PayloadSource::open(id, path).await {
            Ok(source) => source,
            Err(error) => {
                self.flags.sending.store(false, Ordering::Release);
                return Err(error);
            }
        };
        self.source = Some(source);

        if !self.send_handshake_complete {
            self.awaiting_transit_response = true;
            if let Err(error) = self.sender.send_transit(self.channel.as_ref()).await {
                self.awaiting_transit_response = false;
                self.source = None;
                self.flags.sending.store(false, Ordering::Release);
                self.report_transfer_error(error, "transit handshake");
            }
        } else {
            self.send_offer();
        }
        Ok(())
    }

    /// Route an incoming transit message to the right direction.
    ///
    /// If we are awaiting a response to our own handshake, the message is
    /// taken as that response and belongs to the sender; otherwise it
    /// starts a new receive and we reply with our own handshake. When both
    /// peers begin a send at the same moment this first-message-wins rule
    /// can misattribute the first message; the wire vocabulary of deployed
    /// peers leaves no room for a direction marker, so the window is
    /// accepted.
    pub async fn handle_transit(&mut self, message: &TransitMessage) {
        debug!("TransitPair::handle_transit");

        if self.awaiting_transit_response {
            if !self.is_sending_file() {
                warn!("transit response arrived with no send in progress");
                return;
            }
            if !self.send_handshake_complete {
                self.send_handshake_complete = true;
                self.sender
                    .handle_transit(self.channel.as_ref(), message)
                    .await;
            }
            self.awaiting_transit_response = false;
            self.send_offer();
        } else {
            if self.is_receiving_file() {
                warn!("peer transit message while a receive is active; ignored");
                return;
            }
            if !self.receive_handshake_complete {
                self.receive_handshake_complete = true;
                self.receiver
                    .handle_transit(self.channel.as_ref(), message)
                    .await;
            }
            if let Err(error) = self.receiver.send_transit(self.channel.as_ref()).await {
                self.report_transfer_error(error, "transit handshake");
            }
        }
    }

    /// Peer accepted our file offer; begin the bulk transfer
    pub fn handle_file_ack(&mut self) {
        debug!("TransitPair::handle_file_ack");
        if !self.is_sending_file() {
            warn!("file_ack with no send in progress; ignored");
            return;
        }
        let Some(source) = self.source.take() else {
            warn!("file_ack but the payload source is gone; ignored");
            return;
        };
        self.sender.start_transfer(
            source,
            self.events.clone(),
            self.notices.clone(),
            Arc::clone(&self.flags),
        );
    }

    /// Validate an inbound file offer and stage it for acceptance.
    ///
    /// Returns the sanitized display name and logical size for the
    /// pending-offer notification.
    pub fn handle_offer(&mut self, offer: &Offer) -> Result<(String, u64), Error> {
        debug!("TransitPair::handle_offer");
        if self.is_receiving_file() {
            return Err(Error::Offer("a receive is already in progress".into()));
        }
        match offer {
            Offer::File(file) => {
                let dest = DestFile::new(&file.filename, file.filesize);
                let name = dest.name.clone();
                let size = dest.final_bytes;
                self.dest = Some(dest);
                Ok((name, size))
            }
            other => {
                let shape = serde_json::to_string(other).unwrap_or_default();
                Err(Error::Offer(shape))
            }
        }
    }

    /// Accept the pending offer: open the sink, acknowledge, and begin the
    /// bulk transfer.
    pub async fn receive_file(&mut self, id: u64, dest_dir: &Path) -> Result<(), Error> {
        debug!("TransitPair::receive_file({id})");
        if self.is_receiving_file() {
            return Err(Error::ReceiveInProgress);
        }
        let Some(mut dest) = self.dest.take() else {
            return Err(Error::NoOfferPending);
        };

        self.flags.receiving.store(true, Ordering::Release);
        if let Err(error) = dest.open(id, dest_dir).await {
            self.flags.receiving.store(false, Ordering::Release);
            return Err(error);
        }

        self.channel
            .send_frame(ControlMessage::Answer(Answer::FileAck(ACK_OK.into())).to_frame());

        self.receiver.start_transfer(
            dest,
            self.events.clone(),
            self.notices.clone(),
            Arc::clone(&self.flags),
        );
        Ok(())
    }

    /// Drop the pending offer, if any
    pub fn discard_offer(&mut self) {
        self.dest = None;
    }

    /// Cancel in-flight work and reset all per-session state.
    ///
    /// Aborted transfer tasks emit no completion or error events.
    pub fn close(&mut self) {
        self.sender.close();
        self.receiver.close();
        self.source = None;
        self.dest = None;
        self.send_handshake_complete = false;
        self.receive_handshake_complete = false;
        self.awaiting_transit_response = false;
        self.flags.sending.store(false, Ordering::Release);
        self.flags.receiving.store(false, Ordering::Release);
    }

    fn send_offer(&mut self) {
        let Some(source) = &self.source else {
            warn!("no payload source open; offer not sent");
            return;
        };
        self.channel
            .send_frame(ControlMessage::Offer(source.offer()).to_frame());
    }

    fn report_transfer_error(&self, error: Error, context: &str) {
        let _ = self.events.send(Event::TransferError {
            error,
            context: context.to_string(),
        });
    }
}
