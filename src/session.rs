//! Control protocol orchestration
//!
//! [`Session`] is the single object the presentation layer talks to. It
//! owns the secure channel, decodes incoming frames into control-protocol
//! semantics, routes bulk-transfer sub-messages to the
//! [`TransitPair`](crate::transit::TransitPair), tracks the peer's
//! capability set, and emits every observable outcome as an
//! [`Event`].
//!
//! ## Driving a session
//!
//! The secure-channel implementation reports [`ChannelEvent`]s on the
//! sender handed to its factory; the embedder pumps them by awaiting
//! [`Session::drive`] in its main loop (or forwards them explicitly via
//! [`Session::handle_channel_event`]). Events for the user arrive on the
//! receiver returned by [`Session::new`].

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::channel::{ChannelConfig, ChannelFactory, SecureChannel};
use crate::config::SessionConfig;
use crate::errors::Error;
use crate::events::{ChannelEvent, CloseReason, Event};
use crate::protocol::{ACK_OK, Answer, ControlMessage, Offer, PeerCapabilities, TransitMessage};
use crate::transit::TransitPair;
use crate::transit::traits::TransitFactory;

/// Internal notifications from transfer tasks back to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notice {
    /// A transfer finished; close the channel if the peer cannot keep it
    /// open for further exchanges
    TransferComplete,
}

pub struct Session {
    config: SessionConfig,
    channels: Box<dyn ChannelFactory>,
    transits: Box<dyn TransitFactory>,

    events: UnboundedSender<Event>,
    channel_tx: UnboundedSender<ChannelEvent>,
    channel_rx: UnboundedReceiver<ChannelEvent>,
    notice_tx: UnboundedSender<Notice>,
    notice_rx: UnboundedReceiver<Notice>,

    channel: Option<Arc<dyn SecureChannel>>,
    pair: Option<TransitPair>,
    peer: PeerCapabilities,
    connected: bool,
    shutting_down: bool,
}

impl Session {
    /// Create a session and the event stream it reports on.
    pub fn new(
        channels: Box<dyn ChannelFactory>,
        transits: Box<dyn TransitFactory>,
        config: SessionConfig,
    ) -> (Self, UnboundedReceiver<Event>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            channels,
            transits,
            events,
            channel_tx,
            channel_rx,
            notice_tx,
            notice_rx,
            channel: None,
            pair: None,
            peer: PeerCapabilities::default(),
            connected: false,
            shutting_down: false,
        };
        (session, event_rx)
    }

    /// Open a secure channel and bind a fresh transfer pair to it.
    ///
    /// An empty `code` requests a newly allocated human-readable code;
    /// otherwise the given code joins an existing channel.
    pub fn open(&mut self, code: &str) -> Result<(), Error> {
        debug!("open channel");
        if self.channel.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let channel = self.channels.open(
            ChannelConfig {
                appid: self.config.appid.clone(),
                rendezvous_url: self.config.rendezvous_url.clone(),
                versions: self.config.versions(),
            },
            self.channel_tx.clone(),
        )?;

        self.pair = Some(TransitPair::new(
            Arc::clone(&channel),
            self.transits.as_ref(),
            self.events.clone(),
            self.notice_tx.clone(),
        ));
        self.peer = PeerCapabilities::default();
        self.connected = false;
        self.shutting_down = false;

        if code.is_empty() {
            channel.allocate_code();
        } else {
            channel.set_code(code);
        }
        self.channel = Some(channel);
        Ok(())
    }

    /// Tear down the transfer pair and ask the channel to close.
    ///
    /// With no channel open this immediately reports `Closed`.
    pub fn close(&mut self) {
        debug!("close channel");
        match &self.channel {
            None => {
                let _ = self.events.send(Event::Closed);
            }
            Some(channel) => {
                if let Some(pair) = self.pair.as_mut() {
                    pair.close();
                }
                channel.close();
            }
        }
    }

    /// As [`Session::close`], but tell a connect-mode peer to shut down
    /// first and report the eventual close as `Shutdown`.
    pub fn shutdown(&mut self) {
        debug!("shutdown channel");
        if self.channel.is_none() {
            let _ = self.events.send(Event::Shutdown);
            return;
        }
        if self.connected && self.peer.connect_mode {
            let _ = self.send_control(&ControlMessage::Command("shutdown".into()));
        }
        self.shutting_down = true;
        self.close();
    }

    /// Offer a text message to the peer
    pub fn send_message(&mut self, text: &str) -> Result<(), Error> {
        self.send_control(&ControlMessage::Offer(Offer::Message(text.to_string())))
    }

    /// Offer the file or directory at `path`; `id` is echoed back in
    /// progress and completion events
    pub async fn send_file(&mut self, id: u64, path: &Path) -> Result<(), Error> {
        match self.pair.as_mut() {
            Some(pair) => pair.send_file(id, path).await,
            None => Err(Error::NotConnected),
        }
    }

    /// Accept the pending file offer into `dest_dir`.
    ///
    /// Peer-reportable failures (such as insufficient disk space) are
    /// serialized to the peer before being returned.
    pub async fn receive_file(&mut self, id: u64, dest_dir: &Path) -> Result<(), Error> {
        let result = match self.pair.as_mut() {
            Some(pair) => pair.receive_file(id, dest_dir).await,
            None => Err(Error::NotConnected),
        };
        if let Err(error) = &result
            && error.is_peer_reportable()
        {
            let _ = self.send_control(&ControlMessage::Error(error.to_string()));
        }
        result
    }

    /// Refuse the pending file offer.
    ///
    /// The refusal is reported to the peer and the channel closes; no
    /// local error event is raised, a refusal is expected behavior.
    pub fn refuse_file(&mut self) {
        if let Some(pair) = self.pair.as_mut() {
            pair.discard_offer();
        }
        self.respond_error(Error::Refused);
    }

    pub fn is_sending_file(&self) -> bool {
        self.pair.as_ref().is_some_and(TransitPair::is_sending_file)
    }

    pub fn is_receiving_file(&self) -> bool {
        self.pair
            .as_ref()
            .is_some_and(TransitPair::is_receiving_file)
    }

    /// Process the next channel event or transfer notice.
    ///
    /// Intended to be awaited from the embedder's main loop; pends until
    /// there is something to do.
    pub async fn drive(&mut self) {
        tokio::select! {
            Some(event) = self.channel_rx.recv() => self.handle_channel_event(event).await,
            Some(notice) = self.notice_rx.recv() => self.handle_notice(notice),
            else => std::future::pending().await,
        }
    }

    /// Feed one secure-channel event through the protocol
    pub async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Welcome(welcome) => debug!("channel welcome: {welcome}"),
            ChannelEvent::Code(code) => {
                debug!("channel code: {code}");
                let _ = self.events.send(Event::CodeAllocated { code });
            }
            ChannelEvent::Versions(versions) => {
                debug!("peer versions: {versions}");
                self.peer = PeerCapabilities::from_versions(&versions);
                self.connected = true;
                let _ = self.events.send(Event::Connected);
            }
            ChannelEvent::Message(frame) => self.handle_frame(&frame).await,
            ChannelEvent::Closed(reason) => self.handle_closed(reason),
        }
    }

    fn handle_notice(&mut self, notice: Notice) {
        match notice {
            Notice::TransferComplete => {
                if !self.peer.connect_mode {
                    self.close();
                }
            }
        }
    }

    fn handle_closed(&mut self, reason: CloseReason) {
        debug!("channel closed: {reason:?}");
        if let Some(pair) = self.pair.as_mut() {
            pair.close();
        }
        self.pair = None;
        self.channel = None;
        self.connected = false;

        if self.shutting_down {
            self.shutting_down = false;
            let _ = self.events.send(Event::Shutdown);
            return;
        }
        // A lonely close means no peer ever arrived; expected, not an
        // error.
        if let CloseReason::Error(message) = reason {
            let _ = self.events.send(Event::Error {
                error: Error::Transport(message),
            });
        }
        let _ = self.events.send(Event::Closed);
    }

    /// Decode and dispatch one control frame. Never fatal to the channel:
    /// undecodable frames and unknown keys are reported or ignored.
    async fn handle_frame(&mut self, frame: &[u8]) {
        let value: Value = match serde_json::from_slice(frame) {
            Ok(value) => value,
            Err(e) => {
                let _ = self.events.send(Event::Error {
                    error: Error::Decode(e.to_string()),
                });
                return;
            }
        };
        let Value::Object(map) = value else {
            let _ = self.events.send(Event::Error {
                error: Error::Decode("frame is not an object".into()),
            });
            return;
        };

        if let Some(error) = map.get("error") {
            let message = match error.as_str() {
                Some(text) => text.to_string(),
                None => error.to_string(),
            };
            let _ = self.events.send(Event::RemoteError { message });
            return;
        }

        for (key, contents) in &map {
            match key.as_str() {
                "offer" => self.handle_offer(contents),
                "answer" => self.handle_answer(contents),
                "transit" => match serde_json::from_value::<TransitMessage>(contents.clone()) {
                    Ok(message) => {
                        if let Some(pair) = self.pair.as_mut() {
                            pair.handle_transit(&message).await;
                        }
                    }
                    Err(e) => warn!("unusable transit message: {e}"),
                },
                "command" => {
                    if contents.as_str() == Some("shutdown") {
                        let _ = self.events.send(Event::PeerShutdown);
                        self.close();
                    } else {
                        warn!("unexpected command received: {contents}");
                    }
                }
                other => warn!("unexpected data received: {other}: {contents}"),
            }
        }
    }

    fn handle_offer(&mut self, contents: &Value) {
        let offer = match serde_json::from_value::<Offer>(contents.clone()) {
            Ok(offer) => offer,
            Err(_) => {
                self.respond_error(Error::Offer(contents.to_string()));
                return;
            }
        };

        match offer {
            Offer::Message(text) => {
                let _ = self.send_control(&ControlMessage::Answer(Answer::MessageAck(
                    ACK_OK.into(),
                )));
                let _ = self.events.send(Event::MessageReceived { text });
                if !self.peer.connect_mode {
                    self.close();
                }
            }
            file_or_directory => {
                let result = match self.pair.as_mut() {
                    Some(pair) => pair.handle_offer(&file_or_directory),
                    None => Err(Error::NotConnected),
                };
                match result {
                    Ok((name, size)) => {
                        let _ = self.events.send(Event::FileOfferPending { name, size });
                    }
                    Err(error) => self.respond_error(error),
                }
            }
        }
    }

    fn handle_answer(&mut self, contents: &Value) {
        match serde_json::from_value::<Answer>(contents.clone()) {
            Ok(Answer::MessageAck(result)) => {
                let success = result == ACK_OK;
                let _ = self.events.send(Event::MessageSent { success });
                if !success {
                    let _ = self.events.send(Event::Error {
                        error: Error::SendText(result),
                    });
                } else if !self.peer.connect_mode {
                    self.close();
                }
            }
            Ok(Answer::FileAck(result)) => {
                if result == ACK_OK {
                    if let Some(pair) = self.pair.as_mut() {
                        pair.handle_file_ack();
                    }
                } else {
                    let _ = self.events.send(Event::Error {
                        error: Error::SendFile(format!("transfer failed: {result}")),
                    });
                }
            }
            Err(e) => warn!("unexpected answer received: {e}"),
        }
    }

    /// Report a locally raised condition to the peer.
    ///
    /// A refusal closes the channel without a local error event; anything
    /// else stays open and surfaces locally too.
    fn respond_error(&mut self, error: Error) {
        let _ = self.send_control(&ControlMessage::Error(error.to_string()));
        if error == Error::Refused {
            self.close();
            return;
        }
        let _ = self.events.send(Event::Error { error });
    }

    fn send_control(&self, message: &ControlMessage) -> Result<(), Error> {
        match &self.channel {
            Some(channel) => {
                debug!("sending: {message:?}");
                channel.send_frame(message.to_frame());
                Ok(())
            }
            None => Err(Error::NotConnected),
        }
    }
}
