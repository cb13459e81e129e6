//! Sending direction machine
//!
//! Performs the sender's transit handshake once per session and streams
//! one open [`PayloadSource`] at a time through the bulk pipe, hashing as
//! it goes and verifying the receiver's acknowledgement record. The
//! streaming body runs as a spawned task so the control channel stays
//! responsive; failures surface as [`Event::TransferError`], never as
//! panics or errors across the task boundary.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, info};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::TRANSFER_BUFFER_SIZE;
use crate::channel::SecureChannel;
use crate::errors::Error;
use crate::events::Event;
use crate::protocol::{AckRecord, ControlMessage, TransitMessage};
use crate::session::Notice;
use crate::transit::handshake::TransitHalf;
use crate::transit::pair::PairFlags;
use crate::transit::progress::Progress;
use crate::transit::source::PayloadSource;
use crate::transit::traits::TransitConnector;

pub struct TransitSender {
    transit: Arc<Mutex<TransitHalf>>,
    task: Option<JoinHandle<()>>,
}

impl TransitSender {
    pub fn new(connector: Box<dyn TransitConnector>) -> Self {
        Self {
            transit: Arc::new(Mutex::new(TransitHalf::new(connector))),
            task: None,
        }
    }

    /// Emit our transit handshake message over the control channel
    pub async fn send_transit(&self, channel: &dyn SecureChannel) -> Result<(), Error> {
        let message = self.transit.lock().await.our_transit_message().await?;
        debug!("sender transit handshake: {message:?}");
        channel.send_frame(ControlMessage::Transit(message).to_frame());
        Ok(())
    }

    /// Complete the handshake from the peer's transit message
    pub async fn handle_transit(&self, channel: &dyn SecureChannel, message: &TransitMessage) {
        self.transit.lock().await.complete_handshake(channel, message);
    }

    /// Stream `source` through the bulk pipe in a spawned task.
    ///
    /// The send-active flag clears when the task finishes, success or not.
    pub(crate) fn start_transfer(
        &mut self,
        source: PayloadSource,
        events: UnboundedSender<Event>,
        notices: UnboundedSender<Notice>,
        flags: Arc<PairFlags>,
    ) {
        let transit = Arc::clone(&self.transit);
        self.task = Some(tokio::spawn(async move {
            let id = source.id;
            let name = source.name.clone();
            let result = send_payload(&transit, source, &events).await;

            flags.sending.store(false, Ordering::Release);
            match result {
                Ok(()) => {
                    info!("confirmation received, transfer complete");
                    let _ = events.send(Event::TransferComplete { id, name });
                    let _ = notices.send(Notice::TransferComplete);
                }
                Err(error) => {
                    let _ = events.send(Event::TransferError {
                        error,
                        context: format!("sending {name}"),
                    });
                }
            }
        }));
    }

    /// Abort any in-flight transfer and release the cached pipe.
    ///
    /// An aborted task emits nothing. The pipe is cleared once the
    /// aborted task has let go of the transit state.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let transit = Arc::clone(&self.transit);
        tokio::spawn(async move {
            transit.lock().await.reset_pipe();
        });
    }
}

async fn send_payload(
    transit: &Mutex<TransitHalf>,
    mut source: PayloadSource,
    events: &UnboundedSender<Event>,
) -> Result<(), Error> {
    let mut half = transit.lock().await;
    let pipe = half.pipe().await?;
    info!("sending ({})", pipe.describe());

    let mut progress = Progress::new(events.clone(), source.id, source.transfer_bytes);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; TRANSFER_BUFFER_SIZE];

    if source.transfer_bytes > 0 {
        loop {
            let read = source
                .file
                .read(&mut buffer)
                .await
                .map_err(|e| Error::SendFile(e.to_string()))?;
            if read == 0 {
                break;
            }
            pipe.write_all(&buffer[..read]).await?;
            hasher.update(&buffer[..read]);
            progress.update(read as u64);
        }
    }
    let expected_hash = hex::encode(hasher.finalize());

    info!("file sent, awaiting confirmation");
    let ack_bytes = pipe.receive_record().await?;
    let ack: AckRecord = serde_json::from_slice(&ack_bytes)
        .map_err(|e| Error::SendFile(format!("transfer failed: unreadable ack: {e}")))?;

    if !ack.is_ok() {
        return Err(Error::SendFile(format!("transfer failed: {}", ack.ack)));
    }
    if let Some(remote_hash) = &ack.sha256
        && *remote_hash != expected_hash
    {
        return Err(Error::SendFile("transfer failed (bad remote hash)".into()));
    }

    Ok(())
}
