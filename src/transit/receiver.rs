//! Receiving direction machine
//!
//! Mirror of the sender: handshake once per session, then stream exactly
//! the declared byte count into the staged [`DestFile`], hash it, promote
//! the file, and send the acknowledgement record back over the pipe.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, info};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::TRANSFER_BUFFER_SIZE;
use crate::channel::SecureChannel;
use crate::errors::Error;
use crate::events::Event;
use crate::protocol::{AckRecord, ControlMessage, TransitMessage};
use crate::session::Notice;
use crate::transit::dest::DestFile;
use crate::transit::handshake::TransitHalf;
use crate::transit::pair::PairFlags;
use crate::transit::progress::Progress;
use crate::transit::traits::TransitConnector;

pub struct TransitReceiver {
    transit: Arc<Mutex<TransitHalf>>,
    task: Option<JoinHandle<()>>,
}

impl TransitReceiver {
    pub fn new(connector: Box<dyn TransitConnector>) -> Self {
        Self {
            transit: Arc::new(Mutex::new(TransitHalf::new(connector))),
            task: None,
        }
    }

    /// Emit our transit handshake reply over the control channel
    pub async fn send_transit(&self, channel: &dyn SecureChannel) -> Result<(), Error> {
        let message = self.transit.lock().await.our_transit_message().await?;
        debug!("receiver transit handshake: {message:?}");
        channel.send_frame(ControlMessage::Transit(message).to_frame());
        Ok(())
    }

    /// Complete the handshake from the peer's transit message
    pub async fn handle_transit(&self, channel: &dyn SecureChannel, message: &TransitMessage) {
        self.transit.lock().await.complete_handshake(channel, message);
    }

    /// Stream the peer's bytes into `dest` in a spawned task.
    ///
    /// The receive-active flag clears and the sink is cleaned up when the
    /// task finishes; cleanup after a successful promotion is a no-op.
    pub(crate) fn start_transfer(
        &mut self,
        mut dest: DestFile,
        events: UnboundedSender<Event>,
        notices: UnboundedSender<Notice>,
        flags: Arc<PairFlags>,
    ) {
        let transit = Arc::clone(&self.transit);
        self.task = Some(tokio::spawn(async move {
            let id = dest.id.unwrap_or_default();
            let result = receive_payload(&transit, &mut dest, &events).await;

            dest.cleanup().await;
            flags.receiving.store(false, Ordering::Release);
            match result {
                Ok(()) => {
                    info!("file received, transfer complete");
                    let _ = events.send(Event::TransferComplete {
                        id,
                        name: dest.name.clone(),
                    });
                    let _ = notices.send(Notice::TransferComplete);
                }
                Err(error) => {
                    let _ = events.send(Event::TransferError {
                        error,
                        context: format!("receiving {}", dest.name),
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

async fn receive_payload(
    transit: &Mutex<TransitHalf>,
    dest: &mut DestFile,
    events: &UnboundedSender<Event>,
) -> Result<(), Error> {
    let mut half = transit.lock().await;
    let pipe = half.pipe().await?;
    info!("receiving ({})", pipe.describe());

    let id = dest.id.unwrap_or_default();
    let mut progress = Progress::new(events.clone(), id, dest.transfer_bytes);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; TRANSFER_BUFFER_SIZE];

    let file = match dest.file.as_mut() {
        Some(file) => file,
        None => return Err(Error::ReceiveFile("destination was never opened".into())),
    };

    let mut remaining = dest.transfer_bytes;
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let read = pipe.read(&mut buffer[..want]).await?;
        if read == 0 {
            return Err(Error::ReceiveFile(
                "connection dropped before full file received".into(),
            ));
        }
        file.write_all(&buffer[..read])
            .await
            .map_err(|e| Error::ReceiveFile(e.to_string()))?;
        hasher.update(&buffer[..read]);
        progress.update(read as u64);
        remaining -= read as u64;
    }

    let hash_hex = hex::encode(hasher.finalize());
    dest.finalise().await?;

    let ack = AckRecord::ok(hash_hex);
    pipe.send_record(&ack.to_record()).await?;
    Ok(())
}
