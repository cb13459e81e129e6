//! Rate-limited progress reporting
//!
//! Bulk transfers call [`Progress::update`] for every chunk; updates are
//! throttled to one event per 100ms so a fast transfer does not flood the
//! event channel. The first update always fires.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use crate::events::Event;

/// Minimum interval between progress events (100ms = 10 updates/second)
const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Byte-count accumulator for one transfer
pub struct Progress {
    events: UnboundedSender<Event>,
    id: u64,
    total: u64,
    transferred: u64,
    last_update: Option<Instant>,
}

impl Progress {
    pub fn new(events: UnboundedSender<Event>, id: u64, total: u64) -> Self {
        Self {
            events,
            id,
            total,
            transferred: 0,
            last_update: None,
        }
    }

    /// Record `bytes` more transferred bytes, emitting an event if the
    /// rate limit allows.
    pub fn update(&mut self, bytes: u64) {
        self.update_at(Instant::now(), bytes);
    }

    fn update_at(&mut self, now: Instant, bytes: u64) {
        self.transferred += bytes;

        let due = match self.last_update {
            None => true,
            Some(last) => now.duration_since(last) >= PROGRESS_UPDATE_INTERVAL,
        };
        if due {
            let _ = self.events.send(Event::TransferProgress {
                id: self.id,
                transferred: self.transferred,
                total: self.total,
            });
            self.last_update = Some(now);
        }
    }
}
