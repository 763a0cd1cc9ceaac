//! Transfer channel between the connection and consumer threads
//!
//! A single-producer, single-consumer FIFO of [`Reading`]s backed by an
//! unbounded crossbeam channel. Sending never blocks. Receiving blocks until
//! an item arrives or the channel has been closed and fully drained.
//!
//! Closing is explicit: the lifecycle coordinator calls
//! [`ChannelCloser::close`] once the connection thread has been joined.
//! Readings already enqueued at that point are still delivered.
//!
//! Neither [`ReadingSender`] nor [`ReadingReceiver`] is `Clone`; the
//! connection session shares its sender with the notification callbacks it
//! registers behind an `Arc`, which keeps a single logical producer.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BioStreamError, Result};
use crate::types::Reading;

/// State shared by both ends of the channel
#[derive(Debug, Default)]
struct ChannelShared {
    closed: AtomicBool,
    sent: AtomicU64,
    received: AtomicU64,
}

/// Create a new transfer channel
pub fn channel() -> (ReadingSender, ReadingReceiver) {
    let (tx, rx) = unbounded();
    let (close_tx, close_rx) = bounded(1);
    let shared = Arc::new(ChannelShared::default());

    let sender = ReadingSender {
        tx,
        closer: ChannelCloser {
            close_tx,
            shared: shared.clone(),
        },
    };

    let receiver = ReadingReceiver {
        rx,
        close_rx,
        closing: false,
        shared,
    };

    (sender, receiver)
}

/// Producer end of the transfer channel
#[derive(Debug)]
pub struct ReadingSender {
    tx: Sender<Reading>,
    closer: ChannelCloser,
}

impl ReadingSender {
    /// Enqueue a reading
    ///
    /// Never blocks. Fails only once the channel has been closed.
    pub fn send(&self, reading: Reading) -> Result<()> {
        if self.closer.is_closed() {
            return Err(BioStreamError::ChannelClosed);
        }

        self.tx
            .send(reading)
            .map_err(|_| BioStreamError::ChannelClosed)?;
        self.closer.shared.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Handle the coordinator uses to close the channel
    pub fn closer(&self) -> ChannelCloser {
        self.closer.clone()
    }

    /// Number of readings sent so far
    pub fn sent_count(&self) -> u64 {
        self.closer.shared.sent.load(Ordering::Relaxed)
    }
}

/// Closes the transfer channel
#[derive(Debug, Clone)]
pub struct ChannelCloser {
    close_tx: Sender<()>,
    shared: Arc<ChannelShared>,
}

impl ChannelCloser {
    /// Close the channel; later sends are rejected
    ///
    /// Idempotent.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            let _ = self.close_tx.try_send(());
        }
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Readings accepted by the sender but never handed to the receiver
    ///
    /// Non-zero after the final drain only when a send raced the close.
    pub fn undelivered(&self) -> u64 {
        let sent = self.shared.sent.load(Ordering::SeqCst);
        let received = self.shared.received.load(Ordering::SeqCst);
        sent.saturating_sub(received)
    }
}

/// Consumer end of the transfer channel
#[derive(Debug)]
pub struct ReadingReceiver {
    rx: Receiver<Reading>,
    close_rx: Receiver<()>,
    /// Set once the close notification has been observed
    closing: bool,
    shared: Arc<ChannelShared>,
}

impl ReadingReceiver {
    /// Block until a reading is available
    ///
    /// Returns `None` once the channel is closed and every enqueued reading
    /// has been handed out.
    pub fn recv(&mut self) -> Option<Reading> {
        let reading = if self.closing {
            self.rx.try_recv().ok()
        } else {
            select! {
                recv(self.rx) -> msg => msg.ok(),
                recv(self.close_rx) -> _ => {
                    self.closing = true;
                    self.rx.try_recv().ok()
                }
            }
        };
        self.count(reading)
    }

    /// Wait up to `timeout` for a reading
    ///
    /// Returns `None` on timeout as well as after close-and-drain; use
    /// [`ReadingReceiver::is_finished`] to tell the two apart.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Reading> {
        if self.closing {
            return self.try_recv();
        }

        let reading = select! {
            recv(self.rx) -> msg => msg.ok(),
            recv(self.close_rx) -> _ => {
                self.closing = true;
                self.rx.try_recv().ok()
            }
            default(timeout) => None,
        };
        self.count(reading)
    }

    /// Take a reading if one is ready
    pub fn try_recv(&mut self) -> Option<Reading> {
        let reading = self.rx.try_recv().ok();
        self.count(reading)
    }

    /// Whether the channel is closed and holds no more readings
    pub fn is_finished(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst) && self.rx.is_empty()
    }

    /// Number of readings waiting in the queue
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Number of readings received so far
    pub fn received_count(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    fn count(&self, reading: Option<Reading>) -> Option<Reading> {
        if reading.is_some() {
            self.shared.received.fetch_add(1, Ordering::SeqCst);
        }
        reading
    }
}
