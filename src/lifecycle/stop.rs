//! Shared stop signal
//!
//! One [`StopSignal`] is created per pipeline and cloned into every activity
//! that must observe shutdown. Triggering is idempotent and the first reason
//! recorded wins. Waiters blocked in [`StopSignal::wait_timeout`] wake as soon
//! as the signal fires.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Why the pipeline is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Ctrl-C or another external interrupt
    Interrupt,
    /// A caller asked for the stop
    Requested,
    /// The peripheral dropped the link
    PeripheralLost,
    /// The session could not start streaming
    StartupFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Interrupt => write!(f, "interrupted"),
            StopReason::Requested => write!(f, "stop requested"),
            StopReason::PeripheralLost => write!(f, "peripheral lost"),
            StopReason::StartupFailed => write!(f, "startup failed"),
        }
    }
}

struct StopInner {
    stopped: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    /// Dropped on trigger, which wakes every receiver
    wake_tx: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
}

/// Cooperative cancellation flag shared by the pipeline threads
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .field("reason", &self.reason())
            .finish()
    }
}

impl StopSignal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(0);
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                reason: Mutex::new(None),
                wake_tx: Mutex::new(Some(wake_tx)),
                wake_rx,
            }),
        }
    }

    /// Fire the signal
    ///
    /// Returns `true` for the call that actually triggered it.
    pub fn trigger(&self, reason: StopReason) -> bool {
        if let Ok(mut slot) = self.inner.reason.lock() {
            slot.get_or_insert(reason);
        }

        let first = !self.inner.stopped.swap(true, Ordering::SeqCst);
        if first {
            tracing::debug!("Stop signal triggered: {}", reason);
            if let Ok(mut tx) = self.inner.wake_tx.lock() {
                tx.take();
            }
        }
        first
    }

    /// Whether the signal has fired
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// The first reason the signal was triggered with
    pub fn reason(&self) -> Option<StopReason> {
        self.inner.reason.lock().ok().and_then(|r| *r)
    }

    /// Sleep for up to `timeout`, returning early when the signal fires
    ///
    /// Returns `true` if the signal has fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        match self.inner.wake_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => self.is_stopped(),
        }
    }

    /// Block until the signal fires
    pub fn wait(&self) {
        while !self.is_stopped() {
            let _ = self.inner.wake_rx.recv();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_first_reason_wins() {
        let stop = StopSignal::new();
        assert!(stop.trigger(StopReason::PeripheralLost));
        assert!(!stop.trigger(StopReason::Interrupt));
        assert!(stop.is_stopped());
        assert_eq!(stop.reason(), Some(StopReason::PeripheralLost));
    }

    #[test]
    fn test_wait_timeout_expires_when_not_triggered() {
        let stop = StopSignal::new();
        let start = Instant::now();
        assert!(!stop.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_timeout_wakes_promptly() {
        let stop = StopSignal::new();
        let trigger = stop.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.trigger(StopReason::Requested);
        });

        let start = Instant::now();
        assert!(stop.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_returns_after_trigger() {
        let stop = StopSignal::new();
        stop.trigger(StopReason::Interrupt);
        stop.wait();
        assert!(stop.wait_timeout(Duration::from_secs(10)));
    }
}
