//! Ctrl-C handling
//!
//! The first interrupt triggers an orderly stop, even when something else
//! already stopped the pipeline. Only a second interrupt exits the process
//! immediately, skipping the drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use super::stop::{StopReason, StopSignal};
use crate::error::Result;

/// Exit code used when a second interrupt forces termination
pub const FORCED_EXIT_CODE: i32 = 130;

/// What to do about one interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Let the pipeline shut down in order
    Stop,
    /// Exit now
    ForceExit,
}

/// Counts interrupts delivered to one pipeline
#[derive(Debug)]
pub struct InterruptCounter {
    stop: StopSignal,
    seen: AtomicUsize,
}

impl InterruptCounter {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            stop,
            seen: AtomicUsize::new(0),
        }
    }

    /// Record one interrupt and trigger the stop signal
    ///
    /// The stop signal keeps the first reason it was given, so an interrupt
    /// after a peripheral loss still reports the loss.
    pub fn on_interrupt(&self) -> InterruptAction {
        let count = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop.trigger(StopReason::Interrupt);
        if count >= 2 {
            InterruptAction::ForceExit
        } else {
            InterruptAction::Stop
        }
    }

    /// Interrupts received so far
    pub fn count(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

/// Listen for Ctrl-C on a background thread
pub fn install(stop: StopSignal) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let counter = InterruptCounter::new(stop);

    let handle = std::thread::Builder::new()
        .name("biostream-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl-C: {}", e);
                        return;
                    }

                    match counter.on_interrupt() {
                        InterruptAction::Stop => {
                            tracing::info!("Interrupt received, shutting down (Ctrl-C again to force)")
                        }
                        InterruptAction::ForceExit => {
                            tracing::warn!("Second interrupt, exiting without draining");
                            std::process::exit(FORCED_EXIT_CODE);
                        }
                    }
                }
            })
        })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interrupt_stops_gracefully() {
        let stop = StopSignal::new();
        let counter = InterruptCounter::new(stop.clone());

        assert_eq!(counter.on_interrupt(), InterruptAction::Stop);
        assert_eq!(stop.reason(), Some(StopReason::Interrupt));
        assert_eq!(counter.on_interrupt(), InterruptAction::ForceExit);
    }

    #[test]
    fn test_first_interrupt_after_peripheral_loss_does_not_force_exit() {
        let stop = StopSignal::new();
        stop.trigger(StopReason::PeripheralLost);
        let counter = InterruptCounter::new(stop.clone());

        assert_eq!(counter.on_interrupt(), InterruptAction::Stop);
        assert_eq!(stop.reason(), Some(StopReason::PeripheralLost));
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.on_interrupt(), InterruptAction::ForceExit);
    }

    #[test]
    fn test_first_interrupt_after_requested_stop_does_not_force_exit() {
        let stop = StopSignal::new();
        stop.trigger(StopReason::Requested);
        let counter = InterruptCounter::new(stop);

        assert_eq!(counter.on_interrupt(), InterruptAction::Stop);
    }
}
