//! Consumer loop
//!
//! Drains the transfer channel and fans every reading out to the window
//! store and to the sink of its kind, one reading at a time, in arrival
//! order. Returns when the channel is closed and empty.

use std::sync::PoisonError;

use crate::backend::transfer::ReadingReceiver;
use crate::store::{SharedWindowStore, SinkSet};
use crate::types::SignalKind;

/// Counters kept by the consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Readings taken off the channel
    pub received: u64,
    /// Readings per kind, indexed by [`SignalKind::index`]
    pub per_kind: [u64; SignalKind::COUNT],
}

impl ConsumerStats {
    pub fn received_for(&self, kind: SignalKind) -> u64 {
        self.per_kind[kind.index()]
    }
}

/// Run until the channel is closed and drained
///
/// Hands the sinks back so the coordinator can close them.
pub fn run(
    mut receiver: ReadingReceiver,
    windows: SharedWindowStore,
    mut sinks: SinkSet,
) -> (SinkSet, ConsumerStats) {
    let mut stats = ConsumerStats::default();
    tracing::debug!("Consumer started");

    while let Some(reading) = receiver.recv() {
        stats.received += 1;
        stats.per_kind[reading.kind.index()] += 1;

        windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_reading(&reading);
        sinks.append(&reading);
    }

    tracing::debug!("Consumer drained {} readings", stats.received);
    (sinks, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::transfer;
    use crate::config::PersistenceConfig;
    use crate::store::WindowStore;
    use crate::types::Reading;

    #[test]
    fn test_drains_everything_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PersistenceConfig {
            output_dir: dir.path().to_path_buf(),
            ..PersistenceConfig::default()
        };
        let sinks = SinkSet::new(&persistence, &chrono::Local::now());
        let windows = WindowStore::shared(200);
        let (tx, rx) = transfer::channel();

        tx.send(Reading::new(SignalKind::HeartSound, 1, 0.1)).unwrap();
        tx.send(Reading::new(SignalKind::BloodPressure, 2, 0.2)).unwrap();
        tx.send(Reading::new(SignalKind::HeartSound, 3, 0.3)).unwrap();
        tx.closer().close();

        let (mut sinks, stats) = run(rx, windows.clone(), sinks);
        sinks.close_all();

        assert_eq!(stats.received, 3);
        assert_eq!(stats.received_for(SignalKind::HeartSound), 2);
        assert_eq!(sinks.rows_written(SignalKind::HeartSound), 2);
        assert_eq!(sinks.rows_written(SignalKind::BloodPressure), 1);

        let windows = windows.read().unwrap();
        assert_eq!(windows.len(SignalKind::HeartSound), 2);
        assert_eq!(windows.latest(SignalKind::BloodPressure).unwrap().elapsed_seconds, 0.2);
    }
}
