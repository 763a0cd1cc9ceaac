//! Sliding window store
//!
//! Bounded per-signal history for live display. Each [`WindowBuffer`] is a
//! ring buffer that evicts its oldest sample once full; the [`WindowStore`]
//! holds one buffer per [`SignalKind`].
//!
//! The consumer thread is the only writer. Renderers read through
//! [`SharedWindowStore`] and take snapshots whenever they like.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::types::{Reading, SignalKind, WINDOW_CAPACITY};

/// Window store shared between the consumer (writer) and renderers (readers)
pub type SharedWindowStore = Arc<RwLock<WindowStore>>;

/// One buffered sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    /// Seconds since the session started streaming
    pub elapsed_seconds: f64,
    /// Scaled value in volts
    pub value: f64,
}

/// Fixed-capacity FIFO of samples for one signal
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    samples: VecDeque<WindowSample>,
    capacity: usize,
    evicted: u64,
}

impl WindowBuffer {
    /// Create an empty buffer holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, elapsed_seconds: f64, value: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
        }
        self.samples.push_back(WindowSample {
            elapsed_seconds,
            value,
        });
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<WindowSample> {
        self.samples.iter().copied().collect()
    }

    /// Contents as `[time, value]` pairs for plotting
    pub fn as_plot_points(&self) -> Vec<[f64; 2]> {
        self.samples
            .iter()
            .map(|s| [s.elapsed_seconds, s.value])
            .collect()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<WindowSample> {
        self.samples.back().copied()
    }

    /// Time span covered by the buffer
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let first = self.samples.front()?.elapsed_seconds;
        let last = self.samples.back()?.elapsed_seconds;
        Some((first, last))
    }

    /// Smallest and largest buffered value
    pub fn value_range(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            return None;
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for s in &self.samples {
            min = min.min(s.value);
            max = max.max(s.value);
        }
        Some((min, max))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples dropped off the front so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.evicted = 0;
    }
}

/// One [`WindowBuffer`] per signal kind
#[derive(Debug, Clone)]
pub struct WindowStore {
    buffers: [WindowBuffer; SignalKind::COUNT],
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}

impl WindowStore {
    /// Create a store whose buffers hold `capacity` samples each
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: std::array::from_fn(|_| WindowBuffer::new(capacity)),
        }
    }

    /// Create a store ready to be shared with renderers
    pub fn shared(capacity: usize) -> SharedWindowStore {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Append a sample to the buffer for `kind`
    pub fn push(&mut self, kind: SignalKind, elapsed_seconds: f64, scaled_value: f64) {
        self.buffers[kind.index()].push(elapsed_seconds, scaled_value);
    }

    /// Append a decoded reading
    pub fn push_reading(&mut self, reading: &Reading) {
        self.push(reading.kind, reading.elapsed_seconds, reading.scaled_value);
    }

    /// Current contents for `kind`, oldest first
    pub fn snapshot(&self, kind: SignalKind) -> Vec<WindowSample> {
        self.buffers[kind.index()].snapshot()
    }

    /// The buffer for `kind`
    pub fn buffer(&self, kind: SignalKind) -> &WindowBuffer {
        &self.buffers[kind.index()]
    }

    pub fn latest(&self, kind: SignalKind) -> Option<WindowSample> {
        self.buffers[kind.index()].latest()
    }

    pub fn time_range(&self, kind: SignalKind) -> Option<(f64, f64)> {
        self.buffers[kind.index()].time_range()
    }

    pub fn value_range(&self, kind: SignalKind) -> Option<(f64, f64)> {
        self.buffers[kind.index()].value_range()
    }

    pub fn len(&self, kind: SignalKind) -> usize {
        self.buffers[kind.index()].len()
    }

    /// Empty every buffer
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_snapshot_in_order() {
        let mut store = WindowStore::default();
        store.push(SignalKind::HeartSound, 0.1, 1.0);
        store.push(SignalKind::HeartSound, 0.2, 2.0);
        store.push(SignalKind::BloodPressure, 0.15, 3.0);

        let hs = store.snapshot(SignalKind::HeartSound);
        assert_eq!(hs.len(), 2);
        assert_eq!(hs[0].value, 1.0);
        assert_eq!(hs[1].value, 2.0);
        assert_eq!(store.len(SignalKind::BloodPressure), 1);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut store = WindowStore::default();
        for i in 0..250 {
            store.push(SignalKind::HeartSound, i as f64, i as f64);
        }

        let snapshot = store.snapshot(SignalKind::HeartSound);
        assert_eq!(snapshot.len(), 200);
        assert_eq!(snapshot[0].value, 50.0);
        assert_eq!(snapshot[199].value, 249.0);
        assert_eq!(store.buffer(SignalKind::HeartSound).evicted(), 50);
        assert!(store.snapshot(SignalKind::BloodPressure).is_empty());
    }

    #[test]
    fn test_snapshot_is_non_destructive() {
        let mut store = WindowStore::new(4);
        store.push(SignalKind::BloodPressure, 1.0, 0.5);
        let first = store.snapshot(SignalKind::BloodPressure);
        let second = store.snapshot(SignalKind::BloodPressure);
        assert_eq!(first, second);
    }

    #[test]
    fn test_ranges_and_latest() {
        let mut buffer = WindowBuffer::new(10);
        assert!(buffer.time_range().is_none());
        assert!(buffer.value_range().is_none());

        buffer.push(1.0, 2.5);
        buffer.push(2.0, -1.0);
        buffer.push(3.0, 4.0);

        assert_eq!(buffer.time_range(), Some((1.0, 3.0)));
        assert_eq!(buffer.value_range(), Some((-1.0, 4.0)));
        assert_eq!(buffer.latest().unwrap().value, 4.0);
        assert_eq!(buffer.as_plot_points()[1], [2.0, -1.0]);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_reading_uses_scaled_value() {
        let mut store = WindowStore::default();
        store.push_reading(&Reading::new(SignalKind::HeartSound, 2048, 0.5));
        let latest = store.latest(SignalKind::HeartSound).unwrap();
        assert_eq!(latest.elapsed_seconds, 0.5);
        assert!((latest.value - 2.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn test_window_never_exceeds_capacity(count in 0usize..600, capacity in 1usize..250) {
            let mut buffer = WindowBuffer::new(capacity);
            for i in 0..count {
                buffer.push(i as f64, i as f64);
                prop_assert!(buffer.len() <= capacity);
            }

            let snapshot = buffer.snapshot();
            prop_assert_eq!(snapshot.len(), count.min(capacity));
            let first_kept = count.saturating_sub(capacity);
            for (offset, sample) in snapshot.iter().enumerate() {
                prop_assert_eq!(sample.value, (first_kept + offset) as f64);
            }
        }
    }
}
