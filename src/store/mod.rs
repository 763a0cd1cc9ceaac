//! Storage for decoded readings
//!
//! - [`WindowStore`] - Bounded per-signal history for live display
//! - [`SinkSet`] - Append-only CSV files, one per signal kind

pub mod sink;
pub mod window;

pub use sink::{session_file_stem, sink_path, SinkFile, SinkSet, SinkState};
pub use window::{SharedWindowStore, WindowBuffer, WindowSample, WindowStore};
