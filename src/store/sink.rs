//! Persistence sinks
//!
//! One append-only CSV file per [`SignalKind`], named after the session
//! start time and the kind tag, e.g. `19_10_2026_14_05_HS.csv`. Each record
//! is `elapsed_seconds,raw_value` terminated by CRLF, without a header.
//!
//! Files are opened lazily on the first record, so a session that never
//! streams leaves nothing behind. A write failure degrades the sink: the
//! error is reported once, later records for that kind are counted as
//! dropped, and the rest of the pipeline keeps running.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::config::{PersistenceConfig, DEFAULT_FILE_TIMESTAMP_FORMAT};
use crate::error::{BioStreamError, Result};
use crate::types::{Reading, SignalKind};

/// Lifecycle of a sink file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Nothing written yet, no file on disk
    Pending,
    /// File open and accepting records
    Open,
    /// A write failed; records are dropped
    Degraded,
    /// Flushed and released
    Closed,
}

/// Append-only record file for one signal kind
#[derive(Debug)]
pub struct SinkFile {
    kind: SignalKind,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    state: SinkState,
    flush_every: usize,
    unflushed: usize,
    rows_written: u64,
    dropped: u64,
}

impl SinkFile {
    /// Create a sink; the file is not touched until the first append
    pub fn new(kind: SignalKind, path: PathBuf, flush_every: usize) -> Self {
        Self {
            kind,
            path,
            writer: None,
            state: SinkState::Pending,
            flush_every: flush_every.max(1),
            unflushed: 0,
            rows_written: 0,
            dropped: 0,
        }
    }

    /// Write one record
    ///
    /// Returns the error for the write that degraded the sink. Records
    /// offered to a degraded or closed sink are counted in
    /// [`SinkFile::dropped`] and `Ok` is returned.
    ///
    /// A record counts as written once it is in the buffer. If a later flush
    /// fails, every buffered record moves from written to dropped.
    pub fn append(&mut self, elapsed_seconds: f64, raw_value: u64) -> Result<()> {
        match self.state {
            SinkState::Degraded | SinkState::Closed => {
                self.dropped += 1;
                return Ok(());
            }
            SinkState::Pending => {
                if let Err(e) = self.open() {
                    self.dropped += 1;
                    return Err(e);
                }
            }
            SinkState::Open => {}
        }

        if let Err(e) = self.write_record(elapsed_seconds, raw_value) {
            return Err(self.degrade(e));
        }
        Ok(())
    }

    fn write_record(&mut self, elapsed_seconds: f64, raw_value: u64) -> std::io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(std::io::Error::other("sink is not open"));
        };

        // Counted up front so a failed write lands in `dropped` via `degrade`
        self.unflushed += 1;
        self.rows_written += 1;
        write!(writer, "{},{}\r\n", elapsed_seconds, raw_value)?;

        if self.unflushed >= self.flush_every {
            writer.flush()?;
            self.unflushed = 0;
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        let opened = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
            });

        match opened {
            Ok(file) => {
                self.writer = Some(BufWriter::new(file));
                self.state = SinkState::Open;
                tracing::info!("{} sink opened file: {:?}", self.kind.tag(), self.path);
                Ok(())
            }
            Err(e) => Err(self.degrade(e)),
        }
    }

    fn degrade(&mut self, source: std::io::Error) -> BioStreamError {
        let lost = self.unflushed as u64;
        self.unflushed = 0;
        self.rows_written -= lost;
        self.dropped += lost;
        self.state = SinkState::Degraded;
        self.writer = None;
        BioStreamError::PersistenceWrite {
            kind: self.kind,
            path: self.path.clone(),
            source,
        }
    }

    /// Flush and release the file
    ///
    /// Idempotent.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                let err = self.degrade(e);
                tracing::error!("{} sink failed to flush on close: {}", self.kind.tag(), err);
                return;
            }
            self.unflushed = 0;
            tracing::info!(
                "{} sink closed file after {} rows",
                self.kind.tag(),
                self.rows_written
            );
        }
        if self.state != SinkState::Degraded {
            self.state = SinkState::Closed;
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Records written to the file
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Records lost to a write failure
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// File stem shared by the sinks of one session
///
/// Falls back to the default format when `format` is not a valid chrono
/// format string.
pub fn session_file_stem(start: &DateTime<Local>, format: &str) -> String {
    let mut stem = String::new();
    if write!(stem, "{}", start.format(format)).is_ok() && !stem.is_empty() {
        return stem;
    }

    tracing::warn!(
        "Invalid file timestamp format {:?}, using {:?}",
        format,
        DEFAULT_FILE_TIMESTAMP_FORMAT
    );
    start.format(DEFAULT_FILE_TIMESTAMP_FORMAT).to_string()
}

/// Path of the sink file for `kind`
pub fn sink_path(output_dir: &Path, stem: &str, kind: SignalKind) -> PathBuf {
    output_dir.join(format!("{}_{}.csv", stem, kind.tag()))
}

/// The sinks of one session, indexed by kind
#[derive(Debug)]
pub struct SinkSet {
    sinks: [SinkFile; SignalKind::COUNT],
}

impl SinkSet {
    /// Create pending sinks for a session that started at `start`
    pub fn new(config: &PersistenceConfig, start: &DateTime<Local>) -> Self {
        let stem = session_file_stem(start, &config.file_timestamp_format);
        let sinks = SignalKind::ALL.map(|kind| {
            SinkFile::new(
                kind,
                sink_path(&config.output_dir, &stem, kind),
                config.flush_every,
            )
        });
        Self { sinks }
    }

    /// Route a reading to the sink of its own kind
    pub fn append(&mut self, reading: &Reading) {
        let sink = &mut self.sinks[reading.kind.index()];
        if let Err(e) = sink.append(reading.elapsed_seconds, reading.raw_value) {
            tracing::error!("{}; further {} records will be dropped", e, reading.kind.tag());
        }
    }

    /// Close every sink; idempotent
    pub fn close_all(&mut self) {
        for sink in &mut self.sinks {
            sink.close();
        }
    }

    pub fn sink(&self, kind: SignalKind) -> &SinkFile {
        &self.sinks[kind.index()]
    }

    pub fn rows_written(&self, kind: SignalKind) -> u64 {
        self.sinks[kind.index()].rows_written()
    }

    pub fn dropped(&self, kind: SignalKind) -> u64 {
        self.sinks[kind.index()].dropped()
    }
}

impl Drop for SinkSet {
    fn drop(&mut self) {
        self.close_all();
    }
}
