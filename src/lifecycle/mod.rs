//! Lifecycle coordinator
//!
//! Ties the pipeline together: one thread runs the [`ConnectionSession`],
//! another runs the consumer loop, and a shared [`StopSignal`] ends both.
//!
//! # Shutdown order
//!
//! 1. The stop signal fires (interrupt, peripheral lost, caller request or
//!    startup failure)
//! 2. The session thread is joined; the peripheral has been disconnected
//! 3. The transfer channel is closed
//! 4. The consumer drains every reading still queued and is joined
//! 5. Every sink is flushed and closed
//!
//! # Example
//!
//! ```ignore
//! use biostream::lifecycle::Pipeline;
//!
//! let pipeline = Pipeline::new(config, provider)?;
//! let handle = pipeline.spawn()?;
//! let points = handle.snapshot(SignalKind::HeartSound);
//! handle.stop();
//! let report = handle.join()?;
//! ```

pub mod consumer;
pub mod interrupt;
pub mod stop;

pub use consumer::ConsumerStats;
pub use stop::{StopReason, StopSignal};

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::backend::provider::BleProvider;
use crate::backend::session::{ConnectionSession, SessionReport};
use crate::backend::transfer;
use crate::config::AppConfig;
use crate::error::{BioStreamError, Result};
use crate::store::{session_file_stem, SharedWindowStore, SinkSet, WindowSample, WindowStore};
use crate::types::SignalKind;

/// State shared by every part of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: Arc<AppConfig>,
    pub stop: StopSignal,
    pub windows: SharedWindowStore,
    /// Wall-clock start, used to name the sink files
    pub session_start: DateTime<Local>,
}

impl PipelineContext {
    /// Create a fresh context for `config`
    pub fn new(config: AppConfig) -> Self {
        let windows = WindowStore::shared(config.session.window_capacity);
        Self {
            config: Arc::new(config),
            stop: StopSignal::new(),
            windows,
            session_start: Local::now(),
        }
    }
}

/// Per-signal totals in a [`PipelineReport`]
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub kind: SignalKind,
    pub received: u64,
    pub rows_written: u64,
    pub dropped: u64,
    /// Sink file, if one was created
    pub file: Option<PathBuf>,
}

/// What a finished pipeline run did
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub session_start: DateTime<Local>,
    pub stop_reason: Option<StopReason>,
    pub session: SessionReport,
    pub readings_received: u64,
    /// Readings that reached the channel after the consumer finished
    pub readings_undelivered: u64,
    pub signals: Vec<SignalReport>,
}

impl PipelineReport {
    /// Totals for `kind`
    pub fn signal(&self, kind: SignalKind) -> Option<&SignalReport> {
        self.signals.iter().find(|s| s.kind == kind)
    }

    /// Rows written for `kind`
    pub fn rows_written(&self, kind: SignalKind) -> u64 {
        self.signal(kind).map_or(0, |s| s.rows_written)
    }

    /// Write the report as pretty JSON next to the sink files
    pub fn write_summary(&self, output_dir: &Path, timestamp_format: &str) -> Result<PathBuf> {
        let stem = session_file_stem(&self.session_start, timestamp_format);
        let path = output_dir.join(format!("{}_summary.json", stem));
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BioStreamError::Config(format!("Failed to serialize summary: {}", e)))?;
        std::fs::create_dir_all(output_dir)?;
        std::fs::write(&path, json)?;
        tracing::info!("Session summary written to {:?}", path);
        Ok(path)
    }
}

/// A configured pipeline, ready to run
pub struct Pipeline<P: BleProvider + 'static> {
    context: PipelineContext,
    provider: P,
}

impl<P: BleProvider + 'static> Pipeline<P> {
    /// Validate `config` and bind it to `provider`
    pub fn new(config: AppConfig, provider: P) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            context: PipelineContext::new(config),
            provider,
        })
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Handle for stopping the pipeline from elsewhere
    pub fn stop_signal(&self) -> StopSignal {
        self.context.stop.clone()
    }

    /// Window store renderers can read from
    pub fn windows(&self) -> SharedWindowStore {
        self.context.windows.clone()
    }

    /// Run on the current thread until the pipeline stops
    ///
    /// Startup failures are returned as errors once every thread has been
    /// joined and the sinks are closed.
    pub fn run(self) -> Result<PipelineReport> {
        let Pipeline { context, provider } = self;
        let config = context.config.clone();
        let stop = context.stop.clone();

        let (sender, receiver) = transfer::channel();
        let closer = sender.closer();
        let sinks = SinkSet::new(&config.persistence, &context.session_start);

        let windows = context.windows.clone();
        let consumer = thread::Builder::new()
            .name("biostream-consumer".to_string())
            .spawn(move || consumer::run(receiver, windows, sinks))?;

        let session_config = config.clone();
        let session_stop = stop.clone();
        let session = thread::Builder::new()
            .name("biostream-session".to_string())
            .spawn(move || {
                let mut session =
                    ConnectionSession::new(provider, session_config, session_stop.clone());
                let result = session.run(sender);
                if let Err(e) = &result {
                    tracing::error!("Session failed: {}", e);
                    session_stop.trigger(StopReason::StartupFailed);
                }
                result
            });

        let session_result = match session {
            Ok(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(BioStreamError::ThreadPanicked("session"))),
            Err(e) => Err(e.into()),
        };

        tracing::debug!("Session finished, draining transfer channel");
        closer.close();
        let (mut sinks, stats) = consumer
            .join()
            .map_err(|_| BioStreamError::ThreadPanicked("consumer"))?;
        sinks.close_all();

        let undelivered = closer.undelivered();
        if undelivered > 0 {
            tracing::warn!("{} readings arrived after the final drain and were lost", undelivered);
        }

        let session_report = session_result?;
        let signals = SignalKind::ALL
            .iter()
            .map(|&kind| {
                let sink = sinks.sink(kind);
                SignalReport {
                    kind,
                    received: stats.received_for(kind),
                    rows_written: sink.rows_written(),
                    dropped: sink.dropped(),
                    file: (sink.rows_written() > 0).then(|| sink.path().to_path_buf()),
                }
            })
            .collect();

        let report = PipelineReport {
            session_start: context.session_start,
            stop_reason: stop.reason(),
            session: session_report,
            readings_received: stats.received,
            readings_undelivered: undelivered,
            signals,
        };
        tracing::info!(
            "Pipeline stopped ({}): {} readings",
            report
                .stop_reason
                .map_or_else(|| "finished".to_string(), |r| r.to_string()),
            report.readings_received
        );
        Ok(report)
    }

    /// Run on a background thread
    pub fn spawn(self) -> Result<PipelineHandle> {
        let stop = self.stop_signal();
        let windows = self.windows();
        let thread = thread::Builder::new()
            .name("biostream-pipeline".to_string())
            .spawn(move || self.run())?;

        Ok(PipelineHandle {
            stop,
            windows,
            thread,
        })
    }
}

/// Handle to a pipeline running in the background
pub struct PipelineHandle {
    stop: StopSignal,
    windows: SharedWindowStore,
    thread: JoinHandle<Result<PipelineReport>>,
}

impl PipelineHandle {
    /// Current window contents for `kind`
    pub fn snapshot(&self, kind: SignalKind) -> Vec<WindowSample> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(kind)
    }

    pub fn windows(&self) -> SharedWindowStore {
        self.windows.clone()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Ask the pipeline to stop; returns immediately
    pub fn stop(&self) {
        self.stop.trigger(StopReason::Requested);
    }

    /// Whether the pipeline thread has finished
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the pipeline to finish
    pub fn join(self) -> Result<PipelineReport> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(BioStreamError::ThreadPanicked("pipeline")))
    }
}
