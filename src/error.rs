//! Error handling for the biostream pipeline
//!
//! This module defines the pipeline error taxonomy and a Result alias for use
//! throughout the crate. Startup failures (discovery, connect, subscribe) are
//! fatal and surface to the caller; the remaining variants are absorbed and
//! logged where they occur.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::types::SignalKind;

/// Main error type for biostream operations
#[derive(Error, Debug)]
pub enum BioStreamError {
    /// No advertising peripheral matched the target name
    #[error("Peripheral not found: no device advertising as \"{name}\"")]
    PeripheralNotFound { name: String },

    /// Transport-level connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// A required subscription target is absent on the peripheral
    #[error("Characteristic not found: {kind} ({uuid})")]
    CharacteristicNotFound { kind: SignalKind, uuid: Uuid },

    /// Diagnostic read of a characteristic value failed
    #[error("Characteristic read error on {uuid}: {message}")]
    CharacteristicRead { uuid: Uuid, message: String },

    /// Diagnostic read of a descriptor value failed
    #[error("Descriptor read error on {uuid}: {message}")]
    DescriptorRead { uuid: Uuid, message: String },

    /// The peripheral dropped the link mid-stream
    #[error("Peripheral disconnected")]
    Disconnected,

    /// A sink could not write a record
    #[error("Persistence write error for {kind} at {path:?}: {source}")]
    PersistenceWrite {
        kind: SignalKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic failure reported by the BLE provider
    #[error("BLE error: {0}")]
    Ble(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transfer channel was closed before the send
    #[error("Transfer channel closed")]
    ChannelClosed,

    /// A pipeline thread panicked
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BioStreamError>,
    },
}

impl BioStreamError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BioStreamError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error aborts pipeline startup
    pub fn is_startup_fatal(&self) -> bool {
        match self {
            BioStreamError::PeripheralNotFound { .. }
            | BioStreamError::Connection(_)
            | BioStreamError::CharacteristicNotFound { .. }
            | BioStreamError::Ble(_) => true,
            BioStreamError::WithContext { source, .. } => source.is_startup_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for biostream operations
pub type Result<T> = std::result::Result<T, BioStreamError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
