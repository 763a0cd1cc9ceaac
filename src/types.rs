//! Core data types for biostream
//!
//! This module contains the fundamental data structures used throughout
//! the pipeline for representing signal identities and decoded samples.
//!
//! # Main Types
//!
//! - [`SignalKind`] - Closed set of logical data streams (heart sound, blood pressure)
//! - [`Reading`] - One decoded, scaled, timestamped sample
//! - [`SessionPhase`] - Connection session state machine phases
//!
//! # Scaling
//!
//! Peripherals deliver raw 12-bit ADC samples. A reading's scaled value is
//! `raw / ADC_FULL_SCALE * VREF`, with [`VREF`] fixed at 5.0 volts.

use serde::{Deserialize, Serialize};

/// Reference voltage of the peripheral ADC in volts
pub const VREF: f64 = 5.0;

/// Full-scale divisor of the 12-bit ADC
pub const ADC_FULL_SCALE: f64 = 4096.0;

/// Number of samples retained per signal for live display
pub const WINDOW_CAPACITY: usize = 200;

/// Logical identity of one data stream
///
/// Each kind is bound to exactly one characteristic, one window buffer and
/// one persistence sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalKind {
    /// Heart-sound proxy
    HeartSound,
    /// Blood-pressure proxy
    BloodPressure,
}

impl SignalKind {
    /// Every signal kind, in index order
    pub const ALL: [SignalKind; 2] = [SignalKind::HeartSound, SignalKind::BloodPressure];

    /// Number of signal kinds
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index for per-kind arrays
    pub const fn index(self) -> usize {
        match self {
            SignalKind::HeartSound => 0,
            SignalKind::BloodPressure => 1,
        }
    }

    /// Short tag used in file names and log lines
    pub const fn tag(self) -> &'static str {
        match self {
            SignalKind::HeartSound => "HS",
            SignalKind::BloodPressure => "BP",
        }
    }

    /// Human readable label for renderers
    pub const fn label(self) -> &'static str {
        match self {
            SignalKind::HeartSound => "heart sound",
            SignalKind::BloodPressure => "blood pressure",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::HeartSound => write!(f, "HeartSound"),
            SignalKind::BloodPressure => write!(f, "BloodPressure"),
        }
    }
}

/// Scale a raw ADC sample to volts
#[inline]
pub fn scale_raw(raw_value: u64) -> f64 {
    raw_value as f64 / ADC_FULL_SCALE * VREF
}

/// A single decoded sample
///
/// Created by the notification decoder when a notification arrives and never
/// modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Stream this sample belongs to
    pub kind: SignalKind,
    /// Raw unsigned value from the payload
    pub raw_value: u64,
    /// Seconds since the session started streaming
    pub elapsed_seconds: f64,
    /// Raw value scaled to volts
    pub scaled_value: f64,
}

impl Reading {
    /// Create a reading, deriving the scaled value from the raw value
    pub fn new(kind: SignalKind, raw_value: u64, elapsed_seconds: f64) -> Self {
        Self {
            kind,
            raw_value,
            elapsed_seconds,
            scaled_value: scale_raw(raw_value),
        }
    }
}

/// Phase of a connection session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No link to the peripheral
    #[default]
    Disconnected,
    /// Opening the link
    Connecting,
    /// Walking services and characteristics for diagnostics
    DiscoveringServices,
    /// Registering notification subscriptions
    Subscribing,
    /// Receiving notifications
    Streaming,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Disconnected => write!(f, "Disconnected"),
            SessionPhase::Connecting => write!(f, "Connecting..."),
            SessionPhase::DiscoveringServices => write!(f, "Discovering services"),
            SessionPhase::Subscribing => write!(f, "Subscribing"),
            SessionPhase::Streaming => write!(f, "Streaming"),
        }
    }
}
