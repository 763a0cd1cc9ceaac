//! Notification payload decoding
//!
//! Peripherals push each sample as an unsigned little-endian integer that
//! spans the whole notification payload. There is no framing and no length
//! field, so any payload length is accepted.

use crate::types::{Reading, SignalKind};

/// Width of the decoded integer in bytes
const RAW_VALUE_BYTES: usize = std::mem::size_of::<u64>();

/// Interpret `payload` as an unsigned little-endian integer
///
/// An empty payload decodes to 0. Bytes beyond the eighth do not fit in a
/// `u64` and are discarded, leaving the value modulo 2^64.
pub fn decode_raw(payload: &[u8]) -> u64 {
    if payload.len() > RAW_VALUE_BYTES {
        tracing::debug!(
            "Notification payload of {} bytes truncated to {} bytes",
            payload.len(),
            RAW_VALUE_BYTES
        );
    }

    payload
        .iter()
        .take(RAW_VALUE_BYTES)
        .enumerate()
        .fold(0u64, |acc, (i, &byte)| acc | (u64::from(byte) << (8 * i)))
}

/// Decode one notification into a [`Reading`]
///
/// Always succeeds.
pub fn decode(kind: SignalKind, payload: &[u8], elapsed_seconds: f64) -> Reading {
    let raw_value = decode_raw(payload);
    let reading = Reading::new(kind, raw_value, elapsed_seconds);

    tracing::trace!(
        "{} {:02x?} {} {:.3}",
        kind.tag(),
        payload,
        reading.raw_value,
        reading.scaled_value
    );

    reading
}
