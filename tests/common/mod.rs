//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::Duration;

/// How long a test waits for the pipeline to reach a state
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Read a sink file as `(elapsed, raw)` rows
pub fn read_rows(path: &std::path::Path) -> Vec<(f64, u64)> {
    let content = std::fs::read_to_string(path).expect("sink file should exist");
    content
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (elapsed, raw) = line.split_once(',').expect("record should have two fields");
            (elapsed.parse().unwrap(), raw.parse().unwrap())
        })
        .collect()
}
