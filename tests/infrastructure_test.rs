//! Test to verify test infrastructure works correctly

mod common;

use biostream::backend::BleProvider;
use biostream::config::DEFAULT_TARGET_NAME;
use common::builders::ConfigBuilder;
use common::mock_helpers::{acquisition_board, BOARD_ID};
use std::time::Duration;

#[test]
fn test_infrastructure_setup() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new(dir.path()).target("BENCH").build();
    assert_eq!(config.device.target_name, "BENCH");
    assert_eq!(config.persistence.output_dir, dir.path());

    let mut board = acquisition_board(DEFAULT_TARGET_NAME);
    let found = board.scan(Duration::ZERO).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.to_string(), BOARD_ID);
}

#[test]
fn test_read_rows_parses_crlf_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.csv");
    std::fs::write(&path, "0.5,12\r\n1.25,4095\r\n").unwrap();

    let rows = common::read_rows(&path);
    assert_eq!(rows, vec![(0.5, 12), (1.25, 4095)]);
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
