//! Simulated peripheral helpers

use biostream::backend::{SimulatedPeripheral, SimulatorControl};
use biostream::config::ChannelBinding;
use uuid::Uuid;

use super::test_timeout;

pub const BOARD_ID: &str = "24:0A:C4:00:00:01";

/// Board advertising `name` with the default heart-sound and blood-pressure bindings
pub fn acquisition_board(name: &str) -> SimulatedPeripheral {
    SimulatedPeripheral::new().with_acquisition_board(BOARD_ID, name, &ChannelBinding::defaults())
}

/// Wait until every default binding has a subscription
pub fn wait_until_streaming(control: &SimulatorControl) {
    assert!(
        control.wait_for_subscriptions(ChannelBinding::defaults().len(), test_timeout()),
        "session never subscribed"
    );
}

/// Push `count` two-byte little-endian samples starting at `first`
pub fn notify_samples(control: &SimulatorControl, characteristic: Uuid, first: u16, count: u16) {
    for i in 0..count {
        assert!(
            control.notify(characteristic, &(first + i).to_le_bytes()),
            "notification {} was not delivered",
            i
        );
    }
}
