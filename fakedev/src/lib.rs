//! Emulated board for running the driver without hardware.

mod board;
mod control;
mod gpio;

pub use board::{current_level, FakeBoard, SINE_AMPLITUDE, SINE_FREQUENCY};
pub use control::FakeChannel;
pub use gpio::{data_levels, encode_chunk, FakeGpio};

use app::{Driver, DriverConfig};

/// Driver of a fresh emulated board.
pub fn run(config: DriverConfig) -> app::Result<(FakeBoard, Driver<FakeChannel, FakeGpio>)> {
    let board = FakeBoard::new();
    log::info!("Starting emulated board");
    let driver = Driver::new(config, board.channel(), board.gpio())?;
    Ok((board, driver))
}
