//! Driver of a four-channel data acquisition board.
//!
//! Samples are read through GPIO lines by a fetcher thread, corrected, resampled and delivered
//! in bursts by a poller thread. The board is configured through a line-oriented control
//! channel.

pub mod burst;
pub mod calibration;
pub mod channel;
pub mod control;
pub mod device;
pub mod drift;
pub mod driver;
pub mod error;
pub mod event;
pub mod gpio;
pub mod resampler;
pub mod settings;

pub use burst::SampleBurst;
pub use channel::Channel;
pub use device::{Statistics, StatisticsSnapshot};
pub use driver::{Driver, DriverConfig};
pub use error::{Error, ErrorCode, Result};
pub use event::Event;
pub use gpio::Gpio;
pub use resampler::{Extrapolation, Resampler, ResamplerOptions};
pub use settings::{BoardSettings, DriverSettings};

pub use common::values::MeasurementMode;
