use core::{ops::RangeInclusive, time::Duration};

pub const CHANNEL_COUNT: usize = 4;
pub const PWM_COUNT: usize = 2;

pub const MIN_GAIN: f32 = 1.0;
pub const MAX_GAIN: f32 = 1408.0;
pub const PWM_FREQUENCY_RANGE: RangeInclusive<i32> = 1..=1000;
pub const PWM_LEVEL_RANGE: RangeInclusive<i32> = 0..=4095;

pub const MIN_SAMPLE_RATE: u32 = 32;
pub const MAX_SAMPLE_RATE: u32 = 48000;

pub const MIN_BURST_SIZE: usize = MIN_SAMPLE_RATE as usize;
pub const MAX_BURST_SIZE: usize = MAX_SAMPLE_RATE as usize;

/// Offset subtracted from the raw unsigned ADC word.
pub const SENSOR_OFFSET: u16 = 32768;

/// Bursts read and discarded after the measurement is enabled.
pub const SKIP_BURST_COUNT: usize = 32;
/// Raw reads per chunk.
pub const CHUNK_LEN: usize = 8;
/// Value of the `tco` field while a burst continues.
pub const TCO_CONTINUE: u32 = 0x4000;
/// Maximum number of chunks in a single burst.
pub const MAX_BURST_CHUNKS: usize = 255 * 32;
/// Capacity reserved for a fresh burst.
pub const BURST_RESERVE: usize = 8192;

/// Queue capacity in bursts, about two seconds at the maximum rate.
pub const QUEUE_CAPACITY: usize = MAX_SAMPLE_RATE as usize / 32 * 2;
/// Bursts popped by the poller per iteration.
pub const POLL_BATCH: usize = 10;
pub const POLL_IDLE: Duration = Duration::from_millis(1);
pub const EVENTS_PERIOD: Duration = Duration::from_millis(20);

/// Time for the board RAM bank to become ready for reading.
pub const READY_WAIT: Duration = Duration::from_micros(700);
pub const START_DELAY: Duration = Duration::from_millis(1);
pub const RESET_DELAY: Duration = Duration::from_millis(1);

/// Measurement mode switching transient.
pub const SWITCHING_PERIOD: Duration = Duration::from_micros(1500);
/// Samples collected for drift compensation (5 ms at the maximum rate).
pub const DRIFT_SAMPLE_COUNT: usize = 5 * MAX_SAMPLE_RATE as usize / 1000;

pub const DRIFT_REFERENCES_PATH: &str = ".daqhat/drift_references";
pub const GPIO_MEM_PATH: &str = "/dev/gpiomem";
pub const CONTROL_TTY_PATH: &str = "/dev/ttyAMA0";
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

pub mod pins {
    /// Data lines, most significant bit first.
    pub const DATA: [u32; 8] = [24, 25, 7, 5, 6, 12, 13, 16];
    pub const CLOCK: u32 = 4;
    pub const TCO: u32 = 14;
    pub const PI_OK: u32 = 15;
    pub const FAIL: u32 = 18;
    pub const RESET: u32 = 17;

    pub const fn mask(pin: u32) -> u32 {
        1 << pin
    }

    pub const TCO_MASK: u32 = mask(TCO);
    pub const DATA_MASK: u32 = {
        let mut m = 0;
        let mut i = 0;
        while i < DATA.len() {
            m |= mask(DATA[i]);
            i += 1;
        }
        m
    };
}
