use crate::gpio::Stream;
use common::{
    config::CHANNEL_COUNT,
    values::{AtomType, CalibrationEntry, MeasurementMode, CHANNEL_ATOMS},
};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    f64::consts::PI,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Amplitude of the voltage mode sine in raw counts.
pub const SINE_AMPLITUDE: f64 = 1000.0;
/// Sine frequency of the first channel, channel `i` runs at `(i + 1)` times it.
pub const SINE_FREQUENCY: f64 = 50.0;

/// Raw counts above the sensor offset measured by channel `index` in current mode.
pub fn current_level(index: usize) -> i32 {
    100 * (index as i32 + 1)
}

pub(crate) struct State {
    pub settings: Map<String, Value>,
    pub calibration: BTreeMap<u16, Vec<CalibrationEntry>>,
    pub events: Map<String, Value>,
    pub measuring: bool,
    /// Additional counts of every channel in current mode.
    pub drift: [i32; CHANNEL_COUNT],
    pub stream: Stream,
}

impl State {
    fn new() -> Self {
        let mut settings = Map::new();
        for index in 0..CHANNEL_COUNT {
            settings.insert(format!("CH{}.mode", index + 1), MeasurementMode::Voltage.code().into());
            settings.insert(format!("CH{}.gain", index + 1), Value::from(1.0_f64));
        }
        let calibration = CHANNEL_ATOMS
            .into_iter()
            .map(|atom| (atom.code(), vec![CalibrationEntry::default(); atom.entry_count()]))
            .collect();
        Self {
            settings,
            calibration,
            events: Map::new(),
            measuring: false,
            drift: [0; CHANNEL_COUNT],
            stream: Stream::new(),
        }
    }

    fn channel_mode(&self, index: usize) -> MeasurementMode {
        self.settings
            .get(&format!("CH{}.mode", index + 1))
            .and_then(Value::as_i64)
            .and_then(MeasurementMode::from_code)
            .unwrap_or_default()
    }

    /// Raw words of all channels at sample `index` of the stream.
    pub fn sample(&self, index: u64) -> [u16; CHANNEL_COUNT] {
        let t = index as f64 / common::config::MAX_SAMPLE_RATE as f64;
        let mut words = [0; CHANNEL_COUNT];
        for (ch, word) in words.iter_mut().enumerate() {
            let value = match self.channel_mode(ch) {
                MeasurementMode::Voltage => {
                    let w = 2.0 * PI * SINE_FREQUENCY * (ch + 1) as f64;
                    (SINE_AMPLITUDE * (w * t).sin()).round() as i32
                }
                MeasurementMode::Current => current_level(ch) + self.drift[ch],
            };
            *word = (value + common::config::SENSOR_OFFSET as i32).clamp(0, u16::MAX as i32) as u16;
        }
        words
    }
}

/// Emulated board.
///
/// Handles returned by [`gpio`](Self::gpio) and [`channel`](Self::channel) share the board
/// state, so a driver built on them sees a single device.
#[derive(Clone)]
pub struct FakeBoard {
    state: Arc<Mutex<State>>,
}

impl Default for FakeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBoard {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn gpio(&self) -> crate::FakeGpio {
        crate::FakeGpio::new(self.clone())
    }
    pub fn channel(&self) -> crate::FakeChannel {
        crate::FakeChannel::new(self.clone())
    }

    pub fn is_measuring(&self) -> bool {
        self.lock().measuring
    }
    pub fn settings(&self) -> Map<String, Value> {
        self.lock().settings.clone()
    }

    /// Replaces the calibration table of `atom`.
    pub fn set_calibration(&self, atom: AtomType, entries: Vec<CalibrationEntry>) {
        self.lock().calibration.insert(atom.code(), entries);
    }

    /// Shifts the current mode level of channel `index` by `counts`.
    pub fn set_drift(&self, index: usize, counts: i32) {
        self.lock().drift[index] = counts;
    }

    /// Queues an event reported on the next events request.
    pub fn push_event(&self, key: &str, value: Value) {
        self.lock().events.insert(key.into(), value);
    }
}
