use crate::{board::State, FakeBoard};
use app::gpio::{Gpio, PinMode};
use common::config::{pins, CHANNEL_COUNT, CHUNK_LEN, MAX_BURST_CHUNKS, MAX_SAMPLE_RATE};
use std::{
    collections::VecDeque,
    thread::sleep,
    time::{Duration, Instant},
};

/// Interleaves raw words into the bytes of a chunk.
pub fn encode_chunk(words: &[u16; CHANNEL_COUNT]) -> [u8; CHUNK_LEN] {
    let mut chunk = [0u8; CHUNK_LEN];
    for (i, byte) in chunk.iter_mut().enumerate() {
        for (ch, &word) in words.iter().enumerate() {
            if word & (1 << (15 - 2 * i)) != 0 {
                *byte |= 0x08 >> ch;
            }
            if word & (1 << (14 - 2 * i)) != 0 {
                *byte |= 0x80 >> ch;
            }
        }
    }
    chunk
}

/// Pin levels presenting `byte` on the data lines.
pub fn data_levels(byte: u8) -> u32 {
    pins::DATA
        .iter()
        .enumerate()
        .filter(|&(i, _)| byte & (0x80 >> i) != 0)
        .fold(0, |levels, (_, &pin)| levels | pins::mask(pin))
}

/// Sample memory of the board, filled in real time at the maximum sample rate.
pub(crate) struct Stream {
    origin: Instant,
    /// Samples produced since `origin`, including dropped ones.
    produced: u64,
    words: VecDeque<u32>,
    levels: u32,
    clock: bool,
}

impl Stream {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            produced: 0,
            words: VecDeque::new(),
            levels: 0,
            clock: false,
        }
    }

    pub fn restart(&mut self) {
        *self = Self::new();
    }

    fn due(&self) -> u64 {
        let elapsed = self.origin.elapsed().as_secs_f64();
        ((elapsed * MAX_SAMPLE_RATE as f64) as u64).saturating_sub(self.produced)
    }

    /// Time left until the next sample is produced, `None` if samples are already due.
    fn wait(&self) -> Option<Duration> {
        if !self.words.is_empty() || self.due() > 0 {
            return None;
        }
        let next = (self.produced + 1) as f64 / MAX_SAMPLE_RATE as f64;
        Some(Duration::from_secs_f64(next).saturating_sub(self.origin.elapsed()))
    }
}

impl State {
    /// Fills the stream with the samples accumulated since the previous burst.
    ///
    /// At least one sample is emitted, the caller waits for it beforehand.
    fn next_burst(&mut self) {
        let due = self.stream.due().max(1);
        let count = due.min(MAX_BURST_CHUNKS as u64);
        let fail = if due > count {
            log::warn!("Sample memory overflow, {} samples dropped", due - count);
            pins::mask(pins::FAIL)
        } else {
            0
        };

        let start = self.stream.produced;
        for index in 0..count {
            let chunk = encode_chunk(&self.sample(start + index));
            let last = index + 1 == count;
            for (i, &byte) in chunk.iter().enumerate() {
                let mut levels = data_levels(byte) | fail;
                if i == 1 && !last {
                    levels |= pins::TCO_MASK;
                }
                self.stream.words.push_back(levels);
            }
        }
        self.stream.produced += due;
    }

    fn clock_falling(&mut self) {
        if self.stream.words.is_empty() {
            self.next_burst();
        }
        self.stream.levels = self.stream.words.pop_front().unwrap_or(0);
    }
}

/// GPIO lines of the emulated board.
///
/// Each falling edge of the clock line presents the next byte of the sample memory.
#[derive(Clone)]
pub struct FakeGpio {
    board: FakeBoard,
}

impl FakeGpio {
    pub(crate) fn new(board: FakeBoard) -> Self {
        Self { board }
    }
}

impl Gpio for FakeGpio {
    fn set_mode(&self, pin: u32, mode: PinMode) {
        log::trace!("Pin {} mode: {:?}", pin, mode);
    }
    fn set(&self, mask: u32) {
        if mask & pins::mask(pins::CLOCK) != 0 {
            self.board.lock().stream.clock = true;
        }
    }
    fn clear(&self, mask: u32) {
        if mask & pins::mask(pins::CLOCK) == 0 {
            return;
        }
        let wait = {
            let mut state = self.board.lock();
            if !state.stream.clock {
                return;
            }
            state.stream.clock = false;
            state.stream.wait()
        };
        // The board stays accessible to the control channel meanwhile.
        if let Some(wait) = wait {
            sleep(wait);
        }
        self.board.lock().clock_falling();
    }
    fn levels(&self) -> u32 {
        self.board.lock().stream.levels
    }
}
