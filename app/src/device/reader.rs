use crate::{burst::SampleBurst, gpio::Gpio};
use common::config::{
    pins, CHANNEL_COUNT, CHUNK_LEN, MAX_BURST_CHUNKS, READY_WAIT, SENSOR_OFFSET, TCO_CONTINUE,
};
use std::thread::sleep;

/// Run-time correction of a single channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelCorrection {
    /// Raw counts to millivolts.
    pub calibration_slope: f32,
    pub translation_offset: i32,
    pub translation_slope: f32,
}

impl Default for ChannelCorrection {
    fn default() -> Self {
        Self {
            calibration_slope: 1.0,
            translation_offset: 0,
            translation_slope: 1.0,
        }
    }
}

impl ChannelCorrection {
    pub fn apply(&self, raw: u16) -> f32 {
        let mv = (raw as i32 - SENSOR_OFFSET as i32) as f32 * self.calibration_slope;
        (mv - self.translation_offset as f32) * self.translation_slope
    }
}

/// Byte carried by the data lines.
pub fn data_byte(levels: u32) -> u8 {
    pins::DATA
        .iter()
        .enumerate()
        .filter(|&(_, &pin)| levels & pins::mask(pin) != 0)
        .fold(0, |byte, (i, _)| byte | (0x80 >> i))
}

/// Deinterleaves one chunk into a raw word per channel.
///
/// Byte `i` carries bit `15 - 2i` of every channel in its low nibble and bit `14 - 2i` in its
/// high nibble, channel 0 being the most significant bit of a nibble.
pub fn decode_chunk(chunk: &[u8; CHUNK_LEN]) -> [u16; CHANNEL_COUNT] {
    let mut words = [0u16; CHANNEL_COUNT];
    for (i, &byte) in chunk.iter().enumerate() {
        for (ch, word) in words.iter_mut().enumerate() {
            if byte & (0x08 >> ch) != 0 {
                *word |= 1 << (15 - 2 * i);
            }
            if byte & (0x80 >> ch) != 0 {
                *word |= 1 << (14 - 2 * i);
            }
        }
    }
    words
}

struct RawRead {
    byte: u8,
    tco: u32,
}

/// Bit-banging reader of the board sample memory.
pub struct Reader<G: Gpio> {
    gpio: G,
    corrections: [ChannelCorrection; CHANNEL_COUNT],
    /// Bursts still to be discarded.
    skip: usize,
}

impl<G: Gpio> Reader<G> {
    pub fn new(gpio: G, corrections: [ChannelCorrection; CHANNEL_COUNT], skip: usize) -> Self {
        Self {
            gpio,
            corrections,
            skip,
        }
    }

    pub fn corrections(&self) -> &[ChannelCorrection; CHANNEL_COUNT] {
        &self.corrections
    }

    /// Single delay unit, the duration of a level register access.
    fn hold(&self) {
        self.gpio.levels();
    }

    fn read(&self) -> RawRead {
        self.gpio.set(pins::mask(pins::CLOCK));
        self.hold();
        self.hold();

        self.gpio.clear(pins::mask(pins::CLOCK));
        self.hold();
        self.hold();

        let levels = self.gpio.levels();

        self.hold();
        self.hold();

        RawRead {
            byte: data_byte(levels),
            tco: levels & pins::TCO_MASK,
        }
    }

    /// Reads one chunk and its `tco` field.
    pub fn read_chunk(&self) -> ([u8; CHUNK_LEN], u32) {
        let mut chunk = [0; CHUNK_LEN];
        let mut tco = 0;
        for (i, byte) in chunk.iter_mut().enumerate() {
            let raw = self.read();
            if i == 1 {
                tco = raw.tco;
            }
            *byte = raw.byte;
        }
        (chunk, tco)
    }

    fn push_chunk(&self, burst: &mut SampleBurst, chunk: &[u8; CHUNK_LEN]) {
        let words = decode_chunk(chunk);
        for ((samples, corr), raw) in burst
            .channels_mut()
            .iter_mut()
            .zip(&self.corrections)
            .zip(words)
        {
            samples.push(corr.apply(raw));
        }
    }

    fn skip_bursts(&mut self) {
        while self.skip > 0 {
            sleep(READY_WAIT);
            for _ in 0..MAX_BURST_CHUNKS {
                if self.read_chunk().1 != TCO_CONTINUE {
                    break;
                }
            }
            self.skip -= 1;
        }
    }

    /// Appends the next burst of the board to `burst`.
    ///
    /// Returns `true` if the board reported a memory overflow.
    pub fn read_burst(&mut self, burst: &mut SampleBurst) -> bool {
        self.skip_bursts();

        sleep(READY_WAIT);
        for _ in 0..MAX_BURST_CHUNKS {
            let (chunk, tco) = self.read_chunk();
            self.push_chunk(burst, &chunk);
            if tco != TCO_CONTINUE {
                break;
            }
        }
        let overflow = self.gpio.levels() & pins::mask(pins::FAIL) != 0;
        self.hold();
        overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::PinMode;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    fn reference_decode(chunk: &[u8; CHUNK_LEN]) -> [u16; CHANNEL_COUNT] {
        let mut words = [0u16; CHANNEL_COUNT];
        let mut bit = 16;
        for byte in chunk {
            for nibble_shift in [0, 4] {
                bit -= 1;
                for (ch, word) in words.iter_mut().enumerate() {
                    let b = (byte >> (nibble_shift + 3 - ch)) & 1;
                    *word |= (b as u16) << bit;
                }
            }
        }
        words
    }

    #[test]
    fn decode_random_chunks() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xdec0de);
        for _ in 0..1000 {
            let chunk: [u8; CHUNK_LEN] = rng.gen();
            assert_eq!(decode_chunk(&chunk), reference_decode(&chunk));
        }
        assert_eq!(decode_chunk(&[0; CHUNK_LEN]), [0; CHANNEL_COUNT]);
        assert_eq!(decode_chunk(&[0xff; CHUNK_LEN]), [0xffff; CHANNEL_COUNT]);
    }

    #[test]
    fn decode_single_bits() {
        // Low nibble of the first byte is the most significant bit.
        assert_eq!(decode_chunk(&[0x08, 0, 0, 0, 0, 0, 0, 0]), [0x8000, 0, 0, 0]);
        assert_eq!(decode_chunk(&[0x10, 0, 0, 0, 0, 0, 0, 0]), [0, 0, 0, 0x4000]);
        assert_eq!(decode_chunk(&[0, 0, 0, 0, 0, 0, 0, 0x20]), [0, 0, 0x0001, 0]);
        assert_eq!(decode_chunk(&[0, 0, 0, 0, 0, 0, 0, 0x04]), [0, 0x0002, 0, 0]);
    }

    #[test]
    fn identity_correction() {
        let corr = ChannelCorrection::default();
        for raw in 0..=u16::MAX {
            assert_eq!(corr.apply(raw), (raw as i32 - 32768) as f32);
        }
    }

    #[test]
    fn correction_order() {
        let corr = ChannelCorrection {
            calibration_slope: 0.5,
            translation_offset: 10,
            translation_slope: 2.0,
        };
        assert_eq!(corr.apply(32768 + 100), (100.0 * 0.5 - 10.0) * 2.0);
    }

    #[test]
    fn data_lines() {
        assert_eq!(data_byte(0), 0);
        assert_eq!(data_byte(pins::DATA_MASK), 0xff);
        assert_eq!(data_byte(pins::mask(24)), 0x80);
        assert_eq!(data_byte(pins::mask(16)), 0x01);
        assert_eq!(data_byte(pins::mask(7) | pins::mask(12)), 0x24);
        assert_eq!(data_byte(!pins::DATA_MASK), 0);
    }

    /// Replays level words, one per falling clock edge.
    #[derive(Clone, Default)]
    struct Replay {
        state: Arc<Mutex<(VecDeque<u32>, u32)>>,
    }

    impl Replay {
        fn push_chunk(&self, chunk: &[u8; CHUNK_LEN], tco: u32) {
            let mut state = self.state.lock().unwrap();
            for (i, &byte) in chunk.iter().enumerate() {
                let mut levels = (0..8)
                    .filter(|b| byte & (0x80 >> b) != 0)
                    .fold(0, |l, b| l | pins::mask(pins::DATA[b]));
                if i == 1 {
                    levels |= tco;
                }
                state.0.push_back(levels);
            }
        }
    }

    impl Gpio for Replay {
        fn set_mode(&self, _pin: u32, _mode: PinMode) {}
        fn set(&self, _mask: u32) {}
        fn clear(&self, mask: u32) {
            if mask & pins::mask(pins::CLOCK) != 0 {
                let mut state = self.state.lock().unwrap();
                state.1 = state.0.pop_front().unwrap_or(0);
            }
        }
        fn levels(&self) -> u32 {
            self.state.lock().unwrap().1
        }
    }

    #[test]
    fn read_burst() {
        let gpio = Replay::default();
        // Skipped burst.
        gpio.push_chunk(&[0xff; CHUNK_LEN], TCO_CONTINUE);
        gpio.push_chunk(&[0xff; CHUNK_LEN], 0);
        // Measured burst.
        gpio.push_chunk(&[0x00; CHUNK_LEN], TCO_CONTINUE);
        gpio.push_chunk(&[0x08, 0, 0, 0, 0, 0, 0, 0], TCO_CONTINUE);
        gpio.push_chunk(&[0xff; CHUNK_LEN], 0);
        // Next burst.
        gpio.push_chunk(&[0x00; CHUNK_LEN], 0);

        let mut reader = Reader::new(gpio, [ChannelCorrection::default(); CHANNEL_COUNT], 1);
        let mut burst = SampleBurst::new(CHANNEL_COUNT);
        assert!(!reader.read_burst(&mut burst));
        assert_eq!(burst.size(), 3);
        assert_eq!(burst.channels()[0], [-32768.0, 0.0, 32767.0]);
        assert_eq!(burst.channels()[3], [-32768.0, -32768.0, 32767.0]);

        reader.read_burst(&mut burst);
        assert_eq!(burst.size(), 4);
    }
}
