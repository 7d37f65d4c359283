use crate::error::{Error, Result};

/// Samples of several channels, one sequence per channel.
///
/// The number of channels is fixed at construction. Equal length of the channels is up to the
/// caller, [`size`](Self::size) reports the length of the first one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBurst {
    channels: Vec<Vec<f32>>,
}

impl SampleBurst {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channels: vec![Vec::new(); channel_count],
        }
    }
    pub fn with_capacity(channel_count: usize, capacity: usize) -> Self {
        Self {
            channels: (0..channel_count).map(|_| Vec::with_capacity(capacity)).collect(),
        }
    }
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
    pub fn size(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn channel(&self, index: usize) -> Result<&[f32]> {
        self.channels
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| out_of_range(index, self.channels.len()))
    }
    pub fn channel_mut(&mut self, index: usize) -> Result<&mut Vec<f32>> {
        let count = self.channels.len();
        self.channels
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, count))
    }
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Appends all samples of `other`.
    ///
    /// A burst without channels adopts the channel count of `other`.
    pub fn append(&mut self, other: SampleBurst) -> Result<()> {
        self.append_n(other, usize::MAX)
    }

    /// Appends at most `count` leading samples of each channel of `other`.
    pub fn append_n(&mut self, other: SampleBurst, count: usize) -> Result<()> {
        if self.channels.is_empty() {
            self.channels = vec![Vec::new(); other.channel_count()];
        }
        if self.channel_count() != other.channel_count() {
            return Err(mismatch(other.channel_count(), self.channel_count()));
        }
        for (dst, mut src) in self.channels.iter_mut().zip(other.channels) {
            src.truncate(count);
            if dst.is_empty() {
                *dst = src;
            } else {
                dst.append(&mut src);
            }
        }
        Ok(())
    }

    /// Appends copies of all samples of `other`.
    pub fn extend_from(&mut self, other: &SampleBurst) -> Result<()> {
        if self.channels.is_empty() {
            self.channels = vec![Vec::new(); other.channel_count()];
        }
        if self.channel_count() != other.channel_count() {
            return Err(mismatch(other.channel_count(), self.channel_count()));
        }
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst.extend_from_slice(src);
        }
        Ok(())
    }

    pub fn erase_front(&mut self, count: usize) {
        for ch in &mut self.channels {
            ch.drain(..usize::min(count, ch.len()));
        }
    }
    pub fn erase_back(&mut self, count: usize) {
        for ch in &mut self.channels {
            ch.truncate(ch.len().saturating_sub(count));
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        for ch in &mut self.channels {
            ch.reserve(additional);
        }
    }
    pub fn resize(&mut self, size: usize) {
        for ch in &mut self.channels {
            ch.resize(size, 0.0);
        }
    }
    /// Removes samples keeping the channels and their capacity.
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.clear();
        }
    }
}

fn mismatch(src: usize, dst: usize) -> Error {
    Error::OutOfRange(format!(
        "cannot append burst of {} channels to burst of {} channels",
        src, dst
    ))
}

fn out_of_range(index: usize, count: usize) -> Error {
    Error::OutOfRange(format!("channel index {} is out of range 0..{}", index, count))
}
