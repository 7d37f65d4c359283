mod design;
mod fir;

pub use design::{bessel_i0, firls, kaiser, lowpass, sinc, NEAR_ZERO};
pub use fir::{upfirdn, Extrapolation, FirResampler};

use crate::burst::SampleBurst;
use common::config::CHANNEL_COUNT;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DesignError {
    #[error("invalid filter parameters: {0}")]
    Parameters(&'static str),
    #[error("one of FIR coefficients would be non-finite")]
    NonFinite,
    #[error("unable to find the Kaiser window shape factor")]
    ShapeFactor,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResamplerOptions {
    channel_count: usize,
    up: usize,
    down: usize,
    extrapolation: Extrapolation,
    crop_extra: bool,
    filter_length: Option<usize>,
    freq_ampl: Option<(Vec<f64>, Vec<f64>)>,
}

impl ResamplerOptions {
    /// Zero factors are replaced by `1`.
    pub fn new(up: usize, down: usize) -> Self {
        Self {
            channel_count: CHANNEL_COUNT,
            up: up.max(1),
            down: down.max(1),
            extrapolation: Extrapolation::default(),
            crop_extra: true,
            filter_length: None,
            freq_ampl: None,
        }
    }

    pub fn channel_count(mut self, count: usize) -> Self {
        self.channel_count = count;
        self
    }
    pub fn extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }
    /// Whether to drop the group delay at both ends of the stream.
    pub fn crop_extra(mut self, crop: bool) -> Self {
        self.crop_extra = crop;
        self
    }
    pub fn filter_length(mut self, length: usize) -> Self {
        self.filter_length = Some(length).filter(|&n| n > 0);
        self
    }
    /// Band edges and amplitudes of the lowpass filter, see [`firls`].
    pub fn freq_ampl(mut self, freq: Vec<f64>, ampl: Vec<f64>) -> Self {
        self.freq_ampl = Some((freq, ampl)).filter(|(f, _)| !f.is_empty());
        self
    }

    pub fn up(&self) -> usize {
        self.up
    }
    pub fn down(&self) -> usize {
        self.down
    }
    pub fn length(&self) -> usize {
        self.filter_length
            .unwrap_or(2 * 10 * usize::max(self.up, self.down) + 1)
    }
    pub fn freq(&self) -> Vec<f64> {
        match &self.freq_ampl {
            Some((freq, _)) => freq.clone(),
            None => {
                let band = (1.0 - NEAR_ZERO) / self.up as f64;
                vec![0.0, band, band, 1.0]
            }
        }
    }
    pub fn ampl(&self) -> Vec<f64> {
        match &self.freq_ampl {
            Some((_, ampl)) => ampl.clone(),
            None => vec![1.0, 1.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Debug)]
struct ChannelState {
    fir: FirResampler,
    /// Leading outputs still to be cropped.
    unskipped: usize,
}

/// Resampler of a multichannel sample stream.
#[derive(Clone, Debug)]
pub struct Resampler {
    options: ResamplerOptions,
    channels: Vec<ChannelState>,
}

impl Resampler {
    pub fn new(options: ResamplerOptions) -> Result<Self, DesignError> {
        let (freq, ampl) = (options.freq(), options.ampl());
        if freq.len() != ampl.len() {
            return Err(DesignError::Parameters(
                "frequencies and amplitudes must be of equal count",
            ));
        }
        let coefs = lowpass(options.up, options.length(), &freq, &ampl)?
            .into_iter()
            .map(|c| c as f32)
            .collect::<Vec<_>>();
        log::debug!(
            "Resampler {}/{} designed with {} coefficients",
            options.up,
            options.down,
            coefs.len()
        );

        let fir = FirResampler::new(options.up, options.down, &coefs, options.extrapolation)?;
        let unskipped = if options.crop_extra {
            leading_skip(&fir)
        } else {
            0
        };
        let channels = vec![ChannelState { fir, unskipped }; options.channel_count];
        Ok(Self { options, channels })
    }

    pub fn options(&self) -> &ResamplerOptions {
        &self.options
    }

    pub fn apply(&mut self, burst: &SampleBurst) -> SampleBurst {
        let mut result = SampleBurst::new(self.channels.len());
        for ((state, input), output) in self
            .channels
            .iter_mut()
            .zip(burst.channels())
            .zip(result.channels_mut())
        {
            if input.is_empty() {
                continue;
            }
            output.reserve(state.fir.output_sequence_size(input.len()));
            state.fir.apply(input, output);
            if state.unskipped > 0 {
                let skip = usize::min(state.unskipped, output.len());
                output.drain(..skip);
                state.unskipped -= skip;
            }
        }
        result
    }

    /// Flushes the trailing samples out of every channel.
    pub fn flush(&mut self) -> SampleBurst {
        let mut result = SampleBurst::new(self.channels.len());
        for (state, output) in self.channels.iter_mut().zip(result.channels_mut()) {
            if !state.fir.is_applied() {
                continue;
            }
            let count = state.fir.flush(output);
            if self.options.crop_extra {
                output.truncate(count - trailing_skip(count));
            }
        }
        result
    }
}

fn leading_skip(fir: &FirResampler) -> usize {
    fir.output_sequence_size(fir.coefs_per_phase() - 1) / 2
}

fn trailing_skip(flushed: usize) -> usize {
    (flushed + flushed % 2) / 2
}
