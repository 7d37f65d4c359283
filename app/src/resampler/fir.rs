use super::DesignError;

/// Signal extension used to seed the filter state at the stream edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Extrapolation {
    /// `... 0 | x1 ... xn | 0 ...`
    #[default]
    Zero,
    /// `... x1 | x1 ... xn | xn ...`
    Constant,
    /// `... x2 x1 | x1 x2 ... xn | xn xn-1 ...`
    Symmetric,
    /// `... x3 x2 | x1 x2 x3 ... xn | xn-1 xn-2 ...`
    Reflect,
    /// `... xn-1 xn | x1 x2 ... xn | x1 x2 ...`
    Periodic,
    /// Straight line along the first derivative at the edge.
    Smooth,
    /// `... -x2 -x1 | x1 x2 ... xn | -xn -xn-1 ...`
    Antisymmetric,
    /// `... (2*x1 - x3) (2*x1 - x2) | x1 x2 x3 ... xn | (2*xn - xn-1) (2*xn - xn-2) ...`
    Antireflect,
}

/// Polyphase FIR resampler of a single stream.
///
/// Upsamples by `up` (zero insertion), filters and then downsamples by `down`.
/// Coefficients are stored transposed and flipped per phase, e.g. for `up = 3` and `h[0..10]`:
///
/// ```text
/// h[9], h[6], h[3], h[0],
///    0, h[7], h[4], h[1],
///    0, h[8], h[5], h[2],
/// ```
#[derive(Clone, Debug)]
pub struct FirResampler {
    up: usize,
    down: usize,
    extrapolation: Extrapolation,
    /// Next filter phase, always less than `up`.
    phase: usize,
    /// Input samples to skip on the next `apply`.
    offset: usize,
    coefs_per_phase: usize,
    coefs: Vec<f32>,
    /// Trailing input of size `coefs_per_phase - 1`.
    state: Vec<f32>,
    applied: bool,
    flushed: bool,
}

impl FirResampler {
    pub fn new(
        up: usize,
        down: usize,
        coefs: &[f32],
        extrapolation: Extrapolation,
    ) -> Result<Self, DesignError> {
        if up == 0 || down == 0 {
            return Err(DesignError::Parameters("resampling factors must be positive"));
        }
        if coefs.is_empty() {
            return Err(DesignError::Parameters("no filter coefficients"));
        }
        let coefs_per_phase = (coefs.len() + up - 1) / up;
        let mut transposed = vec![0.0; coefs_per_phase * up];
        for i in 0..up {
            for j in 0..coefs_per_phase {
                if let Some(&h) = coefs.get(j * up + i) {
                    transposed[(coefs_per_phase - 1 - j) + i * coefs_per_phase] = h;
                }
            }
        }
        Ok(Self {
            up,
            down,
            extrapolation,
            phase: 0,
            offset: 0,
            coefs_per_phase,
            coefs: transposed,
            state: vec![0.0; coefs_per_phase - 1],
            applied: false,
            flushed: false,
        })
    }

    pub fn up(&self) -> usize {
        self.up
    }
    pub fn down(&self) -> usize {
        self.down
    }
    pub fn coefs_per_phase(&self) -> usize {
        self.coefs_per_phase
    }
    pub fn is_applied(&self) -> bool {
        self.applied
    }
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Number of samples the next `apply` produces for `len` input samples.
    pub fn output_sequence_size(&self, len: usize) -> usize {
        let np = len * self.up;
        let mut size = np / self.down;
        if self.phase + self.up * self.offset < np % self.down {
            size += 1;
        }
        size
    }

    /// Resamples `input`, appending `output_sequence_size(input.len())` samples to `output`.
    ///
    /// The first non-empty call extends the signal to the left according to the extrapolation.
    pub fn apply(&mut self, input: &[f32], output: &mut Vec<f32>) -> usize {
        if input.is_empty() {
            return 0;
        }
        if !self.applied {
            self.extrapolate_left(input);
        }

        let start = output.len();
        let cpp = self.coefs_per_phase;
        let hist = self.state.len();
        let mut pos = self.offset;
        while pos < input.len() {
            let row = &self.coefs[self.phase * cpp..(self.phase + 1) * cpp];
            let value = if pos < hist {
                let k = hist - pos;
                dot(&self.state[pos..], &row[..k]) + dot(&input[..=pos], &row[k..])
            } else {
                dot(&input[pos - hist..=pos], row)
            };
            output.push(value);

            self.phase += self.down;
            pos += self.phase / self.up;
            self.phase %= self.up;
        }
        self.offset = pos - input.len();

        if input.len() < hist {
            self.state.drain(..input.len());
            self.state.extend_from_slice(input);
        } else {
            self.state.copy_from_slice(&input[input.len() - hist..]);
        }

        self.applied = true;
        output.len() - start
    }

    /// Resamples one extrapolated polyphase length past the end of the stream.
    ///
    /// Appends `output_sequence_size(coefs_per_phase() - 1)` samples.
    pub fn flush(&mut self, output: &mut Vec<f32>) -> usize {
        let mut extra = self.state.clone();
        let len = extra.len();
        match self.extrapolation {
            Extrapolation::Zero => extra.fill(0.0),
            Extrapolation::Smooth if len > 0 => {
                let (xn, xp) = if len > 1 {
                    (extra[len - 1], extra[len - 2])
                } else {
                    (0.0, extra[len - 1])
                };
                for k in 1..=len {
                    extra[k - 1] = xn + k as f32 * (xn - xp);
                }
            }
            Extrapolation::Constant if len > 0 => {
                let xn = extra[len - 1];
                extra.fill(xn);
            }
            Extrapolation::Symmetric => extra.reverse(),
            Extrapolation::Reflect => reflect_right(&mut extra),
            Extrapolation::Antisymmetric => {
                extra.reverse();
                extra.iter_mut().for_each(|x| *x = -*x);
            }
            Extrapolation::Antireflect if len >= 2 => {
                let mut reflected = extra.clone();
                reflect_right(&mut reflected);
                let xn = extra[len - 1];
                for (x, r) in extra.iter_mut().zip(reflected) {
                    *x = 2.0 * xn - r;
                }
            }
            _ => (),
        }
        let count = self.apply(&extra, output);
        self.flushed = true;
        count
    }

    fn extrapolate_left(&mut self, input: &[f32]) {
        let len = self.state.len();
        match self.extrapolation {
            Extrapolation::Zero => return,
            Extrapolation::Smooth => {
                let x1 = input[0];
                let x2 = input.get(1).copied().unwrap_or(0.0);
                for k in (1..=len).rev() {
                    self.state[len - k] = x1 - k as f32 * (x2 - x1);
                }
                return;
            }
            Extrapolation::Constant => {
                self.state.fill(input[0]);
                return;
            }
            _ => (),
        }

        let count = usize::min(len, input.len());
        self.state[len - count..].copy_from_slice(&input[..count]);
        match self.extrapolation {
            Extrapolation::Symmetric => self.state.reverse(),
            Extrapolation::Reflect => reflect_left(&mut self.state),
            Extrapolation::Antisymmetric => {
                self.state.reverse();
                self.state.iter_mut().for_each(|x| *x = -*x);
            }
            Extrapolation::Antireflect if len >= 2 => {
                let mut reflected = self.state.clone();
                reflect_left(&mut reflected);
                let x1 = self.state[0];
                for (x, r) in self.state.iter_mut().zip(reflected) {
                    *x = 2.0 * x1 - r;
                }
            }
            _ => (),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, h)| x * h).sum()
}

/// `x1, x2, ..., xn` into `xn-1, xn, ..., x2`.
fn reflect_left(v: &mut [f32]) {
    let len = v.len();
    if len >= 3 {
        v.copy_within(1.., 0);
        v.reverse();
        v[0] = v[2];
    }
}

/// `x1, x2, ..., xn` into `xn-1, ..., x2, x1, x2`.
fn reflect_right(v: &mut [f32]) {
    let len = v.len();
    if len >= 3 {
        v.reverse();
        v.copy_within(1.., 0);
        v[len - 1] = v[len - 3];
    }
}

/// Upsamples `input` by `up`, applies the FIR filter `coefs` and downsamples by `down`.
pub fn upfirdn(
    up: usize,
    down: usize,
    coefs: &[f32],
    input: &[f32],
    extrapolation: Extrapolation,
) -> Result<Vec<f32>, DesignError> {
    let mut resampler = FirResampler::new(up, down, coefs, extrapolation)?;
    let mut output = Vec::with_capacity(
        resampler.output_sequence_size(input.len() + resampler.coefs_per_phase() - 1),
    );
    resampler.apply(input, &mut output);
    resampler.flush(&mut output);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    const ALL: [Extrapolation; 8] = [
        Extrapolation::Zero,
        Extrapolation::Constant,
        Extrapolation::Symmetric,
        Extrapolation::Reflect,
        Extrapolation::Periodic,
        Extrapolation::Smooth,
        Extrapolation::Antisymmetric,
        Extrapolation::Antireflect,
    ];

    #[test]
    fn transposed_layout() {
        let h: Vec<f32> = (0..10).map(|x| x as f32).collect();
        let r = FirResampler::new(3, 1, &h, Extrapolation::Zero).unwrap();
        assert_eq!(r.coefs_per_phase(), 4);
        assert_eq!(
            r.coefs,
            [9.0, 6.0, 3.0, 0.0, 0.0, 7.0, 4.0, 1.0, 0.0, 8.0, 5.0, 2.0]
        );
        assert_eq!(r.state.len(), 3);
    }

    #[test]
    fn identity() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xdeadbeef);
        let mut r = FirResampler::new(1, 1, &[0.0, 0.0, 1.0, 0.0, 0.0], Extrapolation::Zero).unwrap();
        let mut out = Vec::new();
        // Warm up the state buffer.
        r.apply(&[0.0; 8], &mut out);
        out.clear();
        let input: Vec<f32> = (0..100).map(|_| rng.gen_range(-1.0..1.0)).collect();
        r.apply(&input, &mut out);
        assert_eq!(out.len(), input.len());
        // Delay of the centered tap.
        assert_eq!(&out[2..], &input[..98]);
        assert_eq!(&out[..2], &[0.0, 0.0]);
    }

    #[test]
    fn identity_single_tap() {
        let mut r = FirResampler::new(1, 1, &[1.0], Extrapolation::Zero).unwrap();
        let input = [1.0, -2.0, 3.5, 0.25];
        let mut out = Vec::new();
        r.apply(&input, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn output_size_matches_apply() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x1234);
        for (up, down) in [(1, 1), (1, 2), (2, 3), (3, 2), (2, 1), (5, 7), (147, 160)] {
            let len = 20 * usize::max(up, down) + 1;
            let coefs: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
            for extrapolation in ALL {
                let mut r = FirResampler::new(up, down, &coefs, extrapolation).unwrap();
                let mut total_in = 0;
                let mut total_out = 0;
                for _ in 0..20 {
                    let n = rng.gen_range(0..300);
                    let input: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
                    let expected = r.output_sequence_size(n);
                    let mut out = Vec::new();
                    assert_eq!(r.apply(&input, &mut out), expected);
                    assert_eq!(out.len(), expected);
                    total_in += n;
                    total_out += expected;
                }
                let mut out = Vec::new();
                let expected = r.output_sequence_size(r.coefs_per_phase() - 1);
                assert_eq!(r.flush(&mut out), expected);
                assert!(r.is_flushed());
                // Overall rate conversion.
                let ideal = (total_in * up) as f64 / down as f64;
                assert!((total_out as f64 - ideal).abs() <= 1.0);
            }
        }
    }

    #[test]
    fn chunking_does_not_matter() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let coefs: Vec<f32> = (0..61).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let input: Vec<f32> = (0..1000).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mut whole = Vec::new();
        FirResampler::new(2, 3, &coefs, Extrapolation::Symmetric)
            .unwrap()
            .apply(&input, &mut whole);

        let mut parts = Vec::new();
        let mut r = FirResampler::new(2, 3, &coefs, Extrapolation::Symmetric).unwrap();
        let mut rest = &input[..];
        while !rest.is_empty() {
            let n = usize::min(rng.gen_range(1..50), rest.len());
            r.apply(&rest[..n], &mut parts);
            rest = &rest[n..];
        }

        assert_eq!(whole.len(), parts.len());
        for (a, b) in whole.iter().zip(&parts) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn left_extrapolation() {
        let coefs = [0.0, 0.0, 0.0, 0.0, 1.0];
        let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let cases = [
            (Extrapolation::Zero, [0.0, 0.0, 0.0, 0.0]),
            (Extrapolation::Constant, [1.0, 1.0, 1.0, 1.0]),
            (Extrapolation::Symmetric, [4.0, 3.0, 2.0, 1.0]),
            (Extrapolation::Reflect, [3.0, 4.0, 3.0, 2.0]),
            (Extrapolation::Periodic, [1.0, 2.0, 3.0, 4.0]),
            (Extrapolation::Smooth, [-3.0, -2.0, -1.0, 0.0]),
            (Extrapolation::Antisymmetric, [-4.0, -3.0, -2.0, -1.0]),
        ];
        for (extrapolation, state) in cases {
            let mut r = FirResampler::new(1, 1, &coefs, extrapolation).unwrap();
            let mut out = Vec::new();
            r.apply(&input, &mut out);
            // The last tap of the flipped row sees the oldest sample.
            assert_eq!(out[..4], state, "{:?}", extrapolation);
        }
    }

    #[test]
    fn upfirdn_size() {
        let coefs = [0.25_f32; 9];
        let input = [1.0_f32; 50];
        let out = upfirdn(2, 3, &coefs, &input, Extrapolation::Constant).unwrap();
        let r = FirResampler::new(2, 3, &coefs, Extrapolation::Constant).unwrap();
        assert_eq!(out.len(), r.output_sequence_size(50 + r.coefs_per_phase() - 1));
    }

    #[test]
    fn invalid() {
        assert!(FirResampler::new(0, 1, &[1.0], Extrapolation::Zero).is_err());
        assert!(FirResampler::new(1, 0, &[1.0], Extrapolation::Zero).is_err());
        assert!(FirResampler::new(1, 1, &[], Extrapolation::Zero).is_err());
    }
}
