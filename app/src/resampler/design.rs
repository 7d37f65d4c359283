//! FIR filter design: least-squares linear-phase filters and Kaiser windows.

use super::DesignError;
use std::f64::consts::PI;

/// A positive value near to zero.
pub const NEAR_ZERO: f64 = 1e-16;

/// `sin(πx) / (πx)`, or `1` near zero.
pub fn sinc(x: f64) -> f64 {
    if x.abs() < NEAR_ZERO {
        1.0
    } else {
        let a = PI * x;
        a.sin() / a
    }
}

/// Modified Bessel function of the first kind of order zero.
pub fn bessel_i0(x: f64) -> f64 {
    let q = x * x / 4.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..500 {
        term *= q / (k * k) as f64;
        sum += term;
        if term < sum * f64::EPSILON {
            break;
        }
    }
    sum
}

/// Kaiser window of `length` points with shape factor `beta`.
pub fn kaiser(length: usize, beta: f64) -> Vec<f64> {
    if length < 2 {
        return vec![1.0; length];
    }
    let n = (length - 1) as f64;
    let d = bessel_i0(beta);
    (0..length)
        .map(|i| {
            let x = i as f64;
            bessel_i0(2.0 * beta / n * (x * (n - x)).sqrt()) / d
        })
        .collect()
}

/// Least-squares linear-phase FIR filter of order `order`.
///
/// `freq` holds pairs of band edges in `[0, 1]` (`1` is the Nyquist frequency), `ampl` the desired
/// amplitude at each edge. Bands must cover the whole range without gaps.
///
/// Returns `order + 1` coefficients, or `order + 2` when an odd order is requested with a passband
/// at the Nyquist frequency.
pub fn firls(order: usize, freq: &[f64], ampl: &[f64]) -> Result<Vec<f64>, DesignError> {
    if order == 0 {
        return Err(DesignError::Parameters("filter order must be positive"));
    }
    if freq.len() < 2 || freq.len() % 2 != 0 || freq.len() != ampl.len() {
        return Err(DesignError::Parameters(
            "frequencies and amplitudes must be pairs of equal count",
        ));
    }
    if freq.iter().any(|f| !(0.0..=1.0).contains(f)) || freq.windows(2).any(|w| w[1] < w[0]) {
        return Err(DesignError::Parameters(
            "frequencies must be ascending in range [0, 1]",
        ));
    }

    let last_f = freq[freq.len() - 1];
    let last_a = ampl[ampl.len() - 1];
    let increment = (0.999999 < last_f && last_f <= 1.0) && last_a.abs() >= 0.000001 && order % 2 == 1;
    let filter_length = order + 1 + increment as usize;

    let freq: Vec<f64> = freq.iter().map(|f| f / 2.0).collect();
    let fullband = freq.len() > 2 && freq.chunks(2).skip(1).zip(freq.chunks(2)).all(|(b, a)| b[0] == a[1]);
    if !fullband {
        return Err(DesignError::Parameters("frequencies must represent fullband"));
    }

    let k_size = (filter_length - 1) / 2 + 1;
    let odd = filter_length % 2;
    let shift = if odd == 1 { 0.0 } else { 0.5 };
    let k: Vec<f64> = (0..k_size).map(|i| i as f64 + shift).collect();

    let mut b = vec![0.0; k_size];
    for (fs, am) in freq.chunks(2).zip(ampl.chunks(2)) {
        let (f, ff) = (fs[0], fs[1]);
        let (a, aa) = (am[0], am[1]);
        if ff == f {
            continue;
        }
        let slope = (aa - a) / (ff - f);
        let b1 = a - slope * f;
        if odd == 1 {
            b[0] += b1 * (ff - f) + slope / 2.0 * (ff * ff - f * f);
        }
        for j in odd..k_size {
            let kj2 = k[j] * 2.0;
            let kj2pi = kj2 * PI;
            b[j] += slope / (4.0 * PI * PI) * ((kj2pi * ff).cos() - (kj2pi * f).cos()) / (k[j] * k[j])
                + ff * (slope * ff + b1) * sinc(kj2 * ff)
                - f * (slope * f + b1) * sinc(kj2 * f);
        }
    }

    let a: Vec<f64> = b.into_iter().map(|v| 4.0 * v).collect();
    let result: Vec<f64> = a
        .iter()
        .rev()
        .chain(a.iter().skip(odd))
        .map(|v| v / 2.0)
        .collect();
    debug_assert_eq!(result.len(), filter_length);
    Ok(result)
}

/// Initial Kaiser shape factor and the search step.
const BETA_START: f64 = 10.0;
const BETA_STEP: f64 = 0.01;
const BETA_MAX: f64 = 30.0;

/// Windowed lowpass coefficients whose sum is as close to `up` as the Kaiser shape factor allows.
pub fn lowpass(up: usize, length: usize, freq: &[f64], ampl: &[f64]) -> Result<Vec<f64>, DesignError> {
    if length < 2 {
        return Err(DesignError::Parameters("filter length must be at least 2"));
    }
    let firc = firls(length - 1, freq, ampl)?;
    let u = up as f64;

    let apply_window = |beta: f64| -> Result<(Vec<f64>, f64), DesignError> {
        let coefs = kaiser(firc.len(), beta)
            .into_iter()
            .zip(&firc)
            .map(|(w, c)| u * w * c)
            .collect::<Vec<_>>();
        if coefs.iter().any(|c| !c.is_finite()) {
            return Err(DesignError::NonFinite);
        }
        let sum = coefs.iter().sum();
        Ok((coefs, sum))
    };

    let (mut coefs, mut prev_sum) = apply_window(BETA_START)?;
    let delta = {
        let (_, left) = apply_window(BETA_START - BETA_STEP)?;
        let (_, right) = apply_window(BETA_START + BETA_STEP)?;
        if (prev_sum - left).abs() < (prev_sum - right).abs() {
            -BETA_STEP
        } else {
            BETA_STEP
        }
    };

    let mut prev_beta = BETA_START;
    loop {
        let beta = prev_beta + delta;
        let (next, sum) = apply_window(beta)?;
        if (sum - u).abs() > (prev_sum - u).abs() {
            log::debug!("Kaiser shape factor: {}", prev_beta);
            return Ok(coefs);
        }
        if !(0.0 < beta && beta < BETA_MAX) {
            return Err(DesignError::ShapeFactor);
        }
        prev_beta = beta;
        prev_sum = sum;
        coefs = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bessel() {
        assert_abs_diff_eq!(bessel_i0(0.0), 1.0);
        assert_abs_diff_eq!(bessel_i0(1.0), 1.2660658777520082, epsilon = 1e-12);
        assert_abs_diff_eq!(bessel_i0(10.0), 2815.716628466254, epsilon = 1e-8);
    }

    #[test]
    fn kaiser_window() {
        let w = kaiser(11, 5.0);
        assert_eq!(w.len(), 11);
        assert_abs_diff_eq!(w[5], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[0], 1.0 / bessel_i0(5.0), epsilon = 1e-12);
        for i in 0..11 {
            assert_abs_diff_eq!(w[i], w[10 - i], epsilon = 1e-12);
        }
    }

    #[test]
    fn firls_symmetric() {
        let band = (1.0 - NEAR_ZERO) / 2.0;
        let h = firls(40, &[0.0, band, band, 1.0], &[1.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(h.len(), 41);
        for i in 0..h.len() {
            assert_abs_diff_eq!(h[i], h[h.len() - 1 - i], epsilon = 1e-12);
        }
        // Halfband lowpass: the center tap is the cutoff.
        assert_abs_diff_eq!(h[20], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn firls_even_length() {
        let h = firls(9, &[0.0, 0.4, 0.4, 1.0], &[1.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(h.len(), 10);
    }

    #[test]
    fn firls_rejects_gaps() {
        assert!(firls(10, &[0.0, 0.3, 0.5, 1.0], &[1.0, 1.0, 0.0, 0.0]).is_err());
        assert!(firls(10, &[0.0, 1.0], &[1.0, 1.0]).is_err());
        assert!(firls(10, &[0.0, 0.5, 0.5], &[1.0, 1.0, 0.0]).is_err());
    }

    #[test]
    fn lowpass_gain() {
        for (up, down) in [(1, 2), (2, 3), (3, 2)] {
            let band = (1.0 - NEAR_ZERO) / up as f64;
            let len = 20 * usize::max(up, down) + 1;
            let h = lowpass(up, len, &[0.0, band, band, 1.0], &[1.0, 1.0, 0.0, 0.0]).unwrap();
            assert_eq!(h.len(), len);
            let sum: f64 = h.iter().sum();
            assert_abs_diff_eq!(sum, up as f64, epsilon = 0.05);
        }
    }
}
