//! Small time-series utilities shared by windowing, deconvolution and
//! stacking.

use crate::math::fft::{next_pow2, FftHelper};
use std::f64::consts::PI;

/// Full linear convolution, length `a.len() + b.len() - 1`.
pub fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let len = a.len() + b.len() - 1;
    let mut fft = FftHelper::new(next_pow2(len));
    let fa = fft.forward(a);
    let fb = fft.forward(b);
    let product = fa.iter().zip(fb.iter()).map(|(x, y)| x * y).collect();
    let mut out = fft.inverse_real(product);
    out.truncate(len);
    out
}

/// `c[k] = sum_n x[n] y[n - (k - (y.len() - 1))]`: the cross-correlation of
/// `x` against `y` at lag `k - (y.len() - 1)`.
pub fn cross_correlate(x: &[f64], y: &[f64]) -> Vec<f64> {
    let reversed: Vec<f64> = y.iter().rev().copied().collect();
    convolve(x, &reversed)
}

/// Autocorrelation for lags `0..x.len()`.
pub fn autocorrelate(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let full = cross_correlate(x, x);
    full[x.len() - 1..].to_vec()
}

/// Gain of the Gaussian low-pass `exp(-w^2 / (4 a^2))` at `frequency` Hz.
pub fn gaussian_gain(frequency: f64, width: f64) -> f64 {
    let omega = 2.0 * PI * frequency;
    (-(omega * omega) / (4.0 * width * width)).exp()
}

/// Applies the Gaussian low-pass, keeping the input length.
pub fn gaussian_filter(samples: &[f64], sample_rate: f64, width: f64) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut fft = FftHelper::new(next_pow2(2 * samples.len()));
    let mut spectrum = fft.forward(samples);
    for (k, bin) in spectrum.iter_mut().enumerate() {
        *bin *= gaussian_gain(fft.bin_frequency(k, sample_rate), width);
    }
    let mut out = fft.inverse_real(spectrum);
    out.truncate(samples.len());
    out
}

/// Cosine (Tukey) taper over `fraction` of the length on each edge.
pub fn cosine_taper(samples: &mut [f64], fraction: f64) {
    let n = samples.len();
    let width = ((n as f64) * fraction).floor() as usize;
    if width == 0 || n < 2 {
        return;
    }
    let width = width.min(n / 2);
    for i in 0..width {
        let weight = 0.5 * (1.0 - (PI * i as f64 / width as f64).cos());
        samples[i] *= weight;
        samples[n - 1 - i] *= weight;
    }
}

pub fn demean(samples: &mut [f64]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    for value in samples.iter_mut() {
        *value -= mean;
    }
}

/// Piecewise-linear interpolation over increasing `xp`; holds the edge values
/// outside the grid.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let upper = xp[..n].partition_point(|&v| v <= x);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span <= 0.0 {
        return fp[lower];
    }
    let weight = (x - xp[lower]) / span;
    fp[lower] + weight * (fp[upper] - fp[lower])
}

/// Linear interpolation of a sampled series at fractional index `position`;
/// zero outside the samples.
pub fn sample_at(samples: &[f64], position: f64) -> f64 {
    if samples.is_empty() || !position.is_finite() || position < 0.0 {
        return 0.0;
    }
    let last = (samples.len() - 1) as f64;
    if position > last {
        return 0.0;
    }
    let lower = position.floor() as usize;
    let frac = position - lower as f64;
    if lower + 1 >= samples.len() || frac == 0.0 {
        return samples[lower];
    }
    samples[lower] * (1.0 - frac) + samples[lower + 1] * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convolve_matches_direct_sum() {
        let out = convolve(&[1.0, 2.0, 3.0], &[0.0, 1.0, 0.5]);
        let expected = [0.0, 1.0, 2.5, 4.0, 1.5];
        assert_eq!(out.len(), expected.len());
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn autocorrelation_zero_lag_is_energy() {
        let r = autocorrelate(&[1.0, -2.0, 2.0]);
        assert_eq!(r.len(), 3);
        assert!((r[0] - 9.0).abs() < 1e-12);
        assert!((r[1] + 6.0).abs() < 1e-12);
        assert!((r[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn taper_zeroes_edges_and_keeps_center() {
        let mut samples = vec![1.0; 20];
        cosine_taper(&mut samples, 0.25);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[19], 0.0);
        assert_eq!(samples[10], 1.0);
        assert!(samples[2] > 0.0 && samples[2] < 1.0);
    }

    #[test]
    fn gaussian_preserves_dc() {
        assert_eq!(gaussian_gain(0.0, 2.5), 1.0);
        let out = gaussian_filter(&[1.0; 64], 20.0, 2.5);
        assert!((out[32] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn interp_holds_edges() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_eq!(interp(1.5, &xp, &fp), 20.0);
        assert_eq!(interp(5.0, &xp, &fp), 30.0);
        assert_eq!(sample_at(&fp, 0.5), 5.0);
        assert_eq!(sample_at(&fp, 2.5), 0.0);
    }
}
