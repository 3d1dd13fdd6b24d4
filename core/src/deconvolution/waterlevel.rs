use super::{to_lag_axis, Estimate};
use crate::math::fft::{next_pow2, FftHelper};
use crate::math::signal::gaussian_gain;
use crate::prelude::RfResult;
use num_complex::Complex64;

/// Bin-wise `numerator / denominator` where any denominator with magnitude
/// below `water_level * max|denominator|` is lifted to that floor, keeping
/// its phase (an exact zero becomes the real floor).
pub fn water_level_divide(
    numerator: &[Complex64],
    denominator: &[Complex64],
    water_level: f64,
) -> Vec<Complex64> {
    let peak = denominator.iter().fold(0.0_f64, |acc, c| acc.max(c.norm()));
    let floor = water_level * peak;
    numerator
        .iter()
        .zip(denominator.iter())
        .map(|(num, den)| {
            let magnitude = den.norm();
            let den = if magnitude >= floor {
                *den
            } else if magnitude > 0.0 {
                den * (floor / magnitude)
            } else {
                Complex64::new(floor, 0.0)
            };
            num / den
        })
        .collect()
}

pub(super) fn run(
    source: &[f64],
    target: &[f64],
    water_level: f64,
    shift: usize,
    sample_rate: f64,
    gaussian: Option<f64>,
) -> RfResult<Estimate> {
    let n = source.len();
    let mut fft = FftHelper::new(next_pow2(2 * n));
    let source_spectrum = fft.forward(source);
    let target_spectrum = fft.forward(target);

    let mut ratio = water_level_divide(&target_spectrum, &source_spectrum, water_level);
    if let Some(width) = gaussian {
        for (k, bin) in ratio.iter_mut().enumerate() {
            *bin *= gaussian_gain(fft.bin_frequency(k, sample_rate), width);
        }
    }
    let circular = fft.inverse_real(ratio);

    Ok(Estimate {
        samples: to_lag_axis(&circular, n, shift),
        iterations: None,
        diagnostics: Vec::new(),
    })
}
