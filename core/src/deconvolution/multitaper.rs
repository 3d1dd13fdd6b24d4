use super::waterlevel::water_level_divide;
use super::{to_lag_axis, Estimate};
use crate::math::fft::{next_pow2, FftHelper};
use crate::math::signal::gaussian_gain;
use crate::math::TaperSet;
use crate::prelude::{RfError, RfResult};
use num_complex::Complex64;
use rustfft::num_traits::Zero;

/// Eigenvalue-weighted average of per-taper water-level spectral ratios.
pub(super) fn run(
    source: &[f64],
    target: &[f64],
    water_level: f64,
    tapers: &TaperSet,
    shift: usize,
    sample_rate: f64,
    gaussian: Option<f64>,
) -> RfResult<Estimate> {
    let n = source.len();
    if tapers.len() != n {
        return Err(RfError::Internal(format!(
            "taper length {} does not match trace length {}",
            tapers.len(),
            n
        )));
    }
    let weight_sum: f64 = tapers.concentrations.iter().sum();
    if !(weight_sum > 0.0) {
        return Err(RfError::DegenerateSignal(
            "taper concentrations sum to zero".into(),
        ));
    }

    let mut fft = FftHelper::new(next_pow2(2 * n));
    let mut average = vec![Complex64::zero(); fft.size()];
    for (taper, &weight) in tapers.tapers.iter().zip(tapers.concentrations.iter()) {
        let tapered_source: Vec<f64> = source.iter().zip(taper).map(|(s, w)| s * w).collect();
        let tapered_target: Vec<f64> = target.iter().zip(taper).map(|(t, w)| t * w).collect();
        let source_spectrum = fft.forward(&tapered_source);
        let target_spectrum = fft.forward(&tapered_target);
        let ratio = water_level_divide(&target_spectrum, &source_spectrum, water_level);
        for (acc, value) in average.iter_mut().zip(ratio) {
            *acc += value * (weight / weight_sum);
        }
    }

    if let Some(width) = gaussian {
        for (k, bin) in average.iter_mut().enumerate() {
            *bin *= gaussian_gain(fft.bin_frequency(k, sample_rate), width);
        }
    }
    let circular = fft.inverse_real(average);

    Ok(Estimate {
        samples: to_lag_axis(&circular, n, shift),
        iterations: None,
        diagnostics: vec![("taper_weight_sum", weight_sum)],
    })
}
