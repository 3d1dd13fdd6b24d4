//! Time-domain iterative deconvolution (Ligorría & Ammon, 1999).
//!
//! Candidate spikes live on the lag axis `m = 0..n` (lag `m - shift`
//! samples). Each iteration adds the lag whose residual correlation with the
//! source is largest, then re-solves the ridge-regularized normal equations
//! for every amplitude found so far. The Toeplitz system over all lags is
//! solved once up front to get the least-squares floor the loop can reach.

use super::Estimate;
use crate::math::signal::{autocorrelate, cross_correlate, gaussian_filter};
use crate::math::{CholeskyFactor, MatrixHelper, StatsHelper};
use crate::prelude::{RfError, RfResult};

struct Normal {
    /// Source autocorrelation, lags `0..n`.
    auto: Vec<f64>,
    /// Correlation of the target with the source shifted to each candidate lag.
    cross: Vec<f64>,
    target_energy: f64,
    ridge: f64,
}

impl Normal {
    fn new(source: &[f64], target: &[f64], shift: usize, ridge: f64) -> Self {
        let n = source.len();
        let auto = autocorrelate(source);
        let full = cross_correlate(target, source);
        let cross = (0..n).map(|m| full[m + n - 1 - shift]).collect();
        let ridge = ridge * auto[0];
        Self {
            auto,
            cross,
            target_energy: StatsHelper::energy(target),
            ridge,
        }
    }

    fn lag_distance(&self, a: usize, b: usize) -> f64 {
        self.auto[a.abs_diff(b)]
    }

    /// Residual energy for amplitudes solving the regularized system on
    /// `support`.
    fn residual_energy(&self, support: &[usize], amplitudes: &[f64]) -> f64 {
        let explained: f64 = support
            .iter()
            .zip(amplitudes)
            .map(|(&m, a)| a * self.cross[m])
            .sum();
        let penalty: f64 = amplitudes.iter().map(|a| a * a).sum::<f64>() * self.ridge;
        self.target_energy - explained - penalty
    }

    /// Energy left after the full-band least-squares filter, clamped to
    /// `[0, target_energy]`; `0` when the Toeplitz system is singular.
    fn least_squares_floor(&self) -> f64 {
        let mut lags = self.auto.clone();
        lags[0] += self.ridge;
        match MatrixHelper::levinson(&lags, &self.cross) {
            Some(filter) => {
                let all: Vec<usize> = (0..filter.len()).collect();
                let floor = self.residual_energy(&all, &filter);
                if floor.is_finite() {
                    floor.clamp(0.0, self.target_energy)
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }
}

pub(super) fn run(
    source: &[f64],
    target: &[f64],
    shift: usize,
    max_iterations: usize,
    tolerance: f64,
    ridge: f64,
    gaussian: Option<(f64, f64)>,
) -> RfResult<Estimate> {
    let n = source.len();
    let normal = Normal::new(source, target, shift, ridge);
    let tt = normal.target_energy;
    let floor = normal.least_squares_floor();

    let mut factor = CholeskyFactor::new();
    let mut support: Vec<usize> = Vec::new();
    let mut amplitudes: Vec<f64> = Vec::new();
    let mut residual = normal.cross.clone();
    let mut energy = tt;

    while support.len() < max_iterations {
        let lag = match StatsHelper::argmax_abs(&residual) {
            Some(lag) if residual[lag] != 0.0 => lag,
            _ => break,
        };
        if support.contains(&lag) {
            break;
        }

        let mut row: Vec<f64> = support
            .iter()
            .map(|&m| normal.lag_distance(lag, m))
            .collect();
        row.push(normal.auto[0] + normal.ridge);
        if !factor.push(&row) {
            return Err(RfError::DegenerateSignal(format!(
                "normal equations lost positive definiteness at lag {}",
                lag as isize - shift as isize
            )));
        }
        support.push(lag);

        let rhs: Vec<f64> = support.iter().map(|&m| normal.cross[m]).collect();
        amplitudes = factor.solve(&rhs).ok_or_else(|| {
            RfError::Internal("cholesky solve failed on a square factor".into())
        })?;

        for (m, value) in residual.iter_mut().enumerate() {
            let predicted: f64 = support
                .iter()
                .zip(&amplitudes)
                .map(|(&j, a)| a * normal.lag_distance(m, j))
                .sum();
            *value = normal.cross[m] - predicted;
        }

        let next = normal.residual_energy(&support, &amplitudes);
        let improvement = (energy - next) / tt;
        energy = next;
        if improvement < tolerance || (energy - floor) / tt < tolerance {
            break;
        }
    }

    let mut spikes = vec![0.0; n];
    for (&m, &a) in support.iter().zip(&amplitudes) {
        spikes[m] = a;
    }
    let samples = match gaussian {
        Some((sample_rate, width)) => gaussian_filter(&spikes, sample_rate, width),
        None => spikes,
    };

    let least_squares_fit = 1.0 - (floor / tt).sqrt();
    Ok(Estimate {
        samples,
        iterations: Some(support.len()),
        diagnostics: vec![
            ("least_squares_fit", least_squares_fit),
            ("spikes", support.len() as f64),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_spike_is_found_at_its_lag() {
        let source = [1.0, -0.5, 0.25, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut target = [0.0; 8];
        for (i, s) in source.iter().enumerate() {
            if i + 2 < 8 {
                target[i + 2] = 2.0 * s;
            }
        }
        let estimate = run(&source, &target, 1, 10, 1e-8, 0.0, None).unwrap();
        let peak = StatsHelper::argmax_abs(&estimate.samples).unwrap();
        assert_eq!(peak, 3);
        assert!((estimate.samples[3] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn iteration_cap_bounds_the_support() {
        let source = [1.0, 0.3, -0.2, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let target = [0.2, -1.0, 0.7, 0.4, -0.9, 0.3, 0.1, -0.5, 0.8, 0.2];
        let estimate = run(&source, &target, 0, 3, 0.0, 1e-6, None).unwrap();
        assert!(estimate.iterations.unwrap() <= 3);
        let nonzero = estimate.samples.iter().filter(|v| **v != 0.0).count();
        assert_eq!(nonzero, estimate.iterations.unwrap());
    }
}
