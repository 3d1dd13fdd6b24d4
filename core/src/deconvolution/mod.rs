//! Deconvolution engine: recovers `h` such that `source ⊛ h ≈ target`.
//!
//! The method is picked by [`DeconvolutionMethod`]; every variant shares
//! the shape checks, the lag axis convention and the fit-quality measure.

mod iterative;
mod multitaper;
mod waterlevel;

pub use waterlevel::water_level_divide;

use crate::interface::trace::{keys, same_rate, Trace};
use crate::interface::DeconvolutionResult;
use crate::math::signal::{convolve, gaussian_filter};
use crate::math::{StatsHelper, TaperBank, TaperSet};
use crate::prelude::{DeconvolutionMethod, DeconvolutionParams, RfError, RfResult};
use crate::telemetry::LogManager;
use std::sync::Arc;

/// Raw estimate on the lag axis before it is wrapped into a result.
struct Estimate {
    samples: Vec<f64>,
    iterations: Option<usize>,
    diagnostics: Vec<(&'static str, f64)>,
}

/// Configured deconvolution engine. Cheap to share between workers.
#[derive(Debug, Clone)]
pub struct Deconvolver {
    params: DeconvolutionParams,
    tapers: Arc<TaperBank>,
    logger: LogManager,
}

impl Deconvolver {
    pub fn new(params: DeconvolutionParams) -> RfResult<Self> {
        Self::with_taper_bank(params, Arc::new(TaperBank::new()))
    }

    pub fn with_taper_bank(params: DeconvolutionParams, tapers: Arc<TaperBank>) -> RfResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            tapers,
            logger: LogManager::new("deconvolution"),
        })
    }

    pub fn params(&self) -> &DeconvolutionParams {
        &self.params
    }

    pub fn deconvolve(&self, source: &Trace, target: &Trace) -> RfResult<DeconvolutionResult> {
        check_shapes(source, target)?;
        let n = source.len();
        if n == 0 {
            return Err(RfError::DegenerateSignal(format!(
                "{} is empty",
                source.id()
            )));
        }
        let source_energy = StatsHelper::energy(source.samples());
        if source_energy == 0.0 || !source_energy.is_finite() {
            return Err(RfError::DegenerateSignal(format!(
                "source {} has energy {}",
                source.id(),
                source_energy
            )));
        }
        let target_energy = StatsHelper::energy(target.samples());
        if target_energy == 0.0 || !target_energy.is_finite() {
            return Err(RfError::DegenerateSignal(format!(
                "target {} has energy {}",
                target.id(),
                target_energy
            )));
        }

        let sample_rate = source.sample_rate();
        let shift = (self.params.time_shift * sample_rate).round() as usize;
        if shift >= n {
            return Err(RfError::InvalidParameter(format!(
                "time shift {} s spans the whole {}-sample trace",
                self.params.time_shift, n
            )));
        }

        let gaussian = self.params.gaussian_width;
        let estimate = match self.params.method {
            DeconvolutionMethod::Iterative {
                max_iterations,
                tolerance,
                ridge,
            } => iterative::run(
                source.samples(),
                target.samples(),
                shift,
                max_iterations,
                tolerance,
                ridge,
                gaussian.map(|width| (sample_rate, width)),
            )?,
            DeconvolutionMethod::WaterLevel { water_level } => waterlevel::run(
                source.samples(),
                target.samples(),
                water_level,
                shift,
                sample_rate,
                gaussian,
            )?,
            DeconvolutionMethod::Multitaper {
                water_level,
                tapers,
                time_bandwidth,
            } => {
                let set = self.taper_set(n, time_bandwidth, tapers)?;
                multitaper::run(
                    source.samples(),
                    target.samples(),
                    water_level,
                    &set,
                    shift,
                    sample_rate,
                    gaussian,
                )?
            }
        };

        if estimate.samples.iter().any(|v| !v.is_finite()) {
            return Err(RfError::DegenerateSignal(format!(
                "{} deconvolution of {} by {} is not finite",
                self.params.method.name(),
                target.id(),
                source.id()
            )));
        }

        let reference = match gaussian {
            Some(width) => gaussian_filter(target.samples(), sample_rate, width),
            None => target.samples().to_vec(),
        };
        let fit = fit_quality(source.samples(), &reference, &estimate.samples, shift);

        let method = self.params.method.name();
        let mut trace = target.derive(
            target.id(),
            estimate.samples,
            -(shift as f64) / sample_rate,
            format!("deconvolved by {} ({})", source.id(), method),
        );
        trace.annotate(keys::METHOD, method);
        trace.annotate(keys::SOURCE_ID, source.id());

        let mut parameters = self.params.provenance();
        for (name, value) in estimate.diagnostics {
            parameters.insert(name.to_string(), value);
        }

        self.logger.detail(&format!(
            "{} / {} via {}: fit {:.4}",
            target.id(),
            source.id(),
            method,
            fit
        ));
        DeconvolutionResult::new(trace, method, parameters, fit, estimate.iterations)
    }

    fn taper_set(&self, len: usize, nw: f64, count: usize) -> RfResult<Arc<TaperSet>> {
        if let Some(set) = self.tapers.get(len, nw, count) {
            return Ok(set);
        }
        self.logger
            .detail(&format!("computing {} tapers of length {} on demand", count, len));
        let mut scratch = TaperBank::new();
        scratch.prepare(len, nw, count)
    }
}

/// Deconvolves `target` by `source` with a one-off engine.
pub fn deconvolve(
    source: &Trace,
    target: &Trace,
    params: &DeconvolutionParams,
) -> RfResult<DeconvolutionResult> {
    Deconvolver::new(params.clone())?.deconvolve(source, target)
}

fn check_shapes(source: &Trace, target: &Trace) -> RfResult<()> {
    if source.len() != target.len() {
        return Err(RfError::ShapeMismatch(format!(
            "source {} has {} samples, target {} has {}",
            source.id(),
            source.len(),
            target.id(),
            target.len()
        )));
    }
    if !same_rate(source.sample_rate(), target.sample_rate()) {
        return Err(RfError::ShapeMismatch(format!(
            "source {} at {} Hz, target {} at {} Hz",
            source.id(),
            source.sample_rate(),
            target.id(),
            target.sample_rate()
        )));
    }
    Ok(())
}

/// `1 - ||t - s ⊛ r|| / ||t||`, clamped to `[0, 1]`; `r` is on the lag axis
/// with lag zero at `shift`.
fn fit_quality(source: &[f64], target: &[f64], rf: &[f64], shift: usize) -> f64 {
    let full = convolve(source, rf);
    let misfit: f64 = target
        .iter()
        .enumerate()
        .map(|(idx, &t)| {
            let predicted = full.get(idx + shift).copied().unwrap_or(0.0);
            (t - predicted) * (t - predicted)
        })
        .sum::<f64>()
        .sqrt();
    let norm = StatsHelper::norm(target);
    if norm == 0.0 {
        return 0.0;
    }
    let fit = 1.0 - misfit / norm;
    if fit.is_nan() {
        fit
    } else {
        fit.clamp(0.0, 1.0)
    }
}

/// Moves lag zero of a circular estimate to index `shift` and keeps `n`
/// samples.
fn to_lag_axis(circular: &[f64], n: usize, shift: usize) -> Vec<f64> {
    let size = circular.len();
    (0..n)
        .map(|m| circular[(m + size - shift) % size])
        .collect()
}
