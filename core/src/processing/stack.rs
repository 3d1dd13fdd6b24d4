use crate::interface::trace::{keys, Trace};
use crate::interface::{DeconvolutionResult, Rejection, RejectionReason, StackedReceiverFunction};
use crate::math::StatsHelper;
use crate::model::VelocityModel;
use crate::prelude::{Aggregate, Phase, RfError, RfResult, StackConfig};
use crate::processing::moveout::Moveout;
use crate::telemetry::LogManager;
use std::sync::Arc;

/// Label naming one input of a stack: its channel id plus the event, when
/// known.
pub fn input_label(trace: &Trace) -> String {
    match trace.metadata().text(keys::EVENT) {
        Some(event) => format!("{}@{}", trace.id(), event),
        None => trace.id().to_string(),
    }
}

/// Moveout-corrects, screens and aggregates the results of one station.
#[derive(Debug, Clone)]
pub struct Stacker {
    config: StackConfig,
    model: Arc<VelocityModel>,
    phase: Phase,
    logger: LogManager,
}

impl Stacker {
    pub fn new(config: StackConfig, model: Arc<VelocityModel>) -> RfResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model,
            phase: Phase::P,
            logger: LogManager::new("stacking"),
        })
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Stacks `results`, each recorded at the matching entry of
    /// `ray_parameters` (s/deg). Inputs are never modified; rejected ones are
    /// listed on the output.
    pub fn stack(
        &self,
        results: &[DeconvolutionResult],
        ray_parameters: &[f64],
    ) -> RfResult<StackedReceiverFunction> {
        if results.len() != ray_parameters.len() {
            return Err(RfError::ShapeMismatch(format!(
                "{} results but {} ray parameters",
                results.len(),
                ray_parameters.len()
            )));
        }
        if let Some(bad) = ray_parameters
            .iter()
            .find(|p| !(p.is_finite() && **p >= 0.0))
        {
            return Err(RfError::InvalidParameter(format!(
                "ray parameter {} s/deg is not a finite non-negative slowness",
                bad
            )));
        }
        let first = match results.first() {
            Some(first) => first.trace(),
            None => return Err(RfError::EmptyStack("no results to stack".into())),
        };
        for result in &results[1..] {
            if !first.shares_time_base(result.trace()) {
                return Err(RfError::ShapeMismatch(format!(
                    "{} and {} are not on the same lag axis",
                    input_label(first),
                    input_label(result.trace())
                )));
            }
        }

        let peaks: Vec<f64> = results.iter().map(|r| r.peak_amplitude()).collect();
        let median_peak = StatsHelper::median(&peaks).unwrap_or(0.0);

        let mut rejections = Vec::new();
        let mut survivors = Vec::new();
        for (index, (result, &peak)) in results.iter().zip(peaks.iter()).enumerate() {
            let reason = if result.fit() < self.config.min_fit {
                Some(RejectionReason::LowFit {
                    fit: result.fit(),
                    threshold: self.config.min_fit,
                })
            } else if median_peak > 0.0 && peak > self.config.outlier_factor * median_peak {
                Some(RejectionReason::Outlier {
                    peak,
                    median_peak,
                    factor: self.config.outlier_factor,
                })
            } else {
                None
            };
            match reason {
                Some(reason) => rejections.push(Rejection {
                    index,
                    id: input_label(result.trace()),
                    reason,
                }),
                None => survivors.push(index),
            }
        }

        let station = first
            .station()
            .map(str::to_string)
            .or_else(|| first.id().split('.').nth(1).map(str::to_string))
            .unwrap_or_default();
        if survivors.is_empty() {
            return Err(RfError::EmptyStack(format!(
                "all {} inputs for {} were rejected",
                results.len(),
                station
            )));
        }

        let moveout = if self.config.moveout {
            Some(Moveout::new(
                self.model.clone(),
                self.phase,
                self.config.reference_slowness,
                self.config.max_depth_km,
                self.config.depth_step_km,
            )?)
        } else {
            None
        };

        let mut aligned = Vec::with_capacity(survivors.len());
        let mut inputs = Vec::with_capacity(survivors.len());
        for &index in &survivors {
            let trace = results[index].trace();
            let samples = match &moveout {
                Some(moveout) => moveout.correct(trace, ray_parameters[index])?.samples().to_vec(),
                None => trace.samples().to_vec(),
            };
            aligned.push(samples);
            inputs.push(input_label(trace));
        }

        let mut column = vec![0.0; aligned.len()];
        let stacked: Vec<f64> = (0..first.len())
            .map(|sample| {
                for (value, samples) in column.iter_mut().zip(aligned.iter()) {
                    *value = samples[sample];
                }
                match self.config.aggregate {
                    Aggregate::Mean => StatsHelper::mean(&column),
                    Aggregate::TrimmedMean { fraction } => {
                        StatsHelper::trimmed_mean(&column, fraction)
                    }
                }
            })
            .collect();

        let mut trace = Trace::new(first.id(), stacked, first.sample_rate(), first.start_time())?
            .with_header(keys::STATION, station.as_str())
            .with_header(keys::PHASE, self.phase.name());
        if let Some(method) = first.metadata().text(keys::METHOD) {
            trace.annotate(keys::METHOD, method);
        }
        if moveout.is_some() {
            trace.annotate(keys::RAY_PARAMETER, self.config.reference_slowness);
        }
        trace.record(format!(
            "{} stack of {} (rejected {})",
            self.config.aggregate.name(),
            survivors.len(),
            rejections.len()
        ));

        self.logger.record(&format!(
            "{} {}: stacked {} of {}",
            station,
            first.id(),
            survivors.len(),
            results.len()
        ));
        Ok(StackedReceiverFunction {
            trace,
            station,
            contributing: survivors.len(),
            inputs,
            rejections,
            aggregate: self.config.aggregate,
            reference_slowness: self.config.reference_slowness,
            moveout: self.config.moveout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn result(event: &str, samples: Vec<f64>, fit: f64) -> DeconvolutionResult {
        let trace = Trace::new("XX.STA..BHQ", samples, 10.0, -1.0)
            .unwrap()
            .with_header(keys::STATION, "STA")
            .with_header(keys::EVENT, event);
        DeconvolutionResult::new(trace, "iterative", BTreeMap::new(), fit, Some(3)).unwrap()
    }

    fn flat_stacker(aggregate: Aggregate) -> Stacker {
        let config = StackConfig {
            moveout: false,
            aggregate,
            ..Default::default()
        };
        Stacker::new(config, Arc::new(VelocityModel::iasp91())).unwrap()
    }

    #[test]
    fn low_fit_result_is_rejected_and_recorded() {
        let fits = [0.9, 0.8, 0.2, 0.95, 0.7];
        let results: Vec<DeconvolutionResult> = fits
            .iter()
            .enumerate()
            .map(|(i, &fit)| result(&format!("ev{}", i), vec![i as f64 + 1.0; 20], fit))
            .collect();
        let stack = flat_stacker(Aggregate::Mean)
            .stack(&results, &[6.0; 5])
            .unwrap();

        assert_eq!(stack.contributing, 4);
        assert_eq!(stack.rejections.len(), 1);
        assert_eq!(stack.rejections[0].index, 2);
        assert_eq!(stack.rejections[0].id, "XX.STA..BHQ@ev2");
        assert!(matches!(stack.rejections[0].reason, RejectionReason::LowFit { .. }));
        let expected = (1.0 + 2.0 + 4.0 + 5.0) / 4.0;
        assert!(stack.trace.samples().iter().all(|v| (v - expected).abs() < 1e-12));
        assert_eq!(stack.station, "STA");
        // inputs are untouched
        assert_eq!(results[2].trace().samples()[0], 3.0);
    }

    #[test]
    fn outlier_peak_is_rejected() {
        let mut results: Vec<DeconvolutionResult> = (0..4)
            .map(|i| result(&format!("ev{}", i), vec![1.0; 10], 0.9))
            .collect();
        results.push(result("loud", vec![50.0; 10], 0.9));
        let stack = flat_stacker(Aggregate::Mean)
            .stack(&results, &[6.0; 5])
            .unwrap();
        assert_eq!(stack.contributing, 4);
        assert!(matches!(stack.rejections[0].reason, RejectionReason::Outlier { .. }));
    }

    #[test]
    fn trimmed_mean_drops_extremes() {
        let results: Vec<DeconvolutionResult> = [1.0, 2.0, 3.0, 4.0, 4.5]
            .iter()
            .enumerate()
            .map(|(i, &v)| result(&format!("ev{}", i), vec![v; 8], 0.9))
            .collect();
        let stack = flat_stacker(Aggregate::TrimmedMean { fraction: 0.2 })
            .stack(&results, &[6.0; 5])
            .unwrap();
        assert!((stack.trace.samples()[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_and_fully_rejected_stacks_fail() {
        let stacker = flat_stacker(Aggregate::Mean);
        assert!(matches!(stacker.stack(&[], &[]), Err(RfError::EmptyStack(_))));
        let poor = vec![result("a", vec![1.0; 4], 0.1), result("b", vec![1.0; 4], 0.3)];
        assert!(matches!(stacker.stack(&poor, &[6.0, 6.0]), Err(RfError::EmptyStack(_))));
    }

    #[test]
    fn mismatched_inputs_fail() {
        let stacker = flat_stacker(Aggregate::Mean);
        let results = vec![result("a", vec![1.0; 4], 0.9), result("b", vec![1.0; 5], 0.9)];
        assert!(matches!(
            stacker.stack(&results, &[6.0, 6.0]),
            Err(RfError::ShapeMismatch(_))
        ));
        assert!(matches!(
            stacker.stack(&results[..1], &[6.0, 6.0]),
            Err(RfError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn moveout_at_reference_slowness_keeps_the_mean() {
        let stacker = Stacker::new(StackConfig::default(), Arc::new(VelocityModel::iasp91())).unwrap();
        let samples: Vec<f64> = (0..60).map(|i| (i as f64 * 0.3).cos()).collect();
        let results = vec![
            result("a", samples.clone(), 0.9),
            result("b", samples.clone(), 0.8),
        ];
        let stack = stacker.stack(&results, &[6.4, 6.4]).unwrap();
        for (a, b) in stack.trace.samples().iter().zip(samples.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert_eq!(stack.trace.metadata().number(keys::RAY_PARAMETER), Some(6.4));
    }

    #[test]
    fn invalid_ray_parameters_are_rejected() {
        let stacker = Stacker::new(StackConfig::default(), Arc::new(VelocityModel::iasp91())).unwrap();
        let results = vec![result("a", vec![1.0; 60], 0.9), result("b", vec![2.0; 60], 0.9)];
        for bad in [f64::NAN, -1.0, f64::INFINITY] {
            assert!(matches!(
                stacker.stack(&results, &[6.4, bad]),
                Err(RfError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn rejection_with_moveout_averages_the_aligned_survivors() {
        let config = StackConfig::default();
        let model = Arc::new(VelocityModel::iasp91());
        let stacker = Stacker::new(config.clone(), model.clone()).unwrap();
        let moveout = Moveout::new(
            model,
            Phase::P,
            config.reference_slowness,
            config.max_depth_km,
            config.depth_step_km,
        )
        .unwrap();

        let fits = [0.9, 0.8, 0.2, 0.95, 0.7];
        let slowness = [4.5, 5.5, 6.4, 7.5, 8.5];
        let results: Vec<DeconvolutionResult> = fits
            .iter()
            .enumerate()
            .map(|(k, &fit)| {
                let samples = (0..80)
                    .map(|i| (i as f64 * 0.3 + k as f64).cos() * (-(i as f64) / 60.0).exp())
                    .collect();
                result(&format!("ev{}", k), samples, fit)
            })
            .collect();
        let stack = stacker.stack(&results, &slowness).unwrap();

        assert_eq!(stack.contributing, 4);
        assert_eq!(stack.rejections.len(), 1);
        assert_eq!(stack.rejections[0].index, 2);

        let corrected: Vec<Vec<f64>> = [0, 1, 3, 4]
            .iter()
            .map(|&k| {
                moveout
                    .correct(results[k].trace(), slowness[k])
                    .unwrap()
                    .samples()
                    .to_vec()
            })
            .collect();
        for (i, &value) in stack.trace.samples().iter().enumerate() {
            let expected = corrected.iter().map(|c| c[i]).sum::<f64>() / 4.0;
            assert!((value - expected).abs() < 1e-12, "sample {}", i);
        }
        // the steep and grazing rays really were realigned
        assert!(corrected[0] != results[0].trace().samples());
        assert!(corrected[3] != results[4].trace().samples());
    }
}
