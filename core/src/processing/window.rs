use crate::interface::trace::{keys, Trace};
use crate::interface::{ComponentTriplet, ZneTraces};
use crate::math::signal::{cosine_taper, demean};
use crate::model::VelocityModel;
use crate::prelude::{RfError, RfResult, WindowConfig};
use crate::processing::rotation::{Geometry, Rotation};
use crate::telemetry::LogManager;
use ndarray::{Array2, Axis};
use std::sync::Arc;

/// Cuts a window around an arrival and rotates it into the configured frame.
#[derive(Debug, Clone)]
pub struct Windowing {
    config: WindowConfig,
    model: Arc<VelocityModel>,
    logger: LogManager,
}

impl Windowing {
    pub fn new(config: WindowConfig, model: Arc<VelocityModel>) -> RfResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model,
            logger: LogManager::new("windowing"),
        })
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Window length in samples at `sample_rate`.
    pub fn window_len(&self, sample_rate: f64) -> usize {
        ((self.config.before + self.config.after) * sample_rate).round() as usize + 1
    }

    pub fn extract(
        &self,
        raw: &ZneTraces,
        arrival_time: f64,
        geometry: &Geometry,
    ) -> RfResult<ComponentTriplet> {
        if !arrival_time.is_finite() {
            return Err(RfError::InvalidParameter("arrival time must be finite".into()));
        }
        raw.validate()?;
        let phase = self.config.phase;
        let rotation = Rotation::new(self.config.rotation, phase, geometry, &self.model)?;

        let sample_rate = raw.sample_rate();
        let len = self.window_len(sample_rate);
        let window_start = arrival_time - self.config.before;

        let mut block = Array2::<f64>::zeros((3, len));
        let mut start_time = window_start;
        for (row, trace) in raw.iter().enumerate() {
            let offset = cut_offset(trace, window_start, len)?;
            if row == 0 {
                start_time = trace.time_at(offset);
            }
            let mut window = trace.samples()[offset..offset + len].to_vec();
            if self.config.demean {
                demean(&mut window);
            }
            cosine_taper(&mut window, self.config.taper_fraction);
            for (cell, value) in block.row_mut(row).iter_mut().zip(window) {
                *cell = value;
            }
        }

        let rotated = rotation.apply(block.view());
        let components = rotation.components();
        let step = format!(
            "window [-{}, +{}] s around {} at {:.3} s, taper {}, {}",
            self.config.before,
            self.config.after,
            phase.name(),
            arrival_time,
            self.config.taper_fraction,
            rotation.kind().name()
        );

        let build = |row: usize| -> Trace {
            let samples = rotated.index_axis(Axis(0), row).to_vec();
            let id = raw.z().id_with_component(components[row]);
            let mut trace = raw.z().derive(id, samples, start_time, step.clone());
            trace.annotate(keys::ONSET, arrival_time);
            trace.annotate(keys::PHASE, phase.name());
            trace.annotate(keys::BACK_AZIMUTH, geometry.back_azimuth);
            trace.annotate(keys::RAY_PARAMETER, geometry.ray_parameter);
            trace.annotate(keys::ROTATION, rotation.kind().name());
            if let Some(incidence) = rotation.incidence() {
                trace.annotate(keys::INCIDENCE, incidence);
            }
            trace
        };

        let [source, first, second] = rotation.roles(phase);
        self.logger.detail(&format!(
            "{}: {} samples from {:.3} s, source {}",
            raw.z().id(),
            len,
            start_time,
            components[source]
        ));
        ComponentTriplet::new(build(source), [build(first), build(second)])
    }
}

/// First sample of a `len`-sample window starting at `window_start`.
fn cut_offset(trace: &Trace, window_start: f64, len: usize) -> RfResult<usize> {
    let offset = ((window_start - trace.start_time()) * trace.sample_rate()).round();
    if offset < 0.0 || offset as usize + len > trace.len() {
        return Err(RfError::InsufficientData(format!(
            "{} spans [{:.3}, {:.3}] s but the window needs [{:.3}, {:.3}] s",
            trace.id(),
            trace.start_time(),
            trace.end_time(),
            window_start,
            window_start + (len - 1) as f64 * trace.delta()
        )));
    }
    Ok(offset as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::{Phase, RotationKind};

    const RATE: f64 = 10.0;

    fn raw(len: usize, start: f64) -> ZneTraces {
        let ramp = |scale: f64| -> Vec<f64> { (0..len).map(|i| scale * i as f64).collect() };
        ZneTraces::new(
            Trace::new("XX.STA..BHZ", ramp(1.0), RATE, start)
                .unwrap()
                .with_header(keys::STATION, "STA"),
            Trace::new("XX.STA..BHN", ramp(2.0), RATE, start).unwrap(),
            Trace::new("XX.STA..BHE", ramp(3.0), RATE, start).unwrap(),
        )
        .unwrap()
    }

    fn config(rotation: RotationKind) -> WindowConfig {
        WindowConfig {
            phase: Phase::P,
            before: 2.0,
            after: 3.0,
            taper_fraction: 0.0,
            rotation,
            demean: false,
        }
    }

    #[test]
    fn window_cuts_the_requested_samples() {
        let windowing =
            Windowing::new(config(RotationKind::Rtz), Arc::new(VelocityModel::iasp91())).unwrap();
        let triplet = windowing
            .extract(&raw(200, 0.0), 10.0, &Geometry::new(0.0, 6.0))
            .unwrap();
        assert_eq!(triplet.len(), 51);
        let source = triplet.source();
        assert_eq!(source.id(), "XX.STA..BHZ");
        assert!((source.start_time() - 8.0).abs() < 1e-12);
        assert!((source.samples()[0] - 80.0).abs() < 1e-9);
        // back-azimuth 0: R = -N
        let radial = &triplet.targets()[0];
        assert_eq!(radial.id(), "XX.STA..BHR");
        assert!((radial.samples()[0] + 160.0).abs() < 1e-9);
        assert_eq!(radial.station(), Some("STA"));
        assert_eq!(radial.metadata().text(keys::ROTATION), Some("ZNE->RTZ"));
        assert_eq!(radial.metadata().history().len(), 1);
    }

    #[test]
    fn window_outside_the_data_is_rejected() {
        let windowing =
            Windowing::new(config(RotationKind::Lqt), Arc::new(VelocityModel::iasp91())).unwrap();
        let geometry = Geometry::new(45.0, 6.0);
        let early = windowing.extract(&raw(200, 0.0), 1.0, &geometry);
        assert!(matches!(early, Err(RfError::InsufficientData(_))));
        let late = windowing.extract(&raw(200, 0.0), 18.0, &geometry);
        assert!(matches!(late, Err(RfError::InsufficientData(_))));
        let outside = windowing.extract(&raw(200, 100.0), 10.0, &geometry);
        assert!(matches!(outside, Err(RfError::InsufficientData(_))));
    }

    #[test]
    fn lqt_triplet_carries_incidence() {
        let windowing =
            Windowing::new(config(RotationKind::Lqt), Arc::new(VelocityModel::iasp91())).unwrap();
        let triplet = windowing
            .extract(&raw(200, 0.0), 10.0, &Geometry::new(45.0, 6.0))
            .unwrap();
        assert_eq!(triplet.source().component(), Some('L'));
        assert_eq!(triplet.targets()[0].component(), Some('Q'));
        assert_eq!(triplet.targets()[1].component(), Some('T'));
        assert!(triplet.source().metadata().number(keys::INCIDENCE).is_some());
    }

    #[test]
    fn demean_and_taper_are_applied() {
        let mut cfg = config(RotationKind::Rtz);
        cfg.demean = true;
        cfg.taper_fraction = 0.1;
        let windowing = Windowing::new(cfg, Arc::new(VelocityModel::iasp91())).unwrap();
        let triplet = windowing
            .extract(&raw(200, 0.0), 10.0, &Geometry::new(0.0, 6.0))
            .unwrap();
        let z = triplet.source().samples();
        assert_eq!(z[0], 0.0);
        assert_eq!(z[50], 0.0);
        assert!(z[25].abs() < 1e-9);
    }
}
