//! Ps/Sp moveout correction to a reference slowness.
//!
//! A conversion at depth `z` arrives `t_p(z) = ∫ (q_β - q_α) dz` after the
//! direct phase. Each output lag `τ` is mapped to the depth that produces it
//! at the reference slowness and read back from the input at that depth's
//! delay for the trace's own slowness.

use crate::interface::trace::Trace;
use crate::math::signal::{interp, sample_at};
use crate::model::VelocityModel;
use crate::prelude::{Phase, RfError, RfResult};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Moveout {
    model: Arc<VelocityModel>,
    phase: Phase,
    reference_slowness: f64,
    depths: Vec<f64>,
    reference: Vec<f64>,
}

impl Moveout {
    pub fn new(
        model: Arc<VelocityModel>,
        phase: Phase,
        reference_slowness: f64,
        max_depth_km: f64,
        depth_step_km: f64,
    ) -> RfResult<Self> {
        if !(depth_step_km > 0.0) || !(max_depth_km > depth_step_km) {
            return Err(RfError::InvalidParameter(format!(
                "depth grid {} km / {} km step is invalid",
                max_depth_km, depth_step_km
            )));
        }
        let steps = (max_depth_km / depth_step_km).floor() as usize;
        let depths: Vec<f64> = (0..=steps).map(|i| i as f64 * depth_step_km).collect();
        let reference = model.delay_curve(reference_slowness, &depths)?;
        Ok(Self {
            model,
            phase,
            reference_slowness,
            depths,
            reference,
        })
    }

    pub fn reference_slowness(&self) -> f64 {
        self.reference_slowness
    }

    /// Delay at slowness `ray_parameter` of the conversion that arrives at
    /// `lag` (>= 0) for the reference slowness.
    fn map_lag(&self, lag: f64, delays: &[f64]) -> f64 {
        let reference_max = self.reference[self.reference.len() - 1];
        if lag >= reference_max {
            // below the grid the ratio of the deepest delays is held
            return lag * delays[delays.len() - 1] / reference_max;
        }
        let depth = interp(lag, &self.reference, &self.depths);
        interp(depth, &self.depths, delays)
    }

    /// Stretches `trace` (on a lag axis) from `ray_parameter` to the
    /// reference slowness. Lags ahead of the direct phase are unchanged.
    pub fn correct(&self, trace: &Trace, ray_parameter: f64) -> RfResult<Trace> {
        let delays = self.model.delay_curve(ray_parameter, &self.depths)?;
        let sample_rate = trace.sample_rate();
        let start = trace.start_time();
        let samples = trace.samples();

        let corrected: Vec<f64> = (0..trace.len())
            .map(|idx| {
                let lag = trace.time_at(idx);
                let mapped = match self.phase {
                    Phase::P if lag > 0.0 => self.map_lag(lag, &delays),
                    Phase::S if lag < 0.0 => -self.map_lag(-lag, &delays),
                    _ => return samples[idx],
                };
                sample_at(samples, (mapped - start) * sample_rate)
            })
            .collect();

        Ok(trace.derive(
            trace.id(),
            corrected,
            start,
            format!(
                "moveout {} s/deg -> {} s/deg",
                ray_parameter, self.reference_slowness
            ),
        ))
    }
}
