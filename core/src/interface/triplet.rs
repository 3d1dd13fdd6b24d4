use crate::interface::trace::{same_rate, Trace};
use crate::prelude::{RfError, RfResult};

/// Raw vertical/north/east recordings with arbitrary, overlapping spans.
#[derive(Debug, Clone)]
pub struct ZneTraces {
    z: Trace,
    n: Trace,
    e: Trace,
}

impl ZneTraces {
    pub fn new(z: Trace, n: Trace, e: Trace) -> RfResult<Self> {
        let raw = Self { z, n, e };
        raw.validate()?;
        Ok(raw)
    }

    /// All three components must share the vertical's sample rate.
    pub fn validate(&self) -> RfResult<()> {
        for other in [&self.n, &self.e] {
            if !same_rate(self.z.sample_rate(), other.sample_rate()) {
                return Err(RfError::ShapeMismatch(format!(
                    "{} sampled at {} Hz but {} at {} Hz",
                    self.z.id(),
                    self.z.sample_rate(),
                    other.id(),
                    other.sample_rate()
                )));
            }
        }
        Ok(())
    }

    pub fn z(&self) -> &Trace {
        &self.z
    }

    pub fn n(&self) -> &Trace {
        &self.n
    }

    pub fn e(&self) -> &Trace {
        &self.e
    }

    pub fn sample_rate(&self) -> f64 {
        self.z.sample_rate()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trace> {
        [&self.z, &self.n, &self.e].into_iter()
    }
}

/// Rotated, windowed three-component set on a common time base.
#[derive(Debug, Clone)]
pub struct ComponentTriplet {
    source: Trace,
    targets: [Trace; 2],
}

impl ComponentTriplet {
    pub fn new(source: Trace, targets: [Trace; 2]) -> RfResult<Self> {
        for target in &targets {
            if !source.shares_time_base(target) {
                return Err(RfError::ShapeMismatch(format!(
                    "{} ({} samples @ {} Hz from {}) and {} ({} samples @ {} Hz from {}) differ",
                    source.id(),
                    source.len(),
                    source.sample_rate(),
                    source.start_time(),
                    target.id(),
                    target.len(),
                    target.sample_rate(),
                    target.start_time()
                )));
            }
        }
        Ok(Self { source, targets })
    }

    pub fn source(&self) -> &Trace {
        &self.source
    }

    pub fn targets(&self) -> &[Trace; 2] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.source.sample_rate()
    }

    pub fn into_parts(self) -> (Trace, [Trace; 2]) {
        (self.source, self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(id: &str, len: usize, rate: f64, start: f64) -> Trace {
        Trace::new(id, vec![0.0; len], rate, start).unwrap()
    }

    #[test]
    fn triplet_requires_common_time_base() {
        let ok = ComponentTriplet::new(
            trace("XX.A..BHL", 16, 20.0, 0.0),
            [trace("XX.A..BHQ", 16, 20.0, 0.0), trace("XX.A..BHT", 16, 20.0, 0.0)],
        );
        assert!(ok.is_ok());

        let longer = ComponentTriplet::new(
            trace("XX.A..BHL", 16, 20.0, 0.0),
            [trace("XX.A..BHQ", 17, 20.0, 0.0), trace("XX.A..BHT", 16, 20.0, 0.0)],
        );
        assert!(matches!(longer, Err(RfError::ShapeMismatch(_))));

        let shifted = ComponentTriplet::new(
            trace("XX.A..BHL", 16, 20.0, 0.0),
            [trace("XX.A..BHQ", 16, 20.0, 0.0), trace("XX.A..BHT", 16, 20.0, 1.0)],
        );
        assert!(matches!(shifted, Err(RfError::ShapeMismatch(_))));
    }

    #[test]
    fn raw_traces_require_common_rate() {
        let raw = ZneTraces::new(
            trace("XX.A..BHZ", 16, 20.0, 0.0),
            trace("XX.A..BHN", 16, 40.0, 0.0),
            trace("XX.A..BHE", 16, 20.0, 0.0),
        );
        assert!(matches!(raw, Err(RfError::ShapeMismatch(_))));
    }

    #[test]
    fn windowing_rechecks_raw_rates() {
        use crate::model::VelocityModel;
        use crate::prelude::WindowConfig;
        use crate::processing::{Geometry, Windowing};
        use std::sync::Arc;

        let samples = |len: usize| -> Vec<f64> { (0..len).map(|i| (i as f64 * 0.1).sin()).collect() };
        let raw = ZneTraces {
            z: Trace::new("XX.A..BHZ", samples(4000), 10.0, 0.0).unwrap(),
            n: Trace::new("XX.A..BHN", samples(16000), 40.0, 0.0).unwrap(),
            e: Trace::new("XX.A..BHE", samples(4000), 10.0, 0.0).unwrap(),
        };
        let windowing =
            Windowing::new(WindowConfig::default(), Arc::new(VelocityModel::iasp91())).unwrap();
        let result = windowing.extract(&raw, 100.0, &Geometry::new(45.0, 6.4));
        assert!(matches!(result, Err(RfError::ShapeMismatch(_))));
    }
}
