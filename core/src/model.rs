//! One-dimensional layered velocity model used for incidence angles and
//! moveout delay curves. Shared read-only between workers.

use crate::prelude::{Phase, RfError, RfResult, DEG2KM};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    /// Ignored for the last layer, which extends to infinite depth.
    pub thickness_km: f64,
    pub vp: f64,
    pub vs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<Layer>", into = "Vec<Layer>")]
pub struct VelocityModel {
    layers: Vec<Layer>,
}

impl TryFrom<Vec<Layer>> for VelocityModel {
    type Error = RfError;

    fn try_from(layers: Vec<Layer>) -> RfResult<Self> {
        Self::new(layers)
    }
}

impl From<VelocityModel> for Vec<Layer> {
    fn from(model: VelocityModel) -> Self {
        model.layers
    }
}

impl Default for VelocityModel {
    fn default() -> Self {
        Self::iasp91()
    }
}

impl VelocityModel {
    pub fn new(layers: Vec<Layer>) -> RfResult<Self> {
        if layers.is_empty() {
            return Err(RfError::InvalidParameter(
                "velocity model needs at least one layer".into(),
            ));
        }
        let last = layers.len() - 1;
        for (idx, layer) in layers.iter().enumerate() {
            if !(layer.vs > 0.0 && layer.vp > layer.vs && layer.vp.is_finite()) {
                return Err(RfError::InvalidParameter(format!(
                    "layer {} needs vp > vs > 0 (vp {}, vs {})",
                    idx, layer.vp, layer.vs
                )));
            }
            if idx < last && !(layer.thickness_km > 0.0 && layer.thickness_km.is_finite()) {
                return Err(RfError::InvalidParameter(format!(
                    "layer {} has thickness {}",
                    idx, layer.thickness_km
                )));
            }
        }
        Ok(Self { layers })
    }

    /// IASP91 crust over a uniform upper-mantle half-space.
    pub fn iasp91() -> Self {
        Self {
            layers: vec![
                Layer {
                    thickness_km: 20.0,
                    vp: 5.8,
                    vs: 3.36,
                },
                Layer {
                    thickness_km: 15.0,
                    vp: 6.5,
                    vs: 3.75,
                },
                Layer {
                    thickness_km: f64::INFINITY,
                    vp: 8.04,
                    vs: 4.47,
                },
            ],
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn surface(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn layer_at(&self, depth_km: f64) -> &Layer {
        let mut top = 0.0;
        let last = self.layers.len() - 1;
        for layer in &self.layers[..last] {
            top += layer.thickness_km;
            if depth_km < top {
                return layer;
            }
        }
        &self.layers[last]
    }

    /// Incidence angle in degrees at the surface for a ray parameter in s/deg.
    pub fn incidence(&self, ray_parameter: f64, phase: Phase) -> RfResult<f64> {
        let p = ray_parameter / DEG2KM;
        let velocity = match phase {
            Phase::P => self.surface().vp,
            Phase::S => self.surface().vs,
        };
        let sine = p * velocity;
        if !(0.0..1.0).contains(&sine) {
            return Err(RfError::InvalidParameter(format!(
                "ray parameter {} s/deg gives sin(i) = {:.4} at the surface",
                ray_parameter, sine
            )));
        }
        Ok(sine.asin().to_degrees())
    }

    /// Converted-minus-direct delay times (s) at each depth of `depths_km`
    /// (increasing, starting at 0) for a ray parameter in s/deg.
    pub fn delay_curve(&self, ray_parameter: f64, depths_km: &[f64]) -> RfResult<Vec<f64>> {
        if !(ray_parameter.is_finite() && ray_parameter >= 0.0) {
            return Err(RfError::InvalidParameter(format!(
                "ray parameter {} s/deg is not a finite non-negative slowness",
                ray_parameter
            )));
        }
        let p = ray_parameter / DEG2KM;
        let p2 = p * p;
        let mut delays = Vec::with_capacity(depths_km.len());
        let mut total = 0.0;
        let mut previous = 0.0;
        for &depth in depths_km {
            let dz = depth - previous;
            if dz > 0.0 {
                let layer = self.layer_at(previous + 0.5 * dz);
                let qa = 1.0 / (layer.vp * layer.vp) - p2;
                let qb = 1.0 / (layer.vs * layer.vs) - p2;
                if qa < 0.0 || qb < 0.0 {
                    return Err(RfError::InvalidParameter(format!(
                        "ray parameter {} s/deg is evanescent at {:.1} km",
                        ray_parameter, depth
                    )));
                }
                total += (qb.sqrt() - qa.sqrt()) * dz;
            }
            previous = depth;
            delays.push(total);
        }
        Ok(delays)
    }
}
