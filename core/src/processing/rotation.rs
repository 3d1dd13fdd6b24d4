use crate::math::MatrixHelper;
use crate::model::VelocityModel;
use crate::prelude::{Phase, RfError, RfResult, RotationKind, DEG2KM};
use ndarray::{array, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Station-to-source geometry of one arrival.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Geometry {
    /// Degrees clockwise from north, pointing from station to source.
    pub back_azimuth: f64,
    /// Horizontal slowness in s/deg.
    pub ray_parameter: f64,
    /// Surface incidence in degrees; derived from the model when absent.
    #[serde(default)]
    pub incidence: Option<f64>,
}

impl Geometry {
    pub fn new(back_azimuth: f64, ray_parameter: f64) -> Self {
        Self {
            back_azimuth,
            ray_parameter,
            incidence: None,
        }
    }

    pub fn with_incidence(mut self, incidence: f64) -> Self {
        self.incidence = Some(incidence);
        self
    }

    pub fn validate(&self) -> RfResult<()> {
        if !self.back_azimuth.is_finite() {
            return Err(RfError::InvalidParameter("back-azimuth must be finite".into()));
        }
        if !(self.ray_parameter >= 0.0 && self.ray_parameter.is_finite()) {
            return Err(RfError::InvalidParameter(format!(
                "ray parameter {} s/deg must be finite and non-negative",
                self.ray_parameter
            )));
        }
        if let Some(incidence) = self.incidence {
            if !(0.0..=90.0).contains(&incidence) {
                return Err(RfError::InvalidParameter(format!(
                    "incidence {} deg outside [0, 90]",
                    incidence
                )));
            }
        }
        Ok(())
    }

    /// Incidence in degrees, given or derived from the surface velocity.
    pub fn resolve_incidence(&self, model: &VelocityModel, phase: Phase) -> RfResult<f64> {
        match self.incidence {
            Some(incidence) => Ok(incidence),
            None => model.incidence(self.ray_parameter, phase),
        }
    }
}

/// 3×3 transform from (Z, N, E) rows to the rotated frame.
#[derive(Debug, Clone)]
pub struct Rotation {
    kind: RotationKind,
    matrix: Array2<f64>,
    components: [char; 3],
    incidence: Option<f64>,
}

impl Rotation {
    pub fn new(
        kind: RotationKind,
        phase: Phase,
        geometry: &Geometry,
        model: &VelocityModel,
    ) -> RfResult<Self> {
        geometry.validate()?;
        let baz = geometry.back_azimuth.to_radians();
        let (sb, cb) = baz.sin_cos();
        let rtz = array![[0.0, -cb, -sb], [0.0, sb, -cb], [1.0, 0.0, 0.0]];

        let (matrix, components, incidence) = match kind {
            RotationKind::Lqt => {
                let incidence = geometry.resolve_incidence(model, phase)?;
                let (si, ci) = incidence.to_radians().sin_cos();
                let matrix = array![
                    [ci, -si * cb, -si * sb],
                    [si, ci * cb, ci * sb],
                    [0.0, sb, -cb]
                ];
                (matrix, ['L', 'Q', 'T'], Some(incidence))
            }
            RotationKind::Rtz => (rtz, ['R', 'T', 'Z'], geometry.incidence),
            RotationKind::Pvh => {
                let free_surface = free_surface_matrix(geometry.ray_parameter, model)?;
                let rzt = array![[0.0, -cb, -sb], [1.0, 0.0, 0.0], [0.0, sb, -cb]];
                let matrix = MatrixHelper::multiply(free_surface.view(), rzt.view());
                let incidence = geometry.resolve_incidence(model, phase).ok();
                (matrix, ['P', 'V', 'H'], incidence)
            }
        };

        Ok(Self {
            kind,
            matrix,
            components,
            incidence,
        })
    }

    pub fn kind(&self) -> RotationKind {
        self.kind
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn components(&self) -> [char; 3] {
        self.components
    }

    pub fn incidence(&self) -> Option<f64> {
        self.incidence
    }

    /// Rotates a 3×N block whose rows are Z, N, E.
    pub fn apply(&self, zne: ArrayView2<f64>) -> Array2<f64> {
        MatrixHelper::multiply(self.matrix.view(), zne)
    }

    /// Row indices of `[source, target, target]` for the given phase.
    pub fn roles(&self, phase: Phase) -> [usize; 3] {
        match (self.kind, phase) {
            // L, Q, T
            (RotationKind::Lqt, Phase::P) => [0, 1, 2],
            (RotationKind::Lqt, Phase::S) => [1, 0, 2],
            // R, T, Z
            (RotationKind::Rtz, Phase::P) => [2, 0, 1],
            (RotationKind::Rtz, Phase::S) => [0, 2, 1],
            // P, V, H
            (RotationKind::Pvh, Phase::P) => [0, 1, 2],
            (RotationKind::Pvh, Phase::S) => [1, 0, 2],
        }
    }
}

/// Kennett's free-surface transfer matrix taking (R, Z, T) with Z up to
/// (P, V, H), evaluated with the surface velocities.
fn free_surface_matrix(ray_parameter: f64, model: &VelocityModel) -> RfResult<Array2<f64>> {
    let surface = model.surface();
    let (alpha, beta) = (surface.vp, surface.vs);
    let p = ray_parameter / DEG2KM;
    let qa2 = 1.0 / (alpha * alpha) - p * p;
    let qb2 = 1.0 / (beta * beta) - p * p;
    if qa2 <= 0.0 || qb2 <= 0.0 {
        return Err(RfError::InvalidParameter(format!(
            "ray parameter {} s/deg is evanescent at the free surface",
            ray_parameter
        )));
    }
    let (qa, qb) = (qa2.sqrt(), qb2.sqrt());
    let mid = 0.5 - beta * beta * p * p;
    Ok(array![
        [p * beta * beta / alpha, mid / (alpha * qa), 0.0],
        [mid / (beta * qb), -p * beta, 0.0],
        [0.0, 0.0, 0.5]
    ])
}
