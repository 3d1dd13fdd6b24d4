use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kilometres per degree of epicentral distance.
pub const DEG2KM: f64 = 111.2;

/// Common error type for every core operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RfError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("degenerate signal: {0}")]
    DegenerateSignal(String),
    #[error("empty stack: {0}")]
    EmptyStack(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl RfError {
    /// Short machine-friendly label, used by the metrics recorder.
    pub fn kind(&self) -> &'static str {
        match self {
            RfError::ShapeMismatch(_) => "shape_mismatch",
            RfError::InsufficientData(_) => "insufficient_data",
            RfError::DegenerateSignal(_) => "degenerate_signal",
            RfError::EmptyStack(_) => "empty_stack",
            RfError::InvalidParameter(_) => "invalid_parameter",
            RfError::Internal(_) => "internal",
        }
    }
}

pub type RfResult<T> = Result<T, RfError>;

/// Teleseismic phase used as the reference arrival.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    P,
    S,
}

impl Phase {
    /// Default request window `(before, after)` in seconds around the onset.
    pub fn default_window(self) -> (f64, f64) {
        match self {
            Phase::P => (50.0, 150.0),
            Phase::S => (100.0, 50.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::P => "P",
            Phase::S => "S",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().chars().last()?.to_ascii_uppercase() {
            'P' => Some(Phase::P),
            'S' => Some(Phase::S),
            _ => None,
        }
    }
}

/// Coordinate frame the ZNE components are rotated into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RotationKind {
    Lqt,
    Rtz,
    Pvh,
}

impl RotationKind {
    pub fn name(self) -> &'static str {
        match self {
            RotationKind::Lqt => "ZNE->LQT",
            RotationKind::Rtz => "ZNE->RTZ",
            RotationKind::Pvh => "ZNE->PVH",
        }
    }
}

/// Window extraction and rotation parameters. Bounds left out of a config
/// file fall back to the defaults of the configured phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "WindowConfigFile")]
pub struct WindowConfig {
    pub phase: Phase,
    /// Seconds before the arrival.
    pub before: f64,
    /// Seconds after the arrival.
    pub after: f64,
    /// Cosine taper width on each edge, as a fraction of the window length.
    pub taper_fraction: f64,
    pub rotation: RotationKind,
    pub demean: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::for_phase(Phase::P)
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct WindowConfigFile {
    phase: Phase,
    before: Option<f64>,
    after: Option<f64>,
    taper_fraction: f64,
    rotation: RotationKind,
    demean: bool,
}

impl Default for WindowConfigFile {
    fn default() -> Self {
        let defaults = WindowConfig::default();
        Self {
            phase: defaults.phase,
            before: None,
            after: None,
            taper_fraction: defaults.taper_fraction,
            rotation: defaults.rotation,
            demean: defaults.demean,
        }
    }
}

impl From<WindowConfigFile> for WindowConfig {
    fn from(file: WindowConfigFile) -> Self {
        let (before, after) = file.phase.default_window();
        Self {
            phase: file.phase,
            before: file.before.unwrap_or(before),
            after: file.after.unwrap_or(after),
            taper_fraction: file.taper_fraction,
            rotation: file.rotation,
            demean: file.demean,
        }
    }
}

impl WindowConfig {
    pub fn for_phase(phase: Phase) -> Self {
        let (before, after) = phase.default_window();
        Self {
            phase,
            before,
            after,
            taper_fraction: 0.05,
            rotation: RotationKind::Lqt,
            demean: true,
        }
    }

    pub fn validate(&self) -> RfResult<()> {
        if !self.before.is_finite() || !self.after.is_finite() {
            return Err(RfError::InvalidParameter(
                "window bounds must be finite".into(),
            ));
        }
        if self.before + self.after <= 0.0 {
            return Err(RfError::InvalidParameter(format!(
                "empty window: {} s before, {} s after",
                self.before, self.after
            )));
        }
        if !(0.0..=0.5).contains(&self.taper_fraction) {
            return Err(RfError::InvalidParameter(format!(
                "taper fraction {} outside [0, 0.5]",
                self.taper_fraction
            )));
        }
        Ok(())
    }
}

fn default_max_iterations() -> usize {
    200
}

fn default_tolerance() -> f64 {
    1e-3
}

fn default_ridge() -> f64 {
    1e-6
}

fn default_water_level() -> f64 {
    0.01
}

fn default_tapers() -> usize {
    3
}

fn default_time_bandwidth() -> f64 {
    2.5
}

/// The three interchangeable deconvolution algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeconvolutionMethod {
    Iterative {
        #[serde(default = "default_max_iterations")]
        max_iterations: usize,
        /// Minimum relative residual-energy improvement per iteration.
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        /// Diagonal ridge, relative to the zero-lag autocorrelation.
        #[serde(default = "default_ridge")]
        ridge: f64,
    },
    WaterLevel {
        #[serde(default = "default_water_level")]
        water_level: f64,
    },
    Multitaper {
        #[serde(default = "default_water_level")]
        water_level: f64,
        #[serde(default = "default_tapers")]
        tapers: usize,
        #[serde(default = "default_time_bandwidth")]
        time_bandwidth: f64,
    },
}

impl DeconvolutionMethod {
    pub fn iterative() -> Self {
        DeconvolutionMethod::Iterative {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            ridge: default_ridge(),
        }
    }

    pub fn water_level() -> Self {
        DeconvolutionMethod::WaterLevel {
            water_level: default_water_level(),
        }
    }

    pub fn multitaper() -> Self {
        DeconvolutionMethod::Multitaper {
            water_level: default_water_level(),
            tapers: default_tapers(),
            time_bandwidth: default_time_bandwidth(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeconvolutionMethod::Iterative { .. } => "iterative",
            DeconvolutionMethod::WaterLevel { .. } => "waterlevel",
            DeconvolutionMethod::Multitaper { .. } => "multitaper",
        }
    }

    /// Numeric stabilization parameters, keyed by name.
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        let mut params = BTreeMap::new();
        match *self {
            DeconvolutionMethod::Iterative {
                max_iterations,
                tolerance,
                ridge,
            } => {
                params.insert("max_iterations".to_string(), max_iterations as f64);
                params.insert("tolerance".to_string(), tolerance);
                params.insert("ridge".to_string(), ridge);
            }
            DeconvolutionMethod::WaterLevel { water_level } => {
                params.insert("water_level".to_string(), water_level);
            }
            DeconvolutionMethod::Multitaper {
                water_level,
                tapers,
                time_bandwidth,
            } => {
                params.insert("water_level".to_string(), water_level);
                params.insert("tapers".to_string(), tapers as f64);
                params.insert("time_bandwidth".to_string(), time_bandwidth);
            }
        }
        params
    }

    pub fn validate(&self) -> RfResult<()> {
        match *self {
            DeconvolutionMethod::Iterative {
                max_iterations,
                tolerance,
                ridge,
            } => {
                if max_iterations == 0 {
                    return Err(RfError::InvalidParameter(
                        "iteration cap must be at least 1".into(),
                    ));
                }
                if !(tolerance >= 0.0 && tolerance.is_finite()) {
                    return Err(RfError::InvalidParameter(format!(
                        "tolerance {} must be finite and non-negative",
                        tolerance
                    )));
                }
                if !(ridge >= 0.0 && ridge.is_finite()) {
                    return Err(RfError::InvalidParameter(format!(
                        "ridge {} must be finite and non-negative",
                        ridge
                    )));
                }
            }
            DeconvolutionMethod::WaterLevel { water_level } => {
                validate_water_level(water_level)?;
            }
            DeconvolutionMethod::Multitaper {
                water_level,
                tapers,
                time_bandwidth,
            } => {
                validate_water_level(water_level)?;
                if tapers == 0 {
                    return Err(RfError::InvalidParameter(
                        "multitaper needs at least one taper".into(),
                    ));
                }
                if !(time_bandwidth > 0.0 && time_bandwidth.is_finite()) {
                    return Err(RfError::InvalidParameter(format!(
                        "time-bandwidth product {} must be positive",
                        time_bandwidth
                    )));
                }
                if tapers as f64 > 2.0 * time_bandwidth {
                    return Err(RfError::InvalidParameter(format!(
                        "{} tapers exceed 2NW = {}",
                        tapers,
                        2.0 * time_bandwidth
                    )));
                }
            }
        }
        Ok(())
    }
}

fn validate_water_level(water_level: f64) -> RfResult<()> {
    if !(water_level >= 0.0 && water_level.is_finite()) {
        return Err(RfError::InvalidParameter(format!(
            "water level {} must be finite and non-negative",
            water_level
        )));
    }
    Ok(())
}

/// Parameters shared by every deconvolution method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeconvolutionParams {
    pub method: DeconvolutionMethod,
    /// Gaussian low-pass width `a` (rad/s); `None` disables smoothing.
    pub gaussian_width: Option<f64>,
    /// Seconds of acausal lag kept ahead of lag zero.
    pub time_shift: f64,
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self {
            method: DeconvolutionMethod::iterative(),
            gaussian_width: Some(2.5),
            time_shift: 10.0,
        }
    }
}

impl DeconvolutionParams {
    pub fn with_method(method: DeconvolutionMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> RfResult<()> {
        self.method.validate()?;
        if let Some(width) = self.gaussian_width {
            if !(width > 0.0 && width.is_finite()) {
                return Err(RfError::InvalidParameter(format!(
                    "gaussian width {} must be positive",
                    width
                )));
            }
        }
        if !(self.time_shift >= 0.0 && self.time_shift.is_finite()) {
            return Err(RfError::InvalidParameter(format!(
                "time shift {} must be finite and non-negative",
                self.time_shift
            )));
        }
        Ok(())
    }

    /// Method parameters plus the shared filter settings.
    pub fn provenance(&self) -> BTreeMap<String, f64> {
        let mut params = self.method.parameters();
        if let Some(width) = self.gaussian_width {
            params.insert("gaussian_width".to_string(), width);
        }
        params.insert("time_shift".to_string(), self.time_shift);
        params
    }
}

/// Per-sample aggregation used by the stacker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregate {
    Mean,
    /// Drops `fraction` of the sorted values on each side before averaging.
    TrimmedMean { fraction: f64 },
}

impl Aggregate {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Mean => "mean",
            Aggregate::TrimmedMean { .. } => "trimmed_mean",
        }
    }
}

/// Moveout, rejection and aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackConfig {
    /// Reference ray parameter in s/deg.
    pub reference_slowness: f64,
    pub min_fit: f64,
    /// Reject traces whose peak exceeds this multiple of the median peak.
    pub outlier_factor: f64,
    pub aggregate: Aggregate,
    pub moveout: bool,
    pub max_depth_km: f64,
    pub depth_step_km: f64,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            reference_slowness: 6.4,
            min_fit: 0.5,
            outlier_factor: 5.0,
            aggregate: Aggregate::Mean,
            moveout: true,
            max_depth_km: 800.0,
            depth_step_km: 0.5,
        }
    }
}

impl StackConfig {
    pub fn validate(&self) -> RfResult<()> {
        if !(self.reference_slowness >= 0.0 && self.reference_slowness.is_finite()) {
            return Err(RfError::InvalidParameter(format!(
                "reference slowness {} must be finite and non-negative",
                self.reference_slowness
            )));
        }
        if !(self.outlier_factor > 0.0) {
            return Err(RfError::InvalidParameter(format!(
                "outlier factor {} must be positive",
                self.outlier_factor
            )));
        }
        if let Aggregate::TrimmedMean { fraction } = self.aggregate {
            if !(0.0..0.5).contains(&fraction) {
                return Err(RfError::InvalidParameter(format!(
                    "trim fraction {} outside [0, 0.5)",
                    fraction
                )));
            }
        }
        if !(self.depth_step_km > 0.0) || !(self.max_depth_km > self.depth_step_km) {
            return Err(RfError::InvalidParameter(format!(
                "depth grid {} km / {} km step is invalid",
                self.max_depth_km, self.depth_step_km
            )));
        }
        Ok(())
    }
}

/// Everything the batch pipeline needs, passed explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    pub deconvolution: DeconvolutionParams,
    pub stack: StackConfig,
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            deconvolution: DeconvolutionParams::default(),
            stack: StackConfig::default(),
            workers: 4,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> RfResult<()> {
        self.window.validate()?;
        self.deconvolution.validate()?;
        self.stack.validate()?;
        if self.workers == 0 {
            return Err(RfError::InvalidParameter("worker count must be >= 1".into()));
        }
        Ok(())
    }
}
