use crate::interface::trace::Trace;
use crate::prelude::{Aggregate, RfError, RfResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Receiver function for one (source, target) pair.
///
/// The trace lives on a lag axis: its start time is minus the applied time
/// shift, so lag zero sits at sample `shift`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ResultFields")]
pub struct DeconvolutionResult {
    trace: Trace,
    method: String,
    parameters: BTreeMap<String, f64>,
    fit: f64,
    iterations: Option<usize>,
}

#[derive(Deserialize)]
struct ResultFields {
    trace: Trace,
    method: String,
    #[serde(default)]
    parameters: BTreeMap<String, f64>,
    fit: f64,
    #[serde(default)]
    iterations: Option<usize>,
}

impl TryFrom<ResultFields> for DeconvolutionResult {
    type Error = RfError;

    fn try_from(fields: ResultFields) -> RfResult<Self> {
        Self::new(
            fields.trace,
            &fields.method,
            fields.parameters,
            fields.fit,
            fields.iterations,
        )
    }
}

impl DeconvolutionResult {
    pub(crate) fn new(
        trace: Trace,
        method: &str,
        parameters: BTreeMap<String, f64>,
        fit: f64,
        iterations: Option<usize>,
    ) -> RfResult<Self> {
        if let Some(index) = trace.samples().iter().position(|v| !v.is_finite()) {
            return Err(RfError::DegenerateSignal(format!(
                "{} produced a non-finite sample at index {}",
                method, index
            )));
        }
        if !fit.is_finite() || !(0.0..=1.0).contains(&fit) {
            return Err(RfError::DegenerateSignal(format!(
                "{} produced fit-quality {}",
                method, fit
            )));
        }
        Ok(Self {
            trace,
            method: method.to_string(),
            parameters,
            fit,
            iterations,
        })
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameters(&self) -> &BTreeMap<String, f64> {
        &self.parameters
    }

    /// Fraction of target energy explained, in `[0, 1]`.
    pub fn fit(&self) -> f64 {
        self.fit
    }

    pub fn iterations(&self) -> Option<usize> {
        self.iterations
    }

    /// Sample index of lag zero.
    pub fn zero_lag_index(&self) -> usize {
        (-self.trace.start_time() * self.trace.sample_rate()).round().max(0.0) as usize
    }

    pub fn peak_amplitude(&self) -> f64 {
        self.trace
            .samples()
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    LowFit { fit: f64, threshold: f64 },
    Outlier { peak: f64, median_peak: f64, factor: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rejection {
    /// Position in the stacker's input sequence.
    pub index: usize,
    pub id: String,
    pub reason: RejectionReason,
}

/// Moveout-corrected aggregate over the results of one station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackedReceiverFunction {
    pub trace: Trace,
    pub station: String,
    pub contributing: usize,
    pub inputs: Vec<String>,
    pub rejections: Vec<Rejection>,
    pub aggregate: Aggregate,
    pub reference_slowness: f64,
    pub moveout: bool,
}
