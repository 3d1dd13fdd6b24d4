use crate::prelude::{RfError, RfResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known metadata keys.
pub mod keys {
    pub const STATION: &str = "station";
    pub const EVENT: &str = "event";
    pub const PHASE: &str = "phase";
    pub const ONSET: &str = "onset";
    pub const RAY_PARAMETER: &str = "ray_parameter";
    pub const BACK_AZIMUTH: &str = "back_azimuth";
    pub const INCIDENCE: &str = "incidence";
    pub const DISTANCE: &str = "distance";
    pub const MAGNITUDE: &str = "magnitude";
    pub const ROTATION: &str = "rotation";
    pub const METHOD: &str = "method";
    pub const SOURCE_ID: &str = "source_id";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Number(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

/// Append-only header map plus processing history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    entries: BTreeMap<String, MetaValue>,
    history: Vec<String>,
}

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.entries.get(key) {
            Some(MetaValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(MetaValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn entries(&self) -> &BTreeMap<String, MetaValue> {
        &self.entries
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Adds `key` unless it is already present. Returns whether it was added.
    fn annotate(&mut self, key: &str, value: MetaValue) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.to_string(), value);
        true
    }

    fn record(&mut self, step: String) {
        self.history.push(step);
    }
}

/// Uniformly-sampled scalar time series.
///
/// Samples, sample rate and start time are fixed at construction; metadata
/// only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "TraceFields")]
pub struct Trace {
    id: String,
    samples: Vec<f64>,
    sample_rate: f64,
    start_time: f64,
    metadata: Metadata,
}

#[derive(Deserialize)]
struct TraceFields {
    id: String,
    samples: Vec<f64>,
    sample_rate: f64,
    start_time: f64,
    #[serde(default)]
    metadata: Metadata,
}

impl TryFrom<TraceFields> for Trace {
    type Error = RfError;

    fn try_from(fields: TraceFields) -> RfResult<Self> {
        let mut trace = Trace::new(fields.id, fields.samples, fields.sample_rate, fields.start_time)?;
        trace.metadata = fields.metadata;
        Ok(trace)
    }
}

impl Trace {
    pub fn new(
        id: impl Into<String>,
        samples: Vec<f64>,
        sample_rate: f64,
        start_time: f64,
    ) -> RfResult<Self> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(RfError::InvalidParameter(format!(
                "sample rate {} must be positive and finite",
                sample_rate
            )));
        }
        if !start_time.is_finite() {
            return Err(RfError::InvalidParameter("start time must be finite".into()));
        }
        Ok(Self {
            id: id.into(),
            samples,
            sample_rate,
            start_time,
            metadata: Metadata::default(),
        })
    }

    /// Builder-style header insertion; existing keys are kept.
    pub fn with_header(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.metadata.annotate(key, value.into());
        self
    }

    /// New trace on the same id carrying over all metadata, used when a
    /// processing step derives fresh samples from this one.
    pub(crate) fn derive(
        &self,
        id: impl Into<String>,
        samples: Vec<f64>,
        start_time: f64,
        step: String,
    ) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.record(step);
        Self {
            id: id.into(),
            samples,
            sample_rate: self.sample_rate,
            start_time,
            metadata,
        }
    }

    pub fn annotate(&mut self, key: &str, value: impl Into<MetaValue>) -> bool {
        self.metadata.annotate(key, value.into())
    }

    pub fn record(&mut self, step: impl Into<String>) {
        self.metadata.record(step.into());
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Component code: the last character of the channel id.
    pub fn component(&self) -> Option<char> {
        self.id.chars().last()
    }

    /// Id with the component character replaced, e.g. `BHZ` -> `BHL`.
    pub fn id_with_component(&self, component: char) -> String {
        let mut id = self.id.clone();
        id.pop();
        id.push(component);
        id
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn delta(&self) -> f64 {
        1.0 / self.sample_rate
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Time of the last sample.
    pub fn end_time(&self) -> f64 {
        if self.samples.is_empty() {
            self.start_time
        } else {
            self.start_time + (self.samples.len() - 1) as f64 * self.delta()
        }
    }

    pub fn time_at(&self, index: usize) -> f64 {
        self.start_time + index as f64 * self.delta()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn station(&self) -> Option<&str> {
        self.metadata.text(keys::STATION)
    }

    /// Same sampling grid as `other`: equal length, rate and start time.
    pub fn shares_time_base(&self, other: &Trace) -> bool {
        self.len() == other.len()
            && same_rate(self.sample_rate, other.sample_rate)
            && (self.start_time - other.start_time).abs() <= 0.5 * self.delta().min(other.delta())
    }
}

pub(crate) fn same_rate(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}
