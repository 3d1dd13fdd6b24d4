use crate::interface::result::{DeconvolutionResult, Rejection, StackedReceiverFunction};
use crate::interface::trace::{keys, MetaValue, Trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Event,
    Stack,
}

/// Where a record came from and how it was made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    pub method: String,
    pub parameters: BTreeMap<String, f64>,
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributing: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<Rejection>,
    pub history: Vec<String>,
    pub headers: BTreeMap<String, MetaValue>,
}

/// Output record handed to the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiverFunctionRecord {
    pub kind: RecordKind,
    pub id: String,
    pub station: Option<String>,
    pub component: Option<char>,
    pub sample_rate: f64,
    pub start_time: f64,
    pub samples: Vec<f64>,
    pub provenance: Provenance,
}

impl ReceiverFunctionRecord {
    fn from_trace(kind: RecordKind, trace: &Trace, provenance: Provenance) -> Self {
        Self {
            kind,
            id: trace.id().to_string(),
            station: trace.station().map(str::to_string),
            component: trace.component(),
            sample_rate: trace.sample_rate(),
            start_time: trace.start_time(),
            samples: trace.samples().to_vec(),
            provenance,
        }
    }
}

/// Packages results with their provenance. Performs no numerics.
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble_result(result: &DeconvolutionResult) -> ReceiverFunctionRecord {
        let trace = result.trace();
        let mut inputs = Vec::new();
        if let Some(source) = trace.metadata().text(keys::SOURCE_ID) {
            inputs.push(source.to_string());
        }
        inputs.push(trace.id().to_string());

        let provenance = Provenance {
            method: result.method().to_string(),
            parameters: result.parameters().clone(),
            inputs,
            fit_quality: Some(result.fit()),
            iterations: result.iterations(),
            contributing: None,
            rejections: Vec::new(),
            history: trace.metadata().history().to_vec(),
            headers: trace.metadata().entries().clone(),
        };
        ReceiverFunctionRecord::from_trace(RecordKind::Event, trace, provenance)
    }

    pub fn assemble_stack(stack: &StackedReceiverFunction) -> ReceiverFunctionRecord {
        let trace = &stack.trace;
        let mut parameters = BTreeMap::new();
        parameters.insert("reference_slowness".to_string(), stack.reference_slowness);
        parameters.insert("moveout".to_string(), if stack.moveout { 1.0 } else { 0.0 });
        if let crate::prelude::Aggregate::TrimmedMean { fraction } = stack.aggregate {
            parameters.insert("trim_fraction".to_string(), fraction);
        }

        let provenance = Provenance {
            method: format!("stack:{}", stack.aggregate.name()),
            parameters,
            inputs: stack.inputs.clone(),
            fit_quality: None,
            iterations: None,
            contributing: Some(stack.contributing),
            rejections: stack.rejections.clone(),
            history: trace.metadata().history().to_vec(),
            headers: trace.metadata().entries().clone(),
        };
        ReceiverFunctionRecord::from_trace(RecordKind::Stack, trace, provenance)
    }

    pub fn to_json(records: &[ReceiverFunctionRecord]) -> serde_json::Result<String> {
        serde_json::to_string_pretty(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Aggregate;

    #[test]
    fn stack_record_carries_rejections() {
        let trace = Trace::new("XX.STA..BHQ", vec![0.0, 1.0, 0.0], 10.0, -0.1)
            .unwrap()
            .with_header(keys::STATION, "STA");
        let stack = StackedReceiverFunction {
            trace,
            station: "STA".into(),
            contributing: 2,
            inputs: vec!["a".into(), "b".into()],
            rejections: vec![Rejection {
                index: 2,
                id: "c".into(),
                reason: crate::interface::result::RejectionReason::LowFit {
                    fit: 0.1,
                    threshold: 0.5,
                },
            }],
            aggregate: Aggregate::Mean,
            reference_slowness: 6.4,
            moveout: true,
        };

        let record = ResultAssembler::assemble_stack(&stack);
        assert_eq!(record.kind, RecordKind::Stack);
        assert_eq!(record.station.as_deref(), Some("STA"));
        assert_eq!(record.provenance.contributing, Some(2));
        assert_eq!(record.provenance.rejections.len(), 1);

        let json = ResultAssembler::to_json(&[record.clone()]).unwrap();
        let parsed: Vec<ReceiverFunctionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].kind, RecordKind::Stack);
        assert_eq!(parsed[0].samples, vec![0.0, 1.0, 0.0]);
        assert_eq!(parsed[0].provenance.inputs, record.provenance.inputs);
        assert_eq!(parsed[0].provenance.method, "stack:mean");
    }
}
