use crate::generator::profile::build_jobs;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use rfcore::interface::{ReceiverFunctionRecord, ResultAssembler};
use rfcore::telemetry::Metrics;
use rfcore::Pipeline;
use std::sync::Arc;

pub struct WorkflowResult {
    pub records: Vec<ReceiverFunctionRecord>,
    pub failures: Vec<String>,
    pub metrics: Metrics,
}

impl WorkflowResult {
    pub fn event_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == rfcore::interface::RecordKind::Event)
            .count()
    }

    pub fn stack_count(&self) -> usize {
        self.records.len() - self.event_count()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        ResultAssembler::to_json(&self.records).context("serializing receiver functions")
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Generates the synthetic batch, processes it and assembles per-event
    /// and stacked records.
    pub async fn execute(&self) -> anyhow::Result<WorkflowResult> {
        let model = Arc::new(self.config.model.clone());
        let pipeline = Pipeline::new(self.config.pipeline.clone(), model.clone())
            .context("initializing pipeline")?;
        let jobs = build_jobs(&self.config.generator, &model).context("generating events")?;

        let outcomes = pipeline
            .process_batch(jobs)
            .await
            .context("processing batch")?;

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(event) => records.extend(event.results.iter().map(ResultAssembler::assemble_result)),
                Err(err) => failures.push(format!(
                    "{} / {}: {}",
                    outcome.station, outcome.event, err
                )),
            }
        }
        for stack in pipeline.stack_all(&outcomes) {
            match &stack.result {
                Ok(stacked) => records.push(ResultAssembler::assemble_stack(stacked)),
                Err(err) => failures.push(format!(
                    "{} stack {}: {}",
                    stack.station, stack.component, err
                )),
            }
        }

        Ok(WorkflowResult {
            records,
            failures,
            metrics: pipeline.metrics(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfcore::interface::RecordKind;
    use rfcore::DeconvolutionMethod;

    fn small_config(method: DeconvolutionMethod) -> WorkflowConfig {
        let mut cfg = WorkflowConfig::from_args(method, 3, 5);
        cfg.generator.duration = 220.0;
        cfg.generator.noise = 0.0;
        cfg.pipeline.workers = 2;
        cfg
    }

    #[tokio::test]
    async fn runner_produces_event_and_stack_records() {
        let runner = Runner::new(small_config(DeconvolutionMethod::iterative()));
        let result = runner.execute().await.unwrap();
        assert!(result.failures.is_empty(), "{:?}", result.failures);
        // 3 events x 2 stations x 2 targets
        assert_eq!(result.event_count(), 12);
        // 2 stations x 2 targets
        assert_eq!(result.stack_count(), 4);
        assert_eq!(result.metrics.processed, 6);

        let stack = result
            .records
            .iter()
            .find(|r| r.kind == RecordKind::Stack)
            .unwrap();
        assert_eq!(stack.provenance.method, "stack:mean");
        assert!(result.to_json().unwrap().contains("\"stack\""));
    }

    #[tokio::test]
    async fn runner_reports_failed_jobs() {
        let mut cfg = small_config(DeconvolutionMethod::water_level());
        // the default P window needs 150 s after a 60 s onset
        cfg.generator.duration = 150.0;
        let result = Runner::new(cfg).execute().await.unwrap();
        assert_eq!(result.event_count(), 0);
        assert_eq!(result.metrics.failed, 6);
        assert!(result.failures[0].contains("insufficient data"));
    }
}
