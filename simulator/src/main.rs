use anyhow::Context;
use clap::{Parser, ValueEnum};
use rfcore::DeconvolutionMethod;
use std::fs;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    Iterative,
    Waterlevel,
    Multitaper,
}

impl MethodArg {
    fn to_method(self) -> DeconvolutionMethod {
        match self {
            MethodArg::Iterative => DeconvolutionMethod::iterative(),
            MethodArg::Waterlevel => DeconvolutionMethod::water_level(),
            MethodArg::Multitaper => DeconvolutionMethod::multitaper(),
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Synthetic receiver-function workflow driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Deconvolution method when no workflow file is given
    #[arg(long, value_enum, default_value_t = MethodArg::Iterative)]
    method: MethodArg,
    #[arg(long, default_value_t = 6)]
    events: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Output JSON path; overrides the workflow file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.method.to_method(), args.events, args.seed)
    };
    let output = args
        .output
        .or_else(|| workflow_config.output.clone())
        .unwrap_or_else(|| PathBuf::from("receiver_functions.json"));

    let runner = Runner::new(workflow_config);
    let result = runner.execute().await?;

    println!(
        "{} -> event records {}, stacks {}, failures {}",
        runner.config().pipeline.deconvolution.method.name(),
        result.event_count(),
        result.stack_count(),
        result.failures.len()
    );
    for failure in &result.failures {
        println!("  failed: {}", failure);
    }
    println!(
        "metrics: {}",
        serde_json::to_string(&result.metrics).context("serializing metrics")?
    );

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    fs::write(&output, result.to_json()?)
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!("wrote {} records to {}", result.records.len(), output.display());

    Ok(())
}
