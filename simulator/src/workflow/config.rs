use crate::generator::profile::GeneratorConfig;
use anyhow::Context;
use rfcore::{DeconvolutionMethod, PipelineConfig, VelocityModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub generator: GeneratorConfig,
    pub pipeline: PipelineConfig,
    pub model: VelocityModel,
    /// Where the assembled JSON records are written.
    pub output: Option<PathBuf>,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .pipeline
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(method: DeconvolutionMethod, events: usize, seed: u64) -> Self {
        let mut config = Self::default();
        config.pipeline.deconvolution.method = method;
        config.generator.events = events;
        config.generator.seed = seed;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfcore::{Phase, RotationKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_overrides_defaults() {
        let cfg = WorkflowConfig::from_args(DeconvolutionMethod::water_level(), 3, 11);
        assert_eq!(cfg.generator.events, 3);
        assert_eq!(cfg.generator.seed, 11);
        assert_eq!(cfg.pipeline.deconvolution.method.name(), "waterlevel");
        assert_eq!(cfg.model, VelocityModel::iasp91());
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        let yaml = r#"
generator:
  events: 2
  stations: [AAA]
pipeline:
  workers: 3
  window:
    rotation: rtz
    before: 20.0
  deconvolution:
    method:
      kind: multitaper
      tapers: 2
model:
  - {thickness_km: 30.0, vp: 6.3, vs: 3.6}
  - {thickness_km: 0.0, vp: 8.1, vs: 4.5}
"#;
        temp.write_all(yaml.as_bytes()).unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.generator.events, 2);
        assert_eq!(cfg.generator.stations, vec!["AAA".to_string()]);
        assert_eq!(cfg.pipeline.workers, 3);
        assert_eq!(cfg.pipeline.window.rotation, RotationKind::Rtz);
        assert_eq!(cfg.pipeline.window.phase, Phase::P);
        assert_eq!(cfg.pipeline.window.before, 20.0);
        assert_eq!(cfg.pipeline.deconvolution.method.name(), "multitaper");
        assert_eq!(cfg.model.layers().len(), 2);
    }

    #[test]
    fn config_load_rejects_invalid_pipeline() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"pipeline:\n  workers: 0\n").unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }
}
