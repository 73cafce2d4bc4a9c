use crate::generator::profile::GeneratorConfig;
use anyhow::Context;
use driftcore::scan_interface::Frontend;
use driftcore::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Upper bound on one scan reduction.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(frontend: Frontend, seed: u64, noise: f64, rfi_spikes: usize) -> Self {
        Self {
            generator: GeneratorConfig {
                frontend,
                seed,
                noise,
                rfi_spikes,
                ..Default::default()
            },
            pipeline: PipelineConfig::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
