use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use driftcore::scan_interface::{DriftScan, ScanResult};
use driftcore::telemetry::{MetricsRecorder, MetricsSnapshot};
use driftcore::ScanOrchestrator;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    orchestrator: Arc<ScanOrchestrator>,
    metrics: Arc<MetricsRecorder>,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        let metrics = Arc::new(MetricsRecorder::new());
        let orchestrator =
            ScanOrchestrator::new(config.pipeline.clone()).with_metrics(metrics.clone());
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            metrics,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn execute(&self, scan: &DriftScan) -> anyhow::Result<ScanResult> {
        self.orchestrator
            .run(scan)
            .with_context(|| format!("reducing drift scan of {}", scan.metadata.source))
    }

    /// Reduce `scan` on the blocking pool, giving up after the configured timeout.
    pub async fn execute_with_timeout(&self, scan: DriftScan) -> anyhow::Result<ScanResult> {
        let limit = Duration::from_secs(self.config.timeout_secs.max(1));
        let runner = self.clone();
        let task = tokio::task::spawn_blocking(move || runner.execute(&scan));
        let joined = tokio::time::timeout(limit, task)
            .await
            .with_context(|| format!("reduction exceeded {}s", limit.as_secs()))?;
        joined.context("reduction task aborted")?
    }
}
