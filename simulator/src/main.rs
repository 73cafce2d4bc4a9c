use anyhow::Context;
use clap::Parser;
use driftcore::scan_interface::{Frontend, ScanResult};
use generator::profile::build_drift_scan;
use std::fs;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Synthetic drift scan reduction driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Receiver frontend tag, e.g. 13.0S, 02.5S or 03.5D
    #[arg(long, default_value = "13.0S")]
    frontend: String,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 0.01)]
    noise: f64,
    #[arg(long, default_value_t = 0)]
    rfi_spikes: usize,
    /// Write the full JSON result here
    #[arg(long)]
    output: Option<PathBuf>,
}

fn print_summary(result: &ScanResult) {
    println!(
        "{} [{}] {:?}: {} channels",
        result.source,
        result.frontend,
        result.mode,
        result.channels.len()
    );
    for channel in &result.channels {
        for peak in &channel.peaks {
            println!(
                "  {} {}: amplitude {:.4} +/- {:.4} at {:.4} ({})",
                channel.tag(),
                peak.beam,
                peak.amplitude,
                peak.error,
                peak.position,
                peak.status
            );
        }
    }
    for record in &result.calibration {
        println!(
            "  {} {}: pc {:.4} +/- {:.4}, corrected {:.4} +/- {:.4}",
            record.polarization,
            record.beam,
            record.pointing_correction,
            record.pointing_correction_error,
            record.corrected_amplitude,
            record.corrected_error
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        let frontend: Frontend = args.frontend.parse()?;
        WorkflowConfig::from_args(frontend, args.seed, args.noise, args.rfi_spikes)
    };

    let runner = Runner::new(workflow_config.clone());
    let scan = build_drift_scan(&workflow_config.generator)?;
    log::info!(
        "generated {} channels for {} on {}",
        scan.channels.len(),
        scan.metadata.source,
        scan.metadata.frontend
    );

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime for scan reduction")?;
    let result = runtime.block_on(runner.execute_with_timeout(scan))?;

    print_summary(&result);
    let metrics = runner.metrics();
    println!(
        "processed {} failed {} degraded {} rfi points removed {}",
        metrics.processed, metrics.failed, metrics.degraded, metrics.points_removed
    );

    if let Some(report_path) = args.output {
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let report = result.to_json().context("serialising scan result")?;
        fs::write(&report_path, report)
            .with_context(|| format!("writing report {}", report_path.display()))?;
    }

    Ok(())
}
