use crate::generator::template::{cross_scan_gain, BeamShape};
use anyhow::{ensure, Context};
use driftcore::scan_interface::{
    AutoFitHints, BaselineMode, DriftScan, Frontend, Polarization, ScanMetadata, ScanPosition,
};
use driftcore::Trace;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating a synthetic drift scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub source: String,
    pub frontend: Frontend,
    pub hpbw: f64,
    pub fnbw: f64,
    pub samples: usize,
    /// Scan covers `-span..=span` in offset.
    pub span: f64,
    pub amplitude: f64,
    pub shape: BeamShape,
    /// Beam centre along the scan.
    pub centre: f64,
    /// Cross-scan pointing error added to every position.
    pub pointing_error: f64,
    /// Distance of each horn from the scan centre on dual-beam frontends.
    pub horn_separation: f64,
    pub drift_slope: f64,
    pub drift_offset: f64,
    pub noise: f64,
    pub rfi_spikes: usize,
    /// Spike height relative to `amplitude`.
    pub rfi_amplitude: f64,
    pub seed: u64,
    pub baseline_mode: BaselineMode,
    pub apply_rfi_removal: bool,
    pub hints: Option<AutoFitHints>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            source: "HydraA".into(),
            frontend: Frontend::SingleBeamWide("13.0S".into()),
            hpbw: 0.8,
            fnbw: 1.8,
            samples: 601,
            span: 1.5,
            amplitude: 1.0,
            shape: BeamShape::SincSquared,
            centre: 0.03,
            pointing_error: 0.0,
            horn_separation: 0.6,
            drift_slope: 0.05,
            drift_offset: 0.2,
            noise: 0.01,
            rfi_spikes: 0,
            rfi_amplitude: 0.5,
            seed: 0,
            baseline_mode: BaselineMode::Auto,
            apply_rfi_removal: true,
            hints: None,
        }
    }
}

impl GeneratorConfig {
    fn metadata(&self) -> ScanMetadata {
        let mut metadata =
            ScanMetadata::new(&self.source, self.frontend.clone(), self.hpbw, self.fnbw);
        metadata.baseline_mode = self.baseline_mode;
        metadata.apply_rfi_removal = self.apply_rfi_removal;
        metadata.hints = self.hints.clone();
        metadata
    }

    fn offsets(&self) -> Vec<f64> {
        let step = 2.0 * self.span / (self.samples - 1) as f64;
        (0..self.samples)
            .map(|i| -self.span + i as f64 * step)
            .collect()
    }

    /// Cross-scan offset of the beam from the source at `position`.
    fn cross_scan_offset(&self, position: ScanPosition) -> f64 {
        let nominal = match position {
            ScanPosition::Hpn => -self.hpbw / 2.0,
            ScanPosition::Hps => self.hpbw / 2.0,
            ScanPosition::On => 0.0,
        };
        nominal + self.pointing_error
    }

    fn beam_profile(&self, peak: f64, offset: f64) -> f64 {
        match self.frontend.beam_factor() {
            Some(_) => {
                let a = self
                    .shape
                    .response(self.hpbw, offset + self.horn_separation - self.centre);
                let b = self
                    .shape
                    .response(self.hpbw, offset - self.horn_separation - self.centre);
                peak * (a - b)
            }
            None => peak * self.shape.response(self.hpbw, offset - self.centre),
        }
    }
}

fn build_trace(
    config: &GeneratorConfig,
    offsets: &[f64],
    position: ScanPosition,
    rng: &mut StdRng,
) -> anyhow::Result<Trace> {
    let peak = config.amplitude * cross_scan_gain(config.hpbw, config.cross_scan_offset(position));
    let mut amplitudes: Vec<f64> = offsets
        .iter()
        .map(|&x| {
            let jitter = if config.noise > 0.0 {
                rng.gen_range(-config.noise..config.noise)
            } else {
                0.0
            };
            config.beam_profile(peak, x) + config.drift_slope * x + config.drift_offset + jitter
        })
        .collect();

    let spikes = config.rfi_spikes.min(amplitudes.len());
    for index in rand::seq::index::sample(rng, amplitudes.len(), spikes) {
        amplitudes[index] += config.rfi_amplitude * config.amplitude.abs();
    }

    Trace::new(offsets.to_vec(), amplitudes).context("assembling synthetic trace")
}

/// Synthesise one trace per scan position and polarisation of the frontend.
pub fn build_drift_scan(config: &GeneratorConfig) -> anyhow::Result<DriftScan> {
    ensure!(
        config.samples >= 2,
        "generator needs at least two samples, got {}",
        config.samples
    );
    ensure!(config.span > 0.0, "generator span must be positive");

    let offsets = config.offsets();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut scan = DriftScan::new(config.metadata());
    for &position in config.frontend.positions() {
        for polarization in [Polarization::Lcp, Polarization::Rcp] {
            let trace = build_trace(config, &offsets, position, &mut rng)
                .with_context(|| format!("generating {position}_{polarization}"))?;
            scan.push(position, polarization, trace);
        }
    }
    Ok(scan)
}
