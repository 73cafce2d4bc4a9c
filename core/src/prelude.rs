use crate::scan_interface::{BeamMode, ChannelResult, ScanChannel, ScanMetadata};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// Tunable constants shared by every reduction stage.
///
/// The percentages below were tuned empirically on calibrator scans and are
/// kept configurable rather than hard-coded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub anchor_points: usize,
    pub spline_order: usize,
    pub rfi_cut: f64,
    pub max_rfi_iterations: usize,
    /// Samples around each local maximum in which minima are ignored.
    pub extrema_exclusion: usize,
    pub peak_range_low: f64,
    pub peak_range_high: f64,
    pub baseline_fraction: f64,
    pub dual_baseline_fraction: f64,
    pub sidelobe_ratio: f64,
    pub peak_cut: f64,
    pub sidelobe_peak_cut: f64,
    pub noisy_fraction: f64,
    pub drift_order: usize,
    pub dual_beam_cut: f64,
    pub flat_beam_threshold: f64,
    pub overlap_guard: f64,
    pub max_clean_rms: f64,
    pub max_peak_rms: f64,
    pub min_signal_to_noise: f64,
    /// Carry on past a failed probe or baseline search using fallback blocks.
    pub force_fit: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            anchor_points: 9,
            spline_order: 3,
            rfi_cut: 3.0,
            max_rfi_iterations: 50,
            extrema_exclusion: 50,
            peak_range_low: 0.25,
            peak_range_high: 0.75,
            baseline_fraction: 0.05,
            dual_baseline_fraction: 0.04,
            sidelobe_ratio: 0.5,
            peak_cut: 0.7,
            sidelobe_peak_cut: 0.5,
            noisy_fraction: 0.5,
            drift_order: 1,
            dual_beam_cut: 0.6,
            flat_beam_threshold: 0.1,
            overlap_guard: 0.8,
            max_clean_rms: 1.0,
            max_peak_rms: 1.0,
            min_signal_to_noise: 3.0,
            force_fit: false,
        }
    }
}

/// A drift scan trace: amplitude sampled against angular offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    offsets: Vec<f64>,
    amplitudes: Vec<f64>,
}

impl Trace {
    /// Build a trace, rejecting empty, mismatched or non-monotonic input.
    ///
    /// NaN amplitudes are accepted as explicit "no data" markers.
    pub fn new(offsets: Vec<f64>, amplitudes: Vec<f64>) -> PipelineResult<Self> {
        if offsets.is_empty() {
            return Err(PipelineError::EmptyTrace);
        }
        if offsets.len() != amplitudes.len() {
            return Err(PipelineError::LengthMismatch {
                offsets: offsets.len(),
                amplitudes: amplitudes.len(),
            });
        }
        if let Some(index) = offsets.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::NonFiniteOffset { index });
        }
        if let Some(index) = offsets.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(PipelineError::NonMonotonicOffsets { index: index + 1 });
        }
        Ok(Self {
            offsets,
            amplitudes,
        })
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.amplitudes.iter().filter(|v| v.is_nan()).count()
    }

    pub fn has_missing(&self) -> bool {
        self.amplitudes.iter().any(|v| v.is_nan())
    }

    /// Sub-trace at the given (ascending) indices.
    pub fn select(&self, indices: &[usize]) -> Trace {
        Trace {
            offsets: indices.iter().map(|&i| self.offsets[i]).collect(),
            amplitudes: indices.iter().map(|&i| self.amplitudes[i]).collect(),
        }
    }

    /// Same offsets, new amplitudes.
    pub fn with_amplitudes(&self, amplitudes: Vec<f64>) -> PipelineResult<Trace> {
        Trace::new(self.offsets.clone(), amplitudes)
    }

    /// Index of the first sample at or beyond `offset`.
    pub fn first_at_or_after(&self, offset: f64) -> Option<usize> {
        self.offsets.iter().position(|&x| x >= offset)
    }
}

/// Precondition violations. Degraded data is reported through `FitStatus`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("trace contains no samples")]
    EmptyTrace,
    #[error("trace has {offsets} offsets but {amplitudes} amplitudes")]
    LengthMismatch { offsets: usize, amplitudes: usize },
    #[error("offsets decrease at sample {index}")]
    NonMonotonicOffsets { index: usize },
    #[error("offset at sample {index} is not finite")]
    NonFiniteOffset { index: usize },
    #[error("unsupported frontend: {0}")]
    UnsupportedFrontend(String),
    #[error("invalid scan metadata: {0}")]
    InvalidMetadata(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Fits a single scan channel (one position and polarisation).
pub trait ChannelFitter: Send + Sync {
    fn mode(&self) -> BeamMode;
    fn fit_channel(
        &self,
        channel: &ScanChannel,
        metadata: &ScanMetadata,
        config: &PipelineConfig,
        logger: &LogManager,
    ) -> ChannelResult;
}
