use crate::math::poly::Polynomial;
use crate::prelude::Trace;
use crate::scan_interface::metadata::{BeamMode, Polarization, ScanPosition};
use crate::status::FitStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Beam {
    Main,
    A,
    B,
}

impl fmt::Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Beam::Main => "main",
            Beam::A => "A",
            Beam::B => "B",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleaningStats {
    pub rms_before: f64,
    pub rms_after: f64,
    pub points_removed: usize,
    pub iterations: usize,
}

/// Polynomial fitted to the baseline samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftModel {
    /// Ascending powers of offset.
    pub coefficients: Vec<f64>,
    /// Baseline data minus model, at the baseline samples only.
    pub residuals: Vec<f64>,
    pub rms: f64,
    pub baseline_indices: Vec<usize>,
}

impl DriftModel {
    pub fn polynomial(&self) -> Polynomial {
        Polynomial::new(self.coefficients.clone())
    }

    pub fn evaluate(&self, offsets: &[f64]) -> Vec<f64> {
        self.polynomial().eval_many(offsets)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakFitResult {
    pub beam: Beam,
    pub amplitude: f64,
    pub position: f64,
    pub error: f64,
    pub residuals: Vec<f64>,
    pub model: Vec<f64>,
    /// Sample indices the final quadratic was fitted over.
    pub window: Vec<usize>,
    pub status: FitStatus,
    pub warnings: Vec<FitStatus>,
    /// Gaussian probe estimate of the beam centre.
    pub centre: Option<f64>,
    pub signal_to_noise: Option<f64>,
}

impl PeakFitResult {
    pub fn failed(beam: Beam, status: FitStatus) -> Self {
        Self {
            beam,
            amplitude: f64::NAN,
            position: f64::NAN,
            error: f64::NAN,
            residuals: Vec::new(),
            model: Vec::new(),
            window: Vec::new(),
            status,
            warnings: Vec::new(),
            centre: None,
            signal_to_noise: None,
        }
    }

    /// Record a degraded condition; the last one raised becomes the status
    /// unless the fit has already failed.
    pub fn degrade(&mut self, status: FitStatus) {
        if !self.status.is_fatal() {
            self.status = status.clone();
        }
        self.warnings.push(status);
    }

    pub fn is_usable(&self) -> bool {
        !self.status.is_fatal() && self.amplitude.is_finite()
    }

    /// First and last sample of the fit window.
    pub fn window_bounds(&self) -> Option<(usize, usize)> {
        Some((*self.window.first()?, *self.window.last()?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub position: ScanPosition,
    pub polarization: Polarization,
    pub peaks: Vec<PeakFitResult>,
    pub drift: Option<DriftModel>,
    pub cleaning: Option<CleaningStats>,
    /// Drift-corrected trace, exported for plotting.
    pub corrected: Option<Trace>,
    /// Combined baseline index set, exported for plotting.
    pub baseline: Vec<usize>,
    pub status: FitStatus,
}

impl ChannelResult {
    /// Channel that failed before any peak could be fitted.
    pub fn failed(
        position: ScanPosition,
        polarization: Polarization,
        beams: &[Beam],
        status: FitStatus,
    ) -> Self {
        Self {
            position,
            polarization,
            peaks: beams
                .iter()
                .map(|&beam| PeakFitResult::failed(beam, status.clone()))
                .collect(),
            drift: None,
            cleaning: None,
            corrected: None,
            baseline: Vec::new(),
            status,
        }
    }

    pub fn peak(&self, beam: Beam) -> Option<&PeakFitResult> {
        self.peaks.iter().find(|peak| peak.beam == beam)
    }

    pub fn tag(&self) -> String {
        format!("{}_{}", self.position, self.polarization)
    }
}

/// Half-power pointing correction applied to the on-source amplitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub polarization: Polarization,
    pub beam: Beam,
    pub on_amplitude: f64,
    pub pointing_correction: f64,
    pub pointing_correction_error: f64,
    pub corrected_amplitude: f64,
    pub corrected_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub source: String,
    pub frontend: String,
    pub mode: BeamMode,
    pub channels: Vec<ChannelResult>,
    pub calibration: Vec<CalibrationRecord>,
}

impl ScanResult {
    pub fn channel(
        &self,
        position: ScanPosition,
        polarization: Polarization,
    ) -> Option<&ChannelResult> {
        self.channels
            .iter()
            .find(|c| c.position == position && c.polarization == polarization)
    }

    pub fn peak(
        &self,
        position: ScanPosition,
        polarization: Polarization,
        beam: Beam,
    ) -> Option<&PeakFitResult> {
        self.channel(position, polarization)?.peak(beam)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
