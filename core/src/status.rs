use crate::scan_interface::Beam;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a status lets the channel get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Ok,
    Degraded,
    Fatal,
}

/// Baseline used when a fit is forced past a failed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedFallback {
    /// Minima search repeated around zero offset.
    CentredAtZero,
    /// Every sample beyond the nominal first nulls.
    FnbwPoints,
}

/// Outcome of a reduction stage.
///
/// Degraded statuses keep the fitted values; fatal statuses leave the
/// channel with NaN amplitude and error. `code()` returns the numeric flag
/// stored alongside archived results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitStatus {
    #[default]
    Ok,
    NoData { missing: usize },
    HighRms { rms: f64, limit: f64 },
    GaussianFitFailed,
    MainBeamNotFound,
    PeakNotLocated,
    RightMinimumMissing { fallback: usize },
    LeftMinimumMissing { fallback: usize },
    BeamScanEmpty { beam: Beam },
    LargeSidelobes { central: f64, sidelobe: f64 },
    PeakAtScanEdge { index: usize },
    MainBeamMaxMissing,
    NegativePeak { amplitude: f64 },
    PeakRmsTooHigh { rms: f64, limit: f64 },
    InfiniteRms,
    LowSignalToNoise { ratio: f64, limit: f64 },
    PeakInBaseline { index: usize },
    NoExtrema,
    PeakOutOfRange { index: usize, low: usize, high: usize },
    NoLocalMinima,
    CenterNotFound,
    PeakTooNoisy { selected: usize, window: usize },
    PeakBeyondBaseline { start: usize, end: usize },
    MinExceedsMax { min: f64, max: f64 },
    TheoreticalBaseline,
    FnbwOutOfScan,
    ABeamCrossesMidpoint,
    BBeamCrossesMidpoint,
    BaselineNotFound,
    MaxBeyondBaseline { index: usize },
    MinBeyondBaseline { index: usize },
    OverlapOnABeam { shift: usize, resolved: bool },
    OverlapOnBBeam { shift: usize, resolved: bool },
    EntireBBeamFit,
    EntireABeamFit,
    PeakRefitAroundExtrema,
    TooFewPointsToSpline { samples: usize, required: usize },
    EmptyAfterCleaning,
    ForcedBaseline { fallback: ForcedFallback },
    NoCorrectedData,
}

impl FitStatus {
    pub fn code(&self) -> u8 {
        match self {
            FitStatus::Ok => 0,
            FitStatus::NoData { .. } => 1,
            FitStatus::HighRms { .. } => 2,
            FitStatus::GaussianFitFailed => 3,
            FitStatus::MainBeamNotFound => 4,
            FitStatus::PeakNotLocated => 5,
            FitStatus::RightMinimumMissing { .. } => 6,
            FitStatus::LeftMinimumMissing { .. } => 7,
            FitStatus::BeamScanEmpty { .. } => 8,
            FitStatus::LargeSidelobes { .. } => 9,
            FitStatus::PeakAtScanEdge { .. } => 10,
            FitStatus::MainBeamMaxMissing => 11,
            FitStatus::NegativePeak { .. } => 12,
            FitStatus::PeakRmsTooHigh { .. } => 13,
            FitStatus::InfiniteRms => 14,
            FitStatus::LowSignalToNoise { .. } => 15,
            FitStatus::PeakInBaseline { .. } => 16,
            FitStatus::NoExtrema => 19,
            FitStatus::PeakOutOfRange { .. } => 20,
            FitStatus::NoLocalMinima => 21,
            FitStatus::CenterNotFound => 22,
            FitStatus::PeakTooNoisy { .. } => 23,
            FitStatus::PeakBeyondBaseline { .. } => 24,
            FitStatus::MinExceedsMax { .. } => 25,
            FitStatus::TheoreticalBaseline => 26,
            FitStatus::FnbwOutOfScan => 27,
            FitStatus::ABeamCrossesMidpoint => 28,
            FitStatus::BBeamCrossesMidpoint => 29,
            FitStatus::BaselineNotFound => 30,
            FitStatus::MaxBeyondBaseline { .. } => 31,
            FitStatus::MinBeyondBaseline { .. } => 32,
            FitStatus::OverlapOnABeam { .. } => 33,
            FitStatus::OverlapOnBBeam { .. } => 34,
            FitStatus::EntireBBeamFit => 35,
            FitStatus::EntireABeamFit => 36,
            FitStatus::PeakRefitAroundExtrema => 37,
            FitStatus::TooFewPointsToSpline { .. } => 38,
            FitStatus::EmptyAfterCleaning => 39,
            FitStatus::ForcedBaseline { .. } => 40,
            FitStatus::NoCorrectedData => 55,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FitStatus::Ok => Severity::Ok,
            FitStatus::RightMinimumMissing { .. }
            | FitStatus::LeftMinimumMissing { .. }
            | FitStatus::LargeSidelobes { .. }
            | FitStatus::NegativePeak { .. }
            | FitStatus::PeakRmsTooHigh { .. }
            | FitStatus::InfiniteRms
            | FitStatus::LowSignalToNoise { .. }
            | FitStatus::PeakInBaseline { .. }
            | FitStatus::NoLocalMinima
            | FitStatus::TheoreticalBaseline
            | FitStatus::EntireBBeamFit
            | FitStatus::EntireABeamFit
            | FitStatus::PeakRefitAroundExtrema
            | FitStatus::ForcedBaseline { .. } => Severity::Degraded,
            FitStatus::OverlapOnABeam { resolved, .. }
            | FitStatus::OverlapOnBBeam { resolved, .. } => {
                if *resolved {
                    Severity::Degraded
                } else {
                    Severity::Fatal
                }
            }
            _ => Severity::Fatal,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, FitStatus::Ok)
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStatus::Ok => write!(f, "ok"),
            FitStatus::NoData { missing } => write!(f, "no data: {} missing samples", missing),
            FitStatus::HighRms { rms, limit } => {
                write!(f, "rms {:.4} after cleaning exceeds {:.2}", rms, limit)
            }
            FitStatus::GaussianFitFailed => write!(f, "gaussian probe fit failed"),
            FitStatus::MainBeamNotFound => write!(f, "failed to locate main beam"),
            FitStatus::PeakNotLocated => write!(f, "failed to locate peak"),
            FitStatus::RightMinimumMissing { fallback } => {
                write!(f, "no minimum right of peak, using FNBW point {}", fallback)
            }
            FitStatus::LeftMinimumMissing { fallback } => {
                write!(f, "no minimum left of peak, using FNBW point {}", fallback)
            }
            FitStatus::BeamScanEmpty { beam } => write!(f, "{} beam scan has no data", beam),
            FitStatus::LargeSidelobes { central, sidelobe } => write!(
                f,
                "large sidelobes detected: {:.4} against peak {:.4}",
                sidelobe, central
            ),
            FitStatus::PeakAtScanEdge { index } => {
                write!(f, "spline maximum at scan edge (sample {})", index)
            }
            FitStatus::MainBeamMaxMissing => write!(f, "failed to refine main beam maximum"),
            FitStatus::NegativePeak { amplitude } => {
                write!(f, "negative peak amplitude {:.4}", amplitude)
            }
            FitStatus::PeakRmsTooHigh { rms, limit } => {
                write!(f, "peak fit rms {:.4} exceeds {:.2}", rms, limit)
            }
            FitStatus::InfiniteRms => write!(f, "peak fit rms is not finite"),
            FitStatus::LowSignalToNoise { ratio, limit } => {
                write!(f, "signal to noise {:.2} below {:.1}", ratio, limit)
            }
            FitStatus::PeakInBaseline { index } => {
                write!(f, "spline maximum {} lies in the baseline region", index)
            }
            FitStatus::NoExtrema => write!(f, "failed to locate local minima and maxima"),
            FitStatus::PeakOutOfRange { index, low, high } => write!(
                f,
                "peak at sample {} outside expected range {}..{}",
                index, low, high
            ),
            FitStatus::NoLocalMinima => write!(f, "no local minima, using FNBW points"),
            FitStatus::CenterNotFound => write!(f, "failed to locate peak centre"),
            FitStatus::PeakTooNoisy { selected, window } => write!(
                f,
                "main beam too noisy: {} of {} samples above cut",
                selected, window
            ),
            FitStatus::PeakBeyondBaseline { start, end } => write!(
                f,
                "peak window {}..{} extends beyond the baseline",
                start, end
            ),
            FitStatus::MinExceedsMax { min, max } => {
                write!(f, "|min| {:.4} exceeds max {:.4}", min.abs(), max)
            }
            FitStatus::TheoreticalBaseline => write!(f, "baseline set from theoretical FNBW"),
            FitStatus::FnbwOutOfScan => write!(f, "FNBW points fall outside the scan"),
            FitStatus::ABeamCrossesMidpoint => write!(f, "A beam window crosses the midpoint"),
            FitStatus::BBeamCrossesMidpoint => write!(f, "B beam window crosses the midpoint"),
            FitStatus::BaselineNotFound => write!(f, "failed to locate baseline blocks"),
            FitStatus::MaxBeyondBaseline { index } => {
                write!(f, "maximum at sample {} beyond its baseline half", index)
            }
            FitStatus::MinBeyondBaseline { index } => {
                write!(f, "minimum at sample {} beyond its baseline half", index)
            }
            FitStatus::OverlapOnABeam { shift, resolved } => write!(
                f,
                "A beam window overlaps baseline, shifted {} samples ({})",
                shift,
                if *resolved { "refit" } else { "unresolved" }
            ),
            FitStatus::OverlapOnBBeam { shift, resolved } => write!(
                f,
                "B beam window overlaps baseline, shifted {} samples ({})",
                shift,
                if *resolved { "refit" } else { "unresolved" }
            ),
            FitStatus::EntireBBeamFit => write!(f, "B beam is flat, fitting entire window"),
            FitStatus::EntireABeamFit => write!(f, "A beam is flat, fitting entire window"),
            FitStatus::PeakRefitAroundExtrema => {
                write!(f, "peak refit around nearest local maximum")
            }
            FitStatus::TooFewPointsToSpline { samples, required } => write!(
                f,
                "{} samples is too few to spline, need more than {}",
                samples, required
            ),
            FitStatus::EmptyAfterCleaning => write!(f, "RFI removal left no samples"),
            FitStatus::ForcedBaseline { fallback } => match fallback {
                ForcedFallback::CentredAtZero => {
                    write!(f, "forced fit: baseline from minima around zero offset")
                }
                ForcedFallback::FnbwPoints => {
                    write!(f, "forced fit: baseline beyond the FNBW points")
                }
            },
            FitStatus::NoCorrectedData => write!(f, "no drift-corrected data"),
        }
    }
}
