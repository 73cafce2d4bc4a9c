use crate::prelude::{PipelineError, PipelineResult, Trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reduction path, chosen once per scan from the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeamMode {
    SingleBeam,
    DualBeam,
}

/// Receiver frontend, parsed from the instrument tag (e.g. `13.0S`, `03.5D`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frontend {
    /// Wide single beam, observed on source only.
    SingleBeamWide(String),
    /// Narrow single beam, observed at both half-power points and on source.
    SingleBeamNarrow(String),
    /// Twin-horn receiver; `factor` scales the FNBW into each horn's search half.
    DualBeam { tag: String, factor: f64 },
}

impl Frontend {
    pub fn tag(&self) -> &str {
        match self {
            Frontend::SingleBeamWide(tag) | Frontend::SingleBeamNarrow(tag) => tag,
            Frontend::DualBeam { tag, .. } => tag,
        }
    }

    pub fn beam_mode(&self) -> BeamMode {
        match self {
            Frontend::DualBeam { .. } => BeamMode::DualBeam,
            _ => BeamMode::SingleBeam,
        }
    }

    /// Scan positions observed with this frontend.
    pub fn positions(&self) -> &'static [ScanPosition] {
        match self {
            Frontend::SingleBeamWide(_) => &[ScanPosition::On],
            _ => &[ScanPosition::Hpn, ScanPosition::Hps, ScanPosition::On],
        }
    }

    pub fn beam_factor(&self) -> Option<f64> {
        match self {
            Frontend::DualBeam { factor, .. } => Some(*factor),
            _ => None,
        }
    }
}

impl FromStr for Frontend {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let tag = value.trim();
        if tag.ends_with('S') {
            if tag == "13.0S" || tag == "18.0S" {
                Ok(Frontend::SingleBeamWide(tag.to_string()))
            } else {
                Ok(Frontend::SingleBeamNarrow(tag.to_string()))
            }
        } else if tag.ends_with('D') {
            let factor = match tag {
                "03.5D" => 0.6,
                "06.0D" => 0.55,
                _ => return Err(PipelineError::UnsupportedFrontend(tag.to_string())),
            };
            Ok(Frontend::DualBeam {
                tag: tag.to_string(),
                factor,
            })
        } else {
            Err(PipelineError::UnsupportedFrontend(tag.to_string()))
        }
    }
}

impl TryFrom<String> for Frontend {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frontend> for String {
    fn from(frontend: Frontend) -> Self {
        frontend.tag().to_string()
    }
}

impl fmt::Display for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanPosition {
    Hpn,
    Hps,
    On,
}

impl fmt::Display for ScanPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanPosition::Hpn => "HPN",
            ScanPosition::Hps => "HPS",
            ScanPosition::On => "ON",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    Lcp,
    Rcp,
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Polarization::Lcp => "LCP",
            Polarization::Rcp => "RCP",
        })
    }
}

/// Closed offset interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: f64,
    pub end: f64,
}

impl OffsetRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn contains(&self, offset: f64) -> bool {
        offset >= self.start && offset <= self.end
    }

    /// Indices of `offsets` inside the interval.
    pub fn indices(&self, offsets: &[f64]) -> Vec<usize> {
        offsets
            .iter()
            .enumerate()
            .filter(|(_, x)| self.contains(**x))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Caller-supplied windows that bypass the heuristic baseline and peak search.
///
/// Single-beam scans use the first peak range; dual-beam scans use the first
/// for the A horn and the second for the B horn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoFitHints {
    pub baseline: Vec<OffsetRange>,
    pub peaks: Vec<OffsetRange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineMode {
    /// Search the spline for nulls either side of the peak.
    #[default]
    Auto,
    /// Use every sample beyond the nominal first nulls.
    Theoretical,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub source: String,
    pub frontend: Frontend,
    pub hpbw: f64,
    pub fnbw: f64,
    #[serde(default)]
    pub baseline_mode: BaselineMode,
    #[serde(default = "default_true")]
    pub apply_rfi_removal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<AutoFitHints>,
}

impl ScanMetadata {
    pub fn new(source: impl Into<String>, frontend: Frontend, hpbw: f64, fnbw: f64) -> Self {
        Self {
            source: source.into(),
            frontend,
            hpbw,
            fnbw,
            baseline_mode: BaselineMode::Auto,
            apply_rfi_removal: true,
            hints: None,
        }
    }

    pub fn with_hints(mut self, hints: AutoFitHints) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.hpbw.is_finite() && self.hpbw > 0.0) {
            return Err(PipelineError::InvalidMetadata(format!(
                "hpbw must be positive, got {}",
                self.hpbw
            )));
        }
        if !(self.fnbw.is_finite() && self.fnbw > 0.0) {
            return Err(PipelineError::InvalidMetadata(format!(
                "fnbw must be positive, got {}",
                self.fnbw
            )));
        }
        Ok(())
    }

    pub fn half_hpbw(&self) -> f64 {
        self.hpbw / 2.0
    }

    pub fn half_fnbw(&self) -> f64 {
        self.fnbw / 2.0
    }
}

/// One observed trace: a scan position in one polarisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanChannel {
    pub position: ScanPosition,
    pub polarization: Polarization,
    pub trace: Trace,
}

impl ScanChannel {
    pub fn new(position: ScanPosition, polarization: Polarization, trace: Trace) -> Self {
        Self {
            position,
            polarization,
            trace,
        }
    }

    pub fn tag(&self) -> String {
        format!("{}_{}", self.position, self.polarization)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftScan {
    pub metadata: ScanMetadata,
    pub channels: Vec<ScanChannel>,
}

impl DriftScan {
    pub fn new(metadata: ScanMetadata) -> Self {
        Self {
            metadata,
            channels: Vec::new(),
        }
    }

    pub fn push(&mut self, position: ScanPosition, polarization: Polarization, trace: Trace) {
        self.channels
            .push(ScanChannel::new(position, polarization, trace));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_tags_select_geometry() {
        let wide: Frontend = "13.0S".parse().unwrap();
        assert_eq!(wide.positions(), &[ScanPosition::On]);
        assert_eq!(wide.beam_mode(), BeamMode::SingleBeam);

        let narrow: Frontend = "02.5S".parse().unwrap();
        assert_eq!(narrow.positions().len(), 3);

        let dual: Frontend = "06.0D".parse().unwrap();
        assert_eq!(dual.beam_mode(), BeamMode::DualBeam);
        assert_eq!(dual.beam_factor(), Some(0.55));
        assert_eq!(
            "03.5D".parse::<Frontend>().unwrap().beam_factor(),
            Some(0.6)
        );
    }

    #[test]
    fn unknown_frontends_are_rejected() {
        assert_eq!(
            "22.0D".parse::<Frontend>().unwrap_err(),
            PipelineError::UnsupportedFrontend("22.0D".into())
        );
        assert!("XBAND".parse::<Frontend>().is_err());
    }

    #[test]
    fn metadata_round_trips_through_json_with_defaults() {
        let json = r#"{"source":"3C123","frontend":"18.0S","hpbw":0.2,"fnbw":0.45}"#;
        let meta: ScanMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.frontend, Frontend::SingleBeamWide("18.0S".into()));
        assert!(meta.apply_rfi_removal);
        assert_eq!(meta.baseline_mode, BaselineMode::Auto);
        assert!(meta.validate().is_ok());
        let encoded = serde_json::to_string(&meta).unwrap();
        assert!(encoded.contains(r#""frontend":"18.0S""#));
    }

    #[test]
    fn metadata_rejects_non_positive_beamwidths() {
        let meta = ScanMetadata::new("src", "13.0S".parse().unwrap(), 0.0, 1.0);
        assert!(matches!(
            meta.validate(),
            Err(PipelineError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn offset_range_orders_and_selects() {
        let range = OffsetRange::new(0.5, -0.5);
        assert_eq!(range.start, -0.5);
        assert_eq!(range.indices(&[-1.0, -0.5, 0.0, 0.5, 1.0]), vec![1, 2, 3]);
    }
}
