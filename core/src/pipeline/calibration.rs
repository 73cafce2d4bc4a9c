use crate::scan_interface::{
    Beam, BeamMode, CalibrationRecord, PeakFitResult, Polarization, ScanPosition, ScanResult,
};
use std::f64::consts::LN_2;

/// Second-stage calibration applied to a finished scan.
pub trait Calibrator: Send + Sync {
    fn calibrate(&self, result: &ScanResult) -> Vec<CalibrationRecord>;
}

/// Half-power pointing correction for a Gaussian beam observed at
/// `-hpbw/2` (HPN), `+hpbw/2` (HPS) and on source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointingCalibrator;

/// Value with its one-sigma error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub error: f64,
}

impl Measurement {
    fn from_peak(peak: &PeakFitResult) -> Option<Self> {
        let value = peak.amplitude.abs();
        (peak.is_usable() && value > 0.0).then_some(Self {
            value,
            error: if peak.error.is_finite() { peak.error } else { 0.0 },
        })
    }
}

impl PointingCalibrator {
    /// Correction from both half-power scans.
    pub fn from_half_power_pair(hps: Measurement, hpn: Measurement) -> Measurement {
        let ratio = (hps.value / hpn.value).ln();
        let scale = 16.0 * LN_2;
        let value = (ratio * ratio / scale).exp();
        let slope = value * 2.0 * ratio / scale;
        let error = ((slope * hps.error / hps.value).powi(2)
            + (slope * hpn.error / hpn.value).powi(2))
        .sqrt();
        Measurement { value, error }
    }

    /// Correction from one half-power scan and the on-source scan.
    pub fn from_single_offset(half_power: Measurement, on: Measurement) -> Measurement {
        let term = (half_power.value / on.value).ln() + LN_2;
        let scale = 4.0 * LN_2;
        let value = (term * term / scale).exp();
        let slope = value * 2.0 * term / scale;
        let error = ((slope * half_power.error / half_power.value).powi(2)
            + (slope * on.error / on.value).powi(2))
        .sqrt();
        Measurement { value, error }
    }

    fn record(
        &self,
        result: &ScanResult,
        polarization: Polarization,
        beam: Beam,
    ) -> Option<CalibrationRecord> {
        let measure = |position| {
            result
                .peak(position, polarization, beam)
                .and_then(Measurement::from_peak)
        };
        let on_peak = result.peak(ScanPosition::On, polarization, beam)?;
        let on = measure(ScanPosition::On)?;
        let correction = match (measure(ScanPosition::Hps), measure(ScanPosition::Hpn)) {
            (Some(hps), Some(hpn)) => Self::from_half_power_pair(hps, hpn),
            (Some(hp), None) | (None, Some(hp)) => Self::from_single_offset(hp, on),
            (None, None) => return None,
        };

        let corrected_amplitude = on_peak.amplitude * correction.value;
        let corrected_error = ((correction.value * on.error).powi(2)
            + (on.value * correction.error).powi(2))
        .sqrt();
        Some(CalibrationRecord {
            polarization,
            beam,
            on_amplitude: on_peak.amplitude,
            pointing_correction: correction.value,
            pointing_correction_error: correction.error,
            corrected_amplitude,
            corrected_error,
        })
    }
}

impl Calibrator for PointingCalibrator {
    fn calibrate(&self, result: &ScanResult) -> Vec<CalibrationRecord> {
        let beams: &[Beam] = match result.mode {
            BeamMode::SingleBeam => &[Beam::Main],
            BeamMode::DualBeam => &[Beam::A, Beam::B],
        };
        [Polarization::Lcp, Polarization::Rcp]
            .iter()
            .flat_map(|&pol| beams.iter().map(move |&beam| (pol, beam)))
            .filter_map(|(pol, beam)| self.record(result, pol, beam))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan_interface::ChannelResult;
    use crate::status::FitStatus;

    fn measured(value: f64) -> Measurement {
        Measurement { value, error: 0.01 }
    }

    #[test]
    fn balanced_half_power_scans_need_no_correction() {
        let pc = PointingCalibrator::from_half_power_pair(measured(0.5), measured(0.5));
        assert!((pc.value - 1.0).abs() < 1e-12);
        assert!(pc.error.abs() < 1e-12);
    }

    #[test]
    fn unbalanced_half_power_scans_raise_the_correction() {
        let pc = PointingCalibrator::from_half_power_pair(
            measured(1.0),
            measured(std::f64::consts::E),
        );
        assert!((pc.value - 1.0944).abs() < 1e-4, "{}", pc.value);
        assert!(pc.error > 0.0);
    }

    #[test]
    fn half_power_at_half_the_peak_is_on_pointing() {
        let pc = PointingCalibrator::from_single_offset(measured(0.5), measured(1.0));
        assert!((pc.value - 1.0).abs() < 1e-12);
    }

    fn channel(position: ScanPosition, amplitude: f64) -> ChannelResult {
        let mut channel =
            ChannelResult::failed(position, Polarization::Lcp, &[Beam::Main], FitStatus::Ok);
        channel.peaks[0].amplitude = amplitude;
        channel.peaks[0].error = 0.01;
        channel
    }

    #[test]
    fn scan_with_all_positions_is_calibrated() {
        let result = ScanResult {
            source: "PKS1934-638".into(),
            frontend: "02.5S".into(),
            mode: BeamMode::SingleBeam,
            channels: vec![
                channel(ScanPosition::Hpn, 0.45),
                channel(ScanPosition::Hps, 0.55),
                channel(ScanPosition::On, 1.0),
            ],
            calibration: Vec::new(),
        };
        let records = PointingCalibrator.calibrate(&result);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.beam, Beam::Main);
        assert!(record.pointing_correction > 1.0);
        assert!((record.corrected_amplitude - record.pointing_correction).abs() < 1e-12);
    }

    #[test]
    fn on_source_only_scans_are_left_alone() {
        let result = ScanResult {
            source: "3C123".into(),
            frontend: "13.0S".into(),
            mode: BeamMode::SingleBeam,
            channels: vec![channel(ScanPosition::On, 1.0)],
            calibration: Vec::new(),
        };
        assert!(PointingCalibrator.calibrate(&result).is_empty());
    }
}
