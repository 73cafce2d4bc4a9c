use crate::math::gauss::GaussianLinear;
use crate::math::stats::StatsHelper;
use crate::pipeline::calibration::{Calibrator, PointingCalibrator};
use crate::prelude::{ChannelFitter, PipelineConfig, PipelineResult, Trace};
use crate::processing::baseline::{
    forced_baseline, hinted_baseline, locate_baseline, theoretical_baseline, BaselineSelection,
};
use crate::processing::drift::correct_drift;
use crate::processing::dual_beam::{fit_dual_beam, DualBeamGeometry};
use crate::processing::peak::{fit_peak, fit_quadratic, PeakFitInput, PeakSign};
use crate::processing::rfi::clean_rfi;
use crate::processing::spline::SplineSmoother;
use crate::scan_interface::{
    BaselineMode, Beam, BeamMode, ChannelResult, CleaningStats, DriftModel, DriftScan,
    PeakFitResult, ScanChannel, ScanMetadata, ScanResult,
};
use crate::status::{FitStatus, Severity};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use std::sync::Arc;

/// Trace after the NaN check and RFI removal, with its spline.
struct Prepared {
    trace: Trace,
    spline: Vec<f64>,
    cleaning: Option<CleaningStats>,
}

fn prepare(
    channel: &ScanChannel,
    metadata: &ScanMetadata,
    smoother: &SplineSmoother,
    config: &PipelineConfig,
    logger: &LogManager,
) -> Result<Prepared, FitStatus> {
    let missing = channel.trace.missing_count();
    if missing > 0 {
        logger.warn(&format!("{} samples missing, channel skipped", missing));
        return Err(FitStatus::NoData { missing });
    }

    if !metadata.apply_rfi_removal {
        let smoothed = smoother.smooth(channel.trace.amplitudes());
        if !smoothed.is_fitted() {
            return Err(smoothed.status);
        }
        return Ok(Prepared {
            trace: channel.trace.clone(),
            spline: smoothed.values,
            cleaning: None,
        });
    }

    let cleaned = clean_rfi(&channel.trace, smoother, config, logger)?;
    if cleaned.stats.rms_after >= config.max_clean_rms {
        return Err(FitStatus::HighRms {
            rms: cleaned.stats.rms_after,
            limit: config.max_clean_rms,
        });
    }
    Ok(Prepared {
        trace: cleaned.trace,
        spline: cleaned.spline,
        cleaning: Some(cleaned.stats),
    })
}

/// Quality checks shared by every fitted beam. `expected` is the sign the
/// peak should have.
fn apply_post_checks(
    peak: &mut PeakFitResult,
    drift: &DriftModel,
    expected: PeakSign,
    config: &PipelineConfig,
) {
    if expected == PeakSign::Maximum && peak.amplitude < 0.0 {
        peak.degrade(FitStatus::NegativePeak {
            amplitude: peak.amplitude,
        });
    }
    if !peak.error.is_finite() {
        peak.degrade(FitStatus::InfiniteRms);
    } else if peak.error > config.max_peak_rms {
        peak.degrade(FitStatus::PeakRmsTooHigh {
            rms: peak.error,
            limit: config.max_peak_rms,
        });
    }

    let noise = StatsHelper::std(&drift.residuals);
    if noise > 0.0 {
        let ratio = peak.amplitude.abs() / noise;
        peak.signal_to_noise = Some(ratio);
        if ratio < config.min_signal_to_noise {
            peak.degrade(FitStatus::LowSignalToNoise {
                ratio,
                limit: config.min_signal_to_noise,
            });
        }
    }
}

/// Worst status across the channel's beams.
fn channel_status(peaks: &[PeakFitResult]) -> FitStatus {
    peaks
        .iter()
        .map(|peak| &peak.status)
        .max_by_key(|status| status.severity())
        .filter(|status| status.severity() != Severity::Ok)
        .cloned()
        .unwrap_or_default()
}

fn failed_channel(
    channel: &ScanChannel,
    beams: &[Beam],
    cleaning: Option<CleaningStats>,
    status: FitStatus,
) -> ChannelResult {
    let mut result = ChannelResult::failed(channel.position, channel.polarization, beams, status);
    result.cleaning = cleaning;
    result
}

/// Gaussian-plus-line fit over the whole trace, seeded at the spline maximum.
fn probe_centre(trace: &Trace, spline: &[f64], hpbw: f64) -> Option<f64> {
    let peak = StatsHelper::argmax(spline)?;
    let initial = GaussianLinear {
        amplitude: spline[peak],
        centre: trace.offsets()[peak],
        hpbw,
        slope: 0.0,
        intercept: 0.0,
    };
    GaussianLinear::fit(trace.offsets(), trace.amplitudes(), initial).map(|fit| fit.centre)
}

/// Baseline search chosen by the metadata, falling back to forced blocks
/// when `force_fit` is set and the search fails.
fn single_beam_baseline(
    trace: &Trace,
    spline: &[f64],
    centre: f64,
    metadata: &ScanMetadata,
    config: &PipelineConfig,
    logger: &LogManager,
) -> Result<BaselineSelection, FitStatus> {
    let located = match metadata.baseline_mode {
        BaselineMode::Theoretical => theoretical_baseline(trace, metadata.half_fnbw()),
        BaselineMode::Auto => {
            locate_baseline(trace, spline, centre, metadata.half_fnbw(), config, logger)
        }
    };
    match located {
        Err(status) if config.force_fit => {
            logger.warn(&format!("baseline search failed ({}), forcing the fit", status));
            forced_baseline(trace, spline, metadata.half_fnbw(), config, logger)
        }
        other => other,
    }
}

/// Single-beam path: probe, baseline search, drift removal, main-beam fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleBeamFitter;

impl SingleBeamFitter {
    fn reduce(
        &self,
        channel: &ScanChannel,
        prepared: &Prepared,
        metadata: &ScanMetadata,
        smoother: &SplineSmoother,
        config: &PipelineConfig,
        logger: &LogManager,
    ) -> Result<ChannelResult, FitStatus> {
        let trace = &prepared.trace;
        let hints = metadata.hints.as_ref();
        let hinted_peak = hints.and_then(|h| h.peaks.first());
        let estimated = match hinted_peak {
            Some(range) => Some((range.start + range.end) / 2.0),
            None => probe_centre(trace, &prepared.spline, metadata.hpbw),
        };
        let centre = match estimated {
            Some(centre) => centre,
            None if config.force_fit => {
                logger.warn("gaussian centre estimate failed, forcing the fit at zero offset");
                0.0
            }
            None => return Err(FitStatus::GaussianFitFailed),
        };
        logger.debug(&format!("probe centre {:.4}", centre));

        let baseline = match hints.filter(|h| !h.baseline.is_empty()) {
            Some(hints) => hinted_baseline(trace, &hints.baseline, centre)?,
            None if estimated.is_none() => forced_baseline(
                trace,
                &prepared.spline,
                metadata.half_fnbw(),
                config,
                logger,
            )?,
            None => {
                single_beam_baseline(trace, &prepared.spline, centre, metadata, config, logger)?
            }
        };
        let combined = baseline.combined();
        let drift = correct_drift(trace, &combined, config.drift_order)?;
        logger.debug(&format!(
            "drift coefficients {:?}, baseline rms {:.5}",
            drift.model.coefficients, drift.model.rms
        ));

        let mut peak = match hinted_peak {
            Some(range) => {
                let window: Vec<usize> = range
                    .indices(drift.corrected.offsets())
                    .into_iter()
                    .filter(|&i| !baseline.contains(i))
                    .collect();
                match fit_quadratic(&drift.corrected, &window, PeakSign::Maximum) {
                    Some(fit) if fit.peaked => fit.into_result(Beam::Main),
                    _ => return Err(FitStatus::PeakNotLocated),
                }
            }
            None => {
                let smoothed = smoother.smooth(drift.corrected.amplitudes());
                if !smoothed.is_fitted() {
                    return Err(smoothed.status);
                }
                fit_peak(
                    &PeakFitInput {
                        corrected: &drift.corrected,
                        spline: &smoothed.values,
                        probe_centre: centre,
                        hpbw: metadata.hpbw,
                        half_fnbw: metadata.half_fnbw(),
                        baseline: &baseline,
                    },
                    config,
                    logger,
                )?
            }
        };
        peak.centre = Some(centre);
        for warning in &baseline.warnings {
            peak.degrade(warning.clone());
        }
        apply_post_checks(&mut peak, &drift.model, PeakSign::Maximum, config);

        let status = peak.status.clone();
        Ok(ChannelResult {
            position: channel.position,
            polarization: channel.polarization,
            peaks: vec![peak],
            drift: Some(drift.model),
            cleaning: prepared.cleaning,
            corrected: Some(drift.corrected),
            baseline: combined,
            status,
        })
    }
}

impl ChannelFitter for SingleBeamFitter {
    fn mode(&self) -> BeamMode {
        BeamMode::SingleBeam
    }

    fn fit_channel(
        &self,
        channel: &ScanChannel,
        metadata: &ScanMetadata,
        config: &PipelineConfig,
        logger: &LogManager,
    ) -> ChannelResult {
        let smoother = SplineSmoother::from_config(config);
        let prepared = match prepare(channel, metadata, &smoother, config, logger) {
            Ok(prepared) => prepared,
            Err(status) => return failed_channel(channel, &[Beam::Main], None, status),
        };
        self.reduce(channel, &prepared, metadata, &smoother, config, logger)
            .unwrap_or_else(|status| {
                logger.warn(&format!("channel failed: {}", status));
                failed_channel(channel, &[Beam::Main], prepared.cleaning, status)
            })
    }
}

/// Twin-horn path: edge baseline, polarity, one fit per horn.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualBeamFitter;

impl ChannelFitter for DualBeamFitter {
    fn mode(&self) -> BeamMode {
        BeamMode::DualBeam
    }

    fn fit_channel(
        &self,
        channel: &ScanChannel,
        metadata: &ScanMetadata,
        config: &PipelineConfig,
        logger: &LogManager,
    ) -> ChannelResult {
        const BEAMS: [Beam; 2] = [Beam::A, Beam::B];
        let smoother = SplineSmoother::from_config(config);
        let prepared = match prepare(channel, metadata, &smoother, config, logger) {
            Ok(prepared) => prepared,
            Err(status) => return failed_channel(channel, &BEAMS, None, status),
        };
        let geometry = match DualBeamGeometry::from_metadata(metadata) {
            Some(geometry) => geometry,
            None => {
                return failed_channel(
                    channel,
                    &BEAMS,
                    prepared.cleaning,
                    FitStatus::BeamScanEmpty { beam: Beam::A },
                )
            }
        };

        let fit = match fit_dual_beam(
            &prepared.trace,
            &smoother,
            &geometry,
            metadata.hints.as_ref(),
            config,
            logger,
        ) {
            Ok(fit) => fit,
            Err(status) => {
                logger.warn(&format!("channel failed: {}", status));
                return failed_channel(channel, &BEAMS, prepared.cleaning, status);
            }
        };

        let mut peaks = vec![fit.a, fit.b];
        for peak in peaks.iter_mut().filter(|peak| peak.is_usable()) {
            let expected = if peak.amplitude >= 0.0 {
                PeakSign::Maximum
            } else {
                PeakSign::Minimum
            };
            apply_post_checks(peak, &fit.drift.model, expected, config);
        }
        let status = channel_status(&peaks);
        ChannelResult {
            position: channel.position,
            polarization: channel.polarization,
            peaks,
            drift: Some(fit.drift.model),
            cleaning: prepared.cleaning,
            corrected: Some(fit.drift.corrected),
            baseline: fit.baseline.combined(),
            status,
        }
    }
}

/// Runs every channel of a scan through the fitter chosen by its frontend.
pub struct ScanOrchestrator {
    config: PipelineConfig,
    calibrator: Box<dyn Calibrator>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl ScanOrchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            calibrator: Box::new(PointingCalibrator),
            metrics: None,
        }
    }

    pub fn with_calibrator(mut self, calibrator: Box<dyn Calibrator>) -> Self {
        self.calibrator = calibrator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn fitter_for(mode: BeamMode) -> Box<dyn ChannelFitter> {
        match mode {
            BeamMode::SingleBeam => Box::new(SingleBeamFitter),
            BeamMode::DualBeam => Box::new(DualBeamFitter),
        }
    }

    fn record_metrics(&self, result: &ChannelResult) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.record_processed();
        match result.status.severity() {
            Severity::Fatal => metrics.record_failed(),
            Severity::Degraded => metrics.record_degraded(),
            Severity::Ok => {}
        }
        if let Some(cleaning) = &result.cleaning {
            metrics.record_points_removed(cleaning.points_removed);
        }
    }

    /// Reduce every channel; a failed channel yields NaN peaks and the
    /// rest of the scan carries on.
    pub fn run(&self, scan: &DriftScan) -> PipelineResult<ScanResult> {
        let metadata = &scan.metadata;
        metadata.validate()?;
        let mode = metadata.frontend.beam_mode();
        let fitter = Self::fitter_for(mode);
        let expected = metadata.frontend.positions();

        let mut channels = Vec::with_capacity(scan.channels.len());
        for channel in &scan.channels {
            let logger = LogManager::tagged(format!("{} {}", metadata.source, channel.tag()));
            if !expected.contains(&channel.position) {
                logger.warn(&format!(
                    "{} scans are not expected for frontend {}",
                    channel.position, metadata.frontend
                ));
            }
            let result = fitter.fit_channel(channel, metadata, &self.config, &logger);
            logger.record(&format!("status {} ({})", result.status.code(), result.status));
            self.record_metrics(&result);
            channels.push(result);
        }

        let mut result = ScanResult {
            source: metadata.source.clone(),
            frontend: metadata.frontend.to_string(),
            mode,
            channels,
            calibration: Vec::new(),
        };
        result.calibration = self.calibrator.calibrate(&result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::PipelineError;
    use crate::scan_interface::{AutoFitHints, OffsetRange, Polarization, ScanPosition};
    use crate::status::ForcedFallback;
    use crate::test_support::{linspace, sinc_squared, twin_horn_trace};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const NULL_HALF_WIDTH: f64 = 0.9;
    const CENTRE: f64 = 0.03;

    fn sinc_beam_trace(amplitude: f64, seed: u64) -> Trace {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = linspace(-1.5, 1.5, 601);
        let y = x
            .iter()
            .map(|&v| {
                sinc_squared(amplitude, CENTRE, NULL_HALF_WIDTH, v)
                    + 0.05 * v
                    + 0.2
                    + rng.gen_range(-0.01..0.01)
            })
            .collect();
        Trace::new(x, y).unwrap()
    }

    fn wide_beam_metadata() -> ScanMetadata {
        ScanMetadata::new(
            "HydraA",
            "13.0S".parse().unwrap(),
            0.886 * NULL_HALF_WIDTH,
            2.0 * NULL_HALF_WIDTH,
        )
    }

    #[test]
    fn single_beam_scan_recovers_the_peak() {
        let mut scan = DriftScan::new(wide_beam_metadata());
        scan.push(ScanPosition::On, Polarization::Lcp, sinc_beam_trace(1.0, 11));
        scan.push(ScanPosition::On, Polarization::Rcp, sinc_beam_trace(1.0, 12));

        let metrics = Arc::new(MetricsRecorder::new());
        let orchestrator =
            ScanOrchestrator::new(PipelineConfig::default()).with_metrics(metrics.clone());
        let result = orchestrator.run(&scan).unwrap();

        assert_eq!(result.mode, BeamMode::SingleBeam);
        assert_eq!(result.channels.len(), 2);
        for channel in &result.channels {
            let peak = channel.peak(Beam::Main).unwrap();
            assert!(peak.is_usable(), "{}", peak.status);
            assert!((peak.amplitude - 1.0).abs() < 0.03, "{}", peak.amplitude);
            assert!((peak.position - CENTRE).abs() < 0.01);
            assert!(peak.signal_to_noise.unwrap() > 3.0);
            assert!(peak.window.iter().all(|i| !channel.baseline.contains(i)));
            assert!(channel.drift.as_ref().unwrap().coefficients[1] > 0.0);
        }
        assert!(result.calibration.is_empty());
        assert_eq!(metrics.snapshot().processed, 2);
    }

    #[test]
    fn missing_samples_fail_only_their_channel() {
        let mut scan = DriftScan::new(wide_beam_metadata());
        scan.push(ScanPosition::On, Polarization::Lcp, sinc_beam_trace(1.0, 3));
        let mut broken = sinc_beam_trace(1.0, 4).amplitudes().to_vec();
        broken[100] = f64::NAN;
        let offsets = linspace(-1.5, 1.5, 601);
        scan.push(
            ScanPosition::On,
            Polarization::Rcp,
            Trace::new(offsets, broken).unwrap(),
        );

        let result = ScanOrchestrator::new(PipelineConfig::default())
            .run(&scan)
            .unwrap();
        let good = result
            .peak(ScanPosition::On, Polarization::Lcp, Beam::Main)
            .unwrap();
        let bad = result
            .peak(ScanPosition::On, Polarization::Rcp, Beam::Main)
            .unwrap();
        assert!(good.is_usable());
        assert!(bad.amplitude.is_nan());
        assert_eq!(bad.status, FitStatus::NoData { missing: 1 });
    }

    #[test]
    fn short_trace_reports_spline_failure_with_nan_peak() {
        let mut scan = DriftScan::new(wide_beam_metadata());
        let x = linspace(-1.0, 1.0, 15);
        let y = x.iter().map(|&v| sinc_squared(1.0, 0.0, 0.9, v)).collect();
        scan.push(ScanPosition::On, Polarization::Lcp, Trace::new(x, y).unwrap());
        let result = ScanOrchestrator::new(PipelineConfig::default())
            .run(&scan)
            .unwrap();
        let channel = &result.channels[0];
        assert_eq!(channel.status.code(), 38);
        assert!(channel.peaks[0].amplitude.is_nan());
        assert!(channel.peaks[0].error.is_nan());
    }

    #[test]
    fn hints_bypass_the_baseline_search() {
        let hints = AutoFitHints {
            baseline: vec![OffsetRange::new(-0.95, -0.8), OffsetRange::new(0.85, 1.0)],
            peaks: vec![OffsetRange::new(-0.2, 0.25)],
        };
        let mut scan = DriftScan::new(wide_beam_metadata().with_hints(hints));
        scan.push(ScanPosition::On, Polarization::Lcp, sinc_beam_trace(1.0, 5));
        let result = ScanOrchestrator::new(PipelineConfig::default())
            .run(&scan)
            .unwrap();
        let channel = &result.channels[0];
        let peak = channel.peak(Beam::Main).unwrap();
        assert!(peak.is_usable(), "{}", peak.status);
        assert!((peak.amplitude - 1.0).abs() < 0.02, "{}", peak.amplitude);
        assert!((peak.centre.unwrap() - 0.025).abs() < 1e-12);
        let offsets = channel.corrected.as_ref().unwrap().offsets();
        assert!(channel
            .baseline
            .iter()
            .all(|&i| (0.8..=1.0).contains(&offsets[i].abs())));
    }

    #[test]
    fn dual_beam_scan_fits_both_horns_and_calibrates() {
        let metadata = ScanMetadata::new("PKS2326-502", "03.5D".parse().unwrap(), 0.45, 1.2);
        let mut scan = DriftScan::new(metadata);
        for (position, scale) in [
            (ScanPosition::Hpn, 0.5),
            (ScanPosition::Hps, 0.5),
            (ScanPosition::On, 1.0),
        ] {
            let (x, y) = twin_horn_trace(scale, -scale, 0.6, 0.45, -1.5, 1.5, 901);
            let y = x.iter().zip(y).map(|(&v, y)| y + 0.05 * v + 0.1).collect();
            scan.push(position, Polarization::Lcp, Trace::new(x, y).unwrap());
        }
        let result = ScanOrchestrator::new(PipelineConfig::default())
            .run(&scan)
            .unwrap();
        assert_eq!(result.mode, BeamMode::DualBeam);
        let on = result.channel(ScanPosition::On, Polarization::Lcp).unwrap();
        assert_eq!(on.peaks.len(), 2);
        let a = on.peak(Beam::A).unwrap();
        let b = on.peak(Beam::B).unwrap();
        assert!((a.amplitude - 1.0).abs() < 0.03, "{}", a.amplitude);
        assert!((b.amplitude + 1.0).abs() < 0.03, "{}", b.amplitude);

        assert_eq!(result.calibration.len(), 2);
        for record in &result.calibration {
            assert!((record.pointing_correction - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn forced_fit_recovers_a_failed_baseline_search() {
        let trace = sinc_beam_trace(1.0, 21);
        let metadata = wide_beam_metadata();
        let strict = PipelineConfig::default();
        let spline = SplineSmoother::from_config(&strict).smooth(trace.amplitudes());
        let logger = LogManager::new();

        // a centre outside the central half of the scan stops the search
        let err =
            single_beam_baseline(&trace, &spline.values, 1.2, &metadata, &strict, &logger)
                .unwrap_err();
        assert_eq!(err.code(), 20);

        let forced = PipelineConfig {
            force_fit: true,
            ..PipelineConfig::default()
        };
        let selection =
            single_beam_baseline(&trace, &spline.values, 1.2, &metadata, &forced, &logger)
                .unwrap();
        assert_eq!(
            selection.status(),
            FitStatus::ForcedBaseline {
                fallback: ForcedFallback::CentredAtZero
            }
        );
        let offsets = trace.offsets();
        assert!(offsets[selection.left.last().unwrap()] < -0.5);
        assert!(offsets[selection.right.first().unwrap()] > 0.5);
    }

    #[test]
    fn forced_fit_on_a_featureless_trace_uses_fnbw_points() {
        let x = linspace(-1.5, 1.5, 601);
        let y = x.iter().map(|&v| 0.4 * v + 0.1).collect();
        let trace = Trace::new(x, y).unwrap();
        let metadata = ScanMetadata::new("HydraA", "13.0S".parse().unwrap(), 0.8, 2.0);
        let spline = SplineSmoother::from_config(&PipelineConfig::default())
            .smooth(trace.amplitudes());
        let forced = PipelineConfig {
            force_fit: true,
            ..PipelineConfig::default()
        };
        let logger = LogManager::new();
        let selection =
            single_beam_baseline(&trace, &spline.values, 0.0, &metadata, &forced, &logger)
                .unwrap();
        assert_eq!(
            selection.status(),
            FitStatus::ForcedBaseline {
                fallback: ForcedFallback::FnbwPoints
            }
        );
        assert!(!selection.left.is_empty() && !selection.right.is_empty());
    }

    #[test]
    fn invalid_metadata_is_a_hard_error() {
        let metadata = ScanMetadata::new("src", "13.0S".parse().unwrap(), -1.0, 1.0);
        let scan = DriftScan::new(metadata);
        let err = ScanOrchestrator::new(PipelineConfig::default())
            .run(&scan)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMetadata(_)));
    }
}
