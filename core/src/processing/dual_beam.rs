use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineConfig, Trace};
use crate::processing::baseline::{
    edge_baseline, hinted_baseline, BaselineBlock, BaselineSelection, BlockSide,
};
use crate::processing::drift::{correct_drift, DriftCorrection};
use crate::processing::peak::{fit_quadratic, PeakSign, QuadraticFit};
use crate::processing::spline::SplineSmoother;
use crate::scan_interface::{AutoFitHints, Beam, PeakFitResult, ScanMetadata};
use crate::status::FitStatus;
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// Which horn carries the positive response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    APositive,
    ANegative,
}

impl Polarity {
    fn sign(self, beam: Beam) -> PeakSign {
        match (self, beam) {
            (Polarity::APositive, Beam::A) | (Polarity::ANegative, Beam::B) => PeakSign::Maximum,
            _ => PeakSign::Minimum,
        }
    }
}

/// Beam geometry of a twin-horn receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualBeamGeometry {
    pub hpbw: f64,
    pub fnbw: f64,
    /// Scales the FNBW into the half-width of each horn's search region.
    pub factor: f64,
}

impl DualBeamGeometry {
    pub fn from_metadata(metadata: &ScanMetadata) -> Option<Self> {
        Some(Self {
            hpbw: metadata.hpbw,
            fnbw: metadata.fnbw,
            factor: metadata.frontend.beam_factor()?,
        })
    }

    fn search_half_width(&self) -> f64 {
        self.fnbw * self.factor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DualBeamFit {
    pub baseline: BaselineSelection,
    pub drift: DriftCorrection,
    pub spline: Vec<f64>,
    pub polarity: Polarity,
    pub a: PeakFitResult,
    pub b: PeakFitResult,
}

/// Compare the A-half spline extremes; the one nearer zero is the B horn's
/// leakage, so a near-zero minimum means the A horn is positive.
pub fn determine_polarity(spline: &[f64], a_scan: &[usize]) -> Option<Polarity> {
    let values: Vec<f64> = a_scan.iter().map(|&i| spline[i]).collect();
    let low = values[StatsHelper::argmin(&values)?];
    let high = values[StatsHelper::argmax(&values)?];
    if low.abs() <= high.abs() {
        Some(Polarity::APositive)
    } else {
        Some(Polarity::ANegative)
    }
}

/// Move a fit window off the same-side baseline block.
///
/// Returns the shifted window and the shift, or `None` when there is nothing
/// to shift. The shift carries the window's inner edge just past the block,
/// so the moved window never touches it. A window that only clips the inner
/// `1 - guard` of the block is trimmed instead of shifted.
pub fn resolve_overlap(
    window: &[usize],
    block: &BaselineBlock,
    guard: f64,
    n: usize,
) -> Option<(Vec<usize>, usize)> {
    if !window.iter().any(|&i| block.contains(i)) {
        return None;
    }
    let indices = block.indices();
    let reach = ((indices.len() as f64 * guard) as usize).min(indices.len() - 1);
    let trimmed = || -> Vec<usize> {
        window.iter().copied().filter(|&i| !block.contains(i)).collect()
    };
    match block.side {
        BlockSide::Left => {
            if window[0] > indices[reach] {
                return Some((trimmed(), 0));
            }
            let shift = indices[indices.len() - 1] + 1 - window[0];
            let moved: Vec<usize> = window.iter().map(|&i| i + shift).filter(|&i| i < n).collect();
            Some((moved, shift))
        }
        BlockSide::Right => {
            if window[window.len() - 1] < indices[indices.len() - 1 - reach] {
                return Some((trimmed(), 0));
            }
            let shift = window[window.len() - 1] + 1 - indices[0];
            let moved: Vec<usize> = window.iter().filter_map(|&i| i.checked_sub(shift)).collect();
            Some((moved, shift))
        }
    }
}

struct Horn<'a> {
    beam: Beam,
    sign: PeakSign,
    centre: usize,
    block: &'a BaselineBlock,
    hinted: Option<Vec<usize>>,
}

fn overlap_status(beam: Beam, shift: usize, resolved: bool) -> FitStatus {
    match beam {
        Beam::B => FitStatus::OverlapOnBBeam { shift, resolved },
        _ => FitStatus::OverlapOnABeam { shift, resolved },
    }
}

fn fit_horn(
    corrected: &Trace,
    spline: &[f64],
    horn: Horn,
    hpbw: f64,
    config: &PipelineConfig,
    logger: &LogManager,
) -> PeakFitResult {
    let x = corrected.offsets();
    let n = corrected.len();
    let mut flat = false;

    let window = match horn.hinted {
        Some(window) => window,
        None => {
            let centre = x[horn.centre];
            let region: Vec<usize> = (0..n)
                .filter(|&i| (x[i] - centre).abs() <= hpbw / 2.0)
                .collect();
            let extreme = spline[horn.centre];
            if extreme.abs() < config.flat_beam_threshold {
                logger.warn(&format!("{} beam is flat, fitting entire window", horn.beam));
                flat = true;
                region
            } else {
                let weight = match horn.sign {
                    PeakSign::Maximum => 1.0,
                    PeakSign::Minimum => -1.0,
                };
                region
                    .into_iter()
                    .filter(|&i| weight * spline[i] >= config.dual_beam_cut * weight * extreme)
                    .collect()
            }
        }
    };
    if window.is_empty() {
        return PeakFitResult::failed(horn.beam, FitStatus::MainBeamNotFound);
    }

    let mut overlap = None;
    let window = match resolve_overlap(&window, horn.block, config.overlap_guard, n) {
        Some((moved, 0)) => {
            logger.debug(&format!("{} beam window trimmed off its baseline block", horn.beam));
            moved
        }
        Some((moved, shift)) => {
            logger.warn(&format!(
                "{} beam window overlaps its baseline block, shifting {} samples",
                horn.beam, shift
            ));
            overlap = Some(shift);
            moved
        }
        None => window,
    };

    let fit: Option<QuadraticFit> = fit_quadratic(corrected, &window, horn.sign);
    let fit = match (fit, overlap) {
        (Some(fit), _) if fit.peaked => fit,
        (_, Some(shift)) => {
            return PeakFitResult::failed(horn.beam, overlap_status(horn.beam, shift, false))
        }
        _ => return PeakFitResult::failed(horn.beam, FitStatus::PeakNotLocated),
    };

    let (start, end) = (fit.window[0], fit.window[fit.window.len() - 1]);
    match horn.beam {
        Beam::B if x[start] < 0.0 => {
            return PeakFitResult::failed(horn.beam, FitStatus::BBeamCrossesMidpoint)
        }
        Beam::A if x[end] > 0.0 => {
            return PeakFitResult::failed(horn.beam, FitStatus::ABeamCrossesMidpoint)
        }
        _ => {}
    }

    logger.record(&format!(
        "{} beam peak {:.5} +/- {:.5} at {:.4}",
        horn.beam, fit.amplitude, fit.rms, fit.position
    ));
    let mut result = fit.into_result(horn.beam);
    if let Some(shift) = overlap {
        result.degrade(overlap_status(horn.beam, shift, true));
    }
    if flat {
        result.degrade(match horn.beam {
            Beam::B => FitStatus::EntireBBeamFit,
            _ => FitStatus::EntireABeamFit,
        });
    }
    result
}

/// Reduce a twin-horn trace: edge baseline, drift removal, polarity, then an
/// independent quadratic fit for each horn.
///
/// Failures that leave no usable corrected trace are returned as `Err`; a
/// horn that cannot be fitted comes back as a failed `PeakFitResult`.
pub fn fit_dual_beam(
    trace: &Trace,
    smoother: &SplineSmoother,
    geometry: &DualBeamGeometry,
    hints: Option<&AutoFitHints>,
    config: &PipelineConfig,
    logger: &LogManager,
) -> Result<DualBeamFit, FitStatus> {
    let n = trace.len();
    let hinted_base = hints.filter(|h| !h.baseline.is_empty());
    let baseline = match hinted_base {
        Some(hints) => hinted_baseline(trace, &hints.baseline, 0.0)?,
        None => edge_baseline(n, config.dual_baseline_fraction)?,
    };
    let drift = correct_drift(trace, &baseline.combined(), config.drift_order)?;
    let smoothed = smoother.smooth(drift.corrected.amplitudes());
    if !smoothed.is_fitted() {
        return Err(smoothed.status);
    }
    let spline = smoothed.values;

    let x = drift.corrected.offsets();
    let half_width = geometry.search_half_width();
    let a_scan: Vec<usize> = (0..n).filter(|&i| x[i] > -half_width && x[i] < 0.0).collect();
    let b_scan: Vec<usize> = (0..n).filter(|&i| x[i] > 0.0 && x[i] < half_width).collect();
    let (a_last, b_first) = match (a_scan.last(), b_scan.first()) {
        (Some(&a), Some(&b)) => (a, b),
        (None, _) => return Err(FitStatus::BeamScanEmpty { beam: Beam::A }),
        (_, None) => return Err(FitStatus::BeamScanEmpty { beam: Beam::B }),
    };

    let max_loc = StatsHelper::argmax(&spline).ok_or(FitStatus::NoCorrectedData)?;
    let min_loc = StatsHelper::argmin(&spline).ok_or(FitStatus::NoCorrectedData)?;
    let polarity = determine_polarity(&spline, &a_scan).ok_or(FitStatus::NoCorrectedData)?;
    logger.debug(&format!(
        "spline max at {}, min at {}, polarity {:?}",
        max_loc, min_loc, polarity
    ));

    let (a_centre, b_centre) = match polarity {
        Polarity::APositive => {
            if max_loc > a_last {
                return Err(FitStatus::MaxBeyondBaseline { index: max_loc });
            }
            if min_loc < b_first {
                return Err(FitStatus::MinBeyondBaseline { index: min_loc });
            }
            (max_loc, min_loc)
        }
        Polarity::ANegative => {
            if min_loc > a_last {
                return Err(FitStatus::MinBeyondBaseline { index: min_loc });
            }
            if max_loc < b_first {
                return Err(FitStatus::MaxBeyondBaseline { index: max_loc });
            }
            (min_loc, max_loc)
        }
    };

    let hinted_peaks = hints.filter(|h| h.peaks.len() >= 2);
    let hinted_window = |slot: usize| hinted_peaks.map(|h| h.peaks[slot].indices(x));
    let a = fit_horn(
        &drift.corrected,
        &spline,
        Horn {
            beam: Beam::A,
            sign: polarity.sign(Beam::A),
            centre: a_centre,
            block: &baseline.left,
            hinted: hinted_window(0),
        },
        geometry.hpbw,
        config,
        logger,
    );
    let b = fit_horn(
        &drift.corrected,
        &spline,
        Horn {
            beam: Beam::B,
            sign: polarity.sign(Beam::B),
            centre: b_centre,
            block: &baseline.right,
            hinted: hinted_window(1),
        },
        geometry.hpbw,
        config,
        logger,
    );

    Ok(DualBeamFit {
        baseline,
        drift,
        spline,
        polarity,
        a,
        b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::baseline::IndexRange;
    use crate::scan_interface::OffsetRange;
    use crate::test_support::twin_horn_trace;

    const GEOMETRY: DualBeamGeometry = DualBeamGeometry {
        hpbw: 0.45,
        fnbw: 1.2,
        factor: 0.6,
    };

    fn horns(a: f64, b: f64) -> Trace {
        let (x, y) = twin_horn_trace(a, b, 0.6, 0.45, -1.5, 1.5, 901);
        let y = x.iter().zip(y).map(|(&v, y)| y + 0.05 * v + 0.1).collect();
        Trace::new(x, y).unwrap()
    }

    fn run(trace: &Trace, hints: Option<&AutoFitHints>) -> Result<DualBeamFit, FitStatus> {
        let config = PipelineConfig::default();
        fit_dual_beam(
            trace,
            &SplineSmoother::from_config(&config),
            &GEOMETRY,
            hints,
            &config,
            &LogManager::new(),
        )
    }

    #[test]
    fn a_positive_horns_are_fitted() {
        let fit = run(&horns(1.0, -1.0), None).unwrap();
        assert_eq!(fit.polarity, Polarity::APositive);
        assert!((fit.a.amplitude - 1.0).abs() < 0.03, "{}", fit.a.amplitude);
        assert!((fit.b.amplitude + 1.0).abs() < 0.03, "{}", fit.b.amplitude);
        assert!((fit.a.position + 0.6).abs() < 0.01);
        assert!((fit.b.position - 0.6).abs() < 0.01);
        assert!(fit.a.status.is_ok() && fit.b.status.is_ok());
        assert!(fit.drift.model.rms < 1e-3);
    }

    #[test]
    fn mirrored_input_flips_polarity() {
        let fit = run(&horns(-1.0, 1.0), None).unwrap();
        assert_eq!(fit.polarity, Polarity::ANegative);
        assert!((fit.a.amplitude + 1.0).abs() < 0.03);
        assert!((fit.b.amplitude - 1.0).abs() < 0.03);
        assert!((fit.a.position + 0.6).abs() < 0.01);
    }

    #[test]
    fn horn_windows_stay_off_the_baseline() {
        let fit = run(&horns(0.8, -0.8), None).unwrap();
        for peak in [&fit.a, &fit.b] {
            assert!(peak.window.iter().all(|&i| !fit.baseline.contains(i)));
        }
        assert_eq!(fit.baseline.left.len(), 36);
        assert_eq!(fit.baseline.right.len(), 36);
    }

    #[test]
    fn polarity_follows_the_extreme_nearer_zero() {
        let spline = [0.0, -0.05, 0.9, 0.2, -0.9];
        assert_eq!(determine_polarity(&spline, &[0, 1, 2, 3]), Some(Polarity::APositive));
        assert_eq!(determine_polarity(&spline, &[3, 4]), Some(Polarity::ANegative));
        assert_eq!(determine_polarity(&spline, &[]), None);
    }

    #[test]
    fn max_on_wrong_half_is_fatal() {
        // both horns positive, the brighter one on the B side
        let err = run(&horns(0.5, 1.0), None).unwrap_err();
        assert!(matches!(err, FitStatus::MaxBeyondBaseline { .. }));
    }

    #[test]
    fn overlap_shifts_away_from_the_block() {
        let left = BaselineBlock::from_ranges(BlockSide::Left, [IndexRange::new(0, 20)]);
        let window: Vec<usize> = (10..40).collect();
        let (moved, shift) = resolve_overlap(&window, &left, 0.8, 100).unwrap();
        assert_eq!(shift, 10);
        assert_eq!(moved.first(), Some(&20));
        assert_eq!(moved.len(), 30);

        let right = BaselineBlock::from_ranges(BlockSide::Right, [IndexRange::new(80, 100)]);
        let window: Vec<usize> = (60..90).collect();
        let (moved, shift) = resolve_overlap(&window, &right, 0.8, 100).unwrap();
        assert_eq!(shift, 10);
        assert_eq!(moved.last(), Some(&79));
    }

    #[test]
    fn shallow_overlap_is_trimmed() {
        let left = BaselineBlock::from_ranges(BlockSide::Left, [IndexRange::new(0, 20)]);
        let window: Vec<usize> = (18..40).collect();
        let (trimmed, shift) = resolve_overlap(&window, &left, 0.8, 100).unwrap();
        assert_eq!(shift, 0);
        assert_eq!(trimmed.first(), Some(&20));
        assert!(resolve_overlap(&(30..40).collect::<Vec<_>>(), &left, 0.8, 100).is_none());
    }

    #[test]
    fn window_inside_block_moves_clear_of_it() {
        let left = BaselineBlock::from_ranges(BlockSide::Left, [IndexRange::new(0, 20)]);
        let window: Vec<usize> = (5..15).collect();
        let (moved, shift) = resolve_overlap(&window, &left, 0.8, 100).unwrap();
        assert_eq!(shift, 15);
        assert_eq!(moved, (20..30).collect::<Vec<_>>());

        let right = BaselineBlock::from_ranges(BlockSide::Right, [IndexRange::new(70, 100)]);
        let window: Vec<usize> = (75..85).collect();
        let (moved, shift) = resolve_overlap(&window, &right, 0.8, 100).unwrap();
        assert_eq!(shift, 15);
        assert!(moved.iter().all(|&i| !right.contains(i)));
        assert_eq!(moved.last(), Some(&69));
    }

    #[test]
    fn hinted_windows_bypass_the_search() {
        let hints = AutoFitHints {
            baseline: vec![OffsetRange::new(-1.5, -1.3), OffsetRange::new(1.3, 1.5)],
            peaks: vec![OffsetRange::new(-0.75, -0.45), OffsetRange::new(0.45, 0.75)],
        };
        let trace = horns(1.0, -1.0);
        let fit = run(&trace, Some(&hints)).unwrap();
        let a_bounds = fit.a.window_bounds().unwrap();
        assert!(trace.offsets()[a_bounds.0] >= -0.75);
        assert!(trace.offsets()[a_bounds.1] <= -0.45);
        assert!((fit.a.amplitude - 1.0).abs() < 0.03);
        assert!((fit.b.amplitude + 1.0).abs() < 0.03);
    }

    #[test]
    fn too_short_trace_cannot_be_splined() {
        let (x, y) = twin_horn_trace(1.0, -1.0, 0.6, 0.45, -1.5, 1.5, 60);
        let trace = Trace::new(x, y).unwrap();
        let config = PipelineConfig {
            anchor_points: 40,
            ..PipelineConfig::default()
        };
        let err = fit_dual_beam(
            &trace,
            &SplineSmoother::from_config(&config),
            &GEOMETRY,
            None,
            &config,
            &LogManager::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), 38);
    }
}
