use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineConfig, Trace};
use crate::processing::spline::SplineSmoother;
use crate::scan_interface::CleaningStats;
use crate::status::FitStatus;
use crate::telemetry::log::LogManager;

/// Trace with RFI spikes removed, and the spline it was judged against.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTrace {
    pub trace: Trace,
    pub spline: Vec<f64>,
    pub stats: CleaningStats,
}

/// Iteratively drop samples whose spline residual exceeds `rfi_cut * rms`.
///
/// Each pass re-splines the surviving samples; the loop stops on the first
/// pass that does not strictly lower the rms, or after `max_rfi_iterations`.
pub fn clean_rfi(
    trace: &Trace,
    smoother: &SplineSmoother,
    config: &PipelineConfig,
    logger: &LogManager,
) -> Result<CleanedTrace, FitStatus> {
    let smoothed = smoother.smooth(trace.amplitudes());
    if !smoothed.is_fitted() {
        return Err(smoothed.status);
    }

    let mut best = trace.clone();
    let mut spline = smoothed.values;
    let mut residuals = StatsHelper::residuals(&spline, best.amplitudes());
    let mut rms = StatsHelper::rms(&residuals);
    let rms_before = rms;
    let mut iterations = 0;

    while iterations < config.max_rfi_iterations {
        let limit = config.rfi_cut * rms;
        let keep: Vec<usize> = residuals
            .iter()
            .enumerate()
            .filter(|(_, r)| r.abs() <= limit)
            .map(|(i, _)| i)
            .collect();
        if keep.len() == best.len() {
            break;
        }
        if keep.is_empty() {
            return Err(FitStatus::EmptyAfterCleaning);
        }

        let candidate = best.select(&keep);
        let candidate_spline = smoother.smooth(candidate.amplitudes());
        if !candidate_spline.is_fitted() {
            logger.debug("stopping RFI removal, too few samples left to spline");
            break;
        }
        let candidate_residuals =
            StatsHelper::residuals(&candidate_spline.values, candidate.amplitudes());
        let candidate_rms = StatsHelper::rms(&candidate_residuals);
        iterations += 1;

        if candidate_rms < rms {
            logger.debug(&format!(
                "RFI pass {}: removed {} samples, rms {:.5} -> {:.5}",
                iterations,
                best.len() - candidate.len(),
                rms,
                candidate_rms
            ));
            best = candidate;
            spline = candidate_spline.values;
            residuals = candidate_residuals;
            rms = candidate_rms;
        } else {
            break;
        }
    }

    let stats = CleaningStats {
        rms_before,
        rms_after: rms,
        points_removed: trace.len() - best.len(),
        iterations,
    };
    logger.record(&format!(
        "RFI removal: {} of {} samples removed, rms {:.5} -> {:.5}",
        stats.points_removed,
        trace.len(),
        stats.rms_before,
        stats.rms_after
    ));

    Ok(CleanedTrace {
        trace: best,
        spline,
        stats,
    })
}
