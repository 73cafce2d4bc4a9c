use crate::math::poly::Polynomial;
use crate::math::stats::StatsHelper;
use crate::prelude::Trace;
use crate::scan_interface::DriftModel;
use crate::status::FitStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct DriftCorrection {
    pub model: DriftModel,
    pub corrected: Trace,
}

/// Fit a polynomial of `order` to the baseline samples and subtract it
/// from the whole trace.
pub fn correct_drift(
    trace: &Trace,
    baseline: &[usize],
    order: usize,
) -> Result<DriftCorrection, FitStatus> {
    if baseline.len() <= order || baseline.iter().any(|&i| i >= trace.len()) {
        return Err(FitStatus::BaselineNotFound);
    }
    let base = trace.select(baseline);
    let poly = Polynomial::fit(base.offsets(), base.amplitudes(), order)
        .ok_or(FitStatus::BaselineNotFound)?;

    let base_model = poly.eval_many(base.offsets());
    let residuals = StatsHelper::residuals(base.amplitudes(), &base_model);
    let rms = StatsHelper::rms(&residuals);

    let corrected: Vec<f64> = trace
        .offsets()
        .iter()
        .zip(trace.amplitudes())
        .map(|(&x, &y)| y - poly.eval(x))
        .collect();
    let corrected = trace
        .with_amplitudes(corrected)
        .map_err(|_| FitStatus::NoCorrectedData)?;

    Ok(DriftCorrection {
        model: DriftModel {
            coefficients: poly.coefficients().to_vec(),
            residuals,
            rms,
            baseline_indices: baseline.to_vec(),
        },
        corrected,
    })
}
