use crate::math::gauss::GaussianLinear;
use crate::math::poly::Polynomial;
use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineConfig, Trace};
use crate::processing::baseline::{local_extrema, BaselineSelection};
use crate::scan_interface::{Beam, PeakFitResult};
use crate::status::FitStatus;
use crate::telemetry::log::LogManager;

/// Which extreme of the quadratic is the peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakSign {
    Maximum,
    Minimum,
}

impl PeakSign {
    fn factor(self) -> f64 {
        match self {
            PeakSign::Maximum => 1.0,
            PeakSign::Minimum => -1.0,
        }
    }
}

/// Quadratic fitted over a window of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticFit {
    pub polynomial: Polynomial,
    pub window: Vec<usize>,
    pub model: Vec<f64>,
    pub residuals: Vec<f64>,
    pub rms: f64,
    pub amplitude: f64,
    pub position: f64,
    /// The extreme lies inside the window rather than on an end sample.
    pub peaked: bool,
}

impl QuadraticFit {
    pub fn into_result(self, beam: Beam) -> PeakFitResult {
        PeakFitResult {
            beam,
            amplitude: self.amplitude,
            position: self.position,
            error: self.rms,
            residuals: self.residuals,
            model: self.model,
            window: self.window,
            status: FitStatus::Ok,
            warnings: Vec::new(),
            centre: None,
            signal_to_noise: None,
        }
    }
}

pub fn fit_quadratic(trace: &Trace, window: &[usize], sign: PeakSign) -> Option<QuadraticFit> {
    if window.len() < 3 {
        return None;
    }
    let sub = trace.select(window);
    let polynomial = Polynomial::fit(sub.offsets(), sub.amplitudes(), 2)?;
    let model = polynomial.eval_many(sub.offsets());
    let weighted: Vec<f64> = model.iter().map(|m| m * sign.factor()).collect();
    let extreme = StatsHelper::argmax(&weighted)?;
    let peaked = extreme > 0 && extreme < model.len() - 1;

    let (position, amplitude) = match polynomial.vertex() {
        Some(vertex) if peaked => vertex,
        _ => (sub.offsets()[extreme], model[extreme]),
    };
    let residuals = StatsHelper::residuals(sub.amplitudes(), &model);
    let rms = StatsHelper::rms(&residuals);

    Some(QuadraticFit {
        polynomial,
        window: window.to_vec(),
        model,
        residuals,
        rms,
        amplitude,
        position,
        peaked,
    })
}

/// Everything the single-beam peak fit needs from the earlier stages.
#[derive(Debug, Clone, Copy)]
pub struct PeakFitInput<'a> {
    pub corrected: &'a Trace,
    /// Spline of the corrected trace.
    pub spline: &'a [f64],
    pub probe_centre: f64,
    pub hpbw: f64,
    pub half_fnbw: f64,
    pub baseline: &'a BaselineSelection,
}

fn refine_centre(input: &PeakFitInput, peak_index: usize) -> Option<f64> {
    let x = input.corrected.offsets();
    let main_beam: Vec<usize> = (0..x.len())
        .filter(|&i| (x[i] - input.probe_centre).abs() <= input.half_fnbw)
        .collect();
    let (&first, &last) = (main_beam.first()?, main_beam.last()?);
    let sub = input.corrected.select(&main_beam);
    let initial = GaussianLinear {
        amplitude: input.spline[peak_index],
        centre: x[peak_index],
        hpbw: input.hpbw,
        slope: 0.0,
        intercept: 0.0,
    };
    let refined = GaussianLinear::fit(sub.offsets(), sub.amplitudes(), initial)?;
    (refined.centre >= x[first] && refined.centre <= x[last]).then_some(refined.centre)
}

/// Fit the main beam of a drift-corrected single-beam trace.
pub fn fit_peak(
    input: &PeakFitInput,
    config: &PipelineConfig,
    logger: &LogManager,
) -> Result<PeakFitResult, FitStatus> {
    let trace = input.corrected;
    let x = trace.offsets();
    let y = trace.amplitudes();
    let n = trace.len();

    let max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = y.iter().cloned().fold(f64::INFINITY, f64::min);
    if min.abs() > max {
        return Err(FitStatus::MinExceedsMax { min, max });
    }

    let peak_index = StatsHelper::argmax(input.spline).ok_or(FitStatus::NoCorrectedData)?;
    if peak_index == 0 || peak_index == n - 1 {
        return Err(FitStatus::PeakAtScanEdge { index: peak_index });
    }
    let spline_max = input.spline[peak_index];

    let centre = refine_centre(input, peak_index).ok_or(FitStatus::MainBeamMaxMissing)?;
    logger.debug(&format!(
        "main beam centre {:.4} (probe {:.4})",
        centre, input.probe_centre
    ));

    let half_hpbw = input.hpbw / 2.0;
    let candidate: Vec<usize> = (0..n)
        .filter(|&i| (x[i] - centre).abs() <= half_hpbw)
        .collect();
    if candidate.is_empty() {
        return Err(FitStatus::MainBeamNotFound);
    }
    let select = |cut: f64| -> Vec<usize> {
        candidate
            .iter()
            .copied()
            .filter(|&i| input.spline[i] >= cut * spline_max && !input.baseline.contains(i))
            .collect()
    };

    let cut = if input.baseline.sidelobes {
        config.sidelobe_peak_cut
    } else {
        config.peak_cut
    };
    let subset = select(cut);
    if subset.is_empty() {
        return Err(FitStatus::MainBeamNotFound);
    }
    if (subset.len() as f64) < config.noisy_fraction * candidate.len() as f64 {
        return Err(FitStatus::PeakTooNoisy {
            selected: subset.len(),
            window: candidate.len(),
        });
    }

    let mut refit_around_extrema = false;
    let mut fit = fit_quadratic(trace, &subset, PeakSign::Maximum);
    if !fit.as_ref().is_some_and(|f| f.peaked) && cut > config.sidelobe_peak_cut {
        logger.debug("quadratic not peaked, widening to the sidelobe cut");
        fit = fit_quadratic(trace, &select(config.sidelobe_peak_cut), PeakSign::Maximum);
    }
    if !fit.as_ref().is_some_and(|f| f.peaked) {
        logger.warn("quadratic still not peaked, refitting around nearest local maximum");
        let (_, maxima) = local_extrema(input.spline);
        let nearest = maxima
            .iter()
            .copied()
            .min_by(|&a, &b| (x[a] - centre).abs().total_cmp(&(x[b] - centre).abs()))
            .ok_or(FitStatus::PeakNotLocated)?;
        let window: Vec<usize> = (0..n)
            .filter(|&i| (x[i] - x[nearest]).abs() <= half_hpbw && !input.baseline.contains(i))
            .collect();
        fit = fit_quadratic(trace, &window, PeakSign::Maximum);
        refit_around_extrema = true;
    }
    let fit = match fit {
        Some(fit) if fit.peaked => fit,
        _ => return Err(FitStatus::PeakNotLocated),
    };

    let (base_first, base_last) = input.baseline.extent().ok_or(FitStatus::BaselineNotFound)?;
    let (start, end) = (fit.window[0], fit.window[fit.window.len() - 1]);
    if start < base_first || end > base_last {
        return Err(FitStatus::PeakBeyondBaseline { start, end });
    }

    logger.record(&format!(
        "peak {:.5} +/- {:.5} at {:.4} over {} samples",
        fit.amplitude,
        fit.rms,
        fit.position,
        fit.window.len()
    ));
    let mut result = fit.into_result(Beam::Main);
    if refit_around_extrema {
        result.degrade(FitStatus::PeakRefitAroundExtrema);
    }
    Ok(result)
}
