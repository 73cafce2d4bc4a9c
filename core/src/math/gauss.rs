use crate::math::matrix::MatrixHelper;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// sigma = hpbw * HPBW_TO_SIGMA
const HPBW_TO_SIGMA: f64 = 0.424_660_900_144_009_5;
const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-12;

/// Gaussian beam on a linear pedestal, parameterised by its half-power width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianLinear {
    pub amplitude: f64,
    pub centre: f64,
    pub hpbw: f64,
    pub slope: f64,
    pub intercept: f64,
}

impl GaussianLinear {
    pub fn eval(&self, x: f64) -> f64 {
        let sigma = self.hpbw * HPBW_TO_SIGMA;
        let d = x - self.centre;
        self.amplitude * (-(d * d) / (2.0 * sigma * sigma)).exp() + self.slope * x + self.intercept
    }

    fn params(&self) -> [f64; 5] {
        [
            self.amplitude,
            self.centre,
            self.hpbw,
            self.slope,
            self.intercept,
        ]
    }

    fn from_params(p: &[f64]) -> Self {
        Self {
            amplitude: p[0],
            centre: p[1],
            hpbw: p[2],
            slope: p[3],
            intercept: p[4],
        }
    }

    fn cost(&self, x: &[f64], y: &[f64]) -> f64 {
        x.iter()
            .zip(y)
            .map(|(&xi, &yi)| (yi - self.eval(xi)).powi(2))
            .sum()
    }

    fn jacobian(&self, x: &[f64]) -> Array2<f64> {
        let sigma = self.hpbw * HPBW_TO_SIGMA;
        let s2 = sigma * sigma;
        Array2::from_shape_fn((x.len(), 5), |(i, j)| {
            let d = x[i] - self.centre;
            let e = (-(d * d) / (2.0 * s2)).exp();
            match j {
                0 => e,
                1 => self.amplitude * e * d / s2,
                2 => self.amplitude * e * d * d / (s2 * sigma) * HPBW_TO_SIGMA,
                3 => x[i],
                _ => 1.0,
            }
        })
    }

    /// Levenberg-Marquardt fit starting from `initial`.
    ///
    /// Returns `None` when the fit diverges or the data cannot constrain it.
    pub fn fit(x: &[f64], y: &[f64], initial: GaussianLinear) -> Option<GaussianLinear> {
        if x.len() != y.len() || x.len() < 5 || initial.hpbw == 0.0 {
            return None;
        }
        let mut current = initial;
        let mut cost = current.cost(x, y);
        if !cost.is_finite() {
            return None;
        }
        let mut lambda = 1e-3;

        for _ in 0..MAX_ITERATIONS {
            let jac = current.jacobian(x);
            let residuals =
                Array1::from_iter(x.iter().zip(y).map(|(&xi, &yi)| yi - current.eval(xi)));
            let jtj = jac.t().dot(&jac);
            let jtr = jac.t().dot(&residuals);

            let mut damped = jtj.clone();
            for k in 0..5 {
                damped[[k, k]] += lambda * jtj[[k, k]].max(1e-12);
            }
            let step = match MatrixHelper::solve_square(damped.view(), jtr.view()) {
                Some(step) => step,
                None => {
                    lambda *= 10.0;
                    if lambda > 1e12 {
                        break;
                    }
                    continue;
                }
            };

            let params = current.params();
            let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();
            let candidate = GaussianLinear::from_params(&trial);
            let trial_cost = candidate.cost(x, y);

            if trial_cost.is_finite() && trial_cost < cost {
                let improvement = cost - trial_cost;
                current = candidate;
                cost = trial_cost;
                lambda = (lambda / 10.0).max(1e-12);
                if improvement <= TOLERANCE * cost.max(TOLERANCE) {
                    break;
                }
            } else {
                lambda *= 10.0;
                if lambda > 1e12 {
                    break;
                }
            }
        }

        current.hpbw = current.hpbw.abs();
        let valid = current.params().iter().all(|v| v.is_finite()) && current.hpbw > 0.0;
        valid.then_some(current)
    }
}
