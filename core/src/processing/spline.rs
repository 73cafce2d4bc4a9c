use crate::math::matrix::MatrixHelper;
use crate::prelude::PipelineConfig;
use crate::status::FitStatus;
use ndarray::{Array1, Array2};

/// Spline estimate of a trace. When the trace is too short to spline the
/// raw amplitudes are passed through with a `TooFewPointsToSpline` status.
#[derive(Debug, Clone, PartialEq)]
pub struct Smoothed {
    pub values: Vec<f64>,
    pub status: FitStatus,
}

impl Smoothed {
    pub fn is_fitted(&self) -> bool {
        self.status.is_ok()
    }
}

/// Least-squares B-spline smoother with knots evenly spread in index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplineSmoother {
    anchor_points: usize,
    order: usize,
}

impl SplineSmoother {
    pub fn new(anchor_points: usize, order: usize) -> Self {
        let anchor_points = anchor_points.max(1);
        Self {
            anchor_points,
            order: order.clamp(1, anchor_points),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.anchor_points, config.spline_order)
    }

    pub fn anchor_points(&self) -> usize {
        self.anchor_points
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Traces of this length or shorter are not splined.
    pub fn sample_limit(&self) -> usize {
        2 * self.anchor_points
    }

    pub fn smooth(&self, amplitudes: &[f64]) -> Smoothed {
        let n = amplitudes.len();
        let unsplined = || Smoothed {
            values: amplitudes.to_vec(),
            status: FitStatus::TooFewPointsToSpline {
                samples: n,
                required: self.sample_limit(),
            },
        };
        if n <= self.sample_limit() {
            return unsplined();
        }

        let knots = self.knot_vector(n);
        let basis_count = knots.len() - self.order - 1;
        let mut design = Array2::<f64>::zeros((n, basis_count));
        for i in 0..n {
            let x = (i + 1) as f64;
            let span = find_span(&knots, basis_count, x);
            let row = basis_row(&knots, span, self.order, x);
            for (r, value) in row.iter().enumerate() {
                design[[i, span - self.order + r]] = *value;
            }
        }

        let rhs = Array1::from_iter(amplitudes.iter().copied());
        match MatrixHelper::least_squares(design.view(), rhs.view()) {
            Some(coeffs) => Smoothed {
                values: design.dot(&coeffs).to_vec(),
                status: FitStatus::Ok,
            },
            None => unsplined(),
        }
    }

    /// Clamped knot vector over `1..=n` with `anchor_points - 1` interior knots.
    fn knot_vector(&self, n: usize) -> Vec<f64> {
        let k = self.anchor_points;
        let mut knots = vec![1.0; self.order + 1];
        knots.extend((1..k).map(|i| (i * n / k) as f64));
        knots.extend(std::iter::repeat(n as f64).take(self.order + 1));
        knots
    }
}

/// Knot span containing `x`; the last sample belongs to the final span.
fn find_span(knots: &[f64], basis_count: usize, x: f64) -> usize {
    if x >= knots[basis_count] {
        return basis_count - 1;
    }
    let mut span = basis_count - 1;
    while span > 0 && knots[span] > x {
        span -= 1;
    }
    span
}

/// Non-zero basis functions on `span` by the Cox-de Boor recursion.
fn basis_row(knots: &[f64], span: usize, order: usize, x: f64) -> Vec<f64> {
    let mut values = vec![0.0; order + 1];
    let mut left = vec![0.0; order + 1];
    let mut right = vec![0.0; order + 1];
    values[0] = 1.0;
    for j in 1..=order {
        left[j] = x - knots[span + 1 - j];
        right[j] = knots[span + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { values[r] / denom };
            values[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        values[j] = saved;
    }
    values
}
