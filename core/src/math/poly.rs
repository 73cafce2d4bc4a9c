use crate::math::matrix::MatrixHelper;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Polynomial with coefficients in ascending powers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    /// Least-squares fit of the given degree. Needs more samples than the degree.
    pub fn fit(x: &[f64], y: &[f64], degree: usize) -> Option<Self> {
        if x.len() != y.len() || x.len() <= degree {
            return None;
        }
        let design = Array2::from_shape_fn((x.len(), degree + 1), |(i, j)| x[i].powi(j as i32));
        let rhs = Array1::from_iter(y.iter().copied());
        let coeffs = MatrixHelper::least_squares(design.view(), rhs.view())?;
        Some(Self::new(coeffs.to_vec()))
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }

    /// Turning point of a quadratic, as `(x, y)`.
    pub fn vertex(&self) -> Option<(f64, f64)> {
        if self.coefficients.len() != 3 || self.coefficients[2] == 0.0 {
            return None;
        }
        let x = -self.coefficients[1] / (2.0 * self.coefficients[2]);
        Some((x, self.eval(x)))
    }
}
