use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};

const SVD_EPS: f64 = 1e-12;

pub struct MatrixHelper;

impl MatrixHelper {
    /// Least-squares solution of `design * coeffs = rhs` via SVD.
    pub fn least_squares(design: ArrayView2<f64>, rhs: ArrayView1<f64>) -> Option<Array1<f64>> {
        let (rows, cols) = design.dim();
        if rows == 0 || cols == 0 || rows != rhs.len() {
            return None;
        }
        let a = DMatrix::from_fn(rows, cols, |i, j| design[[i, j]]);
        let b = DVector::from_iterator(rows, rhs.iter().copied());
        let solution = a.svd(true, true).solve(&b, SVD_EPS).ok()?;
        if solution.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Array1::from_iter(solution.iter().copied()))
    }

    /// Solve a square system with LU decomposition.
    pub fn solve_square(lhs: ArrayView2<f64>, rhs: ArrayView1<f64>) -> Option<Array1<f64>> {
        let (rows, cols) = lhs.dim();
        if rows != cols || rows != rhs.len() {
            return None;
        }
        let a = DMatrix::from_fn(rows, cols, |i, j| lhs[[i, j]]);
        let b = DVector::from_iterator(rows, rhs.iter().copied());
        let solution = a.lu().solve(&b)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Array1::from_iter(solution.iter().copied()))
    }
}
