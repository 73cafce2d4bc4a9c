pub mod gauss;
pub mod matrix;
pub mod poly;
pub mod stats;

pub use gauss::GaussianLinear;
pub use matrix::MatrixHelper;
pub use poly::Polynomial;
pub use stats::StatsHelper;
