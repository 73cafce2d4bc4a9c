pub mod baseline;
pub mod drift;
pub mod dual_beam;
pub mod peak;
pub mod rfi;
pub mod spline;

pub use baseline::{BaselineBlock, BaselineSelection, BlockSide, IndexRange};
pub use drift::{correct_drift, DriftCorrection};
pub use dual_beam::{fit_dual_beam, DualBeamFit, DualBeamGeometry, Polarity};
pub use peak::{fit_peak, PeakFitInput};
pub use rfi::{clean_rfi, CleanedTrace};
pub use spline::{Smoothed, SplineSmoother};
