pub mod calibration;
pub mod orchestrator;

pub use calibration::{Calibrator, Measurement, PointingCalibrator};
pub use orchestrator::{DualBeamFitter, ScanOrchestrator, SingleBeamFitter};
