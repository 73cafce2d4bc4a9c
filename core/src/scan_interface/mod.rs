pub mod metadata;
pub mod result;

pub use metadata::{
    AutoFitHints, BaselineMode, BeamMode, DriftScan, Frontend, OffsetRange, Polarization,
    ScanChannel, ScanMetadata, ScanPosition,
};
pub use result::{
    Beam, CalibrationRecord, ChannelResult, CleaningStats, DriftModel, PeakFitResult, ScanResult,
};
