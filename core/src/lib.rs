//! Signal-processing and peak-fitting core for single-dish drift scans.
//!
//! A scan's traces run through RFI removal, baseline location, drift
//! correction and a quadratic peak fit (single beam) or a twin-horn fit
//! (dual beam). Every degraded or failed stage is reported as a
//! [`FitStatus`] on the result rather than as an error.

pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod scan_interface;
pub mod status;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use pipeline::ScanOrchestrator;
pub use prelude::{ChannelFitter, PipelineConfig, PipelineError, PipelineResult, Trace};
pub use status::FitStatus;
