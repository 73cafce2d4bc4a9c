use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_2, PI};

/// First-null half width of a uniformly illuminated aperture, in HPBW units.
const SINC_NULL_PER_HPBW: f64 = 1.0 / 0.886;

/// Main-beam shape used for synthetic scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamShape {
    Gaussian,
    /// `(sin u / u)^2`, with real nulls and sidelobes.
    #[default]
    SincSquared,
}

impl BeamShape {
    /// Normalised response at `offset` from the beam centre.
    pub fn response(&self, hpbw: f64, offset: f64) -> f64 {
        match self {
            BeamShape::Gaussian => (-4.0 * LN_2 * offset * offset / (hpbw * hpbw)).exp(),
            BeamShape::SincSquared => {
                let u = PI * offset / (hpbw * SINC_NULL_PER_HPBW);
                if u.abs() < 1e-12 {
                    1.0
                } else {
                    (u.sin() / u).powi(2)
                }
            }
        }
    }
}

/// Gaussian attenuation of a beam observed `offset` away from the source in
/// the cross-scan direction.
pub fn cross_scan_gain(hpbw: f64, offset: f64) -> f64 {
    BeamShape::Gaussian.response(hpbw, offset)
}
