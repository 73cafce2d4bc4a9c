use crate::math::gauss::GaussianLinear;

pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + i as f64 * step).collect()
}

pub fn beam(amplitude: f64, centre: f64, hpbw: f64, slope: f64, intercept: f64) -> GaussianLinear {
    GaussianLinear {
        amplitude,
        centre,
        hpbw,
        slope,
        intercept,
    }
}

/// Single beam sampled over `start..=end`.
pub fn beam_trace(model: &GaussianLinear, start: f64, end: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
    let x = linspace(start, end, n);
    let y = x.iter().map(|&v| model.eval(v)).collect();
    (x, y)
}

/// Twin-horn response: `a_amplitude` at `-separation`, `b_amplitude` at `+separation`.
pub fn twin_horn_trace(
    a_amplitude: f64,
    b_amplitude: f64,
    separation: f64,
    hpbw: f64,
    start: f64,
    end: f64,
    n: usize,
) -> (Vec<f64>, Vec<f64>) {
    let a = beam(a_amplitude, -separation, hpbw, 0.0, 0.0);
    let b = beam(b_amplitude, separation, hpbw, 0.0, 0.0);
    let x = linspace(start, end, n);
    let y = x.iter().map(|&v| a.eval(v) + b.eval(v)).collect();
    (x, y)
}

/// `amplitude * (sin u / u)^2` with first nulls at `centre +/- null_half_width`.
pub fn sinc_squared(amplitude: f64, centre: f64, null_half_width: f64, x: f64) -> f64 {
    let u = std::f64::consts::PI * (x - centre) / null_half_width;
    if u.abs() < 1e-12 {
        amplitude
    } else {
        amplitude * (u.sin() / u).powi(2)
    }
}
