pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// RMS of `model - data`, pairwise.
    pub fn rms_between(model: &[f64], data: &[f64]) -> f64 {
        let residuals = Self::residuals(model, data);
        Self::rms(&residuals)
    }

    pub fn residuals(model: &[f64], data: &[f64]) -> Vec<f64> {
        model.iter().zip(data).map(|(m, d)| m - d).collect()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population standard deviation.
    pub fn std(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(samples);
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        var.sqrt()
    }

    /// Index of the first maximum, ignoring NaN.
    pub fn argmax(samples: &[f64]) -> Option<usize> {
        samples
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
    }

    /// Index of the first minimum, ignoring NaN.
    pub fn argmin(samples: &[f64]) -> Option<usize> {
        samples
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
                Some((_, b)) if b <= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn rms_handles_single_value() {
        assert_eq!(StatsHelper::rms(&[4.0]), 4.0);
        assert_eq!(StatsHelper::rms_between(&[5.0, 1.0], &[1.0, 5.0]), 4.0);
    }

    #[test]
    fn std_is_population_spread() {
        assert_eq!(StatsHelper::std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
    }

    #[test]
    fn argmax_keeps_first_of_ties() {
        assert_eq!(StatsHelper::argmax(&[1.0, 3.0, f64::NAN, 3.0]), Some(1));
        assert_eq!(StatsHelper::argmin(&[1.0, -3.0, -3.0]), Some(1));
        assert_eq!(StatsHelper::argmax(&[]), None);
    }
}
