/// Five-number summary with Tukey whiskers (1.5 × IQR, clipped to the data).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStats {
    pub n: usize,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
}

impl BoxStats {
    /// `None` when no finite value is present.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let low_fence = q1 - 1.5 * iqr;
        let high_fence = q3 + 1.5 * iqr;

        let whisker_low = sorted
            .iter()
            .copied()
            .find(|v| *v >= low_fence)
            .unwrap_or(q1);
        let whisker_high = sorted
            .iter()
            .rev()
            .copied()
            .find(|v| *v <= high_fence)
            .unwrap_or(q3);

        Some(Self {
            n: sorted.len(),
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
        })
    }
}

/// Linear-interpolated quantile of already sorted values.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartiles_interpolate_linearly() {
        let stats = BoxStats::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(stats.n, 5);
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.whisker_low, 1.0);
        assert_eq!(stats.whisker_high, 5.0);
    }

    #[test]
    fn outliers_fall_outside_whiskers() {
        let mut values: Vec<f64> = (1..=20).map(f64::from).collect();
        values.push(500.0);
        let stats = BoxStats::from_values(&values).unwrap();
        assert_eq!(stats.whisker_high, 20.0);
        assert_eq!(stats.n, 21);
    }

    #[test]
    fn non_finite_values_are_ignored() {
        assert!(BoxStats::from_values(&[f64::NAN]).is_none());
        let stats = BoxStats::from_values(&[f64::NAN, 2.0]).unwrap();
        assert_eq!(stats.n, 1);
        assert_eq!(stats.median, 2.0);
    }
}
