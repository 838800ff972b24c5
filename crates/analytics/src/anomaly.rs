//! Outlier detection over a numeric column.
//!
//! Two methods: a robust IQR fence and a classic z-score test. Sensitivity is
//! a strictness multiplier (the fence factor `k` for IQR, the z threshold for
//! z-score), not a probability.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    High,
    Low,
}

/// An anomalous point, addressed by its position in the input slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    /// IQR: distance beyond the fence in IQR units. Z-score: the |z| value.
    pub score: f64,
    pub label: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Iqr,
    Zscore,
}

/// Flag outliers in `values`. Returns an empty vec when the series is too
/// short or has no spread; only the caller decides whether that is an error.
pub fn detect_anomalies(values: &[f64], method: Method, sensitivity: f64) -> Vec<Anomaly> {
    match method {
        Method::Iqr => detect_iqr(values, sensitivity),
        Method::Zscore => detect_zscore(values, sensitivity),
    }
}

fn detect_iqr(values: &[f64], k: f64) -> Vec<Anomaly> {
    if values.len() < 4 {
        return vec![];
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    if iqr == 0.0 {
        return vec![];
    }

    let lower = q1 - k * iqr;
    let upper = q3 + k * iqr;

    values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| {
            if v > upper {
                Some(Anomaly {
                    index: i,
                    score: (v - upper) / iqr,
                    label: Direction::High,
                })
            } else if v < lower {
                Some(Anomaly {
                    index: i,
                    score: (lower - v) / iqr,
                    label: Direction::Low,
                })
            } else {
                None
            }
        })
        .collect()
}

fn detect_zscore(values: &[f64], threshold: f64) -> Vec<Anomaly> {
    let n = values.len();
    if n < 2 {
        return vec![];
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return vec![];
    }

    values
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| {
            let z = (v - mean) / stddev;
            if z.abs() > threshold {
                Some(Anomaly {
                    index: i,
                    score: z.abs(),
                    label: if z > 0.0 { Direction::High } else { Direction::Low },
                })
            } else {
                None
            }
        })
        .collect()
}

/// Linear-interpolated quantile over a pre-sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_series_flags_nothing() {
        let values = vec![5.0; 20];
        assert!(detect_anomalies(&values, Method::Iqr, 1.5).is_empty());
        assert!(detect_anomalies(&values, Method::Zscore, 2.0).is_empty());
    }

    #[test]
    fn test_iqr_flags_spike() {
        let mut values: Vec<f64> = (0..20).map(|i| 10.0 + (i % 3) as f64).collect();
        values.push(100.0);

        let anomalies = detect_anomalies(&values, Method::Iqr, 1.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].index, 20);
        assert_eq!(anomalies[0].label, Direction::High);
        assert!(anomalies[0].score > 0.0);
    }

    #[test]
    fn test_iqr_flags_dip_as_low() {
        let mut values: Vec<f64> = (0..20).map(|i| 50.0 + (i % 4) as f64).collect();
        values.push(-40.0);

        let anomalies = detect_anomalies(&values, Method::Iqr, 1.5);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].label, Direction::Low);
    }

    #[test]
    fn test_zscore_threshold_controls_strictness() {
        let mut values: Vec<f64> = (0..30).map(|i| (i % 5) as f64).collect();
        values.push(30.0);

        let strict = detect_anomalies(&values, Method::Zscore, 2.0);
        let lax = detect_anomalies(&values, Method::Zscore, 10.0);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].index, 30);
        assert!(lax.is_empty());
    }

    #[test]
    fn test_short_series_flags_nothing() {
        assert!(detect_anomalies(&[1.0, 100.0], Method::Iqr, 1.5).is_empty());
        assert!(detect_anomalies(&[1.0], Method::Zscore, 2.0).is_empty());
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.25) - 1.75).abs() < 1e-9);
        assert!((quantile(&sorted, 0.75) - 3.25).abs() < 1e-9);
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-9);
    }
}
