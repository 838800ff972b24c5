//! Ordinary least squares forecasting with confidence bands.
//!
//! The regression runs against an integer time index rather than wall-clock
//! time for numerical stability. Two inherited approximations are kept
//! deliberately because downstream consumers test against their output:
//! the confidence multiplier is a fixed z of 1.96 rather than a
//! t-distribution (reasonable for larger n), and future timestamps are
//! synthesized from the average spacing between the first and last
//! historical timestamps, which assumes evenly spaced samples.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

const CONFIDENCE_Z: f64 = 1.96;

/// One observed point. The timestamp is optional; without it the forecast
/// still runs on the index and synthesized timestamps are omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
}

/// One forecast point with its 95%-style confidence band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub points: Vec<ForecastPoint>,
}

/// Fit `value = slope * index + intercept` over the history and extrapolate
/// `periods` future points.
///
/// Fails with `InsufficientData` when fewer than 2 points are given.
pub fn forecast(history: &[SeriesPoint], periods: usize) -> Result<Forecast> {
    let n = history.len();
    if n < 2 {
        return Err(
            VantageError::new(ErrorCode::InsufficientData, "Forecasting needs at least 2 points")
                .with_context(ErrorContext::Analytics {
                    operation: "forecast".to_string(),
                    required: Some(2),
                    actual: Some(n),
                    column: None,
                }),
        );
    }

    let nf = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, p) in history.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += p.value;
        sum_xy += x * p.value;
        sum_xx += x * x;
    }

    let denom = nf * sum_xx - sum_x * sum_x;
    let slope = (nf * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / nf;

    let mean_y = sum_y / nf;
    let mean_x = sum_x / nf;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut s_xx = 0.0;
    for (i, p) in history.iter().enumerate() {
        let x = i as f64;
        let fitted = slope * x + intercept;
        ss_res += (p.value - fitted) * (p.value - fitted);
        ss_tot += (p.value - mean_y) * (p.value - mean_y);
        s_xx += (x - mean_x) * (x - mean_x);
    }

    // A constant series fits itself exactly.
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    // Residual standard error; zero when n == 2 (exact fit through 2 points).
    let se = if n > 2 { (ss_res / (nf - 2.0)).sqrt() } else { 0.0 };

    let spacing = average_spacing(history);

    let mut points = Vec::with_capacity(periods);
    let last_ts = history.last().and_then(|p| p.timestamp);
    for i in 0..periods {
        let x = (n + i) as f64;
        let value = slope * x + intercept;

        // Standard forecast-variance widening for extrapolated x.
        let widen = (1.0 + 1.0 / nf + (x - mean_x) * (x - mean_x) / s_xx).sqrt();
        let band = CONFIDENCE_Z * se * widen;

        let timestamp = match (last_ts, spacing) {
            (Some(last), Some(step)) => {
                let offset = step * (i as i32 + 1);
                last.checked_add_signed(offset)
            }
            _ => None,
        };

        points.push(ForecastPoint {
            timestamp,
            value,
            lower_bound: value - band,
            upper_bound: value + band,
        });
    }

    Ok(Forecast {
        slope,
        intercept,
        r_squared,
        points,
    })
}

/// Average spacing between the first and last historical timestamps.
/// Misleading for irregular series; see module docs.
fn average_spacing(history: &[SeriesPoint]) -> Option<Duration> {
    let first = history.first()?.timestamp?;
    let last = history.last()?.timestamp?;
    let intervals = (history.len() - 1) as i32;
    if intervals == 0 {
        return None;
    }
    Some((last - first) / intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn series(values: &[f64]) -> Vec<SeriesPoint> {
        values
            .iter()
            .map(|&v| SeriesPoint {
                timestamp: None,
                value: v,
            })
            .collect()
    }

    fn daily_series(values: &[f64]) -> Vec<SeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| SeriesPoint {
                timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)),
                value: v,
            })
            .collect()
    }

    #[test]
    fn test_perfectly_linear_series() {
        // y = 2x + 3
        let history = series(&[3.0, 5.0, 7.0, 9.0, 11.0]);
        let result = forecast(&history, 3).unwrap();

        assert!((result.slope - 2.0).abs() < 1e-9);
        assert!((result.intercept - 3.0).abs() < 1e-9);
        assert!((result.r_squared - 1.0).abs() < 1e-9);

        // Forecast points continue the line: x = 5, 6, 7
        for (i, p) in result.points.iter().enumerate() {
            let expected = 2.0 * (5 + i) as f64 + 3.0;
            assert!((p.value - expected).abs() < 1e-9);
            // Zero residuals collapse the band onto the line
            assert!((p.lower_bound - expected).abs() < 1e-9);
            assert!((p.upper_bound - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_insufficient_data() {
        let err = forecast(&series(&[1.0]), 5).unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientData);
    }

    #[test]
    fn test_constant_series_r_squared_is_one() {
        let result = forecast(&series(&[4.0, 4.0, 4.0, 4.0]), 2).unwrap();
        assert!((result.slope).abs() < 1e-9);
        assert!((result.r_squared - 1.0).abs() < 1e-9);
        assert!((result.points[0].value - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_series_band_widens_with_horizon() {
        let result = forecast(&series(&[1.0, 2.2, 2.8, 4.3, 4.9, 6.2]), 3).unwrap();
        let width = |p: &ForecastPoint| p.upper_bound - p.lower_bound;
        assert!(width(&result.points[0]) > 0.0);
        assert!(width(&result.points[2]) > width(&result.points[0]));
    }

    #[test]
    fn test_daily_timestamps_are_extrapolated() {
        let history = daily_series(&[1.0, 2.0, 3.0, 4.0]);
        let result = forecast(&history, 2).unwrap();

        let last = history.last().unwrap().timestamp.unwrap();
        assert_eq!(result.points[0].timestamp.unwrap(), last + Duration::days(1));
        assert_eq!(result.points[1].timestamp.unwrap(), last + Duration::days(2));
    }

    #[test]
    fn test_missing_timestamps_yield_none() {
        let result = forecast(&series(&[1.0, 2.0, 3.0]), 1).unwrap();
        assert!(result.points[0].timestamp.is_none());
    }
}
