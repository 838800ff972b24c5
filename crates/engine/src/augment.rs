//! Analytics augmentation of a result set.
//!
//! Annotations ride along as marker columns so downstream consumers can
//! never confuse them with source data: `_is_anomaly` and `_anomaly_score`
//! on flagged rows, `_cluster_id` per row, and synthetic forecast rows
//! appended with `_is_forecast = true` plus their confidence band.
//!
//! All analytics run over the *unpaginated* rows; shaping happens after.
//! Forecast runs last, so anomaly and cluster annotations only ever see
//! observed rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;
use vantage_analytics::anomaly::Method;
use vantage_analytics::forecast::SeriesPoint;
use vantage_common::models::{
    AnalyticsErrorPolicy, AnalyticsOptions, AnomalyMethod, AnomalyOptions, ClusterOptions,
    ForecastOptions, QueryResult, Value,
};
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

pub const ANOMALY_FLAG: &str = "_is_anomaly";
pub const ANOMALY_SCORE: &str = "_anomaly_score";
pub const CLUSTER_ID: &str = "_cluster_id";
pub const FORECAST_FLAG: &str = "_is_forecast";
pub const FORECAST_LOWER: &str = "_forecast_lower";
pub const FORECAST_UPPER: &str = "_forecast_upper";

/// Apply every requested analytic to `result` in place.
///
/// Under the `Degrade` policy a failing analytic is dropped with a warning
/// and the base result survives; under `Fail` the first failure aborts.
pub fn apply(
    result: &mut QueryResult,
    options: &AnalyticsOptions,
    policy: AnalyticsErrorPolicy,
) -> Result<()> {
    if let Some(opts) = &options.anomalies {
        guard(policy, "anomalies", apply_anomalies(result, opts))?;
    }
    if let Some(opts) = &options.clusters {
        guard(policy, "clusters", apply_clusters(result, opts))?;
    }
    // Forecast appends rows, so it must come after row-addressed analytics.
    if let Some(opts) = &options.forecast {
        guard(policy, "forecast", apply_forecast(result, opts))?;
    }
    Ok(())
}

fn guard(policy: AnalyticsErrorPolicy, operation: &str, outcome: Result<()>) -> Result<()> {
    match (outcome, policy) {
        (Ok(()), _) => Ok(()),
        (Err(e), AnalyticsErrorPolicy::Fail) => Err(e),
        (Err(e), AnalyticsErrorPolicy::Degrade) => {
            warn!(
                target: "analytics",
                operation,
                error = %e,
                "Analytic failed; returning base result without it"
            );
            Ok(())
        }
    }
}

fn apply_anomalies(result: &mut QueryResult, opts: &AnomalyOptions) -> Result<()> {
    let (indices, values) = numeric_column(result, &opts.value_column, "anomalies")?;

    let method = match opts.method {
        AnomalyMethod::Iqr => Method::Iqr,
        AnomalyMethod::Zscore => Method::Zscore,
    };
    let anomalies = vantage_analytics::detect_anomalies(&values, method, opts.sensitivity);

    let mut flags = vec![Value::Bool(false); result.rows.len()];
    let mut scores = vec![Value::Null; result.rows.len()];
    for anomaly in anomalies {
        let row = indices[anomaly.index];
        flags[row] = Value::Bool(true);
        scores[row] = Value::Float(anomaly.score);
    }

    result.push_column(ANOMALY_FLAG, flags);
    result.push_column(ANOMALY_SCORE, scores);
    Ok(())
}

fn apply_clusters(result: &mut QueryResult, opts: &ClusterOptions) -> Result<()> {
    let (indices, matrix) = feature_matrix(result, &opts.features)?;
    let assignments = vantage_analytics::cluster(&matrix, opts.k)?;

    // Rows missing a numeric value in any feature stay unassigned.
    let mut ids = vec![Value::Null; result.rows.len()];
    for assignment in assignments {
        ids[indices[assignment.data_index]] = Value::Int(assignment.cluster_id as i64);
    }

    result.push_column(CLUSTER_ID, ids);
    Ok(())
}

fn apply_forecast(result: &mut QueryResult, opts: &ForecastOptions) -> Result<()> {
    let date_idx = require_column(result, &opts.date_column, "forecast")?;
    let value_idx = require_column(result, &opts.value_column, "forecast")?;

    let history = series_from_result(result, date_idx, value_idx);
    let forecast = vantage_analytics::forecast(&history, opts.periods)?;

    let observed = result.rows.len();
    // Synthesized dates keep the observed column's representation so one
    // column does not render in two formats.
    let date_template = result.rows[..observed]
        .iter()
        .rev()
        .find_map(|row| match row.get(date_idx) {
            Some(Value::Null) | None => None,
            Some(cell) => Some(cell.clone()),
        });

    result.push_column(FORECAST_FLAG, vec![Value::Bool(false); observed]);
    result.push_column(FORECAST_LOWER, vec![Value::Null; observed]);
    result.push_column(FORECAST_UPPER, vec![Value::Null; observed]);

    let width = result.columns.len();
    for point in &forecast.points {
        let mut row = vec![Value::Null; width];
        if let Some(ts) = point.timestamp {
            row[date_idx] = render_date(ts, date_template.as_ref());
        }
        row[value_idx] = Value::Float(point.value);
        row[width - 3] = Value::Bool(true);
        row[width - 2] = Value::Float(point.lower_bound);
        row[width - 1] = Value::Float(point.upper_bound);
        result.rows.push(row);
    }

    result.row_count = result.rows.len();
    result.total_rows = result.rows.len();
    Ok(())
}

/// Build the time series for a forecast: rows with a numeric value, in row
/// order, with timestamps where the date cell has one.
pub fn series_from_result(
    result: &QueryResult,
    date_idx: usize,
    value_idx: usize,
) -> Vec<SeriesPoint> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let value = row.get(value_idx)?.as_f64()?;
            Some(SeriesPoint {
                timestamp: row.get(date_idx).and_then(value_to_timestamp),
                value,
            })
        })
        .collect()
}

/// Extract a numeric column, keeping the original row index of each value.
pub fn numeric_column(
    result: &QueryResult,
    column: &str,
    operation: &str,
) -> Result<(Vec<usize>, Vec<f64>)> {
    let idx = require_column(result, column, operation)?;
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for (row_idx, row) in result.rows.iter().enumerate() {
        if let Some(v) = row.get(idx).and_then(Value::as_f64) {
            indices.push(row_idx);
            values.push(v);
        }
    }
    Ok((indices, values))
}

/// Extract rows where every feature is numeric, as a dense matrix plus the
/// original row index of each matrix row.
pub fn feature_matrix(
    result: &QueryResult,
    features: &[String],
) -> Result<(Vec<usize>, Vec<Vec<f64>>)> {
    let feature_idxs: Vec<usize> = features
        .iter()
        .map(|f| require_column(result, f, "clusters"))
        .collect::<Result<_>>()?;

    let mut indices = Vec::new();
    let mut matrix = Vec::new();
    for (row_idx, row) in result.rows.iter().enumerate() {
        let point: Option<Vec<f64>> = feature_idxs
            .iter()
            .map(|&i| row.get(i).and_then(Value::as_f64))
            .collect();
        if let Some(point) = point {
            indices.push(row_idx);
            matrix.push(point);
        }
    }
    Ok((indices, matrix))
}

pub fn require_column(result: &QueryResult, column: &str, operation: &str) -> Result<usize> {
    result.column_index(column).ok_or_else(|| {
        let mut err = VantageError::new(
            ErrorCode::MissingColumn,
            format!("Column '{}' not present in the result set", column),
        )
        .with_context(ErrorContext::Analytics {
            operation: operation.to_string(),
            required: None,
            actual: None,
            column: Some(column.to_string()),
        });
        if let Some(close) = vantage_error::find_closest_match(column, &result.columns) {
            err = err.with_hint(format!("Did you mean '{}'?", close));
        }
        err
    })
}

/// Timestamp view of a cell. Text cells are parsed leniently since date
/// columns often arrive as strings from JSON or CSV-sourced tables.
pub fn value_to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Text(s) => parse_timestamp(s),
        _ => None,
    }
}

fn render_date(ts: DateTime<Utc>, template: Option<&Value>) -> Value {
    match template {
        Some(Value::Text(sample)) => Value::Text(ts.format(text_date_format(sample)).to_string()),
        _ => Value::Timestamp(ts),
    }
}

/// Pick the strftime pattern matching how the observed text dates were
/// written, mirroring the parse order in `parse_timestamp`.
fn text_date_format(sample: &str) -> &'static str {
    if DateTime::parse_from_rfc3339(sample).is_ok() {
        "%Y-%m-%dT%H:%M:%S%:z"
    } else if NaiveDateTime::parse_from_str(sample, "%Y-%m-%d %H:%M:%S").is_ok() {
        "%Y-%m-%d %H:%M:%S"
    } else {
        "%Y-%m-%d"
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
