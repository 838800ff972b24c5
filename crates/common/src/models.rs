//! Shared data contracts for the query pipeline.
//!
//! Field names on the boundary DTOs are camelCase to match the shapes the
//! result renderer and pagination controls consume.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Custom Serde logic for SecretString
fn serialize_secret<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(_) => serializer.serialize_str("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(SecretString::from))
}

fn default_port() -> u16 {
    5432
}

/// Supported relational dialects. Only Postgres today; the tag exists so the
/// descriptor shape survives adding another dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
}

/// A resolved, decrypted target database. Produced by the credential
/// resolver; never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConnectionDescriptor {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1))]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[validate(length(min = 1))]
    pub database: String,

    pub username: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub password: Option<SecretString>,

    #[serde(default)]
    pub dialect: Dialect,
}

impl ConnectionDescriptor {
    /// Stable key identifying the physical database target. Connections with
    /// the same key share one pool process-wide.
    pub fn pool_key(&self) -> String {
        format!("{}:{}:{}", self.host, self.port, self.database)
    }
}

/// On-disk shape of the stored-connection registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsFile {
    pub connections: Vec<ConnectionDescriptor>,
}

/// A single cell value. Tagged so analytics code can pattern-match numeric
/// columns instead of probing runtime types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// A row as an object keyed by column name, used by the standalone analytics
/// endpoints where callers post pre-fetched data.
pub type Record = std::collections::BTreeMap<String, Value>;

/// An executed result set. Row order from the underlying engine is preserved;
/// analytics annotations are matched back to rows strictly by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub total_rows: usize,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub cache_hit: bool,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            total_rows: row_count,
            execution_time_ms,
            cache_hit: false,
        }
    }

    /// Columnar view of caller-posted records, for the standalone analytics
    /// endpoints. Column order follows the first record's key order; cells
    /// missing from a record become `Null`.
    pub fn from_records(records: &[Record]) -> Self {
        let columns: Vec<String> = records
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self::new(columns, rows, 0)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a column, padding or truncating `values` to the row count.
    pub fn push_column(&mut self, name: impl Into<String>, mut values: Vec<Value>) {
        values.resize(self.rows.len(), Value::Null);
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Rows as JSON objects keyed by column name, for the response envelope.
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.clone(), serde_json::Value::from(v)))
                    .collect()
            })
            .collect()
    }
}

/// Equality filter value. Numeric/string/boolean only; range and IN are
/// deliberately unsupported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: FilterValue,
}

/// A business-level query against a semantic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticQuery {
    pub model_id: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyMethod {
    #[default]
    Iqr,
    Zscore,
}

/// What to do when a single analytic fails while the base result is fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsErrorPolicy {
    /// Drop the failing annotation, keep the base result (default).
    #[default]
    Degrade,
    /// Fail the whole request.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastOptions {
    pub date_column: String,
    pub value_column: String,
    pub periods: usize,
}

fn default_sensitivity() -> f64 {
    1.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyOptions {
    pub value_column: String,
    #[serde(default)]
    pub method: AnomalyMethod,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOptions {
    pub features: Vec<String>,
    pub k: usize,
}

/// Optional server-side augmentation of the result set. Each enabled analytic
/// runs over the unpaginated rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOptions {
    #[serde(default)]
    pub forecast: Option<ForecastOptions>,
    #[serde(default)]
    pub anomalies: Option<AnomalyOptions>,
    #[serde(default)]
    pub clusters: Option<ClusterOptions>,
}

impl AnalyticsOptions {
    pub fn is_empty(&self) -> bool {
        self.forecast.is_none() && self.anomalies.is_none() && self.clusters.is_none()
    }
}

/// The execute boundary: raw SQL or a semantic request, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub semantic: Option<SemanticQuery>,
    pub connection_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub analytics: Option<AnalyticsOptions>,
    #[serde(default)]
    pub on_analytics_error: AnalyticsErrorPolicy,
}

/// Response envelope for the execute boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub data: Vec<serde_json::Map<String, serde_json::Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub total_rows: usize,
    pub execution_time_ms: u64,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<vantage_error::VantageError>,
}

impl ExecuteResponse {
    pub fn ok(result: &QueryResult) -> Self {
        Self {
            success: true,
            data: result.records(),
            columns: result.columns.clone(),
            row_count: result.row_count,
            total_rows: result.total_rows,
            execution_time_ms: result.execution_time_ms,
            cache_hit: result.cache_hit,
            error: None,
        }
    }

    pub fn err(error: vantage_error::VantageError) -> Self {
        Self {
            success: false,
            data: vec![],
            columns: vec![],
            row_count: 0,
            total_rows: 0,
            execution_time_ms: 0,
            cache_hit: false,
            error: Some(error),
        }
    }
}
