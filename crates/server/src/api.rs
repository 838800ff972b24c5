//! REST endpoints under `/api/v1`.
//!
//! - `POST /query` — run raw SQL or a semantic query through the pipeline.
//! - `POST /analytics/forecast|anomalies|clusters` — standalone analytics
//!   over caller-posted rows, no database involved.
//! - `GET /models` — list available semantic models.
//! - `GET /stats`, `POST /cache/invalidate` — operator surface.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use vantage_analytics::anomaly::Method;
use vantage_common::models::{
    AnomalyMethod, AnomalyOptions, ClusterOptions, ExecuteRequest, ExecuteResponse,
    ForecastOptions, QueryResult, Record,
};
use vantage_engine::{augment, QueryEngine};
use vantage_error::{ErrorCode, VantageError};

use crate::{ACTIVE_QUERIES, CACHE_HITS, CACHE_MISSES, QUERY_COUNT, QUERY_FAILURES};

pub fn create_api_router(engine: Arc<QueryEngine>) -> Router {
    Router::new()
        .route("/query", post(execute_query))
        .route("/analytics/forecast", post(run_forecast))
        .route("/analytics/anomalies", post(run_anomalies))
        .route("/analytics/clusters", post(run_clusters))
        .route("/models", get(list_models))
        .route("/stats", get(engine_stats))
        .route("/cache/invalidate", post(invalidate_cache))
        .with_state(engine)
}

/// Failure shape shared by the analytics and operator endpoints. The query
/// endpoint uses the richer [`ExecuteResponse`] envelope instead.
#[derive(Debug)]
pub struct ApiError(pub VantageError);

impl From<VantageError> for ApiError {
    fn from(e: VantageError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0.code);
        (status, Json(json!({ "success": false, "error": self.0 }))).into_response()
    }
}

fn status_for(code: &ErrorCode) -> StatusCode {
    match code {
        ErrorCode::DestructiveStatement
        | ErrorCode::UnknownField
        | ErrorCode::UnknownModel
        | ErrorCode::InvalidRequest
        | ErrorCode::InvalidK
        | ErrorCode::MissingColumn
        | ErrorCode::InsufficientData => StatusCode::BAD_REQUEST,
        ErrorCode::UnknownConnection => StatusCode::NOT_FOUND,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::ConnectFailed => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn execute_query(
    State(engine): State<Arc<QueryEngine>>,
    Json(request): Json<ExecuteRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    QUERY_COUNT.inc();
    ACTIVE_QUERIES.inc();
    let outcome = engine.execute(&request).await;
    ACTIVE_QUERIES.dec();

    match outcome {
        Ok(result) => {
            if result.cache_hit {
                CACHE_HITS.inc();
            } else {
                CACHE_MISSES.inc();
            }
            (StatusCode::OK, Json(ExecuteResponse::ok(&result)))
        }
        Err(e) => {
            QUERY_FAILURES.inc();
            (status_for(&e.code), Json(ExecuteResponse::err(e)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub data: Vec<Record>,
    /// Forecast model selector. Only linear regression is implemented.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(flatten)]
    pub options: ForecastOptions,
}

async fn run_forecast(
    Json(request): Json<ForecastRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(model) = request.model.as_deref() {
        if model != "linear" {
            return Err(VantageError::new(
                ErrorCode::InvalidRequest,
                format!("Unsupported forecast model '{}'", model),
            )
            .with_hint("Only 'linear' is supported")
            .into());
        }
    }

    let table = QueryResult::from_records(&request.data);
    let date_idx = augment::require_column(&table, &request.options.date_column, "forecast")?;
    let value_idx = augment::require_column(&table, &request.options.value_column, "forecast")?;

    let history = augment::series_from_result(&table, date_idx, value_idx);
    let forecast = vantage_analytics::forecast(&history, request.options.periods)?;

    let lower: Vec<f64> = forecast.points.iter().map(|p| p.lower_bound).collect();
    let upper: Vec<f64> = forecast.points.iter().map(|p| p.upper_bound).collect();
    Ok(Json(json!({
        "success": true,
        "slope": forecast.slope,
        "intercept": forecast.intercept,
        "rSquared": forecast.r_squared,
        "forecast": forecast.points,
        "lowerBound": lower,
        "upperBound": upper,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AnomalyRequest {
    pub data: Vec<Record>,
    #[serde(flatten)]
    pub options: AnomalyOptions,
}

async fn run_anomalies(
    Json(request): Json<AnomalyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let table = QueryResult::from_records(&request.data);
    let (indices, values) =
        augment::numeric_column(&table, &request.options.value_column, "anomalies")?;

    let method = match request.options.method {
        AnomalyMethod::Iqr => Method::Iqr,
        AnomalyMethod::Zscore => Method::Zscore,
    };
    let found = vantage_analytics::detect_anomalies(&values, method, request.options.sensitivity);

    let anomalies: Vec<serde_json::Value> = found
        .iter()
        .map(|a| {
            json!({
                "index": indices[a.index],
                "value": values[a.index],
                "score": a.score,
                "label": a.label,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": anomalies.len(),
        "anomalies": anomalies,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ClusterRequest {
    pub data: Vec<Record>,
    #[serde(flatten)]
    pub options: ClusterOptions,
}

async fn run_clusters(
    Json(request): Json<ClusterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let table = QueryResult::from_records(&request.data);
    let (indices, matrix) = augment::feature_matrix(&table, &request.options.features)?;
    let assignments = vantage_analytics::cluster(&matrix, request.options.k)?;

    let clusters: Vec<serde_json::Value> = assignments
        .iter()
        .map(|a| {
            json!({
                "dataIndex": indices[a.data_index],
                "clusterId": a.cluster_id,
            })
        })
        .collect();

    Ok(Json(json!({ "success": true, "clusters": clusters })))
}

async fn list_models(State(engine): State<Arc<QueryEngine>>) -> Json<serde_json::Value> {
    Json(json!({ "models": engine.models() }))
}

async fn engine_stats(State(engine): State<Arc<QueryEngine>>) -> Json<serde_json::Value> {
    Json(json!(engine.stats()))
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: String,
}

async fn invalidate_cache(
    State(engine): State<Arc<QueryEngine>>,
    Json(request): Json<InvalidateRequest>,
) -> Json<serde_json::Value> {
    engine.invalidate_cache(&request.pattern).await;
    Json(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_common::config::AppConfig;
    use vantage_common::models::Value;
    use vantage_engine::{CredentialResolver, FileCredentialResolver};
    use vantage_semantic::FileModelRegistry;

    fn engine() -> Arc<QueryEngine> {
        let config = AppConfig::default();
        let resolver: Arc<dyn CredentialResolver> =
            Arc::new(FileCredentialResolver::from_connections(vec![]));
        Arc::new(QueryEngine::new(
            &config,
            resolver,
            Arc::new(FileModelRegistry::empty()),
        ))
    }

    fn record(day: &str, revenue: f64) -> Record {
        let mut r = Record::new();
        r.insert("day".to_string(), Value::Text(day.to_string()));
        r.insert("revenue".to_string(), Value::Float(revenue));
        r
    }

    #[tokio::test]
    async fn test_query_endpoint_maps_destructive_to_400() {
        let request = ExecuteRequest {
            sql: Some("DROP TABLE users".to_string()),
            semantic: None,
            connection_id: "any".to_string(),
            limit: None,
            page: None,
            page_size: None,
            analytics: None,
            on_analytics_error: Default::default(),
        };

        let (status, Json(body)) = execute_query(State(engine()), Json(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(
            body.error.map(|e| e.code),
            Some(ErrorCode::DestructiveStatement)
        );
    }

    #[tokio::test]
    async fn test_forecast_endpoint_over_posted_rows() {
        let request: ForecastRequest = serde_json::from_value(json!({
            "data": [
                { "day": "2024-01-01", "revenue": 10.0 },
                { "day": "2024-01-02", "revenue": 12.0 },
                { "day": "2024-01-03", "revenue": 14.0 }
            ],
            "dateColumn": "day",
            "valueColumn": "revenue",
            "periods": 1
        }))
        .unwrap();

        let Json(body) = run_forecast(Json(request)).await.unwrap();
        assert_eq!(body["success"], json!(true));
        let next = body["forecast"][0]["value"].as_f64().unwrap();
        assert!((next - 16.0).abs() < 1e-9);
        // The fit metadata rides alongside the point and band arrays.
        assert!((body["slope"].as_f64().unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(body["lowerBound"].as_array().unwrap().len(), 1);
        assert_eq!(body["upperBound"].as_array().unwrap().len(), 1);
        assert!(body["lowerBound"][0].as_f64().unwrap() <= next);
        assert!(body["upperBound"][0].as_f64().unwrap() >= next);
    }

    #[tokio::test]
    async fn test_forecast_endpoint_missing_column_is_400() {
        let request: ForecastRequest = serde_json::from_value(json!({
            "data": [{ "day": "2024-01-01", "revenue": 10.0 }],
            "dateColumn": "day",
            "valueColumn": "sales",
            "periods": 1
        }))
        .unwrap();

        let err = run_forecast(Json(request)).await.unwrap_err();
        assert_eq!(err.0.code, ErrorCode::MissingColumn);
        assert_eq!(status_for(&err.0.code), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_anomaly_endpoint_flags_outlier() {
        let data: Vec<Record> = [10.0, 11.0, 9.0, 10.0, 500.0]
            .iter()
            .enumerate()
            .map(|(i, v)| record(&format!("2024-01-{:02}", i + 1), *v))
            .collect();

        let request = AnomalyRequest {
            data,
            options: AnomalyOptions {
                value_column: "revenue".to_string(),
                method: AnomalyMethod::Iqr,
                sensitivity: 1.5,
            },
        };

        let Json(body) = run_anomalies(Json(request)).await.unwrap();
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["anomalies"][0]["index"], json!(4));
        assert_eq!(body["anomalies"][0]["label"], json!("high"));
    }

    #[tokio::test]
    async fn test_cluster_endpoint_rejects_bad_k() {
        let request = ClusterRequest {
            data: vec![record("2024-01-01", 1.0), record("2024-01-02", 2.0)],
            options: ClusterOptions {
                features: vec!["revenue".to_string()],
                k: 1,
            },
        };

        let err = run_clusters(Json(request)).await.unwrap_err();
        assert_eq!(err.0.code, ErrorCode::InvalidK);
    }

    #[tokio::test]
    async fn test_cluster_endpoint_assignment_shape() {
        let data: Vec<Record> = [1.0, 1.1, 50.0, 50.2]
            .iter()
            .enumerate()
            .map(|(i, v)| record(&format!("2024-01-{:02}", i + 1), *v))
            .collect();

        let request = ClusterRequest {
            data,
            options: ClusterOptions {
                features: vec!["revenue".to_string()],
                k: 2,
            },
        };

        let Json(body) = run_clusters(Json(request)).await.unwrap();
        let clusters = body["clusters"].as_array().unwrap();
        assert_eq!(clusters.len(), 4);
        for (i, entry) in clusters.iter().enumerate() {
            assert_eq!(entry["dataIndex"], json!(i));
            assert!(entry["clusterId"].as_u64().unwrap() < 2);
        }
        // Near-identical rows land in the same cluster.
        assert_eq!(clusters[0]["clusterId"], clusters[1]["clusterId"]);
        assert_eq!(clusters[2]["clusterId"], clusters[3]["clusterId"]);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&ErrorCode::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(&ErrorCode::PoolExhausted),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ErrorCode::UnknownConnection),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ErrorCode::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
