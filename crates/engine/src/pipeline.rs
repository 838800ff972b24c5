//! Pipeline orchestration.
//!
//! `QueryEngine` wires the stages together and owns their shared state. The
//! stage order is a contract:
//!
//! - sanitization runs before any connection is touched, so a rejected
//!   statement never consumes a pool slot;
//! - the cache stores the base result (pre-analytics, pre-pagination), so
//!   one cached execution serves every page and every analytics overlay;
//! - shaping runs last, so `total_rows` reflects the full result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};
use vantage_common::config::AppConfig;
use vantage_common::models::{ExecuteRequest, FilterValue, QueryResult};
use vantage_common::scrubber;
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};
use vantage_semantic::{ModelRegistry, SemanticModel, SqlCompiler};

use crate::cache::ResultCache;
use crate::executor::QueryExecutor;
use crate::pool::PoolRegistry;
use crate::resolver::CredentialResolver;
use crate::{augment, paginate, sanitizer};

/// Point-in-time engine counters, served by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub active_queries: usize,
    pub open_pools: usize,
    pub cached_results: u64,
    pub cached_bytes: u64,
}

pub struct QueryEngine {
    resolver: Arc<dyn CredentialResolver>,
    models: Arc<dyn ModelRegistry>,
    compiler: SqlCompiler,
    pools: Arc<PoolRegistry>,
    executor: QueryExecutor,
    cache: ResultCache,
    limits: vantage_common::config::QueryLimits,
    active_queries: AtomicUsize,
}

impl QueryEngine {
    pub fn new(
        config: &AppConfig,
        resolver: Arc<dyn CredentialResolver>,
        models: Arc<dyn ModelRegistry>,
    ) -> Self {
        let pools = Arc::new(PoolRegistry::new(config.pool));
        let executor = QueryExecutor::new(pools.clone(), config.query_limits.statement_timeout_ms);
        Self {
            resolver,
            models,
            compiler: SqlCompiler::new(config.query_limits),
            pools,
            executor,
            cache: ResultCache::new(&config.cache),
            limits: config.query_limits,
            active_queries: AtomicUsize::new(0),
        }
    }

    /// Run one request through the full pipeline.
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<QueryResult> {
        self.active_queries.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let outcome = self.run(request).await;
        self.active_queries.fetch_sub(1, Ordering::SeqCst);

        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => info!(
                target: "queries",
                connection_id = %request.connection_id,
                duration_ms,
                rows = result.row_count,
                total_rows = result.total_rows,
                cache_hit = result.cache_hit,
                "Query completed"
            ),
            Err(e) => info!(
                target: "queries",
                connection_id = %request.connection_id,
                duration_ms,
                error_code = %e.code,
                "Query failed"
            ),
        }
        outcome
    }

    async fn run(&self, request: &ExecuteRequest) -> Result<QueryResult> {
        let started = Instant::now();

        let (sql, params) = self.compile(request)?;
        sanitizer::sanitize(&sql)?;

        let descriptor = self.resolver.resolve(&request.connection_id).await?;
        let key = ResultCache::key(&descriptor.id, &statement_fingerprint(&sql, &params));

        let mut result = match self.cache.get(&key).await {
            Some((columns, rows)) => {
                let mut hit =
                    QueryResult::new(columns, rows, started.elapsed().as_millis() as u64);
                hit.cache_hit = true;
                hit
            }
            None => {
                debug!(
                    target: "queries",
                    connection_id = %descriptor.id,
                    query = %scrubber::scrub(&sql),
                    "Executing statement"
                );
                let executed = self.executor.execute(&descriptor, &sql, &params).await?;
                self.cache.put(key, &executed).await;
                executed
            }
        };

        if let Some(options) = &request.analytics {
            if !options.is_empty() {
                augment::apply(&mut result, options, request.on_analytics_error)?;
            }
        }

        self.shape(request, &mut result);
        Ok(result)
    }

    fn compile(&self, request: &ExecuteRequest) -> Result<(String, Vec<FilterValue>)> {
        match (&request.sql, &request.semantic) {
            (Some(sql), None) => Ok((sql.clone(), Vec::new())),
            (None, Some(query)) => {
                let model = self.models.get(&query.model_id).ok_or_else(|| {
                    let available: Vec<String> =
                        self.models.list().iter().map(|m| m.id.clone()).collect();
                    let mut err = VantageError::new(
                        ErrorCode::UnknownModel,
                        format!("Unknown semantic model '{}'", query.model_id),
                    )
                    .with_context(ErrorContext::UnknownModel {
                        model: query.model_id.clone(),
                        available_models: available.clone(),
                    });
                    if let Some(close) =
                        vantage_error::find_closest_match(&query.model_id, &available)
                    {
                        err = err.with_hint(format!("Did you mean '{}'?", close));
                    }
                    err
                })?;
                let compiled = self.compiler.compile(&model, query)?;
                Ok((compiled.sql, compiled.params))
            }
            _ => Err(VantageError::new(
                ErrorCode::InvalidRequest,
                "Request must carry exactly one of 'sql' or 'semantic'",
            )),
        }
    }

    fn shape(&self, request: &ExecuteRequest, result: &mut QueryResult) {
        if let Some(limit) = request.limit {
            paginate::apply_limit(result, limit.min(self.limits.max_limit));
        }
        if request.page.is_some() || request.page_size.is_some() {
            let page = request.page.unwrap_or(1);
            let page_size = request.page_size.unwrap_or(self.limits.default_limit);
            paginate::paginate(result, page, page_size);
        }
    }

    /// Drop cached results matching `pattern` (exact key or `prefix*` glob).
    pub async fn invalidate_cache(&self, pattern: &str) {
        info!(target: "cache", pattern = %pattern, "Invalidating cached results");
        self.cache.invalidate(pattern).await;
    }

    /// Semantic models available to callers, for the models endpoint.
    pub fn models(&self) -> Vec<Arc<SemanticModel>> {
        self.models.list()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_queries: self.active_queries.load(Ordering::SeqCst),
            open_pools: self.pools.pool_count(),
            cached_results: self.cache.entry_count(),
            cached_bytes: self.cache.weighted_size(),
        }
    }

    /// Close every pool. Called on server shutdown.
    pub fn shutdown(&self) {
        self.pools.shutdown();
    }
}

/// Canonical text the cache key is derived from. Parameter values are part
/// of the statement identity; two filters with different values must never
/// share an entry.
fn statement_fingerprint(sql: &str, params: &[FilterValue]) -> String {
    if params.is_empty() {
        return sql.to_string();
    }
    let encoded = serde_json::to_string(params).unwrap_or_default();
    format!("{} /* params {} */", sql, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::FileCredentialResolver;
    use vantage_common::models::{
        AnalyticsOptions, ConnectionDescriptor, Dialect, ForecastOptions, Value,
    };
    use vantage_semantic::FileModelRegistry;

    fn engine_with(connections: Vec<ConnectionDescriptor>) -> QueryEngine {
        let config = AppConfig::default();
        QueryEngine::new(
            &config,
            Arc::new(FileCredentialResolver::from_connections(connections)),
            Arc::new(FileModelRegistry::empty()),
        )
    }

    fn sales_connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: "sales-db".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "sales".to_string(),
            username: Some("reader".to_string()),
            password: None,
            dialect: Dialect::Postgres,
        }
    }

    fn request(sql: &str) -> ExecuteRequest {
        ExecuteRequest {
            sql: Some(sql.to_string()),
            semantic: None,
            connection_id: "sales-db".to_string(),
            limit: None,
            page: None,
            page_size: None,
            analytics: None,
            on_analytics_error: Default::default(),
        }
    }

    /// Seed the cache so the pipeline can be exercised without a database.
    async fn seed(engine: &QueryEngine, sql: &str, result: &QueryResult) {
        let key = ResultCache::key("sales-db", &statement_fingerprint(sql, &[]));
        engine.cache.put(key, result).await;
    }

    #[tokio::test]
    async fn test_rejects_request_with_both_shapes() {
        let engine = engine_with(vec![sales_connection()]);
        let mut req = request("SELECT 1");
        req.semantic = Some(vantage_common::models::SemanticQuery {
            model_id: "sales".to_string(),
            dimensions: vec![],
            metrics: vec![],
            filters: vec![],
            limit: None,
        });
        let err = engine.execute(&req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_destructive_sql_rejected_before_resolution() {
        // No connections registered: if sanitization ran later, we would see
        // UnknownConnection instead.
        let engine = engine_with(vec![]);
        let err = engine
            .execute(&request("DELETE FROM orders"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DestructiveStatement);
    }

    #[tokio::test]
    async fn test_unknown_connection_surfaces() {
        let engine = engine_with(vec![]);
        let err = engine.execute(&request("SELECT 1")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownConnection);
    }

    #[tokio::test]
    async fn test_unknown_model_with_suggestion() {
        let config = AppConfig::default();
        let models = FileModelRegistry::from_models(vec![SemanticModel {
            id: "sales".to_string(),
            table_name: "orders".to_string(),
            dimensions: vec![],
            metrics: vec![vantage_semantic::Metric {
                name: "Total".to_string(),
                formula: "SUM(revenue)".to_string(),
            }],
        }])
        .unwrap();
        let engine = QueryEngine::new(
            &config,
            Arc::new(FileCredentialResolver::from_connections(vec![
                sales_connection(),
            ])),
            Arc::new(models),
        );

        let mut req = request("");
        req.sql = None;
        req.semantic = Some(vantage_common::models::SemanticQuery {
            model_id: "sale".to_string(),
            dimensions: vec![],
            metrics: vec!["Total".to_string()],
            filters: vec![],
            limit: None,
        });
        let err = engine.execute(&req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownModel);
        assert_eq!(err.hint, Some("Did you mean 'sales'?".to_string()));
    }

    #[tokio::test]
    async fn test_cache_hit_serves_and_paginates() {
        let engine = engine_with(vec![sales_connection()]);
        let sql = "SELECT n FROM series";
        let rows: Vec<Vec<Value>> = (0..10).map(|i| vec![Value::Int(i)]).collect();
        seed(&engine, sql, &QueryResult::new(vec!["n".to_string()], rows, 7)).await;

        let mut req = request(sql);
        req.page = Some(2);
        req.page_size = Some(4);

        let result = engine.execute(&req).await.unwrap();
        assert!(result.cache_hit);
        assert_eq!(result.total_rows, 10);
        assert_eq!(result.row_count, 4);
        assert_eq!(result.rows[0], vec![Value::Int(4)]);
    }

    #[tokio::test]
    async fn test_key_normalization_hits_across_formatting() {
        let engine = engine_with(vec![sales_connection()]);
        seed(
            &engine,
            "SELECT n FROM series",
            &QueryResult::new(vec!["n".to_string()], vec![vec![Value::Int(1)]], 7),
        )
        .await;

        let result = engine
            .execute(&request("select   n\nfrom series;"))
            .await
            .unwrap();
        assert!(result.cache_hit);
    }

    #[tokio::test]
    async fn test_limit_clamped_to_max() {
        let engine = engine_with(vec![sales_connection()]);
        let sql = "SELECT n FROM series";
        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::Int(i)]).collect();
        seed(&engine, sql, &QueryResult::new(vec!["n".to_string()], rows, 0)).await;

        let mut req = request(sql);
        req.limit = Some(usize::MAX);
        let result = engine.execute(&req).await.unwrap();
        assert_eq!(result.row_count, 5);
    }

    #[tokio::test]
    async fn test_analytics_run_before_pagination() {
        let engine = engine_with(vec![sales_connection()]);
        let sql = "SELECT day, revenue FROM daily";
        let rows: Vec<Vec<Value>> = (0..6)
            .map(|i| {
                vec![
                    Value::Text(format!("2024-01-{:02}", i + 1)),
                    Value::Float(100.0 + 10.0 * i as f64),
                ]
            })
            .collect();
        seed(
            &engine,
            sql,
            &QueryResult::new(vec!["day".to_string(), "revenue".to_string()], rows, 0),
        )
        .await;

        let mut req = request(sql);
        req.analytics = Some(AnalyticsOptions {
            forecast: Some(ForecastOptions {
                date_column: "day".to_string(),
                value_column: "revenue".to_string(),
                periods: 2,
            }),
            anomalies: None,
            clusters: None,
        });
        req.page = Some(1);
        req.page_size = Some(3);

        let result = engine.execute(&req).await.unwrap();
        // Forecast saw all 6 rows: total includes the 2 synthetic rows even
        // though only the first page is returned.
        assert_eq!(result.total_rows, 8);
        assert_eq!(result.row_count, 3);
        assert!(result.columns.iter().any(|c| c == augment::FORECAST_FLAG));
    }

    #[tokio::test]
    async fn test_invalidation_forces_next_miss() {
        let engine = engine_with(vec![sales_connection()]);
        let sql = "SELECT n FROM series";
        seed(
            &engine,
            sql,
            &QueryResult::new(vec!["n".to_string()], vec![vec![Value::Int(1)]], 0),
        )
        .await;

        engine.invalidate_cache("sales-db:*").await;

        // Next lookup misses and falls through to execution, which cannot
        // yield a cache hit (and, with no database here, fails).
        let outcome = engine.execute(&request(sql)).await;
        assert!(!outcome.map(|r| r.cache_hit).unwrap_or(false));
    }

    // Requires a local Postgres; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_roundtrip_hits_cache_on_repeat() {
        let mut conn = sales_connection();
        conn.host =
            std::env::var("VANTAGE_TEST_PG_HOST").unwrap_or_else(|_| "localhost".into());
        conn.database = "postgres".to_string();
        conn.username = Some("postgres".to_string());
        conn.password = std::env::var("VANTAGE_TEST_PG_PASSWORD")
            .ok()
            .map(secrecy::SecretString::from);

        let engine = engine_with(vec![conn]);
        let req = request("SELECT 1 AS x");

        let first = engine.execute(&req).await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.columns, vec!["x"]);
        assert_eq!(first.rows, vec![vec![Value::Int(1)]]);
        assert_eq!(first.row_count, 1);

        let second = engine.execute(&req).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.rows, first.rows);
    }

    #[tokio::test]
    async fn test_stats_reflect_cached_entries() {
        let engine = engine_with(vec![sales_connection()]);
        seed(
            &engine,
            "SELECT 1",
            &QueryResult::new(vec!["?column?".to_string()], vec![vec![Value::Int(1)]], 0),
        )
        .await;
        engine.cache.sync().await;

        let stats = engine.stats();
        assert_eq!(stats.cached_results, 1);
        assert_eq!(stats.active_queries, 0);
    }
}
