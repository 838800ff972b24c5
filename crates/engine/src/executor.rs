//! Statement execution against a pooled connection.
//!
//! The statement timeout races only the query itself; pool checkout happens
//! first and is bounded separately by the connect timeout. Reported latency
//! is wall-clock from before checkout, so time spent queueing for a
//! connection is visible in `execution_time_ms`.
//!
//! On timeout the connection is not recycled: a server-side cancel request
//! is fired best-effort, and the connection is detached from the pool and
//! dropped so a possibly still-running statement never leaks into another
//! request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use deadpool_postgres::Object;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;
use tracing::{debug, warn};
use vantage_common::models::{ConnectionDescriptor, FilterValue, QueryResult, Value};
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

use crate::pool::PoolRegistry;

pub struct QueryExecutor {
    registry: Arc<PoolRegistry>,
    statement_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(registry: Arc<PoolRegistry>, statement_timeout_ms: u64) -> Self {
        Self {
            registry,
            statement_timeout: Duration::from_millis(statement_timeout_ms),
        }
    }

    /// Run `sql` with positional `params` on the descriptor's pool.
    pub async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        sql: &str,
        params: &[FilterValue],
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let client = self.registry.acquire(descriptor).await?;
        let cancel = client.cancel_token();

        let outcome =
            tokio::time::timeout(self.statement_timeout, run_query(&client, sql, params)).await;

        match outcome {
            Ok(Ok((columns, rows))) => Ok(QueryResult::new(
                columns,
                rows,
                started.elapsed().as_millis() as u64,
            )),
            Ok(Err(e)) => Err(e.with_context(ErrorContext::Connection {
                connection_id: descriptor.id.clone(),
                host: Some(descriptor.host.clone()),
                port: Some(descriptor.port),
                database: Some(descriptor.database.clone()),
            })),
            Err(_) => {
                let timeout_ms = self.statement_timeout.as_millis() as u64;
                warn!(
                    target: "queries",
                    connection_id = %descriptor.id,
                    timeout_ms,
                    "Statement timed out; cancelling and discarding connection"
                );

                // Best-effort server-side cancel. Postgres may have finished
                // or may ignore it; either way we do not wait on the answer.
                tokio::spawn(async move {
                    if let Err(e) = cancel.cancel_query(tokio_postgres::NoTls).await {
                        debug!(target: "queries", "Cancel request failed: {}", e);
                    }
                });

                // Detach from the pool instead of recycling. The statement
                // may still be running; this connection must not serve
                // another request.
                drop(Object::take(client));

                Err(VantageError::new(
                    ErrorCode::Timeout,
                    format!("Query exceeded the {}ms statement timeout", timeout_ms),
                )
                .with_context(ErrorContext::Timeout { timeout_ms })
                .with_hint("Narrow the query or raise query_limits.statement_timeout_ms"))
            }
        }
    }
}

async fn run_query(
    client: &Object,
    sql: &str,
    params: &[FilterValue],
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let owned: Vec<Box<dyn ToSql + Sync + Send>> = params.iter().map(bind_param).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = owned
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect();

    // Prepare first so column names survive an empty result set.
    let statement = client.prepare_cached(sql).await.map_err(driver_error)?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = client.query(&statement, &refs).await.map_err(driver_error)?;

    let mut decoded = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut cells = Vec::with_capacity(row.len());
        for i in 0..row.len() {
            cells.push(decode_value(row, i)?);
        }
        decoded.push(cells);
    }

    Ok((columns, decoded))
}

fn driver_error(e: tokio_postgres::Error) -> VantageError {
    VantageError::new(ErrorCode::ExecutionError, format!("Query failed: {}", e))
}

fn bind_param(value: &FilterValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        FilterValue::Bool(b) => Box::new(*b),
        FilterValue::Int(i) => Box::new(*i),
        FilterValue::Float(f) => Box::new(*f),
        FilterValue::Text(s) => Box::new(s.clone()),
    }
}

/// Decode one cell into the tagged value type. SQL NULL maps to
/// `Value::Null`; a column type we cannot decode fails the result rather
/// than silently nulling a whole column out.
fn decode_value(row: &Row, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_().clone();

    let decoded = if ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
    } else if ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
    } else if ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
    } else if ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int)
    } else if ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
    } else if ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float)
    } else if ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(Value::Timestamp)
    } else if ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|dt| Value::Timestamp(dt.and_utc()))
    } else if ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Value::Timestamp(dt.and_utc()))
    } else if ty == Type::NUMERIC {
        // SUM/AVG over integer and numeric columns come back as NUMERIC.
        // A magnitude f64 cannot hold falls back to its textual form.
        row.try_get::<_, Option<Decimal>>(idx).ok().flatten().map(|d| {
            d.to_f64()
                .map(Value::Float)
                .unwrap_or_else(|| Value::Text(d.to_string()))
        })
    } else {
        // Text-like types, plus anything else with a textual representation.
        match row.try_get::<_, Option<String>>(idx) {
            Ok(opt) => opt.map(Value::Text),
            Err(_) => {
                return Err(VantageError::new(
                    ErrorCode::ExecutionError,
                    format!(
                        "Cannot decode column '{}' of type {}",
                        row.columns()[idx].name(),
                        ty
                    ),
                )
                .with_hint("Cast the column to text or a supported type in the statement"));
            }
        }
    };

    Ok(decoded.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_common::config::PoolSettings;
    use vantage_common::models::Dialect;

    fn local_descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: "local".to_string(),
            host: std::env::var("VANTAGE_TEST_PG_HOST").unwrap_or_else(|_| "localhost".into()),
            port: 5432,
            database: "postgres".to_string(),
            username: Some("postgres".to_string()),
            password: std::env::var("VANTAGE_TEST_PG_PASSWORD")
                .ok()
                .map(secrecy::SecretString::from),
            dialect: Dialect::Postgres,
        }
    }

    fn executor(timeout_ms: u64) -> QueryExecutor {
        let registry = Arc::new(PoolRegistry::new(PoolSettings {
            max_size: 2,
            connect_timeout_ms: 5_000,
            idle_timeout_ms: 30_000,
        }));
        QueryExecutor::new(registry, timeout_ms)
    }

    // Requires a local Postgres; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_simple_select_decodes_values() {
        let result = executor(30_000)
            .execute(
                &local_descriptor(),
                "SELECT 1::int8 AS n, 'x'::text AS s, true AS b, NULL::text AS missing",
                &[],
            )
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["n", "s", "b", "missing"]);
        assert_eq!(
            result.rows[0],
            vec![
                Value::Int(1),
                Value::Text("x".to_string()),
                Value::Bool(true),
                Value::Null
            ]
        );
    }

    // NUMERIC is what Postgres returns for SUM(int8) and every AVG, so the
    // aggregate path must come back as floats, not nulls.
    #[tokio::test]
    #[ignore]
    async fn test_numeric_aggregates_decode_as_floats() {
        let result = executor(30_000)
            .execute(
                &local_descriptor(),
                "SELECT SUM(x) AS total, AVG(x) AS mean, 1.5::numeric AS lit \
                 FROM (VALUES (1::int8), (2::int8), (3::int8)) AS t(x)",
                &[],
            )
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["total", "mean", "lit"]);
        assert_eq!(
            result.rows[0],
            vec![Value::Float(6.0), Value::Float(2.0), Value::Float(1.5)]
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_undecodable_column_type_is_an_error() {
        let err = executor(30_000)
            .execute(
                &local_descriptor(),
                "SELECT '00000000-0000-0000-0000-000000000000'::uuid AS id",
                &[],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecutionError);
        assert!(err.message.contains("id"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_statement_timeout_fires() {
        let err = executor(200)
            .execute(&local_descriptor(), "SELECT pg_sleep(5)", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    #[ignore]
    async fn test_parameterized_query_binds_values() {
        let result = executor(30_000)
            .execute(
                &local_descriptor(),
                "SELECT $1::text AS a, $2::int8 AS b",
                &[
                    FilterValue::Text("west".to_string()),
                    FilterValue::Int(42),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            result.rows[0],
            vec![Value::Text("west".to_string()), Value::Int(42)]
        );
    }
}
