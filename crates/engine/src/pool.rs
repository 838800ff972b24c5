//! Connection pool registry.
//!
//! Pools are keyed by physical target (`host:port:database`), so two stored
//! connections pointing at the same database share one pool. Creation is
//! lazy with double-checked locking; the common path is a read lock and a
//! clone of the pool handle.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime,
};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};
use vantage_common::config::PoolSettings;
use vantage_common::models::ConnectionDescriptor;
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

/// Process-wide registry of Postgres connection pools.
pub struct PoolRegistry {
    pools: RwLock<HashMap<String, Pool>>,
    settings: PoolSettings,
}

impl PoolRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Check out a connection for the given target, creating the pool on
    /// first use. Checkout waits at most the connect timeout; an exhausted
    /// pool surfaces as `PoolExhausted` rather than queueing forever.
    pub async fn acquire(&self, descriptor: &ConnectionDescriptor) -> Result<Object> {
        let pool = self.pool_for(descriptor)?;

        // Evict connections that sat idle past the idle timeout before
        // handing one out. Cheap: walks only this pool's idle slots.
        let idle = Duration::from_millis(self.settings.idle_timeout_ms);
        pool.retain(|_, metrics| metrics.last_used() < idle);

        pool.get()
            .await
            .map_err(|e| checkout_error(e, descriptor))
    }

    fn pool_for(&self, descriptor: &ConnectionDescriptor) -> Result<Pool> {
        let key = descriptor.pool_key();

        {
            let pools = self.pools.read().map_err(poisoned)?;
            if let Some(pool) = pools.get(&key) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write().map_err(poisoned)?;
        // Double-check: another task may have created the pool while we
        // waited for the write lock.
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }

        let pool = self.build_pool(descriptor)?;
        info!(
            target: "pools",
            pool_key = %key,
            max_size = self.settings.max_size,
            "Created connection pool"
        );
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    fn build_pool(&self, descriptor: &ConnectionDescriptor) -> Result<Pool> {
        let connect_timeout = Duration::from_millis(self.settings.connect_timeout_ms);

        let mut cfg = PgConfig::new();
        cfg.host = Some(descriptor.host.clone());
        cfg.port = Some(descriptor.port);
        cfg.dbname = Some(descriptor.database.clone());
        cfg.user = descriptor.username.clone();
        cfg.password = descriptor
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string());
        cfg.connect_timeout = Some(connect_timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.settings.max_size);
        pool_cfg.timeouts.wait = Some(connect_timeout);
        pool_cfg.timeouts.create = Some(connect_timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| {
                VantageError::new(
                    ErrorCode::ConnectFailed,
                    format!("Failed to create pool for '{}': {}", descriptor.id, e),
                )
                .with_context(connection_context(descriptor))
            })
    }

    /// Number of pools currently open, for the stats endpoint.
    pub fn pool_count(&self) -> usize {
        self.pools.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Close every pool. In-flight checkouts fail from this point on.
    pub fn shutdown(&self) {
        let pools = match self.pools.write() {
            Ok(p) => p,
            Err(e) => {
                warn!("Pool registry lock poisoned during shutdown: {}", e);
                e.into_inner()
            }
        };
        for (key, pool) in pools.iter() {
            debug!(target: "pools", pool_key = %key, "Closing connection pool");
            pool.close();
        }
    }
}

fn checkout_error(err: PoolError, descriptor: &ConnectionDescriptor) -> VantageError {
    match err {
        PoolError::Timeout(_) => VantageError::new(
            ErrorCode::PoolExhausted,
            format!(
                "No connection available for '{}' within the connect timeout",
                descriptor.id
            ),
        )
        .with_context(connection_context(descriptor))
        .with_hint("The pool is saturated; retry, or raise pool.max_size"),
        PoolError::Backend(e) => VantageError::new(
            ErrorCode::ConnectFailed,
            format!("Failed to connect to '{}': {}", descriptor.id, e),
        )
        .with_context(connection_context(descriptor)),
        other => VantageError::new(
            ErrorCode::ConnectFailed,
            format!("Connection checkout for '{}' failed: {}", descriptor.id, other),
        )
        .with_context(connection_context(descriptor)),
    }
}

fn connection_context(descriptor: &ConnectionDescriptor) -> ErrorContext {
    ErrorContext::Connection {
        connection_id: descriptor.id.clone(),
        host: Some(descriptor.host.clone()),
        port: Some(descriptor.port),
        database: Some(descriptor.database.clone()),
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> VantageError {
    VantageError::new(ErrorCode::Internal, "Pool registry lock poisoned")
}
