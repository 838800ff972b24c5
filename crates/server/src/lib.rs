//! Vantage Server: the HTTP API layer.
//!
//! Exposes the query engine over REST (JSON), plus:
//! - **/health**: liveness probe.
//! - **/metrics**: Prometheus exposition.
//!
//! Business endpoints live under `/api/v1`, see [`api`].

use anyhow::Context;
use axum::{response::IntoResponse, routing::get, Json, Router};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use vantage_common::config::AppConfig;
use vantage_engine::{CredentialResolver, FileCredentialResolver, QueryEngine};
use vantage_semantic::{FileModelRegistry, ModelRegistry};

// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static QUERY_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("vantage_queries_total", "Total number of queries received");
    let counter = IntCounter::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static QUERY_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("vantage_query_failures_total", "Total number of failed queries");
    let counter = IntCounter::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("vantage_cache_hits_total", "Queries served from the result cache");
    let counter = IntCounter::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static CACHE_MISSES: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("vantage_cache_misses_total", "Queries that went to the database");
    let counter = IntCounter::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static ACTIVE_QUERIES: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new("vantage_active_queries", "Queries currently in flight");
    let gauge = IntGauge::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub mod api;

pub struct VantageServer {
    config_path: String,
    api_router: Router,
}

impl Default for VantageServer {
    fn default() -> Self {
        Self {
            config_path: "config/vantage.yaml".to_string(),
            api_router: Router::new(),
        }
    }
}

impl VantageServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config_path: &str) -> Self {
        self.config_path = config_path.to_string();
        self
    }

    /// Extra routes merged under `/api/v1`, for embedders.
    pub fn with_api_router(mut self, router: Router) -> Self {
        self.api_router = router;
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = AppConfig::from_file(&self.config_path)
            .with_context(|| format!("Failed to load config '{}'", self.config_path))?;

        let resolver: Arc<dyn CredentialResolver> =
            match FileCredentialResolver::from_file(&config.connections_file) {
                Ok(r) => Arc::new(r),
                Err(e) => {
                    warn!(
                        file = %config.connections_file,
                        "No stored connections loaded: {}", e
                    );
                    Arc::new(FileCredentialResolver::from_connections(vec![]))
                }
            };

        let models: Arc<dyn ModelRegistry> = match FileModelRegistry::from_file(&config.models_file)
        {
            Ok(r) => Arc::new(r),
            Err(e) => {
                warn!(file = %config.models_file, "No semantic models loaded: {}", e);
                Arc::new(FileModelRegistry::empty())
            }
        };

        let engine = Arc::new(QueryEngine::new(&config, resolver, models));

        let app = Router::new()
            .nest(
                "/api/v1",
                api::create_api_router(engine.clone()).merge(self.api_router),
            )
            .route("/health", get(health))
            .route("/metrics", get(serve_metrics));

        let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;

        info!(
            listen_addr = %config.server.listen_addr,
            name = %config.server.name,
            "Vantage server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        engine.shutdown();
        info!("Vantage server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn serve_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
