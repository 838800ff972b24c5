//! Result cache for executed statements.
//!
//! Keys are human-scannable: the connection id plus a 200-char prefix of the
//! normalized statement text, then a short SHA-256 suffix so statements that
//! share a long prefix never collide. The readable prefix is what makes glob
//! invalidation (`sales-db:*`) work without an index.
//!
//! The cache is byte-bounded LRU (moka weigher) with a per-entry TTL. All
//! cache failures degrade to a miss; a broken cache slows queries down but
//! never fails them.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use vantage_common::config::CacheSettings;
use vantage_common::models::{QueryResult, Value};

/// Normalized-statement characters kept readable in the key before the hash.
const KEY_PREFIX_CHARS: usize = 200;

#[derive(Debug)]
struct CachedEntry {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    weight: u32,
}

pub struct ResultCache {
    inner: Option<Cache<String, Arc<CachedEntry>>>,
}

impl ResultCache {
    pub fn new(settings: &CacheSettings) -> Self {
        if !settings.enabled {
            return Self { inner: None };
        }

        let cache = Cache::builder()
            .max_capacity(settings.max_bytes)
            .time_to_live(Duration::from_secs(settings.ttl_seconds))
            .weigher(|_key: &String, entry: &Arc<CachedEntry>| entry.weight)
            .support_invalidation_closures()
            .build();

        Self { inner: Some(cache) }
    }

    /// Build the cache key for a statement on a connection.
    pub fn key(connection_id: &str, statement: &str) -> String {
        let normalized = normalize_statement(statement);
        let prefix: String = normalized.chars().take(KEY_PREFIX_CHARS).collect();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        format!("{}:{}#{}", connection_id, prefix, &digest[..16])
    }

    /// Look up a cached result. Every failure path is a miss.
    pub async fn get(&self, key: &str) -> Option<(Vec<String>, Vec<Vec<Value>>)> {
        let cache = self.inner.as_ref()?;
        let entry = cache.get(key).await?;
        debug!(target: "cache", key = %key, rows = entry.rows.len(), "Cache hit");
        Some((entry.columns.clone(), entry.rows.clone()))
    }

    /// Store a base (unpaginated, unaugmented) result.
    pub async fn put(&self, key: String, result: &QueryResult) {
        let Some(cache) = self.inner.as_ref() else {
            return;
        };
        let entry = CachedEntry {
            columns: result.columns.clone(),
            rows: result.rows.clone(),
            weight: estimate_weight(result),
        };
        cache.insert(key, Arc::new(entry)).await;
    }

    /// Invalidate entries by pattern. A trailing `*` makes it a prefix glob
    /// over the readable part of the key; anything else is an exact key.
    pub async fn invalidate(&self, pattern: &str) {
        let Some(cache) = self.inner.as_ref() else {
            return;
        };

        if let Some(prefix) = pattern.strip_suffix('*') {
            let prefix = prefix.to_string();
            if let Err(e) = cache.invalidate_entries_if(move |key, _| key.starts_with(&prefix)) {
                // Degrade: stale entries age out via TTL instead.
                warn!(target: "cache", pattern = %pattern, "Glob invalidation failed: {}", e);
            }
        } else {
            cache.invalidate(pattern).await;
        }
    }

    pub async fn invalidate_all(&self) {
        if let Some(cache) = self.inner.as_ref() {
            cache.invalidate_all();
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map(|c| c.entry_count()).unwrap_or(0)
    }

    /// Approximate bytes held, per the entry weigher.
    pub fn weighted_size(&self) -> u64 {
        self.inner.as_ref().map(|c| c.weighted_size()).unwrap_or(0)
    }

    /// Flush moka's internal maintenance queue so counts and evictions are
    /// visible. Test-facing; production code never needs it.
    pub async fn sync(&self) {
        if let Some(cache) = self.inner.as_ref() {
            cache.run_pending_tasks().await;
        }
    }
}

/// Lowercase, collapse whitespace, strip a trailing semicolon. Semantically
/// different statements must stay different; this only folds formatting.
fn normalize_statement(statement: &str) -> String {
    let folded = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    folded.trim_end_matches(';').trim().to_lowercase()
}

/// Approximate in-memory footprint of a result, in bytes. Overcounting a
/// little is fine; the bound exists to stop unbounded growth, not to be an
/// allocator audit.
fn estimate_weight(result: &QueryResult) -> u32 {
    let cells: u64 = result
        .rows
        .iter()
        .flat_map(|row| row.iter())
        .map(|v| match v {
            Value::Null | Value::Bool(_) => 1u64,
            Value::Int(_) | Value::Float(_) => 8,
            Value::Timestamp(_) => 12,
            Value::Text(s) => 8 + s.len() as u64,
        })
        .sum();
    let header: u64 = result.columns.iter().map(|c| c.len() as u64 + 8).sum();
    (cells + header + 64).try_into().unwrap_or(u32::MAX)
}
