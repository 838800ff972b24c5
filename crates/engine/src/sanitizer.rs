//! Destructive-statement guard.
//!
//! Vantage executes analyst-authored SQL against live databases, so anything
//! that can mutate state is rejected up front by keyword scan. This is a
//! coarse filter by design: it has false positives (a column literally named
//! `update` inside a string cannot be distinguished without a full parser)
//! and the accepted failure mode is rejecting too much, never too little.

use once_cell::sync::Lazy;
use regex::Regex;
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

/// Keywords that fail the scan, case-insensitive, on word boundaries so that
/// e.g. `updated_at` passes.
static DESTRUCTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(drop|truncate|delete|update|insert|alter|grant|revoke)\b")
        .unwrap_or_else(|e| panic!("destructive keyword regex must compile: {e}"))
});

/// Scan `sql` and return it unchanged if clean.
///
/// Runs before any connection is acquired; a rejected statement never
/// touches a pool.
pub fn sanitize(sql: &str) -> Result<&str> {
    if let Some(m) = DESTRUCTIVE.find(sql) {
        let keyword = m.as_str().to_uppercase();
        return Err(VantageError::new(
            ErrorCode::DestructiveStatement,
            format!("Statement rejected: contains destructive keyword '{}'", keyword),
        )
        .with_context(ErrorContext::Destructive {
            keyword: keyword.clone(),
        })
        .with_hint(format!(
            "Vantage queries are read-only; remove the {} clause",
            keyword
        )));
    }
    Ok(sql)
}
