//! # vantage-error
//!
//! Unified error types for the Vantage query and analytics engine.
//!
//! All errors carry:
//! - Numeric error codes (VANTAGE-XXXX)
//! - Structured JSON context
//! - Actionable hints for self-correction

mod code;
mod context;
mod convert;
mod suggest;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;
pub use suggest::find_closest_match;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all Vantage operations.
///
/// Every failure that crosses the request boundary is one of these;
/// nothing is thrown past it uncaught.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VantageError {
    /// Numeric error code (e.g., "VANTAGE-2001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Actionable suggestion for correcting the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl VantageError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add an actionable hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Serialize to JSON for API responses
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize VantageError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for VantageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for VantageError {}

/// Result type alias for Vantage operations
pub type Result<T> = std::result::Result<T, VantageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_builder() {
        let err = VantageError::new(ErrorCode::UnknownField, "Field 'reveune' not found")
            .with_hint("Did you mean 'revenue'?");

        assert_eq!(err.code, ErrorCode::UnknownField);
        assert_eq!(err.message, "Field 'reveune' not found");
        assert_eq!(err.hint, Some("Did you mean 'revenue'?".to_string()));
        assert!(err.context.is_none());
    }

    #[test]
    fn test_display_implementation() {
        let err = VantageError::new(ErrorCode::DestructiveStatement, "Statement rejected")
            .with_hint("Remove the DELETE clause");

        assert_eq!(
            err.to_string(),
            "[VANTAGE-2001] Statement rejected (Hint: Remove the DELETE clause)"
        );

        let err_no_hint = VantageError::new(ErrorCode::Internal, "Crash");
        assert_eq!(err_no_hint.to_string(), "[VANTAGE-5001] Crash");
    }

    #[test]
    fn test_json_output() {
        let err = VantageError::new(ErrorCode::PoolExhausted, "Too many connections");
        let json = err.to_json();

        assert!(json.contains("\"code\":\"VANTAGE-1002\""));
        assert!(json.contains("\"message\":\"Too many connections\""));
    }
}
