//! # Error Contexts
//!
//! Structured metadata for errors to enable programmatic analysis.

use serde::{Deserialize, Serialize};

/// Structured context for machine-parseable errors.
///
/// Each variant provides specific fields relevant to that error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for VANTAGE-2004 (UnknownField)
    UnknownField {
        field: String,
        model: String,
        available_fields: Vec<String>,
    },

    /// Context for VANTAGE-2005 (UnknownModel)
    UnknownModel {
        model: String,
        available_models: Vec<String>,
    },

    /// Context for VANTAGE-2001 (DestructiveStatement)
    Destructive { keyword: String },

    /// Context for connection errors (VANTAGE-1001, 1002, 1003)
    Connection {
        connection_id: String,
        host: Option<String>,
        port: Option<u16>,
        database: Option<String>,
    },

    /// Context for VANTAGE-2002 (Timeout)
    Timeout { timeout_ms: u64 },

    /// Context for VANTAGE-4001/4002/4003 (analytics errors)
    Analytics {
        operation: String,
        required: Option<usize>,
        actual: Option<usize>,
        column: Option<String>,
    },

    /// Context for VANTAGE-3001/3002 (config errors)
    Config {
        file_path: Option<String>,
        field: Option<String>,
    },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}
