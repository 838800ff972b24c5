use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following VANTAGE-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Connection errors
/// - **2000-2999**: Query errors
/// - **3000-3999**: Configuration errors
/// - **4000-4999**: Analytics errors
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Connection Errors (1000-1999) ===
    /// VANTAGE-1001: Network/auth handshake to the target database failed
    ConnectFailed = 1001,
    /// VANTAGE-1002: Connection pool exhausted before the connect timeout
    PoolExhausted = 1002,
    /// VANTAGE-1003: Connection id not present in the stored-connection registry
    UnknownConnection = 1003,

    // === Query Errors (2000-2999) ===
    /// VANTAGE-2001: Statement rejected by the destructive-keyword sanitizer
    DestructiveStatement = 2001,
    /// VANTAGE-2002: Statement exceeded the execution timeout
    Timeout = 2002,
    /// VANTAGE-2003: Driver/SQL error surfaced verbatim
    ExecutionError = 2003,
    /// VANTAGE-2004: Dimension or metric name not present in the semantic model
    UnknownField = 2004,
    /// VANTAGE-2005: Semantic model id not present in the registry
    UnknownModel = 2005,
    /// VANTAGE-2006: Malformed execute request (e.g. both sql and semantic)
    InvalidRequest = 2006,

    // === Configuration Errors (3000-3999) ===
    /// VANTAGE-3001: Invalid application configuration
    InvalidConfig = 3001,
    /// VANTAGE-3002: Semantic model definition failed validation
    InvalidModel = 3002,
    /// VANTAGE-3003: Invalid YAML syntax
    InvalidYaml = 3003,

    // === Analytics Errors (4000-4999) ===
    /// VANTAGE-4001: Too few data points for the requested analytic
    InsufficientData = 4001,
    /// VANTAGE-4002: Cluster count outside [2, row count]
    InvalidK = 4002,
    /// VANTAGE-4003: Named column absent from the result set
    MissingColumn = 4003,

    // === Internal Errors (5000-5999) ===
    /// VANTAGE-5001: Unexpected internal state
    Internal = 5001,
    /// VANTAGE-5002: Serialization/deserialization failed
    SerializationFailed = 5002,

    /// VANTAGE-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "VANTAGE-2004")
    pub fn as_str(&self) -> String {
        format!("VANTAGE-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Connection,
            2000..=2999 => ErrorCategory::Query,
            3000..=3999 => ErrorCategory::Config,
            4000..=4999 => ErrorCategory::Analytics,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("VANTAGE-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::ConnectFailed),
            1002 => Ok(Self::PoolExhausted),
            1003 => Ok(Self::UnknownConnection),
            2001 => Ok(Self::DestructiveStatement),
            2002 => Ok(Self::Timeout),
            2003 => Ok(Self::ExecutionError),
            2004 => Ok(Self::UnknownField),
            2005 => Ok(Self::UnknownModel),
            2006 => Ok(Self::InvalidRequest),
            3001 => Ok(Self::InvalidConfig),
            3002 => Ok(Self::InvalidModel),
            3003 => Ok(Self::InvalidYaml),
            4001 => Ok(Self::InsufficientData),
            4002 => Ok(Self::InvalidK),
            4003 => Ok(Self::MissingColumn),
            5001 => Ok(Self::Internal),
            5002 => Ok(Self::SerializationFailed),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category for HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Connection,
    Query,
    Config,
    Analytics,
    Internal,
}
