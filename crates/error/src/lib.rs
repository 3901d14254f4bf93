//! # quarry-error
//!
//! Unified error type for the Quarry chart query engine.
//!
//! Every error that crosses the chart executor boundary is a [`QuarryError`]:
//! - Numeric error codes (QUARRY-XXXX) grouped into [`ErrorKind`]s
//! - Structured JSON context
//! - Actionable hints for the caller

mod code;
mod context;
mod convert;

pub use code::{ErrorCode, ErrorKind};
pub use context::ErrorContext;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all Quarry operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarryError {
    /// Numeric error code (e.g., "QUARRY-1001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Suggestion for fixing the request or the stored configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl QuarryError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
            trace_id: None,
        }
    }

    pub fn config(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert_eq!(code.kind(), ErrorKind::Config);
        Self::new(code, message)
    }

    pub fn execution(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert_eq!(code.kind(), ErrorKind::Execution);
        Self::new(code, message)
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add a hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Add trace ID for correlation
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// HTTP status the API layer should answer with.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Serialize to JSON for API responses
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize QuarryError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }

    /// Serialize to pretty JSON for logging
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

impl fmt::Display for QuarryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for QuarryError {}

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;
