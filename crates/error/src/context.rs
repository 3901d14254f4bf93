//! # Error Contexts
//!
//! Structured metadata attached to errors so API clients can react without
//! parsing messages.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for QUARRY-1001 / 1004 (field spec errors)
    FieldSpec {
        /// Which stored axis blob failed ("xAxis" / "yAxis")
        axis: Option<String>,
        field: Option<String>,
    },

    /// Context for QUARRY-1002 / 1006 (dataset errors)
    Dataset {
        dataset_id: String,
        kind: Option<String>,
    },

    /// Context for QUARRY-1005
    Chart { chart_id: String },

    /// Context for execution errors (QUARRY-2001..2005)
    Execution {
        /// SQLSTATE reported by the backing store, if any
        sql_state: Option<String>,
        fingerprint: Option<String>,
    },

    /// Context for QUARRY-4001 / 4002
    Security {
        user_id: Option<String>,
        dataset_id: Option<String>,
    },

    /// Context for QUARRY-1007 (configuration file errors)
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
