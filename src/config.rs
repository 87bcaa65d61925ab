//! Query engine configuration

use serde::{Deserialize, Serialize};

use crate::observability::{Logger, Severity};
use crate::query::{QueryError, QueryResult};

/// Projection evaluation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Items per page of a connection field without a `limit` param (default: 20)
    #[serde(default = "default_connection_limit")]
    pub connection_limit: i64,

    /// Merge single-id reference lookups on the same resource into one
    /// multi-get per resolution pass (default: true)
    #[serde(default = "default_coalesce_references")]
    pub coalesce_references: bool,

    /// Minimum severity of logged events (default: INFO)
    #[serde(default)]
    pub log_level: Severity,
}

fn default_connection_limit() -> i64 {
    20
}

fn default_coalesce_references() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connection_limit: default_connection_limit(),
            coalesce_references: default_coalesce_references(),
            log_level: Severity::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from JSON, missing keys take their default
    pub fn from_json(text: &str) -> QueryResult<Self> {
        serde_json::from_str(text).map_err(|e| QueryError::parse(format!("invalid config: {}", e)))
    }

    /// Stderr logger at the configured level
    pub fn logger(&self) -> Logger {
        Logger::stderr(self.log_level)
    }
}
