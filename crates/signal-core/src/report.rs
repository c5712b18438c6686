use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result surface of one externally-triggered batch operation.
///
/// Per-item failures land in `errors` with `success` still true; only
/// systemic failures (configuration, storage) flip `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub operation: String,
    pub success: bool,
    pub counts: serde_json::Value,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn completed(
        operation: impl Into<String>,
        started: Instant,
        counts: serde_json::Value,
        errors: Vec<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            success: true,
            counts,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn failed(
        operation: impl Into<String>,
        started: Instant,
        counts: serde_json::Value,
        errors: Vec<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            success: false,
            counts,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}
