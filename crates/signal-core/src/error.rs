use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Single-entity network/provider failure. Increments that entity's
    /// failure counter; retried next cycle.
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// Malformed or unusable signal/quote data for one item.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing credential or config for an entire adapter. Aborts only that
    /// adapter's contribution for the current pass.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Attempt to re-evaluate a closed prediction, or evaluate without
    /// baseline/target data.
    #[error("Data consistency error: {0}")]
    DataConsistency(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoreError::Configuration(_))
    }
}
