use crate::{
    AggregatedImpact, CoreError, Entity, Prediction, PredictionSnapshot, Quote, SignalItem,
    StoredQuote,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Persistence seam for the pipeline. Implementors pick the storage
/// technology; the core only relies on these shapes and their invariants.
///
/// Writes are batch-shaped where the pipeline accumulates results in memory
/// first (snapshots, signal items), keeping "compute this cycle" separate
/// from "persist it".
#[async_trait]
pub trait MarketStore: Send + Sync {
    // Entities
    async fn entities(&self) -> Result<Vec<Entity>, CoreError>;
    async fn entity_by_symbol(&self, symbol: &str) -> Result<Option<Entity>, CoreError>;
    async fn upsert_entity(&self, entity: Entity) -> Result<(), CoreError>;

    // Quotes
    async fn save_quote(
        &self,
        symbol: &str,
        quote: Quote,
        as_of: DateTime<Utc>,
    ) -> Result<(), CoreError>;
    async fn latest_quote(&self, symbol: &str) -> Result<Option<StoredQuote>, CoreError>;
    /// Earliest stored quote observed at or after `at`, if any.
    async fn quote_at_or_after(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<StoredQuote>, CoreError>;
    async fn symbols_with_quotes(&self) -> Result<HashSet<String>, CoreError>;
    /// Stored quotes observed since `since`, oldest first. Feeds the
    /// volatility measure used by confidence scoring.
    async fn quotes_for_symbol(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredQuote>, CoreError>;

    // Signals and aggregates
    async fn append_signal_items(&self, items: Vec<SignalItem>) -> Result<(), CoreError>;
    async fn signals_for_symbol(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SignalItem>, CoreError>;
    async fn save_impact(&self, impact: AggregatedImpact) -> Result<(), CoreError>;

    // Predictions
    async fn insert_prediction(&self, prediction: Prediction) -> Result<(), CoreError>;
    async fn live_predictions(&self) -> Result<Vec<Prediction>, CoreError>;
    async fn closed_predictions(&self) -> Result<Vec<Prediction>, CoreError>;
    /// Replace a stored prediction. Implementations must refuse to touch a
    /// prediction that is already closed (`DataConsistency`).
    async fn update_prediction(&self, prediction: Prediction) -> Result<(), CoreError>;

    // Snapshots
    async fn append_snapshots(&self, snapshots: Vec<PredictionSnapshot>) -> Result<(), CoreError>;
    async fn snapshots_for_prediction(
        &self,
        prediction_id: &str,
    ) -> Result<Vec<PredictionSnapshot>, CoreError>;
}
