use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{CoreError, MarketStore, Movement, Prediction, PredictionSnapshot};

/// Aggregated result of one tracking pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackCycleOutcome {
    pub tracked: usize,
    /// Live predictions with no stored quote yet.
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Periodically snapshots live predictions against the latest price without
/// closing them.
pub struct DeviationTracker {
    materiality_percent: f64,
}

impl DeviationTracker {
    pub fn new(materiality_percent: f64) -> Self {
        Self {
            materiality_percent,
        }
    }

    /// One tracking pass over every live prediction whose target has not
    /// passed yet. Snapshots are computed first and appended in a single
    /// store call; prediction records are never touched.
    pub async fn run_cycle(&self, store: &dyn MarketStore) -> Result<TrackCycleOutcome, CoreError> {
        let now = Utc::now();
        let live = store.live_predictions().await?;

        let mut outcome = TrackCycleOutcome::default();
        let mut snapshots = Vec::new();

        for prediction in live.iter().filter(|p| !p.is_due(now)) {
            match self.observe(store, prediction, now).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => outcome.skipped += 1,
                Err(e) => outcome
                    .errors
                    .push(format!("{}: {}", prediction.symbol, e)),
            }
        }

        outcome.tracked = snapshots.len();
        store.append_snapshots(snapshots).await?;

        tracing::info!(
            tracked = outcome.tracked,
            skipped = outcome.skipped,
            errors = outcome.errors.len(),
            "live deviation tracking pass finished"
        );
        Ok(outcome)
    }

    async fn observe(
        &self,
        store: &dyn MarketStore,
        prediction: &Prediction,
        now: DateTime<Utc>,
    ) -> Result<Option<PredictionSnapshot>, CoreError> {
        let quote = match store.latest_quote(&prediction.symbol).await? {
            Some(q) => q,
            None => return Ok(None),
        };
        if prediction.baseline_price <= 0.0 {
            return Err(CoreError::Validation(format!(
                "prediction {} has non-positive baseline",
                prediction.id
            )));
        }

        let change_percent =
            (quote.quote.price - prediction.baseline_price) / prediction.baseline_price * 100.0;
        let deviation = (change_percent - prediction.expected_change_percent).abs();

        let correct_so_far = match Movement::classify(change_percent, self.materiality_percent) {
            Movement::Flat => None,
            movement => Some(movement.matches(prediction.direction)),
        };

        Ok(Some(PredictionSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            prediction_id: prediction.id.clone(),
            sampled_at: now,
            price: quote.quote.price,
            change_percent,
            deviation,
            correct_so_far,
        }))
    }
}
