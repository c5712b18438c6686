use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{CoreError, MarketStore, Movement, Prediction, PredictionState};
use std::collections::HashSet;

/// Aggregated result of one evaluation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub evaluated: usize,
    /// Due predictions still waiting for a price at or after their target.
    pub pending: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub errors: Vec<String>,
}

/// Closes matured predictions by comparing the realized move against the
/// predicted one. Idempotent: closed predictions are detected via state and
/// never re-evaluated.
pub struct Evaluator {
    materiality_percent: f64,
}

impl Evaluator {
    pub fn new(materiality_percent: f64) -> Self {
        Self {
            materiality_percent,
        }
    }

    /// Evaluate every live prediction whose target timestamp has passed.
    pub async fn evaluate_due(
        &self,
        store: &dyn MarketStore,
    ) -> Result<EvaluationOutcome, CoreError> {
        self.evaluate_filtered(store, None).await
    }

    /// Evaluate only predictions backed by the given entities — the batch
    /// cleanup step right after a scheduler cycle refreshed them.
    pub async fn evaluate_for_entities(
        &self,
        store: &dyn MarketStore,
        entity_ids: &[String],
    ) -> Result<EvaluationOutcome, CoreError> {
        let filter: HashSet<&str> = entity_ids.iter().map(|s| s.as_str()).collect();
        self.evaluate_filtered(store, Some(&filter)).await
    }

    async fn evaluate_filtered(
        &self,
        store: &dyn MarketStore,
        entity_filter: Option<&HashSet<&str>>,
    ) -> Result<EvaluationOutcome, CoreError> {
        let now = Utc::now();
        let live = store.live_predictions().await?;
        let mut outcome = EvaluationOutcome::default();

        for prediction in live {
            if !prediction.is_due(now) {
                continue;
            }
            if let Some(filter) = entity_filter {
                if !filter.contains(prediction.entity_id.as_str()) {
                    continue;
                }
            }

            match self.close(store, prediction, now).await {
                Ok(Some(correct)) => {
                    outcome.evaluated += 1;
                    if correct {
                        outcome.correct += 1;
                    } else {
                        outcome.incorrect += 1;
                    }
                }
                Ok(None) => outcome.pending += 1,
                Err(e) => outcome.errors.push(e.to_string()),
            }
        }

        tracing::info!(
            evaluated = outcome.evaluated,
            pending = outcome.pending,
            correct = outcome.correct,
            "evaluation pass finished"
        );
        Ok(outcome)
    }

    /// Close a single prediction. `Ok(None)` means no price at or after the
    /// target exists yet — retried next cycle.
    async fn close(
        &self,
        store: &dyn MarketStore,
        mut prediction: Prediction,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>, CoreError> {
        if prediction.state == PredictionState::Closed {
            tracing::warn!(
                prediction_id = %prediction.id,
                "prediction already closed, skipping re-evaluation"
            );
            return Err(CoreError::DataConsistency(format!(
                "prediction {} already closed",
                prediction.id
            )));
        }

        let quote = match store
            .quote_at_or_after(&prediction.symbol, prediction.target_at)
            .await?
        {
            Some(q) => q,
            None => return Ok(None),
        };
        if prediction.baseline_price <= 0.0 {
            return Err(CoreError::DataConsistency(format!(
                "prediction {} has no usable baseline price",
                prediction.id
            )));
        }

        let actual_change =
            (quote.quote.price - prediction.baseline_price) / prediction.baseline_price * 100.0;
        let movement = Movement::classify(actual_change, self.materiality_percent);
        let correct = match movement {
            Movement::Flat => false,
            m => m.matches(prediction.direction),
        };

        prediction.actual_direction = Some(movement);
        prediction.actual_change_percent = Some(actual_change);
        prediction.correct = Some(correct);
        prediction.evaluated_at = Some(now);
        prediction.state = PredictionState::Closed;
        store.update_prediction(prediction).await?;

        Ok(Some(correct))
    }
}
