use chrono::{DateTime, Duration, Utc};
use signal_aggregation::ScoredSignal;
use signal_core::{Entity, Prediction, PredictionState, StoredQuote};

/// Creates live predictions from non-suppressed scoring results.
pub struct PredictionManager {
    horizon: Duration,
    expected_move_percent: f64,
}

impl PredictionManager {
    pub fn new(horizon_hours: i64, expected_move_percent: f64) -> Self {
        Self {
            horizon: Duration::hours(horizon_hours),
            expected_move_percent,
        }
    }

    /// Build a live prediction anchored at the current quote. Returns `None`
    /// when no usable price is available — that entity is skipped, the batch
    /// keeps going.
    pub fn create(
        &self,
        entity: &Entity,
        signal: &ScoredSignal,
        latest_quote: Option<&StoredQuote>,
        now: DateTime<Utc>,
    ) -> Option<Prediction> {
        let quote = match latest_quote {
            Some(q) if q.quote.price > 0.0 => q,
            _ => {
                tracing::warn!(
                    symbol = %entity.symbol,
                    "no current price available, skipping prediction"
                );
                return None;
            }
        };

        Some(Prediction {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity.id.clone(),
            symbol: entity.symbol.clone(),
            model_variant: signal.model_variant.to_string(),
            direction: signal.direction,
            confidence: signal.confidence,
            expected_change_percent: signal.direction.sign() * self.expected_move_percent,
            baseline_price: quote.quote.price,
            baseline_at: now,
            target_at: now + self.horizon,
            state: PredictionState::Live,
            actual_direction: None,
            actual_change_percent: None,
            correct: None,
            evaluated_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::{Direction, Quote};

    fn scored(direction: Direction, confidence: f64) -> ScoredSignal {
        ScoredSignal {
            direction,
            confidence,
            signal_strength: 0.4,
            model_variant: "gated-v2",
        }
    }

    fn stored_quote(price: f64) -> StoredQuote {
        StoredQuote {
            symbol: "AAPL".to_string(),
            quote: Quote {
                price,
                change: 0.0,
                change_percent: 0.0,
                high: price,
                low: price,
                open: price,
                previous_close: price,
            },
            as_of: Utc::now(),
        }
    }

    #[test]
    fn test_prediction_anchored_at_quote() {
        let manager = PredictionManager::new(24, 2.0);
        let entity = Entity::new("AAPL");
        let now = Utc::now();

        let prediction = manager
            .create(&entity, &scored(Direction::Down, 0.72), Some(&stored_quote(187.5)), now)
            .unwrap();

        assert_eq!(prediction.baseline_price, 187.5);
        assert_eq!(prediction.baseline_at, now);
        assert_eq!(prediction.target_at, now + Duration::hours(24));
        assert_eq!(prediction.state, PredictionState::Live);
        assert_eq!(prediction.expected_change_percent, -2.0);
        assert_eq!(prediction.model_variant, "gated-v2");
        assert!(prediction.correct.is_none());
    }

    #[test]
    fn test_missing_price_skips_creation() {
        let manager = PredictionManager::new(24, 2.0);
        let entity = Entity::new("AAPL");

        assert!(manager
            .create(&entity, &scored(Direction::Up, 0.6), None, Utc::now())
            .is_none());
        assert!(manager
            .create(
                &entity,
                &scored(Direction::Up, 0.6),
                Some(&stored_quote(0.0)),
                Utc::now()
            )
            .is_none());
    }
}
