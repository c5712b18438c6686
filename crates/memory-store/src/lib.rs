use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use signal_core::{
    AggregatedImpact, CoreError, Entity, MarketStore, Prediction, PredictionSnapshot,
    PredictionState, Quote, SignalItem, StoredQuote,
};
use std::collections::HashSet;

/// In-memory `MarketStore` used by tests and by embedders that persist
/// elsewhere. Keyed maps only; no cross-pass locking is needed because
/// batch jobs are invoked serially.
#[derive(Default)]
pub struct MemoryStore {
    entities: DashMap<String, Entity>,
    quotes: DashMap<String, Vec<StoredQuote>>,
    signals: DashMap<String, Vec<SignalItem>>,
    impacts: DashMap<String, Vec<AggregatedImpact>>,
    predictions: DashMap<String, Prediction>,
    snapshots: DashMap<String, Vec<PredictionSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn entities(&self) -> Result<Vec<Entity>, CoreError> {
        let mut all: Vec<Entity> = self.entities.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(all)
    }

    async fn entity_by_symbol(&self, symbol: &str) -> Result<Option<Entity>, CoreError> {
        Ok(self
            .entities
            .iter()
            .find(|e| e.value().symbol.eq_ignore_ascii_case(symbol))
            .map(|e| e.value().clone()))
    }

    async fn upsert_entity(&self, entity: Entity) -> Result<(), CoreError> {
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn save_quote(
        &self,
        symbol: &str,
        quote: Quote,
        as_of: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let symbol = symbol.to_uppercase();
        let mut series = self.quotes.entry(symbol.clone()).or_default();
        series.push(StoredQuote {
            symbol,
            quote,
            as_of,
        });
        series.sort_by_key(|q| q.as_of);
        Ok(())
    }

    async fn latest_quote(&self, symbol: &str) -> Result<Option<StoredQuote>, CoreError> {
        Ok(self
            .quotes
            .get(&symbol.to_uppercase())
            .and_then(|series| series.last().cloned()))
    }

    async fn quote_at_or_after(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<StoredQuote>, CoreError> {
        Ok(self.quotes.get(&symbol.to_uppercase()).and_then(|series| {
            series.iter().find(|q| q.as_of >= at).cloned()
        }))
    }

    async fn symbols_with_quotes(&self) -> Result<HashSet<String>, CoreError> {
        Ok(self
            .quotes
            .iter()
            .filter(|s| !s.value().is_empty())
            .map(|s| s.key().clone())
            .collect())
    }

    async fn quotes_for_symbol(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredQuote>, CoreError> {
        Ok(self
            .quotes
            .get(&symbol.to_uppercase())
            .map(|series| {
                series
                    .iter()
                    .filter(|q| q.as_of >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_signal_items(&self, items: Vec<SignalItem>) -> Result<(), CoreError> {
        for item in items {
            for symbol in &item.symbols {
                self.signals
                    .entry(symbol.to_uppercase())
                    .or_default()
                    .push(item.clone());
            }
        }
        Ok(())
    }

    async fn signals_for_symbol(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SignalItem>, CoreError> {
        Ok(self
            .signals
            .get(&symbol.to_uppercase())
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.published_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_impact(&self, impact: AggregatedImpact) -> Result<(), CoreError> {
        self.impacts
            .entry(impact.symbol.clone())
            .or_default()
            .push(impact);
        Ok(())
    }

    async fn insert_prediction(&self, prediction: Prediction) -> Result<(), CoreError> {
        if self.predictions.contains_key(&prediction.id) {
            return Err(CoreError::Storage(format!(
                "prediction {} already exists",
                prediction.id
            )));
        }
        self.predictions.insert(prediction.id.clone(), prediction);
        Ok(())
    }

    async fn live_predictions(&self) -> Result<Vec<Prediction>, CoreError> {
        let mut live: Vec<Prediction> = self
            .predictions
            .iter()
            .filter(|p| p.value().is_live())
            .map(|p| p.value().clone())
            .collect();
        live.sort_by_key(|p| p.baseline_at);
        Ok(live)
    }

    async fn closed_predictions(&self) -> Result<Vec<Prediction>, CoreError> {
        let mut closed: Vec<Prediction> = self
            .predictions
            .iter()
            .filter(|p| p.value().state == PredictionState::Closed)
            .map(|p| p.value().clone())
            .collect();
        closed.sort_by_key(|p| p.evaluated_at);
        Ok(closed)
    }

    async fn update_prediction(&self, prediction: Prediction) -> Result<(), CoreError> {
        let existing_state = match self.predictions.get(&prediction.id) {
            None => {
                return Err(CoreError::Storage(format!(
                    "prediction {} not found",
                    prediction.id
                )))
            }
            Some(existing) => existing.state,
        };
        if existing_state == PredictionState::Closed {
            return Err(CoreError::DataConsistency(format!(
                "prediction {} is already closed",
                prediction.id
            )));
        }
        self.predictions.insert(prediction.id.clone(), prediction);
        Ok(())
    }

    async fn append_snapshots(&self, snapshots: Vec<PredictionSnapshot>) -> Result<(), CoreError> {
        for snapshot in snapshots {
            self.snapshots
                .entry(snapshot.prediction_id.clone())
                .or_default()
                .push(snapshot);
        }
        Ok(())
    }

    async fn snapshots_for_prediction(
        &self,
        prediction_id: &str,
    ) -> Result<Vec<PredictionSnapshot>, CoreError> {
        Ok(self
            .snapshots
            .get(prediction_id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use signal_core::Direction;

    fn quote(price: f64) -> Quote {
        Quote {
            price,
            change: 0.0,
            change_percent: 0.0,
            high: price,
            low: price,
            open: price,
            previous_close: price,
        }
    }

    fn prediction(id: &str) -> Prediction {
        let now = Utc::now();
        Prediction {
            id: id.to_string(),
            entity_id: "e1".to_string(),
            symbol: "AAPL".to_string(),
            model_variant: "gated-v2".to_string(),
            direction: Direction::Up,
            confidence: 0.6,
            expected_change_percent: 2.0,
            baseline_price: 100.0,
            baseline_at: now,
            target_at: now + Duration::hours(24),
            state: PredictionState::Live,
            actual_direction: None,
            actual_change_percent: None,
            correct: None,
            evaluated_at: None,
        }
    }

    #[tokio::test]
    async fn test_quote_series_ordering() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .save_quote("aapl", quote(102.0), now + Duration::hours(2))
            .await
            .unwrap();
        store.save_quote("AAPL", quote(100.0), now).await.unwrap();

        let latest = store.latest_quote("AAPL").await.unwrap().unwrap();
        assert_eq!(latest.quote.price, 102.0);

        let at_or_after = store
            .quote_at_or_after("AAPL", now + Duration::hours(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at_or_after.quote.price, 102.0);

        assert!(store
            .quote_at_or_after("AAPL", now + Duration::hours(3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_closed_prediction_updates_are_refused() {
        let store = MemoryStore::new();
        let mut p = prediction("p1");
        store.insert_prediction(p.clone()).await.unwrap();

        p.state = PredictionState::Closed;
        p.correct = Some(true);
        p.evaluated_at = Some(Utc::now());
        store.update_prediction(p.clone()).await.unwrap();

        // A second close attempt must fail without corrupting state
        p.correct = Some(false);
        let err = store.update_prediction(p).await.unwrap_err();
        assert!(matches!(err, CoreError::DataConsistency(_)));

        let closed = store.closed_predictions().await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].correct, Some(true));
    }

    #[tokio::test]
    async fn test_signal_items_fan_out_per_symbol() {
        let store = MemoryStore::new();
        let item = SignalItem {
            source_id: "wire".to_string(),
            symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
            sentiment: signal_core::Sentiment::Positive,
            confidence: 0.9,
            source_weight: 1.0,
            engagement_weight: None,
            published_at: Utc::now(),
        };
        store.append_signal_items(vec![item]).await.unwrap();

        let since = Utc::now() - Duration::hours(1);
        assert_eq!(store.signals_for_symbol("AAPL", since).await.unwrap().len(), 1);
        assert_eq!(store.signals_for_symbol("msft", since).await.unwrap().len(), 1);
        assert!(store.signals_for_symbol("NVDA", since).await.unwrap().is_empty());
    }
}
