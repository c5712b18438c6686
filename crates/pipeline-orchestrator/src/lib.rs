use chrono::{Duration, Utc};
use market_scheduler::{MarketDataScheduler, SchedulerConfig};
use performance_analytics::{
    brier_score, calibration_bins, compute_report, expected_calibration_error, PerformanceFilter,
};
use prediction_engine::{DeviationTracker, Evaluator, PredictionManager};
use serde_json::json;
use signal_aggregation::{ConfidenceScorer, SignalNormalizer};
use signal_core::{
    BatchReport, ContentIngestionAdapter, CoreError, Entity, MarketStore, QuoteProvider,
    SignalItem,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

pub mod config;
pub use config::PipelineConfig;

/// Install the global tracing subscriber. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Narrowing parameters for the analyze operation.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsRequest {
    pub model_variant: Option<String>,
    pub sector: Option<String>,
    pub evaluated_from: Option<chrono::DateTime<Utc>>,
    pub evaluated_to: Option<chrono::DateTime<Utc>>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
}

/// Wires the pipeline components together and exposes the batch operations
/// external triggers invoke. The caller serializes invocations per
/// operation; each operation is one discrete pass.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn MarketStore>,
    quote_provider: Arc<dyn QuoteProvider>,
    adapters: Vec<Arc<dyn ContentIngestionAdapter>>,
    normalizer: SignalNormalizer,
    scorer: ConfidenceScorer,
    manager: PredictionManager,
    scheduler: tokio::sync::Mutex<MarketDataScheduler>,
    tracker: DeviationTracker,
    evaluator: Evaluator,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn MarketStore>,
        quote_provider: Arc<dyn QuoteProvider>,
        adapters: Vec<Arc<dyn ContentIngestionAdapter>>,
    ) -> Self {
        let scheduler = MarketDataScheduler::new(SchedulerConfig {
            cycle_budget: config.fetch_budget,
            min_fetch_interval: std::time::Duration::from_millis(config.fetch_pacing_ms),
            deactivation_threshold: config.deactivation_threshold,
        });

        Self {
            normalizer: SignalNormalizer::new(config.unknown_source_weight),
            scorer: ConfidenceScorer::new(config.confidence_model),
            manager: PredictionManager::new(
                config.prediction_horizon_hours,
                config.expected_move_percent,
            ),
            scheduler: tokio::sync::Mutex::new(scheduler),
            tracker: DeviationTracker::new(config.materiality_percent),
            evaluator: Evaluator::new(config.materiality_percent),
            config,
            store,
            quote_provider,
            adapters,
        }
    }

    /// Poll every ingestion adapter, aggregate fresh signals per entity, and
    /// create predictions where the scorer does not suppress them.
    pub async fn ingest_and_aggregate(&self) -> BatchReport {
        let started = Instant::now();
        let now = Utc::now();
        let mut errors: Vec<String> = Vec::new();

        let mut items: Vec<SignalItem> = Vec::new();
        let mut rejected = 0usize;
        let mut config_failures = 0usize;

        for adapter in &self.adapters {
            match adapter.poll().await {
                Ok(batch) => {
                    for item in batch {
                        match validate_item(&item) {
                            Ok(()) => items.push(item),
                            Err(e) => {
                                rejected += 1;
                                errors.push(format!("{}: {}", adapter.source_id(), e));
                            }
                        }
                    }
                }
                Err(e) if e.is_configuration() => {
                    config_failures += 1;
                    errors.push(format!("adapter {} configuration: {}", adapter.source_id(), e));
                }
                Err(e) => {
                    errors.push(format!("adapter {}: {}", adapter.source_id(), e));
                }
            }
        }

        let mut counts = json!({
            "adapters": self.adapters.len(),
            "adapter_config_failures": config_failures,
            "items_ingested": items.len(),
            "items_rejected": rejected,
        });

        // Every configured adapter failing on configuration is systemic
        if !self.adapters.is_empty() && config_failures == self.adapters.len() {
            return BatchReport::failed("ingest-aggregate", started, counts, errors);
        }

        let (symbols, discovered) = match self.discover_entities(&items).await {
            Ok(v) => v,
            Err(e) => {
                errors.push(e.to_string());
                return BatchReport::failed("ingest-aggregate", started, counts, errors);
            }
        };

        if let Err(e) = self.store.append_signal_items(items).await {
            errors.push(e.to_string());
            return BatchReport::failed("ingest-aggregate", started, counts, errors);
        }

        let mut created = 0usize;
        let mut suppressed = 0usize;
        let mut skipped_no_price = 0usize;

        for symbol in &symbols {
            match self.score_symbol(symbol, now).await {
                Ok(ScoreOutcome::Created) => created += 1,
                Ok(ScoreOutcome::Suppressed) => suppressed += 1,
                Ok(ScoreOutcome::NoPrice) => skipped_no_price += 1,
                Err(e) => errors.push(format!("{}: {}", symbol, e)),
            }
        }

        counts["entities_discovered"] = json!(discovered);
        counts["entities_scored"] = json!(symbols.len());
        counts["predictions_created"] = json!(created);
        counts["suppressed"] = json!(suppressed);
        counts["skipped_no_price"] = json!(skipped_no_price);

        BatchReport::completed("ingest-aggregate", started, counts, errors)
    }

    /// One budgeted, tiered market-data refresh cycle, followed by the
    /// evaluator cleanup over entities the cycle unblocked.
    pub async fn refresh_market_data(&self) -> BatchReport {
        let started = Instant::now();

        let outcome = {
            let mut scheduler = self.scheduler.lock().await;
            match scheduler
                .run_cycle(self.store.as_ref(), self.quote_provider.as_ref())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    return BatchReport::failed(
                        "prioritized-fetch",
                        started,
                        json!({}),
                        vec![e.to_string()],
                    )
                }
            }
        };

        let mut errors = outcome.errors.clone();
        let mut counts = json!({
            "selected": outcome.selected,
            "fetched": outcome.fetched,
            "failed": outcome.failed,
            "deactivated": outcome.deactivated,
        });

        if !outcome.unblocked.is_empty() {
            match self
                .evaluator
                .evaluate_for_entities(self.store.as_ref(), &outcome.unblocked)
                .await
            {
                Ok(cleanup) => {
                    counts["evaluated_after_refresh"] = json!(cleanup.evaluated);
                    errors.extend(cleanup.errors);
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        BatchReport::completed("prioritized-fetch", started, counts, errors)
    }

    /// Snapshot every live, not-yet-due prediction against the latest price.
    pub async fn track_live(&self) -> BatchReport {
        let started = Instant::now();
        match self.tracker.run_cycle(self.store.as_ref()).await {
            Ok(outcome) => BatchReport::completed(
                "track",
                started,
                json!({ "tracked": outcome.tracked, "skipped": outcome.skipped }),
                outcome.errors,
            ),
            Err(e) => BatchReport::failed("track", started, json!({}), vec![e.to_string()]),
        }
    }

    /// Close every matured prediction with an available post-target price.
    pub async fn evaluate_due(&self) -> BatchReport {
        let started = Instant::now();
        match self.evaluator.evaluate_due(self.store.as_ref()).await {
            Ok(outcome) => BatchReport::completed(
                "evaluate",
                started,
                json!({
                    "evaluated": outcome.evaluated,
                    "pending": outcome.pending,
                    "correct": outcome.correct,
                    "incorrect": outcome.incorrect,
                }),
                outcome.errors,
            ),
            Err(e) => BatchReport::failed("evaluate", started, json!({}), vec![e.to_string()]),
        }
    }

    /// Aggregate performance and calibration over closed predictions.
    pub async fn analyze(&self, request: AnalyticsRequest) -> BatchReport {
        let started = Instant::now();

        let closed = match self.store.closed_predictions().await {
            Ok(closed) => closed,
            Err(e) => {
                return BatchReport::failed("analyze", started, json!({}), vec![e.to_string()])
            }
        };

        let symbols = match self.resolve_sector(&request.sector).await {
            Ok(symbols) => symbols,
            Err(e) => {
                return BatchReport::failed("analyze", started, json!({}), vec![e.to_string()])
            }
        };

        let filter = PerformanceFilter {
            model_variant: request.model_variant,
            symbols,
            evaluated_from: request.evaluated_from,
            evaluated_to: request.evaluated_to,
            min_confidence: request.min_confidence,
            max_confidence: request.max_confidence,
        };
        let matched = filter.apply(&closed);

        let report = compute_report(&matched);
        let bins = calibration_bins(&matched, 10);
        let ece = expected_calibration_error(&bins);
        let brier = brier_score(&matched);

        BatchReport::completed(
            "analyze",
            started,
            json!({
                "closed_total": closed.len(),
                "matched": matched.len(),
                "performance": report,
                "calibration_bins": bins,
                "expected_calibration_error": ece,
                "brier_score": brier,
            }),
            Vec::new(),
        )
    }

    /// Ensure an entity exists for every mentioned symbol. Returns the set
    /// of touched symbols and how many entities were newly created.
    async fn discover_entities(
        &self,
        items: &[SignalItem],
    ) -> Result<(HashSet<String>, usize), CoreError> {
        let mut symbols = HashSet::new();
        for item in items {
            for symbol in &item.symbols {
                symbols.insert(symbol.to_uppercase());
            }
        }

        let mut discovered = 0usize;
        for symbol in &symbols {
            if self.store.entity_by_symbol(symbol).await?.is_none() {
                self.store.upsert_entity(Entity::new(symbol.clone())).await?;
                discovered += 1;
                tracing::info!(symbol = %symbol, "discovered new entity");
            }
        }
        Ok((symbols, discovered))
    }

    async fn score_symbol(
        &self,
        symbol: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<ScoreOutcome, CoreError> {
        let since = now - Duration::hours(self.config.signal_window_hours);
        let signals = self.store.signals_for_symbol(symbol, since).await?;
        let impact = self
            .normalizer
            .aggregate(symbol, self.config.signal_window_hours, &signals, now);
        self.store.save_impact(impact.clone()).await?;

        let recent = self.store.quotes_for_symbol(symbol, since).await?;
        let prices: Vec<f64> = recent.iter().map(|q| q.quote.price).collect();
        let volatility = if prices.len() >= 2 {
            Some(signal_aggregation::confidence::return_volatility(&prices))
        } else {
            None
        };

        let scored = match self.scorer.score(&impact, volatility) {
            Some(scored) => scored,
            None => return Ok(ScoreOutcome::Suppressed),
        };

        let entity = self
            .store
            .entity_by_symbol(symbol)
            .await?
            .ok_or_else(|| CoreError::Storage(format!("entity {} vanished", symbol)))?;
        let latest_quote = self.store.latest_quote(symbol).await?;

        match self
            .manager
            .create(&entity, &scored, latest_quote.as_ref(), now)
        {
            Some(prediction) => {
                self.store.insert_prediction(prediction).await?;
                Ok(ScoreOutcome::Created)
            }
            None => Ok(ScoreOutcome::NoPrice),
        }
    }

    async fn resolve_sector(
        &self,
        sector: &Option<String>,
    ) -> Result<Option<HashSet<String>>, CoreError> {
        let Some(sector) = sector else {
            return Ok(None);
        };
        let entities = self.store.entities().await?;
        Ok(Some(
            entities
                .into_iter()
                .filter(|e| e.sector.as_deref() == Some(sector.as_str()))
                .map(|e| e.symbol)
                .collect(),
        ))
    }
}

enum ScoreOutcome {
    Created,
    Suppressed,
    NoPrice,
}

fn validate_item(item: &SignalItem) -> Result<(), CoreError> {
    if item.symbols.is_empty() {
        return Err(CoreError::Validation(
            "signal item mentions no symbols".to_string(),
        ));
    }
    if !item.confidence.is_finite() || !(0.0..=1.0).contains(&item.confidence) {
        return Err(CoreError::Validation(format!(
            "confidence {} outside [0,1]",
            item.confidence
        )));
    }
    if !item.source_weight.is_finite() {
        return Err(CoreError::Validation("source weight is not finite".to_string()));
    }
    Ok(())
}
