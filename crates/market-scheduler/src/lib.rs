use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{CoreError, Entity, MarketStore, Prediction, QuoteProvider};
use std::collections::HashSet;
use std::time::Duration;

pub mod pacer;
pub mod providers;
pub use pacer::Pacer;
pub use providers::{FallbackQuoteProvider, ProviderAttempt};

/// Priority class a batch slot was filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Backing a live prediction whose target has already passed; a fresh
    /// price unblocks the evaluator.
    EvaluationBlocking,
    /// No stored price data yet.
    NoData,
    /// Refreshed by staleness order.
    Stale,
}

/// One slot of a cycle's fetch plan.
#[derive(Debug, Clone)]
pub struct ScheduledFetch {
    pub entity: Entity,
    pub tier: Tier,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed per-cycle fetch budget.
    pub cycle_budget: usize,
    /// Mandatory minimum delay between external quote calls.
    pub min_fetch_interval: Duration,
    /// Consecutive failures before an entity is deactivated.
    pub deactivation_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_budget: 25,
            min_fetch_interval: Duration::from_millis(1200),
            deactivation_threshold: 5,
        }
    }
}

/// Aggregated result of one fetch cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchCycleOutcome {
    pub selected: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Symbols deactivated this cycle after reaching the failure threshold.
    pub deactivated: Vec<String>,
    /// Entity ids from the evaluation-blocking tier that were refreshed
    /// successfully; the caller runs the evaluator over these right away.
    pub unblocked: Vec<String>,
    pub errors: Vec<String>,
}

/// Greedy tiered selection, never exceeding `budget` and never picking the
/// same entity twice:
///
/// - Tier 0: active entities backing at least one overdue live prediction.
/// - Tier 1: active entities with no stored quote yet.
/// - Tier 2: remaining active entities, stalest first (never-fetched sorts
///   before any fetched entity).
pub fn select_batch(
    entities: &[Entity],
    live_predictions: &[Prediction],
    symbols_with_data: &HashSet<String>,
    budget: usize,
    now: DateTime<Utc>,
) -> Vec<ScheduledFetch> {
    let mut plan: Vec<ScheduledFetch> = Vec::with_capacity(budget);
    let mut taken: HashSet<&str> = HashSet::new();

    let blocking_ids: HashSet<&str> = live_predictions
        .iter()
        .filter(|p| p.is_live() && p.is_due(now))
        .map(|p| p.entity_id.as_str())
        .collect();

    for entity in entities.iter().filter(|e| e.active) {
        if plan.len() >= budget {
            return plan;
        }
        if blocking_ids.contains(entity.id.as_str()) && taken.insert(entity.id.as_str()) {
            plan.push(ScheduledFetch {
                entity: entity.clone(),
                tier: Tier::EvaluationBlocking,
            });
        }
    }

    for entity in entities.iter().filter(|e| e.active) {
        if plan.len() >= budget {
            return plan;
        }
        if !symbols_with_data.contains(&entity.symbol) && taken.insert(entity.id.as_str()) {
            plan.push(ScheduledFetch {
                entity: entity.clone(),
                tier: Tier::NoData,
            });
        }
    }

    let mut stale: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.active && !taken.contains(e.id.as_str()))
        .collect();
    // None (never fetched) sorts before every Some, then oldest first.
    stale.sort_by_key(|e| e.last_fetched_at);

    for entity in stale {
        if plan.len() >= budget {
            break;
        }
        taken.insert(entity.id.as_str());
        plan.push(ScheduledFetch {
            entity: entity.clone(),
            tier: Tier::Stale,
        });
    }

    plan
}

/// Refreshes quotes for a bounded, prioritized set of entities each cycle,
/// strictly sequentially with pacing between calls.
pub struct MarketDataScheduler {
    config: SchedulerConfig,
    pacer: Pacer,
}

impl MarketDataScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let pacer = Pacer::new(config.min_fetch_interval);
        Self { config, pacer }
    }

    /// One discrete fetch pass. Per-entity failures are accumulated, never
    /// fatal for the cycle.
    pub async fn run_cycle(
        &mut self,
        store: &dyn MarketStore,
        provider: &dyn QuoteProvider,
    ) -> Result<FetchCycleOutcome, CoreError> {
        let now = Utc::now();
        let entities = store.entities().await?;
        let live = store.live_predictions().await?;
        let with_data = store.symbols_with_quotes().await?;

        let plan = select_batch(&entities, &live, &with_data, self.config.cycle_budget, now);
        let mut outcome = FetchCycleOutcome {
            selected: plan.len(),
            ..Default::default()
        };
        tracing::info!(
            selected = plan.len(),
            budget = self.config.cycle_budget,
            "starting market data refresh cycle"
        );

        for slot in plan {
            self.pacer.wait().await;
            let mut entity = slot.entity;
            let fetched_at = Utc::now();

            match provider.fetch_quote(&entity.symbol).await {
                Ok(quote) if quote.price > 0.0 => {
                    store.save_quote(&entity.symbol, quote, fetched_at).await?;
                    entity.record_success(fetched_at);
                    store.upsert_entity(entity.clone()).await?;
                    outcome.fetched += 1;
                    if slot.tier == Tier::EvaluationBlocking {
                        outcome.unblocked.push(entity.id);
                    }
                }
                Ok(quote) => {
                    self.note_failure(
                        store,
                        &mut entity,
                        &mut outcome,
                        fetched_at,
                        CoreError::Validation(format!("non-positive price {}", quote.price)),
                    )
                    .await?;
                }
                Err(e) => {
                    self.note_failure(store, &mut entity, &mut outcome, fetched_at, e)
                        .await?;
                }
            }
        }

        tracing::info!(
            fetched = outcome.fetched,
            failed = outcome.failed,
            deactivated = outcome.deactivated.len(),
            "market data refresh cycle finished"
        );
        Ok(outcome)
    }

    async fn note_failure(
        &self,
        store: &dyn MarketStore,
        entity: &mut Entity,
        outcome: &mut FetchCycleOutcome,
        at: DateTime<Utc>,
        error: CoreError,
    ) -> Result<(), CoreError> {
        outcome.failed += 1;
        outcome
            .errors
            .push(format!("{}: {}", entity.symbol, error));

        let deactivated = entity.record_failure(self.config.deactivation_threshold, at);
        if deactivated {
            tracing::warn!(
                symbol = %entity.symbol,
                failures = entity.consecutive_failures,
                "entity deactivated after repeated fetch failures; manual reactivation required"
            );
            outcome.deactivated.push(entity.symbol.clone());
        }
        store.upsert_entity(entity.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use memory_store::MemoryStore;
    use signal_core::{Direction, PredictionState, Quote};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entity_with_id(symbol: &str, id: &str) -> Entity {
        let mut e = Entity::new(symbol);
        e.id = id.to_string();
        e
    }

    fn live_prediction(entity_id: &str, symbol: &str, due: bool) -> Prediction {
        let now = Utc::now();
        let target_at = if due {
            now - ChronoDuration::hours(1)
        } else {
            now + ChronoDuration::hours(12)
        };
        Prediction {
            id: uuid_like(entity_id),
            entity_id: entity_id.to_string(),
            symbol: symbol.to_string(),
            model_variant: "gated-v2".to_string(),
            direction: Direction::Up,
            confidence: 0.6,
            expected_change_percent: 2.0,
            baseline_price: 100.0,
            baseline_at: now - ChronoDuration::hours(24),
            target_at,
            state: PredictionState::Live,
            actual_direction: None,
            actual_change_percent: None,
            correct: None,
            evaluated_at: None,
        }
    }

    fn uuid_like(seed: &str) -> String {
        format!("pred-{}", seed)
    }

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

    #[test]
    fn test_tiered_selection_respects_budget() {
        let now = Utc::now();
        let mut entities = Vec::new();
        let mut predictions = Vec::new();
        let mut with_data = HashSet::new();

        for i in 0..3 {
            let id = format!("blocking-{}", i);
            let symbol = format!("BLK{}", i);
            let mut e = entity_with_id(&symbol, &id);
            e.last_fetched_at = Some(now - ChronoDuration::hours(2));
            with_data.insert(symbol.clone());
            predictions.push(live_prediction(&id, &symbol, true));
            entities.push(e);
        }
        for i in 0..20 {
            let symbol = format!("STL{}", i);
            let mut e = entity_with_id(&symbol, &format!("stale-{}", i));
            e.last_fetched_at = Some(now - ChronoDuration::hours(i + 1));
            with_data.insert(symbol);
            entities.push(e);
        }

        let plan = select_batch(&entities, &predictions, &with_data, 10, now);
        assert_eq!(plan.len(), 10);

        let tier0 = plan
            .iter()
            .filter(|s| s.tier == Tier::EvaluationBlocking)
            .count();
        let tier2 = plan.iter().filter(|s| s.tier == Tier::Stale).count();
        assert_eq!(tier0, 3);
        assert_eq!(tier2, 7);

        // No entity selected twice
        let unique: HashSet<&str> = plan.iter().map(|s| s.entity.id.as_str()).collect();
        assert_eq!(unique.len(), plan.len());
    }

    #[test]
    fn test_stale_tier_orders_never_fetched_first() {
        let now = Utc::now();
        let mut fresh = entity_with_id("FRESH", "a");
        fresh.last_fetched_at = Some(now - ChronoDuration::minutes(5));
        let mut old = entity_with_id("OLD", "b");
        old.last_fetched_at = Some(now - ChronoDuration::hours(30));
        let never = entity_with_id("NEVER", "c");

        // All symbols have data so everything lands in the stale tier
        let with_data: HashSet<String> = ["FRESH", "OLD", "NEVER"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let plan = select_batch(
            &[fresh, old, never],
            &[],
            &with_data,
            2,
            now,
        );
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].entity.symbol, "NEVER");
        assert_eq!(plan[1].entity.symbol, "OLD");
    }

    #[test]
    fn test_inactive_entities_never_selected() {
        let now = Utc::now();
        let mut dead = entity_with_id("DEAD", "dead");
        dead.active = false;

        let plan = select_batch(&[dead], &[], &HashSet::new(), 10, now);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_entities_without_data_outrank_stale_ones() {
        let now = Utc::now();
        let mut covered = entity_with_id("COVERED", "x");
        covered.last_fetched_at = Some(now - ChronoDuration::hours(100));
        let uncovered = entity_with_id("UNCOVERED", "y");

        let mut with_data = HashSet::new();
        with_data.insert("COVERED".to_string());

        let plan = select_batch(
            &[covered, uncovered],
            &[],
            &with_data,
            1,
            now,
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].entity.symbol, "UNCOVERED");
        assert_eq!(plan[0].tier, Tier::NoData);
    }

    struct ScriptedProvider {
        fail_symbols: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteProvider for ScriptedProvider {
        async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_symbols.iter().any(|s| s == symbol) {
                Err(CoreError::TransientFetch(format!("{} unavailable", symbol)))
            } else {
                Ok(quote(50.0))
            }
        }
    }

    #[tokio::test]
    async fn test_cycle_mixes_success_and_failure_without_aborting() {
        let store = MemoryStore::new();
        store.upsert_entity(entity_with_id("GOOD", "good")).await.unwrap();
        store.upsert_entity(entity_with_id("BAD", "bad")).await.unwrap();

        let provider = ScriptedProvider {
            fail_symbols: vec!["BAD".to_string()],
            calls: AtomicUsize::new(0),
        };
        let mut scheduler = MarketDataScheduler::new(SchedulerConfig {
            cycle_budget: 10,
            min_fetch_interval: Duration::ZERO,
            deactivation_threshold: 5,
        });

        let outcome = scheduler.run_cycle(&store, &provider).await.unwrap();
        assert_eq!(outcome.selected, 2);
        assert_eq!(outcome.fetched, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("BAD"));

        let good = store.entity_by_symbol("GOOD").await.unwrap().unwrap();
        assert_eq!(good.consecutive_failures, 0);
        assert!(good.last_fetched_at.is_some());
        let bad = store.entity_by_symbol("BAD").await.unwrap().unwrap();
        assert_eq!(bad.consecutive_failures, 1);
        // Failed fetch still advances the staleness clock
        assert!(bad.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_repeated_failures_deactivate_entity() {
        let store = MemoryStore::new();
        store.upsert_entity(entity_with_id("FLAKY", "flaky")).await.unwrap();

        let provider = ScriptedProvider {
            fail_symbols: vec!["FLAKY".to_string()],
            calls: AtomicUsize::new(0),
        };
        let mut scheduler = MarketDataScheduler::new(SchedulerConfig {
            cycle_budget: 5,
            min_fetch_interval: Duration::ZERO,
            deactivation_threshold: 5,
        });

        for cycle in 0..5 {
            let outcome = scheduler.run_cycle(&store, &provider).await.unwrap();
            if cycle < 4 {
                assert!(outcome.deactivated.is_empty());
            } else {
                assert_eq!(outcome.deactivated, vec!["FLAKY".to_string()]);
            }
        }

        let flaky = store.entity_by_symbol("FLAKY").await.unwrap().unwrap();
        assert!(!flaky.active);

        // Deactivated entities fall out of selection entirely
        let outcome = scheduler.run_cycle(&store, &provider).await.unwrap();
        assert_eq!(outcome.selected, 0);
    }

    #[tokio::test]
    async fn test_successful_tier0_fetch_reports_unblocked() {
        let store = MemoryStore::new();
        let entity = entity_with_id("DUE", "due-entity");
        store.upsert_entity(entity).await.unwrap();
        store
            .insert_prediction(live_prediction("due-entity", "DUE", true))
            .await
            .unwrap();

        let provider = ScriptedProvider {
            fail_symbols: vec![],
            calls: AtomicUsize::new(0),
        };
        let mut scheduler = MarketDataScheduler::new(SchedulerConfig {
            cycle_budget: 5,
            min_fetch_interval: Duration::ZERO,
            deactivation_threshold: 5,
        });

        let outcome = scheduler.run_cycle(&store, &provider).await.unwrap();
        assert_eq!(outcome.unblocked, vec!["due-entity".to_string()]);
    }
}
