use chrono::{DateTime, Duration, Utc};
use signal_core::{AggregatedImpact, SignalItem};

/// Trust weight applied to items whose source cannot be attributed.
pub const DEFAULT_UNKNOWN_SOURCE_WEIGHT: f64 = 0.25;

/// Merges per-source sentiment items into one aggregated impact score per
/// entity. Pure: never mutates the input items.
pub struct SignalNormalizer {
    unknown_source_weight: f64,
}

impl SignalNormalizer {
    pub fn new(unknown_source_weight: f64) -> Self {
        Self {
            unknown_source_weight,
        }
    }

    /// Weighted impact over the items that mention `symbol` and fall inside
    /// the trailing window.
    ///
    /// score = sum(direction * weight * confidence) / sum(weight), clamped
    /// to [-1, 1]. Zero total weight (no items, or all zero-weight) yields
    /// exactly 0.0 — a defined neutral result, not an error.
    pub fn aggregate(
        &self,
        symbol: &str,
        window_hours: i64,
        items: &[SignalItem],
        now: DateTime<Utc>,
    ) -> AggregatedImpact {
        let cutoff = now - Duration::hours(window_hours);

        let mut total_score = 0.0;
        let mut total_weight = 0.0;
        let mut item_count = 0usize;

        for item in items {
            if !item.mentions(symbol) || item.published_at < cutoff {
                continue;
            }

            let weight = self.effective_weight(item);
            if weight <= 0.0 {
                continue;
            }

            total_score += item.sentiment.direction_value() * weight * item.confidence.clamp(0.0, 1.0);
            total_weight += weight;
            item_count += 1;
        }

        let score = if total_weight > 0.0 {
            (total_score / total_weight).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        tracing::debug!(
            symbol,
            score,
            item_count,
            window_hours,
            "aggregated signal impact"
        );

        AggregatedImpact {
            symbol: symbol.to_uppercase(),
            window_hours,
            score,
            item_count,
            computed_at: now,
        }
    }

    /// Source trust weight times the optional engagement multiplier. Items
    /// without a usable source attribution fall into the unknown bucket at
    /// a conservative weight instead of borrowing some known source's.
    fn effective_weight(&self, item: &SignalItem) -> f64 {
        let base = if item.source_id.trim().is_empty() || item.source_weight <= 0.0 {
            self.unknown_source_weight
        } else {
            item.source_weight
        };
        base * item.engagement_weight.unwrap_or(1.0).max(0.0)
    }
}

impl Default for SignalNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_UNKNOWN_SOURCE_WEIGHT)
    }
}
