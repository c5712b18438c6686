use signal_core::{stats, AggregatedImpact, Direction};

/// Minimum absolute impact score before a prediction is worth making.
pub const MIN_SIGNAL_THRESHOLD: f64 = 0.15;

const GATED_FLOOR: f64 = 0.40;
const GATED_CEILING: f64 = 0.95;
const LEGACY_FLOOR: f64 = 0.30;
const LEGACY_CEILING: f64 = 0.95;

/// Which confidence formula a scorer applies. The gated formula is the
/// system of record; the legacy one exists only to reproduce historical
/// backtests and is never mixed with the gated one inside a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceModel {
    Gated,
    LegacyV1,
}

impl ConfidenceModel {
    /// Stable tag recorded on every prediction the model produces.
    pub fn variant_tag(&self) -> &'static str {
        match self {
            ConfidenceModel::Gated => "gated-v2",
            ConfidenceModel::LegacyV1 => "legacy-v1",
        }
    }
}

/// A non-suppressed scoring result: direction plus bounded confidence.
#[derive(Debug, Clone)]
pub struct ScoredSignal {
    pub direction: Direction,
    pub confidence: f64,
    pub signal_strength: f64,
    pub model_variant: &'static str,
}

/// Turns an aggregated impact into a gated, bounded confidence value.
pub struct ConfidenceScorer {
    model: ConfidenceModel,
}

impl ConfidenceScorer {
    pub fn new(model: ConfidenceModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> ConfidenceModel {
        self.model
    }

    /// Score an impact. `None` means the signal was suppressed and no
    /// prediction may be created — distinct from a low confidence value.
    pub fn score(&self, impact: &AggregatedImpact, volatility: Option<f64>) -> Option<ScoredSignal> {
        let direction = Direction::from_score(impact.score)?;
        let signal_strength = impact.score.abs();
        let volatility = volatility.unwrap_or(0.0).max(0.0);

        let confidence = match self.model {
            ConfidenceModel::Gated => {
                if signal_strength < MIN_SIGNAL_THRESHOLD {
                    tracing::debug!(
                        symbol = %impact.symbol,
                        signal_strength,
                        "signal below threshold, suppressing prediction"
                    );
                    return None;
                }
                let volatility_penalty = (volatility * 2.0).min(0.10);
                (GATED_FLOOR + signal_strength * 0.70 - volatility_penalty)
                    .clamp(GATED_FLOOR, GATED_CEILING)
            }
            ConfidenceModel::LegacyV1 => {
                let base = (impact.score.clamp(-1.0, 1.0) * 0.6).abs() * 0.95 + 0.25;
                let volatility_penalty = (volatility * 3.0).min(0.15);
                (base - volatility_penalty).clamp(LEGACY_FLOOR, LEGACY_CEILING)
            }
        };

        Some(ScoredSignal {
            direction,
            confidence,
            signal_strength,
            model_variant: self.model.variant_tag(),
        })
    }
}

/// Volatility measure used by the scorer: sample standard deviation of
/// successive simple returns over a recent price series.
pub fn return_volatility(prices: &[f64]) -> f64 {
    stats::std_dev(&stats::simple_returns(prices))
}
