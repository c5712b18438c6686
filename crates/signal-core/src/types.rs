use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked financial instrument.
///
/// Created on first discovery from an ingested signal. Deactivated when
/// consecutive quote fetches keep failing; reactivation is manual only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub symbol: String,
    pub sector: Option<String>,
    pub active: bool,
    pub consecutive_failures: u32,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into().to_uppercase(),
            sector: None,
            active: true,
            consecutive_failures: 0,
            last_fetched_at: None,
        }
    }

    /// Record a successful quote fetch: failure streak resets to zero.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.last_fetched_at = Some(at);
    }

    /// Record a failed quote fetch. The fetch timestamp still advances so
    /// staleness ordering keeps progressing. Returns `true` when the streak
    /// reaches `threshold` and the entity was deactivated.
    pub fn record_failure(&mut self, threshold: u32, at: DateTime<Utc>) -> bool {
        self.consecutive_failures += 1;
        self.last_fetched_at = Some(at);
        if self.active && self.consecutive_failures >= threshold {
            self.active = false;
            return true;
        }
        false
    }

    /// Manual reset after deactivation.
    pub fn reactivate(&mut self) {
        self.active = true;
        self.consecutive_failures = 0;
    }
}

/// Sentiment category of a single source's opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn direction_value(&self) -> f64 {
        match self {
            Sentiment::Positive => 1.0,
            Sentiment::Negative => -1.0,
            Sentiment::Neutral => 0.0,
        }
    }
}

/// One source's opinion about one or more entities. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalItem {
    pub source_id: String,
    pub symbols: Vec<String>,
    pub sentiment: Sentiment,
    /// Classifier confidence in [0,1].
    pub confidence: f64,
    /// Trust weight of the producing source.
    pub source_weight: f64,
    /// Optional engagement-derived multiplier (shares, replies, ...).
    pub engagement_weight: Option<f64>,
    pub published_at: DateTime<Utc>,
}

impl SignalItem {
    pub fn mentions(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }
}

/// Weighted multi-source sentiment score for one entity and time window.
/// Recomputed each pass, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedImpact {
    pub symbol: String,
    pub window_hours: i64,
    /// Always within [-1, 1]. Zero total weight yields exactly 0.0.
    pub score: f64,
    pub item_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// Quote shape produced by an external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub previous_close: f64,
}

/// A quote as persisted, stamped with symbol and observation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredQuote {
    pub symbol: String,
    pub quote: Quote,
    pub as_of: DateTime<Utc>,
}

/// Predicted side of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }

    /// Direction implied by an aggregated score. Zero carries no direction.
    pub fn from_score(score: f64) -> Option<Self> {
        if score > 0.0 {
            Some(Direction::Up)
        } else if score < 0.0 {
            Some(Direction::Down)
        } else {
            None
        }
    }
}

/// Observed price movement. `Flat` means the move stayed below the
/// materiality threshold and carries no direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Movement {
    Up,
    Down,
    Flat,
}

impl Movement {
    pub fn classify(change_percent: f64, materiality_percent: f64) -> Self {
        if change_percent.abs() < materiality_percent {
            Movement::Flat
        } else if change_percent > 0.0 {
            Movement::Up
        } else {
            Movement::Down
        }
    }

    pub fn matches(&self, predicted: Direction) -> bool {
        matches!(
            (self, predicted),
            (Movement::Up, Direction::Up) | (Movement::Down, Direction::Down)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionState {
    Live,
    Closed,
}

/// A directional, confidence-scored prediction for one entity.
///
/// State moves strictly Live -> Closed; terminal fields stay `None` until
/// the evaluator closes the prediction, and are written at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub entity_id: String,
    pub symbol: String,
    /// Tag of the confidence formula that produced this prediction.
    pub model_variant: String,
    pub direction: Direction,
    pub confidence: f64,
    /// Signed magnitude the tracker measures deviation against.
    pub expected_change_percent: f64,
    pub baseline_price: f64,
    pub baseline_at: DateTime<Utc>,
    pub target_at: DateTime<Utc>,
    pub state: PredictionState,
    pub actual_direction: Option<Movement>,
    pub actual_change_percent: Option<f64>,
    pub correct: Option<bool>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl Prediction {
    pub fn is_live(&self) -> bool {
        self.state == PredictionState::Live
    }

    /// Whether the target timestamp has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.target_at <= now
    }
}

/// Point-in-time observation of a live prediction. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub id: String,
    pub prediction_id: String,
    pub sampled_at: DateTime<Utc>,
    pub price: f64,
    pub change_percent: f64,
    /// |observed change - expected change|.
    pub deviation: f64,
    /// `None` while the movement is still flat.
    pub correct_so_far: Option<bool>,
}
