pub mod evaluator;
pub mod lifecycle;
pub mod tracker;

pub use evaluator::{EvaluationOutcome, Evaluator};
pub use lifecycle::PredictionManager;
pub use tracker::{DeviationTracker, TrackCycleOutcome};

/// Price moves below this percent count as flat: direction-neutral.
pub const DEFAULT_MATERIALITY_PERCENT: f64 = 0.5;
