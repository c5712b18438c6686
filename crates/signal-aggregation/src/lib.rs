pub mod confidence;
pub mod normalizer;

pub use confidence::{ConfidenceModel, ConfidenceScorer, ScoredSignal};
pub use normalizer::SignalNormalizer;
