use anyhow::Result;
use signal_aggregation::ConfidenceModel;
use std::env;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Market data refresh
    pub fetch_budget: usize,            // quotes per cycle
    pub fetch_pacing_ms: u64,           // min delay between quote calls
    pub deactivation_threshold: u32,    // consecutive failures before shutoff

    // Signal aggregation
    pub signal_window_hours: i64,
    pub unknown_source_weight: f64,
    pub confidence_model: ConfidenceModel,

    // Predictions
    pub prediction_horizon_hours: i64,
    pub expected_move_percent: f64,
    pub materiality_percent: f64,       // flat threshold for grading
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let confidence_model = match env::var("CONFIDENCE_MODEL")
            .unwrap_or_else(|_| "gated".to_string())
            .to_lowercase()
            .as_str()
        {
            "legacy" => ConfidenceModel::LegacyV1,
            _ => ConfidenceModel::Gated,
        };

        let config = Self {
            fetch_budget: env::var("FETCH_BUDGET")
                .unwrap_or_else(|_| "25".to_string())
                .parse()?,
            fetch_pacing_ms: env::var("FETCH_PACING_MS")
                .unwrap_or_else(|_| "1200".to_string())
                .parse()?,
            deactivation_threshold: env::var("DEACTIVATION_THRESHOLD")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            signal_window_hours: env::var("SIGNAL_WINDOW_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()?,
            unknown_source_weight: env::var("UNKNOWN_SOURCE_WEIGHT")
                .unwrap_or_else(|_| "0.25".to_string())
                .parse()?,
            confidence_model,

            prediction_horizon_hours: env::var("PREDICTION_HORIZON_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()?,
            expected_move_percent: env::var("EXPECTED_MOVE_PERCENT")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()?,
            materiality_percent: env::var("MATERIALITY_PERCENT")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
        };

        Ok(config)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_budget: 25,
            fetch_pacing_ms: 1200,
            deactivation_threshold: 5,
            signal_window_hours: 24,
            unknown_source_weight: 0.25,
            confidence_model: ConfidenceModel::Gated,
            prediction_horizon_hours: 24,
            expected_move_percent: 2.0,
            materiality_percent: 0.5,
        }
    }
}
