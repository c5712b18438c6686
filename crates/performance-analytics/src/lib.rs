pub mod calibration;
pub mod metrics;

pub use calibration::{brier_score, calibration_bins, expected_calibration_error, CalibrationBin};
pub use metrics::{compute_report, signed_return, PerformanceFilter, PerformanceReport};
