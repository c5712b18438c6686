use serde::{Deserialize, Serialize};
use signal_core::Prediction;

/// One confidence bucket in the reliability breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// Mean stated confidence of the predictions in the bucket.
    pub avg_stated_confidence: f64,
    /// Fraction of those predictions that were graded correct.
    pub realized_accuracy: f64,
    /// realized - stated. Large magnitudes mean miscalibration — a
    /// reportable metric, not an error condition.
    pub gap: f64,
}

/// Bucket graded predictions by stated confidence into `n_bins` fixed-width
/// bins over [0,1]. Empty bins are omitted.
pub fn calibration_bins(predictions: &[&Prediction], n_bins: usize) -> Vec<CalibrationBin> {
    if n_bins == 0 {
        return Vec::new();
    }

    let mut confidence_sums = vec![0.0; n_bins];
    let mut correct_counts = vec![0usize; n_bins];
    let mut counts = vec![0usize; n_bins];

    for prediction in predictions {
        let correct = match prediction.correct {
            Some(c) => c,
            None => continue,
        };
        let idx = ((prediction.confidence * n_bins as f64) as usize).min(n_bins - 1);
        confidence_sums[idx] += prediction.confidence;
        counts[idx] += 1;
        if correct {
            correct_counts[idx] += 1;
        }
    }

    let width = 1.0 / n_bins as f64;
    (0..n_bins)
        .filter(|&i| counts[i] > 0)
        .map(|i| {
            let avg_stated = confidence_sums[i] / counts[i] as f64;
            let realized = correct_counts[i] as f64 / counts[i] as f64;
            CalibrationBin {
                lower: i as f64 * width,
                upper: (i + 1) as f64 * width,
                count: counts[i],
                avg_stated_confidence: avg_stated,
                realized_accuracy: realized,
                gap: realized - avg_stated,
            }
        })
        .collect()
}

/// Expected Calibration Error: count-weighted mean absolute gap across
/// bins. Lower is better.
pub fn expected_calibration_error(bins: &[CalibrationBin]) -> f64 {
    let total: usize = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    bins.iter()
        .map(|b| b.count as f64 / total as f64 * b.gap.abs())
        .sum()
}

/// Brier score: mean squared error of stated confidence against the binary
/// outcome. Lower is better.
pub fn brier_score(predictions: &[&Prediction]) -> f64 {
    let graded: Vec<(f64, bool)> = predictions
        .iter()
        .filter_map(|p| p.correct.map(|c| (p.confidence, c)))
        .collect();
    if graded.is_empty() {
        return 0.0;
    }
    graded
        .iter()
        .map(|(confidence, correct)| {
            let outcome = if *correct { 1.0 } else { 0.0 };
            (confidence - outcome).powi(2)
        })
        .sum::<f64>()
        / graded.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, Utc};
    use signal_core::{Direction, Movement, PredictionState};

    fn graded(confidence: f64, correct: bool) -> Prediction {
        let now = Utc::now();
        let actual = if correct { 2.0 } else { -2.0 };
        Prediction {
            id: uuid_ish(confidence, correct),
            entity_id: "e".to_string(),
            symbol: "AAPL".to_string(),
            model_variant: "gated-v2".to_string(),
            direction: Direction::Up,
            confidence,
            expected_change_percent: 2.0,
            baseline_price: 100.0,
            baseline_at: now - Duration::hours(48),
            target_at: now - Duration::hours(24),
            state: PredictionState::Closed,
            actual_direction: Some(if correct { Movement::Up } else { Movement::Down }),
            actual_change_percent: Some(actual),
            correct: Some(correct),
            evaluated_at: Some(now),
        }
    }

    fn uuid_ish(confidence: f64, correct: bool) -> String {
        format!("p-{}-{}", confidence, correct)
    }

    #[test]
    fn test_overconfident_bucket_reports_gap() {
        // ~70% stated confidence but only 45% realized accuracy
        let mut predictions = Vec::new();
        for i in 0..20 {
            predictions.push(graded(0.70, i < 9));
        }
        let refs: Vec<&Prediction> = predictions.iter().collect();

        let bins = calibration_bins(&refs, 10);
        assert_eq!(bins.len(), 1);
        let bin = &bins[0];
        assert_eq!(bin.count, 20);
        assert_relative_eq!(bin.avg_stated_confidence, 0.70, epsilon = 1e-12);
        assert_relative_eq!(bin.realized_accuracy, 0.45, epsilon = 1e-12);
        // The gap is reported, not averaged away
        assert_relative_eq!(bin.gap, -0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_predictions_split_across_buckets() {
        let predictions = vec![
            graded(0.45, true),
            graded(0.48, false),
            graded(0.92, true),
        ];
        let refs: Vec<&Prediction> = predictions.iter().collect();

        let bins = calibration_bins(&refs, 10);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].count, 2);
        assert_relative_eq!(bins[0].lower, 0.4, epsilon = 1e-12);
        assert_eq!(bins[1].count, 1);
        assert_relative_eq!(bins[1].realized_accuracy, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ece_weights_bins_by_count() {
        let bins = vec![
            CalibrationBin {
                lower: 0.4,
                upper: 0.5,
                count: 3,
                avg_stated_confidence: 0.45,
                realized_accuracy: 0.45,
                gap: 0.0,
            },
            CalibrationBin {
                lower: 0.6,
                upper: 0.7,
                count: 1,
                avg_stated_confidence: 0.65,
                realized_accuracy: 0.25,
                gap: -0.4,
            },
        ];
        assert_relative_eq!(expected_calibration_error(&bins), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_brier_score_of_perfect_and_empty() {
        let perfect = vec![graded(1.0, true)];
        let refs: Vec<&Prediction> = perfect.iter().collect();
        assert_relative_eq!(brier_score(&refs), 0.0, epsilon = 1e-12);

        assert_eq!(brier_score(&[]), 0.0);

        let mixed = vec![graded(0.8, true), graded(0.8, false)];
        let refs: Vec<&Prediction> = mixed.iter().collect();
        // ((0.2)^2 + (0.8)^2) / 2 = 0.34
        assert_relative_eq!(brier_score(&refs), 0.34, epsilon = 1e-12);
    }
}
