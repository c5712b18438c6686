use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{stats, Direction, Prediction};
use std::collections::HashSet;

/// Trading days per year, for annualizing the Sharpe-like ratio.
const ANNUALIZATION_FACTOR: f64 = 252.0;

/// Optional narrowing of the closed-prediction set before reporting.
#[derive(Debug, Clone, Default)]
pub struct PerformanceFilter {
    pub model_variant: Option<String>,
    /// Resolved from a sector upstream; `None` means all symbols.
    pub symbols: Option<HashSet<String>>,
    pub evaluated_from: Option<DateTime<Utc>>,
    pub evaluated_to: Option<DateTime<Utc>>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
}

impl PerformanceFilter {
    pub fn matches(&self, prediction: &Prediction) -> bool {
        if let Some(variant) = &self.model_variant {
            if &prediction.model_variant != variant {
                return false;
            }
        }
        if let Some(symbols) = &self.symbols {
            if !symbols.contains(&prediction.symbol) {
                return false;
            }
        }
        if let Some(evaluated_at) = prediction.evaluated_at {
            if let Some(from) = self.evaluated_from {
                if evaluated_at < from {
                    return false;
                }
            }
            if let Some(to) = self.evaluated_to {
                if evaluated_at > to {
                    return false;
                }
            }
        }
        if let Some(min) = self.min_confidence {
            if prediction.confidence < min {
                return false;
            }
        }
        if let Some(max) = self.max_confidence {
            if prediction.confidence > max {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, predictions: &'a [Prediction]) -> Vec<&'a Prediction> {
        predictions.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Aggregate performance over a set of closed predictions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub predictions: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent of predictions with a positive return.
    pub win_rate: f64,
    pub total_return: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

/// P&L as if always taking the predicted side: the realized change for an
/// up call, its negation for a down call. `None` until evaluated.
pub fn signed_return(prediction: &Prediction) -> Option<f64> {
    let actual = prediction.actual_change_percent?;
    Some(match prediction.direction {
        Direction::Up => actual,
        Direction::Down => -actual,
    })
}

/// Build the aggregate report. Predictions are walked in evaluation order
/// for the drawdown accumulation; unevaluated entries are ignored.
pub fn compute_report(predictions: &[&Prediction]) -> PerformanceReport {
    let mut graded: Vec<(&Prediction, f64)> = predictions
        .iter()
        .filter_map(|p| signed_return(p).map(|r| (*p, r)))
        .collect();
    graded.sort_by_key(|(p, _)| p.evaluated_at);

    if graded.is_empty() {
        return PerformanceReport::default();
    }

    let returns: Vec<f64> = graded.iter().map(|(_, r)| *r).collect();
    let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();

    let total_return: f64 = returns.iter().sum();
    let win_rate = wins.len() as f64 / returns.len() as f64 * 100.0;
    let avg_win = stats::mean(&wins);
    let loss_magnitudes: Vec<f64> = losses.iter().map(|l| l.abs()).collect();
    let avg_loss = stats::mean(&loss_magnitudes);

    let gross_wins: f64 = wins.iter().sum();
    let gross_losses: f64 = loss_magnitudes.iter().sum();
    let profit_factor = if gross_losses > 0.0 {
        gross_wins / gross_losses
    } else {
        0.0
    };

    // Running peak over the cumulative return path
    let mut cumulative = 0.0;
    let mut peak = f64::MIN;
    let mut max_drawdown: f64 = 0.0;
    for r in &returns {
        cumulative += r;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.max(peak - cumulative);
    }

    let std = stats::std_dev(&returns);
    let sharpe_ratio = if std > 0.0 {
        stats::mean(&returns) / std * ANNUALIZATION_FACTOR.sqrt()
    } else {
        0.0
    };

    PerformanceReport {
        predictions: returns.len(),
        wins: wins.len(),
        losses: losses.len(),
        win_rate,
        total_return,
        avg_win,
        avg_loss,
        profit_factor,
        max_drawdown,
        sharpe_ratio,
    }
}
