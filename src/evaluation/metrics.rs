//! Aggregate accuracy of graded predictions

use std::collections::HashSet;
use std::fmt;

use super::PredictionAccuracy;
use crate::GameId;

/// Accuracy accumulated over graded predictions
#[derive(Debug, Clone, Default)]
pub struct AccuracyOverview {
    /// Number of graded predictions
    pub count: usize,
    /// Predictions that named the actual winner
    pub correct: usize,
    /// Distinct games covered
    pub games: usize,
    /// Sum of per-prediction mean absolute score errors
    score_error_sum: f64,
    spread_error_sum: f64,
    seen_games: HashSet<GameId>,
}

impl AccuracyOverview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[PredictionAccuracy]) -> Self {
        let mut overview = Self::new();
        for record in records {
            overview.update(record);
        }
        overview
    }

    /// Add one graded prediction
    pub fn update(&mut self, record: &PredictionAccuracy) {
        self.count += 1;
        if record.was_correct {
            self.correct += 1;
        }
        if self.seen_games.insert(record.game) {
            self.games += 1;
        }
        self.score_error_sum += (record.home_score_error.abs() + record.away_score_error.abs()) / 2.0;
        self.spread_error_sum += record.spread_error.abs();
    }

    /// Share of correct winners, in percent
    pub fn accuracy_pct(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.correct as f64 / self.count as f64 * 100.0
        }
    }

    /// Mean absolute error of the individual team scores
    pub fn avg_score_error(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.score_error_sum / self.count as f64
        }
    }

    /// Mean absolute spread error
    pub fn avg_spread_error(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.spread_error_sum / self.count as f64
        }
    }

    /// Merge another overview
    pub fn merge(&mut self, other: &AccuracyOverview) {
        self.count += other.count;
        self.correct += other.correct;
        self.score_error_sum += other.score_error_sum;
        self.spread_error_sum += other.spread_error_sum;
        for game in &other.seen_games {
            if self.seen_games.insert(*game) {
                self.games += 1;
            }
        }
    }
}

impl fmt::Display for AccuracyOverview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} predictions over {} games | Acc: {:.2}% | Score MAE: {:.2} | Spread MAE: {:.2}",
            self.count,
            self.games,
            self.accuracy_pct(),
            self.avg_score_error(),
            self.avg_spread_error()
        )
    }
}
