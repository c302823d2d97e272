//! Model inference for predictions

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use super::explain::key_factors;
use super::model::ModelSet;
use super::periods::split_scores;
use crate::features::{to_array, FeatureAssembler, FeatureMap};
use crate::{Game, Prediction, Result, SportConfig};

/// Probability clamp applied before the logit
const PROBABILITY_FLOOR: f64 = 0.01;
const PROBABILITY_CEILING: f64 = 0.99;

/// Damping for imperfect data availability
pub const DATA_PENALTY: f64 = 0.90;
/// Extra damping for playoff variance
pub const POSTSEASON_PENALTY: f64 = 0.92;

/// Expected home margin implied by a win probability
pub fn spread_from_probability(p: f64, calibration: f64) -> f64 {
    let p = p.clamp(PROBABILITY_FLOOR, PROBABILITY_CEILING);
    calibration * (p / (1.0 - p)).ln()
}

/// Integer home/away scores consistent with the favorite.
///
/// The favorite (home when `p >= 0.5`) always ends strictly ahead.
pub fn derive_scores(p: f64, raw_home: f64, raw_away: f64, calibration: f64) -> (u32, u32) {
    let total = raw_home.max(0.0) + raw_away.max(0.0);
    let spread = spread_from_probability(p, calibration);

    let mut home = ((total + spread) / 2.0).max(0.0).round() as u32;
    let mut away = ((total - spread) / 2.0).max(0.0).round() as u32;

    if p >= 0.5 {
        if home <= away {
            home = away + 1;
        }
    } else if away <= home {
        away = home + 1;
    }
    (home, away)
}

/// Favorite probability damped for data quality and playoff variance
pub fn confidence(p: f64, is_postseason: bool) -> f64 {
    let mut value = p.max(1.0 - p) * DATA_PENALTY;
    if is_postseason {
        value *= POSTSEASON_PENALTY;
    }
    (value * 1e4).round() / 1e4
}

/// Predictions for a batch of games plus how many were skipped
#[derive(Debug, Default)]
pub struct BatchPrediction {
    pub predictions: Vec<Prediction>,
    pub skipped: usize,
}

/// Turns assembled features and a sport's models into predictions
pub struct PredictionEngine<'a> {
    assembler: &'a FeatureAssembler,
    config: &'a SportConfig,
    models: &'a ModelSet,
    created_at: DateTime<Utc>,
}

impl<'a> PredictionEngine<'a> {
    pub fn new(assembler: &'a FeatureAssembler, config: &'a SportConfig, models: &'a ModelSet) -> Self {
        PredictionEngine {
            assembler,
            config,
            models,
            created_at: Utc::now(),
        }
    }

    /// Stamp predictions with a fixed creation time
    pub fn with_timestamp(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Assemble features for a game and predict it
    pub fn predict_game(&self, game: &Game) -> Result<Prediction> {
        let features = self.assembler.compute(game)?;
        Ok(self.predict(game, &features.values))
    }

    /// Predict a game from an already assembled feature map
    pub fn predict(&self, game: &Game, features: &FeatureMap) -> Prediction {
        let win_x = to_array(features, &self.models.win.feature_names);
        let p = self.models.win.predict(&win_x);
        let raw_home = self
            .models
            .home_score
            .predict(&to_array(features, &self.models.home_score.feature_names));
        let raw_away = self
            .models
            .away_score
            .predict(&to_array(features, &self.models.away_score.feature_names));

        let (home_score, away_score) =
            derive_scores(p, raw_home, raw_away, self.config.spread_calibration);
        let home_favored = p >= 0.5;

        let periods = split_scores(
            self.assembler.log(),
            game.home_team,
            game.away_team,
            game.date,
            self.config.period_count,
            home_score,
            away_score,
        );

        Prediction {
            game: game.id,
            sport: game.sport,
            created_at: self.created_at,
            home_team: game.home_team,
            away_team: game.away_team,
            predicted_winner: if home_favored {
                game.home_team
            } else {
                game.away_team
            },
            win_probability: p,
            confidence: confidence(p, game.is_postseason),
            predicted_home_score: home_score,
            predicted_away_score: away_score,
            spread: home_score as f64 - away_score as f64,
            total: (home_score + away_score) as f64,
            periods,
            key_factors: key_factors(&self.models.win, &win_x),
        }
    }

    /// Predict independent games in parallel.
    ///
    /// Games that cannot be predicted are skipped and counted; output keeps
    /// the input order.
    pub fn predict_batch(&self, games: &[Game]) -> BatchPrediction {
        let results: Vec<Result<Prediction>> =
            games.par_iter().map(|g| self.predict_game(g)).collect();

        let mut batch = BatchPrediction::default();
        for result in results {
            match result {
                Ok(prediction) => batch.predictions.push(prediction),
                Err(e) if e.is_data_incomplete() => {
                    log::debug!("Skipping game: {}", e);
                    batch.skipped += 1;
                }
                Err(e) => {
                    log::warn!("Prediction failed: {}", e);
                    batch.skipped += 1;
                }
            }
        }
        batch
    }
}

/// Format a prediction for display
pub fn format_prediction(pred: &Prediction, home_name: &str, away_name: &str, period_label: &str) -> String {
    let winner = if pred.predicted_winner == pred.home_team {
        home_name
    } else {
        away_name
    };

    let periods = |split: &[f64]| {
        split
            .iter()
            .map(|v| format!("{:.1}", v))
            .collect::<Vec<_>>()
            .join(" / ")
    };

    let mut out = format!(
        r#"
┌─────────────────────────────────────────────────┐
│  {} vs {}
├─────────────────────────────────────────────────┤
│  Win probability:  {} {:.1}%
│  Predicted score:  {} {} - {} {}
│  Spread / total:   {:+.1} / {:.1}
│  By {}:  {} | {}
│  Confidence:       {:.1}%
"#,
        home_name,
        away_name,
        winner,
        pred.favorite_probability() * 100.0,
        home_name,
        pred.predicted_home_score,
        away_name,
        pred.predicted_away_score,
        pred.spread,
        pred.total,
        period_label,
        periods(&pred.periods.home),
        periods(&pred.periods.away),
        pred.confidence * 100.0
    );
    for factor in &pred.key_factors {
        out.push_str(&format!("│    • {} ({:+.3})\n", factor.detail, factor.impact));
    }
    out.push_str("└─────────────────────────────────────────────────┘\n");
    out
}
