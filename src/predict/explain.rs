//! Human-readable explanation factors for a prediction

use super::model::ModelArtifact;
use crate::{FactorDirection, KeyFactor};

/// Number of factors attached to a prediction
pub const TOP_FACTORS: usize = 5;

/// Impacts at or below this magnitude are reported as minimal
const MINIMAL_IMPACT: f64 = 0.01;

/// Display label for a feature name
pub fn feature_label(name: &str) -> String {
    let label = match name {
        "elo_diff" => "Team rating difference",
        "home_win_pct_10" => "Recent form (home)",
        "away_win_pct_10" => "Recent form (away)",
        "home_ppg_20" => "Offensive output (home)",
        "away_ppg_20" => "Offensive output (away)",
        "home_papg_20" => "Defensive rating (home)",
        "away_papg_20" => "Defensive rating (away)",
        "rest_days_home" => "Rest advantage (home)",
        "rest_days_away" => "Rest advantage (away)",
        "h2h_home_wins_last5" => "Head-to-head record",
        "home_streak" => "Win streak (home)",
        "away_streak" => "Win streak (away)",
        "home_margin_avg_10" => "Scoring margin (home)",
        "away_margin_avg_10" => "Scoring margin (away)",
        "home_efg_pct_10" => "Shooting efficiency (home)",
        "away_efg_pct_10" => "Shooting efficiency (away)",
        "home_tov_pct_10" => "Turnover rate (home)",
        "away_tov_pct_10" => "Turnover rate (away)",
        "home_ftr_10" => "Free throw rate (home)",
        "away_ftr_10" => "Free throw rate (away)",
        "home_oreb_pct_10" => "Offensive rebounds (home)",
        "away_oreb_pct_10" => "Offensive rebounds (away)",
        "home_net_rating_10" => "Net rating (home)",
        "away_net_rating_10" => "Net rating (away)",
        "home_pace_10" => "Pace of play (home)",
        "away_pace_10" => "Pace of play (away)",
        "home_save_pct_10" => "Goaltending (home)",
        "away_save_pct_10" => "Goaltending (away)",
        "home_shot_diff_10" => "Shot differential (home)",
        "away_shot_diff_10" => "Shot differential (away)",
        "home_pp_pct_10" => "Power play (home)",
        "away_pp_pct_10" => "Power play (away)",
        "home_pk_pct_10" => "Penalty kill (home)",
        "away_pk_pct_10" => "Penalty kill (away)",
        "home_goals_per_game_10" => "Goals per game (home)",
        "away_goals_per_game_10" => "Goals per game (away)",
        "home_ops_10" => "Hitting (OPS, home)",
        "away_ops_10" => "Hitting (OPS, away)",
        "home_era_10" => "Pitching (ERA, home)",
        "away_era_10" => "Pitching (ERA, away)",
        "home_whip_10" => "Pitching (WHIP, home)",
        "away_whip_10" => "Pitching (WHIP, away)",
        "home_k_bb_ratio_10" => "Strikeout-walk ratio (home)",
        "away_k_bb_ratio_10" => "Strikeout-walk ratio (away)",
        "home_runs_per_game_10" => "Run scoring (home)",
        "away_runs_per_game_10" => "Run scoring (away)",
        "home_yards_per_play_10" => "Yards per play (home)",
        "away_yards_per_play_10" => "Yards per play (away)",
        "home_tov_margin_10" => "Turnover margin (home)",
        "away_tov_margin_10" => "Turnover margin (away)",
        "home_third_down_pct_10" => "Third down efficiency (home)",
        "away_third_down_pct_10" => "Third down efficiency (away)",
        other => other,
    };
    label.to_string()
}

fn round4(value: f64) -> f64 {
    (value * 1e4).round() / 1e4
}

fn direction(positive: bool) -> FactorDirection {
    if positive {
        FactorDirection::FavorsHome
    } else {
        FactorDirection::FavorsAway
    }
}

/// Signed per-feature impact as a factor
fn impact_factor(name: &str, impact: f64) -> KeyFactor {
    let label = feature_label(name);
    let detail = if impact.abs() <= MINIMAL_IMPACT {
        format!("{} has minimal impact", label)
    } else if impact >= 0.0 {
        format!("{} favors the home team", label)
    } else {
        format!("{} favors the away team", label)
    };
    KeyFactor {
        factor: label,
        impact: round4(impact),
        direction: direction(impact >= 0.0),
        detail,
    }
}

/// Rank factors for the win model's view of `x` (in its declared order).
///
/// Tree path attribution is preferred, then linear terms, then global
/// importances with direction taken from the feature value's sign.
pub fn key_factors(model: &ModelArtifact, x: &[f64]) -> Vec<KeyFactor> {
    let names = &model.feature_names;
    let contributions = model
        .estimator
        .tree_contributions(x)
        .or_else(|| model.estimator.linear_contributions(x));

    let mut factors: Vec<KeyFactor> = match (contributions, &model.feature_importances) {
        (Some(impacts), _) => names
            .iter()
            .zip(impacts)
            .map(|(name, impact)| impact_factor(name, impact))
            .collect(),
        (None, Some(importances)) => names
            .iter()
            .zip(importances)
            .zip(x)
            .map(|((name, importance), value)| {
                let label = feature_label(name);
                KeyFactor {
                    detail: format!("{} importance: {:.3}", label, importance),
                    factor: label,
                    impact: round4(*importance),
                    direction: direction(*value >= 0.0),
                }
            })
            .collect(),
        (None, None) => Vec::new(),
    };

    // Stable sort keeps declared order among equal impacts
    factors.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
    factors.truncate(TOP_FACTORS);
    factors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::model::{Estimator, Link, ModelRole};
    use crate::Sport;

    fn artifact(estimator: Estimator, importances: Option<Vec<f64>>) -> ModelArtifact {
        ModelArtifact {
            sport: Sport::Nfl,
            role: ModelRole::Win,
            feature_names: vec![
                "elo_diff".to_string(),
                "rest_days_home".to_string(),
                "home_tov_margin_10".to_string(),
            ],
            feature_importances: importances,
            estimator,
        }
    }

    #[test]
    fn test_linear_factors_ranked_by_magnitude() {
        let model = artifact(
            Estimator::Linear {
                intercept: 0.0,
                coefficients: vec![0.01, -0.5, 0.002],
                scaler: None,
                link: Link::Logistic,
            },
            None,
        );
        let factors = key_factors(&model, &[50.0, 2.0, 1.0]);

        assert_eq!(factors.len(), 3);
        assert_eq!(factors[0].factor, "Rest advantage (home)");
        assert_eq!(factors[0].impact, -1.0);
        assert_eq!(factors[0].direction, FactorDirection::FavorsAway);
        assert_eq!(factors[1].detail, "Team rating difference favors the home team");
        assert_eq!(factors[2].detail, "Turnover margin (home) has minimal impact");
    }

    #[test]
    fn test_importance_fallback_for_opaque_models() {
        let model = artifact(
            Estimator::OpaqueConstant { value: 0.6 },
            Some(vec![0.5, 0.123456, 0.2]),
        );
        let factors = key_factors(&model, &[-30.0, 1.0, 0.0]);

        assert_eq!(factors[0].factor, "Team rating difference");
        assert_eq!(factors[0].direction, FactorDirection::FavorsAway);
        assert_eq!(factors[2].impact, 0.1235);
        assert_eq!(factors[2].detail, "Rest advantage (home) importance: 0.123");
    }

    #[test]
    fn test_no_structure_no_factors() {
        let model = artifact(Estimator::OpaqueConstant { value: 0.6 }, None);
        assert!(key_factors(&model, &[0.0, 0.0, 0.0]).is_empty());
    }

    #[test]
    fn test_unknown_feature_keeps_its_name() {
        assert_eq!(feature_label("custom_metric"), "custom_metric");
    }
}
