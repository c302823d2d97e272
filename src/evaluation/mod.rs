//! Grading of stored predictions against final results

pub mod metrics;

pub use metrics::AccuracyOverview;

use serde::{Deserialize, Serialize};

use crate::data::{Database, StoredPrediction};
use crate::{Game, GameId, GameStatus, Result, Sport};

/// Outcome of one prediction once its game is final.
///
/// Errors are signed: predicted minus actual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionAccuracy {
    pub prediction_id: i64,
    pub game: GameId,
    pub sport: Sport,
    pub was_correct: bool,
    pub home_score_error: f64,
    pub away_score_error: f64,
    pub total_score_error: f64,
    pub spread_error: f64,
}

/// Grade a stored prediction, or `None` when the game cannot grade it.
///
/// Only final games with real scores count, and only predictions made
/// before the game day; later ones saw the result.
pub fn grade(stored: &StoredPrediction, game: &Game) -> Option<PredictionAccuracy> {
    if game.status != GameStatus::Final {
        return None;
    }
    let (home, away) = game.final_scores()?;
    if home == 0 && away == 0 {
        return None;
    }
    let prediction = &stored.prediction;
    if prediction.created_at.date_naive() >= game.date {
        return None;
    }

    // A tie credits the away side
    let winner = if home > away {
        game.home_team
    } else {
        game.away_team
    };

    let predicted_home = prediction.predicted_home_score as f64;
    let predicted_away = prediction.predicted_away_score as f64;
    let (home, away) = (home as f64, away as f64);

    Some(PredictionAccuracy {
        prediction_id: stored.id,
        game: game.id,
        sport: game.sport,
        was_correct: prediction.predicted_winner == winner,
        home_score_error: predicted_home - home,
        away_score_error: predicted_away - away,
        total_score_error: (predicted_home + predicted_away) - (home + away),
        spread_error: prediction.spread - (home - away),
    })
}

/// Grade every ungraded prediction of a sport whose game is now final.
/// Returns the number of new accuracy records.
pub fn evaluate(db: &Database, sport: Sport) -> Result<usize> {
    let mut records = Vec::new();
    for stored in db.ungraded_predictions(sport)? {
        let Some(game) = db.game(stored.prediction.game)? else {
            log::warn!("Prediction {} refers to unknown {}", stored.id, stored.prediction.game);
            continue;
        };
        if let Some(record) = grade(&stored, &game) {
            records.push(record);
        }
    }

    if records.is_empty() {
        log::info!("No new completed games to evaluate for {}", sport);
        return Ok(0);
    }
    let stored = db.save_accuracy(&records)?;
    log::info!("Evaluated {} predictions for {}", stored, sport);
    Ok(stored)
}

/// Accuracy over all graded predictions, optionally for one sport
pub fn overview(db: &Database, sport: Option<Sport>) -> Result<AccuracyOverview> {
    Ok(AccuracyOverview::from_records(&db.accuracy_records(sport)?))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::{PeriodSplit, Prediction, Team, TeamId, INITIAL_RATING};

    fn game(status: GameStatus, score: Option<(u32, u32)>) -> Game {
        Game {
            id: GameId(1),
            sport: Sport::Nba,
            season: 2024,
            date: NaiveDate::from_ymd_opt(2024, 12, 10).unwrap(),
            status,
            home_team: TeamId(1),
            away_team: TeamId(2),
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            home_period_scores: vec![],
            away_period_scores: vec![],
            is_postseason: false,
        }
    }

    fn stored(id: i64, made_on: u32, winner: i64) -> StoredPrediction {
        StoredPrediction {
            id,
            prediction: Prediction {
                game: GameId(1),
                sport: Sport::Nba,
                created_at: Utc.with_ymd_and_hms(2024, 12, made_on, 9, 0, 0).unwrap(),
                home_team: TeamId(1),
                away_team: TeamId(2),
                predicted_winner: TeamId(winner),
                win_probability: 0.6,
                confidence: 0.54,
                predicted_home_score: 112,
                predicted_away_score: 105,
                spread: 7.0,
                total: 217.0,
                periods: PeriodSplit::default(),
                key_factors: vec![],
            },
        }
    }

    #[test]
    fn test_grade_signed_errors() {
        let record = grade(&stored(5, 9, 1), &game(GameStatus::Final, Some((110, 108)))).unwrap();

        assert_eq!(record.prediction_id, 5);
        assert!(record.was_correct);
        assert_eq!(record.home_score_error, 2.0);
        assert_eq!(record.away_score_error, -3.0);
        assert_eq!(record.total_score_error, -1.0);
        assert_eq!(record.spread_error, 5.0);
    }

    #[test]
    fn test_wrong_winner() {
        let record = grade(&stored(5, 9, 1), &game(GameStatus::Final, Some((99, 104)))).unwrap();
        assert!(!record.was_correct);
    }

    #[test]
    fn test_ungradable_predictions() {
        // Not final yet
        assert!(grade(&stored(1, 9, 1), &game(GameStatus::Scheduled, None)).is_none());
        // 0-0 placeholder
        assert!(grade(&stored(1, 9, 1), &game(GameStatus::Final, Some((0, 0)))).is_none());
        // Made on game day
        assert!(grade(&stored(1, 10, 1), &game(GameStatus::Final, Some((110, 100)))).is_none());
    }

    #[test]
    fn test_evaluate_grades_once() {
        let db = Database::in_memory().unwrap();
        for id in 1..=2 {
            db.upsert_team(&Team {
                id: TeamId(id),
                sport: Sport::Nba,
                name: format!("Team {}", id),
                abbreviation: String::new(),
                current_rating: INITIAL_RATING,
            })
            .unwrap();
        }
        let mut g = game(GameStatus::Scheduled, None);
        db.upsert_game(&g).unwrap();
        db.save_predictions(&[stored(0, 9, 1).prediction]).unwrap();

        assert_eq!(evaluate(&db, Sport::Nba).unwrap(), 0);

        g.status = GameStatus::Final;
        g.home_score = Some(101);
        g.away_score = Some(99);
        db.upsert_game(&g).unwrap();

        assert_eq!(evaluate(&db, Sport::Nba).unwrap(), 1);
        assert_eq!(evaluate(&db, Sport::Nba).unwrap(), 0);

        let summary = overview(&db, Some(Sport::Nba)).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.correct, 1);
        assert_eq!(overview(&db, Some(Sport::Nhl)).unwrap().count, 0);
    }
}
