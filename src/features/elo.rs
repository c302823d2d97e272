//! Elo rating replay for team strength estimation
//!
//! Replays a sport's completed games in chronological order, producing a
//! before/after rating record for both teams of every scored game.

use std::collections::{BTreeMap, HashMap};

use crate::data::GameLog;
use crate::{Game, GameId, RatingHistoryEntry, SportConfig, TeamId, INITIAL_RATING};

/// Elo rating configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EloConfig {
    /// Base K-factor before margin and rating-gap scaling
    pub k_base: f64,
    /// Home advantage in rating points
    pub home_advantage: f64,
    /// Share of the old rating kept across a season boundary
    pub season_regression: f64,
}

impl From<&SportConfig> for EloConfig {
    fn from(config: &SportConfig) -> Self {
        EloConfig {
            k_base: config.k_base,
            home_advantage: config.home_advantage,
            season_regression: config.season_regression,
        }
    }
}

/// Result of a full rating replay
#[derive(Debug, Clone, Default)]
pub struct RatingReplay {
    /// Two entries per processed game, home first, in replay order
    pub history: Vec<RatingHistoryEntry>,
    /// Final rating of every team seen in the replay
    pub ratings: BTreeMap<TeamId, f64>,
}

impl RatingReplay {
    /// Rating a team carried into a game, keyed by (team, game)
    pub fn ratings_before(&self) -> HashMap<(TeamId, GameId), f64> {
        self.history
            .iter()
            .map(|e| ((e.team, e.game), e.rating_before))
            .collect()
    }

    /// Final rating of a team (initial rating if it never played)
    pub fn rating(&self, team: TeamId) -> f64 {
        self.ratings.get(&team).copied().unwrap_or(INITIAL_RATING)
    }
}

/// Margin-aware Elo engine
#[derive(Debug, Clone)]
pub struct RatingEngine {
    config: EloConfig,
}

impl RatingEngine {
    pub fn new(config: EloConfig) -> Self {
        RatingEngine { config }
    }

    pub fn config(&self) -> &EloConfig {
        &self.config
    }

    /// Expected score of a side rated `a` against a side rated `b`
    pub fn expected(a: f64, b: f64) -> f64 {
        1.0 / (1.0 + 10.0_f64.powf((b - a) / 400.0))
    }

    /// Home win expectation with home advantage applied
    pub fn home_expectation(&self, home: f64, away: f64) -> f64 {
        Self::expected(home + self.config.home_advantage, away)
    }

    /// K-factor scaled up by margin of victory and down by rating gap
    pub fn k_factor(&self, margin: i64, rating_diff: f64) -> f64 {
        self.config.k_base * ((margin.abs() as f64) + 3.0).powf(0.8)
            / (7.5 + 0.006 * rating_diff.abs())
    }

    /// Ratings after a game, returned as (new_home, new_away)
    pub fn update(&self, home: f64, away: f64, home_score: u32, away_score: u32) -> (f64, f64) {
        let expected_home = self.home_expectation(home, away);
        let expected_away = Self::expected(away, home + self.config.home_advantage);

        // A tie leaves home without the win
        let home_actual = if home_score > away_score { 1.0 } else { 0.0 };
        let margin = home_score as i64 - away_score as i64;
        let k = self.k_factor(margin, home - away);

        (
            home + k * (home_actual - expected_home),
            away + k * ((1.0 - home_actual) - expected_away),
        )
    }

    /// Regress a rating toward the mean between seasons
    pub fn season_reset(&self, rating: f64) -> f64 {
        let r = self.config.season_regression;
        r * rating + (1.0 - r) * INITIAL_RATING
    }

    /// Replay games from scratch; unscored games are skipped entirely
    pub fn replay(&self, teams: &[TeamId], games: &[Game]) -> RatingReplay {
        let mut ratings: BTreeMap<TeamId, f64> =
            teams.iter().map(|&t| (t, INITIAL_RATING)).collect();

        let log = GameLog::new(games.iter().cloned());
        let mut history = Vec::with_capacity(log.len() * 2);
        let mut current_season: Option<i32> = None;

        for game in log.games() {
            let (home_score, away_score) = match game.final_scores() {
                Some(scores) => scores,
                None => continue,
            };

            if let Some(season) = current_season {
                if season != game.season {
                    log::info!(
                        "Season change {} -> {}, regressing {} ratings",
                        season,
                        game.season,
                        ratings.len()
                    );
                    for rating in ratings.values_mut() {
                        *rating = self.season_reset(*rating);
                    }
                }
            }
            current_season = Some(game.season);

            let home_before = *ratings.entry(game.home_team).or_insert(INITIAL_RATING);
            let away_before = *ratings.entry(game.away_team).or_insert(INITIAL_RATING);
            let (home_after, away_after) =
                self.update(home_before, away_before, home_score, away_score);

            ratings.insert(game.home_team, home_after);
            ratings.insert(game.away_team, away_after);

            history.push(RatingHistoryEntry {
                team: game.home_team,
                game: game.id,
                date: game.date,
                rating_before: home_before,
                rating_after: home_after,
            });
            history.push(RatingHistoryEntry {
                team: game.away_team,
                game: game.id,
                date: game.date,
                rating_before: away_before,
                rating_after: away_after,
            });
        }

        RatingReplay { history, ratings }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::{GameStatus, Sport};

    fn engine() -> RatingEngine {
        RatingEngine::new(EloConfig {
            k_base: 20.0,
            home_advantage: 75.0,
            season_regression: 0.75,
        })
    }

    fn make_game(id: i64, day: u32, season: i32, home: i64, away: i64, score: Option<(u32, u32)>) -> Game {
        Game {
            id: GameId(id),
            sport: Sport::Nba,
            season,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            status: GameStatus::Final,
            home_team: TeamId(home),
            away_team: TeamId(away),
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            home_period_scores: vec![],
            away_period_scores: vec![],
            is_postseason: false,
        }
    }

    #[test]
    fn test_expected_is_symmetric() {
        for (a, b) in [(1500.0, 1500.0), (1620.0, 1410.0), (1300.0, 1755.5)] {
            assert_relative_eq!(
                RatingEngine::expected(a, b) + RatingEngine::expected(b, a),
                1.0,
                epsilon = 1e-12
            );
        }
        assert_relative_eq!(RatingEngine::expected(1500.0, 1500.0), 0.5);
    }

    #[test]
    fn test_home_win_between_equal_teams() {
        let engine = engine();
        let expected_home = engine.home_expectation(1500.0, 1500.0);
        assert!(expected_home > 0.5);

        let k = engine.k_factor(10, 0.0);
        assert_relative_eq!(k, 20.0 * 13f64.powf(0.8) / 7.5, epsilon = 1e-9);

        let (home, away) = engine.update(1500.0, 1500.0, 110, 100);
        assert!(home > 1500.0);
        assert!(away < 1500.0);
        assert_relative_eq!(home, 1500.0 + k * (1.0 - expected_home), epsilon = 1e-9);
        // Gains and losses mirror each other
        assert_relative_eq!(home - 1500.0, 1500.0 - away, epsilon = 1e-9);
    }

    #[test]
    fn test_tie_counts_against_home() {
        let (home, away) = engine().update(1500.0, 1500.0, 3, 3);
        assert!(home < 1500.0);
        assert!(away > 1500.0);
    }

    #[test]
    fn test_season_boundary_regresses_before_update() {
        let engine = engine();
        let games = vec![
            make_game(1, 1, 2023, 1, 2, Some((120, 90))),
            make_game(2, 2, 2024, 1, 2, Some((100, 101))),
        ];
        let replay = engine.replay(&[TeamId(1), TeamId(2)], &games);

        let after_first = replay.history[0].rating_after;
        let before_second = replay.history[2].rating_before;
        assert_relative_eq!(
            before_second - 1500.0,
            0.75 * (after_first - 1500.0),
            epsilon = 1e-9
        );
        assert_relative_eq!(
            replay.history[3].rating_before,
            engine.season_reset(replay.history[1].rating_after),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_unscored_game_is_skipped() {
        let games = vec![
            make_game(1, 1, 2024, 1, 2, Some((100, 90))),
            make_game(2, 2, 2024, 2, 3, None),
            make_game(3, 3, 2024, 3, 1, Some((95, 97))),
        ];
        let replay = engine().replay(&[TeamId(1), TeamId(2), TeamId(3), TeamId(4)], &games);

        assert_eq!(replay.history.len(), 4);
        assert!(replay.history.iter().all(|e| e.game != GameId(2)));
        assert_eq!(replay.rating(TeamId(4)), INITIAL_RATING);
        assert_eq!(replay.ratings.len(), 4);
    }

    #[test]
    fn test_replay_is_deterministic_and_order_independent() {
        let games = vec![
            make_game(1, 1, 2024, 1, 2, Some((100, 90))),
            make_game(2, 2, 2024, 2, 3, Some((80, 99))),
            make_game(3, 3, 2024, 3, 1, Some((95, 97))),
        ];
        let mut shuffled = games.clone();
        shuffled.reverse();

        let a = engine().replay(&[], &games);
        let b = engine().replay(&[], &shuffled);
        assert_eq!(a.history, b.history);
        assert_eq!(a.ratings, b.ratings);
    }
}
