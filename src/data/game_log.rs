//! Chronological log of completed games
//!
//! An immutable, date-sorted sequence of scored games with per-team index
//! lists, so "the last N games before a date" never re-sorts anything.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::{Game, TeamId};

/// Completed, scored games of one sport in (date, id) order
#[derive(Debug, Clone, Default)]
pub struct GameLog {
    games: Vec<Game>,
    by_team: HashMap<TeamId, Vec<usize>>,
}

impl GameLog {
    /// Build a log, keeping only final games with both scores known
    pub fn new(games: impl IntoIterator<Item = Game>) -> Self {
        let mut games: Vec<Game> = games
            .into_iter()
            .filter(|g| g.final_scores().is_some())
            .collect();
        games.sort_by_key(|g| (g.date, g.id));

        let mut by_team: HashMap<TeamId, Vec<usize>> = HashMap::new();
        for (idx, game) in games.iter().enumerate() {
            by_team.entry(game.home_team).or_default().push(idx);
            by_team.entry(game.away_team).or_default().push(idx);
        }

        GameLog { games, by_team }
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Positions of a team's games in the log, oldest first
    pub fn team_indices(&self, team: TeamId) -> &[usize] {
        self.by_team.get(&team).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A team's games played strictly before `date`, oldest first
    pub fn team_games_before(&self, team: TeamId, date: NaiveDate) -> Vec<&Game> {
        let indices = self.team_indices(team);
        let end = indices.partition_point(|&i| self.games[i].date < date);
        indices[..end].iter().map(|&i| &self.games[i]).collect()
    }

    /// Up to `n` of a team's games before `date`, most recent first
    pub fn last_n_before(&self, team: TeamId, date: NaiveDate, n: usize) -> Vec<&Game> {
        let mut games = self.team_games_before(team, date);
        games.reverse();
        games.truncate(n);
        games
    }

    /// Date of the team's most recent game before `date`
    pub fn previous_game_date(&self, team: TeamId, date: NaiveDate) -> Option<NaiveDate> {
        let indices = self.team_indices(team);
        let end = indices.partition_point(|&i| self.games[i].date < date);
        end.checked_sub(1).map(|pos| self.games[indices[pos]].date)
    }

    /// Up to `n` meetings between two teams before `date`, most recent first
    pub fn head_to_head_before(
        &self,
        team_a: TeamId,
        team_b: TeamId,
        date: NaiveDate,
        n: usize,
    ) -> Vec<&Game> {
        self.team_games_before(team_a, date)
            .into_iter()
            .rev()
            .filter(|g| g.involves(team_b))
            .take(n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameId, GameStatus, Sport};

    fn game(id: i64, day: u32, home: i64, away: i64, scores: Option<(u32, u32)>) -> Game {
        Game {
            id: GameId(id),
            sport: Sport::Nba,
            season: 2024,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            status: GameStatus::Final,
            home_team: TeamId(home),
            away_team: TeamId(away),
            home_score: scores.map(|s| s.0),
            away_score: scores.map(|s| s.1),
            home_period_scores: vec![],
            away_period_scores: vec![],
            is_postseason: false,
        }
    }

    #[test]
    fn test_log_sorts_and_drops_unscored() {
        let log = GameLog::new(vec![
            game(3, 5, 1, 2, Some((90, 80))),
            game(1, 1, 1, 3, Some((100, 99))),
            game(2, 3, 2, 1, None),
        ]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.games()[0].id, GameId(1));
        assert_eq!(log.team_indices(TeamId(1)), &[0, 1]);
    }

    #[test]
    fn test_before_is_strict() {
        let log = GameLog::new(vec![
            game(1, 1, 1, 2, Some((1, 0))),
            game(2, 4, 1, 3, Some((1, 0))),
            game(3, 4, 2, 1, Some((1, 0))),
        ]);
        let date = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        assert_eq!(log.team_games_before(TeamId(1), date).len(), 1);
        assert_eq!(
            log.previous_game_date(TeamId(1), date),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(log.previous_game_date(TeamId(3), date), None);
    }

    #[test]
    fn test_head_to_head_most_recent_first() {
        let log = GameLog::new(vec![
            game(1, 1, 1, 2, Some((1, 0))),
            game(2, 2, 1, 3, Some((1, 0))),
            game(3, 3, 2, 1, Some((1, 0))),
        ]);
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let h2h = log.head_to_head_before(TeamId(1), TeamId(2), date, 5);
        let ids: Vec<_> = h2h.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![GameId(3), GameId(1)]);
    }
}
