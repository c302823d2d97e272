//! Rolling team performance snapshots
//!
//! Each team's games are laid out once as an immutable, date-sorted entry
//! sequence with per-team index lists. A snapshot for a game is computed
//! only from entries dated strictly before that game.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::boxscore::BoxscoreStats;
use super::elo::RatingReplay;
use super::sport_metrics::family_metrics;
use crate::data::GameLog;
use crate::{BoxscoreRecord, Game, GameId, RollingSnapshot, Sport, TeamId, INITIAL_RATING};

/// Decay applied per game going back in time
pub const EWMA_DECAY: f64 = 0.95;

const SHORT_WINDOW: usize = 10;
const LONG_WINDOW: usize = 20;

/// Exponentially weighted mean of values ordered newest first
pub fn ewma(newest_first: &[f64]) -> f64 {
    let mut weight = 1.0;
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for value in newest_first {
        total += weight * value;
        weight_sum += weight;
        weight *= EWMA_DECAY;
    }
    if weight_sum > 0.0 {
        total / weight_sum
    } else {
        0.0
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// One completed game from one team's side
#[derive(Debug, Clone, PartialEq)]
pub struct GameEntry {
    pub game: GameId,
    pub team: TeamId,
    pub date: NaiveDate,
    pub season: i32,
    pub opponent: TeamId,
    pub is_home: bool,
    pub score_for: f64,
    pub score_against: f64,
    pub won: bool,
    pub margin: f64,
    pub boxscore: Option<BoxscoreStats>,
}

/// Chronological per-team game entries for one sport
#[derive(Debug, Clone)]
pub struct RollingFeatureStore {
    sport: Sport,
    entries: Vec<GameEntry>,
    by_team: HashMap<TeamId, Vec<usize>>,
}

impl RollingFeatureStore {
    /// Lay out the log's games as per-team entries with typed boxscores
    pub fn new(sport: Sport, log: &GameLog, boxscores: &[BoxscoreRecord]) -> Self {
        let raw: HashMap<(GameId, TeamId), &BTreeMap<String, f64>> = boxscores
            .iter()
            .map(|b| ((b.game, b.team), &b.stats))
            .collect();
        let family = sport.family();

        let mut entries = Vec::with_capacity(log.len() * 2);
        let mut by_team: HashMap<TeamId, Vec<usize>> = HashMap::new();

        for game in log.games() {
            let (home_score, away_score) = match game.final_scores() {
                Some(scores) => scores,
                None => continue,
            };

            for (team, opponent, is_home, score_for, score_against) in [
                (game.home_team, game.away_team, true, home_score, away_score),
                (game.away_team, game.home_team, false, away_score, home_score),
            ] {
                let boxscore = raw.get(&(game.id, team)).map(|own| {
                    let opponent_box = raw.get(&(game.id, opponent)).copied();
                    BoxscoreStats::from_raw(family, own, opponent_box)
                });

                by_team.entry(team).or_default().push(entries.len());
                entries.push(GameEntry {
                    game: game.id,
                    team,
                    date: game.date,
                    season: game.season,
                    opponent,
                    is_home,
                    score_for: score_for as f64,
                    score_against: score_against as f64,
                    won: score_for > score_against,
                    margin: score_for as f64 - score_against as f64,
                    boxscore,
                });
            }
        }

        RollingFeatureStore {
            sport,
            entries,
            by_team,
        }
    }

    pub fn sport(&self) -> Sport {
        self.sport
    }

    /// A team's entries dated strictly before `date`, oldest first
    pub fn entries_before(&self, team: TeamId, date: NaiveDate) -> Vec<&GameEntry> {
        let indices = self.by_team.get(&team).map(Vec::as_slice).unwrap_or(&[]);
        let end = indices.partition_point(|&i| self.entries[i].date < date);
        indices[..end].iter().map(|&i| &self.entries[i]).collect()
    }

    /// Snapshot of a team as it stood before `game`
    pub fn snapshot(&self, team: TeamId, game: &Game, elo_before: f64) -> RollingSnapshot {
        let history = self.entries_before(team, game.date);
        let mut metrics = self.history_metrics(&history, game.season);
        metrics.insert("elo".to_string(), elo_before);

        for value in metrics.values_mut() {
            *value = round6(*value);
        }

        RollingSnapshot {
            team,
            game: game.id,
            sport: self.sport,
            as_of_date: game.date,
            games_played: history.len(),
            metrics,
        }
    }

    /// Snapshots for both teams of every game in the log
    pub fn snapshots(&self, log: &GameLog, replay: &RatingReplay) -> Vec<RollingSnapshot> {
        let ratings_before = replay.ratings_before();
        let mut snapshots = Vec::with_capacity(log.len() * 2);

        for game in log.games() {
            for team in [game.home_team, game.away_team] {
                let elo = ratings_before
                    .get(&(team, game.id))
                    .copied()
                    .unwrap_or(INITIAL_RATING);
                snapshots.push(self.snapshot(team, game, elo));
            }
        }
        snapshots
    }

    fn history_metrics(&self, history: &[&GameEntry], season: i32) -> BTreeMap<String, f64> {
        let newest_first: Vec<&GameEntry> = history.iter().rev().copied().collect();
        let last_10 = &newest_first[..newest_first.len().min(SHORT_WINDOW)];
        let last_20 = &newest_first[..newest_first.len().min(LONG_WINDOW)];

        let mut metrics = BTreeMap::new();
        let mut put = |name: &str, value: f64| {
            metrics.insert(name.to_string(), value);
        };

        if history.is_empty() {
            for name in ["win_pct_10", "win_pct_20", "home_win_pct_10", "away_win_pct_10"] {
                put(name, 0.5);
            }
            for name in [
                "ppg_10",
                "ppg_20",
                "papg_10",
                "papg_20",
                "margin_avg_10",
                "margin_avg_20",
                "streak",
            ] {
                put(name, 0.0);
            }
        } else {
            let win = |e: &GameEntry| if e.won { 1.0 } else { 0.0 };

            put("win_pct_10", ewma(&series(last_10, win)));
            put("win_pct_20", ewma(&series(last_20, win)));
            put("ppg_10", ewma(&series(last_10, |e| e.score_for)));
            put("ppg_20", ewma(&series(last_20, |e| e.score_for)));
            put("papg_10", ewma(&series(last_10, |e| e.score_against)));
            put("papg_20", ewma(&series(last_20, |e| e.score_against)));
            put("margin_avg_10", ewma(&series(last_10, |e| e.margin)));
            put("margin_avg_20", ewma(&series(last_20, |e| e.margin)));
            put("home_win_pct_10", venue_win_rate(last_10, true));
            put("away_win_pct_10", venue_win_rate(last_10, false));
            put("streak", streak(&newest_first) as f64);
        }

        let season_entries: Vec<&GameEntry> = newest_first
            .iter()
            .copied()
            .filter(|e| e.season == season)
            .collect();
        metrics.extend(family_metrics(self.sport.family(), last_10, &season_entries));
        metrics
    }
}

fn series(window: &[&GameEntry], f: impl Fn(&GameEntry) -> f64) -> Vec<f64> {
    window.iter().map(|e| f(e)).collect()
}

/// Plain win rate over games in one venue role, 0.5 when there are none
fn venue_win_rate(window: &[&GameEntry], home: bool) -> f64 {
    let games: Vec<&&GameEntry> = window.iter().filter(|e| e.is_home == home).collect();
    if games.is_empty() {
        return 0.5;
    }
    games.iter().filter(|e| e.won).count() as f64 / games.len() as f64
}

/// Signed run of identical outcomes ending at the most recent game
fn streak(newest_first: &[&GameEntry]) -> i64 {
    let first = match newest_first.first() {
        Some(entry) => entry.won,
        None => return 0,
    };
    let run = newest_first.iter().take_while(|e| e.won == first).count() as i64;
    if first {
        run
    } else {
        -run
    }
}
