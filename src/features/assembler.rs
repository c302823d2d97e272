//! Model input assembly
//!
//! Turns the two teams' rolling snapshots into a named feature map, falling
//! back to aggregating the game log directly when snapshots are missing or
//! too thin.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::data::{Database, GameLog};
use crate::{
    Game, GameId, RatingHistoryEntry, Result, RollingSnapshot, ScorelineError, Sport,
    SportConfig, TeamId, INITIAL_RATING,
};

/// Named model inputs
pub type FeatureMap = BTreeMap<String, f64>;

/// Prior games each team needs before features are trusted
pub const MIN_GAMES_PLAYED: usize = 3;

const MAX_REST_DAYS: f64 = 7.0;
const DEFAULT_REST_DAYS: f64 = 3.0;
const H2H_GAMES: usize = 5;

/// Features shared by every sport, in declared order
pub const BASE_FEATURE_NAMES: [&str; 14] = [
    "elo_diff",
    "home_win_pct_10",
    "away_win_pct_10",
    "home_ppg_20",
    "away_ppg_20",
    "home_papg_20",
    "away_papg_20",
    "rest_days_home",
    "rest_days_away",
    "h2h_home_wins_last5",
    "home_streak",
    "away_streak",
    "home_margin_avg_10",
    "away_margin_avg_10",
];

/// Snapshot metrics each sport adds, read once per side
pub fn sport_metric_names(sport: Sport) -> &'static [&'static str] {
    match sport {
        Sport::Nba => &[
            "efg_pct_10",
            "tov_pct_10",
            "ftr_10",
            "oreb_pct_10",
            "net_rating_10",
            "pace_10",
        ],
        Sport::Ncaab => &["efg_pct_10", "tov_pct_10", "ftr_10", "oreb_pct_10"],
        Sport::Nhl => &[
            "save_pct_10",
            "shot_diff_10",
            "pp_pct_10",
            "pk_pct_10",
            "goals_per_game_10",
        ],
        Sport::Mlb => &[
            "ops_10",
            "era_10",
            "whip_10",
            "k_bb_ratio_10",
            "runs_per_game_10",
        ],
        Sport::Nfl | Sport::Ncaaf => &["yards_per_play_10", "tov_margin_10", "third_down_pct_10"],
    }
}

/// Full declared feature schema of a sport
pub fn feature_names(sport: Sport) -> Vec<String> {
    let mut names: Vec<String> = BASE_FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
    for metric in sport_metric_names(sport) {
        names.push(format!("home_{}", metric));
        names.push(format!("away_{}", metric));
    }
    names
}

/// Render features in exactly the given order.
///
/// # Panics
///
/// Panics if a name is missing from the map. Model schemas are checked
/// against [`feature_names`] when artifacts load, so a miss here is a bug.
pub fn to_array(features: &FeatureMap, names: &[String]) -> Vec<f64> {
    names
        .iter()
        .map(|name| match features.get(name) {
            Some(value) => *value,
            None => panic!("feature '{}' missing from assembled features", name),
        })
        .collect()
}

/// Where a feature map came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSource {
    Snapshot,
    History,
}

#[derive(Debug, Clone)]
pub struct AssembledFeatures {
    pub values: FeatureMap,
    pub source: FeatureSource,
}

/// Read-only view of one sport's history for feature assembly
pub struct FeatureAssembler {
    sport: Sport,
    default_ppg: f64,
    log: GameLog,
    snapshots: HashMap<TeamId, Vec<RollingSnapshot>>,
    ratings: HashMap<TeamId, Vec<(NaiveDate, f64)>>,
}

impl FeatureAssembler {
    pub fn new(
        sport: Sport,
        config: &SportConfig,
        log: GameLog,
        snapshots: Vec<RollingSnapshot>,
        history: &[RatingHistoryEntry],
    ) -> Self {
        let mut by_team: HashMap<TeamId, Vec<RollingSnapshot>> = HashMap::new();
        for snapshot in snapshots {
            by_team.entry(snapshot.team).or_default().push(snapshot);
        }
        for list in by_team.values_mut() {
            list.sort_by_key(|s| (s.as_of_date, s.game));
        }

        let mut ratings: HashMap<TeamId, Vec<(NaiveDate, f64)>> = HashMap::new();
        for entry in history {
            ratings
                .entry(entry.team)
                .or_default()
                .push((entry.date, entry.rating_after));
        }

        FeatureAssembler {
            sport,
            default_ppg: config.default_ppg,
            log,
            snapshots: by_team,
            ratings,
        }
    }

    /// Load a sport's committed games, snapshots and ratings
    pub fn from_database(db: &Database, sport: Sport, config: &SportConfig) -> Result<Self> {
        let log = GameLog::new(db.completed_games(sport)?);
        let snapshots = db.snapshots(sport)?;
        let history = db.rating_history(sport)?;
        Ok(Self::new(sport, config, log, snapshots, &history))
    }

    pub fn sport(&self) -> Sport {
        self.sport
    }

    pub fn log(&self) -> &GameLog {
        &self.log
    }

    /// Features for a game, from snapshots when possible
    pub fn compute(&self, game: &Game) -> Result<AssembledFeatures> {
        if let Some(values) = self.from_snapshots(game) {
            return Ok(AssembledFeatures {
                values,
                source: FeatureSource::Snapshot,
            });
        }

        log::debug!("No usable snapshots for {}, aggregating history", game.id);
        Ok(AssembledFeatures {
            values: self.from_history(game)?,
            source: FeatureSource::History,
        })
    }

    /// Snapshot stored for this game, else the latest one dated before it
    pub fn snapshot_for(&self, team: TeamId, game: &Game) -> Option<&RollingSnapshot> {
        let list = self.snapshots.get(&team)?;
        if let Some(exact) = list.iter().find(|s| s.game == game.id) {
            return Some(exact);
        }
        let end = list.partition_point(|s| s.as_of_date < game.date);
        end.checked_sub(1).map(|i| &list[i])
    }

    fn from_snapshots(&self, game: &Game) -> Option<FeatureMap> {
        let home = self.snapshot_for(game.home_team, game)?;
        let away = self.snapshot_for(game.away_team, game)?;
        if home.games_played < MIN_GAMES_PLAYED || away.games_played < MIN_GAMES_PLAYED {
            return None;
        }

        let mut f = FeatureMap::new();
        let mut put = |name: &str, value: f64| {
            f.insert(name.to_string(), value);
        };

        put(
            "elo_diff",
            home.metric_or("elo", INITIAL_RATING) - away.metric_or("elo", INITIAL_RATING),
        );
        put("home_win_pct_10", home.metric_or("win_pct_10", 0.5));
        put("away_win_pct_10", away.metric_or("win_pct_10", 0.5));
        put("home_ppg_20", home.metric_or("ppg_20", 0.0));
        put("away_ppg_20", away.metric_or("ppg_20", 0.0));
        put("home_papg_20", home.metric_or("papg_20", 0.0));
        put("away_papg_20", away.metric_or("papg_20", 0.0));
        put("rest_days_home", self.rest_days(game.home_team, game.date));
        put("rest_days_away", self.rest_days(game.away_team, game.date));
        put(
            "h2h_home_wins_last5",
            self.head_to_head(game.home_team, game.away_team, game.date),
        );
        put("home_streak", home.metric_or("streak", 0.0));
        put("away_streak", away.metric_or("streak", 0.0));
        put("home_margin_avg_10", home.metric_or("margin_avg_10", 0.0));
        put("away_margin_avg_10", away.metric_or("margin_avg_10", 0.0));

        for metric in sport_metric_names(self.sport) {
            put(&format!("home_{}", metric), home.metric_or(metric, 0.0));
            put(&format!("away_{}", metric), away.metric_or(metric, 0.0));
        }
        Some(f)
    }

    fn from_history(&self, game: &Game) -> Result<FeatureMap> {
        let home_10 = self.log.last_n_before(game.home_team, game.date, 10);
        let away_10 = self.log.last_n_before(game.away_team, game.date, 10);
        if home_10.len() < MIN_GAMES_PLAYED || away_10.len() < MIN_GAMES_PLAYED {
            return Err(ScorelineError::DataIncomplete {
                game: game.id,
                reason: format!(
                    "need {} prior games per team, have {} (home) and {} (away)",
                    MIN_GAMES_PLAYED,
                    home_10.len(),
                    away_10.len()
                ),
            });
        }
        let home_20 = self.log.last_n_before(game.home_team, game.date, 20);
        let away_20 = self.log.last_n_before(game.away_team, game.date, 20);

        let home = TeamForm::from_games(game.home_team, &home_10, &home_20, self.default_ppg);
        let away = TeamForm::from_games(game.away_team, &away_10, &away_20, self.default_ppg);

        let mut f = FeatureMap::new();
        let mut put = |name: &str, value: f64| {
            f.insert(name.to_string(), value);
        };

        put(
            "elo_diff",
            self.rating_before(game.home_team, game.date)
                - self.rating_before(game.away_team, game.date),
        );
        put("home_win_pct_10", home.win_pct);
        put("away_win_pct_10", away.win_pct);
        put("home_ppg_20", home.ppg);
        put("away_ppg_20", away.ppg);
        put("home_papg_20", home.papg);
        put("away_papg_20", away.papg);
        put("rest_days_home", self.rest_days(game.home_team, game.date));
        put("rest_days_away", self.rest_days(game.away_team, game.date));
        put(
            "h2h_home_wins_last5",
            self.head_to_head(game.home_team, game.away_team, game.date),
        );
        put("home_streak", home.streak);
        put("away_streak", away.streak);
        put("home_margin_avg_10", home.margin_avg);
        put("away_margin_avg_10", away.margin_avg);

        for metric in sport_metric_names(self.sport) {
            put(&format!("home_{}", metric), 0.0);
            put(&format!("away_{}", metric), 0.0);
        }
        Ok(f)
    }

    /// Days since the team last played, capped at a week
    pub fn rest_days(&self, team: TeamId, date: NaiveDate) -> f64 {
        match self.log.previous_game_date(team, date) {
            Some(previous) => ((date - previous).num_days() as f64).min(MAX_REST_DAYS),
            None => DEFAULT_REST_DAYS,
        }
    }

    /// Share of the last five meetings won by the home side
    pub fn head_to_head(&self, home: TeamId, away: TeamId, date: NaiveDate) -> f64 {
        let meetings = self.log.head_to_head_before(home, away, date, H2H_GAMES);
        if meetings.is_empty() {
            return 0.5;
        }
        let wins = meetings
            .iter()
            .filter(|g| g.did_win(home) == Some(true))
            .count();
        wins as f64 / meetings.len() as f64
    }

    /// Latest post-game rating of a team before a date
    fn rating_before(&self, team: TeamId, date: NaiveDate) -> f64 {
        self.ratings
            .get(&team)
            .and_then(|list| {
                let end = list.partition_point(|(d, _)| *d < date);
                end.checked_sub(1).map(|i| list[i].1)
            })
            .unwrap_or(INITIAL_RATING)
    }
}

/// Plain aggregates over a team's recent games
struct TeamForm {
    win_pct: f64,
    ppg: f64,
    papg: f64,
    streak: f64,
    margin_avg: f64,
}

impl TeamForm {
    /// Both slices are most recent first
    fn from_games(team: TeamId, last_10: &[&Game], last_20: &[&Game], default_ppg: f64) -> Self {
        let won = |g: &Game| g.did_win(team) == Some(true);
        let points_for = |g: &Game| g.score_for(team).unwrap_or(0) as f64;
        let points_against = |g: &Game| g.score_against(team).unwrap_or(0) as f64;

        let streak = match last_10.first() {
            Some(latest) => {
                let first = won(*latest);
                let run = last_10.iter().take_while(|&&g| won(g) == first).count() as f64;
                if first {
                    run
                } else {
                    -run
                }
            }
            None => 0.0,
        };

        TeamForm {
            win_pct: mean(last_10, 0.5, |g| if won(g) { 1.0 } else { 0.0 }),
            ppg: mean(last_20, default_ppg, points_for),
            papg: mean(last_20, default_ppg, points_against),
            streak,
            margin_avg: mean(last_10, 0.0, |g| points_for(g) - points_against(g)),
        }
    }
}

fn mean(games: &[&Game], default: f64, f: impl Fn(&Game) -> f64) -> f64 {
    if games.is_empty() {
        return default;
    }
    games.iter().map(|&g| f(g)).sum::<f64>() / games.len() as f64
}
