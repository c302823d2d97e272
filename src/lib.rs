//! Multi-sport game outcome estimation
//!
//! Replays historical results into per-team skill ratings and leakage-free
//! rolling feature snapshots, then turns them into calibrated win
//! probabilities, integer scores, period splits and explanations.

pub mod data;
pub mod evaluation;
pub mod features;
pub mod pipeline;
pub mod predict;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Rating every team starts from and regresses toward
pub const INITIAL_RATING: f64 = 1500.0;

/// Unique identifier for a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub i64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team({})", self.0)
    }
}

/// Unique identifier for a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId(pub i64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Game({})", self.0)
    }
}

/// Supported sports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sport {
    Nba,
    Nhl,
    Mlb,
    Ncaab,
    Nfl,
    Ncaaf,
}

impl Sport {
    pub const ALL: [Sport; 6] = [
        Sport::Nba,
        Sport::Nhl,
        Sport::Mlb,
        Sport::Ncaab,
        Sport::Nfl,
        Sport::Ncaaf,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Sport::Nba => "NBA",
            Sport::Nhl => "NHL",
            Sport::Mlb => "MLB",
            Sport::Ncaab => "NCAAB",
            Sport::Nfl => "NFL",
            Sport::Ncaaf => "NCAAF",
        }
    }

    /// Which boxscore schema this sport's stats follow
    pub fn family(&self) -> StatFamily {
        match self {
            Sport::Nba | Sport::Ncaab => StatFamily::Basketball,
            Sport::Nhl => StatFamily::Hockey,
            Sport::Mlb => StatFamily::Baseball,
            Sport::Nfl | Sport::Ncaaf => StatFamily::Gridiron,
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Sport {
    type Err = ScorelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "NBA" => Ok(Sport::Nba),
            "NHL" => Ok(Sport::Nhl),
            "MLB" => Ok(Sport::Mlb),
            "NCAAB" => Ok(Sport::Ncaab),
            "NFL" => Ok(Sport::Nfl),
            "NCAAF" => Ok(Sport::Ncaaf),
            _ => Err(ScorelineError::UnknownSport(s.to_string())),
        }
    }
}

/// Families of sports sharing a boxscore schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatFamily {
    Basketball,
    Hockey,
    Baseball,
    Gridiron,
}

/// Lifecycle state of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(GameStatus::Scheduled),
            "in_progress" | "in-progress" => Some(GameStatus::InProgress),
            "final" => Some(GameStatus::Final),
            _ => None,
        }
    }
}

/// A team competing in one sport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub sport: Sport,
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    #[serde(default = "default_rating")]
    pub current_rating: f64,
}

fn default_rating() -> f64 {
    INITIAL_RATING
}

/// A single game, scheduled or played
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub sport: Sport,
    pub season: i32,
    pub date: NaiveDate,
    pub status: GameStatus,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    #[serde(default)]
    pub home_period_scores: Vec<u32>,
    #[serde(default)]
    pub away_period_scores: Vec<u32>,
    #[serde(default)]
    pub is_postseason: bool,
}

impl Game {
    /// Final (home, away) scores, if the game is final and both are known
    pub fn final_scores(&self) -> Option<(u32, u32)> {
        if self.status != GameStatus::Final {
            return None;
        }
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }

    /// Returns the score margin (positive = home win)
    pub fn margin(&self) -> Option<i64> {
        self.final_scores().map(|(h, a)| h as i64 - a as i64)
    }

    /// Check if the given team won this game
    pub fn did_win(&self, team: TeamId) -> Option<bool> {
        let (h, a) = self.final_scores()?;
        if team == self.home_team {
            Some(h > a)
        } else if team == self.away_team {
            Some(a > h)
        } else {
            None
        }
    }

    /// Get the opponent for a given team
    pub fn opponent(&self, team: TeamId) -> Option<TeamId> {
        if team == self.home_team {
            Some(self.away_team)
        } else if team == self.away_team {
            Some(self.home_team)
        } else {
            None
        }
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.home_team == team || self.away_team == team
    }

    /// Get final score for a specific team
    pub fn score_for(&self, team: TeamId) -> Option<u32> {
        let (h, a) = self.final_scores()?;
        if team == self.home_team {
            Some(h)
        } else if team == self.away_team {
            Some(a)
        } else {
            None
        }
    }

    /// Get final score against a specific team
    pub fn score_against(&self, team: TeamId) -> Option<u32> {
        self.opponent(team).and_then(|opp| self.score_for(opp))
    }

    /// Period-by-period scores from a team's side
    pub fn period_scores_for(&self, team: TeamId) -> &[u32] {
        if team == self.home_team {
            &self.home_period_scores
        } else if team == self.away_team {
            &self.away_period_scores
        } else {
            &[]
        }
    }
}

/// Raw counting stats for one team in one game, as delivered by ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxscoreRecord {
    pub game: GameId,
    pub team: TeamId,
    pub sport: Sport,
    pub stats: BTreeMap<String, f64>,
}

/// Rating movement of one team across one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingHistoryEntry {
    pub team: TeamId,
    pub game: GameId,
    pub date: NaiveDate,
    pub rating_before: f64,
    pub rating_after: f64,
}

/// Rolling statistics of a team as they stood just before a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSnapshot {
    pub team: TeamId,
    pub game: GameId,
    pub sport: Sport,
    pub as_of_date: NaiveDate,
    pub games_played: usize,
    pub metrics: BTreeMap<String, f64>,
}

impl RollingSnapshot {
    /// Named metric, or `default` when the snapshot does not carry it
    pub fn metric_or(&self, name: &str, default: f64) -> f64 {
        self.metrics.get(name).copied().unwrap_or(default)
    }
}

/// Which side an explanation factor pushes toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorDirection {
    FavorsHome,
    FavorsAway,
}

/// One ranked explanation of a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFactor {
    pub factor: String,
    pub impact: f64,
    pub direction: FactorDirection,
    pub detail: String,
}

/// Predicted per-period points for each side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodSplit {
    pub home: Vec<f64>,
    pub away: Vec<f64>,
}

/// Model prediction output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub game: GameId,
    pub sport: Sport,
    pub created_at: DateTime<Utc>,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub predicted_winner: TeamId,
    /// Probability that the home team wins
    pub win_probability: f64,
    pub confidence: f64,
    pub predicted_home_score: u32,
    pub predicted_away_score: u32,
    pub spread: f64,
    pub total: f64,
    pub periods: PeriodSplit,
    pub key_factors: Vec<KeyFactor>,
}

impl Prediction {
    /// Probability of the predicted winner
    pub fn favorite_probability(&self) -> f64 {
        self.win_probability.max(1.0 - self.win_probability)
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum ScorelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown sport: {0}")]
    UnknownSport(String),

    #[error("Insufficient data for {game}: {reason}")]
    DataIncomplete { game: GameId, reason: String },

    #[error("No trained {role} model for {sport} at {}", .path.display())]
    ModelNotFound {
        sport: Sport,
        role: String,
        path: PathBuf,
    },

    #[error("Source {source_name} failed after {attempts} attempts: {message}")]
    ExternalSource {
        source_name: String,
        attempts: u32,
        message: String,
    },

    #[error("{failed} of {total} sports failed")]
    SportsFailed { failed: usize, total: usize },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ScorelineError {
    /// Errors that skip one unit of work instead of aborting the run
    pub fn is_data_incomplete(&self) -> bool {
        matches!(self, ScorelineError::DataIncomplete { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScorelineError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    /// Per-sport tuning, keyed by sport code
    pub sports: BTreeMap<String, SportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub model_dir: String,
}

/// Rating, calibration and period settings for one sport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportConfig {
    pub k_base: f64,
    /// Home advantage in rating points
    pub home_advantage: f64,
    /// Weight kept from the old rating at a season boundary
    pub season_regression: f64,
    /// Maps win-probability log-odds to an expected point margin
    pub spread_calibration: f64,
    pub period_count: usize,
    pub period_label: String,
    /// Points per game assumed when a team has no history
    pub default_ppg: f64,
}

impl SportConfig {
    fn new(
        k_base: f64,
        home_advantage: f64,
        spread_calibration: f64,
        period_count: usize,
        period_label: &str,
        default_ppg: f64,
    ) -> Self {
        SportConfig {
            k_base,
            home_advantage,
            season_regression: 0.75,
            spread_calibration,
            period_count,
            period_label: period_label.to_string(),
            default_ppg,
        }
    }

    /// Built-in settings for a sport
    pub fn default_for(sport: Sport) -> Self {
        match sport {
            Sport::Nba => SportConfig::new(20.0, 75.0, 12.0, 4, "quarter", 100.0),
            Sport::Nhl => SportConfig::new(16.0, 30.0, 2.5, 3, "period", 3.0),
            Sport::Mlb => SportConfig::new(10.0, 24.0, 5.0, 9, "inning", 4.5),
            Sport::Ncaab => SportConfig::new(20.0, 125.0, 10.0, 2, "half", 70.0),
            Sport::Nfl => SportConfig::new(20.0, 48.0, 10.0, 4, "quarter", 22.0),
            Sport::Ncaaf => SportConfig::new(20.0, 75.0, 10.0, 4, "quarter", 28.0),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig {
                database_path: "data/scoreline.db".to_string(),
                model_dir: "models".to_string(),
            },
            sports: Sport::ALL
                .iter()
                .map(|s| (s.code().to_string(), SportConfig::default_for(*s)))
                .collect(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScorelineError::Configuration(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ScorelineError::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ScorelineError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Settings for a sport; a sport missing from the file is a configuration error
    pub fn sport(&self, sport: Sport) -> Result<&SportConfig> {
        self.sports.get(sport.code()).ok_or_else(|| {
            ScorelineError::Configuration(format!("No configuration found for sport: {}", sport))
        })
    }

    /// Sports that have a configuration entry, in canonical order
    pub fn configured_sports(&self) -> Vec<Sport> {
        Sport::ALL
            .iter()
            .copied()
            .filter(|s| self.sports.contains_key(s.code()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn final_game(home_score: Option<u32>, away_score: Option<u32>) -> Game {
        Game {
            id: GameId(1),
            sport: Sport::Nba,
            season: 2024,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            status: GameStatus::Final,
            home_team: TeamId(1),
            away_team: TeamId(2),
            home_score,
            away_score,
            home_period_scores: vec![],
            away_period_scores: vec![],
            is_postseason: false,
        }
    }

    #[test]
    fn test_sport_parsing() {
        assert_eq!("nba".parse::<Sport>().unwrap(), Sport::Nba);
        assert_eq!("NCAAF".parse::<Sport>().unwrap(), Sport::Ncaaf);
        assert!(matches!(
            "cricket".parse::<Sport>(),
            Err(ScorelineError::UnknownSport(_))
        ));
    }

    #[test]
    fn test_game_perspective() {
        let game = final_game(Some(110), Some(100));
        assert_eq!(game.did_win(TeamId(1)), Some(true));
        assert_eq!(game.did_win(TeamId(2)), Some(false));
        assert_eq!(game.score_against(TeamId(2)), Some(110));
        assert_eq!(game.margin(), Some(10));
        assert_eq!(game.did_win(TeamId(3)), None);
    }

    #[test]
    fn test_missing_score_is_not_final() {
        let game = final_game(Some(3), None);
        assert!(game.final_scores().is_none());
        assert!(game.did_win(TeamId(1)).is_none());
    }

    #[test]
    fn test_config_round_trip_and_missing_sport() {
        let mut config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sport(Sport::Nhl).unwrap().period_count, 3);

        config.sports.remove("MLB");
        assert!(matches!(
            config.sport(Sport::Mlb),
            Err(ScorelineError::Configuration(_))
        ));
        assert!(!config.configured_sports().contains(&Sport::Mlb));
    }
}
