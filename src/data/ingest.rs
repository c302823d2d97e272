//! Ingestion boundary for game data
//!
//! Sources deliver teams, games and boxscores for a sport. Fetches are
//! retried with exponential backoff and only fail once attempts run out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::Database;
use crate::{BoxscoreRecord, Game, GameId, Result, ScorelineError, Sport, Team, TeamId};

/// Anything that can deliver game data for a sport
pub trait GameSource: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Fetch everything the source has for a sport
    fn fetch(&self, sport: Sport) -> Result<IngestBatch>;
}

/// Records delivered by one fetch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestBatch {
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub boxscores: Vec<BoxscoreRecord>,
}

impl IngestBatch {
    /// Keep only records of one sport
    pub fn for_sport(mut self, sport: Sport) -> Self {
        self.teams.retain(|t| t.sport == sport);
        self.games.retain(|g| g.sport == sport);
        self.boxscores.retain(|b| b.sport == sport);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty() && self.games.is_empty() && self.boxscores.is_empty()
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds or attempts are exhausted
    pub fn run<T, F>(&self, source_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 0..attempts {
            match operation() {
                Ok(result) => return Ok(result),
                Err(e) => {
                    log::warn!("{}: attempt {} failed: {}", source_name, attempt + 1, e);
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        std::thread::sleep(self.base_delay * 2u32.pow(attempt));
                    }
                }
            }
        }
        Err(ScorelineError::ExternalSource {
            source_name: source_name.to_string(),
            attempts,
            message: last_error,
        })
    }
}

/// Merge batches from several sources.
///
/// Games are keyed by id; a final score from any source wins over a missing
/// one, and empty period scores are filled in. Teams keep the first record
/// seen. Boxscore stats are unioned, earlier values winning.
pub fn merge_batches(batches: Vec<IngestBatch>) -> IngestBatch {
    let mut teams: BTreeMap<TeamId, Team> = BTreeMap::new();
    let mut games: BTreeMap<GameId, Game> = BTreeMap::new();
    let mut boxscores: BTreeMap<(GameId, TeamId), BoxscoreRecord> = BTreeMap::new();

    for batch in batches {
        for team in batch.teams {
            teams.entry(team.id).or_insert(team);
        }

        for game in batch.games {
            match games.get_mut(&game.id) {
                Some(existing) => {
                    if existing.final_scores().is_none() && game.final_scores().is_some() {
                        existing.status = game.status;
                        existing.home_score = game.home_score;
                        existing.away_score = game.away_score;
                    }
                    if existing.home_period_scores.is_empty() {
                        existing.home_period_scores = game.home_period_scores;
                    }
                    if existing.away_period_scores.is_empty() {
                        existing.away_period_scores = game.away_period_scores;
                    }
                }
                None => {
                    games.insert(game.id, game);
                }
            }
        }

        for record in batch.boxscores {
            match boxscores.get_mut(&(record.game, record.team)) {
                Some(existing) => {
                    for (name, value) in record.stats {
                        existing.stats.entry(name).or_insert(value);
                    }
                }
                None => {
                    boxscores.insert((record.game, record.team), record);
                }
            }
        }
    }

    let mut games: Vec<Game> = games.into_values().collect();
    games.sort_by_key(|g| (g.date, g.id));
    IngestBatch {
        teams: teams.into_values().collect(),
        games,
        boxscores: boxscores.into_values().collect(),
    }
}

/// A JSON file holding an `IngestBatch`, possibly spanning sports
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        JsonFileSource {
            name: format!("file:{}", path.display()),
            path,
        }
    }
}

impl GameSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, sport: Sport) -> Result<IngestBatch> {
        let content = std::fs::read_to_string(&self.path)?;
        let batch: IngestBatch = serde_json::from_str(&content)?;
        Ok(batch.for_sport(sport))
    }
}

/// What one ingest wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub teams: usize,
    pub games: usize,
    pub boxscores: usize,
}

/// Fetch a sport from a source and store it in one transaction
pub fn ingest(db: &Database, source: &dyn GameSource, sport: Sport, policy: &RetryPolicy) -> Result<IngestSummary> {
    let batch = policy.run(source.name(), || source.fetch(sport))?.for_sport(sport);
    if batch.is_empty() {
        log::info!("{} returned nothing for {}", source.name(), sport);
        return Ok(IngestSummary::default());
    }

    let summary = db.in_transaction(|db| {
        for team in &batch.teams {
            db.upsert_team(team)?;
        }
        for game in &batch.games {
            db.upsert_game(game)?;
        }
        for record in &batch.boxscores {
            db.upsert_boxscore(record)?;
        }
        Ok(IngestSummary {
            teams: batch.teams.len(),
            games: batch.games.len(),
            boxscores: batch.boxscores.len(),
        })
    })?;

    log::info!(
        "Ingested {} teams, {} games, {} boxscores for {} from {}",
        summary.teams,
        summary.games,
        summary.boxscores,
        sport,
        source.name()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::GameStatus;

    fn team(id: i64, sport: Sport, name: &str) -> Team {
        Team {
            id: TeamId(id),
            sport,
            name: name.to_string(),
            abbreviation: String::new(),
            current_rating: 1500.0,
        }
    }

    fn game(id: i64, sport: Sport, score: Option<(u32, u32)>) -> Game {
        Game {
            id: GameId(id),
            sport,
            season: 2024,
            date: NaiveDate::from_ymd_opt(2024, 10, 1 + id as u32).unwrap(),
            status: if score.is_some() {
                GameStatus::Final
            } else {
                GameStatus::Scheduled
            },
            home_team: TeamId(1),
            away_team: TeamId(2),
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            home_period_scores: vec![],
            away_period_scores: vec![],
            is_postseason: false,
        }
    }

    /// Fails a fixed number of times before returning a batch
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
    }

    impl GameSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn fetch(&self, sport: Sport) -> Result<IngestBatch> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ScorelineError::Parse(format!("timeout #{}", call + 1)));
            }
            Ok(IngestBatch {
                teams: vec![team(1, sport, "Home"), team(2, sport, "Away")],
                games: vec![game(1, sport, Some((3, 1))), game(2, sport, None)],
                boxscores: vec![],
            })
        }
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("scoreline-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_retry_recovers() {
        let source = FlakySource {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let db = Database::in_memory().unwrap();
        let summary = ingest(&db, &source, Sport::Nhl, &quick_policy(3)).unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(summary.games, 2);
        assert_eq!(db.completed_games(Sport::Nhl).unwrap().len(), 1);
        assert_eq!(db.scheduled_games(Sport::Nhl).unwrap().len(), 1);
    }

    #[test]
    fn test_retry_exhaustion_surfaces_source_error() {
        let source = FlakySource {
            failures: 5,
            calls: AtomicU32::new(0),
        };
        let db = Database::in_memory().unwrap();
        let err = ingest(&db, &source, Sport::Nhl, &quick_policy(2)).unwrap_err();

        match err {
            ScorelineError::ExternalSource {
                source_name,
                attempts,
                message,
            } => {
                assert_eq!(source_name, "flaky");
                assert_eq!(attempts, 2);
                assert!(message.contains("timeout #2"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(db.teams(Sport::Nhl).unwrap().is_empty());
    }

    #[test]
    fn test_merge_prefers_final_scores() {
        let mut with_periods = game(1, Sport::Nba, None);
        with_periods.home_period_scores = vec![25, 30, 20, 28];

        let merged = merge_batches(vec![
            IngestBatch {
                teams: vec![team(1, Sport::Nba, "First")],
                games: vec![with_periods, game(3, Sport::Nba, None)],
                boxscores: vec![],
            },
            IngestBatch {
                teams: vec![team(1, Sport::Nba, "Second")],
                games: vec![game(1, Sport::Nba, Some((103, 99))), game(2, Sport::Nba, None)],
                boxscores: vec![],
            },
        ]);

        assert_eq!(merged.teams.len(), 1);
        assert_eq!(merged.teams[0].name, "First");
        let ids: Vec<i64> = merged.games.iter().map(|g| g.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(merged.games[0].final_scores(), Some((103, 99)));
        assert_eq!(merged.games[0].home_period_scores, vec![25, 30, 20, 28]);
    }

    #[test]
    fn test_merge_unions_boxscore_stats() {
        let record = |stats: &[(&str, f64)]| BoxscoreRecord {
            game: GameId(1),
            team: TeamId(1),
            sport: Sport::Nba,
            stats: stats.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };
        let merged = merge_batches(vec![
            IngestBatch {
                boxscores: vec![record(&[("fgm", 40.0)])],
                ..Default::default()
            },
            IngestBatch {
                boxscores: vec![record(&[("fgm", 41.0), ("fga", 85.0)])],
                ..Default::default()
            },
        ]);

        assert_eq!(merged.boxscores.len(), 1);
        assert_eq!(merged.boxscores[0].stats["fgm"], 40.0);
        assert_eq!(merged.boxscores[0].stats["fga"], 85.0);
    }

    #[test]
    fn test_json_file_source_filters_sport() {
        let path = scratch_file("ingest");
        let batch = IngestBatch {
            teams: vec![team(1, Sport::Nba, "Hawks"), team(9, Sport::Nhl, "Bruins")],
            games: vec![game(1, Sport::Nba, Some((110, 100)))],
            boxscores: vec![],
        };
        std::fs::write(&path, serde_json::to_string(&batch).unwrap()).unwrap();

        let fetched = JsonFileSource::new(&path).fetch(Sport::Nhl).unwrap();
        assert_eq!(fetched.teams.len(), 1);
        assert_eq!(fetched.teams[0].name, "Bruins");
        assert!(fetched.games.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
