//! SQLite database management for games, ratings, snapshots and predictions

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

use crate::evaluation::PredictionAccuracy;
use crate::features::RatingReplay;
use crate::{
    BoxscoreRecord, Game, GameId, GameStatus, PeriodSplit, Prediction, RatingHistoryEntry,
    Result, RollingSnapshot, Sport, Team, TeamId, INITIAL_RATING,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A prediction as stored, with its row id
#[derive(Debug, Clone)]
pub struct StoredPrediction {
    pub id: i64,
    pub prediction: Prediction,
}

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY,
                sport TEXT NOT NULL,
                name TEXT NOT NULL,
                abbreviation TEXT NOT NULL DEFAULT '',
                current_rating REAL NOT NULL DEFAULT 1500.0
            );

            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY,
                sport TEXT NOT NULL,
                season INTEGER NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL,
                home_team_id INTEGER NOT NULL REFERENCES teams(id),
                away_team_id INTEGER NOT NULL REFERENCES teams(id),
                home_score INTEGER,
                away_score INTEGER,
                home_period_scores TEXT NOT NULL DEFAULT '[]',
                away_period_scores TEXT NOT NULL DEFAULT '[]',
                is_postseason INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS boxscores (
                game_id INTEGER NOT NULL REFERENCES games(id),
                team_id INTEGER NOT NULL REFERENCES teams(id),
                sport TEXT NOT NULL,
                stats TEXT NOT NULL,
                UNIQUE(game_id, team_id)
            );

            CREATE TABLE IF NOT EXISTS rating_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sport TEXT NOT NULL,
                team_id INTEGER NOT NULL REFERENCES teams(id),
                game_id INTEGER NOT NULL REFERENCES games(id),
                date TEXT NOT NULL,
                rating_before REAL NOT NULL,
                rating_after REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rolling_snapshots (
                team_id INTEGER NOT NULL REFERENCES teams(id),
                game_id INTEGER NOT NULL REFERENCES games(id),
                sport TEXT NOT NULL,
                as_of_date TEXT NOT NULL,
                games_played INTEGER NOT NULL,
                metrics TEXT NOT NULL,
                UNIQUE(team_id, game_id)
            );

            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL REFERENCES games(id),
                sport TEXT NOT NULL,
                created_at TEXT NOT NULL,
                home_team_id INTEGER NOT NULL,
                away_team_id INTEGER NOT NULL,
                predicted_winner_id INTEGER NOT NULL,
                win_probability REAL NOT NULL,
                confidence REAL NOT NULL,
                predicted_home_score INTEGER NOT NULL,
                predicted_away_score INTEGER NOT NULL,
                spread REAL NOT NULL,
                total REAL NOT NULL,
                periods TEXT NOT NULL,
                key_factors TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS prediction_accuracy (
                prediction_id INTEGER NOT NULL UNIQUE REFERENCES predictions(id),
                game_id INTEGER NOT NULL REFERENCES games(id),
                sport TEXT NOT NULL,
                was_correct INTEGER NOT NULL,
                home_score_error REAL NOT NULL,
                away_score_error REAL NOT NULL,
                total_score_error REAL NOT NULL,
                spread_error REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_games_sport_date ON games(sport, date);
            CREATE INDEX IF NOT EXISTS idx_rating_team_date ON rating_history(team_id, date);
            CREATE INDEX IF NOT EXISTS idx_snapshots_team_date ON rolling_snapshots(team_id, as_of_date);
            "#,
        )?;
        Ok(())
    }

    /// Run `f` in one transaction; nothing is kept if it fails.
    /// `f` must only use single-statement operations such as the upserts.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Persist one sport's run in a single transaction: the rating replay
    /// and snapshots replace the stored ones, predictions are appended.
    /// On error nothing of the run is kept.
    pub fn commit_sport(
        &self,
        sport: Sport,
        replay: Option<&RatingReplay>,
        snapshots: Option<&[RollingSnapshot]>,
        predictions: &[Prediction],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(replay) = replay {
            write_ratings(&tx, sport, replay)?;
        }
        if let Some(snapshots) = snapshots {
            write_snapshots(&tx, sport, snapshots)?;
        }
        insert_predictions(&tx, predictions)?;
        tx.commit()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // ==================== Team Operations ====================

    /// Insert or update a team (the current rating is owned by the rating replay)
    pub fn upsert_team(&self, team: &Team) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO teams (id, sport, name, abbreviation, current_rating)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                sport = excluded.sport,
                name = excluded.name,
                abbreviation = excluded.abbreviation
            "#,
            params![
                team.id.0,
                team.sport.code(),
                team.name,
                team.abbreviation,
                team.current_rating
            ],
        )?;
        Ok(())
    }

    /// Get all teams of a sport
    pub fn teams(&self, sport: Sport) -> Result<Vec<Team>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sport, name, abbreviation, current_rating
             FROM teams WHERE sport = ?1 ORDER BY id",
        )?;
        let teams = stmt
            .query_map(params![sport.code()], |row| {
                Ok(Team {
                    id: TeamId(row.get(0)?),
                    sport: sport_column(row, 1)?,
                    name: row.get(2)?,
                    abbreviation: row.get(3)?,
                    current_rating: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    // ==================== Game Operations ====================

    /// Insert or update a game record
    pub fn upsert_game(&self, game: &Game) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO games (id, sport, season, date, status, home_team_id, away_team_id,
                               home_score, away_score, home_period_scores, away_period_scores,
                               is_postseason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                season = excluded.season,
                date = excluded.date,
                status = excluded.status,
                home_score = COALESCE(excluded.home_score, home_score),
                away_score = COALESCE(excluded.away_score, away_score),
                home_period_scores = excluded.home_period_scores,
                away_period_scores = excluded.away_period_scores,
                is_postseason = excluded.is_postseason
            "#,
            params![
                game.id.0,
                game.sport.code(),
                game.season,
                game.date.format(DATE_FORMAT).to_string(),
                game.status.as_str(),
                game.home_team.0,
                game.away_team.0,
                game.home_score,
                game.away_score,
                serde_json::to_string(&game.home_period_scores)?,
                serde_json::to_string(&game.away_period_scores)?,
                game.is_postseason,
            ],
        )?;
        Ok(())
    }

    /// Final games of a sport in chronological order
    pub fn completed_games(&self, sport: Sport) -> Result<Vec<Game>> {
        self.games_with_status(sport, GameStatus::Final)
    }

    /// Upcoming games of a sport in chronological order
    pub fn scheduled_games(&self, sport: Sport) -> Result<Vec<Game>> {
        self.games_with_status(sport, GameStatus::Scheduled)
    }

    /// Look up a single game
    pub fn game(&self, id: GameId) -> Result<Option<Game>> {
        let game = self
            .conn
            .query_row(
                &format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS),
                params![id.0],
                row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    fn games_with_status(&self, sport: Sport, status: GameStatus) -> Result<Vec<Game>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM games WHERE sport = ?1 AND status = ?2 ORDER BY date, id",
            GAME_COLUMNS
        ))?;
        let games = stmt
            .query_map(params![sport.code(), status.as_str()], row_to_game)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(games)
    }

    // ==================== Boxscore Operations ====================

    /// Insert or replace the stats of one team in one game
    pub fn upsert_boxscore(&self, record: &BoxscoreRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO boxscores (game_id, team_id, sport, stats)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(game_id, team_id) DO UPDATE SET stats = excluded.stats
            "#,
            params![
                record.game.0,
                record.team.0,
                record.sport.code(),
                serde_json::to_string(&record.stats)?,
            ],
        )?;
        Ok(())
    }

    /// All boxscores of a sport
    pub fn boxscores(&self, sport: Sport) -> Result<Vec<BoxscoreRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT game_id, team_id, sport, stats FROM boxscores WHERE sport = ?1")?;
        let records = stmt
            .query_map(params![sport.code()], |row| {
                Ok(BoxscoreRecord {
                    game: GameId(row.get(0)?),
                    team: TeamId(row.get(1)?),
                    sport: sport_column(row, 2)?,
                    stats: json_column::<BTreeMap<String, f64>>(row, 3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ==================== Rating Operations ====================

    /// Rating history of a sport in replay order
    pub fn rating_history(&self, sport: Sport) -> Result<Vec<RatingHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, game_id, date, rating_before, rating_after
             FROM rating_history WHERE sport = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![sport.code()], |row| {
                Ok(RatingHistoryEntry {
                    team: TeamId(row.get(0)?),
                    game: GameId(row.get(1)?),
                    date: date_column(row, 2)?,
                    rating_before: row.get(3)?,
                    rating_after: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ==================== Snapshot Operations ====================

    /// All snapshots of a sport
    pub fn snapshots(&self, sport: Sport) -> Result<Vec<RollingSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, game_id, sport, as_of_date, games_played, metrics
             FROM rolling_snapshots WHERE sport = ?1 ORDER BY as_of_date, game_id, team_id",
        )?;
        let snapshots = stmt
            .query_map(params![sport.code()], |row| {
                let games_played: i64 = row.get(4)?;
                Ok(RollingSnapshot {
                    team: TeamId(row.get(0)?),
                    game: GameId(row.get(1)?),
                    sport: sport_column(row, 2)?,
                    as_of_date: date_column(row, 3)?,
                    games_played: games_played.max(0) as usize,
                    metrics: json_column(row, 5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    // ==================== Prediction Operations ====================

    /// Store a batch of predictions, returning their row ids
    pub fn save_predictions(&self, predictions: &[Prediction]) -> Result<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let ids = insert_predictions(&tx, predictions)?;
        tx.commit()?;
        Ok(ids)
    }

    /// Stored predictions of a sport that have not been graded yet
    pub fn ungraded_predictions(&self, sport: Sport) -> Result<Vec<StoredPrediction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, game_id, sport, created_at, home_team_id, away_team_id,
                    predicted_winner_id, win_probability, confidence, predicted_home_score,
                    predicted_away_score, spread, total, periods, key_factors
             FROM predictions
             WHERE sport = ?1
               AND id NOT IN (SELECT prediction_id FROM prediction_accuracy)
             ORDER BY id",
        )?;
        let predictions = stmt
            .query_map(params![sport.code()], |row| {
                let created: String = row.get(3)?;
                let created_at = DateTime::parse_from_rfc3339(&created)
                    .map_err(|e| conversion_error(3, e))?
                    .with_timezone(&Utc);
                Ok(StoredPrediction {
                    id: row.get(0)?,
                    prediction: Prediction {
                        game: GameId(row.get(1)?),
                        sport: sport_column(row, 2)?,
                        created_at,
                        home_team: TeamId(row.get(4)?),
                        away_team: TeamId(row.get(5)?),
                        predicted_winner: TeamId(row.get(6)?),
                        win_probability: row.get(7)?,
                        confidence: row.get(8)?,
                        predicted_home_score: row.get(9)?,
                        predicted_away_score: row.get(10)?,
                        spread: row.get(11)?,
                        total: row.get(12)?,
                        periods: json_column::<PeriodSplit>(row, 13)?,
                        key_factors: json_column(row, 14)?,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(predictions)
    }

    // ==================== Accuracy Operations ====================

    /// Store graded predictions; re-grading the same prediction is ignored
    pub fn save_accuracy(&self, records: &[PredictionAccuracy]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stored = 0;
        {
            let mut insert = tx.prepare(
                r#"
                INSERT OR IGNORE INTO prediction_accuracy
                    (prediction_id, game_id, sport, was_correct, home_score_error,
                     away_score_error, total_score_error, spread_error)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for r in records {
                stored += insert.execute(params![
                    r.prediction_id,
                    r.game.0,
                    r.sport.code(),
                    r.was_correct,
                    r.home_score_error,
                    r.away_score_error,
                    r.total_score_error,
                    r.spread_error,
                ])?;
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    /// Graded predictions, optionally restricted to one sport
    pub fn accuracy_records(&self, sport: Option<Sport>) -> Result<Vec<PredictionAccuracy>> {
        let mut stmt = self.conn.prepare(
            "SELECT prediction_id, game_id, sport, was_correct, home_score_error,
                    away_score_error, total_score_error, spread_error
             FROM prediction_accuracy
             WHERE ?1 IS NULL OR sport = ?1
             ORDER BY prediction_id",
        )?;
        let records = stmt
            .query_map(params![sport.map(|s| s.code())], |row| {
                Ok(PredictionAccuracy {
                    prediction_id: row.get(0)?,
                    game: GameId(row.get(1)?),
                    sport: sport_column(row, 2)?,
                    was_correct: row.get(3)?,
                    home_score_error: row.get(4)?,
                    away_score_error: row.get(5)?,
                    total_score_error: row.get(6)?,
                    spread_error: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ==================== Statistics ====================

    /// Get database statistics for one sport
    pub fn stats(&self, sport: Sport) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(sql, params![sport.code()], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        };

        let (earliest, latest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(date), MAX(date) FROM games WHERE sport = ?1",
            params![sport.code()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DatabaseStats {
            team_count: count("SELECT COUNT(*) FROM teams WHERE sport = ?1")?,
            game_count: count("SELECT COUNT(*) FROM games WHERE sport = ?1")?,
            completed_count: count(
                "SELECT COUNT(*) FROM games WHERE sport = ?1 AND status = 'final'",
            )?,
            snapshot_count: count("SELECT COUNT(*) FROM rolling_snapshots WHERE sport = ?1")?,
            prediction_count: count("SELECT COUNT(*) FROM predictions WHERE sport = ?1")?,
            earliest_game: earliest.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
            latest_game: latest.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        })
    }
}

/// Database statistics for one sport
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub team_count: usize,
    pub game_count: usize,
    pub completed_count: usize,
    pub snapshot_count: usize,
    pub prediction_count: usize,
    pub earliest_game: Option<NaiveDate>,
    pub latest_game: Option<NaiveDate>,
}

const GAME_COLUMNS: &str = "id, sport, season, date, status, home_team_id, away_team_id, \
     home_score, away_score, home_period_scores, away_period_scores, is_postseason";

fn row_to_game(row: &Row) -> rusqlite::Result<Game> {
    let status_text: String = row.get(4)?;
    let status = GameStatus::parse(&status_text).ok_or_else(|| {
        conversion_error(
            4,
            crate::ScorelineError::Parse(format!("unknown game status: {}", status_text)),
        )
    })?;

    Ok(Game {
        id: GameId(row.get(0)?),
        sport: sport_column(row, 1)?,
        season: row.get(2)?,
        date: date_column(row, 3)?,
        status,
        home_team: TeamId(row.get(5)?),
        away_team: TeamId(row.get(6)?),
        home_score: row.get(7)?,
        away_score: row.get(8)?,
        home_period_scores: json_column(row, 9)?,
        away_period_scores: json_column(row, 10)?,
        is_postseason: row.get(11)?,
    })
}

fn write_ratings(tx: &Transaction, sport: Sport, replay: &RatingReplay) -> Result<()> {
    tx.execute(
        "UPDATE teams SET current_rating = ?1 WHERE sport = ?2",
        params![INITIAL_RATING, sport.code()],
    )?;
    tx.execute(
        "DELETE FROM rating_history WHERE sport = ?1",
        params![sport.code()],
    )?;

    let mut insert = tx.prepare(
        "INSERT INTO rating_history (sport, team_id, game_id, date, rating_before, rating_after)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for entry in &replay.history {
        insert.execute(params![
            sport.code(),
            entry.team.0,
            entry.game.0,
            entry.date.format(DATE_FORMAT).to_string(),
            entry.rating_before,
            entry.rating_after,
        ])?;
    }
    let mut update = tx.prepare("UPDATE teams SET current_rating = ?1 WHERE id = ?2")?;
    for (team, rating) in &replay.ratings {
        update.execute(params![rating, team.0])?;
    }
    Ok(())
}

fn write_snapshots(tx: &Transaction, sport: Sport, snapshots: &[RollingSnapshot]) -> Result<()> {
    tx.execute(
        "DELETE FROM rolling_snapshots WHERE sport = ?1",
        params![sport.code()],
    )?;

    let mut upsert = tx.prepare(
        r#"
        INSERT INTO rolling_snapshots (team_id, game_id, sport, as_of_date, games_played, metrics)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(team_id, game_id) DO UPDATE SET
            as_of_date = excluded.as_of_date,
            games_played = excluded.games_played,
            metrics = excluded.metrics
        "#,
    )?;
    for snapshot in snapshots {
        upsert.execute(params![
            snapshot.team.0,
            snapshot.game.0,
            sport.code(),
            snapshot.as_of_date.format(DATE_FORMAT).to_string(),
            snapshot.games_played as i64,
            serde_json::to_string(&snapshot.metrics)?,
        ])?;
    }
    Ok(())
}

fn insert_predictions(tx: &Transaction, predictions: &[Prediction]) -> Result<Vec<i64>> {
    let mut insert = tx.prepare(
        r#"
        INSERT INTO predictions (game_id, sport, created_at, home_team_id, away_team_id,
                                 predicted_winner_id, win_probability, confidence,
                                 predicted_home_score, predicted_away_score, spread,
                                 total, periods, key_factors)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )?;
    let mut ids = Vec::with_capacity(predictions.len());
    for p in predictions {
        insert.execute(params![
            p.game.0,
            p.sport.code(),
            p.created_at.to_rfc3339(),
            p.home_team.0,
            p.away_team.0,
            p.predicted_winner.0,
            p.win_probability,
            p.confidence,
            p.predicted_home_score,
            p.predicted_away_score,
            p.spread,
            p.total,
            serde_json::to_string(&p.periods)?,
            serde_json::to_string(&p.key_factors)?,
        ])?;
        ids.push(tx.last_insert_rowid());
    }
    Ok(ids)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn sport_column(row: &Row, idx: usize) -> rusqlite::Result<Sport> {
    let text: String = row.get(idx)?;
    text.parse::<Sport>().map_err(|e| conversion_error(idx, e))
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(id: i64) -> Team {
        Team {
            id: TeamId(id),
            sport: Sport::Nhl,
            name: format!("Team {}", id),
            abbreviation: format!("T{}", id),
            current_rating: INITIAL_RATING,
        }
    }

    fn game(id: i64, status: GameStatus, scores: Option<(u32, u32)>) -> Game {
        Game {
            id: GameId(id),
            sport: Sport::Nhl,
            season: 2024,
            date: NaiveDate::from_ymd_opt(2024, 10, id as u32).unwrap(),
            status,
            home_team: TeamId(1),
            away_team: TeamId(2),
            home_score: scores.map(|s| s.0),
            away_score: scores.map(|s| s.1),
            home_period_scores: vec![1, 1, 1],
            away_period_scores: vec![0, 2, 0],
            is_postseason: false,
        }
    }

    #[test]
    fn test_create_database() {
        let db = Database::in_memory().unwrap();
        let stats = db.stats(Sport::Nhl).unwrap();
        assert_eq!(stats.team_count, 0);
        assert_eq!(stats.game_count, 0);
        assert!(stats.earliest_game.is_none());
    }

    #[test]
    fn test_games_by_status() {
        let db = Database::in_memory().unwrap();
        db.upsert_team(&team(1)).unwrap();
        db.upsert_team(&team(2)).unwrap();
        db.upsert_game(&game(2, GameStatus::Final, Some((3, 2)))).unwrap();
        db.upsert_game(&game(1, GameStatus::Final, Some((1, 4)))).unwrap();
        db.upsert_game(&game(3, GameStatus::Scheduled, None)).unwrap();

        let completed = db.completed_games(Sport::Nhl).unwrap();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].id, GameId(1));
        assert_eq!(completed[1].away_period_scores, vec![0, 2, 0]);
        assert_eq!(db.scheduled_games(Sport::Nhl).unwrap().len(), 1);
        assert!(db.completed_games(Sport::Nba).unwrap().is_empty());
    }

    fn seed(db: &Database) {
        db.upsert_team(&team(1)).unwrap();
        db.upsert_team(&team(2)).unwrap();
        db.upsert_game(&game(1, GameStatus::Final, Some((3, 2)))).unwrap();
        db.upsert_game(&game(2, GameStatus::Final, Some((1, 4)))).unwrap();
    }

    fn snap(game: i64, played: usize) -> RollingSnapshot {
        RollingSnapshot {
            team: TeamId(1),
            game: GameId(game),
            sport: Sport::Nhl,
            as_of_date: NaiveDate::from_ymd_opt(2024, 10, game as u32).unwrap(),
            games_played: played,
            metrics: BTreeMap::from([("win_pct_10".to_string(), 0.5)]),
        }
    }

    fn replay(rating: f64) -> RatingReplay {
        RatingReplay {
            history: vec![RatingHistoryEntry {
                team: TeamId(1),
                game: GameId(1),
                date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
                rating_before: INITIAL_RATING,
                rating_after: rating,
            }],
            ratings: BTreeMap::from([(TeamId(1), rating)]),
        }
    }

    #[test]
    fn test_boxscore_blob_round_trip() {
        let db = Database::in_memory().unwrap();
        seed(&db);
        let mut stats = BTreeMap::new();
        stats.insert("shots".to_string(), 31.0);
        stats.insert("save_pct".to_string(), 0.912);
        let record = BoxscoreRecord {
            game: GameId(1),
            team: TeamId(1),
            sport: Sport::Nhl,
            stats,
        };
        db.upsert_boxscore(&record).unwrap();
        db.upsert_boxscore(&record).unwrap();

        let stored = db.boxscores(Sport::Nhl).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].stats["shots"], 31.0);
    }

    #[test]
    fn test_snapshot_replacement_discards_previous() {
        let db = Database::in_memory().unwrap();
        seed(&db);

        db.commit_sport(Sport::Nhl, None, Some(&[snap(1, 0), snap(2, 1)]), &[])
            .unwrap();
        db.commit_sport(Sport::Nhl, None, Some(&[snap(2, 7)]), &[]).unwrap();

        let stored = db.snapshots(Sport::Nhl).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].games_played, 7);
    }

    #[test]
    fn test_failed_commit_keeps_previous_ratings() {
        let db = Database::in_memory().unwrap();
        seed(&db);
        db.commit_sport(Sport::Nhl, Some(&replay(1510.0)), Some(&[snap(1, 0)]), &[])
            .unwrap();

        db.connection()
            .execute_batch(
                "CREATE TRIGGER reject_snapshots BEFORE INSERT ON rolling_snapshots
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
        let result = db.commit_sport(Sport::Nhl, Some(&replay(1480.0)), Some(&[snap(2, 1)]), &[]);
        assert!(result.is_err());

        let history = db.rating_history(Sport::Nhl).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rating_after, 1510.0);
        assert_eq!(db.teams(Sport::Nhl).unwrap()[0].current_rating, 1510.0);
        assert_eq!(db.snapshots(Sport::Nhl).unwrap()[0].game, GameId(1));
    }
}
