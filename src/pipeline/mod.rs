//! Per-sport coordination of recompute and prediction runs
//!
//! Each run loads every requested sport from the database, computes the
//! sports in parallel (one worker per sport, replays stay sequential within
//! a sport) and commits each sport on its own. A failing sport is logged
//! and reported without touching the others. A sport's ratings, snapshots
//! and predictions are committed together or not at all.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

use crate::data::{Database, GameLog};
use crate::features::elo::EloConfig;
use crate::features::{FeatureAssembler, RatingEngine, RatingReplay, RollingFeatureStore};
use crate::predict::{BatchPrediction, ModelRegistry, ModelSet, PredictionEngine};
use crate::{
    BoxscoreRecord, Config, Game, RatingHistoryEntry, Result, RollingSnapshot, ScorelineError,
    Sport, SportConfig, TeamId,
};

/// What one sport's run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SportReport {
    pub rating_entries: usize,
    pub snapshots: usize,
    pub predictions: usize,
    /// Games left unpredicted for lack of data
    pub skipped: usize,
}

impl fmt::Display for SportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rating entries, {} snapshots, {} predictions ({} skipped)",
            self.rating_entries, self.snapshots, self.predictions, self.skipped
        )
    }
}

/// Outcome of a run for one sport
pub type SportOutcome = (Sport, Result<SportReport>);

/// Collapse per-sport outcomes into one result for the caller
pub fn ensure_all_succeeded(outcomes: &[SportOutcome]) -> Result<()> {
    let failed = outcomes.iter().filter(|(_, o)| o.is_err()).count();
    if failed > 0 {
        return Err(ScorelineError::SportsFailed {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Stages {
    recompute: bool,
    predict: bool,
}

/// Everything a sport's computation needs, read up front
struct SportInput {
    sport: Sport,
    config: SportConfig,
    teams: Vec<TeamId>,
    log: GameLog,
    boxscores: Vec<BoxscoreRecord>,
    /// Committed snapshots and ratings, used when not recomputing
    stored: Option<(Vec<RollingSnapshot>, Vec<RatingHistoryEntry>)>,
    scheduled: Vec<Game>,
    models: Option<Result<Arc<ModelSet>>>,
}

/// Results waiting to be committed
struct SportOutput {
    sport: Sport,
    replay: Option<RatingReplay>,
    snapshots: Option<Vec<RollingSnapshot>>,
    batch: Option<BatchPrediction>,
    prediction_error: Option<ScorelineError>,
}

/// Runs recompute and prediction across sports
pub struct Coordinator {
    config: Config,
    registry: ModelRegistry,
}

impl Coordinator {
    /// Coordinator loading models from the configured directory
    pub fn new(config: Config) -> Self {
        let registry = ModelRegistry::new(&config.data.model_dir);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: ModelRegistry) -> Self {
        Coordinator { config, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Replay ratings and rolling snapshots from scratch
    pub fn recompute(&self, db: &Database, sports: &[Sport]) -> Vec<SportOutcome> {
        self.execute(
            db,
            sports,
            Stages {
                recompute: true,
                predict: false,
            },
        )
    }

    /// Predict scheduled games from the committed snapshots and ratings
    pub fn predict(&self, db: &Database, sports: &[Sport]) -> Vec<SportOutcome> {
        self.execute(
            db,
            sports,
            Stages {
                recompute: false,
                predict: true,
            },
        )
    }

    /// Recompute, then predict scheduled games from the fresh state
    pub fn run(&self, db: &Database, sports: &[Sport]) -> Vec<SportOutcome> {
        self.execute(
            db,
            sports,
            Stages {
                recompute: true,
                predict: true,
            },
        )
    }

    fn execute(&self, db: &Database, sports: &[Sport], stages: Stages) -> Vec<SportOutcome> {
        let created_at = Utc::now();

        let mut outcomes: Vec<SportOutcome> = Vec::with_capacity(sports.len());
        let mut inputs = Vec::with_capacity(sports.len());
        for &sport in sports {
            match self.load(db, sport, stages) {
                Ok(input) => inputs.push(input),
                Err(e) => outcomes.push((sport, Err(e))),
            }
        }

        let outputs: Vec<SportOutput> = inputs
            .into_par_iter()
            .map(|input| compute(input, created_at))
            .collect();

        for output in outputs {
            let sport = output.sport;
            outcomes.push((sport, commit(db, output)));
        }

        for (sport, outcome) in &outcomes {
            match outcome {
                Ok(report) => log::info!("{}: {}", sport, report),
                Err(e) => log::error!("{}: {}", sport, e),
            }
        }
        outcomes.sort_by_key(|(sport, _)| sports.iter().position(|s| s == sport));
        outcomes
    }

    fn load(&self, db: &Database, sport: Sport, stages: Stages) -> Result<SportInput> {
        let config = self.config.sport(sport)?.clone();
        let log = GameLog::new(db.completed_games(sport)?);

        let (teams, boxscores, stored) = if stages.recompute {
            let teams = db.teams(sport)?.into_iter().map(|t| t.id).collect();
            (teams, db.boxscores(sport)?, None)
        } else {
            let stored = (db.snapshots(sport)?, db.rating_history(sport)?);
            (Vec::new(), Vec::new(), Some(stored))
        };

        let (scheduled, models) = if stages.predict {
            (db.scheduled_games(sport)?, Some(self.registry.get(sport)))
        } else {
            (Vec::new(), None)
        };

        log::debug!(
            "Loaded {}: {} completed games, {} scheduled",
            sport,
            log.len(),
            scheduled.len()
        );
        Ok(SportInput {
            sport,
            config,
            teams,
            log,
            boxscores,
            stored,
            scheduled,
            models,
        })
    }
}

fn compute(input: SportInput, created_at: DateTime<Utc>) -> SportOutput {
    let SportInput {
        sport,
        config,
        teams,
        log,
        boxscores,
        stored,
        scheduled,
        models,
    } = input;

    let mut output = SportOutput {
        sport,
        replay: None,
        snapshots: None,
        batch: None,
        prediction_error: None,
    };

    let (snapshots, history) = match stored {
        Some(stored) => stored,
        None => {
            let replay = RatingEngine::new(EloConfig::from(&config)).replay(&teams, log.games());
            let snapshots = RollingFeatureStore::new(sport, &log, &boxscores).snapshots(&log, &replay);
            let history = replay.history.clone();
            output.snapshots = Some(snapshots.clone());
            output.replay = Some(replay);
            (snapshots, history)
        }
    };

    match models {
        Some(Ok(models)) => {
            let assembler = FeatureAssembler::new(sport, &config, log, snapshots, &history);
            let engine =
                PredictionEngine::new(&assembler, &config, &models).with_timestamp(created_at);
            output.batch = Some(engine.predict_batch(&scheduled));
        }
        Some(Err(e)) => output.prediction_error = Some(e),
        None => {}
    }
    output
}

fn commit(db: &Database, output: SportOutput) -> Result<SportReport> {
    let predictions = output
        .batch
        .as_ref()
        .map(|b| b.predictions.as_slice())
        .unwrap_or(&[]);
    db.commit_sport(
        output.sport,
        output.replay.as_ref(),
        output.snapshots.as_deref(),
        predictions,
    )?;

    let report = SportReport {
        rating_entries: output.replay.as_ref().map_or(0, |r| r.history.len()),
        snapshots: output.snapshots.as_ref().map_or(0, Vec::len),
        predictions: predictions.len(),
        skipped: output.batch.as_ref().map_or(0, |b| b.skipped),
    };

    match output.prediction_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}
