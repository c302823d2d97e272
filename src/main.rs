//! Scoreline CLI
//!
//! Multi-sport game prediction from rating replay and rolling team form.

use clap::{Parser, Subcommand};
use scoreline::{Config, Result, Sport};

#[derive(Parser)]
#[command(name = "scoreline")]
#[command(about = "Multi-sport game outcome estimation", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Replay ratings and rolling snapshots from scratch
    Recompute {
        /// Only this sport (default: every configured sport)
        #[arg(long)]
        sport: Option<Sport>,
    },
    /// Predict scheduled games
    Predict {
        /// Only this sport (default: every configured sport)
        #[arg(long)]
        sport: Option<Sport>,
        /// Recompute ratings and snapshots first
        #[arg(long)]
        recompute: bool,
        /// Output format: table or json
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Grade predictions of finished games and report accuracy
    Evaluate {
        /// Only this sport (default: every configured sport)
        #[arg(long)]
        sport: Option<Sport>,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Import teams, games and boxscores from a JSON file
    Import {
        /// JSON file holding an ingest batch
        file: String,
        /// Only import this sport
        #[arg(long)]
        sport: Option<Sport>,
    },
    /// Show database status
    Status,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Import { file, sport } => commands::data_import(&config, &file, sport),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Recompute { sport } => commands::recompute(config, sport),
        Commands::Predict {
            sport,
            recompute,
            format,
        } => commands::predict(config, sport, recompute, format),
        Commands::Evaluate { sport } => commands::evaluate(&config, sport),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use std::collections::{BTreeMap, HashMap};

    use super::*;
    use scoreline::data::{ingest, Database, JsonFileSource, RetryPolicy};
    use scoreline::evaluation::{self, AccuracyOverview};
    use scoreline::pipeline::{ensure_all_succeeded, Coordinator, SportOutcome};
    use scoreline::predict::format_prediction;
    use scoreline::{Prediction, TeamId};

    fn selected_sports(config: &Config, sport: Option<Sport>) -> Result<Vec<Sport>> {
        match sport {
            Some(s) => {
                config.sport(s)?;
                Ok(vec![s])
            }
            None => Ok(config.configured_sports()),
        }
    }

    /// Print per-sport outcomes; fail when any sport failed
    fn report(outcomes: &[SportOutcome]) -> Result<()> {
        for (sport, outcome) in outcomes {
            match outcome {
                Ok(report) => println!("  {:<6} {}", sport.code(), report),
                Err(e) => println!("  {:<6} FAILED: {}", sport.code(), e),
            }
        }
        ensure_all_succeeded(outcomes)
    }

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all(&config.data.model_dir)?;
        println!("Created data/ and {}/ directories", config.data.model_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} to tune per-sport settings", config_path);
        println!("  2. Run 'scoreline data import <file.json>' to load games");
        println!("  3. Export trained models to {}/", config.data.model_dir);
        println!("  4. Run 'scoreline predict --recompute' to predict scheduled games");

        Ok(())
    }

    pub fn data_import(config: &Config, file: &str, sport: Option<Sport>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let source = JsonFileSource::new(file);
        let policy = RetryPolicy::default();

        for sport in selected_sports(config, sport)? {
            let summary = ingest(&db, &source, sport, &policy)?;
            if summary.teams + summary.games + summary.boxscores > 0 {
                println!(
                    "  {:<6} {} teams, {} games, {} boxscores",
                    sport.code(),
                    summary.teams,
                    summary.games,
                    summary.boxscores
                );
            }
        }
        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        for sport in config.configured_sports() {
            let stats = db.stats(sport)?;
            if stats.game_count == 0 {
                continue;
            }
            println!("\n  {}", sport);
            println!("    Teams:        {}", stats.team_count);
            println!(
                "    Games:        {} ({} final)",
                stats.game_count, stats.completed_count
            );
            println!("    Snapshots:    {}", stats.snapshot_count);
            println!("    Predictions:  {}", stats.prediction_count);
            if let (Some(earliest), Some(latest)) = (stats.earliest_game, stats.latest_game) {
                println!("    Range:        {} to {}", earliest, latest);
            }
        }

        Ok(())
    }

    pub fn recompute(config: Config, sport: Option<Sport>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let sports = selected_sports(&config, sport)?;
        let coordinator = Coordinator::new(config);

        println!("Recomputing {} sport(s)...", sports.len());
        report(&coordinator.recompute(&db, &sports))
    }

    pub fn predict(config: Config, sport: Option<Sport>, recompute: bool, format: OutputFormat) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let sports = selected_sports(&config, sport)?;
        let coordinator = Coordinator::new(config);

        let outcomes = if recompute {
            coordinator.run(&db, &sports)
        } else {
            coordinator.predict(&db, &sports)
        };

        for (sport, outcome) in &outcomes {
            if outcome.is_err() {
                continue;
            }
            let names: HashMap<_, _> = db
                .teams(*sport)?
                .into_iter()
                .map(|t| (t.id, t.name))
                .collect();
            let period_label = &coordinator.config().sport(*sport)?.period_label;

            for prediction in latest_predictions(&db, *sport)? {
                match format {
                    OutputFormat::Table => {
                        let name = |id: TeamId| names.get(&id).cloned().unwrap_or_else(|| id.to_string());
                        print!(
                            "{}",
                            format_prediction(
                                &prediction,
                                &name(prediction.home_team),
                                &name(prediction.away_team),
                                period_label
                            )
                        );
                    }
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&prediction)?);
                    }
                }
            }
        }

        report(&outcomes)
    }

    /// Newest ungraded prediction per game
    fn latest_predictions(db: &Database, sport: Sport) -> Result<Vec<Prediction>> {
        let mut latest = BTreeMap::new();
        for stored in db.ungraded_predictions(sport)? {
            latest.insert(stored.prediction.game, stored.prediction);
        }
        Ok(latest.into_values().collect())
    }

    pub fn evaluate(config: &Config, sport: Option<Sport>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let mut overall = AccuracyOverview::new();

        println!("Prediction Accuracy");
        println!("───────────────────────────────");
        for sport in selected_sports(config, sport)? {
            let graded = evaluation::evaluate(&db, sport)?;
            let overview = evaluation::overview(&db, Some(sport))?;
            if overview.count == 0 {
                continue;
            }
            println!("  {:<6} {} (+{} new)", sport.code(), overview, graded);
            overall.merge(&overview);
        }
        println!("  {:<6} {}", "ALL", overall);

        Ok(())
    }
}
