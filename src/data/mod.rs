//! Data layer: storage, chronological game log and ingestion

pub mod database;
pub mod game_log;
pub mod ingest;

pub use database::{Database, DatabaseStats, StoredPrediction};
pub use game_log::GameLog;
pub use ingest::{ingest, merge_batches, GameSource, IngestBatch, IngestSummary, JsonFileSource, RetryPolicy};
