//! Replay Runner: job configuration, execution and artifact export.
//!
//! This crate builds on `replay-core` to provide:
//! - TOML job configs with deterministic job ids
//! - Single and parallel job execution against any candle source
//! - Versioned JSON results plus JSONL/CSV signal exports

pub mod config;
pub mod export;
pub mod runner;

pub use config::{AggregatorConfig, ConfigError, JobConfig, StrategyConfig};
pub use export::{load_result, load_signals, save_artifacts, SCHEMA_VERSION};
pub use runner::{drive, run_job, run_job_from_store, run_jobs, run_jobs_from_store, JobError, JobOutcome};
