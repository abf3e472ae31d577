//! Job runner: wires a candle source, the engine and its components together.
//!
//! Two entry points:
//! - `run_job()`: one job against any `CandleSource`. Used by the CLI and tests.
//! - `run_jobs()`: many independent jobs in parallel against a shared source.
//!
//! A failed job yields an error and no result. Nothing partial leaks out.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use replay_core::components::{Aggregator, ComponentError, Strategy};
use replay_core::data::{CandleQuery, CandleSource, DataError, ParquetStore, StreamError, StreamSummary};
use replay_core::domain::{BacktestResult, Candle, JobId};
use replay_core::engine::{BacktestEngine, EngineError, Finalized, SignalHistory};
use replay_core::{MomentumStrategy, RunningAggregator};

use crate::config::{AggregatorConfig, ConfigError, JobConfig, StrategyConfig};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("component error: {0}")]
    Component(#[from] ComponentError),
}

impl From<StreamError> for JobError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Source(e) => JobError::Data(e),
            StreamError::Sink(e) => JobError::Component(e),
        }
    }
}

/// Everything a successful job produced.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub result: BacktestResult,
    pub history: SignalHistory,
    pub stream: StreamSummary,
    pub candles_seen: u64,
}

/// Run one job against `source`.
pub fn run_job(config: &JobConfig, source: &dyn CandleSource) -> Result<JobOutcome, JobError> {
    config.validate()?;
    let job_id = config.job_id();
    let span = info_span!("job", job_id = %job_id, symbol = %config.job.symbol);
    let _guard = span.enter();

    let query = config.query();
    match (&config.strategy, &config.aggregator) {
        (StrategyConfig::Momentum { window, size }, AggregatorConfig::Running) => {
            let strategy = MomentumStrategy::new(*window).with_size(*size);
            let aggregator = RunningAggregator::new(config.context(), strategy.name());
            let mut engine = BacktestEngine::new(strategy, aggregator)?;
            if let Some(hint) = source.len_hint(&query) {
                engine = engine.with_capacity_hint(hint);
            }
            if let Some(threshold) = config.output.history_warn_threshold {
                engine = engine.with_history_warning(threshold);
            }
            let (finalized, stream) = drive(engine, source, &query)?;
            Ok(outcome(job_id, finalized, stream))
        }
    }
}

/// Stream `query` from `source` through `engine` and seal it.
///
/// Any strategy/aggregator pair works here; `run_job` picks the concrete pair
/// from the config.
pub fn drive<S: Strategy, A: Aggregator>(
    mut engine: BacktestEngine<S, A>,
    source: &dyn CandleSource,
    query: &CandleQuery,
) -> Result<(Finalized<S, A>, StreamSummary), JobError> {
    info!(
        source = source.name(),
        strategy = engine.strategy().name(),
        aggregator = engine.aggregator().name(),
        start = query.start_time,
        end = query.end_time,
        "starting job"
    );

    let stream = source.stream(query, &mut |batch: &[Candle]| engine.run(batch).map(|_| ()));
    let stream = match stream {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, candles = engine.candles_seen(), "job failed");
            return Err(e.into());
        }
    };

    let finalized = engine.finalize();
    debug!(
        batches = stream.batches,
        candles = stream.candles,
        signals = finalized.history().len(),
        "stream complete"
    );
    Ok((finalized, stream))
}

fn outcome<S: Strategy, A: Aggregator>(
    job_id: JobId,
    finalized: Finalized<S, A>,
    stream: StreamSummary,
) -> JobOutcome {
    let result = finalized.output_metrics();
    let candles_seen = finalized.candles_seen();
    info!(
        total_pnl = result.total_pnl,
        sharpe = result.sharpe_ratio,
        max_drawdown = result.max_drawdown,
        execution_time_ms = result.execution_time_ms,
        candles = candles_seen,
        "job finished"
    );
    let (_, _, history) = finalized.into_parts();
    JobOutcome {
        job_id,
        result,
        history,
        stream,
        candles_seen,
    }
}

/// Run one job against the Parquet store named in its config.
pub fn run_job_from_store(config: &JobConfig) -> Result<JobOutcome, JobError> {
    config.validate()?;
    let store = ParquetStore::new(config.data.store_dir.clone()).with_batch_size(config.data.batch_size);
    run_job(config, &store)
}

/// Run independent jobs in parallel. Results come back in input order.
///
/// Each job owns its own engine and components; only the source is shared.
pub fn run_jobs(configs: &[JobConfig], source: &dyn CandleSource) -> Vec<Result<JobOutcome, JobError>> {
    info!(jobs = configs.len(), source = source.name(), "running jobs");
    configs.par_iter().map(|config| run_job(config, source)).collect()
}

/// Run independent jobs in parallel, each against the store its config names.
pub fn run_jobs_from_store(configs: &[JobConfig]) -> Vec<Result<JobOutcome, JobError>> {
    info!(jobs = configs.len(), "running jobs from store");
    configs.par_iter().map(run_job_from_store).collect()
}
