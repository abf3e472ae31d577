//! Backtesting engine: pushes candle batches through one strategy and one aggregator.
//!
//! For every candle, in order:
//!
//! 1. `strategy.on_candle`
//! 2. on `Decision::Emit` only: `aggregator.on_signal`
//! 3. append the signal to the history
//!
//! The engine does no I/O and never validates candle data; that is the
//! ingestion boundary's job.

pub mod backtest;
pub mod history;

pub use backtest::{BacktestEngine, Finalized};
pub use history::SignalHistory;

use thiserror::Error;

/// Engine construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid {role} name {name:?}: {reason}")]
    InvalidName {
        role: &'static str,
        name: String,
        reason: String,
    },
}
