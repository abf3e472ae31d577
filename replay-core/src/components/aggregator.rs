//! Aggregator: folds a signal stream into end-of-job metrics.
//!
//! Aggregators see every emitted signal exactly once, in emission order, and
//! must not retain the signals themselves: per-call work is O(1).

pub mod running;

pub use running::RunningAggregator;

use super::ComponentError;
use crate::domain::{BacktestResult, Signal};

/// Trait for streaming metric aggregators.
///
/// # Contract
/// `output_metrics` is a pure read: calling it twice without an intervening
/// `on_signal` yields equal results, and it is well defined before any signal
/// has been seen. `name` follows the same rules as [`Strategy::name`](super::Strategy::name).
pub trait Aggregator: Send {
    /// Stable identifier (e.g., "running").
    fn name(&self) -> &str;

    /// Fold one signal into the running metrics.
    fn on_signal(&mut self, signal: &Signal) -> Result<(), ComponentError>;

    /// Snapshot of the metrics accumulated so far.
    fn output_metrics(&self) -> BacktestResult;
}
