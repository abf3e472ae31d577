//! BacktestResult: the terminal summary for one job.

use serde::{Deserialize, Serialize};

/// End-of-job highlights for one (symbol, strategy, time range) execution unit.
///
/// Field order and types are the wire contract toward downstream reporting;
/// serde serializes fields in declaration order, so do not reorder them.
///
/// `max_drawdown` is an absolute, non-negative amount in price units: the
/// largest drop of the cumulative-PnL curve below its running peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub job_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub start_time: u64,
    pub end_time: u64,
    pub total_pnl: i64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub execution_time_ms: u64,
}
