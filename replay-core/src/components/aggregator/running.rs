//! Running aggregator: constant-memory PnL, Sharpe and drawdown.

use std::time::Instant;

use crate::components::aggregator::Aggregator;
use crate::components::ComponentError;
use crate::domain::{BacktestResult, JobContext, Signal};

const NAME: &str = "running";

/// Streaming aggregator over per-signal PnL.
///
/// - total PnL: checked sum of `signal.pnl`
/// - Sharpe: mean / sample std of per-signal PnL (Welford), not annualized;
///   0.0 with fewer than two signals or zero variance
/// - max drawdown: largest drop of the cumulative-PnL curve below its running
///   peak, starting from 0, in price units
/// - execution time: wall clock from construction to the latest signal
#[derive(Debug, Clone)]
pub struct RunningAggregator {
    context: JobContext,
    strategy_id: String,
    started: Instant,
    elapsed_ms: u64,
    count: u64,
    total_pnl: i64,
    mean: f64,
    m2: f64,
    peak: i64,
    max_drawdown: f64,
}

impl RunningAggregator {
    pub fn new(context: JobContext, strategy_id: impl Into<String>) -> Self {
        Self {
            context,
            strategy_id: strategy_id.into(),
            started: Instant::now(),
            elapsed_ms: 0,
            count: 0,
            total_pnl: 0,
            mean: 0.0,
            m2: 0.0,
            peak: 0,
            max_drawdown: 0.0,
        }
    }

    pub fn signal_count(&self) -> u64 {
        self.count
    }

    pub fn total_pnl(&self) -> i64 {
        self.total_pnl
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    fn sharpe(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let variance = self.m2 / (self.count - 1) as f64;
        let std = variance.sqrt();
        if !std.is_finite() || std < 1e-15 {
            return 0.0;
        }
        self.mean / std
    }
}

impl Aggregator for RunningAggregator {
    fn name(&self) -> &str {
        NAME
    }

    fn on_signal(&mut self, signal: &Signal) -> Result<(), ComponentError> {
        let total = self.total_pnl.checked_add(signal.pnl).ok_or_else(|| {
            ComponentError::overflow(
                NAME,
                format!("adding pnl {} at {}", signal.pnl, signal.timestamp),
            )
        })?;

        self.total_pnl = total;
        self.count += 1;

        let x = signal.pnl as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);

        if total > self.peak {
            self.peak = total;
        }
        let drawdown = (i128::from(self.peak) - i128::from(total)) as f64;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }

        self.elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(())
    }

    fn output_metrics(&self) -> BacktestResult {
        BacktestResult {
            job_id: self.context.job_id.to_string(),
            strategy_id: self.strategy_id.clone(),
            symbol: self.context.symbol.clone(),
            start_time: self.context.start_time,
            end_time: self.context.end_time,
            total_pnl: self.total_pnl,
            sharpe_ratio: self.sharpe(),
            max_drawdown: self.max_drawdown,
            execution_time_ms: self.elapsed_ms,
        }
    }
}
