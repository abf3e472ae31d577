//! The generic engine and its finalized form.

use tracing::{debug, trace, warn};

use crate::components::{name_violation, Aggregator, ComponentError, Decision, Strategy};
use crate::domain::{BacktestResult, Candle};
use crate::engine::{EngineError, SignalHistory};

/// Drives one strategy and one aggregator over candle batches.
///
/// Both component types are fixed at compile time; there is no dynamic
/// dispatch in the candle loop.
#[derive(Debug)]
pub struct BacktestEngine<S: Strategy, A: Aggregator> {
    strategy: S,
    aggregator: A,
    history: SignalHistory,
    candles_seen: u64,
    history_warn_at: Option<usize>,
    history_warned: bool,
}

impl<S: Strategy, A: Aggregator> BacktestEngine<S, A> {
    /// Bind a strategy and an aggregator.
    ///
    /// Fails if either component's name is empty or contains a delimiter.
    pub fn new(strategy: S, aggregator: A) -> Result<Self, EngineError> {
        if let Some(reason) = name_violation(strategy.name()) {
            return Err(EngineError::InvalidName {
                role: "strategy",
                name: strategy.name().to_string(),
                reason,
            });
        }
        if let Some(reason) = name_violation(aggregator.name()) {
            return Err(EngineError::InvalidName {
                role: "aggregator",
                name: aggregator.name().to_string(),
                reason,
            });
        }
        Ok(Self {
            strategy,
            aggregator,
            history: SignalHistory::new(),
            candles_seen: 0,
            history_warn_at: None,
            history_warned: false,
        })
    }

    /// Reserve history space for roughly `candles` signals.
    pub fn with_capacity_hint(mut self, candles: usize) -> Self {
        self.history.reserve(candles);
        self
    }

    /// Log a warning once the history grows past `signals` entries.
    ///
    /// Nothing is dropped; bounding the run is up to the caller.
    pub fn with_history_warning(mut self, signals: usize) -> Self {
        self.history_warn_at = Some(signals);
        self
    }

    /// Process one batch of candles in order.
    ///
    /// Returns how many signals were appended. On error the history holds
    /// every signal up to the last candle that was fully processed and the
    /// error is returned unchanged.
    pub fn run(&mut self, batch: &[Candle]) -> Result<usize, ComponentError> {
        let before = self.history.len();
        for candle in batch {
            if let Decision::Emit(signal) = self.strategy.on_candle(candle)? {
                if signal.timestamp != candle.timestamp {
                    return Err(ComponentError::failed(
                        self.strategy.name(),
                        format!(
                            "signal timestamp {} does not match candle timestamp {}",
                            signal.timestamp, candle.timestamp
                        ),
                    ));
                }
                self.aggregator.on_signal(&signal)?;
                trace!(timestamp = signal.timestamp, action = %signal.action, "signal");
                self.history.push(signal);
            }
            self.candles_seen += 1;
        }
        self.check_history_growth();

        let appended = self.history.len() - before;
        debug!(
            candles = batch.len(),
            signals = appended,
            total_signals = self.history.len(),
            "batch processed"
        );
        Ok(appended)
    }

    fn check_history_growth(&mut self) {
        if self.history_warned {
            return;
        }
        if let Some(limit) = self.history_warn_at {
            if self.history.len() > limit {
                warn!(
                    strategy = self.strategy.name(),
                    signals = self.history.len(),
                    limit,
                    "signal history exceeded soft limit"
                );
                self.history_warned = true;
            }
        }
    }

    pub fn history(&self) -> &SignalHistory {
        &self.history
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    pub fn candles_seen(&self) -> u64 {
        self.candles_seen
    }

    /// End the run. Consumes the engine, so a run is finalized exactly once.
    pub fn finalize(self) -> Finalized<S, A> {
        debug!(
            strategy = self.strategy.name(),
            candles = self.candles_seen,
            signals = self.history.len(),
            "engine finalized"
        );
        Finalized {
            strategy: self.strategy,
            aggregator: self.aggregator,
            history: self.history,
            candles_seen: self.candles_seen,
        }
    }
}

/// A finished run: the history ready for export and the aggregator ready for metrics.
#[derive(Debug)]
pub struct Finalized<S, A> {
    strategy: S,
    aggregator: A,
    history: SignalHistory,
    candles_seen: u64,
}

impl<S: Strategy, A: Aggregator> Finalized<S, A> {
    pub fn history(&self) -> &SignalHistory {
        &self.history
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    pub fn candles_seen(&self) -> u64 {
        self.candles_seen
    }

    /// Shorthand for `aggregator().output_metrics()`.
    pub fn output_metrics(&self) -> BacktestResult {
        self.aggregator.output_metrics()
    }

    pub fn into_parts(self) -> (S, A, SignalHistory) {
        (self.strategy, self.aggregator, self.history)
    }
}
