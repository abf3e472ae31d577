//! Strategy: turns a candle stream into trading decisions.
//!
//! Strategies are stateful: the engine calls `on_candle` once per candle in
//! arrival order and never reorders or replays input.

pub mod momentum;

pub use momentum::MomentumStrategy;

use super::ComponentError;
use crate::domain::{Candle, Signal};

/// Outcome of feeding one candle to a strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Not enough history yet, or nothing to say for this candle.
    Pending,
    /// A signal for this candle. Its timestamp must equal the candle's.
    Emit(Signal),
}

impl Decision {
    pub fn is_pending(&self) -> bool {
        matches!(self, Decision::Pending)
    }

    pub fn signal(self) -> Option<Signal> {
        match self {
            Decision::Pending => None,
            Decision::Emit(signal) => Some(signal),
        }
    }
}

/// Trait for candle-driven strategies.
///
/// # Contract
/// `name` must be constant for the lifetime of the instance, identical for
/// identically configured instances, and free of the characters in
/// [`NAME_DELIMITERS`](super::NAME_DELIMITERS). The engine rejects violations
/// at construction.
pub trait Strategy: Send {
    /// Stable identifier (e.g., "momentum_w5").
    fn name(&self) -> &str;

    /// Process the next candle.
    ///
    /// Returns `Decision::Pending` during warm-up. An error aborts the batch
    /// and is returned to the engine's caller unchanged.
    fn on_candle(&mut self, candle: &Candle) -> Result<Decision, ComponentError>;
}
