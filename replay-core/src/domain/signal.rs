//! Signal: a strategy's trading decision for one candle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the strategy indicates to do on a candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Output of the strategy for one interval.
///
/// `timestamp` is always the timestamp of the candle that produced it.
/// `pnl` is the profit-and-loss attributable to this signal in price units,
/// or zero when the strategy has nothing to attribute yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: u64,
    pub action: Action,
    pub price: u64,
    pub size: f64,
    pub pnl: i64,
}

impl Signal {
    /// A signal with no attributed PnL.
    pub fn new(timestamp: u64, action: Action, price: u64, size: f64) -> Self {
        Self {
            timestamp,
            action,
            price,
            size,
            pnl: 0,
        }
    }

    pub fn with_pnl(mut self, pnl: i64) -> Self {
        self.pnl = pnl;
        self
    }
}
