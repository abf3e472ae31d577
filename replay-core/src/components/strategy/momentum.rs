//! Momentum strategy: close versus its simple moving average.
//!
//! Close above the W-candle SMA is a buy, below is a sell, equal is a hold.
//! The strategy is long-only and marks its position to market on every
//! decision, so each signal carries the PnL earned since the previous one.

use std::collections::VecDeque;

use crate::components::strategy::{Decision, Strategy};
use crate::components::ComponentError;
use crate::domain::{Action, Candle, Signal};

/// Sliding-window momentum strategy.
///
/// The window keeps the last W closes and a running sum, so each candle costs
/// one push, at most one eviction and one sum adjustment. The SMA is the sum
/// divided by W with truncating integer division.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    window: usize,
    size: f64,
    closes: VecDeque<u64>,
    sum: u128,
    long: bool,
    last_close: Option<u64>,
    name: String,
}

impl MomentumStrategy {
    /// Create a strategy with the given window and a position size of one unit.
    pub fn new(window: usize) -> Self {
        assert!(window >= 1, "window must be at least 1");
        Self {
            window,
            size: 1.0,
            closes: VecDeque::with_capacity(window + 1),
            sum: 0,
            long: false,
            last_close: None,
            name: Self::name_for(window),
        }
    }

    /// The name an instance with this window reports.
    pub fn name_for(window: usize) -> String {
        format!("momentum_w{window}")
    }

    /// Position size carried on every signal and used for marking.
    pub fn with_size(mut self, size: f64) -> Self {
        assert!(
            size.is_finite() && size > 0.0,
            "size must be finite and positive"
        );
        self.size = size;
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// Whether the strategy currently holds a long position.
    pub fn is_long(&self) -> bool {
        self.long
    }

    /// Current SMA, once the window has filled.
    pub fn sma(&self) -> Option<u64> {
        if self.closes.len() < self.window {
            return None;
        }
        // The mean of u64 values always fits back into u64.
        Some((self.sum / self.window as u128) as u64)
    }

    fn push_close(&mut self, close: u64) {
        self.closes.push_back(close);
        self.sum += u128::from(close);
        if self.closes.len() > self.window {
            if let Some(evicted) = self.closes.pop_front() {
                self.sum -= u128::from(evicted);
            }
        }
    }

    /// PnL of the position held since the previous decision.
    fn mark_to_market(&self, close: u64) -> Result<i64, ComponentError> {
        let last = match self.last_close {
            Some(last) if self.long => last,
            _ => return Ok(0),
        };
        let delta = i128::from(close) - i128::from(last);
        let pnl = (delta as f64 * self.size).round();
        if !pnl.is_finite() || pnl < i64::MIN as f64 || pnl >= i64::MAX as f64 {
            return Err(ComponentError::overflow(
                &self.name,
                format!("marking {} units from {last} to {close}", self.size),
            ));
        }
        Ok(pnl as i64)
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_candle(&mut self, candle: &Candle) -> Result<Decision, ComponentError> {
        self.push_close(candle.close);
        let Some(sma) = self.sma() else {
            return Ok(Decision::Pending);
        };

        let action = match candle.close.cmp(&sma) {
            std::cmp::Ordering::Greater => Action::Buy,
            std::cmp::Ordering::Less => Action::Sell,
            std::cmp::Ordering::Equal => Action::Hold,
        };
        let pnl = self.mark_to_market(candle.close)?;

        match action {
            Action::Buy => self.long = true,
            Action::Sell => self.long = false,
            Action::Hold => {}
        }
        self.last_close = Some(candle.close);

        Ok(Decision::Emit(
            Signal::new(candle.timestamp, action, candle.close, self.size).with_pnl(pnl),
        ))
    }
}
