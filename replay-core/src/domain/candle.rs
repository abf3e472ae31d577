//! Candle: the fundamental market data unit.

use serde::{Deserialize, Serialize};

/// Fixed-point scale applied to exchange prices (10^8, satoshi precision).
///
/// A price of `1.5` quote units is stored as `150_000_000`.
pub const PRICE_SCALE: u64 = 100_000_000;

/// One fixed-duration OHLCV interval for a single symbol.
///
/// Prices are integer price units (see [`PRICE_SCALE`]); `timestamp` is the
/// interval open time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: u64,
    pub open: u64,
    pub high: u64,
    pub low: u64,
    pub close: u64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: u64, open: u64, high: u64, low: u64, close: u64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// OHLCV sanity check: high >= max(open, close) >= min(open, close) >= low,
    /// and a finite, non-negative volume.
    pub fn is_sane(&self) -> bool {
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        self.high >= body_high
            && body_low >= self.low
            && self.volume.is_finite()
            && self.volume >= 0.0
    }

    /// Describe the first violated invariant, if any. Used by ingestion error messages.
    pub fn insanity(&self) -> Option<String> {
        if self.high < self.low {
            return Some(format!("high {} < low {}", self.high, self.low));
        }
        if self.high < self.open.max(self.close) {
            return Some(format!(
                "high {} below body (open {}, close {})",
                self.high, self.open, self.close
            ));
        }
        if self.low > self.open.min(self.close) {
            return Some(format!(
                "low {} above body (open {}, close {})",
                self.low, self.open, self.close
            ));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Some(format!("invalid volume {}", self.volume));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle() -> Candle {
        Candle::new(1_704_153_600_000, 100, 105, 98, 103, 50_000.0)
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
        assert!(sample_candle().insanity().is_none());
    }

    #[test]
    fn candle_detects_high_below_low() {
        let mut candle = sample_candle();
        candle.high = 97;
        assert!(!candle.is_sane());
        assert!(candle.insanity().unwrap().contains("high 97 < low 98"));
    }

    #[test]
    fn candle_detects_body_outside_range() {
        let mut candle = sample_candle();
        candle.close = 110;
        assert!(!candle.is_sane());

        let mut candle = sample_candle();
        candle.open = 90;
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_detects_bad_volume() {
        let mut candle = sample_candle();
        candle.volume = f64::NAN;
        assert!(!candle.is_sane());
        candle.volume = -1.0;
        assert!(!candle.is_sane());
    }

    #[test]
    fn doji_with_flat_range_is_sane() {
        let candle = Candle::new(0, 100, 100, 100, 100, 0.0);
        assert!(candle.is_sane());
    }
}
