//! Candle validation and batched delivery.
//!
//! Everything that reaches the engine passes through here: OHLCV sanity,
//! non-decreasing timestamps, then fixed-size batches into the sink.

use super::provider::{BatchSink, CandleQuery, DataError, StreamError, StreamSummary};
use crate::domain::Candle;

/// Stateful check across batches: every candle sane, timestamps never go back.
#[derive(Debug, Clone, Default)]
pub struct CandleValidator {
    last_timestamp: Option<u64>,
    seen: usize,
}

impl CandleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, candle: &Candle) -> Result<(), DataError> {
        if let Some(reason) = candle.insanity() {
            return Err(DataError::InvalidCandle {
                timestamp: candle.timestamp,
                reason,
            });
        }
        if let Some(previous) = self.last_timestamp {
            if candle.timestamp < previous {
                return Err(DataError::OutOfOrder {
                    previous,
                    current: candle.timestamp,
                });
            }
        }
        self.last_timestamp = Some(candle.timestamp);
        self.seen += 1;
        Ok(())
    }

    pub fn check_batch(&mut self, batch: &[Candle]) -> Result<(), DataError> {
        batch.iter().try_for_each(|c| self.check(c))
    }

    pub fn seen(&self) -> usize {
        self.seen
    }
}

/// Validate a complete candle series.
pub fn validate_candles(candles: &[Candle]) -> Result<(), DataError> {
    CandleValidator::new().check_batch(candles)
}

/// Sort by timestamp and drop duplicate timestamps, keeping the last occurrence.
///
/// Used when merging new candles into stored ones: later data wins.
pub fn canonicalize(mut candles: Vec<Candle>) -> Vec<Candle> {
    // Stable sort keeps arrival order among equal timestamps.
    candles.sort_by_key(|c| c.timestamp);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => out.push(candle),
        }
    }
    out
}

/// Deliver the query's slice of an ascending candle series in fixed-size batches.
///
/// Each batch is validated before the sink sees it, so an invalid candle
/// stops the stream before any batch containing it is delivered.
pub fn deliver(
    query: &CandleQuery,
    candles: &[Candle],
    batch_size: usize,
    sink: &mut BatchSink<'_>,
) -> Result<StreamSummary, StreamError> {
    query.validate()?;
    if batch_size == 0 {
        return Err(DataError::InvalidQuery("batch size must be at least 1".into()).into());
    }
    // Range selection below relies on ascending order.
    if let Some(w) = candles.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
        return Err(DataError::OutOfOrder {
            previous: w[0].timestamp,
            current: w[1].timestamp,
        }
        .into());
    }

    let start = candles.partition_point(|c| c.timestamp < query.start_time);
    let end = candles.partition_point(|c| c.timestamp <= query.end_time);
    let selected: &[Candle] = if start < end { &candles[start..end] } else { &[] };
    let (Some(first), Some(last)) = (selected.first(), selected.last()) else {
        return Err(DataError::EmptyRange {
            symbol: query.symbol.clone(),
            start_time: query.start_time,
            end_time: query.end_time,
        }
        .into());
    };

    let mut validator = CandleValidator::new();
    let mut batches = 0;
    for batch in selected.chunks(batch_size) {
        validator.check_batch(batch)?;
        sink(batch).map_err(StreamError::Sink)?;
        batches += 1;
    }

    Ok(StreamSummary {
        batches,
        candles: selected.len(),
        first_timestamp: first.timestamp,
        last_timestamp: last.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentError;

    fn candle(ts: u64, close: u64) -> Candle {
        Candle::new(ts, close, close, close, close, 1.0)
    }

    fn series(n: u64) -> Vec<Candle> {
        (0..n).map(|i| candle(i * 10, 100 + i)).collect()
    }

    #[test]
    fn validator_rejects_backwards_timestamps() {
        let mut v = CandleValidator::new();
        v.check(&candle(10, 1)).unwrap();
        v.check(&candle(10, 1)).unwrap();
        let err = v.check(&candle(5, 1)).unwrap_err();
        assert!(matches!(
            err,
            DataError::OutOfOrder {
                previous: 10,
                current: 5
            }
        ));
    }

    #[test]
    fn validator_rejects_insane_candle() {
        let bad = Candle::new(1, 10, 5, 8, 10, 1.0);
        assert!(matches!(
            validate_candles(&[bad]),
            Err(DataError::InvalidCandle { timestamp: 1, .. })
        ));
    }

    #[test]
    fn canonicalize_sorts_and_keeps_latest() {
        let out = canonicalize(vec![candle(20, 2), candle(10, 1), candle(20, 3)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, 10);
        assert_eq!(out[1].close, 3);
    }

    #[test]
    fn deliver_batches_inclusive_range() {
        let data = series(10);
        let query = CandleQuery::new("X", 20, 70);
        let mut sizes = Vec::new();
        let mut seen = Vec::new();
        let summary = deliver(&query, &data, 4, &mut |batch: &[Candle]| {
            sizes.push(batch.len());
            seen.extend(batch.iter().map(|c| c.timestamp));
            Ok(())
        })
        .unwrap();

        assert_eq!(sizes, vec![4, 2]);
        assert_eq!(seen, vec![20, 30, 40, 50, 60, 70]);
        assert_eq!(summary.candles, 6);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.first_timestamp, 20);
        assert_eq!(summary.last_timestamp, 70);
    }

    #[test]
    fn deliver_reports_empty_range() {
        let data = series(3);
        let err = deliver(&CandleQuery::new("X", 500, 600), &data, 2, &mut |_: &[Candle]| Ok(()))
            .unwrap_err();
        assert!(matches!(err, StreamError::Source(DataError::EmptyRange { .. })));
    }

    #[test]
    fn deliver_stops_before_invalid_batch() {
        let mut data = series(6);
        data[4] = Candle::new(40, 10, 5, 8, 10, 1.0);
        let mut delivered = 0;
        let err = deliver(&CandleQuery::new("X", 0, 100), &data, 2, &mut |b: &[Candle]| {
            delivered += b.len();
            Ok(())
        })
        .unwrap_err();
        assert_eq!(delivered, 4);
        assert!(matches!(err, StreamError::Source(DataError::InvalidCandle { .. })));
    }

    #[test]
    fn deliver_rejects_unsorted_series() {
        let data = vec![candle(30, 1), candle(10, 1)];
        let err = deliver(&CandleQuery::new("X", 0, 100), &data, 2, &mut |_: &[Candle]| Ok(()))
            .unwrap_err();
        assert!(matches!(err, StreamError::Source(DataError::OutOfOrder { .. })));
    }

    #[test]
    fn deliver_returns_sink_error_unchanged() {
        let data = series(6);
        let boom = ComponentError::failed("running", "boom");
        let err = deliver(&CandleQuery::new("X", 0, 100), &data, 2, &mut |_: &[Candle]| {
            Err(boom.clone())
        })
        .unwrap_err();
        match err {
            StreamError::Sink(e) => assert_eq!(e, boom),
            other => panic!("unexpected {other}"),
        }
    }
}
