//! In-memory candle source, for fixtures, tests and benchmarks.

use std::collections::HashMap;

use super::provider::{BatchSink, CandleQuery, CandleSource, DataError, StreamError, StreamSummary};
use super::validate::deliver;
use crate::domain::Candle;

/// Serves fixed candle vectors, one per symbol.
///
/// Candles are stored as given; ordering problems surface when streamed.
#[derive(Debug, Clone)]
pub struct MemorySource {
    series: HashMap<String, Vec<Candle>>,
    batch_size: usize,
}

impl MemorySource {
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size >= 1, "batch size must be at least 1");
        Self {
            series: HashMap::new(),
            batch_size,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.insert(symbol, candles);
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, candles: Vec<Candle>) {
        self.series.insert(symbol.into(), candles);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl CandleSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn stream(
        &self,
        query: &CandleQuery,
        sink: &mut BatchSink<'_>,
    ) -> Result<StreamSummary, StreamError> {
        let candles = self
            .series
            .get(&query.symbol)
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: query.symbol.clone(),
            })?;
        deliver(query, candles, self.batch_size, sink)
    }

    fn len_hint(&self, query: &CandleQuery) -> Option<usize> {
        self.series
            .get(&query.symbol)
            .map(|candles| candles.iter().filter(|c| query.contains(c.timestamp)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<Candle> {
        (0..5u64)
            .map(|i| Candle::new(i * 1_000, 10, 10, 10, 10, 1.0))
            .collect()
    }

    #[test]
    fn streams_in_configured_batches() {
        let source = MemorySource::new(2).with_symbol("BTCUSDT", series());
        let mut batches = Vec::new();
        let summary = source
            .stream(&CandleQuery::new("BTCUSDT", 0, 10_000), &mut |b: &[Candle]| {
                batches.push(b.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(batches, vec![2, 2, 1]);
        assert_eq!(summary.candles, 5);
        assert_eq!(
            source.len_hint(&CandleQuery::new("BTCUSDT", 1_000, 2_000)),
            Some(2)
        );
    }

    #[test]
    fn unknown_symbol_is_reported() {
        let source = MemorySource::new(2).with_symbol("BTCUSDT", series());
        let err = source
            .stream(&CandleQuery::new("ETHUSDT", 0, 10_000), &mut |_: &[Candle]| Ok(()))
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::Source(DataError::SymbolNotFound { .. })
        ));
    }
}
