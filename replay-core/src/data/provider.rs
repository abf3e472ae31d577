//! Candle source and kline provider traits, plus structured error types.
//!
//! `CandleSource` is the ingestion boundary toward the engine: it pushes
//! validated, ascending batches into a sink. `KlineProvider` is the feed side:
//! it fetches raw candles from an exchange so they can be stored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::ComponentError;
use crate::domain::{Candle, Symbol};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no candles for {symbol} in [{start_time}, {end_time}]")]
    EmptyRange {
        symbol: String,
        start_time: u64,
        end_time: u64,
    },

    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("invalid candle at {timestamp}: {reason}")]
    InvalidCandle { timestamp: u64, reason: String },

    #[error("out-of-order candle: {current} after {previous}")]
    OutOfOrder { previous: u64, current: u64 },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no stored data for symbol '{symbol}', run `replay ingest {symbol}` first")]
    NoStoredData { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Why a stream stopped early.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The source could not deliver valid data.
    #[error(transparent)]
    Source(#[from] DataError),

    /// The consumer rejected a batch. Carries its error unchanged.
    #[error("batch consumer failed: {0}")]
    Sink(#[source] ComponentError),
}

/// Inclusive time range of one symbol's candles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleQuery {
    pub symbol: Symbol,
    pub start_time: u64,
    pub end_time: u64,
}

impl CandleQuery {
    pub fn new(symbol: impl Into<Symbol>, start_time: u64, end_time: u64) -> Self {
        Self {
            symbol: symbol.into(),
            start_time,
            end_time,
        }
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        (self.start_time..=self.end_time).contains(&timestamp)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.symbol.trim().is_empty() {
            return Err(DataError::InvalidQuery("empty symbol".into()));
        }
        if self.start_time > self.end_time {
            return Err(DataError::InvalidQuery(format!(
                "start {} is after end {}",
                self.start_time, self.end_time
            )));
        }
        Ok(())
    }
}

/// End-of-stream notification: what a completed stream delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub batches: usize,
    pub candles: usize,
    pub first_timestamp: u64,
    pub last_timestamp: u64,
}

/// Consumer side of a stream: receives one batch at a time.
pub type BatchSink<'a> = dyn FnMut(&[Candle]) -> Result<(), ComponentError> + 'a;

/// Trait for candle sources (in-memory fixtures, the Parquet store, ...).
///
/// Implementations deliver the query's candles in ascending timestamp order,
/// split into batches, and return a [`StreamSummary`] once everything has been
/// delivered. Invalid data is reported as a [`DataError`], never as an empty
/// or partial batch.
pub trait CandleSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn stream(
        &self,
        query: &CandleQuery,
        sink: &mut BatchSink<'_>,
    ) -> Result<StreamSummary, StreamError>;

    /// Upper bound on how many candles `stream` would deliver, if cheaply known.
    fn len_hint(&self, _query: &CandleQuery) -> Option<usize> {
        None
    }
}

/// One kline download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    pub symbol: Symbol,
    /// Exchange interval code, e.g. "1m" or "1h".
    pub interval: String,
    pub limit: u32,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

impl KlineRequest {
    pub fn new(symbol: impl Into<Symbol>, interval: impl Into<String>, limit: u32) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            limit,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_range(mut self, start_time: Option<u64>, end_time: Option<u64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }
}

/// Trait for exchange feed providers.
///
/// Providers don't know about the store; `ingest` sits above them.
pub trait KlineProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch candles for one request, ascending by timestamp.
    fn fetch(&self, request: &KlineRequest) -> Result<Vec<Candle>, DataError>;

    /// Whether the provider is currently accepting requests.
    fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_range_is_inclusive() {
        let q = CandleQuery::new("BTCUSDT", 10, 20);
        assert!(q.contains(10));
        assert!(q.contains(20));
        assert!(!q.contains(9));
        assert!(!q.contains(21));
    }

    #[test]
    fn query_rejects_inverted_range() {
        assert!(CandleQuery::new("BTCUSDT", 20, 10).validate().is_err());
        assert!(CandleQuery::new("", 0, 10).validate().is_err());
        assert!(CandleQuery::new("BTCUSDT", 10, 10).validate().is_ok());
    }

    #[test]
    fn missing_symbol_points_at_the_ingest_command() {
        let err = DataError::NoStoredData {
            symbol: "BTCUSDT".into(),
        };
        assert!(err.to_string().contains("`replay ingest BTCUSDT`"), "{err}");
    }

    #[test]
    fn sink_error_is_kept_intact() {
        let inner = ComponentError::failed("running", "boom");
        let err = StreamError::Sink(inner.clone());
        match err {
            StreamError::Sink(e) => assert_eq!(e, inner),
            other => panic!("unexpected {other}"),
        }
    }
}
