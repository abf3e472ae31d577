//! Data boundary: candle sources for the engine and the ingestion pipeline feeding them.
//!
//! Read path: `CandleSource::stream` (Parquet store or in-memory) delivers
//! validated ascending batches to a sink.
//! Write path: `KlineProvider` (Binance) → validate → `ParquetStore::write`.

pub mod binance;
pub mod circuit_breaker;
pub mod ingest;
pub mod memory;
pub mod provider;
pub mod store;
pub mod validate;

pub use binance::BinanceProvider;
pub use circuit_breaker::CircuitBreaker;
pub use ingest::{ingest_symbol, ingest_symbols, IngestReport, IngestSummary};
pub use memory::MemorySource;
pub use provider::{
    BatchSink, CandleQuery, CandleSource, DataError, KlineProvider, KlineRequest, StreamError,
    StreamSummary,
};
pub use store::{ParquetStore, StoreMeta, StoreStatus};
pub use validate::{canonicalize, validate_candles, CandleValidator};
