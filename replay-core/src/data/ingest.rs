//! Ingestion pipeline: fetch from a feed, validate, merge into the store.

use tracing::{info, info_span, warn};

use super::provider::{DataError, KlineProvider, KlineRequest};
use super::store::{ParquetStore, StoreMeta};
use super::validate::{canonicalize, validate_candles};

/// Outcome of ingesting one symbol.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub symbol: String,
    pub fetched: usize,
    pub meta: StoreMeta,
}

/// Fetch one request's candles, validate them and merge them into the store.
///
/// Nothing is written unless every fetched candle passes validation.
pub fn ingest_symbol(
    provider: &dyn KlineProvider,
    store: &ParquetStore,
    request: &KlineRequest,
) -> Result<IngestReport, DataError> {
    let _span = info_span!("ingest", symbol = %request.symbol, provider = provider.name()).entered();

    let candles = provider.fetch(request)?;
    info!(count = candles.len(), "fetched candles");
    if candles.is_empty() {
        return Err(DataError::EmptyRange {
            symbol: request.symbol.clone(),
            start_time: request.start_time.unwrap_or(0),
            end_time: request.end_time.unwrap_or(u64::MAX),
        });
    }

    validate_candles(&candles)?;
    let candles = canonicalize(candles);
    let meta = store.write(&request.symbol, &candles, provider.name())?;

    Ok(IngestReport {
        symbol: request.symbol.clone(),
        fetched: candles.len(),
        meta,
    })
}

/// Summary of a multi-symbol ingestion.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub total: usize,
    pub reports: Vec<IngestReport>,
    pub errors: Vec<(String, DataError)>,
}

impl IngestSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.len()
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Ingest several requests in order, continuing past per-symbol failures.
///
/// Stops early once the provider stops accepting requests; the remaining
/// symbols are reported as failed.
pub fn ingest_symbols(
    provider: &dyn KlineProvider,
    store: &ParquetStore,
    requests: &[KlineRequest],
) -> IngestSummary {
    let mut summary = IngestSummary {
        total: requests.len(),
        ..Default::default()
    };

    for (i, request) in requests.iter().enumerate() {
        match ingest_symbol(provider, store, request) {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "ingest failed");
                summary.errors.push((request.symbol.clone(), e));
            }
        }

        if !provider.is_available() {
            for rest in &requests[i + 1..] {
                summary
                    .errors
                    .push((rest.symbol.clone(), DataError::CircuitBreakerTripped));
            }
            break;
        }
    }

    info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        total = summary.total,
        "ingest complete"
    );
    summary
}
