//! Binance kline feed.
//!
//! Fetches OHLCV candles from the public `/api/v3/klines` endpoint. Handles
//! rate limiting, retries with exponential backoff, response parsing and the
//! circuit breaker.
//!
//! Rows look like `[openTime, "open", "high", "low", "close", "volume", ...]`:
//! the open time is a number of milliseconds, prices and volume are decimal
//! strings. Prices are converted to integer units with [`PRICE_SCALE`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, KlineProvider, KlineRequest};
use crate::domain::{Candle, PRICE_SCALE};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Largest `limit` the endpoint accepts.
pub const MAX_LIMIT: u32 = 1000;

/// Error body returned by the API, e.g. `{"code":-1121,"msg":"Invalid symbol."}`.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

const INVALID_SYMBOL: i64 = -1121;

/// Binance kline provider.
pub struct BinanceProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl BinanceProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("replay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Point at a different host (testnet, a mirror).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Build the klines URL for a request.
    pub fn klines_url(&self, request: &KlineRequest) -> String {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            request.symbol,
            request.interval,
            request.limit.clamp(1, MAX_LIMIT)
        );
        if let Some(start) = request.start_time {
            url.push_str(&format!("&startTime={start}"));
        }
        if let Some(end) = request.end_time {
            url.push_str(&format!("&endTime={end}"));
        }
        url
    }

    fn fetch_with_retry(&self, request: &KlineRequest) -> Result<Vec<Candle>, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let url = self.klines_url(request);
        let symbol = request.symbol.as_str();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();

            // 418: IP banned after ignoring 429s
            if status == reqwest::StatusCode::IM_A_TEAPOT
                || status == reqwest::StatusCode::FORBIDDEN
            {
                warn!(symbol, %status, "exchange blocked requests, tripping breaker");
                self.circuit_breaker.trip();
                return Err(DataError::CircuitBreakerTripped);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(symbol, retry_after, "rate limited");
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if status.is_client_error() {
                let body = resp.text().unwrap_or_default();
                return Err(classify_client_error(symbol, status.as_u16(), &body));
            }

            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }

            let rows: Vec<Vec<Value>> = resp.json().map_err(|e| {
                DataError::ResponseFormatChanged(format!(
                    "failed to parse response for {symbol}: {e}"
                ))
            })?;
            let candles = parse_klines(&rows)?;
            self.circuit_breaker.record_success();
            return Ok(candles);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl KlineProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch(&self, request: &KlineRequest) -> Result<Vec<Candle>, DataError> {
        self.fetch_with_retry(request)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

fn classify_client_error(symbol: &str, status: u16, body: &str) -> DataError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(err) if err.code == INVALID_SYMBOL => DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Ok(err) => DataError::Other(format!("HTTP {status} for {symbol}: {} ({})", err.msg, err.code)),
        Err(_) => DataError::Other(format!("HTTP {status} for {symbol}")),
    }
}

/// Convert raw kline rows to candles.
///
/// Rows with fewer than six fields are skipped. A row with a non-numeric open
/// time, or prices and volume that are not decimal strings, fails the whole
/// response.
pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>, DataError> {
    let mut candles = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        if row.len() < 6 {
            debug!(row = i, fields = row.len(), "skipping short kline row");
            continue;
        }

        let timestamp = row[0].as_u64().ok_or_else(|| DataError::MalformedRow {
            row: i,
            reason: format!("open time is not a non-negative integer: {}", row[0]),
        })?;

        let volume_str = str_field(row, i, 5, "volume")?;
        let volume = volume_str
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| DataError::MalformedRow {
                row: i,
                reason: format!("volume: invalid number {volume_str:?}"),
            })?;

        candles.push(Candle {
            timestamp,
            open: price_field(row, i, 1, "open")?,
            high: price_field(row, i, 2, "high")?,
            low: price_field(row, i, 3, "low")?,
            close: price_field(row, i, 4, "close")?,
            volume,
        });
    }

    Ok(candles)
}

fn str_field<'a>(row: &'a [Value], i: usize, idx: usize, name: &str) -> Result<&'a str, DataError> {
    row[idx].as_str().ok_or_else(|| DataError::MalformedRow {
        row: i,
        reason: format!("{name} is not a string: {}", row[idx]),
    })
}

fn price_field(row: &[Value], i: usize, idx: usize, name: &str) -> Result<u64, DataError> {
    parse_price(str_field(row, i, idx, name)?).map_err(|reason| DataError::MalformedRow {
        row: i,
        reason: format!("{name}: {reason}"),
    })
}

/// Parse a decimal price string into integer price units, rounding to nearest.
pub fn parse_price(s: &str) -> Result<u64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid number {s:?}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("price out of range: {s}"));
    }
    let scaled = (value * PRICE_SCALE as f64).round();
    if scaled >= u64::MAX as f64 {
        return Err(format!("price too large: {s}"));
    }
    Ok(scaled as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(ts: Value, o: &str, h: &str, l: &str, c: &str, v: &str) -> Vec<Value> {
        vec![
            ts,
            json!(o),
            json!(h),
            json!(l),
            json!(c),
            json!(v),
            json!(1_700_000_059_999u64),
            json!("1000.0"),
            json!(42),
        ]
    }

    #[test]
    fn parse_price_scales_and_rounds() {
        assert_eq!(parse_price("1").unwrap(), PRICE_SCALE);
        assert_eq!(parse_price("42000.12345678").unwrap(), 4_200_012_345_678);
        assert_eq!(parse_price("0.00000001").unwrap(), 1);
        assert_eq!(parse_price("0.000000006").unwrap(), 1);
        assert!(parse_price("abc").is_err());
        assert!(parse_price("-1").is_err());
        assert!(parse_price("NaN").is_err());
    }

    #[test]
    fn parses_binance_rows() {
        let rows = vec![row(
            json!(1_700_000_000_000u64),
            "37000.50000000",
            "37010.00000000",
            "36990.00000000",
            "37005.25000000",
            "12.5",
        )];
        let candles = parse_klines(&rows).unwrap();
        assert_eq!(candles.len(), 1);
        let c = candles[0];
        assert_eq!(c.timestamp, 1_700_000_000_000);
        assert_eq!(c.open, 3_700_050_000_000);
        assert_eq!(c.close, 3_700_525_000_000);
        assert_eq!(c.volume, 12.5);
        assert!(c.is_sane());
    }

    #[test]
    fn short_rows_are_skipped() {
        let rows = vec![
            vec![json!(1), json!("1")],
            row(json!(2), "1", "1", "1", "1", "1"),
        ];
        let candles = parse_klines(&rows).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 2);
    }

    #[test]
    fn wrong_types_fail_the_response() {
        let rows = vec![row(json!("1700000000000"), "1", "1", "1", "1", "1")];
        assert!(matches!(
            parse_klines(&rows),
            Err(DataError::MalformedRow { row: 0, .. })
        ));

        let mut bad = row(json!(1), "1", "1", "1", "1", "1");
        bad[4] = json!(1.0);
        assert!(matches!(
            parse_klines(&[bad]),
            Err(DataError::MalformedRow { .. })
        ));
    }

    #[test]
    fn url_includes_optional_range() {
        let provider = BinanceProvider::new(Arc::new(CircuitBreaker::for_exchange()))
            .unwrap()
            .with_base_url("http://localhost:9/");
        let req = KlineRequest::new("BTCUSDT", "1m", 5000).with_range(Some(10), None);
        assert_eq!(
            provider.klines_url(&req),
            "http://localhost:9/api/v3/klines?symbol=BTCUSDT&interval=1m&limit=1000&startTime=10"
        );
    }

    #[test]
    fn invalid_symbol_maps_to_not_found() {
        let err = classify_client_error("NOPE", 400, r#"{"code":-1121,"msg":"Invalid symbol."}"#);
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
        let err = classify_client_error("BTCUSDT", 400, "garbage");
        assert!(matches!(err, DataError::Other(_)));
    }

    #[test]
    fn open_breaker_refuses_without_network() {
        let breaker = Arc::new(CircuitBreaker::for_exchange());
        breaker.trip();
        let provider = BinanceProvider::new(breaker).unwrap();
        assert!(!provider.is_available());
        let err = provider
            .fetch(&KlineRequest::new("BTCUSDT", "1m", 10))
            .unwrap_err();
        assert!(matches!(err, DataError::CircuitBreakerTripped));
    }
}
