//! Artifact export: the result as versioned JSON, the signal history as JSONL and CSV.
//!
//! Persisted results carry a `schema_version`. Newer versions are rejected on
//! load; older files without the field are read as the current version.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use replay_core::domain::{BacktestResult, Signal};
use replay_core::engine::SignalHistory;

use crate::runner::JobOutcome;

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

pub const RESULT_FILE: &str = "result.json";
pub const SIGNALS_JSONL_FILE: &str = "signals.jsonl";
pub const SIGNALS_CSV_FILE: &str = "signals.csv";

#[derive(Debug, Serialize, Deserialize)]
struct ResultEnvelope {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    result: BacktestResult,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_result_json(result: &BacktestResult) -> Result<String> {
    let envelope = ResultEnvelope {
        schema_version: SCHEMA_VERSION,
        result: result.clone(),
    };
    serde_json::to_string_pretty(&envelope).context("failed to serialize BacktestResult to JSON")
}

pub fn import_result_json(json: &str) -> Result<BacktestResult> {
    let envelope: ResultEnvelope =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if envelope.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            envelope.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(envelope.result)
}

// ─── Signals ────────────────────────────────────────────────────────

/// One JSON object per line, in history order.
pub fn export_signals_jsonl(history: &SignalHistory) -> Result<String> {
    let mut buf = Vec::new();
    history
        .write_jsonl(&mut buf)
        .context("failed to write signal JSONL")?;
    String::from_utf8(buf).context("signal JSONL is not UTF-8")
}

/// Columns: timestamp, action, price, size, pnl
pub fn export_signals_csv(history: &SignalHistory) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "action", "price", "size", "pnl"])?;
    for s in history {
        wtr.write_record([
            s.timestamp.to_string(),
            s.action.to_string(),
            s.price.to_string(),
            s.size.to_string(),
            s.pnl.to_string(),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Read signals back from JSONL, skipping blank lines.
pub fn import_signals_jsonl(jsonl: &str) -> Result<Vec<Signal>> {
    jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("bad signal on line {}", i + 1))
        })
        .collect()
}

// ─── Artifact directory ─────────────────────────────────────────────

/// Write `result.json`, `signals.jsonl` and `signals.csv` under
/// `{output_dir}/{job_id}/`. Returns the job directory.
pub fn save_artifacts(outcome: &JobOutcome, output_dir: &Path) -> Result<PathBuf> {
    let dir = output_dir.join(outcome.job_id.as_str());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    std::fs::write(dir.join(RESULT_FILE), export_result_json(&outcome.result)?)
        .context("failed to write result.json")?;

    let jsonl = File::create(dir.join(SIGNALS_JSONL_FILE)).context("failed to create signals.jsonl")?;
    outcome
        .history
        .write_jsonl(BufWriter::new(jsonl))
        .context("failed to write signals.jsonl")?;

    std::fs::write(dir.join(SIGNALS_CSV_FILE), export_signals_csv(&outcome.history)?)
        .context("failed to write signals.csv")?;

    Ok(dir)
}

/// Load the result saved by [`save_artifacts`] from a job directory.
pub fn load_result(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join(RESULT_FILE);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_result_json(&json)
}

pub fn load_signals(dir: &Path) -> Result<Vec<Signal>> {
    let path = dir.join(SIGNALS_JSONL_FILE);
    let jsonl = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_signals_jsonl(&jsonl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::domain::Action;

    fn sample_result() -> BacktestResult {
        BacktestResult {
            job_id: "abc123".into(),
            strategy_id: "momentum_w2".into(),
            symbol: "BTCUSDT".into(),
            start_time: 0,
            end_time: 240_000,
            total_pnl: 5,
            sharpe_ratio: 0.3,
            max_drawdown: 5.0,
            execution_time_ms: 1,
        }
    }

    fn sample_history() -> SignalHistory {
        SignalHistory::from(vec![
            Signal::new(60_000, Action::Buy, 20, 1.0),
            Signal::new(120_000, Action::Buy, 30, 1.0).with_pnl(10),
            Signal::new(180_000, Action::Sell, 25, 1.0).with_pnl(-5),
        ])
    }

    #[test]
    fn json_roundtrip() {
        let json = export_result_json(&sample_result()).unwrap();
        assert!(json.contains("\"schema_version\": 1"));
        assert_eq!(import_result_json(&json).unwrap(), sample_result());
    }

    #[test]
    fn json_rejects_newer_version() {
        let json = export_result_json(&sample_result())
            .unwrap()
            .replace("\"schema_version\": 1", "\"schema_version\": 99");
        let err = import_result_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version 99"));
    }

    #[test]
    fn json_without_version_is_current() {
        let result = serde_json::to_string(&sample_result()).unwrap();
        let json = format!("{{\"result\": {result}}}");
        assert_eq!(import_result_json(&json).unwrap(), sample_result());
    }

    #[test]
    fn jsonl_keeps_order() {
        let jsonl = export_signals_jsonl(&sample_history()).unwrap();
        assert_eq!(jsonl.lines().count(), 3);
        let back = import_signals_jsonl(&jsonl).unwrap();
        assert_eq!(back, sample_history().into_vec());
    }

    #[test]
    fn csv_has_header_and_rows() {
        let csv = export_signals_csv(&sample_history()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,action,price,size,pnl");
        assert_eq!(lines[1], "60000,BUY,20,1,0");
        assert_eq!(lines[3], "180000,SELL,25,1,-5");
    }

    #[test]
    fn csv_empty_history_is_header_only() {
        let csv = export_signals_csv(&SignalHistory::new()).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }
}
