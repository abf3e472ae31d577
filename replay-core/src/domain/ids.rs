use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic job ID (hash of symbol + time range + component names)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// Derive the id of a job from its definition.
    ///
    /// Uses BLAKE3 over a canonical JSON rendering so the id is stable across
    /// builds and platforms: the same job definition always gets the same id.
    pub fn derive(
        symbol: &str,
        start_time: u64,
        end_time: u64,
        strategy: &str,
        aggregator: &str,
    ) -> Self {
        use serde_json::json;

        let canonical = json!({
            "aggregator": aggregator,
            "end_time": end_time,
            "start_time": start_time,
            "strategy": strategy,
            "symbol": symbol,
        });
        let hash = blake3::hash(canonical.to_string().as_bytes());
        // 16 hex chars is plenty to tell jobs apart and keeps paths/log lines short
        Self(hash.to_hex()[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an aggregator needs to label its result: which job, which symbol, which range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: JobId,
    pub symbol: String,
    pub start_time: u64,
    pub end_time: u64,
}

impl JobContext {
    pub fn new(job_id: JobId, symbol: impl Into<String>, start_time: u64, end_time: u64) -> Self {
        Self {
            job_id,
            symbol: symbol.into(),
            start_time,
            end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_deterministic() {
        let a = JobId::derive("BTCUSDT", 0, 1_000, "momentum_w5", "running");
        let b = JobId::derive("BTCUSDT", 0, 1_000, "momentum_w5", "running");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_job_id_changes_with_definition() {
        let base = JobId::derive("BTCUSDT", 0, 1_000, "momentum_w5", "running");
        assert_ne!(base, JobId::derive("ETHUSDT", 0, 1_000, "momentum_w5", "running"));
        assert_ne!(base, JobId::derive("BTCUSDT", 0, 1_001, "momentum_w5", "running"));
        assert_ne!(base, JobId::derive("BTCUSDT", 0, 1_000, "momentum_w6", "running"));
    }
}
