//! Job configuration, loaded from TOML.
//!
//! ```toml
//! [job]
//! symbol = "BTCUSDT"
//! start_time = 1704067200000   # ms since epoch, inclusive
//! end_time = 1706745599999     # inclusive
//!
//! [strategy]
//! type = "momentum"
//! window = 20
//!
//! [aggregator]
//! type = "running"
//!
//! [data]
//! store_dir = "data"
//! batch_size = 10000
//!
//! [output]
//! dir = "results"
//! ```

use std::path::{Path, PathBuf};

use replay_core::components::{name_violation, MomentumStrategy};
use replay_core::data::CandleQuery;
use replay_core::domain::{JobContext, JobId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid job config: {0}")]
    Invalid(String),
}

/// Everything needed to reproduce one backtest job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub job: JobSection,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSection {
    pub symbol: String,
    pub start_time: u64,
    pub end_time: u64,
}

/// Strategy selection (serializable enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Close versus its W-candle SMA.
    Momentum {
        window: usize,
        #[serde(default = "default_size")]
        size: f64,
    },
}

fn default_size() -> f64 {
    1.0
}

/// Aggregator selection (serializable enum).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregatorConfig {
    /// PnL, Sharpe and drawdown in constant memory.
    #[default]
    Running,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_batch_size() -> usize {
    replay_core::data::store::DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Artifact directory; nothing is written when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Log a warning once a job's signal history grows past this many entries.
    #[serde(default)]
    pub history_warn_threshold: Option<usize>,
}

impl JobConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: JobConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("serialize job: {e}")))
    }

    /// A momentum job with default aggregator, data and output settings.
    pub fn momentum(symbol: impl Into<String>, start_time: u64, end_time: u64, window: usize) -> Self {
        Self {
            job: JobSection {
                symbol: symbol.into(),
                start_time,
                end_time,
            },
            strategy: StrategyConfig::Momentum {
                window,
                size: default_size(),
            },
            aggregator: AggregatorConfig::default(),
            data: DataConfig::default(),
            output: OutputConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(reason) = name_violation(&self.job.symbol) {
            return Err(ConfigError::Invalid(format!("symbol: {reason}")));
        }
        if self.job.start_time > self.job.end_time {
            return Err(ConfigError::Invalid(format!(
                "start_time {} is after end_time {}",
                self.job.start_time, self.job.end_time
            )));
        }
        match self.strategy {
            StrategyConfig::Momentum { window, size } => {
                if window == 0 {
                    return Err(ConfigError::Invalid("momentum window must be at least 1".into()));
                }
                if !size.is_finite() || size <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "momentum size must be finite and positive, got {size}"
                    )));
                }
            }
        }
        if self.data.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Name the configured strategy will report.
    pub fn strategy_name(&self) -> String {
        match self.strategy {
            StrategyConfig::Momentum { window, .. } => MomentumStrategy::name_for(window),
        }
    }

    pub fn aggregator_name(&self) -> &'static str {
        match self.aggregator {
            AggregatorConfig::Running => "running",
        }
    }

    /// Deterministic id: same definition, same id.
    pub fn job_id(&self) -> JobId {
        JobId::derive(
            &self.job.symbol,
            self.job.start_time,
            self.job.end_time,
            &self.strategy_name(),
            self.aggregator_name(),
        )
    }

    pub fn context(&self) -> JobContext {
        JobContext::new(
            self.job_id(),
            self.job.symbol.clone(),
            self.job.start_time,
            self.job.end_time,
        )
    }

    pub fn query(&self) -> CandleQuery {
        CandleQuery::new(self.job.symbol.clone(), self.job.start_time, self.job.end_time)
    }
}
