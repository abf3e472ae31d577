//! Replay Core: domain types, component contracts, engine, data boundary.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (candles, signals, results, job ids)
//! - Strategy and aggregator contracts, plus a momentum strategy and a
//!   running-metrics aggregator
//! - The generic, single-threaded, push-driven backtest engine
//! - Candle sources (Parquet store, in-memory) and the Binance ingestion path

pub mod components;
pub mod data;
pub mod domain;
pub mod engine;

pub use components::{Aggregator, ComponentError, Decision, MomentumStrategy, RunningAggregator, Strategy};
pub use domain::{Action, BacktestResult, Candle, JobContext, JobId, Signal};
pub use engine::{BacktestEngine, EngineError, Finalized, SignalHistory};
