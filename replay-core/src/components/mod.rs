//! Component contracts: the two pluggable halves of a backtest.
//!
//! Every engine binds exactly two components:
//! - Strategy: consumes candles in order, decides when to emit a signal
//! - Aggregator: consumes signals in order, folds them into a `BacktestResult`
//!
//! Both report failures through [`ComponentError`] so the engine can hand them
//! to its caller unchanged.

pub mod aggregator;
pub mod strategy;

pub use aggregator::{Aggregator, RunningAggregator};
pub use strategy::{Decision, MomentumStrategy, Strategy};

use thiserror::Error;

/// Characters a component name may not contain.
///
/// Names end up in CSV columns, JSON Lines, log fields and artifact paths.
pub const NAME_DELIMITERS: &[char] = &[',', ';', '|', '"', '\t', '\n', '\r'];

/// Failure raised by a strategy or aggregator while processing one input.
///
/// Always labeled with the component that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentError {
    #[error("{component}: arithmetic overflow while {context}")]
    Overflow { component: String, context: String },

    #[error("{component}: inconsistent candle at {timestamp}: {reason}")]
    InconsistentCandle {
        component: String,
        timestamp: u64,
        reason: String,
    },

    #[error("{component}: {message}")]
    Failed { component: String, message: String },
}

impl ComponentError {
    pub fn overflow(component: &str, context: impl Into<String>) -> Self {
        Self::Overflow {
            component: component.to_string(),
            context: context.into(),
        }
    }

    pub fn failed(component: &str, message: impl Into<String>) -> Self {
        Self::Failed {
            component: component.to_string(),
            message: message.into(),
        }
    }

    /// Name of the component that raised the error.
    pub fn component(&self) -> &str {
        match self {
            Self::Overflow { component, .. }
            | Self::InconsistentCandle { component, .. }
            | Self::Failed { component, .. } => component,
        }
    }
}

/// Check a component name against the naming contract.
///
/// Returns the reason the name is rejected, or `None` if it is usable.
pub fn name_violation(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return Some("name is empty".to_string());
    }
    name.chars()
        .find(|c| NAME_DELIMITERS.contains(c))
        .map(|c| format!("name contains delimiter {c:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert_eq!(name_violation("momentum_w5"), None);
        assert_eq!(name_violation("running"), None);
    }

    #[test]
    fn rejects_empty_and_delimited_names() {
        assert!(name_violation("").is_some());
        assert!(name_violation("   ").is_some());
        for bad in ["a,b", "a;b", "a|b", "a\"b", "a\tb", "a\nb"] {
            assert!(name_violation(bad).is_some(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn error_carries_component_label() {
        let err = ComponentError::overflow("momentum_w3", "marking position");
        assert_eq!(err.component(), "momentum_w3");
        assert_eq!(
            err.to_string(),
            "momentum_w3: arithmetic overflow while marking position"
        );
    }
}
