//! Append-only signal history.

use std::io::Write;

use serde::Serialize;

use crate::domain::Signal;

/// Every signal an engine emitted, in emission order.
///
/// Only the engine appends; everyone else gets a read-only view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SignalHistory {
    signals: Vec<Signal>,
}

impl SignalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            signals: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.signals.reserve(additional);
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn as_slice(&self) -> &[Signal] {
        &self.signals
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Signal> {
        self.signals.iter()
    }

    pub fn last(&self) -> Option<&Signal> {
        self.signals.last()
    }

    pub fn into_vec(self) -> Vec<Signal> {
        self.signals
    }

    /// Write the history as JSON Lines, one signal per line.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for signal in &self.signals {
            serde_json::to_writer(&mut writer, signal)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}

/// Rebuild a history from signals read back from an export.
impl From<Vec<Signal>> for SignalHistory {
    fn from(signals: Vec<Signal>) -> Self {
        Self { signals }
    }
}

impl<'a> IntoIterator for &'a SignalHistory {
    type Item = &'a Signal;
    type IntoIter = std::slice::Iter<'a, Signal>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.iter()
    }
}
