//! Diagnostic sinks.
//!
//! Pipeline components report progress and skipped payloads through a
//! [`DiagnosticSink`] handed to them by the caller instead of logging
//! directly. [`TracingSink`] forwards to `tracing`; [`RecordingSink`] keeps
//! the diagnostics in memory so tests can assert on them.

use std::sync::Mutex;

/// Severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warn,
}

/// One report from a pipeline component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// Short component tag, e.g. `"decoder"`.
    pub component: &'static str,
    pub message: String,
}

/// Receiver for pipeline diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);

    fn debug(&self, component: &'static str, message: String) {
        self.emit(Diagnostic {
            level: DiagnosticLevel::Debug,
            component,
            message,
        });
    }

    fn info(&self, component: &'static str, message: String) {
        self.emit(Diagnostic {
            level: DiagnosticLevel::Info,
            component,
            message,
        });
    }

    fn warn(&self, component: &'static str, message: String) {
        self.emit(Diagnostic {
            level: DiagnosticLevel::Warn,
            component,
            message,
        });
    }
}

/// Forwards diagnostics to the global `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, d: Diagnostic) {
        match d.level {
            DiagnosticLevel::Debug => tracing::debug!(component = d.component, "{}", d.message),
            DiagnosticLevel::Info => tracing::info!(component = d.component, "{}", d.message),
            DiagnosticLevel::Warn => tracing::warn!(component = d.component, "{}", d.message),
        }
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Diagnostics at `level` or above.
    pub fn at_least(&self, level: DiagnosticLevel) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.level >= level)
            .collect()
    }

    /// True if any diagnostic from `component` contains `needle`.
    pub fn contains(&self, component: &str, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|d| d.component == component && d.message.contains(needle))
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match self.entries.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
