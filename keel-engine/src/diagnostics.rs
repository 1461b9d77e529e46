//! Diagnostics returned alongside every verb result.

use serde::Serialize;

use crate::error::{RemoteEffect, VerbError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A single (severity, summary, detail) entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

/// Ordered list of diagnostics for one verb invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    pub fn add_warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    /// Record a failed verb. The summary states whether the remote side may
    /// have been changed, so callers never mistake an unconfirmed mutation
    /// for a no-op.
    pub fn add_verb_error(&mut self, context: &str, err: &VerbError) {
        let summary = match err.remote {
            RemoteEffect::None => format!("{}: {}", context, err.error.category()),
            RemoteEffect::Unresolved => format!(
                "{}: {} (remote change issued, outcome unconfirmed)",
                context,
                err.error.category()
            ),
        };
        let detail = match &err.identity {
            Some(identity) => format!("{}\nRemote identity: {}", err.error, identity),
            None => err.error.to_string(),
        };
        self.add_error(summary, detail);
    }

    pub fn has_error(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
