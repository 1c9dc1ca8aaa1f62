//! Non-fatal diagnostics channel.
//!
//! Preview evaluates the same scripts every tick, so the sink deduplicates on
//! `(severity, location, message)` and only logs the first occurrence.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational note (e.g. non-converged globals).
    Info,
    /// A recovered fault: default substituted or script omitted.
    Warning,
    /// A fault that changed the output in a user-visible way.
    Error,
    /// A card was refused entirely.
    Fatal,
}

/// Where a diagnostic originated inside the document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceLocation {
    /// Dotted document path, e.g. `cards[0].nested[1].actions[2]`.
    pub path: String,
    /// Byte offset into the script source, when known.
    pub offset: Option<usize>,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    /// Append a path segment (`.name` or `[i]` style is up to the caller).
    pub fn child(&self, segment: &str) -> Self {
        let path = if segment.starts_with('[') || self.path.is_empty() {
            format!("{}{segment}", self.path)
        } else {
            format!("{}.{segment}", self.path)
        };
        Self { path, offset: None }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(o) => write!(f, "{}@{o}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.severity, self.location, self.message)
    }
}

/// Ordered, deduplicating diagnostic sink.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    seen: BTreeSet<Diagnostic>,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, location: SourceLocation, message: impl Into<String>) {
        let d = Diagnostic {
            severity,
            message: message.into(),
            location,
        };
        if self.seen.contains(&d) {
            return;
        }
        match severity {
            Severity::Info => tracing::debug!(location = %d.location, "{}", d.message),
            _ => tracing::warn!(location = %d.location, ?severity, "{}", d.message),
        }
        self.seen.insert(d.clone());
        self.items.push(d);
    }

    pub fn warn(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Severity::Warning, location, message);
    }

    pub fn fatal(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Severity::Fatal, location, message);
    }

    /// Diagnostics in first-seen order.
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for d in other.items {
            self.push(d.severity, d.location, d.message);
        }
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.items.clear();
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/diagnostics.rs"]
mod tests;
