//! Warning diagnostics collected during conversion.
//!
//! Fatal conditions are [`crate::error::Error`] values and abort the
//! pipeline. Everything here is recoverable: the affected node degrades to
//! a placeholder and conversion continues. Warnings are accumulated in
//! order and attached to the finished IR so the caller can surface them as
//! a summary rather than interleaving them into output.

use std::fmt;

use crate::origin::Origin;

/// Diagnostic severity. Fatal diagnostics only appear when a pipeline
/// error is converted for reporting; the sink itself accumulates warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

/// What went wrong, for programmatic filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagKind {
    UnresolvedReference,
    DuplicateCitationKey,
    MissingInclude,
    ImageNotFound,
    DiagramRenderFailed,
    RendererUnavailable,
}

impl fmt::Display for DiagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagKind::UnresolvedReference => "unresolved-reference",
            DiagKind::DuplicateCitationKey => "duplicate-citation-key",
            DiagKind::MissingInclude => "missing-include",
            DiagKind::ImageNotFound => "image-not-found",
            DiagKind::DiagramRenderFailed => "diagram-render-failed",
            DiagKind::RendererUnavailable => "renderer-unavailable",
        };
        f.write_str(s)
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
    pub message: String,
    pub origin: Origin,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Fatal => "error",
            Severity::Warning => "warning",
        };
        if self.origin.line == 0 {
            write!(f, "{sev}[{}]: {}", self.kind, self.message)
        } else {
            write!(f, "{sev}[{}]: {}: {}", self.kind, self.origin, self.message)
        }
    }
}

/// Ordered warning sink, threaded through the pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning. Also emits it on the `tracing` channel.
    pub fn warn(&mut self, kind: DiagKind, origin: Origin, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(kind = %kind, origin = %origin, "{message}");
        self.records.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            message,
            origin,
        });
    }

    /// Append another sink's records, preserving order.
    pub fn merge(&mut self, other: Diagnostics) {
        self.records.extend(other.records);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count of warnings of a given kind.
    pub fn count(&self, kind: DiagKind) -> usize {
        self.records.iter().filter(|d| d.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_accumulate_in_order() {
        let mut diags = Diagnostics::new();
        diags.warn(DiagKind::UnresolvedReference, Origin::unknown(), "ref a");
        diags.warn(DiagKind::DuplicateCitationKey, Origin::unknown(), "key b");
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.count(DiagKind::UnresolvedReference), 1);
        let kinds: Vec<_> = diags.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagKind::UnresolvedReference, DiagKind::DuplicateCitationKey]
        );
    }
}
