use crate::span::Span;
use std::{
  collections::HashSet,
  fmt::{self, Display},
};

/// Which pipeline stage produced a diagnostic. Used both for display and
/// as part of the dedup key (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
  Lexer,
  Grammar,
  Parser,
}

impl Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Lexer => write!(f, "lexer"),
      Stage::Grammar => write!(f, "grammar"),
      Stage::Parser => write!(f, "parser"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
  Info,
  Warning,
  Error,
}

impl Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Severity::Info => write!(f, "info"),
      Severity::Warning => write!(f, "warning"),
      Severity::Error => write!(f, "error"),
    }
  }
}

/// A single user-facing diagnostic. Every diagnostic produced by the core
/// carries enough to dedup on `(stage, severity, message, span)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
  pub stage:    Stage,
  pub severity: Severity,
  pub message:  String,
  pub span:     Span,
  /// A short suggestion list attached to some lexer diagnostics (e.g.
  /// "did you mean an identifier?"); empty for most diagnostics.
  pub suggestions: Vec<String>,
}

impl Diagnostic {
  pub fn new(stage: Stage, severity: Severity, message: impl Into<String>, span: Span) -> Self {
    Self { stage, severity, message: message.into(), span, suggestions: Vec::new() }
  }

  pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
    self.suggestions = suggestions;
    self
  }

  fn dedup_key(&self) -> (Stage, Severity, &str, Span) {
    (self.stage, self.severity, self.message.as_str(), self.span)
  }
}

impl Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}: {} ({})", self.stage, self.severity, self.message, self.span)
  }
}

/// An ordered, deduplicating collection of diagnostics, modeled on
/// `sherpa-core::journal::report::Report` but specialized to spec.md §7's
/// single dedup key instead of a per-report-type map.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
  items: Vec<Diagnostic>,
  seen:  HashSet<(Stage, Severity, String, Span)>,
}

impl Diagnostics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, diag: Diagnostic) {
    let key = (diag.stage, diag.severity, diag.message.clone(), diag.span);
    if self.seen.insert(key) {
      self.items.push(diag);
    }
  }

  pub fn extend(&mut self, other: Diagnostics) {
    for diag in other.items {
      self.push(diag);
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
    self.items.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// True if any diagnostic at [`Severity::Error`] is present. Per
  /// spec.md §7, this means "no output was produced".
  pub fn has_errors(&self) -> bool {
    self.items.iter().any(|d| d.severity == Severity::Error)
  }

  pub fn of_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
    self.items.iter().filter(move |d| d.severity == severity)
  }
}

impl IntoIterator for Diagnostics {
  type Item = Diagnostic;
  type IntoIter = std::vec::IntoIter<Diagnostic>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.into_iter()
  }
}
