use crate::span::Span;
use thiserror::Error;

/// Unrecoverable failures raised by the core. These are distinct from
/// [`crate::diagnostic::Diagnostic`]s: a `Diagnostic` is accumulated and
/// returned alongside a (possibly partial) result, while a `CdtkError`
/// aborts the operation that raised it (spec.md §7: "grammar errors stop
/// Parse before it starts").
#[derive(Debug, Error, Clone)]
pub enum CdtkError {
  #[error("duplicate token definition {name:?} at {span}")]
  DuplicateToken { name: String, span: Span },

  #[error("duplicate rule definition {name:?} at {span}")]
  DuplicateRule { name: String, span: Span },

  #[error("unknown start rule {name:?}")]
  UnknownStartRule { name: String },

  #[error("grammar must be compiled before it can be used to parse")]
  GrammarNotCompiled,

  #[error("lexer must be built before it can tokenize input")]
  LexerNotBuilt,

  #[error("invalid pattern {pattern:?}: {reason}")]
  InvalidPattern { pattern: String, reason: String },

  #[error("operation was cancelled")]
  Cancelled,
}

pub type CdtkResult<T> = Result<T, CdtkError>;
