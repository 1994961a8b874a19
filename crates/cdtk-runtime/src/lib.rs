//! Shared primitive types for CDTk: spans, string interning, diagnostics,
//! configuration, and the crate-wide error type.
//!
//! This crate is intentionally dependency-light, mirroring
//! `radlr_rust_runtime`'s role as the bottom of the workspace's dependency
//! graph: everything else in the workspace depends on it, it depends on
//! nothing workspace-local.

pub mod cancel;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod intern;
pub mod span;

pub use cancel::CancellationToken;
pub use config::{LexerOptions, ParserOptions};
pub use diagnostic::{Diagnostic, Diagnostics, Severity, Stage};
pub use error::{CdtkError, CdtkResult};
pub use intern::{intern_lexeme, resolve_lexeme, IString, StringStore};
pub use span::Span;
