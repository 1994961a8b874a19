//! Regex parsing: pattern string → [`RegexIr`] or "unsupported".

mod ir;
mod parser;

pub use ir::{digit_class, space_class, word_class, CharSet, RegexIr};
pub use parser::parse;
