//! AST pattern-match sub-language (spec.md §5): `_`, `"literal"`,
//! `$name`, `Name`, `Name(a, b)` / `Name(f1: p1, ...)`, `a | b`, and
//! `[p1, p2, ..$rest]`.
//!
//! Parsed the same way [`crate::grammar::expr`] parses grammar patterns
//! — a small hand-rolled lexer feeding a recursive-descent parser — since
//! this pattern grammar has the same shape (literals, named captures,
//! choice, a repetition/rest construct) as the one `expr.rs` already
//! compiles.

use crate::ast::{Arena, AstId, AstNode};
use cdtk_runtime::{CdtkError, CdtkResult, Span};
use std::collections::HashMap;
use std::iter::Peekable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
  Wildcard,
  Literal(String),
  Bind(String),
  /// `Name` (no parens) or `Name(...)`; `None` distinguishes the two so
  /// `Name` can match any `Rule { name: "Name", .. }` regardless of
  /// field count, while `Name()` requires zero fields.
  Rule(String, Option<Vec<FieldPattern>>),
  Or(Vec<Pattern>),
  List { items: Vec<Pattern>, rest: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPattern {
  Positional(Pattern),
  Named(String, Pattern),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
  Underscore,
  StringLit(String),
  Dollar(String),
  Ident(String),
  LParen,
  RParen,
  LBracket,
  RBracket,
  Comma,
  Colon,
  Pipe,
  DotDot,
}

fn lex(src: &str) -> CdtkResult<Vec<Tok>> {
  let mut out = Vec::new();
  let mut chars = src.chars().peekable();
  let bad = |reason: &str| CdtkError::InvalidPattern { pattern: src.to_string(), reason: reason.to_string() };
  while let Some(&c) = chars.peek() {
    match c {
      c if c.is_whitespace() => {
        chars.next();
      }
      '(' => {
        chars.next();
        out.push(Tok::LParen);
      }
      ')' => {
        chars.next();
        out.push(Tok::RParen);
      }
      '[' => {
        chars.next();
        out.push(Tok::LBracket);
      }
      ']' => {
        chars.next();
        out.push(Tok::RBracket);
      }
      ',' => {
        chars.next();
        out.push(Tok::Comma);
      }
      ':' => {
        chars.next();
        out.push(Tok::Colon);
      }
      '|' => {
        chars.next();
        out.push(Tok::Pipe);
      }
      '.' => {
        chars.next();
        if chars.next() != Some('.') {
          return Err(bad("expected '..' before a rest binding"));
        }
        out.push(Tok::DotDot);
      }
      '"' => {
        chars.next();
        let mut lit = String::new();
        loop {
          match chars.next().ok_or_else(|| bad("unterminated string literal"))? {
            '"' => break,
            '\\' => lit.push(chars.next().ok_or_else(|| bad("unterminated escape in string literal"))?),
            c => lit.push(c),
          }
        }
        out.push(Tok::StringLit(lit));
      }
      '$' => {
        chars.next();
        let name = take_ident(&mut chars);
        if name.is_empty() {
          return Err(bad("expected an identifier after '$'"));
        }
        out.push(Tok::Dollar(name));
      }
      '_' if !peek_is_ident_cont(&chars) => {
        chars.next();
        out.push(Tok::Underscore);
      }
      c if c.is_alphabetic() || c == '_' => {
        let name = take_ident(&mut chars);
        out.push(Tok::Ident(name));
      }
      _ => return Err(bad(&format!("unexpected character '{c}'"))),
    }
  }
  Ok(out)
}

fn peek_is_ident_cont(chars: &Peekable<std::str::Chars<'_>>) -> bool {
  let mut clone = chars.clone();
  clone.next();
  matches!(clone.peek(), Some(c) if c.is_alphanumeric() || *c == '_')
}

fn take_ident(chars: &mut Peekable<std::str::Chars<'_>>) -> String {
  let mut name = String::new();
  while let Some(&c) = chars.peek() {
    if c.is_alphanumeric() || c == '_' {
      name.push(c);
      chars.next();
    } else {
      break;
    }
  }
  name
}

/// Parses one pattern (spec.md §5's pattern grammar). `|` binds loosest,
/// so `a | b | c` parses as a flat [`Pattern::Or`].
pub fn parse_pattern(src: &str) -> CdtkResult<Pattern> {
  let toks = lex(src)?;
  let mut p = PatternParser { toks: toks.into_iter().peekable(), src };
  let pat = p.parse_or()?;
  if p.toks.peek().is_some() {
    return Err(CdtkError::InvalidPattern { pattern: src.to_string(), reason: "trailing input after pattern".to_string() });
  }
  Ok(pat)
}

struct PatternParser<'a> {
  toks: Peekable<std::vec::IntoIter<Tok>>,
  src:  &'a str,
}

impl<'a> PatternParser<'a> {
  fn bad(&self, reason: &str) -> CdtkError {
    CdtkError::InvalidPattern { pattern: self.src.to_string(), reason: reason.to_string() }
  }

  fn parse_or(&mut self) -> CdtkResult<Pattern> {
    let first = self.parse_atom()?;
    if !matches!(self.toks.peek(), Some(Tok::Pipe)) {
      return Ok(first);
    }
    let mut alts = vec![first];
    while matches!(self.toks.peek(), Some(Tok::Pipe)) {
      self.toks.next();
      alts.push(self.parse_atom()?);
    }
    Ok(Pattern::Or(alts))
  }

  fn parse_atom(&mut self) -> CdtkResult<Pattern> {
    match self.toks.next().ok_or_else(|| self.bad("unexpected end of pattern"))? {
      Tok::Underscore => Ok(Pattern::Wildcard),
      Tok::StringLit(s) => Ok(Pattern::Literal(s)),
      Tok::Dollar(name) => Ok(Pattern::Bind(name)),
      Tok::Ident(name) => {
        if matches!(self.toks.peek(), Some(Tok::LParen)) {
          self.toks.next();
          let fields = self.parse_fields()?;
          Ok(Pattern::Rule(name, Some(fields)))
        } else {
          Ok(Pattern::Rule(name, None))
        }
      }
      Tok::LBracket => self.parse_list(),
      other => Err(self.bad(&format!("unexpected token {other:?}"))),
    }
  }

  fn parse_fields(&mut self) -> CdtkResult<Vec<FieldPattern>> {
    let mut fields = Vec::new();
    if matches!(self.toks.peek(), Some(Tok::RParen)) {
      self.toks.next();
      return Ok(fields);
    }
    loop {
      fields.push(self.parse_field()?);
      match self.toks.next() {
        Some(Tok::Comma) => continue,
        Some(Tok::RParen) => break,
        other => return Err(self.bad(&format!("expected ',' or ')' in field list, found {other:?}"))),
      }
    }
    Ok(fields)
  }

  fn parse_field(&mut self) -> CdtkResult<FieldPattern> {
    // `name: pattern` vs a bare positional pattern both start with an
    // identifier-shaped atom, so peek two tokens ahead before committing.
    if let Some(Tok::Ident(name)) = self.toks.peek().cloned() {
      let mut lookahead = self.toks.clone();
      lookahead.next();
      if matches!(lookahead.peek(), Some(Tok::Colon)) {
        self.toks.next();
        self.toks.next();
        let pat = self.parse_or()?;
        return Ok(FieldPattern::Named(name, pat));
      }
    }
    Ok(FieldPattern::Positional(self.parse_or()?))
  }

  fn parse_list(&mut self) -> CdtkResult<Pattern> {
    let mut items = Vec::new();
    let mut rest = None;
    if matches!(self.toks.peek(), Some(Tok::RBracket)) {
      self.toks.next();
      return Ok(Pattern::List { items, rest });
    }
    loop {
      if matches!(self.toks.peek(), Some(Tok::DotDot)) {
        self.toks.next();
        match self.toks.next() {
          Some(Tok::Dollar(name)) => rest = Some(name),
          other => return Err(self.bad(&format!("expected a '$name' rest binding after '..', found {other:?}"))),
        }
      } else {
        items.push(self.parse_or()?);
      }
      match self.toks.next() {
        Some(Tok::Comma) => continue,
        Some(Tok::RBracket) => break,
        other => return Err(self.bad(&format!("expected ',' or ']' in list pattern, found {other:?}"))),
      }
    }
    Ok(Pattern::List { items, rest })
  }
}

/// Caches compiled patterns by their source string so repeated matches
/// against the same literal pattern text (the common case — a semantic
/// mapping function matches the same handful of patterns on every call)
/// skip re-parsing.
#[derive(Debug, Default)]
pub struct PatternCache {
  compiled: HashMap<String, Pattern>,
}

impl PatternCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_compile(&mut self, src: &str) -> CdtkResult<&Pattern> {
    if !self.compiled.contains_key(src) {
      let pat = parse_pattern(src)?;
      self.compiled.insert(src.to_string(), pat);
    }
    Ok(&self.compiled[src])
  }
}

/// Matches `pattern` against `node`, recording `$name` captures into
/// `bindings`. Matching an already-bound name re-checks equality rather
/// than overwriting, so repeated `$x` bindings in one pattern behave like
/// a linear pattern. Takes `arena` mutably because a `..$rest` list
/// binding materializes its tail as a freshly-pushed [`AstNode::List`].
pub fn matches(pattern: &Pattern, node: AstId, arena: &mut Arena, bindings: &mut HashMap<String, AstId>) -> bool {
  match pattern {
    Pattern::Wildcard => true,
    Pattern::Bind(name) => match bindings.get(name) {
      Some(&existing) => existing == node,
      None => {
        bindings.insert(name.clone(), node);
        true
      }
    },
    Pattern::Literal(lit) => matches!(arena.get(node), AstNode::Terminal { lexeme, .. } if lexeme == lit),
    Pattern::Rule(name, fields) => {
      let actual_fields = match arena.get(node) {
        AstNode::Rule { name: actual, fields, .. } if actual == name => fields.clone(),
        _ => return false,
      };
      match fields {
        None => true,
        Some(patterns) => match_fields(patterns, &actual_fields, arena, bindings),
      }
    }
    Pattern::Or(alts) => alts.iter().any(|alt| {
      let mut trial = bindings.clone();
      if matches(alt, node, arena, &mut trial) {
        *bindings = trial;
        true
      } else {
        false
      }
    }),
    Pattern::List { items, rest } => {
      let elems = match arena.get(node) {
        AstNode::List { items: elems, .. } => elems.clone(),
        _ => return false,
      };
      match_list(items, rest.as_deref(), &elems, arena, bindings)
    }
  }
}

fn match_fields(patterns: &[FieldPattern], actual: &[(Option<String>, AstId)], arena: &mut Arena, bindings: &mut HashMap<String, AstId>) -> bool {
  let positional_ids: Vec<AstId> = actual.iter().filter(|(label, _)| label.is_none()).map(|&(_, id)| id).collect();
  let mut positional = positional_ids.into_iter();
  for field in patterns {
    match field {
      FieldPattern::Positional(pat) => match positional.next() {
        Some(id) => {
          if !matches(pat, id, arena, bindings) {
            return false;
          }
        }
        None => return false,
      },
      FieldPattern::Named(name, pat) => {
        let found = actual.iter().find(|(label, _)| label.as_deref() == Some(name.as_str())).map(|&(_, id)| id);
        match found {
          Some(id) => {
            if !matches(pat, id, arena, bindings) {
              return false;
            }
          }
          None => return false,
        }
      }
    }
  }
  true
}

/// Matches a fixed prefix of `elems` against `items`, then — if `rest` is
/// present — pushes the true remaining elements into `arena` as a new
/// [`AstNode::List`] and binds `rest` to it, rather than to just the
/// first trailing element (spec.md §5: `..$rest` binds the whole tail).
fn match_list(items: &[Pattern], rest: Option<&str>, elems: &[AstId], arena: &mut Arena, bindings: &mut HashMap<String, AstId>) -> bool {
  if rest.is_none() && items.len() != elems.len() {
    return false;
  }
  if rest.is_some() && items.len() > elems.len() {
    return false;
  }
  for (pat, &id) in items.iter().zip(elems.iter()) {
    if !matches(pat, id, arena, bindings) {
      return false;
    }
  }
  if let Some(name) = rest {
    let tail: Vec<AstId> = elems[items.len()..].to_vec();
    let span = tail.iter().map(|id| arena.get(*id).span()).fold(Span::UNKNOWN, |acc, s| acc.combine(&s));
    let rest_id = arena.push(AstNode::List { items: tail, span });
    bindings.insert(name.to_string(), rest_id);
  }
  true
}
