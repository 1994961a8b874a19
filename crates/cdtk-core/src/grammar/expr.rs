//! Grammar pattern compiler: pattern string → [`Expr`] IR (spec.md §3,
//! §4.2).

use cdtk_runtime::Span;
use std::iter::Peekable;

/// The grammar expression intermediate representation (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  TerminalType(String),
  TerminalLiteral(String),
  NonTerminal(String),
  Sequence(Vec<Expr>),
  Choice(Vec<Expr>),
  Repeat(Box<Expr>, u32, Option<u32>),
  Optional(Box<Expr>),
  Named(String, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
  Pipe,
  LParen,
  RParen,
  Question,
  Star,
  Plus,
  Colon,
  Literal(String),
  TokenType(String),
  Name(String),
}

fn lex(pattern: &str) -> Option<Vec<Tok>> {
  let mut out = Vec::new();
  let mut chars = pattern.chars().peekable();
  while let Some(&c) = chars.peek() {
    match c {
      c if c.is_whitespace() => {
        chars.next();
      }
      '|' => {
        chars.next();
        out.push(Tok::Pipe);
      }
      '(' => {
        chars.next();
        out.push(Tok::LParen);
      }
      ')' => {
        chars.next();
        out.push(Tok::RParen);
      }
      '?' => {
        chars.next();
        out.push(Tok::Question);
      }
      '*' => {
        chars.next();
        out.push(Tok::Star);
      }
      '+' => {
        chars.next();
        out.push(Tok::Plus);
      }
      ':' => {
        chars.next();
        out.push(Tok::Colon);
      }
      '\'' => {
        chars.next();
        let mut lit = String::new();
        loop {
          match chars.next()? {
            '\'' => break,
            '\\' => lit.push(chars.next()?),
            c => lit.push(c),
          }
        }
        out.push(Tok::Literal(lit));
      }
      '@' => {
        chars.next();
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
          if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
          } else {
            break;
          }
        }
        if name.is_empty() {
          return None;
        }
        out.push(Tok::TokenType(name));
      }
      c if c.is_alphabetic() || c == '_' => {
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
          if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
          } else {
            break;
          }
        }
        out.push(Tok::Name(name));
      }
      _ => return None,
    }
  }
  Some(out)
}

/// Parses a rule's pattern string into its [`Expr`] IR. Returns `None` on
/// a pattern lexing/parse failure (unterminated literal, stray operator).
pub fn compile_pattern(pattern: &str) -> Option<Expr> {
  let toks = lex(pattern)?;
  let mut p = PatternParser { toks: toks.into_iter().peekable() };
  let expr = p.parse_choice()?;
  if p.toks.peek().is_some() {
    return None;
  }
  Some(expr)
}

struct PatternParser {
  toks: Peekable<std::vec::IntoIter<Tok>>,
}

impl PatternParser {
  fn parse_choice(&mut self) -> Option<Expr> {
    let mut alts = vec![self.parse_sequence()?];
    while matches!(self.toks.peek(), Some(Tok::Pipe)) {
      self.toks.next();
      alts.push(self.parse_sequence()?);
    }
    Some(if alts.len() == 1 { alts.pop().unwrap() } else { Expr::Choice(alts) })
  }

  fn parse_sequence(&mut self) -> Option<Expr> {
    let mut items = Vec::new();
    while !matches!(self.toks.peek(), None | Some(Tok::Pipe) | Some(Tok::RParen)) {
      items.push(self.parse_suffixed()?);
    }
    Some(match items.len() {
      0 => Expr::Sequence(vec![]),
      1 => items.pop().unwrap(),
      _ => Expr::Sequence(items),
    })
  }

  fn parse_suffixed(&mut self) -> Option<Expr> {
    let atom = self.parse_atom()?;
    match self.toks.peek() {
      Some(Tok::Question) => {
        self.toks.next();
        Some(Expr::Optional(Box::new(atom)))
      }
      Some(Tok::Star) => {
        self.toks.next();
        Some(Expr::Repeat(Box::new(atom), 0, None))
      }
      Some(Tok::Plus) => {
        self.toks.next();
        Some(Expr::Repeat(Box::new(atom), 1, None))
      }
      _ => Some(atom),
    }
  }

  fn parse_atom(&mut self) -> Option<Expr> {
    match self.toks.next()? {
      Tok::LParen => {
        let inner = self.parse_choice()?;
        if !matches!(self.toks.next(), Some(Tok::RParen)) {
          return None;
        }
        Some(inner)
      }
      Tok::Literal(lit) => Some(Expr::TerminalLiteral(lit)),
      Tok::TokenType(name) => Some(Expr::TerminalType(name)),
      Tok::Name(name) => {
        if matches!(self.toks.peek(), Some(Tok::Colon)) {
          self.toks.next();
          let inner = self.parse_atom()?;
          Some(Expr::Named(name, Box::new(inner)))
        } else {
          Some(Expr::NonTerminal(name))
        }
      }
      _ => None,
    }
  }
}

/// A compiled rule definition (spec.md §3).
#[derive(Debug, Clone)]
pub struct RuleDef {
  pub name:       String,
  pub pattern:    String,
  pub expr:       Expr,
  pub returns:    Vec<String>,
  pub validators: Vec<String>,
  pub span:       Span,
  /// `true` for rules synthesised by left-recursion elimination
  /// (`__<rule>_LR__`); hidden from diagnostics (spec.md §4.2).
  pub synthetic:  bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compiles_sequence_and_token_types() {
    let expr = compile_pattern("@Number '+' @Number").unwrap();
    assert_eq!(
      expr,
      Expr::Sequence(vec![
        Expr::TerminalType("Number".into()),
        Expr::TerminalLiteral("+".into()),
        Expr::TerminalType("Number".into()),
      ])
    );
  }

  #[test]
  fn compiles_choice_with_recursive_nonterminal() {
    let expr = compile_pattern("List ',' @Ident | @Ident").unwrap();
    assert_eq!(
      expr,
      Expr::Choice(vec![
        Expr::Sequence(vec![Expr::NonTerminal("List".into()), Expr::TerminalLiteral(",".into()), Expr::TerminalType("Ident".into())]),
        Expr::TerminalType("Ident".into()),
      ])
    );
  }

  #[test]
  fn compiles_named_capture_and_repeat() {
    let expr = compile_pattern("left:@Number '+' right:@Number*").unwrap();
    assert_eq!(
      expr,
      Expr::Sequence(vec![
        Expr::Named("left".into(), Box::new(Expr::TerminalType("Number".into()))),
        Expr::TerminalLiteral("+".into()),
        Expr::Named("right".into(), Box::new(Expr::Repeat(Box::new(Expr::TerminalType("Number".into())), 0, None))),
      ])
    );
  }

  #[test]
  fn rejects_unterminated_literal() {
    assert_eq!(compile_pattern("'abc"), None);
  }
}
