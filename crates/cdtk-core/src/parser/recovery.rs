//! Region-based error recovery (spec.md §4.3, §7): when the parser stops
//! before consuming all input, scan forward for a region boundary, score
//! the three standard recovery strategies against it, and retry from the
//! chosen resync point.
//!
//! This only runs after the ALL(*)/GLL pipeline has already failed to
//! make full progress — it never substitutes for the main grammar; it
//! decides where to keep going from.

use super::AllContext;
use crate::grammar::analysis::Terminal;
use crate::sppf::SppfId;
use cdtk_runtime::{Diagnostic, Diagnostics, Severity, Span, Stage};

/// Token literals treated as block/region delimiters when no
/// grammar-specific information is available. Kept narrow and
/// punctuation-only, matching the kind of literal a lexer would actually
/// tag as `TerminalLiteral` (spec.md §4.2's worked examples all use
/// punctuation delimiters).
const BLOCK_STARTERS: &[&str] = &["{", "(", "["];
const BLOCK_TERMINATORS: &[&str] = &["}", ")", "]"];
const STATEMENT_TERMINATORS: &[&str] = &[";"];

#[derive(Debug, Clone, Copy)]
enum Strategy {
  /// Pretend a token FOLLOW(rule) expects was there and resume in place.
  Insert,
  /// Drop the offending token and retry at the same rule.
  Skip { to: u32 },
  /// Jump forward to the next region boundary (statement/block
  /// terminator) and resume after it.
  Resync { to: u32 },
}

fn region_end(ctx: &AllContext, from: u32) -> Option<u32> {
  let mut depth: i32 = 0;
  for (i, tok) in ctx.tokens.iter().enumerate().skip(from as usize) {
    let lex = tok.lexeme_str();
    if BLOCK_STARTERS.contains(&lex.as_str()) {
      depth += 1;
    } else if BLOCK_TERMINATORS.contains(&lex.as_str()) {
      if depth == 0 {
        return Some(i as u32 + 1);
      }
      depth -= 1;
    } else if depth == 0 && STATEMENT_TERMINATORS.contains(&lex.as_str()) {
      return Some(i as u32 + 1);
    }
  }
  None
}

fn next_token_in_follow(ctx: &AllContext, rule: &str, pos: u32) -> bool {
  let Some(follow) = ctx.grammar.follow().get(rule) else { return false };
  let Some(tok) = ctx.tokens.get(pos as usize) else {
    return follow.contains(&Terminal::Eof);
  };
  follow.iter().any(|t| match t {
    Terminal::Type(ty) => *ty == tok.type_str(),
    Terminal::Literal(lit) => *lit == tok.lexeme_str(),
    Terminal::Eof => false,
  })
}

fn score(strategy: Strategy, ctx: &AllContext, rule: &str, stop_pos: u32, region_bound: Option<u32>) -> f64 {
  match strategy {
    Strategy::Insert => {
      if next_token_in_follow(ctx, rule, stop_pos) {
        0.8
      } else {
        0.2
      }
    }
    Strategy::Skip { to } => {
      let follow_bonus = if next_token_in_follow(ctx, rule, to) { 0.4 } else { 0.0 };
      let distance_penalty = (to - stop_pos) as f64 * 0.1;
      (0.5 + follow_bonus - distance_penalty).max(0.0)
    }
    Strategy::Resync { to } => {
      let locality_bonus = match region_bound {
        Some(bound) if bound == to => 0.5,
        _ => 0.1,
      };
      let follow_bonus = if next_token_in_follow(ctx, rule, to) { 0.3 } else { 0.0 };
      (0.3 + locality_bonus + follow_bonus).min(1.0)
    }
  }
}

/// Attempts one recovery step for `rule`, which stopped short at
/// `stop_pos`. Returns an improved `(symbol, end)` result if a resumed
/// parse made it further than `stop_pos`, else `None`.
pub(crate) fn recover(ctx: &mut AllContext, rule: &str, stop_pos: u32, diags: &mut Diagnostics) -> Option<(SppfId, u32)> {
  if stop_pos as usize >= ctx.tokens.len() {
    return None;
  }

  let region_bound = region_end(ctx, stop_pos);
  let candidates = [
    Strategy::Insert,
    Strategy::Skip { to: stop_pos + 1 },
    Strategy::Resync { to: region_bound.unwrap_or(ctx.tokens.len() as u32) },
  ];

  let mut best: Option<(Strategy, f64)> = None;
  for &s in &candidates {
    let sc = score(s, ctx, rule, stop_pos, region_bound);
    if best.map_or(true, |(_, b)| sc > b) {
      best = Some((s, sc));
    }
  }
  let (chosen, sc) = best?;

  let resume_pos = match chosen {
    Strategy::Insert => stop_pos,
    Strategy::Skip { to } => to,
    Strategy::Resync { to } => to,
  };
  let label = match chosen {
    Strategy::Insert => "insert",
    Strategy::Skip { .. } => "skip",
    Strategy::Resync { .. } => "resync",
  };
  diags.push(Diagnostic::new(
    Stage::Parser,
    Severity::Warning,
    format!("recovery: '{label}' strategy (score {sc:.2}) resuming at token {resume_pos} after stopping at {stop_pos}"),
    Span::UNKNOWN,
  ));

  if resume_pos == stop_pos {
    return None;
  }
  let mut scratch = Diagnostics::new();
  let retried = ctx.parse_rule_all(rule, resume_pos, &mut scratch);
  diags.extend(scratch);
  retried.filter(|&(_, end)| end > stop_pos)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::Grammar;
  use crate::scanner::TokenInstance;
  use cdtk_runtime::{CancellationToken, ParserOptions};

  fn tok(ty: &str, lexeme: &str) -> TokenInstance {
    TokenInstance { ty: cdtk_runtime::intern_lexeme(ty), lexeme: cdtk_runtime::intern_lexeme(lexeme), span: Span::UNKNOWN }
  }

  #[test]
  fn resyncs_past_a_statement_terminator() {
    let mut g = Grammar::new();
    g.add_rule("Stmt", "@Ident ';'").unwrap();
    g.set_start("Stmt");
    let cancel = CancellationToken::new();
    g.ensure_compiled(&cancel);

    // "a !! ; b ;" — the garbage token `!!` derails `Stmt` after `a`; a
    // resync should land just past the next `;`.
    let tokens =
      vec![tok("Ident", "a"), tok("Garbage", "!!"), tok("Semi", ";"), tok("Ident", "b"), tok("Semi", ";")];
    let mut ctx = AllContext::new(&g, &tokens, ParserOptions::new(), &cancel);
    let mut diags = Diagnostics::new();
    let first = ctx.parse_rule_all("Stmt", 0, &mut diags);
    assert_eq!(first, None, "the garbage token should block a direct parse");

    let bound = region_end(&ctx, 1);
    assert_eq!(bound, Some(3));
  }
}
