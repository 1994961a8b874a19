//! CDTk: a compiler-construction toolkit exposing the three contracts
//! described in spec.md §6 — a lexer, an AG-LL hybrid parser, and an AST
//! pattern-match sub-language — behind one import path, the way `radlr`
//! aggregates `radlr_core`/`radlr_ascript`/`radlr_bytecode`/`radlr_build`
//! for its own downstream consumers.
//!
//! This crate adds no behaviour of its own: everything here is a
//! re-export of [`cdtk_core`] and [`cdtk_runtime`], plus one convenience
//! function ([`match_ast`]) for the common case of compiling a pattern
//! and matching it once.

pub use cdtk_core::{
  analysis, ast, dfa, fallback, grammar, nfa, parse, parser, pattern, regex, sppf,
  Arena, AstId, AstNode, Grammar, Lexer, ParseMetrics, ParseOutcome, Pattern, PatternCache,
  PredictiveTable, RuleDef, TokenDef, TokenDefInput, TokenInstance,
};
pub use cdtk_runtime::{
  intern_lexeme, resolve_lexeme, CancellationToken, CdtkError, CdtkResult, Diagnostic, Diagnostics, IString, LexerOptions, ParserOptions,
  Severity, Span, Stage, StringStore,
};

use std::collections::HashMap;

/// Compiles `pattern` and matches it against `node` in one call, for
/// callers that do not need a [`PatternCache`]'s reuse across many match
/// attempts. Returns the capture map on success.
pub fn match_ast(pattern: &str, node: AstId, arena: &mut Arena) -> CdtkResult<Option<HashMap<String, AstId>>> {
  let compiled = cdtk_core::pattern::parse_pattern(pattern)?;
  let mut bindings = HashMap::new();
  if cdtk_core::pattern::matches(&compiled, node, arena, &mut bindings) {
    Ok(Some(bindings))
  } else {
    Ok(None)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokenizes_parses_and_converts_to_ast_via_the_facade() {
    let cancel = CancellationToken::new();
    let mut lexer = Lexer::new(LexerOptions::new());
    lexer.add_token(TokenDefInput::new("Number", r"\d+"));
    lexer.add_token(TokenDefInput::new("Plus", r"\+"));
    lexer.add_token(TokenDefInput::new("WS", r"\s+").ignored());
    lexer.build(&cancel).unwrap();

    let (tokens, diags) = lexer.tokenize("3 + 5", &cancel).unwrap();
    assert!(diags.is_empty());
    assert_eq!(tokens.len(), 3);

    let mut g = Grammar::new();
    g.add_rule("Expr", "left:@Number '+' right:@Number").unwrap();
    g.set_start("Expr");
    g.ensure_compiled(&cancel);

    let outcome = parse(&g, &tokens, ParserOptions::new(), &cancel).unwrap();
    assert!(!outcome.is_partial);

    let mut arena = Arena::new();
    let mut ast_diags = Diagnostics::new();
    let root = cdtk_core::ast::convert(&mut arena, &outcome.sppf, outcome.root.unwrap(), &mut ast_diags);

    let bindings = match_ast("Expr(left: $l, right: $r)", root, &mut arena).unwrap().unwrap();
    match arena.get(bindings["l"]) {
      AstNode::Terminal { lexeme, .. } => assert_eq!(lexeme, "3"),
      other => panic!("expected terminal, got {other:?}"),
    }
  }
}
