//! Black-box checks for the universal testable properties in spec.md §8
//! that are reachable through the public `cdtk` surface rather than
//! through `cdtk_core`'s own unit tests (NFA/DFA equivalence and
//! minimisation are already covered at the unit level in `dfa.rs`, so
//! they are not repeated here).

use cdtk::{ast, AstNode, CancellationToken, Diagnostics, Grammar, Lexer, LexerOptions, TokenDefInput};

fn ident_lexer() -> Lexer {
  let mut lexer = Lexer::new(LexerOptions::new());
  lexer.add_token(TokenDefInput::new("Ident", r"[a-zA-Z_][a-zA-Z0-9_]*"));
  lexer.add_token(TokenDefInput::new("WS", r"\s+").ignored());
  lexer
}

#[test]
fn lexer_determinism_across_repeated_calls() {
  let cancel = CancellationToken::new();
  let mut lexer = ident_lexer();
  let (first, _) = lexer.tokenize("foo bar baz", &cancel).unwrap();
  let (second, _) = lexer.tokenize("foo bar baz", &cancel).unwrap();
  assert_eq!(first.len(), second.len());
  for (a, b) in first.iter().zip(second.iter()) {
    assert_eq!(a.type_str(), b.type_str());
    assert_eq!(a.lexeme_str(), b.lexeme_str());
  }
}

#[test]
fn priority_and_longest_match_resolve_keyword_vs_ident() {
  // `if` matches both a keyword literal and the identifier pattern; the
  // earlier-declared definition must win on the length tie.
  let cancel = CancellationToken::new();
  let mut lexer = Lexer::new(LexerOptions::new());
  lexer.add_token(TokenDefInput::new("If", "if"));
  lexer.add_token(TokenDefInput::new("Ident", r"[a-zA-Z_][a-zA-Z0-9_]*"));
  lexer.add_token(TokenDefInput::new("WS", r"\s+").ignored());

  let (tokens, diags) = lexer.tokenize("if iffy", &cancel).unwrap();
  assert!(diags.is_empty());
  assert_eq!(tokens[0].type_str(), "If");
  assert_eq!(tokens[0].lexeme_str(), "if");
  // `iffy` is longer than the `If` literal at every position, so the
  // longest-match rule must pick `Ident` here regardless of priority.
  assert_eq!(tokens[1].type_str(), "Ident");
  assert_eq!(tokens[1].lexeme_str(), "iffy");
}

#[test]
fn first_set_grows_monotonically_when_an_alternative_is_added() {
  let cancel = CancellationToken::new();
  let mut narrow = Grammar::new();
  narrow.add_rule("A", "@X").unwrap();
  narrow.set_start("A");
  narrow.ensure_compiled(&cancel);
  let first_narrow = narrow.first().get("A").cloned().unwrap_or_default();

  let mut wider = Grammar::new();
  wider.add_rule("A", "@X | @Y").unwrap();
  wider.set_start("A");
  wider.ensure_compiled(&cancel);
  let first_wider = wider.first().get("A").cloned().unwrap_or_default();

  assert!(first_wider.is_superset(&first_narrow), "adding an alternative must never shrink FIRST(A)");
  assert!(first_wider.len() > first_narrow.len());
}

#[test]
fn sppf_never_duplicates_a_symbol_span() {
  let mut sppf = cdtk_core::sppf::SppfPool::new();
  let a = sppf.get_or_create_symbol("Expr", 0, 3);
  let b = sppf.get_or_create_symbol("Expr", 0, 3);
  assert_eq!(a, b, "identical (symbol, left, right) must share one Symbol node");
  let c = sppf.get_or_create_symbol("Expr", 0, 4);
  assert_ne!(a, c);
}

#[test]
fn arena_reset_returns_fresh_ids_with_no_stale_content() {
  let mut arena = cdtk::Arena::new();
  let first_batch: Vec<_> =
    (0..5).map(|i| arena.push(AstNode::Terminal { type_name: "X".into(), lexeme: i.to_string(), span: cdtk_runtime::Span::UNKNOWN })).collect();
  arena.reset();
  let second_batch: Vec<_> =
    (0..5).map(|i| arena.push(AstNode::Terminal { type_name: "Y".into(), lexeme: i.to_string(), span: cdtk_runtime::Span::UNKNOWN })).collect();
  assert_eq!(first_batch, second_batch, "post-reset allocation reuses the same index range");
  for id in second_batch {
    match arena.get(id) {
      AstNode::Terminal { type_name, .. } => assert_eq!(type_name, "Y", "no field from the prior parse should survive a reset"),
      other => panic!("expected terminal, got {other:?}"),
    }
  }
}

#[test]
fn diagnostics_dedup_identical_entries_from_a_real_build() {
  let cancel = CancellationToken::new();
  let mut lexer = Lexer::new(LexerOptions::new());
  lexer.add_token(TokenDefInput::new("Ident", r"[a-zA-Z_][a-zA-Z0-9_]*"));
  // No ignored whitespace token plus an identifier pattern referencing
  // the word family triggers the auto-inject Info diagnostic (spec.md
  // §4.1). Pushing that same real diagnostic value twice into one
  // collection must still surface once.
  let build_diags = lexer.build(&cancel).unwrap();
  let auto_inject = build_diags.iter().find(|d| d.message.contains("auto-injected")).cloned().expect("expected the auto-inject Info diagnostic");

  let mut diags = Diagnostics::new();
  diags.push(auto_inject.clone());
  diags.push(auto_inject);
  assert_eq!(diags.iter().filter(|d| d.message.contains("auto-injected")).count(), 1, "the same (stage, level, message, span) must not repeat");
}

#[test]
fn gll_escalation_is_idempotent_across_repeated_parses() {
  let cancel = CancellationToken::new();
  let mut g = Grammar::new();
  g.add_rule("E", "E '+' E | @Number").unwrap();
  g.set_start("E");

  let tokens: Vec<_> = ["1", "+", "2", "+", "3"]
    .iter()
    .map(|s| cdtk::TokenInstance {
      ty: cdtk_runtime::intern_lexeme(if *s == "+" { "Plus" } else { "Number" }),
      lexeme: cdtk_runtime::intern_lexeme(s),
      span: cdtk_runtime::Span::UNKNOWN,
    })
    .collect();

  let run_once = || {
    let mut sppf = cdtk_core::sppf::SppfPool::new();
    let mut engine = cdtk_core::parser::gll::GllEngine::new(&g, &tokens, &cancel);
    let (root, _) = engine.parse_rule(&mut sppf, "E", 0, true).unwrap();
    let mut arena = cdtk::Arena::new();
    let mut diags = Diagnostics::new();
    let ast_root = ast::convert(&mut arena, &sppf, root, &mut diags);
    describe(&arena, ast_root)
  };

  assert_eq!(run_once(), run_once(), "first-alternative selection must be stable across runs on identical input");
}

fn describe(arena: &cdtk::Arena, id: cdtk::AstId) -> String {
  match arena.get(id) {
    AstNode::Terminal { type_name, lexeme, .. } => format!("{type_name}({lexeme})"),
    AstNode::Rule { name, fields, .. } => {
      let inner: Vec<_> = fields.iter().map(|(_, f)| describe(arena, *f)).collect();
      format!("{name}[{}]", inner.join(","))
    }
    AstNode::List { items, .. } => format!("[{}]", items.iter().map(|&f| describe(arena, f)).collect::<Vec<_>>().join(",")),
    AstNode::Empty => "ε".to_string(),
  }
}
