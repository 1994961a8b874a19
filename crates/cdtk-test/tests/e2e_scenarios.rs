//! End-to-end scenarios, one test per concrete example in spec.md §8.

use cdtk::{ast, AstNode, CancellationToken, CdtkError, Diagnostics, Grammar, Lexer, LexerOptions, ParserOptions, Severity, TokenDefInput};

fn number_plus_lexer() -> Lexer {
  let mut lexer = Lexer::new(LexerOptions::new());
  lexer.add_token(TokenDefInput::new("Number", r"\d+"));
  lexer.add_token(TokenDefInput::new("Plus", r"\+"));
  lexer.add_token(TokenDefInput::new("WS", r"\s+").ignored());
  lexer
}

#[test]
fn scenario_1_tokens_and_ast_happy_path() {
  let cancel = CancellationToken::new();
  let mut lexer = number_plus_lexer();
  let (tokens, diags) = lexer.tokenize("3 + 5", &cancel).unwrap();
  assert!(diags.is_empty());
  assert_eq!(tokens.iter().map(|t| t.lexeme_str()).collect::<Vec<_>>(), vec!["3", "+", "5"]);

  let mut g = Grammar::new();
  g.add_rule("Expr", "left:@Number '+' right:@Number").unwrap();
  g.set_start("Expr");
  g.ensure_compiled(&cancel);

  let outcome = cdtk::parse(&g, &tokens, ParserOptions::new(), &cancel).unwrap();
  assert!(!outcome.is_partial);
  assert!(outcome.diagnostics.is_empty());
  assert_eq!(outcome.errors_recovered, 0);

  let mut arena = cdtk::Arena::new();
  let mut ast_diags = Diagnostics::new();
  let root = ast::convert(&mut arena, &outcome.sppf, outcome.root.unwrap(), &mut ast_diags);
  match arena.get(root) {
    AstNode::Rule { name, fields, .. } => {
      assert_eq!(name, "Expr");
      assert_eq!(fields[0].0.as_deref(), Some("left"));
      assert_eq!(fields[1].0.as_deref(), Some("right"));
    }
    other => panic!("expected an Expr rule node, got {other:?}"),
  }
}

#[test]
fn scenario_2_unexpected_eof_recovers_with_partial_ast() {
  let cancel = CancellationToken::new();
  let mut lexer = number_plus_lexer();
  // "3 +" with no trailing operand: `Expr -> @Number '+' @Number` matches
  // the `Number` and `+` tokens, then runs out of input before the second
  // operand. Neither ALL(*) nor GLL can complete the sequence, so this
  // must land in `parse`'s full-failure branch and come back as a
  // recovered partial tree rather than no tree at all (spec.md §8
  // scenario 2).
  let (tokens, _) = lexer.tokenize("3+", &cancel).unwrap();

  let mut g = Grammar::new();
  g.add_rule("Expr", "@Number '+' @Number").unwrap();
  g.set_start("Expr");
  g.ensure_compiled(&cancel);

  let outcome = cdtk::parse(&g, &tokens, ParserOptions::new(), &cancel).unwrap();
  assert!(outcome.is_partial, "an unexpected-EOF stop must never be reported as a complete parse");
  assert!(outcome.diagnostics.has_errors(), "an unexpected-EOF stop must surface an error diagnostic");
  assert_eq!(outcome.errors_recovered, 1, "recovery must have rooted a partial tree at the deepest progress reached");

  let root = outcome.root.expect("a partial tree must still be produced");
  let mut arena = cdtk::Arena::new();
  let mut ast_diags = Diagnostics::new();
  let ast_root = ast::convert(&mut arena, &outcome.sppf, root, &mut ast_diags);
  match arena.get(ast_root) {
    AstNode::Rule { name, fields, .. } => {
      assert_eq!(name, "Expr");
      assert_eq!(fields.len(), 1, "only the Number and '+' were matched before input ran out; '+' itself is an unlabeled literal and is dropped");
    }
    other => panic!("expected a partial Expr rule node, got {other:?}"),
  }
}

#[test]
fn scenario_3_left_recursive_list_round_trips() {
  let cancel = CancellationToken::new();
  let mut g = Grammar::new();
  g.add_rule("List", "List ',' @Ident | @Ident").unwrap();
  g.set_start("List");
  let compile_diags = g.ensure_compiled(&cancel);
  assert!(g.rules.contains_key("__List_LR__"));
  assert!(!compile_diags.iter().any(|d| d.message.to_lowercase().contains("left recursion") && d.severity == Severity::Error));

  let toks = ["a", ",", "b", ",", "c"];
  let tokens: Vec<_> = toks
    .iter()
    .map(|s| cdtk::TokenInstance {
      ty: cdtk_runtime::intern_lexeme(if *s == "," { "Comma" } else { "Ident" }),
      lexeme: cdtk_runtime::intern_lexeme(s),
      span: cdtk_runtime::Span::UNKNOWN,
    })
    .collect();

  let outcome = cdtk::parse(&g, &tokens, ParserOptions::new(), &cancel).unwrap();
  assert!(!outcome.is_partial);

  let mut arena = cdtk::Arena::new();
  let mut diags = Diagnostics::new();
  let root = ast::convert(&mut arena, &outcome.sppf, outcome.root.unwrap(), &mut diags);
  let idents = collect_idents(&arena, root);
  assert_eq!(idents, vec!["a", "b", "c"]);
}

fn collect_idents(arena: &cdtk::Arena, id: cdtk::AstId) -> Vec<String> {
  match arena.get(id) {
    AstNode::Terminal { type_name, lexeme, .. } if type_name == "Ident" => vec![lexeme.clone()],
    AstNode::Terminal { .. } => vec![],
    AstNode::Rule { fields, .. } => fields.iter().flat_map(|(_, f)| collect_idents(arena, *f)).collect(),
    AstNode::List { items, .. } => items.iter().flat_map(|&f| collect_idents(arena, f)).collect(),
    AstNode::Empty => vec![],
  }
}

#[test]
fn scenario_4_ambiguous_grammar_escalates_and_warns() {
  let mut g = Grammar::new();
  // Deliberately not run through `ensure_compiled`'s left-recursion
  // elimination: this is the exact grammar spec.md §8 scenario 4 asks to
  // remain ambiguous so the GLL fallback path is what resolves it.
  // `GllEngine` (unlike the top-level `parse` entry point) does not
  // require a compiled grammar, since it is itself the fallback the
  // compiled ALL(*) path escalates into.
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

  let cancel = CancellationToken::new();
  let mut sppf = cdtk_core::sppf::SppfPool::new();
  let mut engine = cdtk_core::parser::gll::GllEngine::new(&g, &tokens, &cancel);
  let (root, end) = engine.parse_rule(&mut sppf, "E", 0, true).expect("ambiguous grammar must still parse");
  assert_eq!(end, 5);
  match sppf.get(root) {
    cdtk_core::sppf::SppfNode::Symbol { packed, .. } => assert!(packed.len() >= 2, "left-recursive '+' must be genuinely ambiguous"),
    other => panic!("expected a Symbol node, got {other:?}"),
  }

  let mut arena = cdtk::Arena::new();
  let mut diags = Diagnostics::new();
  ast::convert(&mut arena, &sppf, root, &mut diags);
  assert!(diags.iter().any(|d| d.severity == Severity::Warning && d.message.contains("ambiguous parse")));
}

#[test]
fn scenario_5_invalid_regex_reports_grammar_error() {
  let cancel = CancellationToken::new();
  let mut lexer = Lexer::new(LexerOptions::new());
  lexer.add_token(TokenDefInput::new("Bad", "[A-"));
  let err = lexer.build(&cancel).unwrap_err();
  match err {
    CdtkError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "[A-"),
    other => panic!("expected InvalidPattern, got {other:?}"),
  }
}

#[test]
fn scenario_6_long_run_respects_max_parse_steps() {
  let cancel = CancellationToken::new();
  let mut g = Grammar::new();
  g.add_rule("Idents", "@Ident*").unwrap();
  g.set_start("Idents");
  g.ensure_compiled(&cancel);

  let tokens: Vec<_> = (0..1000)
    .map(|_| cdtk::TokenInstance {
      ty: cdtk_runtime::intern_lexeme("Ident"),
      lexeme: cdtk_runtime::intern_lexeme("x"),
      span: cdtk_runtime::Span::UNKNOWN,
    })
    .collect();

  let generous = cdtk::parse(&g, &tokens, ParserOptions::new().max_parse_steps(5_000_000), &cancel).unwrap();
  assert!(!generous.is_partial, "1,000 tokens must comfortably finish under the default cap");

  let starved = cdtk::parse(&g, &tokens, ParserOptions::new().max_parse_steps(10), &cancel).unwrap();
  assert!(starved.root.is_none() || starved.is_partial);
  assert!(starved.diagnostics.iter().any(|d| d.message.contains("max_parse_steps")));
}
