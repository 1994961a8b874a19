//! Shared helpers for turning a rule body's [`Expr`] into the ordered,
//! labelled field list the AST converter expects, and for matching a
//! terminal `Expr` node against a concrete token (spec.md §4.2, §4.4:
//! "Named captures... propagate through the Sequence combiner").

use crate::grammar::expr::Expr;
use crate::scanner::TokenInstance;

/// One item of a flattened rule-body sequence, together with whether it
/// should surface as an AST field. Unlabeled literal terminals (bare
/// punctuation like `'+'`) are matched but dropped from the AST per the
/// worked example in spec.md §8 (`Expr{left, right}` drops the `+`).
pub struct SeqItem {
  pub label: Option<String>,
  pub expr:  Expr,
  pub keep:  bool,
}

/// Flattens a rule body (which may be a bare `Expr` if `parse_sequence`
/// collapsed a single-item sequence, or an explicit `Sequence`) into its
/// ordered item list.
pub fn seq_items(expr: &Expr) -> Vec<SeqItem> {
  match expr {
    Expr::Sequence(items) => items.iter().map(label_and_strip).collect(),
    other => vec![label_and_strip(other)],
  }
}

fn label_and_strip(e: &Expr) -> SeqItem {
  match e {
    Expr::Named(label, inner) => SeqItem { label: Some(label.clone()), expr: (**inner).clone(), keep: true },
    Expr::TerminalLiteral(lit) => SeqItem { label: None, expr: Expr::TerminalLiteral(lit.clone()), keep: false },
    other => SeqItem { label: None, expr: other.clone(), keep: true },
  }
}

pub fn expr_matches_token(expr: &Expr, token: &TokenInstance) -> bool {
  match expr {
    Expr::TerminalType(name) => token.type_str() == *name,
    Expr::TerminalLiteral(lit) => token.lexeme_str() == *lit,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drops_unlabeled_literals_but_keeps_named_ones() {
    let expr = Expr::Sequence(vec![
      Expr::TerminalType("Number".into()),
      Expr::TerminalLiteral("+".into()),
      Expr::Named("op".into(), Box::new(Expr::TerminalLiteral("+".into()))),
    ]);
    let items = seq_items(&expr);
    assert_eq!(items.iter().filter(|i| i.keep).count(), 2);
    assert_eq!(items[2].label.as_deref(), Some("op"));
  }
}
