//! ALL(*) adaptive lookahead predictor (spec.md §4.3).

use crate::grammar::analysis::Terminal;
use crate::grammar::expr::Expr;
use crate::grammar::Grammar;
use crate::scanner::TokenInstance;
use std::collections::HashSet;

/// Deepest lookahead the predictor will expand to before giving up and
/// calling the choice point genuinely ambiguous (spec.md §4.3: "cap at
/// 30 tokens").
pub const MAX_LOOKAHEAD: usize = 30;

pub enum PredictResult {
  Committed(usize),
  /// Prediction could not narrow to one alternative; carries the
  /// surviving candidate indices and the deepest lookahead tried.
  Failed(Vec<usize>, usize),
}

fn first_k(expr: &Expr, grammar: &Grammar, k: usize, visiting: &mut HashSet<String>) -> HashSet<Vec<Terminal>> {
  if k == 0 {
    return std::iter::once(Vec::new()).collect();
  }
  match expr {
    Expr::TerminalLiteral(s) => std::iter::once(vec![Terminal::Literal(s.clone())]).collect(),
    Expr::TerminalType(s) => std::iter::once(vec![Terminal::Type(s.clone())]).collect(),
    Expr::NonTerminal(n) => {
      if !visiting.insert(n.clone()) {
        return HashSet::new();
      }
      let out = match grammar.rules.get(n) {
        Some(rule) => {
          let alts = super::alternatives(&rule.expr);
          alts.iter().flat_map(|a| first_k(a, grammar, k, visiting)).collect()
        }
        None => HashSet::new(),
      };
      visiting.remove(n);
      out
    }
    Expr::Sequence(items) => {
      let mut prefixes: HashSet<Vec<Terminal>> = std::iter::once(Vec::new()).collect();
      for item in items {
        if prefixes.iter().all(|p| p.len() >= k) {
          break;
        }
        let mut next = HashSet::new();
        for p in &prefixes {
          if p.len() >= k {
            next.insert(p.clone());
            continue;
          }
          let remaining = k - p.len();
          let item_firsts = first_k(item, grammar, remaining, visiting);
          if item_firsts.is_empty() {
            next.insert(p.clone());
            continue;
          }
          for f in item_firsts {
            let mut np = p.clone();
            np.extend(f);
            next.insert(np);
          }
        }
        prefixes = next;
      }
      prefixes
    }
    Expr::Choice(alts) => alts.iter().flat_map(|a| first_k(a, grammar, k, visiting)).collect(),
    Expr::Repeat(inner, min, _) => {
      let mut out = HashSet::new();
      if *min == 0 {
        out.insert(Vec::new());
      }
      out.extend(first_k(inner, grammar, k, visiting));
      out
    }
    Expr::Optional(inner) => {
      let mut out = first_k(inner, grammar, k, visiting);
      out.insert(Vec::new());
      out
    }
    Expr::Named(_, inner) => first_k(inner, grammar, k, visiting),
  }
}

fn terminal_matches_token(term: &Terminal, token: &TokenInstance) -> bool {
  match term {
    Terminal::Type(t) => token.type_str() == *t,
    Terminal::Literal(l) => token.lexeme_str() == *l,
    Terminal::Eof => false,
  }
}

fn prefix_consistent(prefix: &[Terminal], tokens: &[TokenInstance], pos: usize) -> bool {
  for (i, term) in prefix.iter().enumerate() {
    match tokens.get(pos + i) {
      Some(tok) => {
        if !terminal_matches_token(term, tok) {
          return false;
        }
      }
      None => return matches!(term, Terminal::Eof),
    }
  }
  true
}

/// Step 1-3 of spec.md §4.3's ALL(*) predictive path.
pub fn predict(alts: &[Expr], grammar: &Grammar, tokens: &[TokenInstance], pos: usize) -> PredictResult {
  let mut viable: Vec<usize> = (0..alts.len()).collect();
  let mut prev: Option<Vec<usize>> = None;
  let mut deepest = 0;

  for k in 1..=MAX_LOOKAHEAD {
    deepest = k;
    let mut next_viable = Vec::new();
    for &idx in &viable {
      let mut visiting = HashSet::new();
      let prefixes = first_k(&alts[idx], grammar, k, &mut visiting);
      if prefixes.iter().any(|p| prefix_consistent(p, tokens, pos)) {
        next_viable.push(idx);
      }
    }

    if next_viable.is_empty() {
      // Safe fallback per spec.md §4.3 step 1: nothing survived this
      // round's intersection, so keep the previous round's candidates
      // rather than pruning the choice point to nothing.
      return PredictResult::Failed(viable, deepest);
    }
    if next_viable.len() == 1 {
      return PredictResult::Committed(next_viable[0]);
    }
    if prev.as_deref() == Some(next_viable.as_slice()) {
      break;
    }
    prev = Some(next_viable.clone());
    viable = next_viable;
  }

  PredictResult::Failed(viable, deepest)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::Grammar;

  #[test]
  fn commits_when_first_token_disambiguates() {
    let mut g = Grammar::new();
    g.add_rule("Item", "@Number | @Ident").unwrap();
    let alts = super::super::alternatives(&g.rules["Item"].expr);
    let tokens = vec![tok("Number", "3")];
    match predict(&alts, &g, &tokens, 0) {
      PredictResult::Committed(0) => {}
      _ => panic!("expected alt 0 to be committed"),
    }
  }

  fn tok(ty: &str, lexeme: &str) -> TokenInstance {
    TokenInstance { ty: cdtk_runtime::intern_lexeme(ty), lexeme: cdtk_runtime::intern_lexeme(lexeme), span: cdtk_runtime::Span::UNKNOWN }
  }
}
