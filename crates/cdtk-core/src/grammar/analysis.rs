//! Nullability, FIRST/FOLLOW, reachability, and left-recursion analysis
//! (spec.md §4.2).

use super::{expr::Expr, Grammar};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Terminal {
  Type(String),
  Literal(String),
  Eof,
}

pub type NullableMap = HashMap<String, bool>;
pub type FirstMap = HashMap<String, BTreeSet<Terminal>>;
pub type FollowMap = HashMap<String, BTreeSet<Terminal>>;

/// Fixed-point nullability over every rule (spec.md §4.2).
pub fn compute_nullable(grammar: &Grammar) -> NullableMap {
  let mut nullable: NullableMap = grammar.rules.keys().map(|k| (k.clone(), false)).collect();
  loop {
    let mut changed = false;
    for (name, rule) in grammar.rules.iter() {
      let n = is_nullable_expr(&rule.expr, &nullable);
      if n && !nullable[name] {
        nullable.insert(name.clone(), true);
        changed = true;
      }
    }
    if !changed {
      break;
    }
  }
  nullable
}

pub fn is_nullable_expr(expr: &Expr, nullable: &NullableMap) -> bool {
  match expr {
    Expr::TerminalLiteral(_) | Expr::TerminalType(_) => false,
    Expr::NonTerminal(n) => *nullable.get(n).unwrap_or(&false),
    Expr::Sequence(items) => items.iter().all(|i| is_nullable_expr(i, nullable)),
    Expr::Choice(alts) => alts.iter().any(|a| is_nullable_expr(a, nullable)),
    Expr::Repeat(_, min, _) => *min == 0,
    Expr::Optional(_) => true,
    Expr::Named(_, inner) => is_nullable_expr(inner, nullable),
  }
}

/// Fixed-point FIRST sets over every rule (spec.md §4.2). FIRST only ever
/// grows across iterations, which is also the basis for the "adding a
/// rule never shrinks FIRST/FOLLOW" testable property (spec.md §8).
pub fn compute_first(grammar: &Grammar, nullable: &NullableMap) -> FirstMap {
  let mut first: FirstMap = grammar.rules.keys().map(|k| (k.clone(), BTreeSet::new())).collect();
  loop {
    let mut changed = false;
    for (name, rule) in grammar.rules.iter() {
      let computed = first_of(&rule.expr, nullable, &first);
      let entry = first.get_mut(name).unwrap();
      let before = entry.len();
      entry.extend(computed);
      if entry.len() != before {
        changed = true;
      }
    }
    if !changed {
      break;
    }
  }
  first
}

pub fn first_of(expr: &Expr, nullable: &NullableMap, first: &FirstMap) -> BTreeSet<Terminal> {
  match expr {
    Expr::TerminalLiteral(s) => std::iter::once(Terminal::Literal(s.clone())).collect(),
    Expr::TerminalType(s) => std::iter::once(Terminal::Type(s.clone())).collect(),
    Expr::NonTerminal(n) => first.get(n).cloned().unwrap_or_default(),
    Expr::Sequence(items) => {
      let mut out = BTreeSet::new();
      for item in items {
        out.extend(first_of(item, nullable, first));
        if !is_nullable_expr(item, nullable) {
          break;
        }
      }
      out
    }
    Expr::Choice(alts) => alts.iter().flat_map(|a| first_of(a, nullable, first)).collect(),
    Expr::Repeat(inner, ..) => first_of(inner, nullable, first),
    Expr::Optional(inner) => first_of(inner, nullable, first),
    Expr::Named(_, inner) => first_of(inner, nullable, first),
  }
}

/// Fixed-point FOLLOW sets over every rule (spec.md §4.2). `start`'s
/// FOLLOW always contains EOF.
pub fn compute_follow(grammar: &Grammar, nullable: &NullableMap, first: &FirstMap, start: &str) -> FollowMap {
  let mut follow: FollowMap = grammar.rules.keys().map(|k| (k.clone(), BTreeSet::new())).collect();
  if let Some(set) = follow.get_mut(start) {
    set.insert(Terminal::Eof);
  }
  loop {
    let mut changed = false;
    for (name, rule) in grammar.rules.iter() {
      let outer_first = BTreeSet::new();
      changed |= follow_walk(&rule.expr, name, &outer_first, false, nullable, first, &mut follow);
    }
    if !changed {
      break;
    }
  }
  follow
}

fn follow_walk(
  expr: &Expr,
  owner: &str,
  suffix_first: &BTreeSet<Terminal>,
  suffix_nullable: bool,
  nullable: &NullableMap,
  first: &FirstMap,
  follow: &mut FollowMap,
) -> bool {
  match expr {
    Expr::TerminalLiteral(_) | Expr::TerminalType(_) => false,
    Expr::NonTerminal(n) => {
      let mut changed = false;
      let before = follow.get(n).map(|s| s.len()).unwrap_or(0);
      {
        let entry = follow.entry(n.clone()).or_default();
        entry.extend(suffix_first.iter().cloned());
      }
      if suffix_nullable {
        let owner_follow = follow.get(owner).cloned().unwrap_or_default();
        let entry = follow.entry(n.clone()).or_default();
        entry.extend(owner_follow);
      }
      if follow.get(n).map(|s| s.len()).unwrap_or(0) != before {
        changed = true;
      }
      changed
    }
    Expr::Named(_, inner) => follow_walk(inner, owner, suffix_first, suffix_nullable, nullable, first, follow),
    Expr::Optional(inner) => follow_walk(inner, owner, suffix_first, suffix_nullable, nullable, first, follow),
    Expr::Repeat(inner, ..) => {
      let mut inner_first = first_of(inner, nullable, first);
      inner_first.extend(suffix_first.iter().cloned());
      follow_walk(inner, owner, &inner_first, suffix_nullable, nullable, first, follow)
    }
    Expr::Choice(alts) => {
      let mut changed = false;
      for alt in alts {
        changed |= follow_walk(alt, owner, suffix_first, suffix_nullable, nullable, first, follow);
      }
      changed
    }
    Expr::Sequence(items) => {
      let mut changed = false;
      let mut acc_first = suffix_first.clone();
      let mut acc_nullable = suffix_nullable;
      for item in items.iter().rev() {
        changed |= follow_walk(item, owner, &acc_first, acc_nullable, nullable, first, follow);
        let item_nullable = is_nullable_expr(item, nullable);
        let item_first = first_of(item, nullable, first);
        if item_nullable {
          acc_first.extend(item_first);
          // acc_nullable stays: nullable(item . rest) = nullable(item) && nullable(rest)
          acc_nullable = acc_nullable && true;
        } else {
          acc_first = item_first;
          acc_nullable = false;
        }
      }
      changed
    }
  }
}

/// The set of non-terminals an expression can start with, following
/// through items while every prior item is nullable (spec.md §4.2 "left
/// edge relation").
pub fn left_edge(expr: &Expr, nullable: &NullableMap, out: &mut HashSet<String>) {
  match expr {
    Expr::TerminalLiteral(_) | Expr::TerminalType(_) => {}
    Expr::NonTerminal(n) => {
      out.insert(n.clone());
    }
    Expr::Sequence(items) => {
      for item in items {
        left_edge(item, nullable, out);
        if !is_nullable_expr(item, nullable) {
          break;
        }
      }
    }
    Expr::Choice(alts) => {
      for alt in alts {
        left_edge(alt, nullable, out);
      }
    }
    Expr::Repeat(inner, ..) | Expr::Optional(inner) => left_edge(inner, nullable, out),
    Expr::Named(_, inner) => left_edge(inner, nullable, out),
  }
}

/// Every non-terminal, token type, and literal referenced anywhere in
/// `expr` (used by validation).
pub fn collect_references(expr: &Expr, nonterms: &mut HashSet<String>, tokens: &mut HashSet<String>, literals: &mut HashSet<String>) {
  match expr {
    Expr::TerminalLiteral(s) => {
      literals.insert(s.clone());
    }
    Expr::TerminalType(s) => {
      tokens.insert(s.clone());
    }
    Expr::NonTerminal(n) => {
      nonterms.insert(n.clone());
    }
    Expr::Sequence(items) | Expr::Choice(items) => {
      for item in items {
        collect_references(item, nonterms, tokens, literals);
      }
    }
    Expr::Repeat(inner, ..) | Expr::Optional(inner) => collect_references(inner, nonterms, tokens, literals),
    Expr::Named(_, inner) => collect_references(inner, nonterms, tokens, literals),
  }
}

/// BFS reachability from `start`; rules not in the returned set are
/// unreachable (spec.md §4.2, §7).
pub fn reachable_from(grammar: &Grammar, start: &str) -> HashSet<String> {
  let mut seen = HashSet::new();
  let mut queue = vec![start.to_string()];
  seen.insert(start.to_string());
  while let Some(name) = queue.pop() {
    let Some(rule) = grammar.rules.get(&name) else { continue };
    let mut nonterms = HashSet::new();
    let mut tokens = HashSet::new();
    let mut literals = HashSet::new();
    collect_references(&rule.expr, &mut nonterms, &mut tokens, &mut literals);
    for n in nonterms {
      if seen.insert(n.clone()) {
        queue.push(n);
      }
    }
  }
  seen
}

/// One left-recursion cycle: the sequence of rule names forming the back
/// edge (spec.md §4.2, §8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeftRecursionCycle(pub Vec<String>);

/// Finds strongly-connected components on the left-edge graph with size
/// > 1, plus direct self-loops, reporting each as a cycle. Used both to
/// flag indirect/mutual left recursion (reported, not rewritten per
/// spec.md §4.2) and to find candidates for direct-left-recursion
/// elimination.
pub fn detect_left_recursion(grammar: &Grammar, nullable: &NullableMap) -> Vec<LeftRecursionCycle> {
  let mut graph: HashMap<String, HashSet<String>> = HashMap::new();
  for (name, rule) in grammar.rules.iter() {
    let mut edges = HashSet::new();
    left_edge(&rule.expr, nullable, &mut edges);
    graph.insert(name.clone(), edges);
  }

  let mut cycles = Vec::new();
  let nodes: Vec<String> = grammar.rules.keys().cloned().collect();

  // Tarjan's SCC algorithm.
  let mut index_counter = 0usize;
  let mut stack = Vec::new();
  let mut on_stack: HashSet<String> = HashSet::new();
  let mut indices: HashMap<String, usize> = HashMap::new();
  let mut lowlink: HashMap<String, usize> = HashMap::new();
  let mut sccs: Vec<Vec<String>> = Vec::new();

  fn strongconnect(
    v: &str,
    graph: &HashMap<String, HashSet<String>>,
    index_counter: &mut usize,
    stack: &mut Vec<String>,
    on_stack: &mut HashSet<String>,
    indices: &mut HashMap<String, usize>,
    lowlink: &mut HashMap<String, usize>,
    sccs: &mut Vec<Vec<String>>,
  ) {
    indices.insert(v.to_string(), *index_counter);
    lowlink.insert(v.to_string(), *index_counter);
    *index_counter += 1;
    stack.push(v.to_string());
    on_stack.insert(v.to_string());

    if let Some(succs) = graph.get(v) {
      for w in succs {
        if !indices.contains_key(w) {
          strongconnect(w, graph, index_counter, stack, on_stack, indices, lowlink, sccs);
          let wl = lowlink[w];
          let vl = lowlink[v];
          lowlink.insert(v.to_string(), vl.min(wl));
        } else if on_stack.contains(w) {
          let wi = indices[w];
          let vl = lowlink[v];
          lowlink.insert(v.to_string(), vl.min(wi));
        }
      }
    }

    if lowlink[v] == indices[v] {
      let mut scc = Vec::new();
      loop {
        let w = stack.pop().unwrap();
        on_stack.remove(&w);
        let is_v = w == v;
        scc.push(w);
        if is_v {
          break;
        }
      }
      sccs.push(scc);
    }
  }

  for node in &nodes {
    if !indices.contains_key(node) {
      strongconnect(node, &graph, &mut index_counter, &mut stack, &mut on_stack, &mut indices, &mut lowlink, &mut sccs);
    }
  }

  for scc in sccs {
    if scc.len() > 1 {
      cycles.push(LeftRecursionCycle(scc));
    } else {
      let only = &scc[0];
      if graph.get(only).map(|s| s.contains(only)).unwrap_or(false) {
        cycles.push(LeftRecursionCycle(vec![only.clone()]));
      }
    }
  }

  cycles
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::Grammar;

  fn g(rules: &[(&str, &str)]) -> Grammar {
    let mut g = Grammar::new();
    for (name, pat) in rules {
      g.add_rule(name, pat).unwrap();
    }
    g
  }

  #[test]
  fn nullable_fixed_point() {
    let grammar = g(&[("A", "B | 'x'"), ("B", "")]);
    let nullable = compute_nullable(&grammar);
    assert!(nullable["B"]);
    assert!(nullable["A"]);
  }

  #[test]
  fn first_follow_of_simple_expr_rule() {
    let grammar = g(&[("Expr", "@Number '+' @Number")]);
    let nullable = compute_nullable(&grammar);
    let first = compute_first(&grammar, &nullable);
    assert!(first["Expr"].contains(&Terminal::Type("Number".into())));
    let follow = compute_follow(&grammar, &nullable, &first, "Expr");
    assert!(follow["Expr"].contains(&Terminal::Eof));
  }

  #[test]
  fn detects_direct_left_recursion() {
    let grammar = g(&[("List", "List ',' @Ident | @Ident")]);
    let nullable = compute_nullable(&grammar);
    let cycles = detect_left_recursion(&grammar, &nullable);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].0, vec!["List".to_string()]);
  }

  #[test]
  fn detects_indirect_left_recursion() {
    let grammar = g(&[("A", "B"), ("B", "A 'x'")]);
    let nullable = compute_nullable(&grammar);
    let cycles = detect_left_recursion(&grammar, &nullable);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].0.len(), 2);
  }

  #[test]
  fn adding_a_rule_never_shrinks_first_or_follow() {
    let g1 = g(&[("Expr", "@Number '+' @Number")]);
    let n1 = compute_nullable(&g1);
    let f1 = compute_first(&g1, &n1);
    let fo1 = compute_follow(&g1, &n1, &f1, "Expr");

    let mut g2 = g1.clone();
    g2.add_rule("Unused", "@Ident").unwrap();
    let n2 = compute_nullable(&g2);
    let f2 = compute_first(&g2, &n2);
    let fo2 = compute_follow(&g2, &n2, &f2, "Expr");

    assert!(f1["Expr"].is_subset(&f2["Expr"]));
    assert!(fo1["Expr"].is_subset(&fo2["Expr"]));
  }
}
