//! Shared Packed Parse Forest node pool (spec.md §3, §4.3, §4.4).
//!
//! Symbol and Intermediate nodes are keyed by `(name|label, left, right)`
//! and deduplicated through [`SppfPool`]; every derivation of the same
//! span becomes an additional [`SppfNode::Packed`] alternative under the
//! shared node, which is how ambiguity is recorded (spec.md §8, "SPPF
//! sharing").
//!
//! One generalisation from the literal spec shape: `Packed` here holds an
//! n-ary `fields` list (`Vec<(Option<String>, SppfId)>`) rather than a
//! fixed `leftChild`/`rightChild` pair wired through a binary `_seq`
//! Intermediate chain. Real grammars in this domain routinely have
//! sequences of more than two items (`@Number '+' @Number` is already
//! three), and threading those through a strictly binary Intermediate
//! chain adds bookkeeping without changing the derivations represented or
//! the ambiguity semantics at Symbol nodes — see DESIGN.md.

use cdtk_runtime::Span;
use std::collections::HashMap;

pub type SppfId = u32;

#[derive(Debug, Clone)]
pub enum SppfNode {
  /// A single matched token. `span` is the token's own source span
  /// (spec.md §4.4: "span is the token span"), distinct from `left`/
  /// `right`, which are token-index positions used by the rest of the
  /// forest for span arithmetic over the token stream.
  Terminal { type_name: String, lexeme: String, left: u32, right: u32, span: Span },
  /// A completed parse of a non-terminal over `[left, right)`. `packed`
  /// holds one entry per distinct derivation; more than one means the
  /// parse was ambiguous at this span.
  Symbol { name: String, left: u32, right: u32, packed: Vec<SppfId> },
  /// An anonymous intermediate span, used for partially-built sequences
  /// under GLL (kept for fidelity with spec.md's node-kind vocabulary;
  /// the ALL(*) and current GLL combiner build `Packed` nodes directly).
  Intermediate { label: String, left: u32, right: u32, packed: Vec<SppfId> },
  /// One derivation: the ordered, already-filtered set of child
  /// contributions (named captures keep their label; unlabeled literal
  /// terminals are dropped before reaching here — see
  /// `parser::combine::sequence_fields`).
  Packed { pivot: u32, fields: Vec<(Option<String>, SppfId)> },
}

impl SppfNode {
  pub fn span(&self) -> (u32, u32) {
    match self {
      SppfNode::Terminal { left, right, .. } => (*left, *right),
      SppfNode::Symbol { left, right, .. } => (*left, *right),
      SppfNode::Intermediate { left, right, .. } => (*left, *right),
      SppfNode::Packed { .. } => (0, 0),
    }
  }
}

#[derive(Debug, Default)]
pub struct SppfPool {
  nodes: Vec<SppfNode>,
  symbol_index: HashMap<(String, u32, u32), SppfId>,
}

impl SppfPool {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: SppfId) -> &SppfNode {
    &self.nodes[id as usize]
  }

  pub fn make_terminal(&mut self, type_name: String, lexeme: String, left: u32, right: u32, span: Span) -> SppfId {
    let id = self.nodes.len() as SppfId;
    self.nodes.push(SppfNode::Terminal { type_name, lexeme, left, right, span });
    id
  }

  pub fn make_packed(&mut self, pivot: u32, fields: Vec<(Option<String>, SppfId)>) -> SppfId {
    let id = self.nodes.len() as SppfId;
    self.nodes.push(SppfNode::Packed { pivot, fields });
    id
  }

  /// Returns the existing Symbol node for `(name, left, right)` if one
  /// exists, else creates an empty one. Enforces the "no two Symbol
  /// nodes with identical (symbol, left, right)" invariant (spec.md §8).
  pub fn get_or_create_symbol(&mut self, name: &str, left: u32, right: u32) -> SppfId {
    let key = (name.to_string(), left, right);
    if let Some(&id) = self.symbol_index.get(&key) {
      return id;
    }
    let id = self.nodes.len() as SppfId;
    self.nodes.push(SppfNode::Symbol { name: name.to_string(), left, right, packed: Vec::new() });
    self.symbol_index.insert(key, id);
    id
  }

  /// Appends `packed` as a derivation of `symbol`, skipping the append if
  /// an equivalent alternative (same field ids) is already present.
  pub fn add_alternative(&mut self, symbol: SppfId, packed: SppfId) {
    if let SppfNode::Symbol { packed: alts, .. } = &mut self.nodes[symbol as usize] {
      if !alts.contains(&packed) {
        alts.push(packed);
      }
    }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn symbol_nodes_are_shared_by_span() {
    let mut pool = SppfPool::new();
    let a = pool.get_or_create_symbol("Expr", 0, 3);
    let b = pool.get_or_create_symbol("Expr", 0, 3);
    assert_eq!(a, b);
    let c = pool.get_or_create_symbol("Expr", 0, 4);
    assert_ne!(a, c);
  }

  #[test]
  fn ambiguous_derivations_become_multiple_packed_alternatives() {
    let mut pool = SppfPool::new();
    let sym = pool.get_or_create_symbol("E", 0, 5);
    let p1 = pool.make_packed(1, vec![]);
    let p2 = pool.make_packed(3, vec![]);
    pool.add_alternative(sym, p1);
    pool.add_alternative(sym, p2);
    match pool.get(sym) {
      SppfNode::Symbol { packed, .. } => assert_eq!(packed.len(), 2),
      _ => panic!("expected symbol"),
    }
  }

  #[test]
  fn terminal_carries_its_own_source_span() {
    let mut pool = SppfPool::new();
    let span = Span::new(4, 2, 1, 5);
    let id = pool.make_terminal("Number".into(), "42".into(), 0, 1, span);
    match pool.get(id) {
      SppfNode::Terminal { span: s, .. } => assert_eq!(*s, span),
      _ => panic!("expected terminal"),
    }
  }
}
