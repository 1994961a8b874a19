//! Bump-allocated AST and the SPPF → AST conversion pass (spec.md §4.4,
//! §8 "Arena safety").
//!
//! The converter performs a depth-first walk of the chosen SPPF
//! derivation. A [`crate::sppf::SppfNode::Symbol`] with more than one
//! packed alternative is a genuinely ambiguous span; per spec.md §4.4 we
//! emit a [`Severity::Warning`] naming the span and descend into the
//! first alternative rather than failing the whole parse.

use crate::sppf::{SppfId, SppfNode, SppfPool};
use cdtk_runtime::{Diagnostic, Diagnostics, Severity, Span, Stage};

pub type AstId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
  /// A single matched token. `span` is the token's own source span,
  /// threaded through from the SPPF terminal it was converted from.
  Terminal { type_name: String, lexeme: String, span: Span },
  /// A completed non-terminal. Fields preserve the grammar's declaration
  /// order and carry their `name:` label when the pattern gave one;
  /// unlabeled-but-kept items (a bare `@Type` or `Rule` reference with no
  /// label) keep `None` rather than being assigned a synthetic name.
  /// `span` covers every field's span combined.
  Rule { name: String, fields: Vec<(Option<String>, AstId)>, span: Span },
  /// The result of a `*`/`+` repetition. `span` covers every item's span
  /// combined, or [`Span::UNKNOWN`] for an empty list.
  List { items: Vec<AstId>, span: Span },
  /// An absent `?` repetition, or any other position that matched zero
  /// width with nothing to record.
  Empty,
}

impl AstNode {
  pub fn span(&self) -> Span {
    match self {
      AstNode::Terminal { span, .. } => *span,
      AstNode::Rule { span, .. } => *span,
      AstNode::List { span, .. } => *span,
      AstNode::Empty => Span::UNKNOWN,
    }
  }
}

/// Number of nodes held per chunk. Chosen to keep individual chunk
/// allocations small enough that `reset` (which retains them) doesn't
/// hold onto an unreasonably large block between parses.
const CHUNK_SIZE: usize = 1024;

/// Owns every [`AstNode`] produced by one [`convert`] call, in fixed-size
/// chunks (spec.md §4.4 "chunked bump allocator"). [`Arena::reset`]
/// clears chunk contents but keeps the chunk allocations for reuse by the
/// next parse; [`Arena::dispose`] drops them outright, for when the
/// caller won't be parsing again soon and wants the memory back.
/// [`AstId`]s from before a `reset` must not be used afterwards — they
/// may now index into unrelated nodes, which is exactly the aliasing the
/// safety rule requires callers to avoid.
#[derive(Debug, Default)]
pub struct Arena {
  chunks: Vec<Vec<AstNode>>,
  len: usize,
}

impl Arena {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, node: AstNode) -> AstId {
    let id = self.len as AstId;
    let chunk_idx = self.len / CHUNK_SIZE;
    if chunk_idx == self.chunks.len() {
      self.chunks.push(Vec::with_capacity(CHUNK_SIZE));
    }
    self.chunks[chunk_idx].push(node);
    self.len += 1;
    id
  }

  pub fn get(&self, id: AstId) -> &AstNode {
    let id = id as usize;
    &self.chunks[id / CHUNK_SIZE][id % CHUNK_SIZE]
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Clears every chunk's contents but keeps the chunk allocations, so
  /// the next parse's pushes reuse the existing capacity instead of
  /// reallocating.
  pub fn reset(&mut self) {
    for chunk in &mut self.chunks {
      chunk.clear();
    }
    self.len = 0;
  }

  /// Drops every chunk allocation outright. Unlike `reset`, the arena
  /// gives its memory back; the next `push` starts from zero capacity.
  pub fn dispose(&mut self) {
    self.chunks.clear();
    self.len = 0;
  }
}

/// Converts the SPPF derivation rooted at `root` (normally a `Symbol`
/// node for the grammar's start rule) into an AST in `arena`, returning
/// the root [`AstId`]. Ambiguous spans are resolved by taking the first
/// packed alternative and recorded as a [`Severity::Warning`] in `diags`.
pub fn convert(arena: &mut Arena, sppf: &SppfPool, root: SppfId, diags: &mut Diagnostics) -> AstId {
  convert_node(arena, sppf, root, diags)
}

fn combine_spans<'a>(spans: impl Iterator<Item = &'a Span>) -> Span {
  spans.fold(Span::UNKNOWN, |acc, s| acc.combine(s))
}

fn convert_node(arena: &mut Arena, sppf: &SppfPool, id: SppfId, diags: &mut Diagnostics) -> AstId {
  match sppf.get(id) {
    SppfNode::Terminal { type_name, lexeme, span, .. } => {
      arena.push(AstNode::Terminal { type_name: type_name.clone(), lexeme: lexeme.clone(), span: *span })
    }
    SppfNode::Symbol { name, packed, left, right } => {
      if packed.is_empty() {
        return arena.push(AstNode::Empty);
      }
      if packed.len() > 1 {
        diags.push(Diagnostic::new(
          Stage::Parser,
          Severity::Warning,
          format!("ambiguous parse of '{name}' over tokens [{left}, {right}): {} derivations; using the first", packed.len()),
          Span::UNKNOWN,
        ));
      }
      let fields = convert_packed_fields(arena, sppf, packed[0], diags);
      let span = combine_spans(fields.iter().map(|(_, cid)| arena.get(*cid)).map(|n| n.span()).collect::<Vec<_>>().iter());
      arena.push(AstNode::Rule { name: name.clone(), fields, span })
    }
    SppfNode::Intermediate { packed, .. } => {
      if packed.is_empty() {
        return arena.push(AstNode::Empty);
      }
      let fields = convert_packed_fields(arena, sppf, packed[0], diags);
      let items: Vec<AstId> = fields.into_iter().map(|(_, cid)| cid).collect();
      let span = combine_spans(items.iter().map(|cid| arena.get(*cid)).map(|n| n.span()).collect::<Vec<_>>().iter());
      arena.push(AstNode::List { items, span })
    }
    SppfNode::Packed { .. } => {
      let fields = convert_packed_fields(arena, sppf, id, diags);
      let items: Vec<AstId> = fields.into_iter().map(|(_, cid)| cid).collect();
      let span = combine_spans(items.iter().map(|cid| arena.get(*cid)).map(|n| n.span()).collect::<Vec<_>>().iter());
      arena.push(AstNode::List { items, span })
    }
  }
}

fn convert_packed_fields(arena: &mut Arena, sppf: &SppfPool, packed_id: SppfId, diags: &mut Diagnostics) -> Vec<(Option<String>, AstId)> {
  let SppfNode::Packed { fields, .. } = sppf.get(packed_id) else {
    unreachable!("convert_packed_fields called on a non-Packed node");
  };
  let fields = fields.clone();
  fields.into_iter().map(|(label, child)| (label, convert_field_value(arena, sppf, child, diags))).collect()
}

/// Converts one field's contribution. A bare (unlabeled, non-`Symbol`)
/// `Packed` reaching here is either an `Optional` wrapper — exactly one
/// unlabeled field, unwrapped transparently so `a?` surfaces as `a`
/// itself rather than a one-element list — or the anonymous combination
/// of a nested `Sequence`/`Repeat`, which becomes a [`AstNode::List`].
fn convert_field_value(arena: &mut Arena, sppf: &SppfPool, id: SppfId, diags: &mut Diagnostics) -> AstId {
  if let SppfNode::Packed { fields, .. } = sppf.get(id) {
    match fields.len() {
      0 => return arena.push(AstNode::Empty),
      1 if fields[0].0.is_none() => {
        let inner = fields[0].1;
        return convert_field_value(arena, sppf, inner, diags);
      }
      _ => {}
    }
  }
  convert_node(arena, sppf, id, diags)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sppf::SppfPool;

  #[test]
  fn builds_named_fields_dropping_unlabeled_literal() {
    // Mirrors spec.md §8's worked example: `Expr{left:Number("3"),
    // right:Number("5")}`, with the `+` token already excluded upstream
    // by `parser::combine` (it is never given to the SPPF as a field).
    let mut sppf = SppfPool::new();
    let left = sppf.make_terminal("Number".into(), "3".into(), 0, 1, Span::new(0, 1, 1, 1));
    let right = sppf.make_terminal("Number".into(), "5".into(), 2, 3, Span::new(4, 1, 1, 5));
    let packed = sppf.make_packed(3, vec![(Some("left".into()), left), (Some("right".into()), right)]);
    let sym = sppf.get_or_create_symbol("Expr", 0, 3);
    sppf.add_alternative(sym, packed);

    let mut arena = Arena::new();
    let mut diags = Diagnostics::new();
    let root = convert(&mut arena, &sppf, sym, &mut diags);

    match arena.get(root) {
      AstNode::Rule { name, fields, span } => {
        assert_eq!(name, "Expr");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0.as_deref(), Some("left"));
        assert!(!span.is_unknown(), "rule span should combine its fields' spans");
        match arena.get(fields[0].1) {
          AstNode::Terminal { type_name, lexeme, span } => {
            assert_eq!(type_name, "Number");
            assert_eq!(lexeme, "3");
            assert_eq!(*span, Span::new(0, 1, 1, 1));
          }
          other => panic!("expected terminal, got {other:?}"),
        }
      }
      other => panic!("expected rule, got {other:?}"),
    }
    assert!(diags.is_empty());
  }

  #[test]
  fn ambiguous_symbol_warns_and_picks_first_alternative() {
    let mut sppf = SppfPool::new();
    let a = sppf.make_terminal("A".into(), "a".into(), 0, 1, Span::new(0, 1, 1, 1));
    let b = sppf.make_terminal("B".into(), "b".into(), 0, 1, Span::new(0, 1, 1, 1));
    let p1 = sppf.make_packed(1, vec![(None, a)]);
    let p2 = sppf.make_packed(1, vec![(None, b)]);
    let sym = sppf.get_or_create_symbol("Ambiguous", 0, 1);
    sppf.add_alternative(sym, p1);
    sppf.add_alternative(sym, p2);

    let mut arena = Arena::new();
    let mut diags = Diagnostics::new();
    let root = convert(&mut arena, &sppf, sym, &mut diags);

    assert!(diags.has_errors() == false && !diags.is_empty());
    match arena.get(root) {
      AstNode::Rule { fields, .. } => match arena.get(fields[0].1) {
        AstNode::Terminal { type_name, .. } => assert_eq!(type_name, "A"),
        other => panic!("expected terminal, got {other:?}"),
      },
      other => panic!("expected rule, got {other:?}"),
    }
  }

  #[test]
  fn reset_clears_arena_for_reuse() {
    let mut arena = Arena::new();
    arena.push(AstNode::Empty);
    arena.push(AstNode::Empty);
    assert_eq!(arena.len(), 2);
    arena.reset();
    assert!(arena.is_empty());
    let id = arena.push(AstNode::Terminal { type_name: "X".into(), lexeme: "y".into(), span: Span::UNKNOWN });
    assert_eq!(id, 0, "post-reset allocation reuses the low index with fresh content");
  }

  #[test]
  fn reset_keeps_chunk_capacity_but_dispose_drops_it() {
    let mut arena = Arena::new();
    for _ in 0..(CHUNK_SIZE + 1) {
      arena.push(AstNode::Empty);
    }
    assert_eq!(arena.chunks.len(), 2, "should have spilled into a second chunk");
    arena.reset();
    assert_eq!(arena.chunks.len(), 2, "reset keeps chunk allocations for reuse");
    assert!(arena.is_empty());
    arena.dispose();
    assert!(arena.chunks.is_empty(), "dispose drops chunk allocations outright");
  }

  #[test]
  fn ids_remain_stable_across_a_chunk_boundary() {
    let mut arena = Arena::new();
    let mut ids = Vec::new();
    for i in 0..(CHUNK_SIZE + 5) {
      ids.push(arena.push(AstNode::Terminal { type_name: "N".into(), lexeme: i.to_string(), span: Span::UNKNOWN }));
    }
    for (i, id) in ids.iter().enumerate() {
      match arena.get(*id) {
        AstNode::Terminal { lexeme, .. } => assert_eq!(lexeme, &i.to_string()),
        other => panic!("expected terminal, got {other:?}"),
      }
    }
  }
}
