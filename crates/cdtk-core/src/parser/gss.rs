//! Graph-structured stack (spec.md §4.3): nodes keyed by `(label,
//! input_pos)`, edges deduplicated by `(target, fragment)`.

use crate::sppf::SppfId;
use std::collections::{HashMap, HashSet};

pub type GssId = u32;

#[derive(Debug, Clone)]
pub struct GssNode {
  pub label: u64,
  pub pos:   u32,
}

#[derive(Debug, Default)]
pub struct Gss {
  nodes: Vec<GssNode>,
  index: HashMap<(u64, u32), GssId>,
  edges: HashMap<GssId, Vec<(GssId, Option<SppfId>)>>,
  edge_seen: HashSet<(GssId, GssId, Option<SppfId>)>,
}

impl Gss {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_create(&mut self, label: u64, pos: u32) -> GssId {
    if let Some(&id) = self.index.get(&(label, pos)) {
      return id;
    }
    let id = self.nodes.len() as GssId;
    self.nodes.push(GssNode { label, pos });
    self.index.insert((label, pos), id);
    id
  }

  /// Adds an edge `from -> to` carrying `fragment`. Returns `true` if
  /// this is a new edge (the caller should enqueue an entry descriptor
  /// for `from` only the first time it is created).
  pub fn add_edge(&mut self, from: GssId, to: GssId, fragment: Option<SppfId>) -> bool {
    if !self.edge_seen.insert((from, to, fragment)) {
      return false;
    }
    self.edges.entry(from).or_default().push((to, fragment));
    true
  }

  pub fn edges_from(&self, id: GssId) -> &[(GssId, Option<SppfId>)] {
    self.edges.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn node(&self, id: GssId) -> &GssNode {
    &self.nodes[id as usize]
  }

  pub fn max_depth(&self) -> usize {
    // Longest chain of outgoing edges from any node; a coarse depth proxy
    // used by the escalation heuristic (spec.md §4.3).
    fn depth(gss: &Gss, id: GssId, memo: &mut HashMap<GssId, usize>) -> usize {
      if let Some(&d) = memo.get(&id) {
        return d;
      }
      memo.insert(id, 0); // cycle guard
      let d = 1 + gss.edges_from(id).iter().map(|(to, _)| depth(gss, *to, memo)).max().unwrap_or(0);
      memo.insert(id, d);
      d
    }
    let mut memo = HashMap::new();
    (0..self.nodes.len() as GssId).map(|id| depth(self, id, &mut memo)).max().unwrap_or(0)
  }
}
