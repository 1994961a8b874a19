//! Worklist GLL engine: the general fallback invoked when the ALL(*)
//! predictor cannot uniquely disambiguate a choice point (spec.md §4.3).
//!
//! Descriptors are represented as continuation-passing work items rather
//! than literal `(grammar_slot_label, ...)` tuples over a flattened
//! instruction list: `Cont` is a persistent (`Rc`-shared) linked list of
//! "what to do when the current sub-expression finishes", and a GSS
//! node's identity is the pointer identity of the `Cont` its caller will
//! resume into plus the input position — this is the standard
//! continuation-passing formulation of GLL (Afroozeh & Izmaylova) and is
//! equivalent to the slot-label formulation for tree-shaped grammar IR.
//! See DESIGN.md for the tradeoff against the letter-of-the-spec binary
//! `_seq` Intermediate chaining.

use super::combine::{self, SeqItem};
use super::gss::{Gss, GssId};
use crate::grammar::expr::Expr;
use crate::grammar::Grammar;
use crate::scanner::TokenInstance;
use crate::sppf::{SppfId, SppfPool};
use cdtk_runtime::CancellationToken;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Hard cap on descriptors processed in one GLL invocation (spec.md
/// §4.3: "iteration cap (1,000,000)... emits an Error diagnostic and
/// aborts").
pub const GLL_ITERATION_CAP: usize = 1_000_000;

enum Cont {
  PopRule { rule: Rc<str>, entry_pos: u32 },
  Seq { items: Rc<[SeqItem]>, idx: usize, collected: Vec<(Option<String>, SppfId)>, next: Rc<Cont> },
  Repeat { inner: Rc<Expr>, min: u32, max: Option<u32>, count: u32, collected: Vec<SppfId>, next: Rc<Cont> },
}

enum WorkItem {
  Parse { expr: Rc<Expr>, cont: Rc<Cont>, gss: GssId, pos: u32 },
  Resume { cont: Rc<Cont>, id: SppfId, gss: GssId, pos: u32 },
}

/// Persists across escalations within one top-level `Parse` call so that
/// "parsing the same rule at the same position" really does short-circuit
/// to a cached result (spec.md §4.3 "GLL result caching").
pub struct GllEngine<'a> {
  grammar: &'a Grammar,
  tokens:  &'a [TokenInstance],
  cancel:  &'a CancellationToken,
  gss:     Gss,
  node_cont: HashMap<GssId, Rc<Cont>>,
  completed: HashMap<(String, u32), Vec<(u32, SppfId)>>,
  worklist: VecDeque<WorkItem>,
  pub descriptors_processed: usize,
  pub hit_iteration_cap: bool,
  pub hit_cancellation: bool,
}

impl<'a> GllEngine<'a> {
  pub fn new(grammar: &'a Grammar, tokens: &'a [TokenInstance], cancel: &'a CancellationToken) -> Self {
    Self {
      grammar,
      tokens,
      cancel,
      gss: Gss::new(),
      node_cont: HashMap::new(),
      completed: HashMap::new(),
      worklist: VecDeque::new(),
      descriptors_processed: 0,
      hit_iteration_cap: false,
      hit_cancellation: false,
    }
  }

  pub fn gss_max_depth(&self) -> usize {
    self.gss.max_depth()
  }

  /// Runs the full worklist GLL algorithm for `rule` starting at `pos`,
  /// returning the best `(symbol_node, end_pos)` pair found, preferring
  /// the longest match when `prefer_longest` is set (spec.md §6,
  /// `prefer_longest_alternative`).
  pub fn parse_rule(&mut self, sppf: &mut SppfPool, rule: &str, pos: u32, prefer_longest: bool) -> Option<(SppfId, u32)> {
    if let Some(ends) = self.completed.get(&(rule.to_string(), pos)) {
      if let Some(&(end, sym)) = pick_end(ends, prefer_longest) {
        return Some((sym, end));
      }
    }
    let Some(rule_def) = self.grammar.rules.get(rule) else { return None };
    let body = Rc::new(rule_def.expr.clone());
    self.run(sppf, rule.to_string(), body, pos);
    self.completed.get(&(rule.to_string(), pos)).and_then(|ends| pick_end(ends, prefer_longest)).map(|&(end, sym)| (sym, end))
  }

  /// Like [`Self::parse_rule`], but for an ad-hoc expression that has no
  /// grammar rule name of its own (the ALL(*) driver escalates a single
  /// stuck `Choice` rather than the whole enclosing rule). A synthetic
  /// name scoped by the expression's own allocation address keeps its
  /// completion-cache bucket from colliding with any real rule or with
  /// another anonymous expression escalated at the same position.
  pub fn parse_expr(&mut self, sppf: &mut SppfPool, expr: &Expr, pos: u32, prefer_longest: bool) -> Option<(SppfId, u32)> {
    let body = Rc::new(expr.clone());
    let name = format!("__anon_{:p}__", Rc::as_ptr(&body));
    self.run(sppf, name.clone(), body, pos);
    self.completed.get(&(name, pos)).and_then(|ends| pick_end(ends, prefer_longest)).map(|&(end, sym)| (sym, end))
  }

  fn run(&mut self, sppf: &mut SppfPool, name: String, body: Rc<Expr>, pos: u32) {
    let root_gss = self.gss.get_or_create(u64::MAX, pos);
    let cont = Rc::new(Cont::PopRule { rule: Rc::from(name.as_str()), entry_pos: pos });
    self.node_cont.insert(root_gss, cont.clone());
    self.worklist.push_back(WorkItem::Parse { expr: body, cont, gss: root_gss, pos });

    while let Some(item) = self.worklist.pop_front() {
      if self.cancel.is_cancelled() {
        self.hit_cancellation = true;
        break;
      }
      if self.descriptors_processed >= GLL_ITERATION_CAP {
        self.hit_iteration_cap = true;
        break;
      }
      self.descriptors_processed += 1;
      self.step(sppf, item);
    }
  }

  fn enqueue(&mut self, item: WorkItem) {
    self.worklist.push_back(item);
  }

  fn step(&mut self, sppf: &mut SppfPool, item: WorkItem) {
    match item {
      WorkItem::Parse { expr, cont, gss, pos } => self.dispatch(sppf, &expr, cont, gss, pos),
      WorkItem::Resume { cont, id, gss, pos } => self.resume(sppf, &cont, id, gss, pos),
    }
  }

  fn dispatch(&mut self, sppf: &mut SppfPool, expr: &Expr, cont: Rc<Cont>, gss: GssId, pos: u32) {
    match expr {
      Expr::TerminalType(_) | Expr::TerminalLiteral(_) => {
        if let Some(tok) = self.tokens.get(pos as usize) {
          if combine::expr_matches_token(expr, tok) {
            let id = sppf.make_terminal(tok.type_str(), tok.lexeme_str(), pos, pos + 1, tok.span);
            self.enqueue(WorkItem::Resume { cont, id, gss, pos: pos + 1 });
          }
        }
      }
      Expr::NonTerminal(name) => {
        let label = Rc::as_ptr(&cont) as *const () as u64;
        let call_node = self.gss.get_or_create(label, pos);
        self.node_cont.entry(call_node).or_insert_with(|| cont.clone());
        let new_edge = self.gss.add_edge(call_node, gss, None);

        if let Some(ends) = self.completed.get(&(name.clone(), pos)).cloned() {
          for (end, sym) in ends {
            self.enqueue(WorkItem::Resume { cont: cont.clone(), id: sym, gss, pos: end });
          }
        }

        if new_edge {
          if let Some(rule_def) = self.grammar.rules.get(name) {
            let body = Rc::new(rule_def.expr.clone());
            let rule_cont = Rc::new(Cont::PopRule { rule: Rc::from(name.as_str()), entry_pos: pos });
            self.enqueue(WorkItem::Parse { expr: body, cont: rule_cont, gss: call_node, pos });
          }
        }
      }
      Expr::Choice(alts) => {
        for alt in alts {
          self.enqueue(WorkItem::Parse { expr: Rc::new(alt.clone()), cont: cont.clone(), gss, pos });
        }
      }
      Expr::Sequence(items) => {
        if items.is_empty() {
          let id = sppf.make_packed(pos, vec![]);
          self.enqueue(WorkItem::Resume { cont, id, gss, pos });
        } else {
          let seq_items: Rc<[SeqItem]> = combine::seq_items(expr).into();
          let first = seq_items[0].expr.clone();
          let next = Rc::new(Cont::Seq { items: seq_items, idx: 0, collected: Vec::new(), next: cont });
          self.enqueue(WorkItem::Parse { expr: Rc::new(first), cont: next, gss, pos });
        }
      }
      Expr::Optional(inner) => {
        let skip_id = sppf.make_packed(pos, vec![]);
        self.enqueue(WorkItem::Resume { cont: cont.clone(), id: skip_id, gss, pos });
        self.enqueue(WorkItem::Parse { expr: Rc::new((**inner).clone()), cont, gss, pos });
      }
      Expr::Repeat(inner, min, max) => {
        if *min == 0 {
          let skip_id = sppf.make_packed(pos, vec![]);
          self.enqueue(WorkItem::Resume { cont: cont.clone(), id: skip_id, gss, pos });
        }
        let inner_rc = Rc::new((**inner).clone());
        let rep_cont = Rc::new(Cont::Repeat { inner: inner_rc.clone(), min: *min, max: *max, count: 0, collected: Vec::new(), next: cont });
        self.enqueue(WorkItem::Parse { expr: inner_rc, cont: rep_cont, gss, pos });
      }
      Expr::Named(_, inner) => {
        self.enqueue(WorkItem::Parse { expr: Rc::new((**inner).clone()), cont, gss, pos });
      }
    }
  }

  fn resume(&mut self, sppf: &mut SppfPool, cont: &Rc<Cont>, id: SppfId, gss: GssId, pos: u32) {
    match &**cont {
      Cont::PopRule { rule, entry_pos } => {
        let sym = sppf.get_or_create_symbol(rule, *entry_pos, pos);
        let packed = sppf.make_packed(pos, vec![(None, id)]);
        sppf.add_alternative(sym, packed);
        let entry = self.completed.entry((rule.to_string(), *entry_pos)).or_default();
        if !entry.iter().any(|&(end, _)| end == pos) {
          entry.push((pos, sym));
        }
        for (target, _fragment) in self.gss.edges_from(gss).to_vec() {
          let caller_cont = self.node_cont[&gss].clone();
          self.enqueue(WorkItem::Resume { cont: caller_cont, id: sym, gss: target, pos });
        }
      }
      Cont::Seq { items, idx, collected, next } => {
        let mut collected = collected.clone();
        if items[*idx].keep {
          collected.push((items[*idx].label.clone(), id));
        }
        if idx + 1 < items.len() {
          let next_item = items[*idx + 1].expr.clone();
          let seq_cont = Rc::new(Cont::Seq { items: items.clone(), idx: idx + 1, collected, next: next.clone() });
          self.enqueue(WorkItem::Parse { expr: Rc::new(next_item), cont: seq_cont, gss, pos });
        } else {
          let packed = sppf.make_packed(pos, collected);
          self.enqueue(WorkItem::Resume { cont: next.clone(), id: packed, gss, pos });
        }
      }
      Cont::Repeat { inner, min, max, count, collected, next } => {
        let mut collected = collected.clone();
        collected.push(id);
        let new_count = count + 1;
        if new_count >= *min {
          let packed = sppf.make_packed(pos, collected.iter().map(|&c| (None, c)).collect());
          self.enqueue(WorkItem::Resume { cont: next.clone(), id: packed, gss, pos });
        }
        let more_allowed = max.map_or(true, |m| new_count < m);
        if more_allowed {
          let rep_cont = Rc::new(Cont::Repeat { inner: inner.clone(), min: *min, max: *max, count: new_count, collected, next: next.clone() });
          self.enqueue(WorkItem::Parse { expr: inner.clone(), cont: rep_cont, gss, pos });
        }
      }
    }
  }
}

fn pick_end(ends: &[(u32, SppfId)], prefer_longest: bool) -> Option<&(u32, SppfId)> {
  if prefer_longest {
    ends.iter().max_by_key(|(end, _)| *end)
  } else {
    ends.first()
  }
}
