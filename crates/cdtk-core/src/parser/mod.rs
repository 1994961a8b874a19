//! AG-LL hybrid parser (spec.md §4.3, §4.4, §6): an ALL(*) recursive
//! descent fast path that escalates per-rule to a worklist GLL engine
//! only where prediction cannot commit.
//!
//! The REDESIGN FLAG in spec.md is explicit that the naive rewrite —
//! always routing through GLL regardless of predictor success — is the
//! wrong shape. `parse_expr_all`/`parse_rule_all` below are a genuinely
//! separate code path from [`gll`]: on a successful [`predict::predict`]
//! they build `Packed`/`Symbol` SPPF nodes directly and never touch the
//! GSS or worklist at all. [`gll::GllEngine`] is invoked only for the
//! rule whose choice point defeated the predictor, and only for that
//! rule's remaining subtree — once it returns, control resumes in the
//! outer ALL(*) recursion.

pub mod combine;
pub mod gll;
pub mod gss;
pub mod predict;
pub mod recovery;

use crate::grammar::expr::Expr;
use crate::grammar::Grammar;
use crate::scanner::TokenInstance;
use crate::sppf::{SppfId, SppfPool};
use cdtk_runtime::{CancellationToken, CdtkError, CdtkResult, Diagnostic, Diagnostics, ParserOptions, Severity, Span, Stage};
use std::collections::{HashMap, HashSet};

/// Splits a rule body into its top-level alternatives; `expr` itself if
/// it is not a [`Expr::Choice`]. Mirrors `grammar::alternatives` (kept as
/// a separate small function rather than `pub(crate)`-exporting the
/// grammar module's copy, since the two call sites reason about slightly
/// different things: grammar compilation walks productions, the parser
/// walks live choice points during prediction/dispatch).
pub(crate) fn alternatives(expr: &Expr) -> Vec<Expr> {
  match expr {
    Expr::Choice(alts) => alts.clone(),
    other => vec![other.clone()],
  }
}

/// Running counters surfaced to callers for diagnostics/telemetry and
/// consumed internally by the escalation heuristic (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct ParseMetrics {
  pub descriptors_processed: usize,
  pub escalations:           usize,
  pub max_lookahead_used:    usize,
  pub max_gss_depth:         usize,
  pub sppf_nodes:            usize,
}

/// Result of a top-level [`parse`] call.
pub struct ParseOutcome {
  pub root:        Option<SppfId>,
  pub end_pos:     u32,
  pub sppf:        SppfPool,
  pub is_partial:  bool,
  pub diagnostics: Diagnostics,
  pub metrics:     ParseMetrics,
  /// Number of times recovery produced a usable (possibly partial) tree
  /// that the caller would otherwise not have gotten: either by
  /// resyncing past trailing input, or by rooting a Symbol node at the
  /// deepest sequence progress reached before the parse failed outright
  /// (spec.md §8 scenario 2).
  pub errors_recovered: usize,
}

/// Parses `tokens` against `grammar`'s start rule. `grammar` must already
/// be compiled ([`Grammar::ensure_compiled`]); an uncompiled grammar is a
/// caller error, not a recoverable diagnostic (spec.md §7: "grammar
/// errors stop Parse before it starts"). `cancel` is checked before any
/// work starts and at every expression step thereafter (spec.md §4.3,
/// §5).
pub fn parse(grammar: &Grammar, tokens: &[TokenInstance], options: ParserOptions, cancel: &CancellationToken) -> CdtkResult<ParseOutcome> {
  if cancel.is_cancelled() {
    return Err(CdtkError::Cancelled);
  }
  if !grammar.is_compiled() {
    return Err(CdtkError::GrammarNotCompiled);
  }
  let start = grammar.start.clone().ok_or_else(|| CdtkError::UnknownStartRule { name: String::new() })?;
  if options.disallow_nullable_start && *grammar.nullable().get(&start).unwrap_or(&false) {
    return Err(CdtkError::UnknownStartRule { name: start });
  }

  let mut ctx = AllContext::new(grammar, tokens, options, cancel);
  let mut diagnostics = Diagnostics::new();

  let result = ctx.parse_rule_all(&start, 0, &mut diagnostics);

  let (root, end_pos, is_partial, errors_recovered) = match result {
    Some((sym, end)) if end as usize == tokens.len() => (Some(sym), end, false, 0),
    Some((sym, end)) => {
      diagnostics.push(Diagnostic::new(
        Stage::Parser,
        Severity::Error,
        format!("parse stopped at token {end} of {}: trailing input was not consumed", tokens.len()),
        Span::UNKNOWN,
      ));
      match recovery::recover(&mut ctx, &start, end, &mut diagnostics) {
        Some((resumed_sym, resumed_end)) => (Some(resumed_sym), resumed_end, resumed_end as usize != tokens.len(), 1),
        None => (Some(sym), end, true, 0),
      }
    }
    None => {
      diagnostics.push(Diagnostic::new(Stage::Parser, Severity::Error, format!("could not parse '{start}' from token 0"), Span::UNKNOWN));
      match ctx.take_deepest_progress() {
        Some((cursor, packed_id)) => {
          let sym = ctx.sppf.get_or_create_symbol(&start, 0, cursor);
          ctx.sppf.add_alternative(sym, packed_id);
          diagnostics.push(Diagnostic::new(
            Stage::Parser,
            Severity::Warning,
            format!("recovered a partial parse of '{start}' covering tokens [0, {cursor})"),
            Span::UNKNOWN,
          ));
          (Some(sym), cursor, true, 1)
        }
        None => (None, 0, true, 0),
      }
    }
  };

  let metrics = ctx.metrics();
  Ok(ParseOutcome { root, end_pos, sppf: ctx.into_sppf(), is_partial, diagnostics, metrics, errors_recovered })
}

/// Escalation is approved unconditionally for a grammar's first three
/// predictor failures (warm-up — not enough history yet to trust the
/// score), after which the weighted multi-metric score from spec.md
/// §4.3 decides. Kept small and named rather than folded inline so
/// DESIGN.md can point at one spot.
const ESCALATION_WARMUP: usize = 3;

pub(crate) struct AllContext<'a> {
  grammar: &'a Grammar,
  tokens:  &'a [TokenInstance],
  options: ParserOptions,
  cancel:  &'a CancellationToken,
  sppf:    SppfPool,
  gll:     gll::GllEngine<'a>,
  in_progress: HashSet<(String, u32)>,
  cache:   HashMap<(String, u32), (SppfId, u32)>,
  metrics: ParseMetrics,
  sppf_nodes_at_last_escalation: usize,
  descriptors_at_last_escalation: usize,
  steps: usize,
  step_cap_hit: bool,
  /// The furthest cursor position reached by a `Sequence` before it
  /// failed to match, along with the partial-fields `Packed` node
  /// already built for that cursor. Consumed once, by `parse`'s
  /// full-failure branch, to root a usable partial tree instead of
  /// returning nothing at all (spec.md §8 scenario 2).
  deepest_progress: Option<(u32, SppfId)>,
}

impl<'a> AllContext<'a> {
  fn new(grammar: &'a Grammar, tokens: &'a [TokenInstance], options: ParserOptions, cancel: &'a CancellationToken) -> Self {
    Self {
      grammar,
      tokens,
      options,
      cancel,
      sppf: SppfPool::new(),
      gll: gll::GllEngine::new(grammar, tokens, cancel),
      in_progress: HashSet::new(),
      cache: HashMap::new(),
      metrics: ParseMetrics::default(),
      sppf_nodes_at_last_escalation: 0,
      descriptors_at_last_escalation: 0,
      steps: 0,
      step_cap_hit: false,
      deepest_progress: None,
    }
  }

  fn metrics(&self) -> ParseMetrics {
    let mut m = self.metrics.clone();
    m.descriptors_processed = self.gll.descriptors_processed;
    m.sppf_nodes = self.sppf.len();
    m.max_gss_depth = m.max_gss_depth.max(self.gll.gss_max_depth());
    m
  }

  fn into_sppf(self) -> SppfPool {
    self.sppf
  }

  fn take_deepest_progress(&mut self) -> Option<(u32, SppfId)> {
    self.deepest_progress.take()
  }

  /// Parses non-terminal `name` starting at `pos`, returning the Symbol
  /// node and the position just past it. Cached per `(name, pos)` so
  /// repeated references (e.g. from backtracking-free ALL(*) choice
  /// exploration) short-circuit (spec.md §4.3 "GLL result caching" — the
  /// same cache key discipline applies to the ALL(*) path).
  fn parse_rule_all(&mut self, name: &str, pos: u32, diags: &mut Diagnostics) -> Option<(SppfId, u32)> {
    if let Some(&cached) = self.cache.get(&(name.to_string(), pos)) {
      return Some(cached);
    }
    let key = (name.to_string(), pos);
    if !self.in_progress.insert(key.clone()) {
      // Recursing into the same (rule, pos) without having consumed any
      // input: a cycle the ALL(*) path cannot make progress on natively.
      // Indirect left recursion is exactly this case (spec.md §4.2 only
      // eliminates the direct form); hand the whole rule to GLL, which
      // breaks the cycle via GSS node reuse instead of Rust call-stack
      // recursion.
      return self.escalate(name, pos, diags);
    }

    let rule_def = self.grammar.rules.get(name)?;
    let body = rule_def.expr.clone();
    let result = self.parse_expr_all(&body, pos, diags);
    self.in_progress.remove(&key);

    let (field_id, end) = result?;
    let sym = self.sppf.get_or_create_symbol(name, pos, end);
    let packed = self.sppf.make_packed(end, vec![(None, field_id)]);
    self.sppf.add_alternative(sym, packed);
    self.cache.insert(key, (sym, end));
    Some((sym, end))
  }

  /// Parses a sub-expression (not necessarily a whole rule body) at
  /// `pos`, returning an SPPF node id representing its contribution and
  /// the position just past it.
  fn parse_expr_all(&mut self, expr: &Expr, pos: u32, diags: &mut Diagnostics) -> Option<(SppfId, u32)> {
    if self.cancel.is_cancelled() {
      diags.push(Diagnostic::new(Stage::Parser, Severity::Error, "parse cancelled", Span::UNKNOWN));
      return None;
    }
    self.steps += 1;
    if self.steps > self.options.max_parse_steps {
      if !self.step_cap_hit {
        self.step_cap_hit = true;
        diags.push(Diagnostic::new(
          Stage::Parser,
          Severity::Error,
          format!("max_parse_steps ({}) exceeded; parse aborted", self.options.max_parse_steps),
          Span::UNKNOWN,
        ));
      }
      return None;
    }
    match expr {
      Expr::TerminalType(_) | Expr::TerminalLiteral(_) => {
        let tok = self.tokens.get(pos as usize)?;
        if !combine::expr_matches_token(expr, tok) {
          return None;
        }
        Some((self.sppf.make_terminal(tok.type_str(), tok.lexeme_str(), pos, pos + 1, tok.span), pos + 1))
      }
      Expr::NonTerminal(name) => self.parse_rule_all(name, pos, diags),
      Expr::Named(_, inner) => self.parse_expr_all(inner, pos, diags),
      Expr::Sequence(_) => {
        let items = combine::seq_items(expr);
        let mut collected = Vec::new();
        let mut cursor = pos;
        for item in &items {
          match self.parse_expr_all(&item.expr, cursor, diags) {
            Some((id, next)) => {
              if item.keep {
                collected.push((item.label.clone(), id));
              }
              cursor = next;
            }
            None => {
              // Keep whatever prefix of the sequence already matched as a
              // candidate partial derivation; `parse`'s full-failure
              // branch roots the deepest one it sees across the whole
              // attempt, rather than discarding all partial progress.
              let packed_id = self.sppf.make_packed(cursor, collected.clone());
              if self.deepest_progress.map_or(true, |(best, _)| cursor > best) {
                self.deepest_progress = Some((cursor, packed_id));
              }
              return None;
            }
          }
        }
        Some((self.sppf.make_packed(cursor, collected), cursor))
      }
      Expr::Optional(inner) => match self.parse_expr_all(inner, pos, diags) {
        Some((id, end)) => Some((self.sppf.make_packed(end, vec![(None, id)]), end)),
        None => Some((self.sppf.make_packed(pos, vec![]), pos)),
      },
      Expr::Repeat(inner, min, max) => {
        let mut collected = Vec::new();
        let mut cursor = pos;
        let mut count = 0u32;
        loop {
          if max.is_some_and(|m| count >= m) {
            break;
          }
          match self.parse_expr_all(inner, cursor, diags) {
            Some((id, next)) if next > cursor => {
              collected.push((None, id));
              cursor = next;
              count += 1;
            }
            _ => break,
          }
        }
        if count < *min {
          return None;
        }
        Some((self.sppf.make_packed(cursor, collected), cursor))
      }
      Expr::Choice(alts) => self.parse_choice_all(alts, pos, diags),
    }
  }

  fn parse_choice_all(&mut self, alts: &[Expr], pos: u32, diags: &mut Diagnostics) -> Option<(SppfId, u32)> {
    match predict::predict(alts, self.grammar, self.tokens, pos as usize) {
      predict::PredictResult::Committed(idx) => self.parse_expr_all(&alts[idx], pos, diags),
      predict::PredictResult::Failed(candidates, deepest) => {
        self.metrics.max_lookahead_used = self.metrics.max_lookahead_used.max(deepest);
        if self.should_escalate(deepest) {
          // The whole choice point — not just one alternative — is
          // handed to GLL, since any of `candidates` (or an alternative
          // the predictor already pruned in error) might be the real
          // derivation once full ambiguity is considered.
          let choice = Expr::Choice(candidates.iter().map(|&i| alts[i].clone()).collect());
          self.escalate_expr(&choice, pos, diags)
        } else {
          diags.push(Diagnostic::new(
            Stage::Parser,
            Severity::Warning,
            format!("ambiguous choice at token {pos} not escalated to GLL; picking the first candidate"),
            Span::UNKNOWN,
          ));
          self.parse_expr_all(&alts[candidates[0]], pos, diags)
        }
      }
    }
  }

  fn should_escalate(&mut self, deepest: usize) -> bool {
    self.metrics.escalations += 1;
    if self.metrics.escalations <= ESCALATION_WARMUP {
      return true;
    }
    let descriptor_growth = self.gll.descriptors_processed.saturating_sub(self.descriptors_at_last_escalation) as f64;
    let growth_rate = (descriptor_growth / 1000.0).min(1.0);
    let gss_depth = (self.gll.gss_max_depth() as f64 / 50.0).min(1.0);
    let lookahead = (deepest as f64 / predict::MAX_LOOKAHEAD as f64).min(1.0);
    let sppf_growth = ((self.sppf.len().saturating_sub(self.sppf_nodes_at_last_escalation)) as f64 / 1000.0).min(1.0);
    let score = 0.30 * growth_rate + 0.25 * gss_depth + 0.25 * lookahead + 0.20 * sppf_growth;
    score >= 0.5
  }

  fn escalate(&mut self, name: &str, pos: u32, diags: &mut Diagnostics) -> Option<(SppfId, u32)> {
    self.descriptors_at_last_escalation = self.gll.descriptors_processed;
    self.sppf_nodes_at_last_escalation = self.sppf.len();
    if self.gll.descriptors_processed >= gll::GLL_ITERATION_CAP {
      diags.push(Diagnostic::new(Stage::Parser, Severity::Error, "GLL iteration cap exceeded; parse aborted".to_string(), Span::UNKNOWN));
      return None;
    }
    let result = self.gll.parse_rule(&mut self.sppf, name, pos, self.options.prefer_longest_alternative);
    if self.gll.hit_iteration_cap {
      diags.push(Diagnostic::new(Stage::Parser, Severity::Error, "GLL iteration cap exceeded; parse aborted".to_string(), Span::UNKNOWN));
    }
    if self.gll.hit_cancellation {
      diags.push(Diagnostic::new(Stage::Parser, Severity::Error, "parse cancelled (GLL)", Span::UNKNOWN));
    }
    result
  }

  /// Like [`Self::escalate`], but for an ad-hoc choice expression rather
  /// than a named rule: wraps it in a synthetic single-use rule so the
  /// GLL engine (which dispatches by rule name) can still run it.
  fn escalate_expr(&mut self, expr: &Expr, pos: u32, diags: &mut Diagnostics) -> Option<(SppfId, u32)> {
    self.descriptors_at_last_escalation = self.gll.descriptors_processed;
    self.sppf_nodes_at_last_escalation = self.sppf.len();
    if self.gll.descriptors_processed >= gll::GLL_ITERATION_CAP {
      diags.push(Diagnostic::new(Stage::Parser, Severity::Error, "GLL iteration cap exceeded; parse aborted".to_string(), Span::UNKNOWN));
      return None;
    }
    let result = self.gll.parse_expr(&mut self.sppf, expr, pos, self.options.prefer_longest_alternative);
    if self.gll.hit_iteration_cap {
      diags.push(Diagnostic::new(Stage::Parser, Severity::Error, "GLL iteration cap exceeded; parse aborted".to_string(), Span::UNKNOWN));
    }
    if self.gll.hit_cancellation {
      diags.push(Diagnostic::new(Stage::Parser, Severity::Error, "parse cancelled (GLL)", Span::UNKNOWN));
    }
    result
  }
}
