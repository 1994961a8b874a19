//! Grammar IR, analysis, and the predictive table consumed by the parser
//! (spec.md §3, §4.2).

pub mod analysis;
pub mod expr;

use analysis::{FirstMap, FollowMap, LeftRecursionCycle, NullableMap, Terminal};
use cdtk_runtime::{CancellationToken, CdtkError, CdtkResult, Diagnostic, Diagnostics, Severity, Span, Stage};
use expr::{Expr, RuleDef};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// `(rule, lookahead) -> candidate production indices` into that rule's
/// alternative list. More than one candidate means the grammar is not
/// LL(1) at that point and the parser must escalate past simple table
/// lookup (spec.md §4.3, §4.4).
pub type PredictiveTable = HashMap<(String, Terminal), Vec<usize>>;

/// A compiled grammar: rule definitions plus the derived analysis used
/// by the parser. Adding a rule invalidates the analysis; it is rebuilt
/// lazily the next time [`Grammar::ensure_compiled`] runs (spec.md §3's
/// lifecycle invariant).
#[derive(Debug, Clone, Default)]
pub struct Grammar {
  pub rules:         IndexMap<String, RuleDef>,
  pub start:         Option<String>,
  known_tokens:      HashSet<String>,
  known_literals:    HashSet<String>,
  compiled:          bool,
  nullable:          NullableMap,
  first:             FirstMap,
  follow:            FollowMap,
  predictive:        PredictiveTable,
  left_recursion:    Vec<LeftRecursionCycle>,
}

impl Grammar {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers the set of token type names the lexer produces, used by
  /// validation to flag `@Type` references to undeclared token types.
  pub fn declare_tokens<I: IntoIterator<Item = String>>(&mut self, tokens: I) {
    self.known_tokens.extend(tokens);
    self.compiled = false;
  }

  /// Registers the set of string literals some declared token is capable
  /// of producing, used by validation to flag a rule's quoted literal
  /// (e.g. `'+'`) that no token definition can ever lex (spec.md §4.2,
  /// §7). Opt-in, like [`Self::declare_tokens`]: with nothing declared,
  /// no literal-coverage diagnostic is raised.
  pub fn declare_literals<I: IntoIterator<Item = String>>(&mut self, literals: I) {
    self.known_literals.extend(literals);
    self.compiled = false;
  }

  pub fn set_start(&mut self, name: &str) {
    self.start = Some(name.to_string());
    self.compiled = false;
  }

  pub fn add_rule(&mut self, name: &str, pattern: &str) -> CdtkResult<()> {
    self.add_rule_at(name, pattern, Span::UNKNOWN)
  }

  pub fn add_rule_at(&mut self, name: &str, pattern: &str, span: Span) -> CdtkResult<()> {
    if self.rules.contains_key(name) {
      return Err(CdtkError::DuplicateRule { name: name.to_string(), span });
    }
    let expr = expr::compile_pattern(pattern).ok_or_else(|| CdtkError::InvalidPattern {
      pattern: pattern.to_string(),
      reason:  "unterminated literal or stray operator".to_string(),
    })?;
    self.rules.insert(
      name.to_string(),
      RuleDef { name: name.to_string(), pattern: pattern.to_string(), expr, returns: Vec::new(), validators: Vec::new(), span, synthetic: false },
    );
    if self.start.is_none() {
      self.start = Some(name.to_string());
    }
    self.compiled = false;
    Ok(())
  }

  pub fn is_compiled(&self) -> bool {
    self.compiled
  }

  pub fn nullable(&self) -> &NullableMap {
    &self.nullable
  }

  pub fn first(&self) -> &FirstMap {
    &self.first
  }

  pub fn follow(&self) -> &FollowMap {
    &self.follow
  }

  pub fn predictive_table(&self) -> &PredictiveTable {
    &self.predictive
  }

  pub fn left_recursion_cycles(&self) -> &[LeftRecursionCycle] {
    &self.left_recursion
  }

  /// Recomputes nullable/FIRST/FOLLOW, eliminates direct left recursion,
  /// builds the predictive table, and validates the grammar, but only if
  /// something has changed since the last call (spec.md §3). `cancel` is
  /// checked before compilation starts and again between per-rule
  /// predictive-table steps (spec.md §4.3, §5); a cancelled compile
  /// leaves the grammar uncompiled.
  pub fn ensure_compiled(&mut self, cancel: &CancellationToken) -> Diagnostics {
    if self.compiled {
      return Diagnostics::new();
    }
    self.compile(cancel)
  }

  fn compile(&mut self, cancel: &CancellationToken) -> Diagnostics {
    let mut diags = Diagnostics::new();

    if cancel.is_cancelled() {
      diags.push(Diagnostic::new(Stage::Grammar, Severity::Error, "grammar compilation cancelled", Span::UNKNOWN));
      return diags;
    }

    let Some(start) = self.start.clone() else {
      self.compiled = true;
      return diags;
    };

    self.nullable = analysis::compute_nullable(self);
    self.left_recursion = analysis::detect_left_recursion(self, &self.nullable);
    self.eliminate_direct_left_recursion(&mut diags);

    // Eliminating direct left recursion rewrites rule bodies, so nullable
    // and the graph both need a fresh pass before FIRST/FOLLOW are sound.
    self.nullable = analysis::compute_nullable(self);
    let first = analysis::compute_first(self, &self.nullable);
    let follow = analysis::compute_follow(self, &self.nullable, &first, &start);
    self.first = first;
    self.follow = follow;

    match self.build_predictive_table(&mut diags, cancel) {
      Some(table) => {
        self.predictive = table;
        self.validate(&start, &mut diags);
        self.compiled = true;
      }
      None => {
        diags.push(Diagnostic::new(Stage::Grammar, Severity::Error, "grammar compilation cancelled", Span::UNKNOWN));
      }
    }
    diags
  }

  /// Rewrites every rule with an unrewritable-by-this-pass self-loop per
  /// spec.md §4.2: `A -> A a1 | .. | A am | b1 | .. | bn` (n >= 1)
  /// becomes
  ///   `A  -> b1 A' | .. | bn A'`
  ///   `A' -> a1 A' | .. | am A' | eps`
  /// with `A' = __A_LR__`, a synthetic rule hidden from diagnostics.
  /// Indirect/mutual cycles and rules with no non-recursive alternative
  /// are left in place and only reported (open question, see DESIGN.md).
  fn eliminate_direct_left_recursion(&mut self, diags: &mut Diagnostics) {
    let direct: Vec<String> =
      self.left_recursion.iter().filter(|c| c.0.len() == 1).map(|c| c.0[0].clone()).collect();

    for name in direct {
      let Some(rule) = self.rules.get(&name) else { continue };
      let alts = alternatives(&rule.expr);
      let mut recursive = Vec::new();
      let mut non_recursive = Vec::new();
      for alt in alts {
        match strip_leading_self(&alt, &name) {
          Some(remainder) => recursive.push(remainder),
          None => non_recursive.push(alt),
        }
      }
      if recursive.is_empty() || non_recursive.is_empty() {
        diags.push(Diagnostic::new(
          Stage::Grammar,
          Severity::Error,
          format!("rule '{name}' is left-recursive with no non-recursive alternative; cannot be eliminated"),
          rule.span,
        ));
        continue;
      }

      let helper_name = format!("__{name}_LR__");
      let helper_nt = Expr::NonTerminal(helper_name.clone());

      let new_main: Vec<Expr> = non_recursive.into_iter().map(|b| append(b, helper_nt.clone())).collect();
      let mut helper_alts: Vec<Expr> = recursive.into_iter().map(|a| append(a, helper_nt.clone())).collect();
      helper_alts.push(Expr::Sequence(vec![]));

      let span = rule.span;
      let returns = rule.returns.clone();
      let validators = rule.validators.clone();
      self.rules.insert(
        name.clone(),
        RuleDef { name: name.clone(), pattern: rule.pattern.clone(), expr: choice_of(new_main), returns, validators, span, synthetic: false },
      );
      self.rules.insert(
        helper_name.clone(),
        RuleDef { name: helper_name.clone(), pattern: String::new(), expr: choice_of(helper_alts), returns: Vec::new(), validators: Vec::new(), span, synthetic: true },
      );
    }
  }

  fn build_predictive_table(&self, diags: &mut Diagnostics, cancel: &CancellationToken) -> Option<PredictiveTable> {
    let mut table: PredictiveTable = HashMap::new();
    for (name, rule) in self.rules.iter() {
      if cancel.is_cancelled() {
        return None;
      }
      let productions = alternatives(&rule.expr);
      for (idx, prod) in productions.iter().enumerate() {
        let mut terms = analysis::first_of(prod, &self.nullable, &self.first);
        if analysis::is_nullable_expr(prod, &self.nullable) {
          if let Some(follow) = self.follow.get(name) {
            terms.extend(follow.iter().cloned());
          }
        }
        for term in terms {
          table.entry((name.clone(), term)).or_default().push(idx);
        }
      }
    }
    for ((rule, _), indices) in table.iter() {
      if indices.len() > 1 {
        diags.push(Diagnostic::new(
          Stage::Grammar,
          Severity::Warning,
          format!("rule '{rule}' is not LL(1) at this lookahead; {} productions apply", indices.len()),
          Span::UNKNOWN,
        ));
      }
    }
    Some(table)
  }

  fn validate(&self, start: &str, diags: &mut Diagnostics) {
    for (name, rule) in self.rules.iter() {
      let mut nonterms = HashSet::new();
      let mut tokens = HashSet::new();
      let mut literals = HashSet::new();
      collect_refs(&rule.expr, &mut nonterms, &mut tokens, &mut literals);
      for n in nonterms {
        if !self.rules.contains_key(&n) {
          diags.push(Diagnostic::new(Stage::Grammar, Severity::Error, format!("rule '{name}' references undefined rule '{n}'"), rule.span));
        }
      }
      if !self.known_tokens.is_empty() {
        for t in tokens {
          if !self.known_tokens.contains(&t) {
            diags.push(Diagnostic::new(Stage::Grammar, Severity::Error, format!("rule '{name}' references undeclared token type '{t}'"), rule.span));
          }
        }
      }
      if !self.known_literals.is_empty() {
        for lit in literals {
          if !self.known_literals.contains(&lit) {
            diags.push(Diagnostic::new(
              Stage::Grammar,
              Severity::Error,
              format!("rule '{name}' references literal {lit:?} that no declared token can produce"),
              rule.span,
            ));
          }
        }
      }
    }

    if *self.nullable.get(start).unwrap_or(&false) {
      diags.push(Diagnostic::new(Stage::Grammar, Severity::Warning, format!("start rule '{start}' is nullable"), Span::UNKNOWN));
    }

    let reachable = analysis::reachable_from(self, start);
    for (name, rule) in self.rules.iter() {
      if rule.synthetic {
        continue;
      }
      if !reachable.contains(name) {
        diags.push(Diagnostic::new(Stage::Grammar, Severity::Warning, format!("rule '{name}' is unreachable from start rule '{start}'"), rule.span));
      }
    }

    for cycle in &self.left_recursion {
      if cycle.0.len() > 1 {
        diags.push(Diagnostic::new(
          Stage::Grammar,
          Severity::Error,
          format!("indirect left recursion through rules: {}", cycle.0.join(" -> ")),
          Span::UNKNOWN,
        ));
      }
    }
  }
}

fn collect_refs(expr: &Expr, nonterms: &mut HashSet<String>, tokens: &mut HashSet<String>, literals: &mut HashSet<String>) {
  analysis::collect_references(expr, nonterms, tokens, literals);
}

fn alternatives(expr: &Expr) -> Vec<Expr> {
  match expr {
    Expr::Choice(alts) => alts.clone(),
    other => vec![other.clone()],
  }
}

fn choice_of(mut alts: Vec<Expr>) -> Expr {
  if alts.len() == 1 {
    alts.pop().unwrap()
  } else {
    Expr::Choice(alts)
  }
}

fn append(expr: Expr, tail: Expr) -> Expr {
  match expr {
    Expr::Sequence(mut items) => {
      items.push(tail);
      Expr::Sequence(items)
    }
    other => Expr::Sequence(vec![other, tail]),
  }
}

/// If `expr` is `name` followed by something else (or `name` alone),
/// returns the remainder after stripping the leading self-reference.
fn strip_leading_self(expr: &Expr, name: &str) -> Option<Expr> {
  match expr {
    Expr::NonTerminal(n) if n == name => Some(Expr::Sequence(vec![])),
    Expr::Sequence(items) => {
      let (head, rest) = items.split_first()?;
      match head {
        Expr::NonTerminal(n) if n == name => Some(choice_of(vec![Expr::Sequence(rest.to_vec())])),
        _ => None,
      }
    }
    _ => None,
  }
}
