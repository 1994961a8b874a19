//! Subset construction (NFA → DFA) and Hopcroft-style partition-refinement
//! minimisation (spec.md §4.1).

use crate::nfa::{Accept, NfaBuilder, StateId as NfaStateId, Transition};
use std::collections::HashMap;

pub type DfaStateId = u32;

#[derive(Debug, Clone, Default)]
pub struct DfaState {
  pub nfa_subset:  Vec<NfaStateId>,
  pub accept:      Option<Accept>,
  pub transitions: HashMap<char, DfaStateId>,
}

#[derive(Debug, Clone)]
pub struct Dfa {
  pub states: Vec<DfaState>,
  pub start:  DfaStateId,
}

/// Lowest-printable-ASCII .. highest-printable-ASCII, used to expand `.`
/// into the alphabet (spec.md §4.1, and the non-goal that Unicode beyond
/// printable ASCII is not modeled at the DFA level).
const PRINTABLE_ASCII: (char, char) = (' ', '~');

/// A cap on how many characters a single class range is expanded into
/// when building the alphabet, to keep pathological patterns (e.g. a
/// class spanning a huge Unicode range) from blowing up memory. Classes
/// built from `\d`/`\w`/`\s` or ordinary `a-z`-style literals never
/// approach this.
const RANGE_EXPANSION_CAP: usize = 4096;

/// Computes the alphabet over which the DFA must be built: the union of
/// every literal character, every character-class member, and — if any
/// `Dot` transition is present — the printable ASCII range.
pub fn compute_alphabet(nfa: &NfaBuilder, reachable: &[NfaStateId]) -> Vec<char> {
  let mut set: std::collections::BTreeSet<char> = std::collections::BTreeSet::new();
  let mut saw_dot = false;
  for &s in reachable {
    for t in &nfa.states[s as usize].transitions {
      match t {
        Transition::Char(c, _) => {
          set.insert(*c);
        }
        Transition::CharClass(class, _, _) => {
          for &(lo, hi) in &class.0 {
            let count = (hi as u32).saturating_sub(lo as u32) as usize + 1;
            if count > RANGE_EXPANSION_CAP {
              set.insert(lo);
              set.insert(hi);
            } else {
              for cp in (lo as u32)..=(hi as u32) {
                if let Some(c) = char::from_u32(cp) {
                  set.insert(c);
                }
              }
            }
          }
        }
        Transition::Dot(_) => saw_dot = true,
        Transition::Epsilon(_) => {}
      }
    }
  }
  if saw_dot {
    for cp in (PRINTABLE_ASCII.0 as u32)..=(PRINTABLE_ASCII.1 as u32) {
      set.insert(char::from_u32(cp).unwrap());
    }
  }
  set.into_iter().collect()
}

fn all_reachable(nfa: &NfaBuilder, start: NfaStateId) -> Vec<NfaStateId> {
  let mut seen = vec![false; nfa.states.len()];
  let mut stack = vec![start];
  seen[start as usize] = true;
  let mut out = Vec::new();
  while let Some(s) = stack.pop() {
    out.push(s);
    for t in &nfa.states[s as usize].transitions {
      let target = t.target();
      if !seen[target as usize] {
        seen[target as usize] = true;
        stack.push(target);
      }
    }
  }
  out
}

/// The lowest-priority (earliest-defined) accepting NFA state within a
/// subset, per spec.md §3's "DFA state's accepting inherits the
/// minimum-priority accepting NFA state in the set".
fn best_accept(nfa: &NfaBuilder, subset: &[NfaStateId]) -> Option<Accept> {
  subset.iter().filter_map(|&s| nfa.states[s as usize].accept).min_by_key(|a| a.priority)
}

pub fn subset_construct(nfa: &NfaBuilder, nfa_start: NfaStateId) -> Dfa {
  let reachable = all_reachable(nfa, nfa_start);
  let alphabet = compute_alphabet(nfa, &reachable);

  let start_subset = nfa.epsilon_closure(&[nfa_start]);
  let mut subset_index: HashMap<Vec<NfaStateId>, DfaStateId> = HashMap::new();
  let mut states: Vec<DfaState> = Vec::new();

  let start = get_or_create(&mut subset_index, &mut states, nfa, start_subset);
  let mut worklist = vec![start];
  let mut processed = vec![false; 0];
  processed.resize(states.len().max(1), false);

  while let Some(id) = worklist.pop() {
    if (id as usize) < processed.len() && processed[id as usize] {
      continue;
    }
    if processed.len() <= id as usize {
      processed.resize(id as usize + 1, false);
    }
    processed[id as usize] = true;

    let subset = states[id as usize].nfa_subset.clone();
    for &c in &alphabet {
      let mut successors: Vec<NfaStateId> = Vec::new();
      for &s in &subset {
        for t in &nfa.states[s as usize].transitions {
          if t.matches(c) {
            successors.push(t.target());
          }
        }
      }
      if successors.is_empty() {
        continue;
      }
      let closure = nfa.epsilon_closure(&successors);
      let target = get_or_create(&mut subset_index, &mut states, nfa, closure);
      states[id as usize].transitions.insert(c, target);
      if processed.len() <= target as usize {
        processed.resize(target as usize + 1, false);
      }
      if !processed[target as usize] {
        worklist.push(target);
      }
    }
  }

  Dfa { states, start }
}

fn get_or_create(
  index: &mut HashMap<Vec<NfaStateId>, DfaStateId>,
  states: &mut Vec<DfaState>,
  nfa: &NfaBuilder,
  subset: Vec<NfaStateId>,
) -> DfaStateId {
  if let Some(&id) = index.get(&subset) {
    return id;
  }
  let accept = best_accept(nfa, &subset);
  let id = states.len() as DfaStateId;
  states.push(DfaState { nfa_subset: subset.clone(), accept, transitions: HashMap::new() });
  index.insert(subset, id);
  id
}

/// Hopcroft-style partition refinement: splits states by
/// `(accepting, token_name, priority)` then refines by transition
/// signature until stable, per spec.md §4.1.
pub fn minimize(dfa: &Dfa, alphabet: &[char]) -> Dfa {
  let n = dfa.states.len();
  if n == 0 {
    return dfa.clone();
  }

  let initial_key = |s: usize| -> (bool, Option<(cdtk_runtime::IString, u32)>) {
    match dfa.states[s].accept {
      Some(a) => (true, Some((a.token_name, a.priority))),
      None => (false, None),
    }
  };

  let mut groups: Vec<Vec<usize>> = {
    let mut map: HashMap<(bool, Option<(cdtk_runtime::IString, u32)>), Vec<usize>> = HashMap::new();
    for s in 0..n {
      map.entry(initial_key(s)).or_default().push(s);
    }
    map.into_values().collect()
  };

  let mut partition_of: Vec<usize> = vec![0; n];
  for (gid, g) in groups.iter().enumerate() {
    for &s in g {
      partition_of[s] = gid;
    }
  }

  loop {
    let mut changed = false;
    let mut new_groups: Vec<Vec<usize>> = Vec::new();

    for group in &groups {
      if group.len() <= 1 {
        new_groups.push(group.clone());
        continue;
      }
      let mut buckets: HashMap<Vec<i64>, Vec<usize>> = HashMap::new();
      for &s in group {
        let sig: Vec<i64> = alphabet
          .iter()
          .map(|c| match dfa.states[s].transitions.get(c) {
            Some(&t) => partition_of[t as usize] as i64,
            None => -1,
          })
          .collect();
        buckets.entry(sig).or_default().push(s);
      }
      if buckets.len() > 1 {
        changed = true;
      }
      for (_, bucket) in buckets {
        new_groups.push(bucket);
      }
    }

    for (gid, g) in new_groups.iter().enumerate() {
      for &s in g {
        partition_of[s] = gid;
      }
    }
    groups = new_groups;

    if !changed {
      break;
    }
  }

  let mut new_states: Vec<DfaState> = groups
    .iter()
    .map(|g| {
      let rep = g[0];
      DfaState { nfa_subset: dfa.states[rep].nfa_subset.clone(), accept: dfa.states[rep].accept, transitions: HashMap::new() }
    })
    .collect();

  for (gid, g) in groups.iter().enumerate() {
    let rep = g[0];
    for (&c, &target) in &dfa.states[rep].transitions {
      new_states[gid].transitions.insert(c, partition_of[target as usize] as DfaStateId);
    }
  }

  Dfa { states: new_states, start: partition_of[dfa.start as usize] as DfaStateId }
}
