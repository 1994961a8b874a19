//! Regex fallback path: a narrow `Matcher` capability (design note 9 in
//! SPEC_FULL.md) backed by `fancy-regex`, used only for token patterns the
//! hand-rolled Thompson/DFA engine cannot parse into [`crate::regex::RegexIr`]
//! — lookaround, backreferences, named groups, inline flags.

use cdtk_runtime::CancellationToken;
use std::time::{Duration, Instant};

/// Capability set a fallback regex engine must provide: try to match
/// starting exactly at `pos`, returning the match length in bytes.
/// `cancel` is checked before the (potentially expensive, backtracking)
/// engine call runs at all (spec.md §4.3, §5).
pub trait Matcher: Send + Sync {
  fn match_at(&self, source: &str, pos: usize, cancel: &CancellationToken) -> MatchOutcome;
}

#[derive(Debug)]
pub enum MatchOutcome {
  Matched(usize),
  NoMatch,
  TimedOut,
  Cancelled,
}

/// `fancy_regex`-backed matcher, anchored to the start of the slice at
/// `pos` via `\A`.
pub struct FancyRegexMatcher {
  regex:   fancy_regex::Regex,
  timeout: Duration,
}

impl FancyRegexMatcher {
  pub fn new(pattern: &str, timeout: Duration) -> Result<Self, fancy_regex::Error> {
    let anchored = format!(r"\A(?:{pattern})");
    let regex = fancy_regex::RegexBuilder::new(&anchored).backtrack_limit(1_000_000).build()?;
    Ok(Self { regex, timeout })
  }
}

impl Matcher for FancyRegexMatcher {
  fn match_at(&self, source: &str, pos: usize, cancel: &CancellationToken) -> MatchOutcome {
    if cancel.is_cancelled() {
      return MatchOutcome::Cancelled;
    }
    let start = Instant::now();
    let slice = &source[pos..];
    match self.regex.find(slice) {
      Ok(Some(m)) if m.start() == 0 => {
        if start.elapsed() > self.timeout {
          MatchOutcome::TimedOut
        } else {
          MatchOutcome::Matched(m.end())
        }
      }
      Ok(_) => MatchOutcome::NoMatch,
      // `fancy_regex` surfaces a hit backtrack-limit as an error; under
      // the fixed regex-per-token timeout model in spec.md §4.3 we treat
      // that the same as a timeout rather than a hard failure.
      Err(_) => MatchOutcome::TimedOut,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn matches_lookahead_pattern() {
    let m = FancyRegexMatcher::new(r"foo(?=bar)", Duration::from_millis(250)).unwrap();
    let cancel = CancellationToken::new();
    match m.match_at("foobar", 0, &cancel) {
      MatchOutcome::Matched(len) => assert_eq!(len, 3),
      other => panic!("expected match, got {other:?}"),
    }
  }

  #[test]
  fn rejects_when_lookahead_fails() {
    let m = FancyRegexMatcher::new(r"foo(?=bar)", Duration::from_millis(250)).unwrap();
    let cancel = CancellationToken::new();
    assert!(matches!(m.match_at("foobaz", 0, &cancel), MatchOutcome::NoMatch));
  }

  #[test]
  fn a_cancelled_token_short_circuits_before_the_regex_engine_runs() {
    let m = FancyRegexMatcher::new(r"foo(?=bar)", Duration::from_millis(250)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(m.match_at("foobar", 0, &cancel), MatchOutcome::Cancelled));
  }

  #[test]
  fn times_out_when_the_budget_is_effectively_zero() {
    let m = FancyRegexMatcher::new(r"foo(?=bar)", Duration::from_nanos(1)).unwrap();
    let cancel = CancellationToken::new();
    assert!(matches!(m.match_at("foobar", 0, &cancel), MatchOutcome::TimedOut));
  }
}
