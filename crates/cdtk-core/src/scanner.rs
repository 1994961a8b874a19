//! Token definitions, lexer compilation, and the unified longest-match
//! scanner (spec.md §4.1, §6).

use crate::{
  dfa::{self, Dfa},
  fallback::{FancyRegexMatcher, MatchOutcome, Matcher},
  nfa::NfaBuilder,
  regex,
};
use cdtk_runtime::{intern_lexeme, resolve_lexeme, CancellationToken, CdtkError, CdtkResult, Diagnostic, Diagnostics, IString, LexerOptions, Severity, Span, Stage};
use std::time::Duration;

/// One token definition as supplied by the declarative front-end (out of
/// core scope; this is the contract it populates, per spec.md §6).
#[derive(Debug, Clone)]
pub struct TokenDefInput {
  pub name: String,
  pub pattern: String,
  pub ignored: bool,
  pub case_insensitive: bool,
  pub timeout: Option<Duration>,
  pub span: Span,
}

impl TokenDefInput {
  pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
    Self { name: name.into(), pattern: pattern.into(), ignored: false, case_insensitive: false, timeout: None, span: Span::UNKNOWN }
  }

  pub fn ignored(mut self) -> Self {
    self.ignored = true;
    self
  }

  pub fn case_insensitive(mut self) -> Self {
    self.case_insensitive = true;
    self
  }

  pub fn with_span(mut self, span: Span) -> Self {
    self.span = span;
    self
  }
}

/// A registered, immutable token definition (spec.md §3). `priority` is
/// the definition-order index: lower wins length ties.
#[derive(Debug, Clone)]
pub struct TokenDef {
  pub name:     IString,
  pub display_name: String,
  pub pattern:  String,
  pub ignored:  bool,
  pub timeout:  Duration,
  pub span:     Span,
  pub priority: u32,
}

/// A lexed token instance (spec.md §3). `lexeme` is interned process-wide
/// to deduplicate repeated identifiers/operators across every lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInstance {
  pub ty:     IString,
  pub lexeme: IString,
  pub span:   Span,
}

impl TokenInstance {
  pub fn lexeme_str(&self) -> String {
    resolve_lexeme(self.lexeme)
  }

  pub fn type_str(&self) -> String {
    resolve_lexeme(self.ty)
  }
}

/// Expands `Char`/`CharClass` literal ASCII letters into a class covering
/// both cases, implementing [`TokenDefInput::case_insensitive`].
fn case_fold(ir: regex::RegexIr) -> regex::RegexIr {
  use regex::{CharSet, RegexIr::*};
  match ir {
    Char(c) if c.is_ascii_alphabetic() => {
      let lower = c.to_ascii_lowercase();
      let upper = c.to_ascii_uppercase();
      CharClass(CharSet(vec![(lower, lower), (upper, upper)]), false)
    }
    Char(c) => Char(c),
    CharClass(set, negated) => CharClass(set, negated),
    Range(lo, hi) => Range(lo, hi),
    Dot => Dot,
    Concat(items) => Concat(items.into_iter().map(case_fold).collect()),
    Alt(items) => Alt(items.into_iter().map(case_fold).collect()),
    Star(x) => Star(Box::new(case_fold(*x))),
    Plus(x) => Plus(Box::new(case_fold(*x))),
    Optional(x) => Optional(Box::new(case_fold(*x))),
    Epsilon => Epsilon,
  }
}

fn references_word_family(pattern: &str) -> bool {
  pattern.contains(r"\w") || pattern.contains(r"\d") || pattern.chars().any(|c| c.is_ascii_alphanumeric())
}

fn references_whitespace(pattern: &str) -> bool {
  pattern.contains(r"\s") || pattern.contains(' ') || pattern.contains(r"\t") || pattern.contains(r"\n")
}

/// A 31h+x rolling hash over `(name, pattern, ignored)` for every
/// definition, used to decide whether a built [`Scanner`] can be reused
/// across `Tokenize` calls (spec.md §4.1).
fn definitions_hash(defs: &[TokenDefInput]) -> u64 {
  let mut h: u64 = 0;
  for d in defs {
    for part in [d.name.as_str(), d.pattern.as_str(), if d.ignored { "1" } else { "0" }] {
      for b in part.bytes() {
        h = h.wrapping_mul(31).wrapping_add(b as u64);
      }
      h = h.wrapping_mul(31);
    }
  }
  h
}

struct FallbackEntry {
  def:     TokenDef,
  matcher: Box<dyn Matcher>,
}

/// The compiled, immutable scanner: a DFA start state plus the fallback
/// regex definitions (spec.md §3).
pub struct Scanner {
  dfa:              Dfa,
  defs:             Vec<TokenDef>,
  fallback:         Vec<FallbackEntry>,
  definitions_hash: u64,
}

impl Scanner {
  /// Tokenizes `source`, returning emitted tokens (ignored tokens are
  /// consumed but not emitted) and any diagnostics raised along the way.
  /// `cancel` is checked at every scan position, per spec.md §4.3's
  /// cooperative-cancellation points.
  pub fn tokenize(&self, source: &str, cancel: &CancellationToken) -> CdtkResult<(Vec<TokenInstance>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let chars: Vec<char> = source.chars().collect();
    let mut byte_offsets: Vec<usize> = Vec::with_capacity(chars.len() + 1);
    let mut acc = 0usize;
    for c in &chars {
      byte_offsets.push(acc);
      acc += c.len_utf8();
    }
    byte_offsets.push(acc);

    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let (mut line, mut col) = (1u32, 1u32);

    while pos < chars.len() {
      if cancel.is_cancelled() {
        return Err(CdtkError::Cancelled);
      }
      match self.scan_one(source, &chars, &byte_offsets, pos, cancel, &mut diagnostics)? {
        Some((len, priority, ty_name)) => {
          let span = Span::new(pos as u32, len as u32, line, col);
          let lexeme: String = chars[pos..pos + len].iter().collect();
          let is_ignored = self.defs.iter().find(|d| d.priority == priority).map(|d| d.ignored).unwrap_or(false);
          if !is_ignored {
            tokens.push(TokenInstance { ty: ty_name, lexeme: intern_lexeme(&lexeme), span });
          }
          for c in &lexeme {
            advance_line_col(*c, &mut line, &mut col);
          }
          pos += len;
        }
        None => {
          let bad = chars[pos];
          let context = context_snippet(&chars, pos);
          let suggestions = suggest_fixes(bad);
          diagnostics.push(
            Diagnostic::new(
              Stage::Lexer,
              Severity::Error,
              format!("unrecognised character U+{:04X} ('{}') near \"{}\"", bad as u32, escape_char(bad), context),
              Span::new(pos as u32, 1, line, col),
            )
            .with_suggestions(suggestions),
          );
          advance_line_col(bad, &mut line, &mut col);
          pos += 1;
        }
      }
    }

    Ok((tokens, diagnostics))
  }

  /// Runs the DFA and every fallback matcher at `pos`, returning the
  /// longest match, ties broken by lowest definition index (spec.md
  /// §4.1, §8 "Priority+longest match"). A fallback matcher that times
  /// out raises a `Diagnostic` naming the token and position and is then
  /// treated as no match, so scanning continues (spec.md §4.3: "scanner
  /// aborts that token"); a cancelled matcher aborts the whole scan.
  fn scan_one(
    &self,
    source: &str,
    chars: &[char],
    byte_offsets: &[usize],
    pos: usize,
    cancel: &CancellationToken,
    diagnostics: &mut Diagnostics,
  ) -> CdtkResult<Option<(usize, u32, IString)>> {
    if cancel.is_cancelled() {
      return Err(CdtkError::Cancelled);
    }
    let dfa_result = dfa_longest_match(&self.dfa, chars, pos);

    let mut best: Option<(usize, u32, IString)> = dfa_result.map(|(len, accept)| (len, accept.priority, accept.token_name));

    for entry in &self.fallback {
      let byte_pos = byte_offsets[pos];
      match entry.matcher.match_at(source, byte_pos, cancel) {
        MatchOutcome::Matched(byte_len) => {
          let end_byte = byte_pos + byte_len;
          let end_char = match byte_offsets.binary_search(&end_byte) {
            Ok(idx) => idx,
            Err(_) => continue, // matched past a char boundary; ignore
          };
          let len = end_char - pos;
          if len == 0 {
            continue;
          }
          let better = match &best {
            None => true,
            Some((blen, bprio, _)) => len > *blen || (len == *blen && entry.def.priority < *bprio),
          };
          if better {
            best = Some((len, entry.def.priority, entry.def.name));
          }
        }
        MatchOutcome::NoMatch => {}
        MatchOutcome::TimedOut => {
          diagnostics.push(Diagnostic::new(
            Stage::Lexer,
            Severity::Error,
            format!("fallback pattern for token '{}' timed out while matching near position {pos}", entry.def.display_name),
            Span::new(pos as u32, 0, 0, 0),
          ));
        }
        MatchOutcome::Cancelled => return Err(CdtkError::Cancelled),
      }
    }

    Ok(best)
  }
}

fn dfa_longest_match(dfa: &Dfa, chars: &[char], pos: usize) -> Option<(usize, crate::nfa::Accept)> {
  let mut state = dfa.start;
  let mut best = dfa.states[state as usize].accept.map(|a| (0usize, a));
  let mut i = pos;
  while i < chars.len() {
    let c = chars[i];
    match dfa.states[state as usize].transitions.get(&c) {
      Some(&next) => {
        state = next;
        i += 1;
        if let Some(a) = dfa.states[state as usize].accept {
          best = Some((i - pos, a));
        }
      }
      None => break,
    }
  }
  best
}

fn advance_line_col(c: char, line: &mut u32, col: &mut u32) {
  if c == '\n' {
    *line += 1;
    *col = 1;
  } else {
    *col += 1;
  }
}

fn context_snippet(chars: &[char], pos: usize) -> String {
  let start = pos.saturating_sub(20);
  let end = (pos + 20).min(chars.len());
  chars[start..end].iter().map(|c| escape_char(*c)).collect::<Vec<_>>().join("")
}

fn escape_char(c: char) -> String {
  if c.is_control() {
    format!("\\u{{{:x}}}", c as u32)
  } else {
    c.to_string()
  }
}

fn suggest_fixes(c: char) -> Vec<String> {
  let mut out = Vec::new();
  if c.is_whitespace() {
    out.push("define an ignored whitespace token (e.g. `\\s+`)".to_string());
  }
  if c.is_alphabetic() {
    out.push("define an identifier token (e.g. `[a-zA-Z_][a-zA-Z0-9_]*`)".to_string());
  }
  if c.is_numeric() {
    out.push("define a number token (e.g. `\\d+`)".to_string());
  }
  if c.is_ascii_punctuation() {
    out.push(format!("define a symbol token for '{c}'"));
  }
  out
}

/// Compiles a set of [`TokenDefInput`]s into a [`Scanner`], caching the
/// compiled result so repeated `Tokenize` calls on an unchanged
/// definition set reuse it (spec.md §4.1).
pub struct Lexer {
  options: LexerOptions,
  defs:    Vec<TokenDefInput>,
  cached:  Option<Scanner>,
}

impl Lexer {
  pub fn new(options: LexerOptions) -> Self {
    Self { options, defs: Vec::new(), cached: None }
  }

  pub fn with_tokens(options: LexerOptions, defs: Vec<TokenDefInput>) -> Self {
    Self { options, defs, cached: None }
  }

  pub fn add_token(&mut self, def: TokenDefInput) {
    self.defs.push(def);
    self.cached = None;
  }

  /// Builds (or reuses the cached) [`Scanner`]. Returns build-time
  /// diagnostics (duplicate names, unclosed classes, the auto-injected
  /// whitespace Info) alongside the scanner.
  pub fn build(&mut self, cancel: &CancellationToken) -> CdtkResult<Diagnostics> {
    if cancel.is_cancelled() {
      return Err(CdtkError::Cancelled);
    }
    let hash = definitions_hash(&self.defs);
    if let Some(scanner) = &self.cached {
      if scanner.definitions_hash == hash {
        return Ok(Diagnostics::new());
      }
    }

    let mut diagnostics = Diagnostics::new();
    let mut defs = self.defs.clone();
    self.auto_inject_whitespace(&mut defs, &mut diagnostics);

    let mut seen_names = std::collections::HashSet::new();
    for d in &defs {
      if !seen_names.insert(d.name.clone()) {
        return Err(CdtkError::DuplicateToken { name: d.name.clone(), span: d.span });
      }
    }

    let mut nfa = NfaBuilder::new();
    let mut fragments = Vec::new();
    let mut token_defs = Vec::new();
    let mut fallback = Vec::new();

    for (i, d) in defs.iter().enumerate() {
      let priority = i as u32;
      let name = intern_lexeme(&d.name);
      let token_def = TokenDef {
        name,
        display_name: d.name.clone(),
        pattern: d.pattern.clone(),
        ignored: d.ignored,
        timeout: d.timeout.unwrap_or(self.options.regex_timeout),
        span: d.span,
        priority,
      };

      match regex::parse(&d.pattern) {
        Some(ir) => {
          let ir = if d.case_insensitive { case_fold(ir) } else { ir };
          let frag = nfa.build_token(&ir, name, priority);
          fragments.push(frag);
        }
        None => match FancyRegexMatcher::new(&d.pattern, token_def.timeout) {
          Ok(matcher) => fallback.push(FallbackEntry { def: token_def.clone(), matcher: Box::new(matcher) }),
          Err(e) => {
            return Err(CdtkError::InvalidPattern { pattern: d.pattern.clone(), reason: e.to_string() });
          }
        },
      }
      token_defs.push(token_def);
    }

    let start = if fragments.is_empty() { nfa.new_state() } else { nfa.merge(&fragments) };
    let dfa = dfa::subset_construct(&nfa, start);
    let dfa = if self.options.use_dfa_optimisation {
      let reachable: Vec<_> = (0..nfa.states.len() as u32).collect();
      let alphabet = dfa::compute_alphabet(&nfa, &reachable);
      dfa::minimize(&dfa, &alphabet)
    } else {
      dfa
    };

    self.cached = Some(Scanner { dfa, defs: token_defs, fallback, definitions_hash: hash });
    Ok(diagnostics)
  }

  /// Auto-injects a lowest-priority ignored `\s+` token if no ignored
  /// token already covers whitespace but some token references the word
  /// family (spec.md §4.1).
  fn auto_inject_whitespace(&self, defs: &mut Vec<TokenDefInput>, diagnostics: &mut Diagnostics) {
    let has_whitespace_token = defs.iter().any(|d| d.ignored && references_whitespace(&d.pattern));
    let references_words = defs.iter().any(|d| !d.ignored && references_word_family(&d.pattern));
    if !has_whitespace_token && references_words {
      defs.push(TokenDefInput::new("__AUTO_WHITESPACE__", r"\s+").ignored());
      diagnostics.push(Diagnostic::new(
        Stage::Lexer,
        Severity::Info,
        "no whitespace token was defined; auto-injected an ignored `\\s+` token at lowest priority",
        Span::UNKNOWN,
      ));
    }
  }

  pub fn tokenize(&mut self, source: &str, cancel: &CancellationToken) -> CdtkResult<(Vec<TokenInstance>, Diagnostics)> {
    let build_diags = self.build(cancel)?;
    let scanner = self.cached.as_ref().ok_or(CdtkError::LexerNotBuilt)?;
    let (mut tokens, mut diags) = scanner.tokenize(source, cancel)?;
    diags.extend(build_diags);
    if tokens.len() > self.options.max_tokens {
      diags.push(Diagnostic::new(
        Stage::Lexer,
        Severity::Error,
        format!("token limit of {} exceeded ({} tokens produced)", self.options.max_tokens, tokens.len()),
        Span::UNKNOWN,
      ));
      tokens.truncate(self.options.max_tokens);
    }
    Ok((tokens, diags))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lexer(defs: Vec<TokenDefInput>) -> Lexer {
    Lexer::with_tokens(LexerOptions::default(), defs)
  }

  #[test]
  fn tokenizes_numbers_and_symbols() {
    let mut lx = lexer(vec![
      TokenDefInput::new("Number", r"\d+"),
      TokenDefInput::new("Plus", r"\+"),
      TokenDefInput::new("WS", r"\s+").ignored(),
    ]);
    let cancel = CancellationToken::new();
    let (tokens, diags) = lx.tokenize("3 + 5", &cancel).unwrap();
    assert!(diags.is_empty(), "{diags:?}");
    let kinds: Vec<String> = tokens.iter().map(|t| t.type_str()).collect();
    assert_eq!(kinds, vec!["Number", "Plus", "Number"]);
    assert_eq!(tokens[0].lexeme_str(), "3");
    assert_eq!(tokens[2].lexeme_str(), "5");
  }

  #[test]
  fn longest_match_wins_over_priority() {
    // "Ident" is defined first but "Keyword" is a strict prefix match of
    // the same length for "if"; with equal length, the earlier
    // definition should win — here Ident covers "iffy" which is longer
    // than the 2-char Keyword match, so longest-match picks Ident.
    let mut lx = lexer(vec![TokenDefInput::new("Keyword", "if"), TokenDefInput::new("Ident", r"[a-z]+")]);
    let cancel = CancellationToken::new();
    let (tokens, _) = lx.tokenize("iffy", &cancel).unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].type_str(), "Ident");
    assert_eq!(tokens[0].lexeme_str(), "iffy");
  }

  #[test]
  fn ties_prefer_lower_definition_index() {
    let mut lx = lexer(vec![TokenDefInput::new("If", "if"), TokenDefInput::new("Ident", r"[a-z]+")]);
    let cancel = CancellationToken::new();
    let (tokens, _) = lx.tokenize("if", &cancel).unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].type_str(), "If");
  }

  #[test]
  fn unrecognised_character_is_reported_and_skipped() {
    let mut lx = lexer(vec![TokenDefInput::new("Number", r"\d+"), TokenDefInput::new("WS", r"\s+").ignored()]);
    let cancel = CancellationToken::new();
    let (tokens, diags) = lx.tokenize("1 @ 2", &cancel).unwrap();
    assert_eq!(tokens.len(), 2);
    assert!(diags.has_errors());
  }

  #[test]
  fn auto_injects_whitespace_when_missing() {
    let mut lx = lexer(vec![TokenDefInput::new("Ident", r"[a-zA-Z]+")]);
    let cancel = CancellationToken::new();
    let (tokens, diags) = lx.tokenize("foo bar", &cancel).unwrap();
    assert_eq!(tokens.len(), 2);
    assert!(diags.of_severity(Severity::Info).count() >= 1);
  }

  #[test]
  fn fallback_path_handles_lookahead() {
    let mut lx = lexer(vec![TokenDefInput::new("FooBeforeBar", r"foo(?=bar)"), TokenDefInput::new("Bar", "bar")]);
    let cancel = CancellationToken::new();
    let (tokens, diags) = lx.tokenize("foobar", &cancel).unwrap();
    assert!(!diags.has_errors());
    assert_eq!(tokens.iter().map(|t| t.type_str()).collect::<Vec<_>>(), vec!["FooBeforeBar", "Bar"]);
  }

  #[test]
  fn fallback_timeout_is_reported_as_a_diagnostic() {
    let mut lx = lexer(vec![TokenDefInput::new("FooBeforeBar", r"foo(?=bar)").with_span(Span::UNKNOWN), TokenDefInput::new("Bar", "bar")]);
    lx.options.regex_timeout = Duration::from_nanos(1);
    let cancel = CancellationToken::new();
    let (tokens, diags) = lx.tokenize("foobar", &cancel).unwrap();
    assert!(diags.has_errors(), "a timed-out fallback match should raise an Error diagnostic");
    assert!(diags.iter().any(|d| d.message.contains("timed out")));
    // the timed-out match is treated as no match, so the DFA's "Bar" match
    // is still found two characters in and scanning continues past it.
    assert!(tokens.iter().any(|t| t.type_str() == "Bar"));
  }

  #[test]
  fn scanner_is_cached_across_tokenize_calls() {
    let mut lx = lexer(vec![TokenDefInput::new("A", "a")]);
    let cancel = CancellationToken::new();
    lx.build(&cancel).unwrap();
    let hash_before = lx.cached.as_ref().unwrap().definitions_hash;
    lx.tokenize("a", &cancel).unwrap();
    let hash_after = lx.cached.as_ref().unwrap().definitions_hash;
    assert_eq!(hash_before, hash_after);
  }

  #[test]
  fn a_cancelled_token_aborts_tokenize_with_an_error() {
    let mut lx = lexer(vec![TokenDefInput::new("A", "a")]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = lx.tokenize("aaa", &cancel);
    assert!(matches!(result, Err(CdtkError::Cancelled)));
  }
}
