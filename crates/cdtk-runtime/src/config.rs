use std::time::Duration;

/// Options recognised by the lexer compiler, per spec.md §6.
///
/// Built with chained setters in the style of
/// `radlr_core::ParserConfig`, rather than a plain struct literal, so new
/// fields can default sensibly without breaking call sites.
#[derive(Debug, Clone, Copy)]
pub struct LexerOptions {
  pub max_tokens: usize,
  pub preserve_newlines: bool,
  pub safe_mode: bool,
  pub regex_timeout: Duration,
  pub use_non_backtracking: bool,
  pub use_dfa_optimisation: bool,
}

impl Default for LexerOptions {
  fn default() -> Self {
    Self {
      max_tokens: usize::MAX,
      preserve_newlines: false,
      safe_mode: true,
      regex_timeout: Duration::from_millis(250),
      use_non_backtracking: true,
      use_dfa_optimisation: true,
    }
  }
}

impl LexerOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn max_tokens(mut self, max: usize) -> Self {
    self.max_tokens = max;
    self
  }

  pub fn preserve_newlines(mut self, enable: bool) -> Self {
    self.preserve_newlines = enable;
    self
  }

  pub fn safe_mode(mut self, enable: bool) -> Self {
    self.safe_mode = enable;
    self
  }

  pub fn regex_timeout(mut self, timeout: Duration) -> Self {
    self.regex_timeout = timeout;
    self
  }

  pub fn use_non_backtracking(mut self, enable: bool) -> Self {
    self.use_non_backtracking = enable;
    self
  }

  pub fn use_dfa_optimisation(mut self, enable: bool) -> Self {
    self.use_dfa_optimisation = enable;
    self
  }
}

/// Options recognised by the AG-LL parser, per spec.md §6.
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
  pub prefer_longest_alternative: bool,
  pub disallow_nullable_start: bool,
  pub max_parse_steps: usize,
  pub use_arena: bool,
  /// Must remain `true`: the legacy non-table-driven path has been
  /// removed (spec.md §6). Kept as a field rather than deleted so
  /// embedders porting an old config literal get a clear runtime error
  /// instead of a silently-ignored flag.
  pub use_predictive_table: bool,
}

impl Default for ParserOptions {
  fn default() -> Self {
    Self {
      prefer_longest_alternative: true,
      disallow_nullable_start: false,
      max_parse_steps: 5_000_000,
      use_arena: true,
      use_predictive_table: true,
    }
  }
}

impl ParserOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn prefer_longest_alternative(mut self, enable: bool) -> Self {
    self.prefer_longest_alternative = enable;
    self
  }

  pub fn disallow_nullable_start(mut self, enable: bool) -> Self {
    self.disallow_nullable_start = enable;
    self
  }

  pub fn max_parse_steps(mut self, max: usize) -> Self {
    self.max_parse_steps = max;
    self
  }

  pub fn use_arena(mut self, enable: bool) -> Self {
    self.use_arena = enable;
    self
  }
}
