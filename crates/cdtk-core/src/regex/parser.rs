use super::ir::{digit_class, space_class, word_class, CharSet, RegexIr};
use std::{iter::Peekable, str::Chars};

/// Recursive-descent regex parser. Operators bind as `concat > '|'`;
/// suffix `* + ?` bind tighter than concat (spec.md §4.1).
///
/// Returns `None` ("unsupported") if the pattern uses a construct this
/// engine does not model: lookaround, backreferences, atomic groups,
/// anchors other than the implicit start, named groups, or inline flags.
/// The caller (the lexer compiler) then routes that token through the
/// regex-fallback path instead of compiling it into the shared DFA.
pub fn parse(pattern: &str) -> Option<RegexIr> {
  let mut p = Parser { chars: pattern.chars().peekable() };
  let ir = p.parse_alt()?;
  if p.chars.peek().is_some() {
    // Leftover input means we bailed out of a nested group early, or hit
    // a stray close-paren; either way the pattern didn't fully parse.
    return None;
  }
  Some(ir)
}

struct Parser<'a> {
  chars: Peekable<Chars<'a>>,
}

impl<'a> Parser<'a> {
  fn parse_alt(&mut self) -> Option<RegexIr> {
    let mut alts = vec![self.parse_concat()?];
    while matches!(self.chars.peek(), Some('|')) {
      self.chars.next();
      alts.push(self.parse_concat()?);
    }
    Some(if alts.len() == 1 { alts.pop().unwrap() } else { RegexIr::Alt(alts) })
  }

  fn parse_concat(&mut self) -> Option<RegexIr> {
    let mut items = Vec::new();
    while let Some(&c) = self.chars.peek() {
      if c == '|' || c == ')' {
        break;
      }
      items.push(self.parse_repeat()?);
    }
    Some(match items.len() {
      0 => RegexIr::Epsilon,
      1 => items.pop().unwrap(),
      _ => RegexIr::Concat(items),
    })
  }

  fn parse_repeat(&mut self) -> Option<RegexIr> {
    let atom = self.parse_atom()?;
    match self.chars.peek() {
      Some('*') => {
        self.chars.next();
        Some(RegexIr::Star(Box::new(atom)))
      }
      Some('+') => {
        self.chars.next();
        Some(RegexIr::Plus(Box::new(atom)))
      }
      Some('?') => {
        self.chars.next();
        Some(RegexIr::Optional(Box::new(atom)))
      }
      _ => Some(atom),
    }
  }

  fn parse_atom(&mut self) -> Option<RegexIr> {
    match self.chars.next()? {
      '(' => {
        // `(?...)` covers every unsupported group variant this engine
        // doesn't model: named captures, lookaround, atomic groups,
        // inline flags. Only plain `(...)` grouping is supported.
        if matches!(self.chars.peek(), Some('?')) {
          return None;
        }
        let inner = self.parse_alt()?;
        if self.chars.next() != Some(')') {
          return None;
        }
        Some(inner)
      }
      '[' => self.parse_class(),
      '.' => Some(RegexIr::Dot),
      '^' => {
        // Implicit start is handled by the scanner anchoring every match
        // at the current position; an explicit `^` anywhere but the very
        // start of the whole pattern is an anchor assertion this engine
        // does not support.
        None
      }
      '$' => None,
      '\\' => self.parse_escape(),
      ')' => None,
      c => Some(RegexIr::Char(c)),
    }
  }

  fn parse_escape(&mut self) -> Option<RegexIr> {
    match self.chars.next()? {
      'd' => Some(RegexIr::CharClass(digit_class(), false)),
      'D' => Some(RegexIr::CharClass(digit_class(), true)),
      'w' => Some(RegexIr::CharClass(word_class(), false)),
      'W' => Some(RegexIr::CharClass(word_class(), true)),
      's' => Some(RegexIr::CharClass(space_class(), false)),
      'S' => Some(RegexIr::CharClass(space_class(), true)),
      'n' => Some(RegexIr::Char('\n')),
      'r' => Some(RegexIr::Char('\r')),
      't' => Some(RegexIr::Char('\t')),
      '0' => Some(RegexIr::Char('\0')),
      // Backreferences (\1 .. \9) are not supported.
      c if c.is_ascii_digit() => None,
      c => Some(RegexIr::Char(c)),
    }
  }

  fn parse_class(&mut self) -> Option<RegexIr> {
    let negated = matches!(self.chars.peek(), Some('^'));
    if negated {
      self.chars.next();
    }
    let mut set = CharSet::default();
    let mut saw_member = false;
    loop {
      match self.chars.peek().copied() {
        None => return None, // unterminated class
        Some(']') => {
          self.chars.next();
          break;
        }
        _ => {
          let lo = self.parse_class_atom()?;
          saw_member = true;
          for (c, is_class) in lo {
            if is_class {
              set = set.union(c);
            } else {
              let only = c.0[0].0;
              if matches!(self.chars.peek(), Some('-')) {
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if matches!(lookahead.peek(), Some(&ch) if ch != ']') {
                  self.chars.next();
                  let hi = self.parse_single_char()?;
                  set.push(only, hi);
                  continue;
                }
              }
              set.push(only, only);
            }
          }
        }
      }
    }
    if !saw_member {
      return None;
    }
    Some(RegexIr::CharClass(set, negated))
  }

  /// Parses one class member: either a shorthand class (`\d`, `\w`, `\s`)
  /// or a single literal character. Returns a list so callers can treat
  /// both uniformly; the bool flags a shorthand-class member (merged
  /// directly) versus a literal char (which may start a `a-z` range).
  fn parse_class_atom(&mut self) -> Option<Vec<(CharSet, bool)>> {
    if matches!(self.chars.peek(), Some('\\')) {
      self.chars.next();
      return match self.chars.next()? {
        'd' => Some(vec![(digit_class(), true)]),
        'w' => Some(vec![(word_class(), true)]),
        's' => Some(vec![(space_class(), true)]),
        'n' => Some(vec![(CharSet::single('\n'), false)]),
        'r' => Some(vec![(CharSet::single('\r'), false)]),
        't' => Some(vec![(CharSet::single('\t'), false)]),
        '0' => Some(vec![(CharSet::single('\0'), false)]),
        c => Some(vec![(CharSet::single(c), false)]),
      };
    }
    let c = self.chars.next()?;
    Some(vec![(CharSet::single(c), false)])
  }

  fn parse_single_char(&mut self) -> Option<char> {
    if matches!(self.chars.peek(), Some('\\')) {
      self.chars.next();
      return match self.chars.next()? {
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '0' => Some('\0'),
        c => Some(c),
      };
    }
    self.chars.next()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_literal_concat() {
    let ir = parse("ab").unwrap();
    assert_eq!(ir, RegexIr::Concat(vec![RegexIr::Char('a'), RegexIr::Char('b')]));
  }

  #[test]
  fn parses_alternation_lower_precedence_than_concat() {
    let ir = parse("ab|c").unwrap();
    assert_eq!(
      ir,
      RegexIr::Alt(vec![RegexIr::Concat(vec![RegexIr::Char('a'), RegexIr::Char('b')]), RegexIr::Char('c'),])
    );
  }

  #[test]
  fn suffix_binds_tighter_than_concat() {
    let ir = parse("ab*").unwrap();
    assert_eq!(ir, RegexIr::Concat(vec![RegexIr::Char('a'), RegexIr::Star(Box::new(RegexIr::Char('b')))]));
  }

  #[test]
  fn parses_digit_class_shorthand() {
    let ir = parse(r"\d+").unwrap();
    assert_eq!(ir, RegexIr::Plus(Box::new(RegexIr::CharClass(digit_class(), false))));
  }

  #[test]
  fn parses_negated_class_with_range() {
    let ir = parse("[^a-z0-9]").unwrap();
    match ir {
      RegexIr::CharClass(set, true) => {
        assert!(set.contains('b'));
        assert!(set.contains('5'));
        assert!(!set.contains('A'));
      }
      other => panic!("unexpected ir: {other:?}"),
    }
  }

  #[test]
  fn rejects_lookahead() {
    assert_eq!(parse("a(?=b)"), None);
  }

  #[test]
  fn rejects_backreference() {
    assert_eq!(parse(r"(a)\1"), None);
  }

  #[test]
  fn rejects_named_group() {
    assert_eq!(parse("(?<name>a)"), None);
  }

  #[test]
  fn rejects_unclosed_class() {
    assert_eq!(parse("[A-"), None);
  }

  #[test]
  fn rejects_dollar_anchor() {
    assert_eq!(parse("a$"), None);
  }
}
