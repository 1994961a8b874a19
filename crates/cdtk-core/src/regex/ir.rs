/// A normalized, sorted set of inclusive character ranges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharSet(pub Vec<(char, char)>);

impl CharSet {
  pub fn single(c: char) -> Self {
    Self(vec![(c, c)])
  }

  pub fn range(lo: char, hi: char) -> Self {
    Self(vec![(lo, hi)])
  }

  pub fn contains(&self, c: char) -> bool {
    // Ranges are sorted and non-overlapping, so binary search is valid.
    self.0.binary_search_by(|(lo, hi)| if c < *lo { std::cmp::Ordering::Greater } else if c > *hi { std::cmp::Ordering::Less } else { std::cmp::Ordering::Equal }).is_ok()
  }

  pub fn union(mut self, other: CharSet) -> Self {
    self.0.extend(other.0);
    normalize(&mut self.0);
    self
  }

  pub fn push(&mut self, lo: char, hi: char) {
    self.0.push((lo, hi));
    normalize(&mut self.0);
  }
}

fn normalize(ranges: &mut Vec<(char, char)>) {
  if ranges.is_empty() {
    return;
  }
  ranges.sort_by_key(|r| r.0);
  let mut merged: Vec<(char, char)> = Vec::with_capacity(ranges.len());
  for &(lo, hi) in ranges.iter() {
    if let Some(last) = merged.last_mut() {
      let last_next = char::from_u32(last.1 as u32 + 1).unwrap_or(last.1);
      if lo <= last_next && lo as u32 <= last.1 as u32 + 1 {
        if hi > last.1 {
          last.1 = hi;
        }
        continue;
      }
    }
    merged.push((lo, hi));
  }
  *ranges = merged;
}

/// `\d` — ASCII digits.
pub fn digit_class() -> CharSet {
  CharSet::range('0', '9')
}

/// `\w` — word characters: letters, digits, underscore.
pub fn word_class() -> CharSet {
  CharSet(vec![('0', '9'), ('A', 'Z'), ('_', '_'), ('a', 'z')])
}

/// `\s` — whitespace: space, tab, CR, LF, per spec.md §4.1.
pub fn space_class() -> CharSet {
  CharSet(vec![('\t', '\t'), ('\n', '\n'), ('\r', '\r'), (' ', ' ')])
}

/// The regex intermediate representation, parsed from a token's pattern
/// string. See spec.md §3.
#[derive(Debug, Clone, PartialEq)]
pub enum RegexIr {
  Char(char),
  CharClass(CharSet, bool),
  Range(char, char),
  Dot,
  Concat(Vec<RegexIr>),
  Alt(Vec<RegexIr>),
  Star(Box<RegexIr>),
  Plus(Box<RegexIr>),
  Optional(Box<RegexIr>),
  Epsilon,
}

impl RegexIr {
  /// `true` if this node or any sub-node can match the empty string. Used
  /// by the regex-fallback matcher's anchoring logic.
  pub fn nullable(&self) -> bool {
    match self {
      RegexIr::Char(_) | RegexIr::CharClass(..) | RegexIr::Range(..) | RegexIr::Dot => false,
      RegexIr::Concat(items) => items.iter().all(RegexIr::nullable),
      RegexIr::Alt(items) => items.iter().any(RegexIr::nullable),
      RegexIr::Star(_) | RegexIr::Optional(_) | RegexIr::Epsilon => true,
      RegexIr::Plus(inner) => inner.nullable(),
    }
  }
}
