use std::{
  collections::HashMap,
  sync::{Arc, OnceLock, RwLock},
};

/// A handle into a [`StringStore`]. Cheap to copy, compare, and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IString(u32);

impl IString {
  pub fn to_string(self, store: &StringStore) -> String {
    store.resolve(self).to_string()
  }
}

#[derive(Default)]
struct StoreData {
  strings: Vec<Box<str>>,
  lookup:  HashMap<Box<str>, u32>,
}

/// A string interning table. Populated during lexer/grammar build and
/// read-only afterwards, so it may be shared freely across threads (see
/// spec.md §5).
#[derive(Clone, Default)]
pub struct StringStore(Arc<RwLock<StoreData>>);

impl StringStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn intern(&self, s: &str) -> IString {
    if let Some(id) = self.0.read().unwrap().lookup.get(s) {
      return IString(*id);
    }
    let mut data = self.0.write().unwrap();
    if let Some(id) = data.lookup.get(s) {
      return IString(*id);
    }
    let id = data.strings.len() as u32;
    let boxed: Box<str> = s.into();
    data.strings.push(boxed.clone());
    data.lookup.insert(boxed, id);
    IString(id)
  }

  pub fn resolve(&self, id: IString) -> String {
    self.0.read().unwrap().strings[id.0 as usize].to_string()
  }
}

/// Process-wide table used to deduplicate short lexemes (identifiers,
/// operators, keywords) emitted by the scanner across every lexer built in
/// the process, per spec.md §3 ("small strings are interned
/// process-wide").
static GLOBAL_LEXEMES: OnceLock<StringStore> = OnceLock::new();

fn global_store() -> &'static StringStore {
  GLOBAL_LEXEMES.get_or_init(StringStore::new)
}

pub fn intern_lexeme(s: &str) -> IString {
  global_store().intern(s)
}

pub fn resolve_lexeme(id: IString) -> String {
  global_store().resolve(id)
}
