//! Global string pool for attribute-tree keys.
//!
//! The original engine interns path components as `GQuark`s from a process-
//! wide table. Here the pool is owned by the caller (typically the driver
//! handle) and threaded explicitly into every attribute-tree operation that
//! needs to resolve a name, rather than living behind a global.

use std::collections::HashMap;

/// An interned attribute-tree key: cheap to copy and compare, resolves back
/// to its string via the owning [`Interner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u32);

#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<String>,
    lookup: HashMap<String, Key>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning its `Key`. Re-interning the same string returns
    /// the same `Key`.
    pub fn intern(&mut self, s: &str) -> Key {
        if let Some(key) = self.lookup.get(s) {
            return *key;
        }
        let key = Key(u32::try_from(self.strings.len()).expect("attribute key space exhausted"));
        self.strings.push(s.to_owned());
        self.lookup.insert(s.to_owned(), key);
        key
    }

    #[must_use]
    pub fn resolve(&self, key: Key) -> &str {
        &self.strings[key.0 as usize]
    }

    /// Intern each `/`-separated segment of a path string, in order.
    pub fn intern_path(&mut self, path: &str) -> Vec<Key> {
        path.split('/').filter(|s| !s.is_empty()).map(|seg| self.intern(seg)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut pool = Interner::new();
        let a1 = pool.intern("hooks");
        let a2 = pool.intern("hooks");
        assert_eq!(a1, a2);
        assert_eq!(pool.resolve(a1), "hooks");
    }

    #[test]
    fn distinct_strings_get_distinct_keys() {
        let mut pool = Interner::new();
        let a = pool.intern("a");
        let b = pool.intern("b");
        assert_ne!(a, b);
    }

    #[test]
    fn path_interning_splits_and_skips_empty_segments() {
        let mut pool = Interner::new();
        let keys = pool.intern_path("/hooks/event/by_id/");
        let names: Vec<&str> = keys.iter().map(|k| pool.resolve(*k)).collect();
        assert_eq!(names, vec!["hooks", "event", "by_id"]);
    }
}
