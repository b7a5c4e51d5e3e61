use indexmap::IndexSet;

/// Maps string literals to distinct integers so that string-typed columns can
/// live in the integer theory. Equality of codes coincides with equality of
/// strings; ordering of codes carries no meaning, which matches SQL string
/// comparison being restricted to `=` and `<>` here.
///
/// Codes start at 1. Code 0 is reserved as the rendering fallback for string
/// cells the model left unconstrained.
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: IndexSet<String>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its code. Repeated calls with the same
    /// string return the same code.
    pub fn intern(&mut self, s: &str) -> i64 {
        if let Some(idx) = self.strings.get_index_of(s) {
            return idx as i64 + 1;
        }
        let (idx, _) = self.strings.insert_full(s.to_string());
        idx as i64 + 1
    }

    /// Look up the string for a code, if it was interned.
    pub fn resolve(&self, code: i64) -> Option<&str> {
        if code < 1 {
            return None;
        }
        self.strings.get_index(code as usize - 1).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Discard all strings interned after the first `len` entries. Used to
    /// roll the session back to a checkpoint taken with [`Self::len`].
    pub fn truncate(&mut self, len: usize) {
        self.strings.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = StringInterner::new();
        let a = interner.intern("alice");
        let b = interner.intern("bob");
        assert_ne!(a, b);
        assert_eq!(interner.intern("alice"), a);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn codes_start_at_one_and_resolve_back() {
        let mut interner = StringInterner::new();
        assert_eq!(interner.intern("x"), 1);
        assert_eq!(interner.intern("y"), 2);
        assert_eq!(interner.resolve(1), Some("x"));
        assert_eq!(interner.resolve(2), Some("y"));
        assert_eq!(interner.resolve(0), None);
        assert_eq!(interner.resolve(3), None);
        assert_eq!(interner.resolve(-5), None);
    }

    #[test]
    fn truncate_rolls_back_to_checkpoint() {
        let mut interner = StringInterner::new();
        interner.intern("kept");
        let mark = interner.len();
        interner.intern("dropped");
        interner.intern("also dropped");
        interner.truncate(mark);
        assert_eq!(interner.len(), 1);
        assert_eq!(interner.resolve(1), Some("kept"));
        assert_eq!(interner.resolve(2), None);
        // Re-interning after rollback reuses the freed codes.
        assert_eq!(interner.intern("fresh"), 2);
    }
}
