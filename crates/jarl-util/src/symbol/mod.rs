//! Process-wide string interning.
//!
//! Every source-originating byte string (identifiers, string literals) is
//! canonicalized to one heap allocation: construction looks up the content
//! in a shared table and returns the existing handle on a hit, or admits a
//! new entry on a miss. Two [`Symbol`]s compare equal iff they are the
//! *same* allocation, so equality and hashing are both pointer operations,
//! not content operations.
//!
//! # Refcounting, not leak-forever
//!
//! A string's storage is held by an [`Arc`] shared between every live
//! `Symbol` and one extra clone kept in the table itself. When the last
//! external `Symbol` drops, only the table's own clone remains
//! (`Arc::strong_count` reads 1). Rather than hook `Arc`'s drop glue
//! directly (which would need a custom reference-counted pointer type just
//! to observe "count became 1"), the table prunes such entries
//! opportunistically the next time `intern` misses and has to touch the
//! lock anyway. This satisfies "every live interned string appears exactly
//! once in the table" (dead entries are never returned to a caller) while
//! only deferring *when* a fully-dead entry's slot is reclaimed, not
//! *whether* identity and dedup hold.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

struct Inner {
    bytes: Box<str>,
}

/// A handle to a process-wide-unique interned string.
///
/// Cloning is a refcount bump, not an allocation. Comparison and hashing
/// are both O(1) pointer operations — the string's *content* is only
/// touched when first interning it.
#[derive(Clone)]
pub struct Symbol(Arc<Inner>);

impl Symbol {
    pub fn intern(s: &str) -> Self {
        STRING_TABLE.intern(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0.bytes
    }

    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// Number of interned strings currently reachable from a live `Symbol`
    /// plus the table's own bookkeeping clone. Exposed for the refcount
    /// soundness property in tests: after dropping every `Symbol` derived
    /// from a script and re-interning nothing, the next `intern` miss
    /// prunes the table back down.
    pub fn table_len() -> usize {
        STRING_TABLE.len()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct StringTable {
    entries: Mutex<FxHashMap<Box<str>, Arc<Inner>>>,
}

impl StringTable {
    fn intern(&self, s: &str) -> Symbol {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(s) {
            return Symbol(existing.clone());
        }
        entries.retain(|_, v| Arc::strong_count(v) > 1);
        let inner = Arc::new(Inner { bytes: s.into() });
        entries.insert(inner.bytes.clone(), inner.clone());
        Symbol(inner)
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

static STRING_TABLE: LazyLock<StringTable> = LazyLock::new(|| StringTable {
    entries: Mutex::new(FxHashMap::default()),
});
