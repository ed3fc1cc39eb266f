//! Array/table traversal cursor.

use std::cell::Cell;

use jarl_util::Symbol;

use crate::array::JarlArray;
use crate::table::JarlTable;
use crate::value::Value;

#[derive(Debug)]
enum Source {
    Array(JarlArray),
    /// A table's traversal order is fixed at `BeginIter` time (tables are
    /// otherwise unordered); snapshotting here also sidesteps what happens
    /// if the table is mutated mid-iteration, which is left undefined.
    Table(Vec<(Value, Value)>),
    /// A string's glyphs, snapshotted up front the same way a table's
    /// entries are. `chars()` has no stable index into the original
    /// `Symbol`, so each step's key/value pair is materialized here.
    Str(Vec<char>),
}

/// Produces `(key, value)` pairs until exhausted. For arrays the key is
/// the index; for tables it is the table key.
#[derive(Debug)]
pub struct JarlIterator {
    source: Source,
    cursor: Cell<usize>,
}

impl JarlIterator {
    pub fn over_array(array: JarlArray) -> Self {
        Self {
            source: Source::Array(array),
            cursor: Cell::new(0),
        }
    }

    pub fn over_table(table: &JarlTable) -> Self {
        Self {
            source: Source::Table(table.entries()),
            cursor: Cell::new(0),
        }
    }

    pub fn over_str(s: &Symbol) -> Self {
        Self {
            source: Source::Str(s.as_str().chars().collect()),
            cursor: Cell::new(0),
        }
    }

    /// Advances the cursor and returns the next `(key, value)` pair, or
    /// `None` once exhausted.
    pub fn next(&self) -> Option<(Value, Value)> {
        let i = self.cursor.get();
        let pair = match &self.source {
            Source::Array(a) => {
                if i >= a.len() {
                    return None;
                }
                (Value::Int(i as i64), a.get(i as i64).ok()?)
            }
            Source::Table(entries) => entries.get(i).cloned()?,
            Source::Str(chars) => {
                if i >= chars.len() {
                    return None;
                }
                (
                    Value::Int(i as i64),
                    Value::Str(Symbol::intern(&chars[i].to_string())),
                )
            }
        };
        self.cursor.set(i + 1);
        Some(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_iteration_yields_index_value_pairs() {
        let a = JarlArray::from_vec(vec![Value::Int(10), Value::Int(20)]);
        let it = JarlIterator::over_array(a);
        let (k0, v0) = it.next().unwrap();
        assert!(matches!(k0, Value::Int(0)));
        assert!(matches!(v0, Value::Int(10)));
        let (k1, _) = it.next().unwrap();
        assert!(matches!(k1, Value::Int(1)));
        assert!(it.next().is_none());
    }

    #[test]
    fn string_iteration_yields_one_glyph_per_step() {
        let it = JarlIterator::over_str(&Symbol::intern("hi"));
        let (k0, v0) = it.next().unwrap();
        assert!(matches!(k0, Value::Int(0)));
        assert!(matches!(v0, Value::Str(s) if s.as_str() == "h"));
        let (_, v1) = it.next().unwrap();
        assert!(matches!(v1, Value::Str(s) if s.as_str() == "i"));
        assert!(it.next().is_none());
    }
}
