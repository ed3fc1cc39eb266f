//! Unordered value→value mapping.
//!
//! Hashing/equality for keys is defined on the value's discriminant plus
//! payload: string keys hash by interned-string identity (reusing
//! `Symbol`'s own pointer-based `Hash`), numerics by bit pattern, and
//! containers/functions by `Rc` identity. This is deliberately a
//! *different* notion of equality than the language-level `==` operator
//! (`Value::eq_value`), which rejects cross-type comparisons outright.
//! A table's internal key comparison must be total and infallible, so it
//! lives here as a private wrapper rather than on `Value` itself.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::value::Value;

#[derive(Clone, Debug)]
struct Key(Value);

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (&self.0, &other.0) {
            (None, None) => true,
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            (Array(a), Array(b)) => a.ptr_eq(b),
            (Table(a), Table(b)) => a.ptr_eq(b),
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Partial(a), Partial(b)) => Rc::ptr_eq(a, b),
            (Iterator(a), Iterator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            None | Null => {}
            Bool(b) => b.hash(state),
            Int(i) => i.hash(state),
            Float(f) => f.to_bits().hash(state),
            Str(s) => s.hash(state),
            Array(a) => a.as_ptr_usize().hash(state),
            Table(t) => t.as_ptr_usize().hash(state),
            Function(f) => (Rc::as_ptr(f) as usize).hash(state),
            Partial(p) => (Rc::as_ptr(p) as usize).hash(state),
            Iterator(i) => (Rc::as_ptr(i) as usize).hash(state),
        }
    }
}

#[derive(Clone, Debug)]
pub struct JarlTable(Rc<std::cell::RefCell<FxHashMap<Key, Value>>>);

impl JarlTable {
    pub fn new() -> Self {
        Self(Rc::new(std::cell::RefCell::new(FxHashMap::default())))
    }

    pub fn from_pairs(pairs: Vec<(Value, Value)>) -> Self {
        let mut map = FxHashMap::default();
        for (k, v) in pairs {
            map.insert(Key(k), v);
        }
        Self(Rc::new(std::cell::RefCell::new(map)))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_ptr_usize(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.0.borrow().get(&Key(key.clone())).cloned()
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.0.borrow().contains_key(&Key(key.clone()))
    }

    pub fn set(&self, key: Value, value: Value) {
        self.0.borrow_mut().insert(Key(key), value);
    }

    /// Removes `key`, returning its old value (`Value::Null` if absent),
    /// used by `move target[key]`.
    pub fn take(&self, key: &Value) -> Value {
        self.0
            .borrow_mut()
            .remove(&Key(key.clone()))
            .unwrap_or(Value::Null)
    }

    /// Snapshot of every `(key, value)` pair, in arbitrary order. Tables
    /// are explicitly unordered; iterating one only requires both pairs
    /// to appear in *some* order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect()
    }
}

impl Default for JarlTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarl_util::Symbol;

    #[test]
    fn string_keys_compare_by_interned_identity() {
        let t = JarlTable::new();
        t.set(Value::Str(Symbol::intern("a")), Value::Int(1));
        assert!(t.contains_key(&Value::Str(Symbol::intern("a"))));
    }

    #[test]
    fn distinct_numeric_keys() {
        let t = JarlTable::new();
        t.set(Value::Int(1), Value::Str(Symbol::intern("one")));
        t.set(Value::Int(2), Value::Str(Symbol::intern("two")));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn missing_key_reads_as_null() {
        let t = JarlTable::new();
        assert!(matches!(t.get(&Value::Int(1)), None));
    }
}
