//! Growable, ref-counted, in-place-mutable array of values.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::{clamp_range, wrap_index, Value};

#[derive(Clone, Debug)]
pub struct JarlArray(Rc<RefCell<Vec<Value>>>);

impl JarlArray {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
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

    pub fn as_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.borrow_mut().pop()
    }

    pub fn get(&self, index: i64) -> Result<Value, RuntimeError> {
        let items = self.0.borrow();
        wrap_index(index, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| RuntimeError::IndexOutOfRange(format!("{index}")))
    }

    pub fn set(&self, index: i64, value: Value) -> Result<(), RuntimeError> {
        let mut items = self.0.borrow_mut();
        let len = items.len();
        let i = wrap_index(index, len)
            .ok_or_else(|| RuntimeError::IndexOutOfRange(format!("{index}")))?;
        items[i] = value;
        Ok(())
    }

    /// Replaces the element at `index` with `Value::None`, returning the
    /// old value (used by `move target[i]`).
    pub fn take(&self, index: i64) -> Result<Value, RuntimeError> {
        let mut items = self.0.borrow_mut();
        let len = items.len();
        let i = wrap_index(index, len)
            .ok_or_else(|| RuntimeError::IndexOutOfRange(format!("{index}")))?;
        Ok(std::mem::replace(&mut items[i], Value::None))
    }

    pub fn slice_clamped(&self, lo: i64, hi: i64) -> Vec<Value> {
        let items = self.0.borrow();
        let (start, end) = clamp_range(lo, hi, items.len());
        items[start..end].to_vec()
    }

    pub fn iter_snapshot(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }
}

impl Default for JarlArray {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_assignment() {
        let a = JarlArray::from_vec(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        a.set(-1, Value::Int(9)).unwrap();
        assert!(matches!(a.get(-1).unwrap(), Value::Int(9)));
        assert_eq!(a.as_vec().len(), 3);
    }

    #[test]
    fn push_pop() {
        let a = JarlArray::new();
        a.push(Value::Int(1));
        a.push(Value::Int(2));
        assert!(matches!(a.pop(), Some(Value::Int(2))));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn slice_is_clamped() {
        let a = JarlArray::from_vec((1..=5).map(Value::Int).collect());
        let s = a.slice_clamped(1, 4);
        assert_eq!(s.len(), 3);
    }
}
