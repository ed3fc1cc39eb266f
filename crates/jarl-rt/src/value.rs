//! The tagged value and the language-level operations defined on it
//! (arithmetic, comparison, concatenation, indexing, slicing, coercion).

use std::rc::Rc;

use jarl_util::Symbol;

use crate::array::JarlArray;
use crate::error::RuntimeError;
use crate::function::{Function, Partial};
use crate::iter::JarlIterator;
use crate::table::JarlTable;

/// A Jarl runtime value. Every heap-backed variant is a reference-counted
/// handle (`Rc`): cloning a `Value` bumps a refcount rather than copying
/// the payload. Copying increments refcounts; moving transfers ownership
/// without touching counts. `None` is the moved-from state left behind
/// by `move`.
#[derive(Clone, Debug)]
pub enum Value {
    None,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Symbol),
    Array(JarlArray),
    Table(JarlTable),
    Function(Rc<Function>),
    Partial(Rc<Partial>),
    Iterator(Rc<JarlIterator>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Partial(_) => "function",
            Value::Iterator(_) => "iterator",
        }
    }

    fn mismatch(op: &str, a: &Value, b: &Value) -> RuntimeError {
        RuntimeError::TypeMismatch(format!(
            "cannot {op} {} and {}",
            a.type_name(),
            b.type_name()
        ))
    }

    // ---- arithmetic -------------------------------------------------------

    pub fn add(&self, other: &Value) -> Result<Value, RuntimeError> {
        numeric_binop(self, other, "add", |a, b| a + b, |a, b| a + b)
    }

    pub fn sub(&self, other: &Value) -> Result<Value, RuntimeError> {
        numeric_binop(self, other, "subtract", |a, b| a - b, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value, RuntimeError> {
        numeric_binop(self, other, "multiply", |a, b| a * b, |a, b| a * b)
    }

    pub fn div(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
            _ => numeric_binop(self, other, "divide", |_, _| unreachable!(), |a, b| a / b),
        }
    }

    pub fn rem(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
            _ => numeric_binop(self, other, "take the modulus of", |_, _| unreachable!(), |a, b| {
                a % b
            }),
        }
    }

    pub fn neg(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Int(v) => Ok(Value::Int(-v)),
            Value::Float(v) => Ok(Value::Float(-v)),
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }

    pub fn not(&self) -> Result<Value, RuntimeError> {
        Ok(Value::Bool(!self.to_bool()?))
    }

    /// Polymorphic concatenation (`++`): string-with-scalar yields a
    /// string, array-with-array extends, array-with-scalar appends or
    /// prepends depending on which side is the array.
    pub fn concat(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Str(a), b) if matches!(b, Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)) => {
                Ok(Value::Str(Symbol::intern(&format!(
                    "{}{}",
                    a.as_str(),
                    display_scalar(b)
                ))))
            }
            (Value::Array(a), Value::Array(b)) => {
                let mut items = a.as_vec();
                items.extend(b.as_vec());
                Ok(Value::Array(JarlArray::from_vec(items)))
            }
            (Value::Array(a), other) => {
                let mut items = a.as_vec();
                items.push(other.clone());
                Ok(Value::Array(JarlArray::from_vec(items)))
            }
            (other, Value::Array(b)) => {
                let mut items = vec![other.clone()];
                items.extend(b.as_vec());
                Ok(Value::Array(JarlArray::from_vec(items)))
            }
            _ => Err(Self::mismatch("concatenate", self, other)),
        }
    }

    // ---- comparison ---------------------------------------------------------

    /// `-1 | 0 | 1` for same-typed numerics and strings.
    pub fn cmp(&self, other: &Value) -> Result<i64, RuntimeError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(cmp_ord(a, b)),
            (Value::Float(a), Value::Float(b)) => Ok(cmp_ord(a, b)),
            (Value::Int(a), Value::Float(b)) => Ok(cmp_ord(&(*a as f64), b)),
            (Value::Float(a), Value::Int(b)) => Ok(cmp_ord(a, &(*b as f64))),
            (Value::Str(a), Value::Str(b)) => Ok(cmp_ord(&a.as_str(), &b.as_str())),
            (Value::Bool(a), Value::Bool(b)) => Ok(cmp_ord(a, b)),
            _ => Err(Self::mismatch("compare", self, other)),
        }
    }

    pub fn eq_value(&self, other: &Value) -> Result<bool, RuntimeError> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Array(a), Value::Array(b)) => Ok(a.ptr_eq(b)),
            (Value::Table(a), Value::Table(b)) => Ok(a.ptr_eq(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                Ok(self.cmp(other)? == 0)
            }
            _ => Err(Self::mismatch("compare", self, other)),
        }
    }

    /// `==`/`!=`/`>`/`<`/`>=`/`<=`: unlike the dedicated `Cmp` opcode's call
    /// to [`Value::cmp`], these never widen across numeric types — spec.md
    /// §4.6 limits them to "values of the same type only". A cross-type
    /// `Int`/`Float` pair must fail here even though `cmp` itself still
    /// widens for `<=>`.
    pub fn relational(&self, other: &Value, which: Relational) -> Result<Value, RuntimeError> {
        if std::mem::discriminant(self) != std::mem::discriminant(other) {
            return Err(Self::mismatch("compare", self, other));
        }
        let result = match which {
            Relational::Eq => self.eq_value(other)?,
            Relational::Ne => !self.eq_value(other)?,
            Relational::Gt => self.cmp(other)? > 0,
            Relational::Lt => self.cmp(other)? < 0,
            Relational::Geq => self.cmp(other)? >= 0,
            Relational::Leq => self.cmp(other)? <= 0,
        };
        Ok(Value::Bool(result))
    }

    /// Membership test: `x in array|table|string`.
    pub fn contains(&self, haystack: &Value) -> Result<bool, RuntimeError> {
        match haystack {
            Value::Array(a) => {
                for item in a.as_vec() {
                    if item.eq_value(self).unwrap_or(false) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Table(t) => Ok(t.contains_key(self)),
            Value::Str(s) => match self {
                Value::Str(needle) => Ok(s.as_str().contains(needle.as_str())),
                _ => Err(RuntimeError::TypeMismatch(
                    "'in' on a string requires a string needle".into(),
                )),
            },
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot test membership in {}",
                other.type_name()
            ))),
        }
    }

    // ---- indexing / slicing -------------------------------------------------

    pub fn get(&self, index: &Value) -> Result<Value, RuntimeError> {
        match self {
            Value::Array(a) => {
                let i = index.to_int()?;
                a.get(i)
            }
            Value::Str(s) => {
                let i = index.to_int()?;
                let chars: Vec<char> = s.as_str().chars().collect();
                let idx = wrap_index(i, chars.len())
                    .ok_or_else(|| RuntimeError::IndexOutOfRange(format!("{i}")))?;
                Ok(Value::Str(Symbol::intern(&chars[idx].to_string())))
            }
            Value::Table(t) => Ok(t.get(index).unwrap_or(Value::Null)),
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot index {}",
                other.type_name()
            ))),
        }
    }

    pub fn slice(&self, lo: &Value, hi: &Value) -> Result<Value, RuntimeError> {
        match self {
            Value::Array(a) => Ok(Value::Array(JarlArray::from_vec(
                a.slice_clamped(lo.to_int()?, hi.to_int()?),
            ))),
            Value::Str(s) => {
                let chars: Vec<char> = s.as_str().chars().collect();
                let (start, end) = clamp_range(lo.to_int()?, hi.to_int()?, chars.len());
                let text: String = chars[start..end].iter().collect();
                Ok(Value::Str(Symbol::intern(&text)))
            }
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot slice {}",
                other.type_name()
            ))),
        }
    }

    // ---- coercion -----------------------------------------------------------

    pub fn to_bool(&self) -> Result<bool, RuntimeError> {
        Ok(match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Null | Value::None => false,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Table(t) => !t.is_empty(),
            Value::Function(_) | Value::Partial(_) | Value::Iterator(_) => true,
        })
    }

    pub fn to_int(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Bool(b) => Ok(*b as i64),
            Value::Str(s) => s
                .as_str()
                .trim()
                .parse()
                .map_err(|_| RuntimeError::TypeMismatch(format!("cannot parse '{s}' as int"))),
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot convert {} to int",
                other.type_name()
            ))),
        }
    }

    pub fn to_float(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::Str(s) => s
                .as_str()
                .trim()
                .parse()
                .map_err(|_| RuntimeError::TypeMismatch(format!("cannot parse '{s}' as float"))),
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot convert {} to float",
                other.type_name()
            ))),
        }
    }

    pub fn to_jarl_string(&self) -> String {
        match self {
            Value::None => "none".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.as_str().to_string(),
            Value::Array(a) => {
                let items: Vec<String> = a.as_vec().iter().map(Value::to_jarl_string).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Table(t) => {
                let entries: Vec<String> = t
                    .entries()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_jarl_string(), v.to_jarl_string()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Value::Function(_) | Value::Partial(_) => "<function>".to_string(),
            Value::Iterator(_) => "<iterator>".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relational {
    Eq,
    Ne,
    Gt,
    Lt,
    Geq,
    Leq,
}

fn display_scalar(v: &Value) -> String {
    v.to_jarl_string()
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn cmp_ord<T: PartialOrd>(a: &T, b: &T) -> i64 {
    if a < b {
        -1
    } else if a > b {
        1
    } else {
        0
    }
}

/// Arithmetic widening: `Int op Int -> Int` (except division, handled by
/// the caller), anything touching a `Float` widens to `Float`.
fn numeric_binop(
    a: &Value,
    b: &Value,
    op_name: &str,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(*x, *y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(float_op(*x as f64, *y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(float_op(*x, *y as f64))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(float_op(*x, *y))),
        _ => Err(Value::mismatch(op_name, a, b)),
    }
}

/// Negative-index wraparound: `-1` means the last element. Returns `None`
/// when out of range after wrapping.
pub fn wrap_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { i + len } else { i };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(idx as usize)
    }
}

/// Clamps `[lo, hi)` with negative wraparound; an inverted range clamps to
/// empty rather than erroring.
pub fn clamp_range(lo: i64, hi: i64, len: usize) -> (usize, usize) {
    let len_i = len as i64;
    let clamp = |i: i64| -> i64 {
        let wrapped = if i < 0 { i + len_i } else { i };
        wrapped.clamp(0, len_i)
    };
    let start = clamp(lo);
    let end = clamp(hi);
    if start >= end {
        (start as usize, start as usize)
    } else {
        (start as usize, end as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_int_add_stays_int() {
        let v = Value::Int(1).add(&Value::Int(2)).unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn int_float_add_widens() {
        let v = Value::Int(1).add(&Value::Float(2.5)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 3.5));
    }

    #[test]
    fn int_division_truncates() {
        let v = Value::Int(7).div(&Value::Int(2)).unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(Value::Int(1).div(&Value::Int(0)).is_err());
    }

    #[test]
    fn wrap_index_negative() {
        assert_eq!(wrap_index(-1, 3), Some(2));
        assert_eq!(wrap_index(-4, 3), None);
        assert_eq!(wrap_index(3, 3), None);
    }

    #[test]
    fn clamp_range_inverted_is_empty() {
        assert_eq!(clamp_range(3, 1, 5), (3, 3));
    }

    #[test]
    fn string_concat_with_int() {
        let v = Value::Str(Symbol::intern("n = ")).concat(&Value::Int(5)).unwrap();
        assert!(matches!(v, Value::Str(s) if s.as_str() == "n = 5"));
    }

    #[test]
    fn cross_type_eq_is_an_error() {
        assert!(Value::Int(1).eq_value(&Value::Str(Symbol::intern("1"))).is_err());
    }

    #[test]
    fn cmp_widens_across_int_and_float() {
        assert_eq!(Value::Int(1).cmp(&Value::Float(1.0)).unwrap(), 0);
        assert_eq!(Value::Int(1).cmp(&Value::Float(1.5)).unwrap(), -1);
    }

    #[test]
    fn relational_rejects_cross_type_int_float() {
        assert!(Value::Int(1).relational(&Value::Float(1.0), Relational::Eq).is_err());
        assert!(Value::Int(1).relational(&Value::Float(1.5), Relational::Lt).is_err());
    }

    #[test]
    fn relational_compares_same_type_numerics() {
        let v = Value::Int(1).relational(&Value::Int(2), Relational::Lt).unwrap();
        assert!(matches!(v, Value::Bool(true)));
        let v = Value::Float(2.0).relational(&Value::Float(2.0), Relational::Eq).unwrap();
        assert!(matches!(v, Value::Bool(true)));
    }

    #[test]
    fn bool_ordering_is_supported() {
        let v = Value::Bool(true).relational(&Value::Bool(false), Relational::Gt).unwrap();
        assert!(matches!(v, Value::Bool(true)));
    }
}
