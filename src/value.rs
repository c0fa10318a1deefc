//! [`Value`] implementation: the closed tagged union every opcode operates on.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;

/// A runtime value. Strings are reference-counted (`Rc`, not `Arc`) because
/// the VM is single-threaded by design and the language has no object type
/// that could introduce a cycle back into a string.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// 64-bit signed integer. Arithmetic wraps on overflow, uniformly with
    /// the JIT's int-specialized code (see `DESIGN.md`).
    Integer(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Immutable, reference-counted string.
    String(Rc<str>),
    /// The unit value; falsy, displays as `"none"`.
    None,
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Rc::from(v))
    }
}

impl Value {
    /// A Value's truthiness, as used by `JUMP_IF_FALSE`, `NOT`, `AND`, `OR`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::None => false,
        }
    }

    /// Returns `Some(i)` if this value is an `Integer`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns `Some(f)` if this value is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric promotion used by `+ - * /` and comparisons: widen to `f64`
    /// when either operand is a `Float`.
    fn promote(a: &Value, b: &Value) -> Option<(f64, f64)> {
        match (a, b) {
            (Value::Integer(x), Value::Float(y)) => Some((*x as f64, *y)),
            (Value::Float(x), Value::Integer(y)) => Some((*x, *y as f64)),
            (Value::Float(x), Value::Float(y)) => Some((*x, *y)),
            _ => None,
        }
    }

    /// `a + b`: integer wrap-add, float add with promotion, or string
    /// concatenation of the display forms if either side is a `String`.
    pub fn add(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(*b))),
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::from(format!("{}{}", self, other)))
            }
            _ => match Value::promote(self, other) {
                Some((a, b)) => Ok(Value::Float(a + b)),
                None => Err(RuntimeError::TypeMismatch {
                    op: "+",
                    lhs: self.type_name(),
                    rhs: other.type_name(),
                }),
            },
        }
    }

    /// `a - b`.
    pub fn sub(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_sub(*b))),
            _ => match Value::promote(self, other) {
                Some((a, b)) => Ok(Value::Float(a - b)),
                None => Err(RuntimeError::TypeMismatch {
                    op: "-",
                    lhs: self.type_name(),
                    rhs: other.type_name(),
                }),
            },
        }
    }

    /// `a * b`.
    pub fn mul(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_mul(*b))),
            _ => match Value::promote(self, other) {
                Some((a, b)) => Ok(Value::Float(a * b)),
                None => Err(RuntimeError::TypeMismatch {
                    op: "*",
                    lhs: self.type_name(),
                    rhs: other.type_name(),
                }),
            },
        }
    }

    /// `a / b`. Integer division by zero is a [`RuntimeError::DivisionByZero`];
    /// float division by zero produces IEEE infinities/NaN, not an error.
    pub fn div(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Integer(_), Value::Integer(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_div(*b))),
            _ => match Value::promote(self, other) {
                Some((a, b)) => Ok(Value::Float(a / b)),
                None => Err(RuntimeError::TypeMismatch {
                    op: "/",
                    lhs: self.type_name(),
                    rhs: other.type_name(),
                }),
            },
        }
    }

    /// `a % b`. Only defined on integer pairs.
    pub fn rem(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Integer(_), Value::Integer(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_rem(*b))),
            _ => Err(RuntimeError::TypeMismatch {
                op: "%",
                lhs: self.type_name(),
                rhs: other.type_name(),
            }),
        }
    }

    /// Unary `-`.
    pub fn neg(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Integer(a) => Ok(Value::Integer(a.wrapping_neg())),
            Value::Float(a) => Ok(Value::Float(-a)),
            _ => Err(RuntimeError::TypeMismatch {
                op: "unary -",
                lhs: self.type_name(),
                rhs: self.type_name(),
            }),
        }
    }

    /// Bitwise/logical ops, defined only on integer pairs.
    pub fn bit_and(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.int_binop(other, "&", |a, b| a & b)
    }

    /// `|`.
    pub fn bit_or(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.int_binop(other, "|", |a, b| a | b)
    }

    /// `^`.
    pub fn bit_xor(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.int_binop(other, "^", |a, b| a ^ b)
    }

    /// `<<`, right operand taken modulo 64.
    pub fn shl(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.int_binop(other, "<<", |a, b| a.wrapping_shl(b as u32 & 63))
    }

    /// `>>`, right operand taken modulo 64 (arithmetic shift).
    pub fn shr(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.int_binop(other, ">>", |a, b| a.wrapping_shr(b as u32 & 63))
    }

    /// `~`.
    pub fn bit_not(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Integer(a) => Ok(Value::Integer(!a)),
            _ => Err(RuntimeError::TypeMismatch {
                op: "~",
                lhs: self.type_name(),
                rhs: self.type_name(),
            }),
        }
    }

    fn int_binop(
        &self,
        other: &Value,
        op: &'static str,
        f: impl FnOnce(i64, i64) -> i64,
    ) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(f(*a, *b))),
            _ => Err(RuntimeError::TypeMismatch {
                op,
                lhs: self.type_name(),
                rhs: other.type_name(),
            }),
        }
    }

    /// Logical `and`: truthiness of both operands, not short-circuiting —
    /// bytecode has no lazy evaluation, both operands are already on the stack.
    pub fn logical_and(&self, other: &Value) -> Value {
        Value::Integer((self.is_truthy() && other.is_truthy()) as i64)
    }

    /// Logical `or`.
    pub fn logical_or(&self, other: &Value) -> Value {
        Value::Integer((self.is_truthy() || other.is_truthy()) as i64)
    }

    /// Logical `not`.
    pub fn logical_not(&self) -> Value {
        Value::Integer(!self.is_truthy() as i64)
    }

    /// Numeric/lexicographic ordering. `None` and cross-type (other than the
    /// numeric promotion) combinations fail.
    pub fn partial_cmp_checked(&self, other: &Value) -> Result<Ordering, RuntimeError> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => match Value::promote(self, other) {
                Some((a, b)) => a.partial_cmp(&b).ok_or(RuntimeError::TypeMismatch {
                    op: "compare",
                    lhs: self.type_name(),
                    rhs: other.type_name(),
                }),
                None => Err(RuntimeError::TypeMismatch {
                    op: "compare",
                    lhs: self.type_name(),
                    rhs: other.type_name(),
                }),
            },
        }
    }

    /// Cross-type equality never fails: distinct variants simply compare unequal.
    pub fn values_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::None, Value::None) => true,
            _ => match Value::promote(self, other) {
                Some((a, b)) => a == b,
                None => false,
            },
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::None => "None",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::None => write!(f, "none"),
        }
    }
}
