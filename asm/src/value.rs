use crate::grammer::ast::{BinaryOp, UnaryOp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Result of a compile-time expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
}

/// Size class of an integral value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Width {
    Byte,
    Word,
    Wide,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("The {0} operator cannot be applied on a {1} value")]
    Unary(&'static str, &'static str),

    #[error("The {0} operator cannot be applied on {1} and {2} values")]
    Binary(&'static str, &'static str, &'static str),

    #[error("Divide by zero error")]
    DivideByZero,

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("The arguments of '{0}' do not match any of its signatures")]
    Signature(String),

    #[error("An argument of '{0}' is out of its domain")]
    Domain(String),

    #[error("A string value cannot be longer than {0} characters")]
    StringTooLong(usize),

    #[error("A string value cannot be used as a condition")]
    Condition,

    #[error("$CNT is used outside of a loop")]
    LoopCounter,

    #[error("Macro parameter {{{{{0}}}}} is used outside of a macro")]
    MacroParam(String),
}

/// Longest string an expression may produce
pub const MAX_STRING: usize = 10000;

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
        }
    }

    /// Integral view, `true` reads as 1
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            v => v.as_integer().map(|i| i as f64),
        }
    }

    /// Truth of a condition; strings have none
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::Real(r) => Some(*r != 0.0),
            Value::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view truncated into the 16-bit address space
    pub fn as_word(&self) -> Option<u16> {
        match self {
            Value::Real(r) => Some(*r as i64 as u16),
            v => v.as_integer().map(|i| i as u16),
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Integer(_))
    }

    pub fn width(&self) -> Width {
        match self.as_integer() {
            Some(i) if (-128..=255).contains(&i) => Width::Byte,
            Some(i) if (-32768..=65535).contains(&i) => Width::Word,
            _ => Width::Wide,
        }
    }

    pub fn unary(&self, op: UnaryOp) -> Result<Value, ExprError> {
        let fail = || ExprError::Unary(op.symbol(), self.type_name());
        match op {
            UnaryOp::Pos => match self {
                Value::String(_) => Err(fail()),
                Value::Bool(b) => Ok(Value::Integer(*b as i64)),
                v => Ok(v.clone()),
            },
            UnaryOp::Neg => match self {
                Value::Real(r) => Ok(Value::Real(-r)),
                v => v
                    .as_integer()
                    .map(|i| Value::Integer(i.wrapping_neg()))
                    .ok_or_else(fail),
            },
            UnaryOp::Not => self.as_bool().map(|b| Value::Bool(!b)).ok_or_else(fail),
            UnaryOp::Inv => self
                .as_integer()
                .map(|i| Value::Integer(!i))
                .ok_or_else(fail),
        }
    }

    pub fn binary(&self, op: BinaryOp, rhs: &Value) -> Result<Value, ExprError> {
        use BinaryOp::*;
        let fail = || ExprError::Binary(op.symbol(), self.type_name(), rhs.type_name());

        // Strings: concatenation and comparison only
        if let (Value::String(l), Value::String(r)) = (self, rhs) {
            return match op {
                Add => {
                    if l.len() + r.len() > MAX_STRING {
                        Err(ExprError::StringTooLong(MAX_STRING))
                    } else {
                        Ok(Value::String(format!("{l}{r}")))
                    }
                }
                Eq | Ne | Lt | Le | Gt | Ge => Ok(Value::Bool(compare(op, l.cmp(r)))),
                _ => Err(fail()),
            };
        }
        if matches!(self, Value::String(_)) || matches!(rhs, Value::String(_)) {
            return Err(fail());
        }

        // Bitwise and shift operators are integral only
        if matches!(op, And | Or | Xor | Shl | Shr) {
            let (Some(l), Some(r)) = (self.as_integer(), rhs.as_integer()) else {
                return Err(fail());
            };
            let value = match op {
                And => l & r,
                Or => l | r,
                Xor => l ^ r,
                Shl => {
                    if (0..64).contains(&r) {
                        l.wrapping_shl(r as u32)
                    } else {
                        0
                    }
                }
                _ => {
                    if (0..64).contains(&r) {
                        l >> r
                    } else if l < 0 {
                        -1
                    } else {
                        0
                    }
                }
            };
            return Ok(Value::Integer(value));
        }

        if let (Some(l), Some(r)) = (self.as_integer(), rhs.as_integer()) {
            let value = match op {
                Add => l.wrapping_add(r),
                Sub => l.wrapping_sub(r),
                Mul => l.wrapping_mul(r),
                Div | Mod if r == 0 => return Err(ExprError::DivideByZero),
                Div => l.wrapping_div(r),
                Mod => l.wrapping_rem(r),
                _ => return Ok(Value::Bool(compare(op, l.cmp(&r)))),
            };
            return Ok(Value::Integer(value));
        }

        // Mixed numeric operands promote to real
        let (Some(l), Some(r)) = (self.as_real(), rhs.as_real()) else {
            return Err(fail());
        };
        let value = match op {
            Add => l + r,
            Sub => l - r,
            Mul => l * r,
            Div | Mod if r == 0.0 => return Err(ExprError::DivideByZero),
            Div => l / r,
            Mod => l % r,
            _ => {
                let ord = l.partial_cmp(&r);
                return Ok(Value::Bool(match ord {
                    Some(ord) => compare(op, ord),
                    None => op == Ne,
                }));
            }
        };
        Ok(Value::Real(value))
    }
}

fn compare(op: BinaryOp, ord: Ordering) -> bool {
    use BinaryOp::*;
    match op {
        Eq => ord == Ordering::Equal,
        Ne => ord != Ordering::Equal,
        Lt => ord == Ordering::Less,
        Le => ord != Ordering::Greater,
        Gt => ord == Ordering::Greater,
        Ge => ord != Ordering::Less,
        _ => false,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int(i: i64) -> Value {
        Value::Integer(i)
    }

    #[test]
    fn coercion() {
        assert_eq!(
            Value::Bool(true).binary(BinaryOp::Add, &int(123)),
            Ok(int(124))
        );
        assert_eq!(
            Value::Real(1.0).binary(BinaryOp::Eq, &Value::Bool(true)),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            int(3).binary(BinaryOp::Div, &Value::Real(2.0)),
            Ok(Value::Real(1.5))
        );
        assert_eq!(int(7).binary(BinaryOp::Mod, &int(4)), Ok(int(3)));
    }

    #[test]
    fn strings() {
        let abc = Value::String("abc".into());
        assert_eq!(
            abc.binary(BinaryOp::Add, &int(1)),
            Err(ExprError::Binary("+", "string", "integer"))
        );
        assert_eq!(
            abc.binary(BinaryOp::Add, &Value::String("d".into())),
            Ok(Value::String("abcd".into()))
        );
        assert_eq!(
            abc.binary(BinaryOp::Lt, &Value::String("abd".into())),
            Ok(Value::Bool(true))
        );
        assert!(abc.unary(UnaryOp::Neg).is_err());
        assert!(abc.unary(UnaryOp::Not).is_err());
    }

    #[test]
    fn faults() {
        assert_eq!(
            int(1).binary(BinaryOp::Div, &int(0)),
            Err(ExprError::DivideByZero)
        );
        assert_eq!(
            Value::Real(1.0).binary(BinaryOp::Mod, &Value::Real(0.0)),
            Err(ExprError::DivideByZero)
        );
        assert!(Value::Real(1.5).binary(BinaryOp::And, &int(1)).is_err());
        assert!(Value::Real(1.5).unary(UnaryOp::Inv).is_err());
        assert_eq!(int(1).binary(BinaryOp::Shl, &int(4)), Ok(int(16)));
    }

    #[test]
    fn unary_and_width() {
        assert_eq!(int(0).unary(UnaryOp::Not), Ok(Value::Bool(true)));
        assert_eq!(int(0x0F).unary(UnaryOp::Inv), Ok(int(!0x0F)));
        assert_eq!(int(200).width(), Width::Byte);
        assert_eq!(int(-200).width(), Width::Word);
        assert_eq!(int(70000).width(), Width::Wide);
        assert_eq!(int(-1).as_word(), Some(0xFFFF));
    }
}
