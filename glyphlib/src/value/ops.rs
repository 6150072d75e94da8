//! Operator semantics shared by the VM and the compile-time folder.
//!
//! Integer overflow promotes to `Float` (bytecode version 1 contract).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("cannot apply `{op}` to {operand}")]
    UnaryTypeMismatch {
        op: &'static str,
        operand: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
}

pub fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            numeric(op, left, right)
        }
        BinaryOp::Eq => Ok(Value::Bool(loosely_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loosely_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinaryOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

pub fn eval_unary(op: UnaryOp, operand: &Value) -> Result<Value, OpError> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(n)) => Ok(n
            .checked_neg()
            .map(Value::Int)
            .unwrap_or(Value::Float(-(*n as f64)))),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        _ => Err(OpError::UnaryTypeMismatch {
            op: op.symbol(),
            operand: operand.type_name(),
        }),
    }
}

/// Equality as seen by `==`: ints and floats compare numerically.
pub fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loosely_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| loosely_equal(v, other)))
        }
        _ => left == right,
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, OpError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::String(joined))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            Ok(Value::Array(joined))
        }
        _ => numeric(BinaryOp::Add, left, right),
    }
}

fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
        (Value::Int(a), Value::Float(b)) => float_arith(op, *a as f64, *b),
        (Value::Float(a), Value::Int(b)) => float_arith(op, *a, *b as f64),
        (Value::Float(a), Value::Float(b)) => float_arith(op, *a, *b),
        _ => Err(mismatch(op, left, right)),
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<Value, OpError> {
    let exact = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(OpError::DivisionByZero);
            }
            a.checked_div(b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(OpError::DivisionByZero);
            }
            // i64::MIN % -1 is mathematically zero
            return Ok(Value::Int(a.checked_rem(b).unwrap_or(0)));
        }
        _ => return Err(mismatch(op, &Value::Int(a), &Value::Int(b))),
    };
    match exact {
        Some(n) => Ok(Value::Int(n)),
        None => float_arith(op, a as f64, b as f64),
    }
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<Value, OpError> {
    let n = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err(OpError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => return Err(mismatch(op, &Value::Float(a), &Value::Float(b))),
    };
    Ok(Value::Float(n))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => return Err(mismatch(op, left, right)),
    };
    // NaN compares false under every ordering operator
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> OpError {
    OpError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}
