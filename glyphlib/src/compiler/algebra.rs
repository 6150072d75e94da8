//! Identity rewrites and strength reduction for the aggressive level.
//!
//! Every rewrite must give the same value, or the same error, as the
//! original operator under `value::ops`: ints overflow into floats, `-0.0`
//! is kept apart from `0.0`, and `+` concatenates strings. So a rewrite only
//! fires when the operand's kind is known, and an operand that would be
//! dropped or evaluated twice must be a plain variable or literal.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::value::Value;

/// What an expression is known to evaluate to, when it evaluates at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Kind {
    Int,
    Float,
    /// Int or float; integer arithmetic can overflow into a float.
    Number,
    Bool,
}

impl Kind {
    fn is_numeric(self) -> bool {
        matches!(self, Kind::Int | Kind::Float | Kind::Number)
    }

    pub(super) fn of_value(value: &Value) -> Option<Kind> {
        match value {
            Value::Int(_) => Some(Kind::Int),
            Value::Float(_) => Some(Kind::Float),
            Value::Bool(_) => Some(Kind::Bool),
            _ => None,
        }
    }
}

/// Kind of `expr`; `var` answers for locals.
pub(super) fn infer(expr: &Expr, var: &dyn Fn(&str) -> Option<Kind>) -> Option<Kind> {
    match expr {
        Expr::Literal { value } => Kind::of_value(value),
        Expr::Var { name } => var(name),
        Expr::Binary { op, left, right } => {
            let l = infer(left, var);
            let r = infer(right, var);
            match op {
                BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge => Some(Kind::Bool),
                // the right operand is the result whenever the left does not decide
                BinaryOp::And | BinaryOp::Or => (l? == Kind::Bool && r? == Kind::Bool)
                    .then_some(Kind::Bool),
                BinaryOp::Mod => arithmetic(l?, r?, Kind::Int),
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                    arithmetic(l?, r?, Kind::Number)
                }
            }
        }
        Expr::Unary { op, operand } => match op {
            UnaryOp::Not => Some(Kind::Bool),
            UnaryOp::Neg => match infer(operand, var)? {
                Kind::Float => Some(Kind::Float),
                k if k.is_numeric() => Some(Kind::Number),
                _ => None,
            },
        },
        Expr::Call { name, .. } => match name.as_str() {
            "length" | "index_of" => Some(Kind::Int),
            "contains" | "starts_with" | "ends_with" => Some(Kind::Bool),
            _ => None,
        },
        _ => None,
    }
}

/// Result kind of a numeric operator; `int_result` is what two ints give.
fn arithmetic(l: Kind, r: Kind, int_result: Kind) -> Option<Kind> {
    if !l.is_numeric() || !r.is_numeric() {
        return None;
    }
    if l == Kind::Float || r == Kind::Float {
        return Some(Kind::Float);
    }
    if l == Kind::Int && r == Kind::Int {
        return Some(int_result);
    }
    Some(Kind::Number)
}

/// A cheaper expression with the same meaning as `left op right`, if any.
pub(super) fn simplify(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    var: &dyn Fn(&str) -> Option<Kind>,
) -> Option<Expr> {
    let kind = |e: &Expr| infer(e, var);
    match op {
        BinaryOp::Add => {
            // -0.0 + 0 is 0.0, so only ints keep their identity
            let (x, zero) = with_literal(left, right)?;
            (is_int(zero, 0) && kind(x) == Some(Kind::Int)).then(|| x.clone())
        }
        BinaryOp::Sub => {
            let zero = literal(right)?;
            let fits = match zero {
                Value::Int(0) => kind(left).is_some_and(Kind::is_numeric),
                Value::Float(f) if *f == 0.0 && f.is_sign_positive() => {
                    kind(left) == Some(Kind::Float)
                }
                _ => false,
            };
            fits.then(|| left.clone())
        }
        BinaryOp::Mul => {
            let (x, c) = with_literal(left, right)?;
            if is_unit(c, kind(x)) {
                return Some(x.clone());
            }
            if is_int(c, 0) && kind(x) == Some(Kind::Int) && is_plain(x) {
                return Some(Expr::lit(0i64));
            }
            // x * 2 overflows exactly when x + x does, to the same float
            if is_int(c, 2) && kind(x).is_some_and(Kind::is_numeric) && is_plain(x) {
                return Some(Expr::binary(BinaryOp::Add, x.clone(), x.clone()));
            }
            None
        }
        BinaryOp::Div => {
            let one = literal(right)?;
            is_unit(one, kind(left)).then(|| left.clone())
        }
        BinaryOp::And => short_circuit(left, right, false, &kind),
        BinaryOp::Or => short_circuit(left, right, true, &kind),
        _ => None,
    }
}

/// `true && x` is `x`, `false && x` is `false`; `||` mirrors it. With the
/// literal on the right, `x` is still evaluated and must be a bool.
fn short_circuit(
    left: &Expr,
    right: &Expr,
    is_or: bool,
    kind: &dyn Fn(&Expr) -> Option<Kind>,
) -> Option<Expr> {
    if let Some(Value::Bool(b)) = literal(left) {
        return Some(if *b == is_or {
            Expr::lit(is_or)
        } else {
            right.clone()
        });
    }
    let Some(Value::Bool(b)) = literal(right) else {
        return None;
    };
    if kind(left) != Some(Kind::Bool) {
        return None;
    }
    if *b == is_or {
        is_plain(left).then(|| Expr::lit(is_or))
    } else {
        Some(left.clone())
    }
}

/// `x * 1` and `x / 1`. An int one keeps any number as it is; a float one
/// would turn an int into a float, so it needs a float operand.
fn is_unit(c: &Value, kind: Option<Kind>) -> bool {
    match c {
        Value::Int(1) => kind.is_some_and(Kind::is_numeric),
        Value::Float(f) => *f == 1.0 && kind == Some(Kind::Float),
        _ => false,
    }
}

/// The non-literal side and the literal of a commutative pair.
fn with_literal<'e>(left: &'e Expr, right: &'e Expr) -> Option<(&'e Expr, &'e Value)> {
    match (literal(left), literal(right)) {
        (None, Some(c)) => Some((left, c)),
        (Some(c), None) => Some((right, c)),
        _ => None,
    }
}

fn literal(e: &Expr) -> Option<&Value> {
    match e {
        Expr::Literal { value } => Some(value),
        _ => None,
    }
}

fn is_int(v: &Value, n: i64) -> bool {
    matches!(v, Value::Int(m) if *m == n)
}

/// Reading it cannot fail or touch the host, so it may be dropped or
/// repeated.
fn is_plain(e: &Expr) -> bool {
    matches!(e, Expr::Var { .. } | Expr::Literal { .. })
}
