//! AST passes that run before lowering: constant and copy propagation,
//! constant folding, algebraic rewrites and read analysis.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::algebra::{self, Kind};
use super::error::CompileError;
use crate::ast::{Expr, MatchArm, Pattern, Stmt, SwitchCase};
use crate::value::{OpError, Value, eval_binary, eval_unary};

/// What is known about a local at the current point of the body.
#[derive(Debug, Clone, PartialEq)]
enum Fact {
    Const(Value),
    /// Holds the same value as another local, which is not itself a copy.
    Copy(String),
    Kind(Kind),
}

/// Rewrites a body before lowering. Facts about locals flow forward through
/// straight-line code; a block starts from a copy of the facts and anything
/// it may write is forgotten once it ends, so nothing learned on one path
/// leaks into another.
pub(super) struct Folder {
    facts: HashMap<String, Fact>,
    algebra: bool,
}

impl Folder {
    /// `algebra` turns on identity rewrites and strength reduction.
    pub(super) fn new(algebra: bool) -> Self {
        Self {
            facts: HashMap::new(),
            algebra,
        }
    }

    pub(super) fn fold_body(&mut self, body: &[Stmt]) -> Vec<Stmt> {
        body.iter().map(|stmt| self.fold_stmt(stmt)).collect()
    }

    fn fold_block(&mut self, body: &[Stmt]) -> Vec<Stmt> {
        let saved = self.facts.clone();
        let out = self.fold_body(body);
        self.facts = saved;
        out
    }

    fn fold_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::Declare { name, value } => {
                let value = self.fold_store(name, value);
                Stmt::Declare {
                    name: name.clone(),
                    value,
                }
            }
            Stmt::Assign { name, value } => {
                let value = self.fold_store(name, value);
                Stmt::Assign {
                    name: name.clone(),
                    value,
                }
            }
            Stmt::Return { value } => Stmt::Return {
                value: self.fold_top(value),
            },
            Stmt::Expr { expr } => Stmt::Expr {
                expr: self.fold_top(expr),
            },
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.fold_top(cond);
                let then_body = self.fold_block(then_body);
                let else_body = self.fold_block(else_body);
                let mut written = HashSet::new();
                writes(&then_body, &mut written);
                writes(&else_body, &mut written);
                self.forget(&written);
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                }
            }
            Stmt::While { cond, body } => {
                let mut written = HashSet::new();
                writes(body, &mut written);
                expr_bindings(cond, &mut written);
                self.forget(&written);
                let cond = self.fold_expr(cond);
                let body = self.fold_block(body);
                self.forget(&written);
                Stmt::While { cond, body }
            }
            Stmt::For {
                key,
                value,
                iterable,
                body,
            } => {
                let iterable = self.fold_top(iterable);
                let mut written = HashSet::new();
                writes(body, &mut written);
                written.extend(key.iter().cloned());
                written.insert(value.clone());
                self.forget(&written);
                let body = self.fold_block(body);
                self.forget(&written);
                Stmt::For {
                    key: key.clone(),
                    value: value.clone(),
                    iterable,
                    body,
                }
            }
            Stmt::Switch {
                value,
                cases,
                default,
            } => {
                let mut bound = HashSet::new();
                expr_bindings(value, &mut bound);
                for case in cases {
                    expr_bindings(&case.value, &mut bound);
                }
                self.forget(&bound);
                let value = self.fold_expr(value);
                let cases: Vec<SwitchCase> = cases
                    .iter()
                    .map(|c| SwitchCase {
                        value: self.fold_expr(&c.value),
                        body: self.fold_block(&c.body),
                    })
                    .collect();
                let default = self.fold_block(default);
                let mut written = HashSet::new();
                for case in &cases {
                    writes(&case.body, &mut written);
                }
                writes(&default, &mut written);
                self.forget(&written);
                Stmt::Switch {
                    value,
                    cases,
                    default,
                }
            }
            Stmt::Break => Stmt::Break,
            Stmt::Continue => Stmt::Continue,
        }
    }

    /// Folds an expression that is evaluated once, in order, by its statement.
    fn fold_top(&mut self, expr: &Expr) -> Expr {
        let mut bound = HashSet::new();
        expr_bindings(expr, &mut bound);
        self.forget(&bound);
        self.fold_expr(expr)
    }

    fn fold_store(&mut self, name: &str, value: &Expr) -> Expr {
        let value = self.fold_top(value);
        let fact = match &value {
            Expr::Literal { value } => Some(Fact::Const(value.clone())),
            Expr::Var { name: source } if source != name => Some(Fact::Copy(source.clone())),
            other => self.kind_of(other).map(Fact::Kind),
        };
        self.forget(&HashSet::from([name.to_string()]));
        if let Some(fact) = fact {
            self.facts.insert(name.to_string(), fact);
        }
        value
    }

    /// Drops every fact about `names`, and every copy of them.
    fn forget(&mut self, names: &HashSet<String>) {
        if names.is_empty() {
            return;
        }
        self.facts.retain(|local, fact| {
            !names.contains(local) && !matches!(fact, Fact::Copy(source) if names.contains(source))
        });
    }

    /// The local a read of `name` can be served from, and what it holds.
    fn resolve(&self, name: &str) -> (String, Option<&Fact>) {
        match self.facts.get(name) {
            Some(Fact::Copy(source)) => (source.clone(), self.facts.get(source)),
            fact => (name.to_string(), fact),
        }
    }

    fn kind_of(&self, expr: &Expr) -> Option<Kind> {
        algebra::infer(expr, &|name: &str| match self.resolve(name).1 {
            Some(Fact::Const(value)) => Kind::of_value(value),
            Some(Fact::Kind(kind)) => Some(*kind),
            _ => None,
        })
    }

    /// Replaces reads of known locals and operator trees over literals with
    /// their value. Expressions whose evaluation fails are kept so the
    /// failure still happens at runtime.
    pub(super) fn fold_expr(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Var { name } => match self.resolve(name) {
                (_, Some(Fact::Const(value))) => {
                    trace!(local = %name, "propagated constant");
                    Expr::Literal {
                        value: value.clone(),
                    }
                }
                (source, _) => Expr::Var { name: source },
            },
            Expr::Binary { op, left, right } => {
                let left = self.fold_expr(left);
                let right = self.fold_expr(right);
                if let (Expr::Literal { value: a }, Expr::Literal { value: b }) = (&left, &right) {
                    if let Ok(value) = eval_binary(*op, a, b) {
                        return Expr::Literal { value };
                    }
                }
                if self.algebra {
                    let kinds = |name: &str| self.kind_of(&Expr::var(name));
                    if let Some(simpler) = algebra::simplify(*op, &left, &right, &kinds) {
                        return simpler;
                    }
                }
                Expr::Binary {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            Expr::Unary { op, operand } => {
                let operand = self.fold_expr(operand);
                if let Expr::Literal { value } = &operand {
                    if let Ok(value) = eval_unary(*op, value) {
                        return Expr::Literal { value };
                    }
                }
                Expr::Unary {
                    op: *op,
                    operand: Box::new(operand),
                }
            }
            Expr::Object { fields } => Expr::Object {
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.fold_expr(v)))
                    .collect(),
            },
            Expr::Array { items } => Expr::Array {
                items: items.iter().map(|item| self.fold_expr(item)).collect(),
            },
            Expr::Field { object, field } => Expr::Field {
                object: Box::new(self.fold_expr(object)),
                field: field.clone(),
            },
            Expr::Index { array, index } => Expr::Index {
                array: Box::new(self.fold_expr(array)),
                index: Box::new(self.fold_expr(index)),
            },
            Expr::Call { name, args } => Expr::Call {
                name: name.clone(),
                args: args.iter().map(|arg| self.fold_expr(arg)).collect(),
            },
            Expr::Match { value, arms } => Expr::Match {
                value: Box::new(self.fold_expr(value)),
                arms: arms
                    .iter()
                    .map(|arm| MatchArm {
                        pattern: arm.pattern.clone(),
                        guard: arm.guard.as_ref().map(|g| self.fold_expr(g)),
                        body: self.fold_expr(&arm.body),
                    })
                    .collect(),
            },
            // never lowered; left as written for the error
            Expr::Async { .. } | Expr::Await { .. } | Expr::Literal { .. } => expr.clone(),
        }
    }
}

/// Every local a statement list may write: declarations, assignments, loop
/// variables and `match` bindings, at any depth.
fn writes(body: &[Stmt], out: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Declare { name, value } | Stmt::Assign { name, value } => {
                out.insert(name.clone());
                expr_bindings(value, out);
            }
            Stmt::Return { value } => expr_bindings(value, out),
            Stmt::Expr { expr } => expr_bindings(expr, out),
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                expr_bindings(cond, out);
                writes(then_body, out);
                writes(else_body, out);
            }
            Stmt::While { cond, body } => {
                expr_bindings(cond, out);
                writes(body, out);
            }
            Stmt::For {
                key,
                value,
                iterable,
                body,
            } => {
                out.extend(key.iter().cloned());
                out.insert(value.clone());
                expr_bindings(iterable, out);
                writes(body, out);
            }
            Stmt::Switch {
                value,
                cases,
                default,
            } => {
                expr_bindings(value, out);
                for case in cases {
                    expr_bindings(&case.value, out);
                    writes(&case.body, out);
                }
                writes(default, out);
            }
            Stmt::Break | Stmt::Continue => {}
        }
    }
}

/// Locals written by `match` binding patterns inside an expression.
fn expr_bindings(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Literal { .. } | Expr::Var { .. } => {}
        Expr::Binary { left, right, .. } => {
            expr_bindings(left, out);
            expr_bindings(right, out);
        }
        Expr::Unary { operand, .. } => expr_bindings(operand, out),
        Expr::Object { fields } => fields.iter().for_each(|(_, v)| expr_bindings(v, out)),
        Expr::Array { items } | Expr::Call { args: items, .. } => {
            items.iter().for_each(|v| expr_bindings(v, out))
        }
        Expr::Field { object, .. } => expr_bindings(object, out),
        Expr::Index { array, index } => {
            expr_bindings(array, out);
            expr_bindings(index, out);
        }
        Expr::Match { value, arms } => {
            expr_bindings(value, out);
            for arm in arms {
                if let Pattern::Binding { name } = &arm.pattern {
                    out.insert(name.clone());
                }
                if let Some(guard) = &arm.guard {
                    expr_bindings(guard, out);
                }
                expr_bindings(&arm.body, out);
            }
        }
        Expr::Async { body } => writes(body, out),
        Expr::Await { expr } => expr_bindings(expr, out),
    }
}

/// Rejects operators applied to literal operands of incompatible types, in
/// source order. Runs on the body as written so that no rewrite can turn a
/// runtime failure into a compile error.
pub(super) fn check_literal_types(body: &[Stmt]) -> Result<(), CompileError> {
    for stmt in body {
        match stmt {
            Stmt::Declare { value, .. } | Stmt::Assign { value, .. } | Stmt::Return { value } => {
                check_expr(value)?
            }
            Stmt::Expr { expr } => check_expr(expr)?,
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                check_expr(cond)?;
                check_literal_types(then_body)?;
                check_literal_types(else_body)?;
            }
            Stmt::While { cond, body } => {
                check_expr(cond)?;
                check_literal_types(body)?;
            }
            Stmt::For { iterable, body, .. } => {
                check_expr(iterable)?;
                check_literal_types(body)?;
            }
            Stmt::Switch {
                value,
                cases,
                default,
            } => {
                check_expr(value)?;
                for case in cases {
                    check_expr(&case.value)?;
                    check_literal_types(&case.body)?;
                }
                check_literal_types(default)?;
            }
            Stmt::Break | Stmt::Continue => {}
        }
    }
    Ok(())
}

fn check_expr(expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::Binary { op, left, right } => {
            if let (Some(a), Some(b)) = (const_value(left), const_value(right)) {
                if let Err(err @ OpError::TypeMismatch { .. }) = eval_binary(*op, &a, &b) {
                    return Err(CompileError::semantic(format!("type mismatch: {err}")));
                }
            }
            check_expr(left)?;
            check_expr(right)
        }
        Expr::Unary { op, operand } => {
            if let Some(value) = const_value(operand) {
                if let Err(err @ OpError::UnaryTypeMismatch { .. }) = eval_unary(*op, &value) {
                    return Err(CompileError::semantic(format!("type mismatch: {err}")));
                }
            }
            check_expr(operand)
        }
        Expr::Object { fields } => fields.iter().try_for_each(|(_, v)| check_expr(v)),
        Expr::Array { items } | Expr::Call { args: items, .. } => {
            items.iter().try_for_each(check_expr)
        }
        Expr::Field { object, .. } => check_expr(object),
        Expr::Index { array, index } => {
            check_expr(array)?;
            check_expr(index)
        }
        Expr::Match { value, arms } => {
            check_expr(value)?;
            for arm in arms {
                if let Some(guard) = &arm.guard {
                    check_expr(guard)?;
                }
                check_expr(&arm.body)?;
            }
            Ok(())
        }
        // rejected as unsupported when lowered, without looking inside
        Expr::Async { .. } | Expr::Await { .. } => Ok(()),
        Expr::Literal { .. } | Expr::Var { .. } => Ok(()),
    }
}

/// The value of an expression made only of literals, containers and
/// operators, when it evaluates without error.
pub(super) fn const_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal { value } => Some(value.clone()),
        Expr::Binary { op, left, right } => {
            eval_binary(*op, &const_value(left)?, &const_value(right)?).ok()
        }
        Expr::Unary { op, operand } => eval_unary(*op, &const_value(operand)?).ok(),
        Expr::Array { items } => items
            .iter()
            .map(const_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Expr::Object { fields } => {
            let mut out = indexmap::IndexMap::with_capacity(fields.len());
            for (k, v) in fields {
                out.insert(k.clone(), const_value(v)?);
            }
            Some(Value::Object(out))
        }
        _ => None,
    }
}

/// Evaluating the expression can neither fail nor touch the host.
pub(super) fn is_infallible(expr: &Expr) -> bool {
    match expr {
        Expr::Literal { .. } => true,
        Expr::Array { items } => items.iter().all(is_infallible),
        Expr::Object { fields } => fields.iter().all(|(_, v)| is_infallible(v)),
        _ => false,
    }
}

/// Every local name read anywhere in the body.
pub(super) fn collect_reads(body: &[Stmt], reads: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Declare { value, .. } | Stmt::Assign { value, .. } | Stmt::Return { value } => {
                expr_reads(value, reads)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                expr_reads(cond, reads);
                collect_reads(then_body, reads);
                collect_reads(else_body, reads);
            }
            Stmt::While { cond, body } => {
                expr_reads(cond, reads);
                collect_reads(body, reads);
            }
            Stmt::For { iterable, body, .. } => {
                expr_reads(iterable, reads);
                collect_reads(body, reads);
            }
            Stmt::Switch {
                value,
                cases,
                default,
            } => {
                expr_reads(value, reads);
                for case in cases {
                    expr_reads(&case.value, reads);
                    collect_reads(&case.body, reads);
                }
                collect_reads(default, reads);
            }
            Stmt::Expr { expr } => expr_reads(expr, reads),
            Stmt::Break | Stmt::Continue => {}
        }
    }
}

fn expr_reads(expr: &Expr, reads: &mut HashSet<String>) {
    match expr {
        Expr::Var { name } => {
            reads.insert(name.clone());
        }
        Expr::Literal { .. } => {}
        Expr::Binary { left, right, .. } => {
            expr_reads(left, reads);
            expr_reads(right, reads);
        }
        Expr::Unary { operand, .. } => expr_reads(operand, reads),
        Expr::Object { fields } => fields.iter().for_each(|(_, v)| expr_reads(v, reads)),
        Expr::Array { items } | Expr::Call { args: items, .. } => {
            items.iter().for_each(|v| expr_reads(v, reads))
        }
        Expr::Field { object, .. } => expr_reads(object, reads),
        Expr::Index { array, index } => {
            expr_reads(array, reads);
            expr_reads(index, reads);
        }
        Expr::Match { value, arms } => {
            expr_reads(value, reads);
            for arm in arms {
                if let Some(guard) = &arm.guard {
                    expr_reads(guard, reads);
                }
                expr_reads(&arm.body, reads);
            }
        }
        Expr::Async { body } => collect_reads(body, reads),
        Expr::Await { expr } => expr_reads(expr, reads),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    fn fold(e: &Expr) -> Expr {
        Folder::new(false).fold_expr(e)
    }

    #[test]
    fn folds_nested_literal_arithmetic() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::lit(1i64), Expr::lit(2i64)),
            Expr::lit(4i64),
        );
        assert_eq!(fold(&e), Expr::lit(12i64));
    }

    #[test]
    fn leaves_failing_expressions_alone() {
        let e = Expr::binary(BinaryOp::Div, Expr::lit(1i64), Expr::lit(0i64));
        assert_eq!(fold(&e), e);
    }

    #[test]
    fn constants_and_copies_flow_forward() {
        let body = vec![
            Stmt::declare("a", Expr::lit(2i64)),
            Stmt::declare("b", Expr::var("input")),
            Stmt::ret(Expr::binary(
                BinaryOp::Add,
                Expr::binary(BinaryOp::Mul, Expr::var("a"), Expr::lit(3i64)),
                Expr::var("b"),
            )),
        ];
        let out = Folder::new(false).fold_body(&body);
        assert_eq!(
            out[2],
            Stmt::ret(Expr::binary(BinaryOp::Add, Expr::lit(6i64), Expr::var("input")))
        );
    }

    #[test]
    fn reassigning_the_source_drops_its_copies() {
        let body = vec![
            Stmt::declare("x", Expr::var("input")),
            Stmt::declare("y", Expr::var("x")),
            Stmt::assign("x", Expr::lit(5i64)),
            Stmt::ret(Expr::Array {
                items: vec![Expr::var("x"), Expr::var("y")],
            }),
        ];
        let out = Folder::new(false).fold_body(&body);
        assert_eq!(
            out[3],
            Stmt::ret(Expr::Array {
                items: vec![Expr::lit(5i64), Expr::var("y")],
            })
        );
    }

    #[test]
    fn loops_and_branches_forget_what_they_write() {
        let body = vec![
            Stmt::declare("i", Expr::lit(0i64)),
            Stmt::declare("k", Expr::lit(1i64)),
            Stmt::While {
                cond: Expr::binary(BinaryOp::Lt, Expr::var("i"), Expr::var("k")),
                body: vec![Stmt::assign("i", Expr::lit(9i64))],
            },
            Stmt::If {
                cond: Expr::var("flag"),
                then_body: vec![Stmt::assign("k", Expr::lit(2i64))],
                else_body: vec![],
            },
            Stmt::ret(Expr::Array {
                items: vec![Expr::var("i"), Expr::var("k")],
            }),
        ];
        let out = Folder::new(false).fold_body(&body);
        assert_eq!(
            out[2],
            Stmt::While {
                cond: Expr::binary(BinaryOp::Lt, Expr::var("i"), Expr::lit(1i64)),
                body: vec![Stmt::assign("i", Expr::lit(9i64))],
            }
        );
        assert_eq!(
            out[4],
            Stmt::ret(Expr::Array {
                items: vec![Expr::var("i"), Expr::var("k")],
            })
        );
    }

    #[test]
    fn match_bindings_are_writes() {
        let body = vec![
            Stmt::declare("x", Expr::lit(1i64)),
            Stmt::expr(Expr::Match {
                value: Box::new(Expr::var("input")),
                arms: vec![MatchArm {
                    pattern: Pattern::Binding {
                        name: "x".to_string(),
                    },
                    guard: None,
                    body: Expr::var("x"),
                }],
            }),
            Stmt::ret(Expr::var("x")),
        ];
        let out = Folder::new(false).fold_body(&body);
        assert_eq!(out[2], Stmt::ret(Expr::var("x")));
    }

    #[test]
    fn literal_type_errors_are_found_before_rewriting() {
        let body = vec![Stmt::If {
            cond: Expr::lit(true),
            then_body: vec![Stmt::ret(Expr::binary(
                BinaryOp::Sub,
                Expr::lit("a"),
                Expr::lit(1i64),
            ))],
            else_body: vec![],
        }];
        let err = check_literal_types(&body).expect_err("mismatch");
        assert!(err.is_semantic());

        // only operands that are literals as written count
        let body = vec![
            Stmt::declare("s", Expr::lit("a")),
            Stmt::ret(Expr::binary(BinaryOp::Sub, Expr::var("s"), Expr::lit(1i64))),
        ];
        assert!(check_literal_types(&body).is_ok());
    }

    #[test]
    fn containers_of_literals_are_infallible() {
        let e = Expr::Array {
            items: vec![Expr::lit(1i64), Expr::object(vec![("a", Expr::lit(true))])],
        };
        assert!(is_infallible(&e));
        assert!(!is_infallible(&Expr::var("x")));
    }

    #[test]
    fn reads_include_nested_bodies() {
        let body = vec![Stmt::If {
            cond: Expr::var("flag"),
            then_body: vec![Stmt::ret(Expr::var("x"))],
            else_body: vec![],
        }];
        let mut reads = HashSet::new();
        collect_reads(&body, &mut reads);
        assert!(reads.contains("flag") && reads.contains("x"));
    }
}
