use std::collections::HashSet;

use tracing::trace;

use super::error::CompileError;
use super::fold;
use super::pool::ConstantPool;
use super::scope::ScopeStack;
use crate::ast::{BinaryOp, Expr, MatchArm, Pattern, Stmt, SwitchCase};
use crate::bytecode::{BytecodeModule, Instr};
use crate::value::{UnaryOp, Value};
use crate::vm::builtin_arity;

const PLACEHOLDER: u32 = u32::MAX;

/// Lowers one body (route, event handler, command...) to a single module.
pub(super) struct Lowerer {
    pool: ConstantPool,
    code: Vec<Instr>,
    scopes: ScopeStack,
    loops: Vec<LoopCtx>,
    reads: HashSet<String>,
    /// Basic and above: drop dead stores and emit nothing for code that can
    /// never run.
    optimize: bool,
    pub(super) host_calls: bool,
    next_temp: usize,
}

#[derive(Debug, Clone, Default)]
struct LoopCtx {
    continue_target: u32,
    break_jumps: Vec<usize>,
}

impl Lowerer {
    pub(super) fn new(prelude: &[String], body: &[Stmt], optimize: bool) -> Self {
        let mut reads = HashSet::new();
        if optimize {
            fold::collect_reads(body, &mut reads);
        }
        Self {
            pool: ConstantPool::default(),
            code: Vec::new(),
            scopes: ScopeStack::new(prelude),
            loops: Vec::new(),
            reads,
            optimize,
            host_calls: prelude.iter().any(|n| n == "ws"),
            next_temp: 0,
        }
    }

    /// Statements after a `return`, `break` or `continue` in the same block
    /// are still checked but, when optimizing, emit nothing.
    pub(super) fn lower_body(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        let mut reachable = true;
        for stmt in body {
            if reachable {
                self.lower_stmt(stmt)?;
            } else {
                self.check_only(|lw| lw.lower_stmt(stmt))?;
            }
            if self.optimize && matches!(stmt, Stmt::Return { .. } | Stmt::Break | Stmt::Continue) {
                reachable = false;
            }
        }
        Ok(())
    }

    /// Lowers code that can never run for its errors alone, then discards
    /// everything it emitted. Names it declares stay declared, as they would
    /// without optimization.
    fn check_only(
        &mut self,
        lower: impl FnOnce(&mut Self) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        let code_len = self.code.len();
        let pool_mark = self.pool.mark();
        let breaks: Vec<usize> = self.loops.iter().map(|lp| lp.break_jumps.len()).collect();
        let next_temp = self.next_temp;

        let result = lower(self);

        self.code.truncate(code_len);
        self.pool.rollback(pool_mark);
        for (lp, len) in self.loops.iter_mut().zip(breaks) {
            lp.break_jumps.truncate(len);
        }
        self.next_temp = next_temp;
        if result.is_ok() {
            trace!(at = code_len, "discarded unreachable code");
        }
        result
    }

    /// Seals the stream with `HALT` unless it already ends in a `RETURN` that
    /// nothing jumps past.
    pub(super) fn finish(mut self) -> BytecodeModule {
        let end = self.here();
        let jumps_to_end = self.code.iter().any(|i| i.jump_target() == Some(end));
        if jumps_to_end || !matches!(self.code.last(), Some(Instr::Return)) {
            self.code.push(Instr::Halt);
        }
        BytecodeModule::new(self.pool.into_values(), self.code)
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Declare { name, value } => {
                if self.scopes.declared_here(name) {
                    return Err(CompileError::semantic(format!(
                        "cannot redeclare variable '{name}' in the same scope"
                    )));
                }
                self.lower_store(name, value)?;
                self.bind(name);
            }
            Stmt::Assign { name, value } => {
                if !self.scopes.resolve(name) {
                    return Err(CompileError::semantic(format!(
                        "cannot assign to undeclared variable '{name}'"
                    )));
                }
                self.lower_store(name, value)?;
            }
            Stmt::Return { value } => {
                self.lower_expr(value)?;
                self.emit(Instr::Return);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } if self.optimize && matches!(cond, Expr::Literal { value: Value::Bool(_) }) => {
                let taken = matches!(cond, Expr::Literal { value: Value::Bool(true) });
                if taken {
                    self.lower_block(then_body)?;
                    self.check_only(|lw| lw.lower_block(else_body))?;
                } else {
                    self.check_only(|lw| lw.lower_block(then_body))?;
                    self.lower_block(else_body)?;
                }
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.lower_expr(cond)?;
                let jmp_false_at = self.emit(Instr::JumpIfFalse(PLACEHOLDER));
                self.lower_block(then_body)?;

                if else_body.is_empty() {
                    self.patch(jmp_false_at, self.here());
                } else {
                    let jmp_end_at = self.emit(Instr::Jump(PLACEHOLDER));
                    self.patch(jmp_false_at, self.here());
                    self.lower_block(else_body)?;
                    self.patch(jmp_end_at, self.here());
                }
            }
            Stmt::While { cond, body } => {
                let loop_start = self.here();
                self.lower_expr(cond)?;
                let jmp_false_at = self.emit(Instr::JumpIfFalse(PLACEHOLDER));
                self.loops.push(LoopCtx {
                    continue_target: loop_start,
                    break_jumps: Vec::new(),
                });
                self.lower_block(body)?;
                self.emit(Instr::Jump(loop_start));
                self.close_loop(jmp_false_at);
            }
            Stmt::For {
                key,
                value,
                iterable,
                body,
            } => {
                self.lower_expr(iterable)?;
                self.emit(Instr::GetIter);
                let iter = self.temp("__iter");
                self.store_name(&iter);

                let loop_start = self.here();
                self.load_name(&iter);
                self.emit(Instr::IterHasNext);
                let exit_at = self.emit(Instr::JumpIfFalse(PLACEHOLDER));
                self.load_name(&iter);
                self.emit(Instr::IterNext {
                    with_key: key.is_some(),
                });

                self.scopes.push_block();
                if let Some(key) = key {
                    self.bind(key);
                    self.store_name(key);
                }
                self.bind(value);
                self.store_name(value);
                self.loops.push(LoopCtx {
                    continue_target: loop_start,
                    break_jumps: Vec::new(),
                });
                self.lower_body(body)?;
                self.scopes.pop_block();
                self.emit(Instr::Jump(loop_start));
                self.close_loop(exit_at);
            }
            Stmt::Switch {
                value,
                cases,
                default,
            } => self.lower_switch(value, cases, default)?,
            Stmt::Break => {
                if self.loops.is_empty() {
                    return Err(CompileError::semantic("`break` used outside a loop"));
                }
                let at = self.emit(Instr::Jump(PLACEHOLDER));
                if let Some(lp) = self.loops.last_mut() {
                    lp.break_jumps.push(at);
                }
            }
            Stmt::Continue => {
                let Some(target) = self.loops.last().map(|lp| lp.continue_target) else {
                    return Err(CompileError::semantic("`continue` used outside a loop"));
                };
                self.emit(Instr::Jump(target));
            }
            Stmt::Expr { expr } => {
                self.lower_expr(expr)?;
                self.emit(Instr::Pop);
            }
        }
        Ok(())
    }

    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal { value } => self.push_literal(value.clone()),
            Expr::Var { name } => {
                if !self.scopes.resolve(name) {
                    return Err(CompileError::unsupported(format!(
                        "undefined variable '{name}'"
                    )));
                }
                self.load_name(name);
            }
            Expr::Binary { op, left, right } => {
                match op {
                    BinaryOp::And => self.lower_short_circuit(left, right, false)?,
                    BinaryOp::Or => self.lower_short_circuit(left, right, true)?,
                    _ => {
                        self.lower_expr(left)?;
                        self.lower_expr(right)?;
                        self.emit(binary_instr(*op));
                    }
                }
            }
            Expr::Unary { op, operand } => {
                self.lower_expr(operand)?;
                self.emit(match op {
                    UnaryOp::Not => Instr::Not,
                    UnaryOp::Neg => Instr::Neg,
                });
            }
            Expr::Object { fields } => {
                for (key, value) in fields {
                    self.push_literal(Value::String(key.clone()));
                    self.lower_expr(value)?;
                }
                self.emit(Instr::BuildObject(fields.len() as u32));
            }
            Expr::Array { items } => {
                for item in items {
                    self.lower_expr(item)?;
                }
                self.emit(Instr::BuildArray(items.len() as u32));
            }
            Expr::Field { object, field } => {
                self.lower_expr(object)?;
                self.push_literal(Value::String(field.clone()));
                self.emit(Instr::GetField);
            }
            Expr::Index { array, index } => {
                self.lower_expr(array)?;
                self.lower_expr(index)?;
                self.emit(Instr::GetIndex);
            }
            Expr::Call { name, args } => {
                if name.starts_with("ws.") {
                    return self.lower_ws_call(name, args);
                }
                let Some(arity) = builtin_arity(name) else {
                    return Err(CompileError::unsupported(format!(
                        "call to function '{name}' is not lowered to bytecode"
                    )));
                };
                if !arity.accepts(args.len()) {
                    return Err(CompileError::semantic(format!(
                        "function '{name}' expects {arity} arguments, got {}",
                        args.len()
                    )));
                }
                self.push_literal(Value::String(name.clone()));
                for arg in args {
                    self.lower_expr(arg)?;
                }
                self.emit(Instr::Call(args.len() as u32));
            }
            Expr::Match { value, arms } => self.lower_match(value, arms)?,
            Expr::Async { .. } => {
                return Err(CompileError::unsupported("async blocks are not lowered to bytecode"));
            }
            Expr::Await { .. } => {
                return Err(CompileError::unsupported("await is not lowered to bytecode"));
            }
        }
        Ok(())
    }

    fn lower_block(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        self.scopes.push_block();
        let result = self.lower_body(body);
        self.scopes.pop_block();
        result
    }

    fn lower_store(&mut self, name: &str, value: &Expr) -> Result<(), CompileError> {
        if self.optimize && !self.reads.contains(name) && fold::is_infallible(value) {
            trace!(local = name, "dropping store to a local that is never read");
            return Ok(());
        }
        self.lower_expr(value)?;
        self.store_name(name);
        Ok(())
    }

    /// `a && b` / `a || b` without evaluating `b` when `a` decides the result.
    fn lower_short_circuit(
        &mut self,
        left: &Expr,
        right: &Expr,
        is_or: bool,
    ) -> Result<(), CompileError> {
        self.lower_expr(left)?;
        let short_at = if is_or {
            self.emit(Instr::JumpIfTrue(PLACEHOLDER))
        } else {
            self.emit(Instr::JumpIfFalse(PLACEHOLDER))
        };
        self.lower_expr(right)?;
        let end_at = self.emit(Instr::Jump(PLACEHOLDER));
        self.patch(short_at, self.here());
        self.push_literal(Value::Bool(is_or));
        self.patch(end_at, self.here());
        Ok(())
    }

    fn lower_switch(
        &mut self,
        value: &Expr,
        cases: &[SwitchCase],
        default: &[Stmt],
    ) -> Result<(), CompileError> {
        self.lower_expr(value)?;
        let subject = self.temp("__switch");
        self.store_name(&subject);

        let mut end_jumps = Vec::with_capacity(cases.len());
        for case in cases {
            self.load_name(&subject);
            self.lower_expr(&case.value)?;
            self.emit(Instr::Eq);
            let next_at = self.emit(Instr::JumpIfFalse(PLACEHOLDER));
            self.lower_block(&case.body)?;
            end_jumps.push(self.emit(Instr::Jump(PLACEHOLDER)));
            self.patch(next_at, self.here());
        }
        self.lower_block(default)?;
        let end = self.here();
        for at in end_jumps {
            self.patch(at, end);
        }
        Ok(())
    }

    /// Leaves the value of the first matching arm on the stack, or `null`.
    fn lower_match(&mut self, value: &Expr, arms: &[MatchArm]) -> Result<(), CompileError> {
        self.lower_expr(value)?;
        let subject = self.temp("__match");
        self.store_name(&subject);

        let mut end_jumps = Vec::with_capacity(arms.len());
        for arm in arms {
            self.scopes.push_block();
            let mut fail_jumps = Vec::new();
            match &arm.pattern {
                Pattern::Literal { value } => {
                    self.load_name(&subject);
                    self.push_literal(value.clone());
                    self.emit(Instr::Eq);
                    fail_jumps.push(self.emit(Instr::JumpIfFalse(PLACEHOLDER)));
                }
                Pattern::Binding { name } => {
                    self.load_name(&subject);
                    self.bind(name);
                    self.store_name(name);
                }
                Pattern::Wildcard => {}
            }
            if let Some(guard) = &arm.guard {
                self.lower_expr(guard)?;
                fail_jumps.push(self.emit(Instr::JumpIfFalse(PLACEHOLDER)));
            }
            self.lower_expr(&arm.body)?;
            end_jumps.push(self.emit(Instr::Jump(PLACEHOLDER)));
            let next = self.here();
            for at in fail_jumps {
                self.patch(at, next);
            }
            self.scopes.pop_block();
        }
        self.push_literal(Value::Null);
        let end = self.here();
        for at in end_jumps {
            self.patch(at, end);
        }
        Ok(())
    }

    fn close_loop(&mut self, exit_at: usize) {
        let end = self.here();
        self.patch(exit_at, end);
        if let Some(lp) = self.loops.pop() {
            for at in lp.break_jumps {
                self.patch(at, end);
            }
        }
    }

    /// Makes `name` visible in the innermost scope unless an outer one has it.
    fn bind(&mut self, name: &str) {
        if !self.scopes.resolve(name) {
            self.scopes.declare(name);
        }
    }

    fn temp(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}_{}", self.next_temp);
        self.next_temp += 1;
        name
    }

    pub(super) fn emit(&mut self, instr: Instr) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    pub(super) fn push_literal(&mut self, value: Value) {
        let idx = self.pool.push_literal(value);
        self.emit(Instr::Push(idx));
    }

    fn load_name(&mut self, name: &str) {
        let idx = self.pool.intern_name(name);
        self.emit(Instr::LoadVar(idx));
    }

    fn store_name(&mut self, name: &str) {
        let idx = self.pool.intern_name(name);
        self.emit(Instr::StoreVar(idx));
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    fn patch(&mut self, at: usize, target: u32) {
        self.code[at] = self.code[at].with_target(target);
    }
}

fn binary_instr(op: BinaryOp) -> Instr {
    match op {
        BinaryOp::Add => Instr::Add,
        BinaryOp::Sub => Instr::Sub,
        BinaryOp::Mul => Instr::Mul,
        BinaryOp::Div => Instr::Div,
        BinaryOp::Mod => Instr::Mod,
        BinaryOp::Eq => Instr::Eq,
        BinaryOp::Ne => Instr::Ne,
        BinaryOp::Lt => Instr::Lt,
        BinaryOp::Le => Instr::Le,
        BinaryOp::Gt => Instr::Gt,
        BinaryOp::Ge => Instr::Ge,
        BinaryOp::And => Instr::And,
        BinaryOp::Or => Instr::Or,
    }
}
