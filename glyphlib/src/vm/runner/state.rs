use std::collections::HashMap;

use crate::bytecode::BytecodeModule;
use crate::value::Value;
use crate::vm::{VmError, VmErrorKind};

use super::err_at;
use super::iter::IterState;

/// Everything one execution owns. Dropped when `execute` returns.
pub(super) struct Frame<'m> {
    pub module: &'m BytecodeModule,
    pub stack: Vec<Value>,
    pub locals: HashMap<String, Value>,
    /// Iterator slots; `None` once exhausted and free for reuse.
    pub iters: Vec<Option<IterState>>,
    max_stack_depth: usize,
}

impl<'m> Frame<'m> {
    pub(super) fn new(
        module: &'m BytecodeModule,
        locals: HashMap<String, Value>,
        max_stack_depth: usize,
    ) -> Self {
        let stack_capacity_hint = (module.code.len() / 4).clamp(8, 256);
        Self {
            module,
            stack: Vec::with_capacity(stack_capacity_hint.min(max_stack_depth.max(1))),
            locals,
            iters: Vec::new(),
            max_stack_depth,
        }
    }

    pub(super) fn push(&mut self, value: Value, ip: usize) -> Result<(), VmError> {
        if self.stack.len() >= self.max_stack_depth {
            return Err(err_at(
                VmErrorKind::StackOverflow,
                format!("operand stack limit exceeded ({})", self.max_stack_depth),
                ip,
            ));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(super) fn pop(&mut self, what: &str, ip: usize) -> Result<Value, VmError> {
        let Some(v) = self.stack.pop() else {
            return Err(err_at(
                VmErrorKind::StackUnderflow,
                format!("{what} expects a value on the stack"),
                ip,
            ));
        };
        Ok(v)
    }

    /// The top `n` values in push order.
    pub(super) fn pop_n(&mut self, n: usize, what: &str, ip: usize) -> Result<Vec<Value>, VmError> {
        if self.stack.len() < n {
            return Err(err_at(
                VmErrorKind::StackUnderflow,
                format!("{what} expects {n} values, stack has {}", self.stack.len()),
                ip,
            ));
        }
        let split = self.stack.len() - n;
        Ok(self.stack.split_off(split))
    }

    pub(super) fn push_const(&mut self, index: u32, ip: usize) -> Result<(), VmError> {
        let Some(v) = self.module.constant(index).cloned() else {
            return Err(err_at(
                VmErrorKind::CorruptBytecode,
                format!("constant index {index} out of bounds"),
                ip,
            ));
        };
        self.push(v, ip)
    }

    fn local_name(&self, index: u32, ip: usize) -> Result<&'m str, VmError> {
        let module: &'m BytecodeModule = self.module;
        module.local_name(index).ok_or_else(|| {
            err_at(
                VmErrorKind::CorruptBytecode,
                format!("local operand {index} does not name a string constant"),
                ip,
            )
        })
    }

    pub(super) fn load_local(&mut self, index: u32, ip: usize) -> Result<(), VmError> {
        let name = self.local_name(index, ip)?;
        let Some(v) = self.locals.get(name).cloned() else {
            return Err(err_at(
                VmErrorKind::UndefinedVariable,
                format!("undefined variable `{name}`"),
                ip,
            ));
        };
        self.push(v, ip)
    }

    pub(super) fn store_local(&mut self, index: u32, ip: usize) -> Result<(), VmError> {
        let name = self.local_name(index, ip)?;
        let v = self.pop("STORE_VAR", ip)?;
        self.locals.insert(name.to_string(), v);
        Ok(())
    }

    pub(super) fn finish_return(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }
}
