//! One-time choice between the VM and the interpreter for a route.

use tracing::{debug, warn};

use crate::ast::Route;
use crate::compiler::{CompileError, Compiler, OptimizationLevel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Bytecode(Vec<u8>),
    /// The route uses constructs the compiler does not lower.
    Interpreter { reason: String },
}

impl ExecutionStrategy {
    pub fn is_bytecode(&self) -> bool {
        matches!(self, ExecutionStrategy::Bytecode(_))
    }
}

/// Compiles `route` once. Unsupported constructs select the interpreter;
/// semantic errors are returned and never downgraded.
pub fn select_strategy(
    route: &Route,
    level: OptimizationLevel,
) -> Result<ExecutionStrategy, CompileError> {
    match Compiler::new(level).compile_route(route) {
        Ok(bytecode) => {
            debug!(path = %route.path, bytes = bytecode.len(), "route runs on the VM");
            Ok(ExecutionStrategy::Bytecode(bytecode))
        }
        Err(err) if err.is_recoverable() => {
            warn!(path = %route.path, reason = %err.message, "route falls back to the interpreter");
            Ok(ExecutionStrategy::Interpreter {
                reason: err.message,
            })
        }
        Err(err) => Err(err),
    }
}
