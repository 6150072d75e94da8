//! Bytecode VM entrypoint and public VM surface.
//!
//! Internals are split into:
//! - `error`: VM runtime error types
//! - `config`: execution limits and tracing
//! - `host_trait` + `host`: the WebSocket capability boundary
//! - `builtins`: functions reachable through `CALL`
//! - `runner`: interpreter loop and instruction handlers

mod builtins;
mod config;
mod error;
mod host;
mod host_trait;
mod runner;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bytecode::BytecodeModule;
use crate::value::Value;

pub use builtins::{Arity, builtin_arity, builtin_names};
pub use config::{DEFAULT_MAX_STACK_DEPTH, DEFAULT_MAX_STEPS, VmConfig};
pub use error::{VmError, VmErrorKind};
pub use host::{HostCall, RecordingHandler};
pub use host_trait::{HostError, WebSocketHandler};

/// Holds the locals and capability to seed each execution with. Executions
/// never share state: every `execute` call runs in a fresh frame.
#[derive(Clone, Default)]
pub struct Vm {
    config: VmConfig,
    locals: HashMap<String, Value>,
    ws: Option<Arc<dyn WebSocketHandler>>,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("config", &self.config)
            .field("locals", &self.locals)
            .field("websocket_handler", &self.ws.is_some())
            .finish()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> VmConfig {
        self.config
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn set_websocket_handler(&mut self, handler: Arc<dyn WebSocketHandler>) {
        self.ws = Some(handler);
    }

    /// Decodes, validates and runs `bytecode`.
    pub fn execute(&self, bytecode: &[u8]) -> Result<Value, VmError> {
        let module = BytecodeModule::from_bytes(bytecode)?;
        self.execute_module(&module)
    }

    pub fn execute_module(&self, module: &BytecodeModule) -> Result<Value, VmError> {
        module.validate()?;
        runner::run(module, self.locals.clone(), self.ws.as_deref(), self.config)
    }
}
