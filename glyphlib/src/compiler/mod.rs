//! Route and handler compiler.
//!
//! Internals are split into:
//! - `error`: the semantic / unsupported failure buckets
//! - `scope`: lexical name checks
//! - `pool`: constant pool building and deduplication
//! - `lowering`: statement and expression lowering
//! - `websocket`: WebSocket routes and `ws.*` host calls
//! - `fold` + `algebra` + `peephole`: optimizer passes

mod algebra;
mod error;
mod fold;
mod lowering;
mod peephole;
mod pool;
mod scope;
mod websocket;

use std::fmt;
use std::str::FromStr;

use tracing::{debug, instrument};

pub use error::{CompileError, CompileErrorKind};
pub use websocket::{CompiledWebSocketRoute, WsEvent};

use crate::ast::{InjectionKind, Injection, Item, Route, Stmt, route_param_names};
use crate::bytecode::BytecodeModule;
use lowering::Lowerer;

/// How much work the compiler does after lowering. Never changes behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptimizationLevel {
    /// One instruction sequence per AST node, nothing removed.
    #[default]
    None,
    /// Constant folding, dead-store elimination, constant-load merging.
    Basic,
    /// Basic plus jump threading and constant-pool deduplication.
    Aggressive,
}

impl OptimizationLevel {
    /// Numeric levels as used on command lines; anything above 2 saturates.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => OptimizationLevel::None,
            1 => OptimizationLevel::Basic,
            _ => OptimizationLevel::Aggressive,
        }
    }
}

impl FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(OptimizationLevel::None),
            "basic" => Ok(OptimizationLevel::Basic),
            "aggressive" => Ok(OptimizationLevel::Aggressive),
            other => other
                .parse::<u8>()
                .ok()
                .filter(|n| *n <= 3)
                .map(OptimizationLevel::from_level)
                .ok_or_else(|| format!("unknown optimization level `{s}`")),
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizationLevel::None => "none",
            OptimizationLevel::Basic => "basic",
            OptimizationLevel::Aggressive => "aggressive",
        };
        write!(f, "{name}")
    }
}

/// Output of [`Compiler::compile_item`], one variant per item kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledItem {
    Route { key: String, bytecode: Vec<u8> },
    WebSocket(CompiledWebSocketRoute),
    Command { name: String, bytecode: Vec<u8> },
    CronTask { name: String, bytecode: Vec<u8> },
    EventHandler { event_type: String, bytecode: Vec<u8> },
    QueueWorker { queue_name: String, bytecode: Vec<u8> },
    /// Type and function declarations carry no executable body of their own.
    Declaration { name: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Compiler {
    level: OptimizationLevel,
}

impl Compiler {
    pub fn new(level: OptimizationLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> OptimizationLevel {
        self.level
    }

    pub fn compile_route(&self, route: &Route) -> Result<Vec<u8>, CompileError> {
        self.compile_route_module(route).map(|m| m.to_bytes())
    }

    #[instrument(level = "debug", skip_all, fields(method = route.method.as_str(), path = %route.path))]
    pub fn compile_route_module(&self, route: &Route) -> Result<BytecodeModule, CompileError> {
        reject_database_injections(&route.injections)?;
        let mut prelude = route_param_names(&route.path);
        prelude.extend(route.injections.iter().map(|i| i.name.clone()));
        prelude.extend(["query", "input", "ws"].map(str::to_string));
        if route.auth.is_some() {
            prelude.push("auth".to_string());
        }
        self.compile_body(&prelude, &route.body)
    }

    /// Compiles any top-level item. Adding an item kind fails to build here
    /// until it is handled.
    pub fn compile_item(&self, item: &Item) -> Result<CompiledItem, CompileError> {
        match item {
            Item::Route(route) => Ok(CompiledItem::Route {
                key: format!("{} {}", route.method.as_str(), route.path),
                bytecode: self.compile_route(route)?,
            }),
            Item::WebSocketRoute(route) => {
                Ok(CompiledItem::WebSocket(self.compile_websocket_route(route)?))
            }
            Item::TypeDef(def) => Ok(CompiledItem::Declaration {
                name: def.name.clone(),
            }),
            Item::Function(func) => Ok(CompiledItem::Declaration {
                name: func.name.clone(),
            }),
            Item::Command(cmd) => Ok(CompiledItem::Command {
                name: cmd.name.clone(),
                bytecode: self.compile_body(&cmd.params, &cmd.body)?.to_bytes(),
            }),
            Item::CronTask(task) => {
                reject_database_injections(&task.injections)?;
                let prelude = injection_names(&task.injections);
                Ok(CompiledItem::CronTask {
                    name: task.name.clone(),
                    bytecode: self.compile_body(&prelude, &task.body)?.to_bytes(),
                })
            }
            Item::EventHandler(handler) => {
                reject_database_injections(&handler.injections)?;
                let mut prelude = injection_names(&handler.injections);
                prelude.push("event".to_string());
                Ok(CompiledItem::EventHandler {
                    event_type: handler.event_type.clone(),
                    bytecode: self.compile_body(&prelude, &handler.body)?.to_bytes(),
                })
            }
            Item::QueueWorker(worker) => {
                reject_database_injections(&worker.injections)?;
                let mut prelude = injection_names(&worker.injections);
                prelude.push("message".to_string());
                Ok(CompiledItem::QueueWorker {
                    queue_name: worker.queue_name.clone(),
                    bytecode: self.compile_body(&prelude, &worker.body)?.to_bytes(),
                })
            }
        }
    }

    /// Lowers one body with `prelude` pre-declared, then runs the passes the
    /// level asks for.
    pub(crate) fn compile_body(
        &self,
        prelude: &[String],
        body: &[Stmt],
    ) -> Result<BytecodeModule, CompileError> {
        fold::check_literal_types(body)?;
        let optimize = self.level >= OptimizationLevel::Basic;
        let aggressive = self.level >= OptimizationLevel::Aggressive;
        let folded;
        let body = if optimize {
            folded = fold::Folder::new(aggressive).fold_body(body);
            &folded[..]
        } else {
            body
        };

        let mut lowerer = Lowerer::new(prelude, body, optimize);
        lowerer.lower_body(body)?;
        let mut module = lowerer.finish();
        let lowered_len = module.code.len();

        if optimize {
            peephole::merge_constant_loads(&mut module);
        }
        if aggressive {
            peephole::thread_jumps(&mut module.code);
            pool::deduplicate(&mut module);
        }
        debug!(
            level = %self.level,
            lowered = lowered_len,
            emitted = module.code.len(),
            constants = module.constants.len(),
            "compiled body"
        );
        Ok(module)
    }
}

fn reject_database_injections(injections: &[Injection]) -> Result<(), CompileError> {
    match injections.iter().find(|i| i.kind == InjectionKind::Database) {
        Some(db) => Err(CompileError::unsupported(format!(
            "database injection '{}' requires the interpreter",
            db.name
        ))),
        None => Ok(()),
    }
}

fn injection_names(injections: &[Injection]) -> Vec<String> {
    injections.iter().map(|i| i.name.clone()).collect()
}
