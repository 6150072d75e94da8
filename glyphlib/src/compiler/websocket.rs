use tracing::debug;

use super::Compiler;
use super::error::CompileError;
use super::lowering::Lowerer;
use crate::ast::{Expr, Stmt, WebSocketRoute, route_param_names};
use crate::bytecode::Instr;
use crate::value::Value;

/// Bytecode for each handler of a WebSocket route. Handlers the route does
/// not declare stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledWebSocketRoute {
    pub path: String,
    pub on_connect: Option<Vec<u8>>,
    pub on_message: Option<Vec<u8>>,
    pub on_disconnect: Option<Vec<u8>>,
    pub on_error: Option<Vec<u8>>,
}

impl CompiledWebSocketRoute {
    pub fn handler(&self, event: WsEvent) -> Option<&[u8]> {
        match event {
            WsEvent::Connect => self.on_connect.as_deref(),
            WsEvent::Message => self.on_message.as_deref(),
            WsEvent::Disconnect => self.on_disconnect.as_deref(),
            WsEvent::Error => self.on_error.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WsEvent {
    Connect,
    Message,
    Disconnect,
    Error,
}

impl WsEvent {
    pub fn name(self) -> &'static str {
        match self {
            WsEvent::Connect => "connect",
            WsEvent::Message => "message",
            WsEvent::Disconnect => "disconnect",
            WsEvent::Error => "error",
        }
    }
}

/// Locals every WebSocket handler can read: path params, the hub handle,
/// the connection id and the event payload.
pub(super) fn event_prelude(path: &str) -> Vec<String> {
    let mut names = route_param_names(path);
    names.extend(["ws", "client", "input"].map(str::to_string));
    names
}

impl Compiler {
    pub fn compile_websocket_route(
        &self,
        route: &WebSocketRoute,
    ) -> Result<CompiledWebSocketRoute, CompileError> {
        let prelude = event_prelude(&route.path);
        let compile = |event: WsEvent, body: &Option<Vec<Stmt>>| {
            body.as_ref()
                .map(|stmts| {
                    self.compile_body(&prelude, stmts)
                        .map(|module| module.to_bytes())
                        .map_err(|e| e.in_context(&format!("{} handler", event.name())))
                })
                .transpose()
        };
        let compiled = CompiledWebSocketRoute {
            path: route.path.clone(),
            on_connect: compile(WsEvent::Connect, &route.on_connect)?,
            on_message: compile(WsEvent::Message, &route.on_message)?,
            on_disconnect: compile(WsEvent::Disconnect, &route.on_disconnect)?,
            on_error: compile(WsEvent::Error, &route.on_error)?,
        };
        debug!(
            path = %route.path,
            connect = compiled.on_connect.is_some(),
            message = compiled.on_message.is_some(),
            disconnect = compiled.on_disconnect.is_some(),
            "compiled websocket route"
        );
        Ok(compiled)
    }
}

impl Lowerer {
    /// `ws.*` calls map onto the host-call opcodes. Each leaves one value on
    /// the stack so they compose like any other expression.
    pub(super) fn lower_ws_call(&mut self, name: &str, args: &[Expr]) -> Result<(), CompileError> {
        if !self.host_calls {
            return Err(CompileError::unsupported(format!(
                "'{name}' needs a WebSocket hub, which this context does not provide"
            )));
        }
        let expect = |n: usize| {
            if args.len() == n {
                Ok(())
            } else {
                Err(CompileError::semantic(format!(
                    "{name} expects {n} argument(s), got {}",
                    args.len()
                )))
            }
        };
        match name {
            "ws.send" => {
                expect(1)?;
                self.lower_args(args)?;
                self.emit(Instr::WsSend);
            }
            "ws.broadcast" => {
                if args.len() == 2 {
                    return Err(CompileError::unsupported(
                        "ws.broadcast with an exclusion list is not lowered to bytecode",
                    ));
                }
                expect(1)?;
                self.lower_args(args)?;
                self.emit(Instr::WsBroadcast);
            }
            "ws.broadcast_to_room" => {
                expect(2)?;
                self.lower_args(args)?;
                self.emit(Instr::WsBroadcastRoom);
            }
            "ws.join" => {
                expect(1)?;
                self.lower_args(args)?;
                self.emit(Instr::WsJoinRoom);
            }
            "ws.leave" => {
                expect(1)?;
                self.lower_args(args)?;
                self.emit(Instr::WsLeaveRoom);
            }
            "ws.close" => {
                if args.is_empty() {
                    self.push_literal(Value::String(String::new()));
                } else {
                    expect(1)?;
                    self.lower_args(args)?;
                }
                self.emit(Instr::WsClose);
            }
            "ws.get_rooms" => {
                expect(0)?;
                self.emit(Instr::WsGetRooms);
            }
            "ws.get_room_users" | "ws.get_room_clients" => {
                expect(1)?;
                self.lower_args(args)?;
                self.emit(Instr::WsGetClients);
            }
            "ws.get_room_count" => {
                expect(0)?;
                self.push_literal(Value::String("length".into()));
                self.emit(Instr::WsGetRooms);
                self.emit(Instr::Call(1));
            }
            "ws.get_room_user_count" => {
                expect(1)?;
                self.push_literal(Value::String("length".into()));
                self.lower_args(args)?;
                self.emit(Instr::WsGetClients);
                self.emit(Instr::Call(1));
            }
            "ws.get_connection_count" => {
                expect(0)?;
                self.emit(Instr::WsGetConnCount);
            }
            "ws.get_uptime" => {
                expect(0)?;
                self.emit(Instr::WsGetUptime);
            }
            _ => {
                return Err(CompileError::unsupported(format!(
                    "WebSocket function '{name}' is not lowered to bytecode"
                )));
            }
        }
        Ok(())
    }

    fn lower_args(&mut self, args: &[Expr]) -> Result<(), CompileError> {
        for arg in args {
            self.lower_expr(arg)?;
        }
        Ok(())
    }
}
