mod common;

use std::sync::Arc;

use common::{s, vm_with};
use glyphlib::ast::{Expr, Stmt, WebSocketRoute};
use glyphlib::compiler::{CompileErrorKind, CompiledWebSocketRoute, Compiler, OptimizationLevel, WsEvent};
use glyphlib::value::Value;
use glyphlib::vm::{HostCall, HostError, RecordingHandler, VmErrorKind, WebSocketHandler};

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(name, args)
}

fn compile(route: &WebSocketRoute) -> CompiledWebSocketRoute {
    Compiler::new(OptimizationLevel::Basic)
        .compile_websocket_route(route)
        .expect("compile websocket route")
}

fn event_locals(room: &str, input: Value) -> Vec<(&'static str, Value)> {
    vec![
        ("room", s(room)),
        ("client", s("c1")),
        ("input", input),
        ("ws", Value::Null),
    ]
}

#[test]
fn connect_handler_drives_the_hub() {
    let route = WebSocketRoute {
        path: "/rooms/:room".to_string(),
        on_connect: Some(vec![
            Stmt::expr(call("ws.join", vec![Expr::var("room")])),
            Stmt::expr(call(
                "ws.broadcast_to_room",
                vec![
                    Expr::var("room"),
                    Expr::object(vec![("joined", Expr::var("client"))]),
                ],
            )),
            Stmt::ret(Expr::object(vec![
                ("clients", call("ws.get_room_clients", vec![Expr::var("room")])),
                ("rooms", call("ws.get_room_count", vec![])),
                ("online", call("ws.get_connection_count", vec![])),
                ("uptime", call("ws.get_uptime", vec![])),
            ])),
        ]),
        ..WebSocketRoute::default()
    };
    let compiled = compile(&route);
    assert!(compiled.on_message.is_none());
    let bytecode = compiled.handler(WsEvent::Connect).expect("connect handler");

    let hub = Arc::new(RecordingHandler::new("c1").with_stats(3, 60));
    let mut vm = vm_with(&event_locals("lobby", Value::Null));
    vm.set_websocket_handler(hub.clone());
    let out = vm.execute(bytecode).expect("run connect");

    assert_eq!(
        out,
        Value::object([
            ("clients", Value::Array(vec![s("c1")])),
            ("rooms", Value::Int(1)),
            ("online", Value::Int(3)),
            ("uptime", Value::Int(60)),
        ])
    );
    assert_eq!(
        hub.calls(),
        vec![
            HostCall::Join("lobby".to_string()),
            HostCall::BroadcastToRoom {
                room: "lobby".to_string(),
                message: Value::object([("joined", s("c1"))]),
            },
        ]
    );
}

#[test]
fn disconnect_leaves_and_closes() {
    let route = WebSocketRoute {
        path: "/rooms/:room".to_string(),
        on_disconnect: Some(vec![
            Stmt::expr(call("ws.leave", vec![Expr::var("room")])),
            Stmt::expr(call("ws.close", vec![])),
            Stmt::ret(call("ws.get_rooms", vec![])),
        ]),
        ..WebSocketRoute::default()
    };
    let compiled = compile(&route);
    let hub = Arc::new(RecordingHandler::new("c1"));
    hub.join_room("lobby").expect("join");
    let mut vm = vm_with(&event_locals("lobby", Value::Null));
    vm.set_websocket_handler(hub.clone());

    let out = vm
        .execute(compiled.handler(WsEvent::Disconnect).expect("disconnect handler"))
        .expect("run disconnect");
    assert_eq!(out, Value::Array(vec![]));
    assert_eq!(
        hub.calls(),
        vec![
            HostCall::Join("lobby".to_string()),
            HostCall::Leave("lobby".to_string()),
            HostCall::Close(String::new()),
        ]
    );
}

#[test]
fn actions_without_a_hub_fail_but_counters_read_zero() {
    let route = WebSocketRoute {
        path: "/live".to_string(),
        on_message: Some(vec![Stmt::ret(Expr::Array {
            items: vec![
                call("ws.get_connection_count", vec![]),
                call("ws.get_uptime", vec![]),
            ],
        })]),
        on_error: Some(vec![Stmt::expr(call("ws.send", vec![Expr::var("input")]))]),
        ..WebSocketRoute::default()
    };
    let compiled = compile(&route);
    let vm = vm_with(&[("client", s("c1")), ("input", s("boom"))]);

    let out = vm
        .execute(compiled.handler(WsEvent::Message).expect("message handler"))
        .expect("counters");
    assert_eq!(out, Value::Array(vec![Value::Int(0), Value::Int(0)]));

    let err = vm
        .execute(compiled.handler(WsEvent::Error).expect("error handler"))
        .expect_err("send without a hub");
    assert_eq!(err.kind, VmErrorKind::HostUnavailable);
    assert_eq!(err.code(), "E-VM-HOST-UNAVAILABLE");
}

struct Offline;

impl WebSocketHandler for Offline {
    fn send(&self, _: &Value) -> Result<(), HostError> {
        Err(HostError::new("socket closed"))
    }
    fn broadcast(&self, _: &Value) -> Result<(), HostError> {
        Err(HostError::new("socket closed"))
    }
    fn broadcast_to_room(&self, _: &str, _: &Value) -> Result<(), HostError> {
        Err(HostError::new("socket closed"))
    }
    fn join_room(&self, _: &str) -> Result<(), HostError> {
        Err(HostError::new("socket closed"))
    }
    fn leave_room(&self, _: &str) -> Result<(), HostError> {
        Err(HostError::new("socket closed"))
    }
    fn close(&self, _: &str) -> Result<(), HostError> {
        Ok(())
    }
    fn rooms(&self) -> Result<Vec<String>, HostError> {
        Ok(vec![])
    }
    fn room_clients(&self, _: &str) -> Result<Vec<String>, HostError> {
        Ok(vec![])
    }
    fn connection_count(&self) -> Result<i64, HostError> {
        Ok(0)
    }
    fn uptime(&self) -> Result<i64, HostError> {
        Ok(0)
    }
}

#[test]
fn handler_failures_surface_as_host_errors() {
    let route = WebSocketRoute {
        path: "/live".to_string(),
        on_message: Some(vec![Stmt::expr(call("ws.send", vec![Expr::var("input")]))]),
        ..WebSocketRoute::default()
    };
    let compiled = compile(&route);
    let mut vm = vm_with(&[("input", s("hi"))]);
    vm.set_websocket_handler(Arc::new(Offline));
    let err = vm
        .execute(compiled.handler(WsEvent::Message).expect("message handler"))
        .expect_err("offline hub");
    assert_eq!(err.kind, VmErrorKind::HostError);
    assert!(err.message.contains("WS_SEND failed: socket closed"), "{err}");
}

#[test]
fn handler_compile_errors_name_the_event() {
    let bad_arity = WebSocketRoute {
        path: "/live".to_string(),
        on_message: Some(vec![Stmt::expr(call(
            "ws.send",
            vec![Expr::lit(1i64), Expr::lit(2i64)],
        ))]),
        ..WebSocketRoute::default()
    };
    let err = Compiler::default()
        .compile_websocket_route(&bad_arity)
        .expect_err("arity");
    assert_eq!(err.kind, CompileErrorKind::Semantic);
    assert!(err.message.starts_with("message handler:"), "{err}");

    let exclusion = WebSocketRoute {
        path: "/live".to_string(),
        on_connect: Some(vec![Stmt::expr(call(
            "ws.broadcast",
            vec![Expr::lit("hi"), Expr::var("client")],
        ))]),
        ..WebSocketRoute::default()
    };
    let err = Compiler::default()
        .compile_websocket_route(&exclusion)
        .expect_err("exclusion list");
    assert!(err.is_recoverable(), "{err}");
}
