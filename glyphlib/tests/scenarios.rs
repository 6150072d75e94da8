mod common;

use common::{ALL_LEVELS, compile_err, compile_ok, route, route_at, run_ok, s};
use glyphlib::ast::{BinaryOp, Expr, Stmt, WebSocketRoute};
use glyphlib::compiler::{Compiler, OptimizationLevel, WsEvent};
use glyphlib::decompiler::decompile;
use glyphlib::value::Value;
use glyphlib::vm::Vm;

#[test]
fn literal_object_route_runs_at_every_numeric_level() {
    let r = route_at(
        "/hello",
        vec![Stmt::ret(Expr::object(vec![(
            "text",
            Expr::lit("Hello, World!"),
        )]))],
    );
    for n in 0..=3u8 {
        let bytecode = compile_ok(&r, OptimizationLevel::from_level(n));
        assert!(!bytecode.is_empty());
        assert_eq!(
            run_ok(&bytecode, &[]),
            Value::object([("text", s("Hello, World!"))])
        );
    }
}

#[test]
fn duplicate_declaration_is_semantic_at_every_level() {
    let r = route(vec![
        Stmt::declare("x", Expr::lit(1i64)),
        Stmt::declare("x", Expr::lit(2i64)),
        Stmt::ret(Expr::var("x")),
    ]);
    for level in ALL_LEVELS {
        let err = compile_err(&r, level);
        assert!(err.is_semantic(), "{level}: {err}");
        assert!(err.message.contains("'x'"));
    }
}

#[test]
fn decompiling_nothing_reports_invalid_bytecode() {
    let err = decompile(&[]).expect_err("empty input must not decode");
    assert!(err.to_string().contains("invalid bytecode"), "{err}");
}

#[test]
fn websocket_route_with_only_a_message_handler() {
    let ws = WebSocketRoute {
        path: "/chat/:room".to_string(),
        on_message: Some(vec![Stmt::ret(Expr::object(vec![
            ("room", Expr::var("room")),
            ("echo", Expr::call("upper", vec![Expr::var("input")])),
        ]))]),
        ..WebSocketRoute::default()
    };
    for level in ALL_LEVELS {
        let compiled = Compiler::new(level)
            .compile_websocket_route(&ws)
            .expect("compile websocket route");
        assert!(compiled.on_connect.is_none());
        assert!(compiled.on_disconnect.is_none());
        assert!(compiled.handler(WsEvent::Error).is_none());

        let mut vm = Vm::new();
        vm.set_local("room", s("lobby"));
        vm.set_local("client", s("c-1"));
        vm.set_local("input", s("hi there"));
        let out = vm
            .execute(compiled.handler(WsEvent::Message).expect("message handler"))
            .expect("run message handler");
        assert_eq!(
            out,
            Value::object([("room", s("lobby")), ("echo", s("HI THERE"))])
        );
    }
}

#[test]
fn path_parameter_concatenation() {
    let r = route_at(
        "/greet/:name",
        vec![Stmt::ret(Expr::binary(
            BinaryOp::Add,
            Expr::lit("Hello, "),
            Expr::var("name"),
        ))],
    );
    for level in ALL_LEVELS {
        let bytecode = compile_ok(&r, level);
        assert_eq!(
            run_ok(&bytecode, &[("name", s("World"))]),
            s("Hello, World")
        );
    }
}
