#![allow(dead_code)]

use glyphlib::ast::{BinaryOp, Expr, Route, Stmt};
use glyphlib::compiler::{CompileError, Compiler, OptimizationLevel};
use glyphlib::value::Value;
use glyphlib::vm::{Vm, VmError};

pub const ALL_LEVELS: [OptimizationLevel; 3] = [
    OptimizationLevel::None,
    OptimizationLevel::Basic,
    OptimizationLevel::Aggressive,
];

pub fn route(body: Vec<Stmt>) -> Route {
    route_at("/test", body)
}

pub fn route_at(path: &str, body: Vec<Stmt>) -> Route {
    Route {
        path: path.to_string(),
        body,
        ..Route::default()
    }
}

/// Parses a route from the JSON shape the CLI accepts.
pub fn route_json(json: &str) -> Route {
    serde_json::from_str(json).expect("route json")
}

pub fn compile_ok(route: &Route, level: OptimizationLevel) -> Vec<u8> {
    Compiler::new(level)
        .compile_route(route)
        .expect("compile should succeed")
}

pub fn compile_err(route: &Route, level: OptimizationLevel) -> CompileError {
    Compiler::new(level)
        .compile_route(route)
        .expect_err("compile should fail")
}

pub fn run_ok(bytecode: &[u8], locals: &[(&str, Value)]) -> Value {
    vm_with(locals).execute(bytecode).expect("vm run")
}

pub fn run_err(bytecode: &[u8], locals: &[(&str, Value)]) -> VmError {
    vm_with(locals)
        .execute(bytecode)
        .expect_err("vm run should fail")
}

pub fn vm_with(locals: &[(&str, Value)]) -> Vm {
    let mut vm = Vm::new();
    for (name, value) in locals {
        vm.set_local(*name, value.clone());
    }
    vm
}

/// Compiles and runs `route` at every level and checks they agree.
pub fn run_all_levels(route: &Route, locals: &[(&str, Value)]) -> Value {
    let baseline = run_ok(&compile_ok(route, OptimizationLevel::None), locals);
    for level in ALL_LEVELS {
        let out = run_ok(&compile_ok(route, level), locals);
        assert_eq!(out, baseline, "level {level} disagrees");
    }
    baseline
}

pub fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
    Expr::binary(op, l, r)
}

pub fn s(v: &str) -> Value {
    Value::String(v.to_string())
}
