#![allow(dead_code)]

use glyphlib::ast::{BinaryOp, Expr, MatchArm, Pattern, Route, Stmt};
use glyphlib::bytecode::BytecodeModule;
use glyphlib::compiler::{Compiler, OptimizationLevel};
use glyphlib::value::Value;
use glyphlib::vm::{Vm, VmConfig};

fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
    Expr::binary(op, l, r)
}

fn count_up(limit: i64, body: Vec<Stmt>) -> Stmt {
    let mut body = body;
    body.push(Stmt::assign(
        "i",
        bin(BinaryOp::Add, Expr::var("i"), Expr::lit(1i64)),
    ));
    Stmt::While {
        cond: bin(BinaryOp::Lt, Expr::var("i"), Expr::lit(limit)),
        body,
    }
}

fn route(body: Vec<Stmt>) -> Route {
    Route {
        path: "/bench".to_string(),
        body,
        ..Route::default()
    }
}

pub fn route_loop_accumulate(iters: i64) -> Route {
    route(vec![
        Stmt::declare("i", Expr::lit(0i64)),
        Stmt::declare("acc", Expr::lit(0i64)),
        count_up(
            iters,
            vec![Stmt::assign(
                "acc",
                bin(BinaryOp::Add, Expr::var("acc"), Expr::var("i")),
            )],
        ),
        Stmt::ret(Expr::var("acc")),
    ])
}

pub fn route_match_dispatch(iters: i64) -> Route {
    let score = Expr::Match {
        value: Box::new(bin(BinaryOp::Mod, Expr::var("i"), Expr::lit(4i64))),
        arms: vec![
            MatchArm {
                pattern: Pattern::Literal {
                    value: Value::Int(0),
                },
                guard: None,
                body: Expr::lit(1i64),
            },
            MatchArm {
                pattern: Pattern::Binding {
                    name: "r".to_string(),
                },
                guard: Some(bin(BinaryOp::Le, Expr::var("r"), Expr::lit(2i64))),
                body: Expr::lit(2i64),
            },
            MatchArm {
                pattern: Pattern::Wildcard,
                guard: None,
                body: Expr::lit(3i64),
            },
        ],
    };
    route(vec![
        Stmt::declare("i", Expr::lit(0i64)),
        Stmt::declare("acc", Expr::lit(0i64)),
        count_up(
            iters,
            vec![Stmt::assign(
                "acc",
                bin(BinaryOp::Add, Expr::var("acc"), score),
            )],
        ),
        Stmt::ret(Expr::var("acc")),
    ])
}

pub fn route_string_workload(iters: i64) -> Route {
    route(vec![
        Stmt::declare("i", Expr::lit(0i64)),
        Stmt::declare("acc", Expr::lit(0i64)),
        count_up(
            iters,
            vec![
                Stmt::declare("s", Expr::call("trim", vec![Expr::lit("  glyph  ")])),
                Stmt::If {
                    cond: Expr::call("contains", vec![Expr::var("s"), Expr::lit("ly")]),
                    then_body: vec![Stmt::assign(
                        "acc",
                        bin(
                            BinaryOp::Add,
                            Expr::var("acc"),
                            Expr::call(
                                "length",
                                vec![Expr::call(
                                    "replace",
                                    vec![Expr::var("s"), Expr::lit("y"), Expr::lit("Y")],
                                )],
                            ),
                        ),
                    )],
                    else_body: vec![],
                },
            ],
        ),
        Stmt::ret(Expr::var("acc")),
    ])
}

/// Sums `input` with a `for` loop; pair with [`array_input`].
pub fn route_array_sum() -> Route {
    route(vec![
        Stmt::declare("acc", Expr::lit(0i64)),
        Stmt::For {
            key: None,
            value: "n".to_string(),
            iterable: Expr::var("input"),
            body: vec![Stmt::assign(
                "acc",
                bin(BinaryOp::Add, Expr::var("acc"), Expr::var("n")),
            )],
        },
        Stmt::ret(Expr::object(vec![
            ("sum", Expr::var("acc")),
            ("count", Expr::call("length", vec![Expr::var("input")])),
        ])),
    ])
}

pub fn array_input(len: i64) -> Value {
    Value::Array((0..len).map(Value::Int).collect())
}

pub fn compile_route(route: &Route, level: OptimizationLevel) -> Vec<u8> {
    Compiler::new(level)
        .compile_route(route)
        .expect("compile bench route")
}

pub fn decode(bytes: &[u8]) -> BytecodeModule {
    BytecodeModule::from_bytes(bytes).expect("decode bench module")
}

pub fn bench_vm(input: Option<Value>) -> Vm {
    let mut vm = Vm::with_config(VmConfig {
        max_steps: usize::MAX,
        ..VmConfig::default()
    });
    if let Some(input) = input {
        vm.set_local("input", input);
    }
    vm
}

pub fn run_vm(vm: &Vm, module: &BytecodeModule) -> Value {
    vm.execute_module(module).expect("run bench module")
}
