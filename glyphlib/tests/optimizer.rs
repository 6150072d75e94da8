mod common;

use common::{ALL_LEVELS, bin, compile_ok, route, run_all_levels, s};
use glyphlib::ast::{BinaryOp, Expr, Route, Stmt, UnaryOp};
use glyphlib::bytecode::{BytecodeModule, Instr};
use glyphlib::compiler::{Compiler, OptimizationLevel};
use glyphlib::value::Value;

fn module_at(r: &Route, level: OptimizationLevel) -> BytecodeModule {
    Compiler::new(level)
        .compile_route_module(r)
        .expect("compile")
}

fn corpus() -> Vec<Route> {
    vec![
        route(vec![Stmt::ret(Expr::object(vec![
            ("sum", bin(BinaryOp::Add, Expr::lit(2i64), Expr::lit(3i64))),
            ("ratio", bin(BinaryOp::Div, Expr::lit(7i64), Expr::lit(2i64))),
            ("tags", Expr::Array {
                items: vec![Expr::lit("a"), Expr::lit("b")],
            }),
        ]))]),
        route(vec![
            Stmt::declare("unused", Expr::lit(42i64)),
            Stmt::declare("greeting", bin(BinaryOp::Add, Expr::lit("hi "), Expr::var("input"))),
            Stmt::ret(Expr::call("upper", vec![Expr::var("greeting")])),
        ]),
        route(vec![
            Stmt::declare("i", Expr::lit(0i64)),
            Stmt::While {
                cond: bin(BinaryOp::Lt, Expr::var("i"), Expr::lit(3i64)),
                body: vec![
                    Stmt::If {
                        cond: bin(BinaryOp::Eq, Expr::var("i"), Expr::lit(1i64)),
                        then_body: vec![Stmt::assign(
                            "i",
                            bin(BinaryOp::Add, Expr::var("i"), Expr::lit(1i64)),
                        )],
                        else_body: vec![],
                    },
                    Stmt::assign("i", bin(BinaryOp::Add, Expr::var("i"), Expr::lit(1i64))),
                ],
            },
            Stmt::ret(Expr::var("i")),
        ]),
        route(vec![Stmt::ret(bin(
            BinaryOp::And,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::lit(false)),
            },
            bin(BinaryOp::Ge, Expr::lit(2.5f64), Expr::lit(2i64)),
        ))]),
    ]
}

#[test]
fn every_level_agrees_on_the_corpus() {
    let expected = [
        Value::object([
            ("sum", Value::Int(5)),
            ("ratio", Value::Int(3)),
            ("tags", Value::Array(vec![s("a"), s("b")])),
        ]),
        s("HI BOB"),
        Value::Int(3),
        Value::Bool(true),
    ];
    for (r, want) in corpus().iter().zip(expected) {
        assert_eq!(run_all_levels(r, &[("input", s("bob"))]), want);
    }
}

#[test]
fn compilation_is_deterministic() {
    for r in corpus() {
        for level in ALL_LEVELS {
            assert_eq!(compile_ok(&r, level), compile_ok(&r, level), "{level}");
        }
    }
}

#[test]
fn optimizing_never_grows_the_stream() {
    for r in corpus() {
        let none = module_at(&r, OptimizationLevel::None).code.len();
        let basic = module_at(&r, OptimizationLevel::Basic).code.len();
        let aggressive = module_at(&r, OptimizationLevel::Aggressive).code.len();
        assert!(basic <= none, "{basic} > {none}");
        assert!(aggressive <= basic, "{aggressive} > {basic}");
    }
}

#[test]
fn literal_object_becomes_a_single_push() {
    let r = route(vec![Stmt::ret(Expr::object(vec![(
        "text",
        Expr::lit("Hello, World!"),
    )]))]);
    let module = module_at(&r, OptimizationLevel::Aggressive);
    assert_eq!(module.code, vec![Instr::Push(0), Instr::Return]);
    assert_eq!(
        module.constants,
        vec![Value::object([("text", s("Hello, World!"))])]
    );
}

#[test]
fn dead_stores_are_dropped() {
    let r = route(vec![
        Stmt::declare("unused", Expr::lit(42i64)),
        Stmt::ret(Expr::lit(1i64)),
    ]);
    let none = module_at(&r, OptimizationLevel::None);
    assert!(none.code.iter().any(|i| matches!(i, Instr::StoreVar(_))));
    let basic = module_at(&r, OptimizationLevel::Basic);
    assert!(!basic.code.iter().any(|i| matches!(i, Instr::StoreVar(_))));
}

#[test]
fn stores_with_side_effects_are_kept() {
    // the division fails at runtime and must still run at every level
    let r = route(vec![
        Stmt::declare("unused", bin(BinaryOp::Div, Expr::var("input"), Expr::lit(0i64))),
        Stmt::ret(Expr::lit(1i64)),
    ]);
    for level in ALL_LEVELS {
        let err = common::run_err(&compile_ok(&r, level), &[("input", Value::Int(1))]);
        assert_eq!(err.kind, glyphlib::vm::VmErrorKind::DivisionByZero, "{level}");
    }
}

#[test]
fn deduplication_keeps_first_occurrence_order() {
    let r = route(vec![Stmt::ret(Expr::object(vec![
        ("x", Expr::lit(7i64)),
        ("y", Expr::var("input")),
        ("z", Expr::lit(7i64)),
    ]))]);
    let basic = module_at(&r, OptimizationLevel::Basic);
    assert_eq!(
        basic.constants,
        vec![s("x"), Value::Int(7), s("y"), s("input"), s("z"), Value::Int(7)]
    );
    let aggressive = module_at(&r, OptimizationLevel::Aggressive);
    assert_eq!(
        aggressive.constants,
        vec![s("x"), Value::Int(7), s("y"), s("input"), s("z")]
    );
    assert_eq!(
        aggressive.code,
        vec![
            Instr::Push(0),
            Instr::Push(1),
            Instr::Push(2),
            Instr::LoadVar(3),
            Instr::Push(4),
            Instr::Push(1),
            Instr::BuildObject(3),
            Instr::Return,
        ]
    );
}

#[test]
fn int_and_float_constants_stay_distinct() {
    let r = route(vec![Stmt::ret(Expr::Array {
        items: vec![Expr::var("input"), Expr::lit(1i64), Expr::lit(1.0f64)],
    })]);
    let module = module_at(&r, OptimizationLevel::Aggressive);
    assert!(module.constants.contains(&Value::Int(1)));
    assert!(
        module
            .constants
            .iter()
            .any(|v| matches!(v, Value::Float(f) if *f == 1.0))
    );
    assert_eq!(
        run_all_levels(&r, &[("input", Value::Int(0))]),
        Value::Array(vec![Value::Int(0), Value::Int(1), Value::Float(1.0)])
    );
}

#[test]
fn jump_chains_are_threaded() {
    // nested ifs with empty else branches produce jumps to jumps
    let r = route(vec![
        Stmt::declare("x", Expr::var("input")),
        Stmt::If {
            cond: bin(BinaryOp::Gt, Expr::var("x"), Expr::lit(0i64)),
            then_body: vec![Stmt::If {
                cond: bin(BinaryOp::Gt, Expr::var("x"), Expr::lit(10i64)),
                then_body: vec![Stmt::assign("x", Expr::lit(10i64))],
                else_body: vec![Stmt::assign("x", Expr::lit(1i64))],
            }],
            else_body: vec![Stmt::assign("x", Expr::lit(0i64))],
        },
        Stmt::ret(Expr::var("x")),
    ]);
    let aggressive = module_at(&r, OptimizationLevel::Aggressive);
    for instr in &aggressive.code {
        if let Some(target) = instr.jump_target() {
            assert!(
                !matches!(aggressive.code.get(target as usize), Some(Instr::Jump(_))),
                "{instr:?} lands on a jump"
            );
        }
    }
    for (input, want) in [(-3i64, 0i64), (5, 1), (50, 10)] {
        assert_eq!(run_all_levels(&r, &[("input", Value::Int(input))]), Value::Int(want));
    }
}

fn has(module: &BytecodeModule, pred: impl Fn(&Instr) -> bool) -> bool {
    module.code.iter().any(pred)
}

#[test]
fn constants_and_copies_are_propagated() {
    let r = route(vec![
        Stmt::declare("a", Expr::lit(2i64)),
        Stmt::declare("b", Expr::var("input")),
        Stmt::ret(bin(
            BinaryOp::Add,
            bin(BinaryOp::Mul, Expr::var("a"), Expr::lit(3i64)),
            Expr::var("b"),
        )),
    ]);
    assert_eq!(run_all_levels(&r, &[("input", Value::Int(4))]), Value::Int(10));
    let none = module_at(&r, OptimizationLevel::None);
    assert!(has(&none, |i| matches!(i, Instr::Mul)));
    let basic = module_at(&r, OptimizationLevel::Basic);
    assert!(!has(&basic, |i| matches!(i, Instr::Mul)));
    assert!(basic.constants.contains(&Value::Int(6)));
}

#[test]
fn propagation_stops_where_a_loop_writes() {
    let r = route(vec![
        Stmt::declare("total", Expr::lit(0i64)),
        Stmt::For {
            key: None,
            value: "n".to_string(),
            iterable: Expr::var("input"),
            body: vec![Stmt::assign(
                "total",
                bin(BinaryOp::Add, Expr::var("total"), Expr::var("n")),
            )],
        },
        Stmt::ret(Expr::var("total")),
    ]);
    let input = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(run_all_levels(&r, &[("input", input)]), Value::Int(6));
    assert_eq!(
        run_all_levels(&r, &[("input", Value::Array(vec![]))]),
        Value::Int(0)
    );
}

#[test]
fn code_after_return_is_dropped_but_still_checked() {
    let r = route(vec![
        Stmt::ret(Expr::var("input")),
        Stmt::declare("x", bin(BinaryOp::Mul, Expr::var("input"), Expr::lit(2i64))),
        Stmt::ret(Expr::var("x")),
    ]);
    assert_eq!(run_all_levels(&r, &[("input", Value::Int(5))]), Value::Int(5));
    let none = module_at(&r, OptimizationLevel::None);
    let basic = module_at(&r, OptimizationLevel::Basic);
    assert!(basic.code.len() < none.code.len());
    assert!(!has(&basic, |i| matches!(i, Instr::Mul)));
    assert!(!basic.constants.contains(&s("x")));

    let r = route(vec![
        Stmt::ret(Expr::lit(1i64)),
        Stmt::ret(Expr::call("upper", vec![])),
    ]);
    for level in ALL_LEVELS {
        assert!(common::compile_err(&r, level).is_semantic(), "{level}");
    }
    let r = route(vec![
        Stmt::ret(Expr::lit(1i64)),
        Stmt::expr(Expr::call("ws.subscribe", vec![])),
    ]);
    for level in ALL_LEVELS {
        assert!(common::compile_err(&r, level).is_recoverable(), "{level}");
    }
}

#[test]
fn literal_conditions_keep_only_the_live_branch() {
    let r = route(vec![
        Stmt::declare("x", Expr::lit("")),
        Stmt::If {
            cond: Expr::lit(false),
            then_body: vec![Stmt::assign("x", Expr::lit("then"))],
            else_body: vec![Stmt::assign("x", Expr::var("input"))],
        },
        Stmt::ret(Expr::var("x")),
    ]);
    assert_eq!(run_all_levels(&r, &[("input", s("else"))]), s("else"));
    let none = module_at(&r, OptimizationLevel::None);
    assert!(has(&none, |i| matches!(i, Instr::JumpIfFalse(_))));
    let basic = module_at(&r, OptimizationLevel::Basic);
    assert!(!has(&basic, |i| matches!(i, Instr::JumpIfFalse(_))));
    assert!(!basic.constants.contains(&s("then")));

    let r = route(vec![Stmt::If {
        cond: Expr::lit(true),
        then_body: vec![Stmt::ret(Expr::var("input"))],
        else_body: vec![Stmt::ret(Expr::call("upper", vec![]))],
    }]);
    for level in ALL_LEVELS {
        assert!(common::compile_err(&r, level).is_semantic(), "{level}");
    }
}

fn length_of_input() -> Stmt {
    Stmt::declare("n", Expr::call("length", vec![Expr::var("input")]))
}

#[test]
fn algebraic_identities_and_doubling_agree_across_levels() {
    let n = || Expr::var("n");
    let r = route(vec![
        length_of_input(),
        Stmt::ret(Expr::Array {
            items: vec![
                bin(BinaryOp::Mul, n(), Expr::lit(2i64)),
                bin(BinaryOp::Add, n(), Expr::lit(0i64)),
                bin(BinaryOp::Mul, Expr::lit(1i64), n()),
                bin(BinaryOp::Sub, n(), Expr::lit(0i64)),
                bin(BinaryOp::Div, n(), Expr::lit(1i64)),
                bin(BinaryOp::Mul, n(), Expr::lit(0i64)),
            ],
        }),
    ]);
    let input = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(
        run_all_levels(&r, &[("input", input)]),
        Value::Array(
            [6, 3, 3, 3, 3, 0].into_iter().map(Value::Int).collect()
        )
    );
    let basic = module_at(&r, OptimizationLevel::Basic);
    assert!(has(&basic, |i| matches!(i, Instr::Mul)));
    let aggressive = module_at(&r, OptimizationLevel::Aggressive);
    assert!(!has(&aggressive, |i| matches!(i, Instr::Mul | Instr::Div | Instr::Sub)));
}

#[test]
fn doubling_still_overflows_into_a_float() {
    let r = route(vec![
        length_of_input(),
        Stmt::declare("big", bin(BinaryOp::Add, Expr::var("n"), Expr::lit(i64::MAX - 3))),
        Stmt::ret(bin(BinaryOp::Mul, Expr::var("big"), Expr::lit(2i64))),
    ]);
    let input = Value::Array(vec![Value::Int(0); 3]);
    let out = run_all_levels(&r, &[("input", input)]);
    assert_eq!(out, Value::Float(i64::MAX as f64 * 2.0));
    let aggressive = module_at(&r, OptimizationLevel::Aggressive);
    assert!(!has(&aggressive, |i| matches!(i, Instr::Mul)));
}

#[test]
fn rewrites_never_hide_a_type_error() {
    let doubled = route(vec![
        Stmt::declare("x", Expr::var("input")),
        Stmt::ret(bin(BinaryOp::Mul, Expr::var("x"), Expr::lit(2i64))),
    ]);
    let anded = route(vec![Stmt::ret(bin(
        BinaryOp::And,
        Expr::var("input"),
        Expr::lit(true),
    ))]);
    let plus_zero = route(vec![Stmt::ret(bin(
        BinaryOp::Add,
        Expr::var("input"),
        Expr::lit(0i64),
    ))]);
    for r in [&doubled, &anded, &plus_zero] {
        for level in ALL_LEVELS {
            let err = common::run_err(&compile_ok(r, level), &[("input", s("ab"))]);
            assert_eq!(err.kind, glyphlib::vm::VmErrorKind::TypeMismatch, "{level}");
        }
    }
}
