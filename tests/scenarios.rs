//! Integration tests against the public `emit()` entry point: the six
//! concrete scenarios from SPEC_FULL.md §8 and the `let`-dup equivalence
//! property (P6). AST fragments are built directly against `quirrel_emit::ast`
//! rather than through the JSON fixture harness, since scenario 6 needs a
//! self-referencing `LetDef` that a plain JSON schema can't express without a
//! converter doing the same `Rc`/`Weak` construction this test would just be
//! duplicating.

use std::rc::Rc;

use quirrel_emit::ast::{BinOp, Binding, Expr, ExprKind, LetDef, LetHandle, Provenance};
use quirrel_emit::emit;
use quirrel_emit::instruction::{Instruction, LoadType, Op, ReduceOp};
use quirrel_emit::span::SourceLoc;
use quirrel_emit::stack_sim::StackSim;

fn loc(n: u32, text: &str) -> SourceLoc {
    SourceLoc::new(n, text)
}

fn e(kind: ExprKind, prov: Provenance) -> Rc<Expr> {
    Rc::new(Expr::new(SourceLoc::dummy(), kind, prov))
}

/// Scenario 1: `1` -> `[Line(1,"1"), PushNum("1")]`.
#[test]
fn scenario_1_literal() {
    let ast = Expr::new(loc(1, "1"), ExprKind::Num("1".into()), Provenance::value());
    let bytecode = emit(&ast).unwrap();
    assert_eq!(
        bytecode,
        vec![
            Instruction::Line(1, "1".into()),
            Instruction::PushNum("1".into()),
        ]
    );
}

/// Scenario 2: `1 + 2` -> cross form (both operands carry `Value`
/// provenance, which `shared_possibilities` always excludes).
#[test]
fn scenario_2_binop_cross() {
    let left = e(ExprKind::Num("1".into()), Provenance::value());
    let right = e(ExprKind::Num("2".into()), Provenance::value());
    let ast = Expr::new(
        loc(1, "1 + 2"),
        ExprKind::BinOp {
            op: BinOp::Add,
            left,
            right,
        },
        Provenance::value(),
    );
    let bytecode = emit(&ast).unwrap();
    assert_eq!(
        bytecode,
        vec![
            Instruction::Line(1, "1 + 2".into()),
            Instruction::PushNum("1".into()),
            Instruction::PushNum("2".into()),
            Instruction::Map2Cross(Op::Add),
        ]
    );
}

/// Scenario 3: `//clicks` -> `[Line, PushString("/clicks"), LoadLocal(Het)]`.
#[test]
fn scenario_3_load() {
    let path = e(
        ExprKind::Str("/clicks".into()),
        Provenance::path("/clicks"),
    );
    let ast = Expr::new(
        loc(1, "//clicks"),
        ExprKind::Dispatch {
            name: "load".into(),
            actuals: vec![path],
            binding: Binding::BuiltIn {
                name: "load".into(),
                arity: 1,
            },
            buckets: vec![],
        },
        Provenance::path("/clicks"),
    );
    let bytecode = emit(&ast).unwrap();
    assert_eq!(
        bytecode,
        vec![
            Instruction::Line(1, "//clicks".into()),
            Instruction::PushString("/clicks".into()),
            Instruction::LoadLocal(LoadType::Het),
        ]
    );
}

/// Scenario 4: `count(//clicks)` -> load then reduce.
#[test]
fn scenario_4_count_of_load() {
    let path = e(
        ExprKind::Str("/clicks".into()),
        Provenance::path("/clicks"),
    );
    let load = e(
        ExprKind::Dispatch {
            name: "load".into(),
            actuals: vec![path],
            binding: Binding::BuiltIn {
                name: "load".into(),
                arity: 1,
            },
            buckets: vec![],
        },
        Provenance::path("/clicks"),
    );
    let ast = Expr::new(
        loc(1, "count(//clicks)"),
        ExprKind::Dispatch {
            name: "count".into(),
            actuals: vec![load],
            binding: Binding::BuiltIn {
                name: "count".into(),
                arity: 1,
            },
            buckets: vec![],
        },
        Provenance::value(),
    );
    let bytecode = emit(&ast).unwrap();
    assert_eq!(bytecode.last(), Some(&Instruction::Reduce(ReduceOp::Count)));
    StackSim::assert_well_formed(&bytecode);
}

/// Scenario 5: `[1, 2]` -> wrap each, join cross; source order already holds
/// so the reorder pass emits no swaps.
#[test]
fn scenario_5_array_literal_needs_no_reorder() {
    let values = vec![
        e(ExprKind::Num("1".into()), Provenance::value()),
        e(ExprKind::Num("2".into()), Provenance::value()),
    ];
    let ast = Expr::new(loc(1, "[1, 2]"), ExprKind::ArrayDef(values), Provenance::value());
    let bytecode = emit(&ast).unwrap();
    assert_eq!(
        bytecode,
        vec![
            Instruction::Line(1, "[1, 2]".into()),
            Instruction::PushNum("1".into()),
            Instruction::Map1(Op::WrapArray),
            Instruction::PushNum("2".into()),
            Instruction::Map1(Op::WrapArray),
            Instruction::Map2Cross(Op::JoinArray),
        ]
    );
}

/// Scenario 6: `clicks := //clicks  clicks + clicks` -> the load is lowered
/// once, the second reference dups the mark, and the add ends the sequence.
#[test]
fn scenario_6_let_dup_in_body() {
    let let_def = LetDef::new_recursive("clicks".into(), vec![], |_handle| {
        e(
            ExprKind::Dispatch {
                name: "load".into(),
                actuals: vec![e(
                    ExprKind::Str("/clicks".into()),
                    Provenance::path("/clicks"),
                )],
                binding: Binding::BuiltIn {
                    name: "load".into(),
                    arity: 1,
                },
                buckets: vec![],
            },
            Provenance::path("/clicks"),
        )
    });
    let let_ = LetHandle(Rc::downgrade(&let_def));

    let reference = || {
        e(
            ExprKind::Dispatch {
                name: "clicks".into(),
                actuals: vec![],
                binding: Binding::UserDef(let_.clone()),
                buckets: vec![],
            },
            Provenance::path("/clicks"),
        )
    };
    let body = e(
        ExprKind::BinOp {
            op: BinOp::Add,
            left: reference(),
            right: reference(),
        },
        Provenance::path("/clicks"),
    );
    let ast = Expr::new(
        loc(1, "clicks := //clicks  clicks + clicks"),
        ExprKind::Let {
            def: let_def,
            right: body,
        },
        Provenance::path("/clicks"),
    );

    let bytecode = emit(&ast).unwrap();
    let pushes = bytecode
        .iter()
        .filter(|i| matches!(i, Instruction::PushString(s) if s == "/clicks"))
        .count();
    assert_eq!(pushes, 1, "the second reference must dup, not re-lower the load");
    assert_eq!(bytecode.last(), Some(&Instruction::Map2Match(Op::Add)));
    StackSim::assert_well_formed(&bytecode);
}

/// P6: `let x := e in x + x` lowers `e` exactly once (vs. twice for `e + e`
/// written out directly), leaving the same final stack shape in both cases.
#[test]
fn p6_let_dup_equivalence() {
    let probe = || e(ExprKind::Str("probe".into()), Provenance::value());

    let let_def = LetDef::new_recursive("x".into(), vec![], |_handle| probe());
    let let_ = LetHandle(Rc::downgrade(&let_def));
    let reference = || {
        e(
            ExprKind::Dispatch {
                name: "x".into(),
                actuals: vec![],
                binding: Binding::UserDef(let_.clone()),
                buckets: vec![],
            },
            Provenance::value(),
        )
    };
    let let_version = Expr::new(
        loc(1, "let x := e in x + x"),
        ExprKind::Let {
            def: let_def,
            right: e(
                ExprKind::BinOp {
                    op: BinOp::Add,
                    left: reference(),
                    right: reference(),
                },
                Provenance::value(),
            ),
        },
        Provenance::value(),
    );

    let direct_version = Expr::new(
        loc(1, "e + e"),
        ExprKind::BinOp {
            op: BinOp::Add,
            left: probe(),
            right: probe(),
        },
        Provenance::value(),
    );

    let let_bytecode = emit(&let_version).unwrap();
    let direct_bytecode = emit(&direct_version).unwrap();

    let count_probes = |bc: &[Instruction]| {
        bc.iter()
            .filter(|i| matches!(i, Instruction::PushString(s) if s == "probe"))
            .count()
    };
    assert_eq!(count_probes(&let_bytecode), 1);
    assert_eq!(count_probes(&direct_bytecode), 2);

    assert_eq!(let_bytecode.last(), Some(&Instruction::Map2Cross(Op::Add)));
    assert_eq!(direct_bytecode.last(), Some(&Instruction::Map2Cross(Op::Add)));
    StackSim::assert_well_formed(&let_bytecode);
    StackSim::assert_well_formed(&direct_bytecode);
}
