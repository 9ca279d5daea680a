use mmix_backend::backend::codegen::select;
use mmix_backend::backend::instruction::Instr;
use mmix_backend::frame::Frame;
use mmix_backend::ir::{BinOp, Expr, Stmt, UnOp};
use mmix_backend::temp::{Label, TempPool};
use mmix_backend::CompileError;

fn setup(name: &str) -> (TempPool, Frame) {
    let mut pool = TempPool::new();
    let frame = Frame::new(Label::named(name), &mut pool, 16, 16);
    (pool, frame)
}

// ── Immediates ───────────────────────────────────────────────────────────

#[test]
fn constant_loads_in_exactly_four_instructions() {
    let (mut pool, frame) = setup("f");
    let body = vec![Stmt::Expr(Expr::Const(5))];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    assert_eq!(instrs.len(), 4, "immediate composition is always 4 instructions");
    let d = instrs[0].defs()[0];
    for ins in &instrs {
        assert_eq!(ins.defs(), &[d], "all four fields compose the same temporary");
        assert!(ins.uses().is_empty(), "immediate composition uses no temporaries");
    }
    let mnemonics: Vec<String> = instrs.iter().map(|i| i.to_string()).collect();
    assert!(mnemonics[0].starts_with("SETL"));
    assert!(mnemonics[1].starts_with("INCML"));
    assert!(mnemonics[2].starts_with("INCMH"));
    assert!(mnemonics[3].starts_with("INCH"));
}

#[test]
fn large_constant_is_not_shortened() {
    let (mut pool, frame) = setup("f");
    let body = vec![Stmt::Expr(Expr::Const(0x1234_5678_9abc_def0))];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");
    assert_eq!(instrs.len(), 4);

    let (mut pool, frame) = setup("f");
    let body = vec![Stmt::Expr(Expr::Const(0))];
    let small = select(&frame, &body, &mut pool).expect("selection failed");
    assert_eq!(small.len(), 4, "small constants take the same sequence");
}

// ── Arithmetic ───────────────────────────────────────────────────────────

#[test]
fn mod_lowers_to_div_mul_sub() {
    let (mut pool, frame) = setup("f");
    let a = pool.fresh();
    let body = vec![Stmt::Expr(Expr::binop(
        BinOp::Mod,
        Expr::Temp(a),
        Expr::Const(3),
    ))];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    // 4 for the constant, 3 for the remainder itself.
    assert_eq!(instrs.len(), 7);
    let tail: Vec<String> = instrs[4..].iter().map(|i| i.to_string()).collect();
    assert!(tail[0].starts_with("DIV"));
    assert!(tail[1].starts_with("MUL"));
    assert!(tail[2].starts_with("SUB"));

    let scratch = instrs[4].defs()[0];
    assert_eq!(instrs[5].defs(), &[scratch]);
    assert_eq!(
        instrs[6].defs(),
        &[scratch],
        "the final SUB holds the remainder"
    );
}

#[test]
fn relational_operators_pick_their_condition_variant() {
    let cases = [
        (BinOp::Equ, "ZSZ"),
        (BinOp::Neq, "ZSNZ"),
        (BinOp::Lth, "ZSN"),
        (BinOp::Gth, "ZSP"),
        (BinOp::Leq, "ZSNP"),
        (BinOp::Geq, "ZSNN"),
    ];
    for (op, variant) in cases {
        let (mut pool, frame) = setup("f");
        let a = pool.fresh();
        let b = pool.fresh();
        let body = vec![Stmt::Expr(Expr::binop(op, Expr::Temp(a), Expr::Temp(b)))];
        let instrs = select(&frame, &body, &mut pool).expect("selection failed");

        assert_eq!(instrs.len(), 2, "{op} is compare then materialize");
        assert!(instrs[0].to_string().starts_with("CMP"));
        assert!(
            instrs[1].to_string().starts_with(variant),
            "{op} should materialize with {variant}, got {}",
            instrs[1]
        );
    }
}

#[test]
fn not_compares_against_zero() {
    let (mut pool, frame) = setup("f");
    let a = pool.fresh();
    let body = vec![Stmt::Expr(Expr::unop(UnOp::Not, Expr::Temp(a)))];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");
    assert_eq!(instrs.len(), 2);
    assert!(instrs[0].to_string().starts_with("CMP"));
    assert!(instrs[1].to_string().starts_with("ZSZ"));
}

#[test]
fn neg_subtracts_from_zero() {
    let (mut pool, frame) = setup("f");
    let a = pool.fresh();
    let body = vec![Stmt::Expr(Expr::unop(UnOp::Neg, Expr::Temp(a)))];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");
    assert_eq!(instrs.len(), 5, "zero constant plus one SUB");
    assert!(instrs[4].to_string().starts_with("SUB"));
    assert!(instrs[4].uses().contains(&a));
}

// ── Memory access idioms ─────────────────────────────────────────────────

#[test]
fn load_recognizes_base_plus_constant() {
    let (mut pool, frame) = setup("f");
    let base = pool.fresh();
    let body = vec![Stmt::Expr(Expr::mem(Expr::binop(
        BinOp::Add,
        Expr::Temp(base),
        Expr::Const(24),
    )))];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    assert_eq!(instrs.len(), 1, "offset folds into the load");
    assert!(instrs[0].to_string().starts_with("LDO"));
    assert!(instrs[0].to_string().ends_with(",24"));
    assert_eq!(instrs[0].uses(), &[base]);
}

#[test]
fn load_falls_back_to_offset_zero() {
    let (mut pool, frame) = setup("f");
    let base = pool.fresh();
    let index = pool.fresh();
    let body = vec![Stmt::Expr(Expr::mem(Expr::binop(
        BinOp::Add,
        Expr::Temp(base),
        Expr::Temp(index),
    )))];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    assert_eq!(instrs.len(), 2, "address computed separately, then load");
    assert!(instrs[0].to_string().starts_with("ADD"));
    assert!(instrs[1].to_string().starts_with("LDO"));
    assert!(instrs[1].to_string().ends_with(",0"));
}

#[test]
fn store_uses_the_same_idiom_and_defines_nothing() {
    let (mut pool, frame) = setup("f");
    let base = pool.fresh();
    let value = pool.fresh();
    let body = vec![Stmt::Move {
        dst: Expr::mem(Expr::binop(BinOp::Add, Expr::Temp(base), Expr::Const(16))),
        src: Expr::Temp(value),
    }];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    assert_eq!(instrs.len(), 1);
    assert!(instrs[0].to_string().starts_with("STO"));
    assert_eq!(instrs[0].uses(), &[value, base]);
    assert!(instrs[0].defs().is_empty(), "a store defines no register");
}

// ── Moves, branches, calls ───────────────────────────────────────────────

#[test]
fn temp_to_temp_move_is_coalescable() {
    let (mut pool, frame) = setup("f");
    let a = pool.fresh();
    let b = pool.fresh();
    let body = vec![Stmt::Move {
        dst: Expr::Temp(a),
        src: Expr::Temp(b),
    }];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    assert_eq!(instrs.len(), 1);
    assert!(instrs[0].is_move());
    assert_eq!(instrs[0].uses(), &[b]);
    assert_eq!(instrs[0].defs(), &[a]);
}

#[test]
fn cjump_lists_both_targets() {
    let (mut pool, frame) = setup("f");
    let c = pool.fresh();
    let pos = pool.fresh_label();
    let neg = pool.fresh_label();
    let body = vec![Stmt::CJump {
        cond: Expr::Temp(c),
        pos: pos.clone(),
        neg: neg.clone(),
    }];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    assert_eq!(instrs.len(), 1);
    assert!(instrs[0].to_string().starts_with("BP"));
    assert_eq!(instrs[0].jumps(), &[pos, neg]);
}

#[test]
fn call_captures_the_stack_pointer_slot() {
    let (mut pool, frame) = setup("f");
    let d = pool.fresh();
    let g = Label::named("g");
    let body = vec![Stmt::Move {
        dst: Expr::Temp(d),
        src: Expr::Call(g.clone(), vec![]),
    }];
    let instrs = select(&frame, &body, &mut pool).expect("selection failed");

    assert_eq!(instrs.len(), 3);
    assert!(instrs[0].is_call());
    assert_eq!(instrs[0].jumps(), &[g]);
    assert!(instrs[0].uses().is_empty() && instrs[0].defs().is_empty());
    assert!(instrs[1].to_string().starts_with("ADD"));
    assert_eq!(
        instrs[1].uses(),
        &[frame.stack_pointer],
        "the capture reads the stack pointer"
    );
    assert!(instrs[2].is_move());
}

// ── Contract violations ──────────────────────────────────────────────────

#[test]
fn nested_call_is_a_fatal_selection_error() {
    let (mut pool, frame) = setup("f");
    let body = vec![Stmt::Expr(Expr::binop(
        BinOp::Add,
        Expr::Call(Label::named("g"), vec![]),
        Expr::Const(1),
    ))];
    let err = select(&frame, &body, &mut pool).expect_err("nested call must be rejected");
    assert!(matches!(err, CompileError::NestedCall { .. }));
}

#[test]
fn constant_move_target_is_a_fatal_selection_error() {
    let (mut pool, frame) = setup("f");
    let body = vec![Stmt::Move {
        dst: Expr::Const(1),
        src: Expr::Const(2),
    }];
    let err = select(&frame, &body, &mut pool).expect_err("bad move target must be rejected");
    assert!(matches!(err, CompileError::BadMoveTarget { .. }));
}

// ── Determinism ──────────────────────────────────────────────────────────

#[test]
fn selection_is_deterministic() {
    let build = || {
        let (mut pool, frame) = setup("f");
        let body = vec![
            Stmt::Label(Label::named("f")),
            Stmt::Move {
                dst: Expr::Temp(frame.return_value),
                src: Expr::binop(
                    BinOp::Mul,
                    Expr::mem(Expr::binop(
                        BinOp::Add,
                        Expr::Temp(frame.frame_pointer),
                        Expr::Const(-8),
                    )),
                    Expr::Const(7),
                ),
            },
        ];
        select(&frame, &body, &mut pool).expect("selection failed")
    };
    let first: Vec<Instr> = build();
    let second: Vec<Instr> = build();
    assert_eq!(first, second, "identical IR must select identically");
}
