//! Integration tests for the quill verifier.

use proptest::prelude::*;
use quill_common::{
    CompiledUnit, ForeachInfo, ForeachList, Instruction, Opcode, RangeKind, UnitBuilder, Value,
};
use quill_verifier::{verify, VerifyError};

fn build(f: impl FnOnce(&mut UnitBuilder)) -> CompiledUnit {
    let mut b = UnitBuilder::new();
    f(&mut b);
    b.emit(Opcode::Done, &[]).unwrap();
    b.finish().unwrap()
}

fn op(b: &mut UnitBuilder, opcode: Opcode) {
    b.emit(opcode, &[]).unwrap();
}

fn has(errors: &[VerifyError], pred: impl Fn(&VerifyError) -> bool) -> bool {
    errors.iter().any(pred)
}

/// `while {$i < 10} { incr i; if {$i == 5} continue; if {$i == 8} break }`
fn while_loop() -> CompiledUnit {
    build(|b| {
        let i = b.local("i") as i64;
        b.push("0").unwrap();
        b.emit(Opcode::StoreScalar1, &[i]).unwrap();
        op(b, Opcode::Pop);

        let test = b.label();
        let out = b.label();
        let skip_continue = b.label();
        let skip_break = b.label();
        let range = b.begin_range(RangeKind::Loop);
        b.set_break(range, out);
        b.set_continue(range, test);
        b.bind(test).unwrap();
        b.emit(Opcode::LoadScalar1, &[i]).unwrap();
        b.push("10").unwrap();
        op(b, Opcode::Lt);
        b.jump(Opcode::JumpFalse1, out).unwrap();
        b.emit(Opcode::IncrScalar1Imm, &[i, 1]).unwrap();
        b.push("5").unwrap();
        op(b, Opcode::Eq);
        b.jump(Opcode::JumpFalse1, skip_continue).unwrap();
        op(b, Opcode::Continue);
        b.bind(skip_continue).unwrap();
        b.emit(Opcode::LoadScalar1, &[i]).unwrap();
        b.push("8").unwrap();
        op(b, Opcode::Eq);
        b.jump(Opcode::JumpFalse1, skip_break).unwrap();
        op(b, Opcode::Break);
        b.bind(skip_break).unwrap();
        b.jump(Opcode::Jump1, test).unwrap();
        b.end_range(range).unwrap();
        b.bind(out).unwrap();
        b.emit(Opcode::LoadScalar1, &[i]).unwrap();
    })
}

/// `catch {nosuch} msg`
fn catch_unit() -> CompiledUnit {
    build(|b| {
        let handler = b.label();
        let join = b.label();
        let range = b.begin_range(RangeKind::Catch);
        b.set_catch(range, handler);
        b.emit(Opcode::BeginCatch4, &[range as i64]).unwrap();
        b.push("nosuch").unwrap();
        b.emit(Opcode::InvokeStk1, &[1]).unwrap();
        op(b, Opcode::Pop);
        b.end_range(range).unwrap();
        op(b, Opcode::EndCatch);
        b.push("0").unwrap();
        b.jump(Opcode::Jump1, join).unwrap();
        b.bind(handler).unwrap();
        op(b, Opcode::EndCatch);
        op(b, Opcode::PushReturnCode);
        b.bind(join).unwrap();
    })
}

// ========================================================
// Valid units pass verification
// ========================================================

#[test]
fn accept_straight_line_arithmetic() {
    let unit = build(|b| {
        b.push("1").unwrap();
        b.push("2").unwrap();
        op(b, Opcode::Add);
        b.push("3").unwrap();
        op(b, Opcode::Mult);
    });
    assert_eq!(verify(&unit), Ok(()));
}

#[test]
fn accept_while_loop() {
    assert_eq!(verify(&while_loop()), Ok(()));
}

#[test]
fn accept_catch() {
    assert_eq!(verify(&catch_unit()), Ok(()));
}

#[test]
fn accept_foreach() {
    let unit = build(|b| {
        let x = b.local("x");
        let list = b.local("list");
        let counter = b.local("counter");
        let info = b.foreach_info(ForeachInfo {
            loop_counter_slot: counter,
            lists: vec![ForeachList {
                temp_slot: list,
                vars: vec![x],
            }],
        }) as i64;
        b.push("a b").unwrap();
        b.emit(Opcode::StoreScalar1, &[list as i64]).unwrap();
        op(b, Opcode::Pop);
        b.emit(Opcode::ForeachStart4, &[info]).unwrap();
        let top = b.label();
        let out = b.label();
        let range = b.begin_range(RangeKind::Loop);
        b.set_break(range, out);
        b.set_continue(range, top);
        b.bind(top).unwrap();
        b.emit(Opcode::ForeachStep4, &[info]).unwrap();
        b.jump(Opcode::JumpFalse1, out).unwrap();
        b.jump(Opcode::Jump1, top).unwrap();
        b.end_range(range).unwrap();
        b.bind(out).unwrap();
        b.push("").unwrap();
    });
    assert_eq!(verify(&unit), Ok(()));
}

#[test]
fn accept_unit_with_source_locations() {
    let unit = build(|b| {
        b.source("expr {1+2}");
        let cmd = b.begin_command(0, 10);
        b.push("1").unwrap();
        b.push("2").unwrap();
        op(b, Opcode::Add);
        b.end_command(cmd).unwrap();
    });
    assert_eq!(verify(&unit), Ok(()));
}

#[test]
fn accept_container_roundtrip() {
    let unit = CompiledUnit::decode(&while_loop().encode()).unwrap();
    assert_eq!(verify(&unit), Ok(()));
}

// ========================================================
// Structural errors
// ========================================================

#[test]
fn reject_truncated_code() {
    let mut unit = while_loop();
    unit.code.truncate(unit.code.len() - 2);
    let errors = verify(&unit).unwrap_err();
    assert!(has(&errors, |e| matches!(e, VerifyError::Decode(_))));
}

#[test]
fn reject_jump_into_an_instruction() {
    let mut unit = build(|b| {
        let end = b.label();
        b.jump(Opcode::Jump1, end).unwrap();
        b.bind(end).unwrap();
        b.push("x").unwrap();
    });
    unit.code[1] = 3;
    let errors = verify(&unit).unwrap_err();
    assert_eq!(errors, vec![VerifyError::BadJumpTarget { at: 0, target: 3 }]);
}

#[test]
fn reject_foreach_with_missing_slots() {
    let mut unit = build(|b| {
        b.push("x").unwrap();
    });
    unit.foreach_infos.push(ForeachInfo {
        loop_counter_slot: 0,
        lists: vec![ForeachList {
            temp_slot: 1,
            vars: vec![2],
        }],
    });
    let errors = verify(&unit).unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(has(&errors, |e| *e == VerifyError::ForeachSlotOutOfRange { info: 0, slot: 2 }));
}

#[test]
fn reject_begin_catch_on_a_loop_range() {
    let mut unit = catch_unit();
    unit.ranges[0].kind = RangeKind::Loop;
    unit.ranges[0].break_target = Some(0);
    let errors = verify(&unit).unwrap_err();
    assert!(has(&errors, |e| matches!(e, VerifyError::BadCatchRange { at: 0, range: 0 })));
}

// ========================================================
// Range errors
// ========================================================

#[test]
fn reject_loop_without_break_target() {
    let mut unit = while_loop();
    unit.ranges[0].break_target = None;
    let errors = verify(&unit).unwrap_err();
    assert!(has(&errors, |e| matches!(
        e,
        VerifyError::MissingTarget {
            range: 0,
            target: "break",
            ..
        }
    )));
}

#[test]
fn reject_catch_without_catch_target() {
    let mut unit = catch_unit();
    unit.ranges[0].catch_target = None;
    let errors = verify(&unit).unwrap_err();
    assert!(has(&errors, |e| matches!(
        e,
        VerifyError::MissingTarget {
            range: 0,
            target: "catch",
            ..
        }
    )));
}

#[test]
fn reject_ranges_out_of_nesting_order() {
    let mut b = UnitBuilder::new();
    let out = b.label();
    let inner_start = b.label();
    let inner_end = b.label();
    let outer = b.begin_range(RangeKind::Loop);
    b.set_break(outer, out);
    b.push("a").unwrap();
    op(&mut b, Opcode::Pop);
    b.bind(inner_start).unwrap();
    b.push("c").unwrap();
    op(&mut b, Opcode::Pop);
    b.bind(inner_end).unwrap();
    b.end_range(outer).unwrap();
    let inner = b.add_range(RangeKind::Loop, inner_start, inner_end);
    b.set_break(inner, out);
    b.bind(out).unwrap();
    b.push("b").unwrap();
    op(&mut b, Opcode::Done);
    let mut unit = b.finish().unwrap();
    assert_eq!(verify(&unit), Ok(()));

    unit.ranges.swap(0, 1);
    let errors = verify(&unit).unwrap_err();
    assert!(has(&errors, |e| *e == VerifyError::RangeOrder { range: 1, other: 0 }));
}

#[test]
fn reject_command_location_past_the_source() {
    let mut unit = build(|b| {
        b.source("x");
        let cmd = b.begin_command(0, 1);
        b.push("x").unwrap();
        b.end_command(cmd).unwrap();
    });
    unit.cmd_locations[0].src_len = 5;
    let errors = verify(&unit).unwrap_err();
    assert_eq!(errors, vec![VerifyError::CmdLocationOutOfBounds { index: 0 }]);
}

// ========================================================
// Stack errors
// ========================================================

#[test]
fn reject_done_with_two_values() {
    let unit = build(|b| {
        b.push("a").unwrap();
        b.push("b").unwrap();
    });
    let errors = verify(&unit).unwrap_err();
    assert_eq!(errors, vec![VerifyError::UnbalancedDone { at: 4, depth: 2 }]);
}

#[test]
fn reject_break_target_entered_at_another_depth() {
    // The break target is also reached by fallthrough with one extra value.
    let unit = build(|b| {
        let out = b.label();
        let range = b.begin_range(RangeKind::Loop);
        b.set_break(range, out);
        b.push("a").unwrap();
        b.end_range(range).unwrap();
        b.bind(out).unwrap();
    });
    let errors = verify(&unit).unwrap_err();
    assert!(has(&errors, |e| matches!(e, VerifyError::InconsistentDepth { at: 2, .. })));
}

#[test]
fn reject_break_with_values_left_in_the_loop_body() {
    let unit = build(|b| {
        let out = b.label();
        let range = b.begin_range(RangeKind::Loop);
        b.set_break(range, out);
        b.push("x").unwrap();
        op(b, Opcode::Break);
        b.end_range(range).unwrap();
        b.bind(out).unwrap();
        b.push("r").unwrap();
    });
    let errors = verify(&unit).unwrap_err();
    assert_eq!(
        errors,
        vec![VerifyError::UnbalancedLoopExit {
            at: 2,
            range: 0,
            depth: 1,
            expected: 0
        }]
    );
}

#[test]
fn reject_nested_command_that_may_break() {
    // while 1 { set x [list a [stop]] }
    let unit = build(|b| {
        let x = b.local("x") as i64;
        let top = b.label();
        let out = b.label();
        let range = b.begin_range(RangeKind::Loop);
        b.set_break(range, out);
        b.set_continue(range, top);
        b.bind(top).unwrap();
        b.push("list").unwrap();
        b.push("a").unwrap();
        b.push("stop").unwrap();
        b.emit(Opcode::InvokeStk1, &[1]).unwrap();
        b.emit(Opcode::InvokeStk1, &[3]).unwrap();
        b.emit(Opcode::StoreScalar1, &[x]).unwrap();
        op(b, Opcode::Pop);
        b.jump(Opcode::Jump1, top).unwrap();
        b.end_range(range).unwrap();
        b.bind(out).unwrap();
        b.push("").unwrap();
    });
    let errors = verify(&unit).unwrap_err();
    assert_eq!(
        errors,
        vec![VerifyError::UnbalancedLoopExit {
            at: 6,
            range: 0,
            depth: 2,
            expected: 0
        }]
    );
}

#[test]
fn loop_exit_inside_a_nested_catch_is_not_checked_against_the_loop() {
    // while 1 { catch {list [break]} }
    let unit = build(|b| {
        let top = b.label();
        let out = b.label();
        let handler = b.label();
        let loop_range = b.begin_range(RangeKind::Loop);
        b.set_break(loop_range, out);
        b.set_continue(loop_range, top);
        b.bind(top).unwrap();
        let catch = b.begin_range(RangeKind::Catch);
        b.set_catch(catch, handler);
        b.emit(Opcode::BeginCatch4, &[catch as i64]).unwrap();
        b.push("list").unwrap();
        b.push("break").unwrap();
        b.emit(Opcode::InvokeStk1, &[1]).unwrap();
        b.emit(Opcode::InvokeStk1, &[2]).unwrap();
        op(b, Opcode::Pop);
        b.end_range(catch).unwrap();
        b.bind(handler).unwrap();
        op(b, Opcode::EndCatch);
        b.jump(Opcode::Jump1, out).unwrap();
        b.end_range(loop_range).unwrap();
        b.bind(out).unwrap();
        b.push("").unwrap();
    });
    assert_eq!(verify(&unit), Ok(()));
}

#[test]
fn reject_understated_max_depth() {
    let mut unit = while_loop();
    unit.max_stack_depth = 1;
    let errors = verify(&unit).unwrap_err();
    assert_eq!(
        errors,
        vec![VerifyError::MaxDepthTooSmall {
            declared: 1,
            required: 2
        }]
    );
}

// ========================================================
// Property tests
// ========================================================

proptest! {
    /// Arbitrary code never panics the verifier, and anything it accepts
    /// ends in a terminal instruction.
    #[test]
    fn arbitrary_code_is_checked_without_panicking(
        code in prop::collection::vec(any::<u8>(), 0..32),
        literals in 0usize..4,
        max_stack_depth in 0u32..8,
    ) {
        let unit = CompiledUnit {
            code,
            literals: (0..literals).map(|i| Value::from(i as i64)).collect(),
            max_stack_depth,
            ..CompiledUnit::default()
        };
        if verify(&unit).is_ok() {
            let instrs = Instruction::decode_all(&unit.code).unwrap();
            prop_assert!(instrs.last().is_some_and(|(_, i)| i.opcode.is_terminal()));
        }
    }
}
