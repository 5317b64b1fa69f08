//! Stack depth analysis for compiled units.
//!
//! Walks the control-flow graph from offset 0, tracking the evaluation
//! stack depth at every instruction. Besides ordinary fallthrough and
//! jump edges, a loop range's break and continue targets are entered at
//! the depth seen at the range start, and a catch target at the depth
//! seen at its `BEGIN_CATCH4`. Instructions that can exit a loop must
//! leave exactly that range-start depth behind.

use quill_common::{CompiledUnit, Opcode, RangeKind};

use crate::error::VerifyError;
use crate::structural::UnitContext;

struct Walk<'a> {
    ctx: &'a UnitContext,
    depth_at: Vec<Option<usize>>,
    worklist: Vec<usize>,
    errors: Vec<VerifyError>,
}

impl Walk<'_> {
    /// Record that `offset` is reached with `depth`, queueing it on first visit.
    fn enter(&mut self, offset: usize, depth: usize) {
        let Some(pos) = self.ctx.position(offset) else {
            return;
        };
        match self.depth_at[pos] {
            None => {
                self.depth_at[pos] = Some(depth);
                self.worklist.push(pos);
            }
            Some(seen) if seen != depth => self.errors.push(VerifyError::InconsistentDepth {
                at: offset,
                expected: seen,
                found: depth,
            }),
            Some(_) => {}
        }
    }
}

/// Run the stack depth check.
pub fn check_stack(unit: &CompiledUnit, ctx: &UnitContext) -> Vec<VerifyError> {
    let mut walk = Walk {
        ctx,
        depth_at: vec![None; ctx.instrs.len()],
        worklist: Vec::new(),
        errors: Vec::new(),
    };
    let mut required = 0usize;

    walk.enter(0, 0);
    while let Some(pos) = walk.worklist.pop() {
        let (at, instr) = ctx.instrs[pos];
        let Some(depth) = walk.depth_at[pos] else {
            continue;
        };

        for range in unit.ranges.iter().filter(|r| r.code_start as usize == at) {
            if range.kind == RangeKind::Loop {
                for target in [range.break_target, range.continue_target].into_iter().flatten() {
                    walk.enter(target as usize, depth);
                }
            }
        }

        if instr.opcode == Opcode::Done {
            required = required.max(depth);
            if depth != 1 {
                walk.errors.push(VerifyError::UnbalancedDone { at, depth });
            }
            continue;
        }

        let needed = instr.pops();
        if depth < needed {
            walk.errors.push(VerifyError::StackUnderflow { at, depth, needed });
            continue;
        }
        let after = depth - needed + instr.pushes();
        required = required.max(after).max(depth);

        if instr.opcode == Opcode::BeginCatch4 {
            if let Some(target) = unit.ranges.get(instr.index(0)).and_then(|r| r.catch_target) {
                walk.enter(target as usize, depth);
            }
        }

        if let Some(target) = instr.jump_target(at) {
            walk.enter(target as usize, after);
        }
        if !instr.opcode.is_terminal() {
            walk.enter(at + instr.encoded_len(), after);
        }
    }

    check_loop_exits(unit, ctx, &walk.depth_at, &mut walk.errors);

    let mut errors = walk.errors;
    if (unit.max_stack_depth as usize) < required {
        errors.push(VerifyError::MaxDepthTooSmall {
            declared: unit.max_stack_depth,
            required,
        });
    }
    errors
}

/// Whether `opcode` can complete with `break` or `continue`.
fn can_exit_loop(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Break | Opcode::Continue | Opcode::InvokeStk1 | Opcode::InvokeStk4
    )
}

/// A loop exit only discards the exiting instruction's own operands, so
/// what remains must be exactly the depth at the start of the loop range.
fn check_loop_exits(
    unit: &CompiledUnit,
    ctx: &UnitContext,
    depth_at: &[Option<usize>],
    errors: &mut Vec<VerifyError>,
) {
    for (pos, &(at, instr)) in ctx.instrs.iter().enumerate() {
        if !can_exit_loop(instr.opcode) {
            continue;
        }
        let Some(depth) = depth_at[pos] else {
            continue;
        };
        let Some(index) = unit.ranges.iter().rposition(|r| r.contains(at)) else {
            continue;
        };
        let range = &unit.ranges[index];
        if range.kind != RangeKind::Loop {
            continue;
        }
        let resolves = match instr.opcode {
            Opcode::Break => range.break_target.is_some(),
            Opcode::Continue => range.continue_target.is_some(),
            _ => range.break_target.is_some() || range.continue_target.is_some(),
        };
        if !resolves {
            continue;
        }
        let Some(expected) = ctx.position(range.code_start as usize).and_then(|p| depth_at[p]) else {
            continue;
        };
        let left = depth.saturating_sub(instr.pops());
        if left != expected {
            errors.push(VerifyError::UnbalancedLoopExit {
                at,
                range: index,
                depth: left,
                expected,
            });
        }
    }
}
