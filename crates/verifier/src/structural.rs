//! Structural validation pass for compiled units.
//!
//! Decodes the code, checks every operand against the unit's tables and
//! every jump against instruction boundaries, and builds the
//! [`UnitContext`] used by later passes.

use std::collections::HashMap;

use quill_common::{mathfunc, CompiledUnit, Instruction, Opcode, RangeKind};

use crate::error::VerifyError;

/// Decoded view of a unit, consumed by later passes.
#[derive(Debug, Clone, Default)]
pub struct UnitContext {
    /// Instructions with their code offsets, in code order.
    pub instrs: Vec<(usize, Instruction)>,
    /// Code offset to position in `instrs`.
    positions: HashMap<usize, usize>,
    /// Length of the code in bytes.
    pub code_len: usize,
    /// Whether a fatal structural error occurred (callers should skip later passes).
    pub fatal: bool,
}

impl UnitContext {
    /// Position in `instrs` of the instruction starting at `offset`.
    pub fn position(&self, offset: usize) -> Option<usize> {
        self.positions.get(&offset).copied()
    }

    pub fn is_boundary(&self, offset: i64) -> bool {
        usize::try_from(offset).is_ok_and(|o| self.positions.contains_key(&o))
    }
}

/// Run the structural validation pass.
pub fn check_structural(unit: &CompiledUnit) -> (UnitContext, Vec<VerifyError>) {
    let mut errors = Vec::new();
    let mut ctx = UnitContext {
        code_len: unit.code.len(),
        ..UnitContext::default()
    };

    if unit.code.is_empty() {
        errors.push(VerifyError::EmptyCode);
        ctx.fatal = true;
        return (ctx, errors);
    }

    ctx.instrs = match Instruction::decode_all(&unit.code) {
        Ok(instrs) => instrs,
        Err(e) => {
            errors.push(e.into());
            ctx.fatal = true;
            return (ctx, errors);
        }
    };
    ctx.positions = ctx
        .instrs
        .iter()
        .enumerate()
        .map(|(pos, (at, _))| (*at, pos))
        .collect();

    for (at, instr) in &ctx.instrs {
        check_operands(unit, *at, instr, &mut errors);
        if let Some(target) = instr.jump_target(*at) {
            if !ctx.is_boundary(target) {
                errors.push(VerifyError::BadJumpTarget { at: *at, target });
                ctx.fatal = true;
            }
        }
    }

    if let Some((at, last)) = ctx.instrs.last() {
        if !last.opcode.is_terminal() {
            errors.push(VerifyError::MissingTerminal { at: *at });
        }
    }

    for (info, entry) in unit.foreach_infos.iter().enumerate() {
        let slots = std::iter::once(entry.loop_counter_slot).chain(
            entry
                .lists
                .iter()
                .flat_map(|list| std::iter::once(list.temp_slot).chain(list.vars.iter().copied())),
        );
        for slot in slots {
            if slot as usize >= unit.locals.len() {
                errors.push(VerifyError::ForeachSlotOutOfRange { info, slot });
            }
        }
    }

    (ctx, errors)
}

fn check_operands(unit: &CompiledUnit, at: usize, instr: &Instruction, errors: &mut Vec<VerifyError>) {
    let index = instr.index(0);
    match instr.opcode {
        Opcode::Push1 | Opcode::Push4 if index >= unit.literals.len() => {
            errors.push(VerifyError::LiteralOutOfRange { at, index });
        }
        op if op.takes_local_slot() && index >= unit.locals.len() => {
            errors.push(VerifyError::LocalOutOfRange { at, index });
        }
        Opcode::ForeachStart4 | Opcode::ForeachStep4 if index >= unit.foreach_infos.len() => {
            errors.push(VerifyError::ForeachOutOfRange { at, index });
        }
        Opcode::CallBuiltinFunc1 if mathfunc::builtin(index).is_none() => {
            errors.push(VerifyError::UnknownBuiltin { at, index });
        }
        Opcode::InvokeStk1 | Opcode::InvokeStk4 | Opcode::CallFunc1 if index == 0 => {
            errors.push(VerifyError::ZeroArgCount { at });
        }
        Opcode::BeginCatch4 => {
            let is_catch = unit
                .ranges
                .get(index)
                .is_some_and(|r| r.kind == RangeKind::Catch);
            if !is_catch {
                errors.push(VerifyError::BadCatchRange { at, range: index });
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_common::UnitBuilder;

    fn unit_of(f: impl FnOnce(&mut UnitBuilder)) -> CompiledUnit {
        let mut b = UnitBuilder::new();
        f(&mut b);
        b.finish().unwrap()
    }

    #[test]
    fn decodes_and_maps_offsets() {
        let unit = unit_of(|b| {
            b.push("a").unwrap();
            b.emit(Opcode::Done, &[]).unwrap();
        });
        let (ctx, errors) = check_structural(&unit);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(ctx.position(2), Some(1));
        assert!(ctx.is_boundary(0));
        assert!(!ctx.is_boundary(1));
        assert!(!ctx.is_boundary(-1));
    }

    #[test]
    fn undecodable_code_is_fatal() {
        let unit = CompiledUnit {
            code: vec![0xfe],
            ..CompiledUnit::default()
        };
        let (ctx, errors) = check_structural(&unit);
        assert!(ctx.fatal);
        assert!(matches!(errors[0], VerifyError::Decode(_)));
    }

    #[test]
    fn operand_tables_are_checked() {
        let mut unit = unit_of(|b| {
            b.emit(Opcode::Push1, &[3]).unwrap();
            b.emit(Opcode::LoadScalar1, &[0]).unwrap();
            b.emit(Opcode::CallBuiltinFunc1, &[200]).unwrap();
            b.emit(Opcode::InvokeStk1, &[0]).unwrap();
            b.emit(Opcode::BeginCatch4, &[0]).unwrap();
            b.emit(Opcode::Done, &[]).unwrap();
        });
        unit.max_stack_depth = 8;
        let (_, errors) = check_structural(&unit);
        assert_eq!(
            errors,
            vec![
                VerifyError::LiteralOutOfRange { at: 0, index: 3 },
                VerifyError::LocalOutOfRange { at: 2, index: 0 },
                VerifyError::UnknownBuiltin { at: 4, index: 200 },
                VerifyError::ZeroArgCount { at: 6 },
                VerifyError::BadCatchRange { at: 8, range: 0 },
            ]
        );
    }

    #[test]
    fn missing_terminal() {
        let unit = unit_of(|b| {
            b.push("a").unwrap();
        });
        let (_, errors) = check_structural(&unit);
        assert_eq!(errors, vec![VerifyError::MissingTerminal { at: 0 }]);
    }
}
