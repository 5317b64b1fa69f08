//! Disassembler: compiled unit → canonical assembly text.
//!
//! Output is flat text with no indentation and no comments: the
//! directives for every table in table order, then the code with an
//! `L<offset>:` line before each referenced offset. Operands are printed
//! as numbers so that literal and local indices survive reassembly even
//! when a table holds duplicates.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;

use quill_common::{CompiledUnit, DecodeError, Instruction, RangeKind};

use crate::lexer::quote;

fn label(offset: impl std::fmt::Display) -> String {
    format!("L{offset}")
}

/// Disassemble a unit into canonical assembly text.
///
/// For units whose ranges and command locations sit on instruction
/// boundaries, `assemble(disassemble(unit)) == unit`.
pub fn disassemble(unit: &CompiledUnit) -> Result<String, DecodeError> {
    let instrs = Instruction::decode_all(&unit.code)?;
    let boundaries: HashSet<usize> = instrs
        .iter()
        .map(|(at, _)| *at)
        .chain(std::iter::once(unit.code.len()))
        .collect();
    let mut referenced = BTreeSet::new();
    let mut lines = Vec::new();

    if let Some(source) = &unit.source {
        lines.push(format!(".source {}", quote(source)));
    }
    lines.push(format!(".maxstack {}", unit.max_stack_depth));
    for name in &unit.locals {
        lines.push(format!(".local {}", quote(name)));
    }
    for literal in &unit.literals {
        lines.push(format!(".literal {}", quote(literal.as_str())));
    }

    for info in &unit.foreach_infos {
        let mut line = format!(".foreach counter={}", info.loop_counter_slot);
        for list in &info.lists {
            let vars: Vec<String> = list.vars.iter().map(u32::to_string).collect();
            let _ = write!(line, " list={}:{}", list.temp_slot, vars.join(","));
        }
        lines.push(line);
    }

    for range in &unit.ranges {
        let kind = match range.kind {
            RangeKind::Loop => "loop",
            RangeKind::Catch => "catch",
        };
        let mut line = format!(
            ".range {kind} {} {}",
            label(range.code_start),
            label(range.code_end())
        );
        referenced.extend([range.code_start as usize, range.code_end() as usize]);
        let targets = [
            ("break", range.break_target),
            ("continue", range.continue_target),
            ("catch", range.catch_target),
        ];
        for (key, target) in targets {
            if let Some(target) = target {
                let _ = write!(line, " {key}={}", label(target));
                referenced.insert(target as usize);
            }
        }
        lines.push(line);
    }

    for cmd in &unit.cmd_locations {
        let end = cmd.code_offset + cmd.code_len;
        lines.push(format!(
            ".cmd {} {} {} {}",
            label(cmd.code_offset),
            label(end),
            cmd.src_offset,
            cmd.src_len
        ));
        referenced.extend([cmd.code_offset as usize, end as usize]);
    }

    let jump_label = |at: usize, instr: &Instruction| {
        instr
            .jump_target(at)
            .and_then(|t| usize::try_from(t).ok())
            .filter(|t| boundaries.contains(t))
    };
    referenced.extend(instrs.iter().filter_map(|(at, instr)| jump_label(*at, instr)));

    for (at, instr) in &instrs {
        if referenced.contains(at) {
            lines.push(format!("{}:", label(at)));
        }
        let mut line = instr.opcode.mnemonic().to_string();
        match jump_label(*at, instr) {
            Some(target) => {
                let _ = write!(line, " {}", label(target));
            }
            None => {
                for n in 0..instr.opcode.operands().len() {
                    let _ = write!(line, " {}", instr.operand(n));
                }
            }
        }
        lines.push(line);
    }
    if referenced.contains(&unit.code.len()) {
        lines.push(format!("{}:", label(unit.code.len())));
    }

    let mut result = lines.join("\n");
    result.push('\n');
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_common::{Opcode, UnitBuilder};

    #[test]
    fn empty_unit() {
        assert_eq!(disassemble(&CompiledUnit::default()).unwrap(), ".maxstack 0\n");
    }

    #[test]
    fn tables_then_code() {
        let mut b = UnitBuilder::new();
        b.source("set x 1");
        let x = b.local("x") as i64;
        b.push("1").unwrap();
        b.emit(Opcode::StoreScalar1, &[x]).unwrap();
        b.emit(Opcode::Done, &[]).unwrap();
        let unit = b.finish().unwrap();
        assert_eq!(
            disassemble(&unit).unwrap(),
            ".source \"set x 1\"\n.maxstack 1\n.local \"x\"\n.literal \"1\"\nPUSH1 0\nSTORE_SCALAR1 0\nDONE\n"
        );
    }

    #[test]
    fn jumps_get_labels() {
        let mut b = UnitBuilder::new();
        let top = b.label();
        let out = b.label();
        b.bind(top).unwrap();
        b.push("1").unwrap();
        b.jump(Opcode::JumpFalse1, out).unwrap();
        b.jump(Opcode::Jump4, top).unwrap();
        b.bind(out).unwrap();
        b.push("1").unwrap();
        b.emit(Opcode::Done, &[]).unwrap();
        let text = disassemble(&b.finish().unwrap()).unwrap();
        assert!(text.ends_with("L0:\nPUSH1 0\nJUMP_FALSE1 L9\nJUMP4 L0\nL9:\nPUSH1 0\nDONE\n"), "{text}");
    }

    #[test]
    fn jump_into_an_instruction_stays_numeric() {
        let unit = CompiledUnit {
            code: vec![0x27, 3, 0x01, 0, 0x00],
            ..CompiledUnit::default()
        };
        assert!(disassemble(&unit).unwrap().contains("JUMP1 3\n"));
    }

    #[test]
    fn undecodable_code() {
        let unit = CompiledUnit {
            code: vec![0xff],
            ..CompiledUnit::default()
        };
        assert!(matches!(disassemble(&unit), Err(DecodeError::UnknownOpcode { at: 0, .. })));
    }
}
