//! Programmatic construction of compiled units.
//!
//! The builder resolves jump labels, interns literals and local names,
//! keeps exception ranges in the order they were opened (which is nesting
//! order when ranges are opened outside-in), and tracks the running stack
//! depth to fill in `max_stack_depth`.
//!
//! ```
//! use quill_common::{Opcode, RangeKind, UnitBuilder};
//!
//! let mut b = UnitBuilder::new();
//! let out = b.label();
//! let range = b.begin_range(RangeKind::Loop);
//! b.emit(Opcode::Break, &[]).unwrap();
//! b.end_range(range).unwrap();
//! b.set_break(range, out);
//! b.bind(out).unwrap();
//! b.push("done").unwrap();
//! b.emit(Opcode::Done, &[]).unwrap();
//! let unit = b.finish().unwrap();
//! assert_eq!(unit.ranges[0].break_target, Some(1));
//! ```

use std::collections::HashMap;

use crate::error::BuildError;
use crate::instruction::Instruction;
use crate::opcode::{OperandKind, Opcode};
use crate::unit::{CmdLocation, CompiledUnit, ExceptionRange, ForeachInfo, RangeKind};
use crate::value::Value;

/// A code position that may be bound after it is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

struct Fixup {
    at: usize,
    label: Label,
    kind: OperandKind,
}

struct PendingRange {
    kind: RangeKind,
    start: Label,
    end: Label,
    break_target: Option<Label>,
    continue_target: Option<Label>,
    catch_target: Option<Label>,
}

struct PendingCommand {
    start: Label,
    end: Label,
    src_offset: u32,
    src_len: u32,
}

/// Incrementally assembles a [`CompiledUnit`].
#[derive(Default)]
pub struct UnitBuilder {
    code: Vec<u8>,
    literals: Vec<Value>,
    literal_index: HashMap<String, u32>,
    locals: Vec<String>,
    local_index: HashMap<String, u32>,
    labels: Vec<Option<usize>>,
    label_depth: Vec<Option<i64>>,
    fixups: Vec<Fixup>,
    ranges: Vec<PendingRange>,
    commands: Vec<PendingCommand>,
    foreach_infos: Vec<ForeachInfo>,
    depth: i64,
    reachable: bool,
    max_depth: i64,
    max_override: Option<u32>,
    source: Option<String>,
}

impl UnitBuilder {
    pub fn new() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    /// Attach the source text used for error attribution.
    pub fn source(&mut self, text: impl Into<String>) {
        self.source = Some(text.into());
    }

    /// Current code offset.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Intern a literal, returning its index.
    pub fn literal(&mut self, text: &str) -> u32 {
        if let Some(&idx) = self.literal_index.get(text) {
            return idx;
        }
        self.add_literal(Value::from(text))
    }

    /// Append a literal without interning.
    pub fn add_literal(&mut self, value: Value) -> u32 {
        let idx = self.literals.len() as u32;
        self.literal_index
            .entry(value.as_str().to_string())
            .or_insert(idx);
        self.literals.push(value);
        idx
    }

    /// Intern a local variable name, returning its slot.
    pub fn local(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.local_index.get(name) {
            return idx;
        }
        self.add_local(name)
    }

    /// Append a local slot without interning.
    pub fn add_local(&mut self, name: &str) -> u32 {
        let idx = self.locals.len() as u32;
        self.local_index.entry(name.to_string()).or_insert(idx);
        self.locals.push(name.to_string());
        idx
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        self.label_depth.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> Result<(), BuildError> {
        if self.labels[label.0].is_some() {
            return Err(BuildError::LabelRebound(label.0));
        }
        self.labels[label.0] = Some(self.code.len());
        if let Some(d) = self.label_depth[label.0] {
            self.depth = if self.reachable { self.depth.max(d) } else { d };
        }
        self.reachable = true;
        Ok(())
    }

    /// Override the computed maximum stack depth.
    pub fn max_stack(&mut self, depth: u32) {
        self.max_override = Some(depth);
    }

    /// Emit an instruction with explicit operands.
    pub fn emit(&mut self, opcode: Opcode, operands: &[i64]) -> Result<usize, BuildError> {
        let kinds = opcode.operands();
        if operands.len() != kinds.len() {
            return Err(BuildError::OperandCount {
                opcode: opcode.mnemonic(),
                expected: kinds.len(),
                found: operands.len(),
            });
        }
        let at = self.code.len();
        for (value, kind) in operands.iter().zip(kinds) {
            if !kind.fits(*value) {
                return Err(BuildError::OperandOutOfRange {
                    at,
                    opcode: opcode.mnemonic(),
                    value: *value,
                });
            }
        }
        let instr = Instruction::new(opcode, operands);
        instr.encode(&mut self.code);
        self.track(&instr);
        Ok(at)
    }

    /// Emit a jump whose target is `label`.
    pub fn jump(&mut self, opcode: Opcode, label: Label) -> Result<usize, BuildError> {
        if !opcode.is_jump() {
            return Err(BuildError::NotAJump(opcode.mnemonic()));
        }
        let at = self.emit(opcode, &[0])?;
        self.fixups.push(Fixup {
            at,
            label,
            kind: opcode.operands()[0],
        });
        let depth_at_target = self.depth;
        let slot = &mut self.label_depth[label.0];
        *slot = Some(slot.map_or(depth_at_target, |d| d.max(depth_at_target)));
        Ok(at)
    }

    /// Push a literal, choosing the narrowest encoding.
    pub fn push(&mut self, text: &str) -> Result<usize, BuildError> {
        let idx = self.literal(text) as i64;
        if idx <= u8::MAX as i64 {
            self.emit(Opcode::Push1, &[idx])
        } else {
            self.emit(Opcode::Push4, &[idx])
        }
    }

    fn track(&mut self, instr: &Instruction) {
        self.depth = (self.depth - instr.pops() as i64).max(0) + instr.pushes() as i64;
        self.max_depth = self.max_depth.max(self.depth);
        if instr.opcode.is_terminal() {
            self.reachable = false;
        }
    }

    /// Open an exception range at the current offset.
    pub fn begin_range(&mut self, kind: RangeKind) -> usize {
        let start = self.label();
        let end = self.label();
        self.labels[start.0] = Some(self.code.len());
        self.add_range(kind, start, end)
    }

    /// Close a range opened with [`begin_range`](Self::begin_range).
    pub fn end_range(&mut self, range: usize) -> Result<(), BuildError> {
        let end = self.ranges.get(range).ok_or(BuildError::NotOpen(range))?.end;
        if self.labels[end.0].is_some() {
            return Err(BuildError::NotOpen(range));
        }
        self.labels[end.0] = Some(self.code.len());
        Ok(())
    }

    /// Add a range whose bounds are labels.
    pub fn add_range(&mut self, kind: RangeKind, start: Label, end: Label) -> usize {
        self.ranges.push(PendingRange {
            kind,
            start,
            end,
            break_target: None,
            continue_target: None,
            catch_target: None,
        });
        self.ranges.len() - 1
    }

    pub fn set_break(&mut self, range: usize, label: Label) {
        self.ranges[range].break_target = Some(label);
        self.seed_target(label);
    }

    pub fn set_continue(&mut self, range: usize, label: Label) {
        self.ranges[range].continue_target = Some(label);
        self.seed_target(label);
    }

    pub fn set_catch(&mut self, range: usize, label: Label) {
        self.ranges[range].catch_target = Some(label);
        self.seed_target(label);
    }

    fn seed_target(&mut self, label: Label) {
        let depth = self.depth;
        let slot = &mut self.label_depth[label.0];
        *slot = Some(slot.map_or(depth, |d| d.max(depth)));
    }

    /// Start a command location at the current offset.
    pub fn begin_command(&mut self, src_offset: u32, src_len: u32) -> usize {
        let start = self.label();
        let end = self.label();
        self.labels[start.0] = Some(self.code.len());
        self.add_command(start, end, src_offset, src_len)
    }

    pub fn end_command(&mut self, command: usize) -> Result<(), BuildError> {
        let end = self
            .commands
            .get(command)
            .ok_or(BuildError::NotOpen(command))?
            .end;
        if self.labels[end.0].is_some() {
            return Err(BuildError::NotOpen(command));
        }
        self.labels[end.0] = Some(self.code.len());
        Ok(())
    }

    /// Add a command location whose bounds are labels.
    pub fn add_command(&mut self, start: Label, end: Label, src_offset: u32, src_len: u32) -> usize {
        self.commands.push(PendingCommand {
            start,
            end,
            src_offset,
            src_len,
        });
        self.commands.len() - 1
    }

    /// Register foreach auxiliary data, returning its index.
    pub fn foreach_info(&mut self, info: ForeachInfo) -> u32 {
        self.foreach_infos.push(info);
        (self.foreach_infos.len() - 1) as u32
    }

    fn resolve(&self, label: Label) -> Result<u32, BuildError> {
        self.labels[label.0]
            .map(|off| off as u32)
            .ok_or(BuildError::UnboundLabel(label.0))
    }

    /// Resolve labels and produce the unit.
    pub fn finish(mut self) -> Result<CompiledUnit, BuildError> {
        for fixup in &self.fixups {
            let target = self.resolve(fixup.label)? as i64;
            let distance = target - fixup.at as i64;
            if !fixup.kind.fits(distance) {
                return Err(BuildError::JumpOutOfRange {
                    at: fixup.at,
                    distance,
                });
            }
            let operand_at = fixup.at + 1;
            match fixup.kind {
                OperandKind::I1 => self.code[operand_at] = distance as i8 as u8,
                _ => self.code[operand_at..operand_at + 4]
                    .copy_from_slice(&(distance as i32).to_le_bytes()),
            }
        }

        let mut ranges = Vec::with_capacity(self.ranges.len());
        for pending in &self.ranges {
            let start = self.resolve(pending.start)?;
            let end = self.resolve(pending.end)?;
            let target = |label: Option<Label>| label.map(|l| self.resolve(l)).transpose();
            ranges.push(ExceptionRange {
                kind: pending.kind,
                nesting_level: 0,
                code_start: start,
                code_len: end.saturating_sub(start),
                break_target: target(pending.break_target)?,
                continue_target: target(pending.continue_target)?,
                catch_target: target(pending.catch_target)?,
            });
        }
        let levels: Vec<u32> = (0..ranges.len())
            .map(|i| {
                ranges[..i]
                    .iter()
                    .filter(|outer| outer.encloses(&ranges[i]))
                    .count() as u32
            })
            .collect();
        for (range, level) in ranges.iter_mut().zip(levels) {
            range.nesting_level = level;
        }

        let mut cmd_locations = Vec::with_capacity(self.commands.len());
        for cmd in &self.commands {
            let start = self.resolve(cmd.start)?;
            let end = self.resolve(cmd.end)?;
            cmd_locations.push(CmdLocation {
                code_offset: start,
                code_len: end.saturating_sub(start),
                src_offset: cmd.src_offset,
                src_len: cmd.src_len,
            });
        }

        Ok(CompiledUnit {
            code: self.code,
            literals: self.literals,
            ranges,
            max_stack_depth: self.max_override.unwrap_or(self.max_depth as u32),
            locals: self.locals,
            foreach_infos: self.foreach_infos,
            cmd_locations,
            source: self.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_interned() {
        let mut b = UnitBuilder::new();
        assert_eq!(b.literal("a"), 0);
        assert_eq!(b.literal("b"), 1);
        assert_eq!(b.literal("a"), 0);
        assert_eq!(b.add_literal(Value::from("a")), 2);
    }

    #[test]
    fn forward_and_backward_jumps() {
        let mut b = UnitBuilder::new();
        let top = b.label();
        let end = b.label();
        b.bind(top).unwrap();
        b.push("1").unwrap();
        b.jump(Opcode::JumpFalse1, end).unwrap();
        b.jump(Opcode::Jump4, top).unwrap();
        b.bind(end).unwrap();
        b.push("x").unwrap();
        b.emit(Opcode::Done, &[]).unwrap();
        let unit = b.finish().unwrap();

        let instrs = Instruction::decode_all(&unit.code).unwrap();
        assert_eq!(instrs[1].1.jump_target(instrs[1].0), Some(9));
        assert_eq!(instrs[2].1.jump_target(instrs[2].0), Some(0));
    }

    #[test]
    fn short_jump_out_of_range() {
        let mut b = UnitBuilder::new();
        let end = b.label();
        b.jump(Opcode::Jump1, end).unwrap();
        for _ in 0..200 {
            b.emit(Opcode::Dup, &[]).unwrap();
        }
        b.bind(end).unwrap();
        assert!(matches!(
            b.finish(),
            Err(BuildError::JumpOutOfRange { at: 0, distance: 202 })
        ));
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut b = UnitBuilder::new();
        let nowhere = b.label();
        b.jump(Opcode::Jump1, nowhere).unwrap();
        assert!(matches!(b.finish(), Err(BuildError::UnboundLabel(_))));
    }

    #[test]
    fn operand_checks() {
        let mut b = UnitBuilder::new();
        assert!(matches!(
            b.emit(Opcode::Push1, &[256]),
            Err(BuildError::OperandOutOfRange { .. })
        ));
        assert!(matches!(
            b.emit(Opcode::Push1, &[]),
            Err(BuildError::OperandCount { expected: 1, found: 0, .. })
        ));
        assert!(matches!(
            b.jump(Opcode::Add, Label(0)),
            Err(BuildError::NotAJump("ADD"))
        ));
    }

    #[test]
    fn ranges_get_nesting_levels() {
        let mut b = UnitBuilder::new();
        let catch = b.label();
        let brk = b.label();
        let outer = b.begin_range(RangeKind::Catch);
        let inner = b.begin_range(RangeKind::Loop);
        b.emit(Opcode::Break, &[]).unwrap();
        b.end_range(inner).unwrap();
        b.end_range(outer).unwrap();
        b.set_catch(outer, catch);
        b.set_break(inner, brk);
        b.bind(brk).unwrap();
        b.bind(catch).unwrap();
        b.push("r").unwrap();
        b.emit(Opcode::Done, &[]).unwrap();
        let unit = b.finish().unwrap();
        assert_eq!(unit.ranges[0].nesting_level, 0);
        assert_eq!(unit.ranges[1].nesting_level, 1);
        assert_eq!(unit.ranges[1].code_len, 1);
    }

    #[test]
    fn max_depth_tracks_pushes() {
        let mut b = UnitBuilder::new();
        b.push("1").unwrap();
        b.push("2").unwrap();
        b.push("3").unwrap();
        b.emit(Opcode::Add, &[]).unwrap();
        b.emit(Opcode::Add, &[]).unwrap();
        b.emit(Opcode::Done, &[]).unwrap();
        assert_eq!(b.finish().unwrap().max_stack_depth, 3);
    }

    #[test]
    fn explicit_max_stack_wins() {
        let mut b = UnitBuilder::new();
        b.push("1").unwrap();
        b.emit(Opcode::Done, &[]).unwrap();
        b.max_stack(8);
        assert_eq!(b.finish().unwrap().max_stack_depth, 8);
    }
}
