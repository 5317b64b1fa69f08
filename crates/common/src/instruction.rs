//! Instruction encoding and decoding.
//!
//! Instructions are variable width: one opcode byte followed by the
//! operands listed by [`Opcode::operands`], little-endian.
//! ```text
//! PUSH1 3          01 03
//! JUMP4 -12        28 f4 ff ff ff
//! INCR_SCALAR1_IMM 0 -1   19 00 ff
//! ```

use std::fmt;

use crate::error::DecodeError;
use crate::mathfunc;
use crate::opcode::{OperandKind, Opcode};

/// A decoded instruction. Unused operand positions are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    operands: [i64; 2],
}

impl Instruction {
    /// Create an instruction. Missing operands default to zero.
    pub fn new(opcode: Opcode, operands: &[i64]) -> Self {
        let mut ops = [0; 2];
        for (slot, value) in ops.iter_mut().zip(operands) {
            *slot = *value;
        }
        Self {
            opcode,
            operands: ops,
        }
    }

    /// Operand `n` as a signed value.
    pub fn operand(&self, n: usize) -> i64 {
        self.operands[n]
    }

    /// Operand `n` as a table index. Only meaningful for unsigned operands.
    pub fn index(&self, n: usize) -> usize {
        self.operands[n] as usize
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        self.opcode.encoded_len()
    }

    /// Decode the instruction starting at `at`.
    pub fn decode_at(code: &[u8], at: usize) -> Result<Self, DecodeError> {
        let byte = *code.get(at).ok_or(DecodeError::Truncated { at })?;
        let opcode = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { at, opcode: byte })?;

        let mut operands = [0i64; 2];
        let mut cursor = at + 1;
        for (slot, kind) in operands.iter_mut().zip(opcode.operands()) {
            let bytes = code
                .get(cursor..cursor + kind.width())
                .ok_or(DecodeError::Truncated { at })?;
            *slot = match kind {
                OperandKind::U1 => bytes[0] as i64,
                OperandKind::I1 => bytes[0] as i8 as i64,
                OperandKind::U4 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
                OperandKind::I4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
            };
            cursor += kind.width();
        }

        Ok(Self { opcode, operands })
    }

    /// Decode a whole code buffer into `(offset, instruction)` pairs.
    pub fn decode_all(code: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
        let mut out = Vec::new();
        let mut pc = 0;
        while pc < code.len() {
            let instr = Instruction::decode_at(code, pc)?;
            out.push((pc, instr));
            pc += instr.encoded_len();
        }
        Ok(out)
    }

    /// Append the encoded bytes to `out`. Operands are truncated to their width;
    /// callers check ranges with [`OperandKind::fits`] first.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode as u8);
        for (value, kind) in self.operands.iter().zip(self.opcode.operands()) {
            match kind {
                OperandKind::U1 | OperandKind::I1 => out.push(*value as u8),
                OperandKind::U4 => out.extend_from_slice(&(*value as u32).to_le_bytes()),
                OperandKind::I4 => out.extend_from_slice(&(*value as i32).to_le_bytes()),
            }
        }
    }

    /// Absolute jump target for a jump located at `at`.
    pub fn jump_target(&self, at: usize) -> Option<i64> {
        self.opcode.is_jump().then(|| at as i64 + self.operands[0])
    }

    /// Number of stack values this instruction consumes.
    ///
    /// This is also the cleanup count discarded when a loop range absorbs a
    /// break or continue raised by the instruction.
    pub fn pops(&self) -> usize {
        use Opcode::*;
        match self.opcode {
            Push1 | Push4 | LoadScalar1 | LoadScalar4 | IncrScalar1Imm | Jump1 | Jump4 | Break
            | Continue | ForeachStart4 | ForeachStep4 | BeginCatch4 | EndCatch | PushResult
            | PushReturnCode => 0,

            Done | Pop | Dup | LoadScalarStk | LoadArray1 | LoadArray4 | LoadStk
            | StoreScalar1 | StoreScalar4 | IncrScalar1 | IncrScalarStkImm | IncrArray1Imm
            | AppendScalar1 | AppendScalar4 | LappendScalar1 | LappendScalar4 | JumpTrue1
            | JumpTrue4 | JumpFalse1 | JumpFalse4 | Uplus | Uminus | Bitnot | Not
            | TryCvtToNumeric | StrLen | ListLength | Return => 1,

            LoadArrayStk | StoreScalarStk | StoreArray1 | StoreArray4 | StoreStk
            | IncrScalarStk | IncrArray1 | IncrArrayStkImm | AppendArray1 | AppendStk
            | LappendArray1 | LappendStk | Lor | Land | Bitor | Bitxor | Bitand | Eq | Neq
            | Lt | Gt | Le | Ge | Lshift | Rshift | Add | Sub | Mult | Div | Mod | StrEq
            | StrNeq | StrCmp | StrIndex | ListIndex => 2,

            StoreArrayStk | IncrArrayStk => 3,

            Over => self.index(0) + 1,
            Concat1 | InvokeStk1 | InvokeStk4 | CallFunc1 | List => self.index(0),
            CallBuiltinFunc1 => mathfunc::builtin(self.index(0)).map_or(0, |f| f.arity()),
        }
    }

    /// Number of stack values this instruction produces.
    pub fn pushes(&self) -> usize {
        use Opcode::*;
        match self.opcode {
            Done | Pop | Jump1 | Jump4 | JumpTrue1 | JumpTrue4 | JumpFalse1 | JumpFalse4
            | Break | Continue | ForeachStart4 | BeginCatch4 | EndCatch | Return => 0,
            Dup => 2,
            Over => self.index(0) + 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        for value in &self.operands[..self.opcode.operands().len()] {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(instr: Instruction) -> Vec<u8> {
        let mut out = Vec::new();
        instr.encode(&mut out);
        out
    }

    #[test]
    fn encode_push1() {
        assert_eq!(encoded(Instruction::new(Opcode::Push1, &[3])), vec![0x01, 0x03]);
    }

    #[test]
    fn encode_negative_jump4() {
        assert_eq!(
            encoded(Instruction::new(Opcode::Jump4, &[-12])),
            vec![0x28, 0xf4, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn decode_signed_immediate() {
        let instr = Instruction::decode_at(&[0x19, 0x00, 0xff], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::IncrScalar1Imm);
        assert_eq!(instr.operand(0), 0);
        assert_eq!(instr.operand(1), -1);
    }

    #[test]
    fn decode_at_offset() {
        let code = [0x03, 0x02, 0x10, 0x00, 0x00, 0x00];
        let instr = Instruction::decode_at(&code, 1).unwrap();
        assert_eq!(instr, Instruction::new(Opcode::Push4, &[16]));
    }

    #[test]
    fn decode_truncated_operand() {
        assert_eq!(
            Instruction::decode_at(&[0x02, 0x01], 0),
            Err(DecodeError::Truncated { at: 0 })
        );
    }

    #[test]
    fn decode_unknown_opcode() {
        assert_eq!(
            Instruction::decode_at(&[0x00, 0xee], 1),
            Err(DecodeError::UnknownOpcode { at: 1, opcode: 0xee })
        );
    }

    #[test]
    fn decode_all_walks_variable_widths() {
        let mut code = Vec::new();
        Instruction::new(Opcode::Push1, &[0]).encode(&mut code);
        Instruction::new(Opcode::Push4, &[1]).encode(&mut code);
        Instruction::new(Opcode::Add, &[]).encode(&mut code);
        Instruction::new(Opcode::Done, &[]).encode(&mut code);
        let offsets: Vec<usize> = Instruction::decode_all(&code)
            .unwrap()
            .into_iter()
            .map(|(pc, _)| pc)
            .collect();
        assert_eq!(offsets, vec![0, 2, 7, 8]);
    }

    #[test]
    fn jump_target_is_relative() {
        let instr = Instruction::new(Opcode::JumpFalse1, &[-4]);
        assert_eq!(instr.jump_target(10), Some(6));
        assert_eq!(Instruction::new(Opcode::Add, &[]).jump_target(10), None);
    }

    #[test]
    fn stack_effects() {
        assert_eq!(Instruction::new(Opcode::InvokeStk1, &[3]).pops(), 3);
        assert_eq!(Instruction::new(Opcode::StoreArrayStk, &[]).pops(), 3);
        assert_eq!(Instruction::new(Opcode::Over, &[1]).pops(), 2);
        assert_eq!(Instruction::new(Opcode::Over, &[1]).pushes(), 3);
        let atan2 = mathfunc::builtin_index("atan2").unwrap() as i64;
        assert_eq!(Instruction::new(Opcode::CallBuiltinFunc1, &[atan2]).pops(), 2);
        assert_eq!(Instruction::new(Opcode::Break, &[]).pushes(), 0);
    }

    #[test]
    fn display_lists_operands() {
        assert_eq!(
            Instruction::new(Opcode::IncrScalar1Imm, &[2, -1]).to_string(),
            "INCR_SCALAR1_IMM 2 -1"
        );
        assert_eq!(Instruction::new(Opcode::Add, &[]).to_string(), "ADD");
    }
}
