//! Quill assembler: bidirectional text ↔ compiled unit translation.
//!
//! Assembly text is line oriented. Each line holds at most one label
//! definition (`name:`), one directive or one instruction, and an
//! optional `;` comment.
//!
//! ```text
//! .local "i"
//! .range loop top out break=out continue=top
//! top:  LOAD_SCALAR1 i
//!       PUSH1 "10"
//!       LT
//!       JUMP_FALSE1 out
//!       INCR_SCALAR1_IMM i 1
//!       POP
//!       JUMP1 top
//! out:  PUSH1 "done"
//!       DONE
//! ```
//!
//! # Usage
//!
//! ```
//! use quill_assembler::{assemble, disassemble};
//!
//! let unit = assemble("PUSH1 \"1\"\nPUSH1 \"2\"\nADD\nDONE\n").unwrap();
//! let text = disassemble(&unit).unwrap();
//! assert_eq!(assemble(&text).unwrap(), unit);
//! ```
//!
//! # Roundtrip Guarantee
//!
//! `assemble(disassemble(unit)) == unit` holds for every unit whose
//! ranges and command locations sit on instruction boundaries and whose
//! nesting levels are consistent. The disassembler outputs canonical
//! text; the assembler also accepts string and local-name operands,
//! named labels, and decimal or hex numbers.

pub mod error;

mod disassembler;
mod lexer;
mod parser;

pub use error::AsmError;

use lexer::tokenize_line;
use parser::Assembler;
use quill_common::{CompiledUnit, DecodeError};

/// Assemble text into a compiled unit.
///
/// Returns the first error encountered.
pub fn assemble(text: &str) -> Result<CompiledUnit, AsmError> {
    let mut asm = Assembler::new();

    for (idx, line) in text.lines().enumerate() {
        let line_num = idx + 1;
        let tokens = tokenize_line(line, line_num)?;
        asm.line(&tokens, line_num)?;
    }

    asm.finish()
}

/// Disassemble a unit into canonical assembly text.
///
/// Fails only if the code buffer does not decode.
pub fn disassemble(unit: &CompiledUnit) -> Result<String, DecodeError> {
    disassembler::disassemble(unit)
}
