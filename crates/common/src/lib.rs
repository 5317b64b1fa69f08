//! Quill common types: instruction set, values and compiled units.
//!
//! This crate provides the data structures shared by the interpreter,
//! verifier and assembler:
//!
//! - [`Opcode`] and [`Instruction`]: the variable-width instruction set
//! - [`Value`]: shared, lazily converted runtime values
//! - [`Number`]: integer, wide and double representations
//! - [`CompiledUnit`]: code plus literals, exception ranges, locals,
//!   foreach descriptors and command locations, with a checksummed
//!   binary container
//! - [`UnitBuilder`]: label-resolving construction of compiled units
//! - list syntax helpers in [`list`] and math function descriptors in
//!   [`mathfunc`]

pub mod builder;
pub mod error;
pub mod instruction;
pub mod list;
pub mod mathfunc;
pub mod number;
pub mod opcode;
pub mod unit;
pub mod value;

// Re-export commonly used types at the crate root.
pub use builder::{Label, UnitBuilder};
pub use error::{BuildError, DecodeError, ListError, NumberError};
pub use instruction::Instruction;
pub use mathfunc::{ArgKind, BuiltinFunc, BUILTIN_FUNCS};
pub use number::Number;
pub use opcode::{OperandKind, Opcode, ALL_OPCODES};
pub use unit::{CmdLocation, CompiledUnit, ExceptionRange, ForeachInfo, ForeachList, RangeKind};
pub use value::Value;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any list of elements formats into text that splits back into
        /// the same elements.
        #[test]
        fn format_split_roundtrip(
            elements in prop::collection::vec("[a-z{}\\\\\" #\\[\\]$;]{0,6}", 0..8)
        ) {
            let text = list::format_list(&elements);
            let split = list::split_list(&text).unwrap();
            prop_assert_eq!(split, elements);
        }

        /// Number parsing never panics, and whatever parses as an integer
        /// prints back to something that parses to the same value.
        #[test]
        fn parse_number_total(text in "[-+ 0-9a-fxXeE.]{0,12}") {
            if let Ok(n) = number::parse_number(&text) {
                if let Some(v) = n.as_i64() {
                    prop_assert_eq!(number::parse_number(&v.to_string()), Ok(n));
                }
            }
        }

        /// Random bytes either fail to decode or decode to an instruction
        /// that re-encodes to the same prefix.
        #[test]
        fn random_bytes_decode(bytes in prop::collection::vec(any::<u8>(), 1..8)) {
            match Instruction::decode_at(&bytes, 0) {
                Ok(instr) => {
                    let mut out = Vec::new();
                    instr.encode(&mut out);
                    prop_assert_eq!(&out[..], &bytes[..instr.encoded_len()]);
                }
                Err(e) => {
                    let expected = matches!(
                        e,
                        DecodeError::UnknownOpcode { at: 0, .. } | DecodeError::Truncated { at: 0 }
                    );
                    prop_assert!(expected, "unexpected decode error: {:?}", e);
                }
            }
        }
    }
}
