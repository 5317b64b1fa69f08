//! Error types shared by every quill crate.
//!
//! Decoding errors carry the byte offset or container section where the
//! problem was found. The number and list errors describe why a string has
//! no numeric or list view; their `Display` text is what the interpreter
//! shows to users.

use thiserror::Error;

/// Errors that occur while decoding instructions or a compiled-unit container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode byte is not assigned.
    #[error("unknown opcode {opcode:#04x} at offset {at}")]
    UnknownOpcode { at: usize, opcode: u8 },

    /// Operand bytes run past the end of the code.
    #[error("truncated instruction at offset {at}")]
    Truncated { at: usize },

    /// A jump lands outside the code.
    #[error("jump at offset {at} targets {target}, outside the code")]
    JumpOutOfBounds { at: usize, target: i64 },

    /// An operand names a table entry that does not exist.
    #[error("{table} index {index} out of range at offset {at}")]
    IndexOutOfRange {
        at: usize,
        table: &'static str,
        index: usize,
    },

    /// Container does not start with the `QBC1` magic.
    #[error("not a compiled unit (bad magic)")]
    BadMagic,

    /// Container ended in the middle of a section.
    #[error("unexpected end of data in {section} section")]
    UnexpectedEof { section: &'static str },

    /// A string in the container is not UTF-8.
    #[error("invalid UTF-8 in {section} section")]
    InvalidUtf8 { section: &'static str },

    /// Exception range kind byte is neither loop nor catch.
    #[error("invalid exception range kind: {0}")]
    InvalidRangeKind(u8),

    /// Trailing digest does not match the container contents.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// Why a string has no numeric view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NumberError {
    #[error("empty string")]
    Empty,

    #[error("non-numeric string")]
    NotNumeric,

    /// Leading zero followed by an `8` or `9`.
    #[error("invalid octal number")]
    InvalidOctal,

    /// Integer magnitude does not fit in 64 bits.
    #[error("integer value too large to represent")]
    TooLarge,

    #[error("floating-point value too large to represent")]
    FloatTooLarge,
}

/// Why a string has no list view, or an index into one is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("unmatched open brace in list")]
    UnmatchedBrace,

    #[error("unmatched open quote in list")]
    UnmatchedQuote,

    #[error("list element in braces followed by \"{0}\" instead of space")]
    BraceFollowedBy(String),

    #[error("list element in quotes followed by \"{0}\" instead of space")]
    QuoteFollowedBy(String),

    #[error("bad index \"{0}\": must be integer or end?-integer?")]
    BadIndex(String),
}

/// Errors from [`crate::UnitBuilder::finish`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A label was referenced but never bound to an offset.
    #[error("label {0} is never bound")]
    UnboundLabel(usize),

    /// A label was bound twice.
    #[error("label {0} bound twice")]
    LabelRebound(usize),

    /// A one-byte jump cannot reach its target.
    #[error("jump at offset {at} cannot reach its target ({distance} bytes away)")]
    JumpOutOfRange { at: usize, distance: i64 },

    /// An operand value does not fit its encoded width.
    #[error("operand {value} does not fit {opcode} at offset {at}")]
    OperandOutOfRange {
        at: usize,
        opcode: &'static str,
        value: i64,
    },

    /// Wrong number of operands for an opcode.
    #[error("{opcode} takes {expected} operand(s), got {found}")]
    OperandCount {
        opcode: &'static str,
        expected: usize,
        found: usize,
    },

    /// `end_range`/`end_command` called for an unknown handle.
    #[error("no open region with handle {0}")]
    NotOpen(usize),

    /// The emitted opcode is not a jump but was given a label.
    #[error("{0} is not a jump instruction")]
    NotAJump(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_opcode() {
        assert_eq!(
            DecodeError::UnknownOpcode { at: 3, opcode: 0xfe }.to_string(),
            "unknown opcode 0xfe at offset 3"
        );
    }

    #[test]
    fn display_number_errors_are_operand_descriptions() {
        assert_eq!(NumberError::NotNumeric.to_string(), "non-numeric string");
        assert_eq!(NumberError::InvalidOctal.to_string(), "invalid octal number");
        assert_eq!(
            NumberError::TooLarge.to_string(),
            "integer value too large to represent"
        );
    }

    #[test]
    fn display_list_errors() {
        assert_eq!(
            ListError::BraceFollowedBy("x".into()).to_string(),
            "list element in braces followed by \"x\" instead of space"
        );
        assert_eq!(
            ListError::BadIndex("foo".into()).to_string(),
            "bad index \"foo\": must be integer or end?-integer?"
        );
    }

    #[test]
    fn display_jump_out_of_range() {
        assert_eq!(
            BuildError::JumpOutOfRange { at: 10, distance: 300 }.to_string(),
            "jump at offset 10 cannot reach its target (300 bytes away)"
        );
    }
}
