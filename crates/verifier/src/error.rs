//! Verification errors for compiled units.
//!
//! Instruction-level errors carry the code offset (`at`); table errors
//! carry the index of the offending range, command location or foreach
//! entry. The verifier collects all errors, not just the first.

use quill_common::DecodeError;
use thiserror::Error;

/// Errors found during static verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    // --- Structural ---
    /// The code could not be decoded; later passes are skipped.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unit has no code")]
    EmptyCode,

    /// The last instruction can fall off the end of the code.
    #[error("code does not end in a terminal instruction (last instruction at {at})")]
    MissingTerminal { at: usize },

    #[error("literal index {index} out of range at offset {at}")]
    LiteralOutOfRange { at: usize, index: usize },

    #[error("local slot {index} out of range at offset {at}")]
    LocalOutOfRange { at: usize, index: usize },

    #[error("foreach info {index} out of range at offset {at}")]
    ForeachOutOfRange { at: usize, index: usize },

    /// A foreach info names a local slot that does not exist.
    #[error("foreach info {info} refers to local slot {slot}, which does not exist")]
    ForeachSlotOutOfRange { info: usize, slot: u32 },

    #[error("unknown built-in math function {index} at offset {at}")]
    UnknownBuiltin { at: usize, index: usize },

    /// Invocation with no command or function name.
    #[error("zero argument count at offset {at}")]
    ZeroArgCount { at: usize },

    /// `BEGIN_CATCH4` names a missing range or a loop range.
    #[error("BEGIN_CATCH4 at offset {at} refers to range {range}, which is not a catch range")]
    BadCatchRange { at: usize, range: usize },

    /// A jump lands outside the code or inside another instruction.
    #[error("jump at offset {at} targets {target}, which is not an instruction boundary")]
    BadJumpTarget { at: usize, target: i64 },

    // --- Ranges ---
    #[error("exception range {range} lies outside the code or splits an instruction")]
    RangeOutOfBounds { range: usize },

    #[error("{kind} range {range} has no {target} target")]
    MissingTarget {
        range: usize,
        kind: &'static str,
        target: &'static str,
    },

    #[error("exception range {range} has {target} target {offset}, which is not an instruction boundary")]
    BadRangeTarget {
        range: usize,
        target: &'static str,
        offset: u32,
    },

    /// A range encloses or partially overlaps a range listed before it.
    #[error("exception range {range} is out of nesting order with range {other}")]
    RangeOrder { range: usize, other: usize },

    #[error("exception range {range} has nesting level {found}, expected {expected}")]
    NestingLevel {
        range: usize,
        expected: u32,
        found: u32,
    },

    #[error("command location {index} lies outside the code or source")]
    CmdLocationOutOfBounds { index: usize },

    // --- Stack ---
    #[error("stack underflow at offset {at}: depth {depth}, instruction needs {needed}")]
    StackUnderflow {
        at: usize,
        depth: usize,
        needed: usize,
    },

    /// A `break`/`continue` would reach its target with values left over
    /// from the loop body.
    #[error("loop exit at offset {at} leaves depth {depth}, but range {range} starts at depth {expected}")]
    UnbalancedLoopExit {
        at: usize,
        range: usize,
        depth: usize,
        expected: usize,
    },

    /// Two paths reach an instruction with different depths.
    #[error("inconsistent stack depth at offset {at}: {expected} on one path, {found} on another")]
    InconsistentDepth {
        at: usize,
        expected: usize,
        found: usize,
    },

    #[error("unbalanced stack at DONE (offset {at}): depth {depth}, expected 1")]
    UnbalancedDone { at: usize, depth: usize },

    #[error("declared max stack depth {declared} is below the required {required}")]
    MaxDepthTooSmall { declared: u32, required: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_location() {
        assert_eq!(
            VerifyError::BadJumpTarget { at: 4, target: 7 }.to_string(),
            "jump at offset 4 targets 7, which is not an instruction boundary"
        );
        assert_eq!(
            VerifyError::MissingTarget {
                range: 1,
                kind: "loop",
                target: "break"
            }
            .to_string(),
            "loop range 1 has no break target"
        );
        assert_eq!(
            VerifyError::UnbalancedDone { at: 9, depth: 2 }.to_string(),
            "unbalanced stack at DONE (offset 9): depth 2, expected 1"
        );
    }

    #[test]
    fn decode_errors_pass_through() {
        let err = VerifyError::from(DecodeError::UnknownOpcode { at: 3, opcode: 0xfe });
        assert_eq!(err.to_string(), "unknown opcode 0xfe at offset 3");
    }
}
