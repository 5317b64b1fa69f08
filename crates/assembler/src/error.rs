//! Error types for the quill assembler.

use quill_common::BuildError;
use thiserror::Error;

/// Errors produced while assembling text into a compiled unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// An unrecognized opcode mnemonic was encountered.
    #[error("line {line}: unknown opcode '{token}'")]
    UnknownOpcode { line: usize, token: String },

    /// An unrecognized `.directive`.
    #[error("line {line}: unknown directive '{token}'")]
    UnknownDirective { line: usize, token: String },

    /// An opcode or directive did not have enough arguments.
    #[error("line {line}: {name} expects {expected} argument(s)")]
    MissingArgument {
        line: usize,
        name: &'static str,
        expected: usize,
    },

    /// A numeric literal could not be parsed or is out of range.
    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },

    /// A token appeared where it was not expected.
    #[error("line {line}: unexpected token '{token}'")]
    UnexpectedToken { line: usize, token: String },

    /// A string literal has no closing quote.
    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },

    /// A backslash escape inside a string is not recognized.
    #[error("line {line}: bad escape '{escape}'")]
    BadEscape { line: usize, escape: String },

    /// A label was defined twice.
    #[error("line {line}: label '{name}' already defined")]
    DuplicateLabel { line: usize, name: String },

    /// A label was referenced but never defined.
    #[error("line {line}: label '{name}' is never defined")]
    UndefinedLabel { line: usize, name: String },

    /// The unit builder rejected an instruction or table entry.
    #[error("line {line}: {source}")]
    Build {
        line: usize,
        #[source]
        source: BuildError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unknown_opcode() {
        let e = AsmError::UnknownOpcode {
            line: 3,
            token: "FOO".to_string(),
        };
        assert_eq!(e.to_string(), "line 3: unknown opcode 'FOO'");
    }

    #[test]
    fn error_display_missing_argument() {
        let e = AsmError::MissingArgument {
            line: 7,
            name: "LOAD_SCALAR1",
            expected: 1,
        };
        assert_eq!(e.to_string(), "line 7: LOAD_SCALAR1 expects 1 argument(s)");
    }

    #[test]
    fn error_display_undefined_label() {
        let e = AsmError::UndefinedLabel {
            line: 2,
            name: "loop".to_string(),
        };
        assert_eq!(e.to_string(), "line 2: label 'loop' is never defined");
    }

    #[test]
    fn error_display_build() {
        let e = AsmError::Build {
            line: 4,
            source: BuildError::JumpOutOfRange { at: 0, distance: 300 },
        };
        assert_eq!(
            e.to_string(),
            "line 4: jump at offset 0 cannot reach its target (300 bytes away)"
        );
    }
}
