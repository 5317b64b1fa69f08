//! Completion codes and runtime exceptions.
//!
//! Every non-normal completion of an instruction travels as an
//! [`Exception`]: errors, but also `return`, `break`, `continue` and
//! custom integer codes. Errors additionally carry an [`ErrorKind`], an
//! accumulated trace (`info`) and, once attributed, the code offset and
//! source span they were raised from.

use std::fmt;

use quill_common::{DecodeError, ListError, Value};
use thiserror::Error;

/// Completion code of an evaluation that did not finish normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Error,
    Return,
    Break,
    Continue,
    /// Application-defined code.
    Other(i32),
}

impl Code {
    /// Integer form, as reported by `PUSH_RETURN_CODE`.
    pub fn as_int(self) -> i32 {
        match self {
            Code::Error => 1,
            Code::Return => 2,
            Code::Break => 3,
            Code::Continue => 4,
            Code::Other(n) => n,
        }
    }

    pub fn from_int(n: i32) -> Option<Code> {
        match n {
            0 => None,
            1 => Some(Code::Error),
            2 => Some(Code::Return),
            3 => Some(Code::Break),
            4 => Some(Code::Continue),
            n => Some(Code::Other(n)),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Error => f.write_str("error"),
            Code::Return => f.write_str("return"),
            Code::Break => f.write_str("break"),
            Code::Continue => f.write_str("continue"),
            Code::Other(n) => write!(f, "{n}"),
        }
    }
}

/// Where an error was attributed: the code offset of the failing
/// instruction and, when a command location covers it, the source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub pc: usize,
    /// `(offset, length)` into the unit's source text.
    pub span: Option<(usize, usize)>,
}

/// Error conditions raised by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("divide by zero")]
    DivideByZero,

    /// A floating-point operation produced NaN.
    #[error("domain error: argument not in valid range")]
    DomainError,

    #[error("floating-point value too large to represent")]
    FloatOverflow,

    #[error("floating-point value too small to represent")]
    FloatUnderflow,

    #[error("integer value too large to represent")]
    IntegerTooLarge,

    #[error("negative shift argument")]
    NegativeShift,

    /// An operand has no usable numeric view.
    #[error("can't use {problem} as operand of \"{op}\"")]
    IllegalOperand {
        problem: &'static str,
        op: &'static str,
    },

    #[error("expected integer but got \"{0}\"")]
    ExpectedInteger(String),

    #[error("expected boolean value but got \"{0}\"")]
    ExpectedBoolean(String),

    #[error("invalid command name \"{0}\"")]
    UnknownCommand(String),

    #[error("unknown math function \"{0}\"")]
    UnknownMathFunction(String),

    #[error("too few arguments for math function")]
    TooFewMathArgs,

    #[error("too many arguments for math function")]
    TooManyMathArgs,

    #[error("argument to math function didn't have numeric value")]
    NonNumericMathArg,

    #[error("can't {action} \"{name}\": {reason}")]
    Variable {
        action: &'static str,
        name: String,
        reason: String,
    },

    #[error("too many nested evaluations (infinite loop?)")]
    NestingLimit,

    #[error("invoked \"{0}\" outside of a loop")]
    OutsideLoop(&'static str),

    #[error("wrong # args: should be \"{0}\"")]
    WrongArgs(String),

    #[error(transparent)]
    List(#[from] ListError),

    /// Raised by a command or variable observer with its own message.
    #[error("{0}")]
    Delegate(String),

    /// The instruction stream could not be decoded at run time.
    #[error("malformed compiled unit: {0}")]
    Malformed(#[from] DecodeError),
}

impl ErrorKind {
    /// Machine-readable classification, in the `errorCode` style.
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::DivideByZero => "ARITH DIVZERO",
            ErrorKind::DomainError => "ARITH DOMAIN",
            ErrorKind::FloatOverflow => "ARITH OVERFLOW",
            ErrorKind::FloatUnderflow => "ARITH UNDERFLOW",
            ErrorKind::IntegerTooLarge => "ARITH IOVERFLOW",
            _ => "NONE",
        }
    }
}

/// A non-normal completion propagating through frames.
#[derive(Debug, Clone)]
pub struct Exception {
    pub code: Code,
    /// The error message for errors, the returned value otherwise.
    pub value: Value,
    pub kind: Option<ErrorKind>,
    /// Error trace, starting with the message.
    pub info: String,
    pub location: Option<SourceLocation>,
    attributed: bool,
}

impl Exception {
    pub fn error(kind: ErrorKind) -> Self {
        let message = kind.to_string();
        Self {
            code: Code::Error,
            value: Value::from(message.as_str()),
            kind: Some(kind),
            info: message,
            location: None,
            attributed: false,
        }
    }

    /// An error with a free-form message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::error(ErrorKind::Delegate(msg.into()))
    }

    /// A completion with an arbitrary code and value.
    pub fn with_code(code: Code, value: Value) -> Self {
        let info = if code == Code::Error {
            value.as_str().to_string()
        } else {
            String::new()
        };
        Self {
            code,
            value,
            kind: None,
            info,
            location: None,
            attributed: false,
        }
    }

    /// A `break`/`continue`/`return` with an empty value.
    pub fn control(code: Code) -> Self {
        Self::with_code(code, Value::empty())
    }

    pub fn is_attributed(&self) -> bool {
        self.attributed
    }

    /// Record where the error happened. Only the first call has an effect.
    pub fn attribute(&mut self, location: Option<SourceLocation>, snippet: Option<&str>) {
        if self.attributed {
            return;
        }
        self.attributed = true;
        self.location = location;
        if let Some(text) = snippet {
            self.add_info(&format!("\n    while executing\n\"{}\"", ellipsize(text)));
        }
    }

    /// Append a line to the error trace.
    pub fn add_info(&mut self, text: &str) {
        self.info.push_str(text);
    }

    pub fn error_code(&self) -> &'static str {
        self.kind.as_ref().map_or("NONE", ErrorKind::error_code)
    }

    /// Whether this error signals an undecodable instruction stream.
    pub fn is_malformed(&self) -> bool {
        matches!(self.kind, Some(ErrorKind::Malformed(_)))
    }
}

const SNIPPET_LIMIT: usize = 150;

fn ellipsize(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Code::Error => f.write_str(self.value.as_str()),
            code => write!(f, "{code} completion: {}", self.value),
        }
    }
}

impl std::error::Error for Exception {}

impl From<ErrorKind> for Exception {
    fn from(kind: ErrorKind) -> Self {
        Exception::error(kind)
    }
}
