//! Quill virtual machine: executes compiled bytecode units.
//!
//! The interpreter is a stack machine with:
//! - One evaluation stack shared by all frames, grown at frame entry
//! - Variable frames addressed by local slot or by name
//! - Exception ranges that route `break`, `continue` and errors
//! - Pluggable commands and math functions
//!
//! # Usage
//!
//! ```
//! use quill_common::{Opcode, UnitBuilder};
//! use quill_vm::run;
//!
//! let mut b = UnitBuilder::new();
//! b.push("1").unwrap();
//! b.push("2.5").unwrap();
//! b.emit(Opcode::Add, &[]).unwrap();
//! b.emit(Opcode::Done, &[]).unwrap();
//! let unit = b.finish().unwrap();
//!
//! assert_eq!(run(&unit).unwrap().as_str(), "3.5");
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod execute;
pub mod machine;
pub mod mathfunc;
pub mod numeric;
pub mod stack;
mod unwind;
pub mod vars;

pub use command::{Command, ProcCommand};
pub use config::Config;
pub use error::{Code, ErrorKind, Exception, SourceLocation};
pub use machine::{AsyncFlag, AsyncHandler, Interp};
pub use mathfunc::MathFn;
pub use stack::{EvalStack, FrameMark};
pub use vars::{TraceEvent, TraceOp, VarTrace, WriteMode};

use quill_common::{CompiledUnit, Value};

/// Evaluate a unit in a fresh interpreter.
///
/// # Errors
///
/// Returns the [`Exception`] that ended evaluation: a runtime error, or
/// a stray `break`/`continue` reported as an error.
pub fn run(unit: &CompiledUnit) -> Result<Value, Exception> {
    Interp::new().eval_unit(unit)
}
