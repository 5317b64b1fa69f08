//! Quill verifier: static checks for compiled units.
//!
//! The verifier checks a `CompiledUnit` for consistency BEFORE execution.
//! It collects ALL errors (not just the first) and returns them.
//!
//! # Usage
//!
//! ```
//! use quill_common::{Opcode, UnitBuilder};
//! use quill_verifier::verify;
//!
//! let mut b = UnitBuilder::new();
//! b.push("42").unwrap();
//! b.emit(Opcode::Done, &[]).unwrap();
//! let unit = b.finish().unwrap();
//!
//! assert!(verify(&unit).is_ok());
//! ```
//!
//! # Passes
//!
//! 1. **Structural**: decoding, operand tables, jump targets, terminal instruction
//! 2. **Ranges**: exception-range bounds, targets and nesting order; command locations
//! 3. **Stack**: depth analysis over the control-flow graph

pub mod error;
pub mod ranges;
pub mod stack;
pub mod structural;

pub use error::VerifyError;

use quill_common::CompiledUnit;

/// Verify a compiled unit.
///
/// Returns `Ok(())` if the unit passes all checks, or
/// `Err(Vec<VerifyError>)` with all errors found.
///
/// If the structural pass cannot decode the code or finds a jump off an
/// instruction boundary, the stack pass is skipped.
pub fn verify(unit: &CompiledUnit) -> Result<(), Vec<VerifyError>> {
    let mut all_errors = Vec::new();

    let (ctx, structural_errors) = structural::check_structural(unit);
    all_errors.extend(structural_errors);

    if !ctx.instrs.is_empty() {
        all_errors.extend(ranges::check_ranges(unit, &ctx));
    }
    if !ctx.fatal {
        all_errors.extend(stack::check_stack(unit, &ctx));
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_common::{Opcode, UnitBuilder};

    #[test]
    fn minimal_valid_unit() {
        let mut b = UnitBuilder::new();
        b.push("x").unwrap();
        b.emit(Opcode::Done, &[]).unwrap();
        assert!(verify(&b.finish().unwrap()).is_ok());
    }

    #[test]
    fn empty_unit() {
        let errors = verify(&CompiledUnit::default()).unwrap_err();
        assert_eq!(errors, vec![VerifyError::EmptyCode]);
    }

    #[test]
    fn multiple_errors_collected() {
        let mut b = UnitBuilder::new();
        b.emit(Opcode::Push1, &[9]).unwrap();
        b.emit(Opcode::Add, &[]).unwrap();
        let errors = verify(&b.finish().unwrap()).unwrap_err();
        assert!(errors.len() >= 3, "expected multiple errors, got: {errors:?}");
        assert!(errors.iter().any(|e| matches!(e, VerifyError::LiteralOutOfRange { .. })));
        assert!(errors.iter().any(|e| matches!(e, VerifyError::MissingTerminal { .. })));
        assert!(errors.iter().any(|e| matches!(e, VerifyError::StackUnderflow { .. })));
    }
}
