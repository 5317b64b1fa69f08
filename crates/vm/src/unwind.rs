//! Exception processing for a running frame.
//!
//! When an instruction completes abnormally the innermost exception range
//! covering it decides what happens next. A loop range resolves `break`
//! and `continue` to its targets; a catch range intercepts every code and
//! resumes at its catch target with the stack cut back to the height
//! saved by `BEGIN_CATCH4`. With no applicable range the frame is
//! abandoned and the exception propagates to the caller.

use quill_common::{ExceptionRange, Instruction, RangeKind};
use tracing::debug;

use crate::error::{Code, Exception, SourceLocation};
use crate::execute::{Frame, Resume};
use crate::machine::Interp;

/// Index of the innermost range containing `pc`. With `catch_only`, loop
/// ranges are skipped.
pub(crate) fn find_range(ranges: &[ExceptionRange], pc: usize, catch_only: bool) -> Option<usize> {
    ranges
        .iter()
        .rposition(|r| r.contains(pc) && (!catch_only || r.kind == RangeKind::Catch))
}

impl Interp {
    /// Route an exception raised by the instruction at `pc`.
    pub(crate) fn process_exception(
        &mut self,
        frame: &mut Frame<'_>,
        pc: usize,
        instr: &Instruction,
        exc: Exception,
    ) -> Resume {
        if !matches!(exc.code, Code::Break | Code::Continue) {
            return self.check_for_catch(frame, pc, exc);
        }

        let unit = frame.unit;
        let ranges = &unit.ranges;
        let Some(idx) = find_range(ranges, pc, false) else {
            return self.check_for_catch(frame, pc, exc);
        };
        let range = &ranges[idx];
        if range.kind == RangeKind::Catch {
            return self.process_catch(frame, pc, idx, exc);
        }

        let target = match exc.code {
            Code::Break => range.break_target,
            _ => range.continue_target,
        };
        match target {
            Some(target) => {
                self.stack.discard(instr.pops());
                debug!(pc, code = %exc.code, target, "loop exception resolved");
                Resume::At(target as usize)
            }
            None => self.check_for_catch(frame, pc, exc),
        }
    }

    fn check_for_catch(&mut self, frame: &mut Frame<'_>, pc: usize, exc: Exception) -> Resume {
        if frame.catch_stack.is_empty() {
            return Resume::Exit(self.abandon_frame(frame, pc, exc));
        }
        match find_range(&frame.unit.ranges, pc, true) {
            Some(idx) => self.process_catch(frame, pc, idx, exc),
            None => Resume::Exit(self.abandon_frame(frame, pc, exc)),
        }
    }

    fn process_catch(&mut self, frame: &mut Frame<'_>, pc: usize, idx: usize, exc: Exception) -> Resume {
        let unit = frame.unit;
        let range = &unit.ranges[idx];
        let (Some(target), Some(&height)) = (range.catch_target, frame.catch_stack.last()) else {
            return Resume::Exit(self.abandon_frame(frame, pc, exc));
        };

        self.stack.truncate_to(height);
        frame.last_code = exc.code.as_int();
        self.result = exc.value.clone();
        if exc.code == Code::Error {
            self.record_error(&exc);
        }
        debug!(pc, code = %exc.code, target, height, "exception caught");
        Resume::At(target as usize)
    }

    /// Cut the stack back to the frame base and hand the exception to the
    /// caller. An error not yet attributed is attributed to the command
    /// containing `pc`.
    pub(crate) fn abandon_frame(&mut self, frame: &Frame<'_>, pc: usize, mut exc: Exception) -> Exception {
        self.stack.truncate_to(frame.base);
        if exc.code == Code::Error && !exc.is_attributed() {
            let unit = frame.unit;
            let loc = unit.command_at(pc);
            let location = SourceLocation {
                pc,
                span: loc.map(|l| (l.src_offset as usize, l.src_len as usize)),
            };
            exc.attribute(Some(location), loc.and_then(|l| unit.snippet(l)));
        }
        debug!(pc, code = %exc.code, "frame abandoned");
        exc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(kind: RangeKind, start: u32, len: u32) -> ExceptionRange {
        ExceptionRange {
            kind,
            nesting_level: 0,
            code_start: start,
            code_len: len,
            break_target: None,
            continue_target: None,
            catch_target: None,
        }
    }

    #[test]
    fn innermost_range_wins() {
        let ranges = [
            range(RangeKind::Catch, 0, 20),
            range(RangeKind::Loop, 4, 10),
            range(RangeKind::Catch, 30, 5),
        ];
        assert_eq!(find_range(&ranges, 6, false), Some(1));
        assert_eq!(find_range(&ranges, 6, true), Some(0));
        assert_eq!(find_range(&ranges, 2, false), Some(0));
        assert_eq!(find_range(&ranges, 25, false), None);
        assert_eq!(find_range(&ranges, 34, true), Some(2));
        assert_eq!(find_range(&ranges, 35, true), None);
    }

    #[test]
    fn no_ranges() {
        assert_eq!(find_range(&[], 0, false), None);
    }
}
