//! Exception-range and command-location table checks.
//!
//! Ranges must cover whole instructions, name the targets their kind
//! needs, and appear in nesting order: a later range either lies outside
//! an earlier one or inside it, never around it or straddling its edge.

use quill_common::{CompiledUnit, ExceptionRange, RangeKind};

use crate::error::VerifyError;
use crate::structural::UnitContext;

/// Run the range checks.
pub fn check_ranges(unit: &CompiledUnit, ctx: &UnitContext) -> Vec<VerifyError> {
    let mut errors = Vec::new();

    for (i, range) in unit.ranges.iter().enumerate() {
        let end = range.code_end() as usize;
        let end_ok = end == ctx.code_len || ctx.is_boundary(end as i64);
        if !ctx.is_boundary(range.code_start as i64) || !end_ok || range.code_len == 0 {
            errors.push(VerifyError::RangeOutOfBounds { range: i });
        }

        check_targets(i, range, ctx, &mut errors);

        let mut level = 0;
        for (j, earlier) in unit.ranges[..i].iter().enumerate() {
            if earlier.encloses(range) {
                level += 1;
            } else if !disjoint(earlier, range) {
                errors.push(VerifyError::RangeOrder { range: i, other: j });
            }
        }
        if range.nesting_level != level {
            errors.push(VerifyError::NestingLevel {
                range: i,
                expected: level,
                found: range.nesting_level,
            });
        }
    }

    let source_len = unit.source.as_ref().map(String::len);
    for (index, loc) in unit.cmd_locations.iter().enumerate() {
        let code_end = loc.code_offset as usize + loc.code_len as usize;
        let src_end = loc.src_offset as usize + loc.src_len as usize;
        let code_ok = code_end <= ctx.code_len;
        let src_ok = source_len.map_or(true, |len| src_end <= len);
        if !code_ok || !src_ok {
            errors.push(VerifyError::CmdLocationOutOfBounds { index });
        }
    }

    errors
}

fn disjoint(a: &ExceptionRange, b: &ExceptionRange) -> bool {
    a.code_end() <= b.code_start || b.code_end() <= a.code_start
}

fn check_targets(i: usize, range: &ExceptionRange, ctx: &UnitContext, errors: &mut Vec<VerifyError>) {
    let (kind, required) = match range.kind {
        RangeKind::Loop => ("loop", ("break", range.break_target)),
        RangeKind::Catch => ("catch", ("catch", range.catch_target)),
    };
    if required.1.is_none() {
        errors.push(VerifyError::MissingTarget {
            range: i,
            kind,
            target: required.0,
        });
    }

    let targets = [
        ("break", range.break_target),
        ("continue", range.continue_target),
        ("catch", range.catch_target),
    ];
    for (target, offset) in targets {
        if let Some(offset) = offset {
            if !ctx.is_boundary(offset as i64) {
                errors.push(VerifyError::BadRangeTarget {
                    range: i,
                    target,
                    offset,
                });
            }
        }
    }
}
