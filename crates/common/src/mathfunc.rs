//! Built-in math function descriptors.
//!
//! The table order is part of the encoding: `CALL_BUILTIN_FUNC1` names a
//! function by its index here. The VM supplies the implementations.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Argument kind expected by a math function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Native 32-bit integer.
    Int,
    /// 64-bit integer.
    Wide,
    Double,
    /// Any numeric value, passed through unconverted.
    Either,
}

/// Name and argument kinds of a built-in math function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinFunc {
    pub name: &'static str,
    pub args: &'static [ArgKind],
}

impl BuiltinFunc {
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

const D: ArgKind = ArgKind::Double;
const E: ArgKind = ArgKind::Either;

/// All built-in functions, in index order.
pub const BUILTIN_FUNCS: &[BuiltinFunc] = &[
    BuiltinFunc { name: "acos", args: &[D] },
    BuiltinFunc { name: "asin", args: &[D] },
    BuiltinFunc { name: "atan", args: &[D] },
    BuiltinFunc { name: "atan2", args: &[D, D] },
    BuiltinFunc { name: "ceil", args: &[D] },
    BuiltinFunc { name: "cos", args: &[D] },
    BuiltinFunc { name: "cosh", args: &[D] },
    BuiltinFunc { name: "exp", args: &[D] },
    BuiltinFunc { name: "floor", args: &[D] },
    BuiltinFunc { name: "fmod", args: &[D, D] },
    BuiltinFunc { name: "hypot", args: &[D, D] },
    BuiltinFunc { name: "log", args: &[D] },
    BuiltinFunc { name: "log10", args: &[D] },
    BuiltinFunc { name: "pow", args: &[D, D] },
    BuiltinFunc { name: "sin", args: &[D] },
    BuiltinFunc { name: "sinh", args: &[D] },
    BuiltinFunc { name: "sqrt", args: &[D] },
    BuiltinFunc { name: "tan", args: &[D] },
    BuiltinFunc { name: "tanh", args: &[D] },
    BuiltinFunc { name: "abs", args: &[E] },
    BuiltinFunc { name: "double", args: &[E] },
    BuiltinFunc { name: "int", args: &[E] },
    BuiltinFunc { name: "round", args: &[E] },
    BuiltinFunc { name: "rand", args: &[] },
    BuiltinFunc { name: "srand", args: &[ArgKind::Int] },
    BuiltinFunc { name: "wide", args: &[E] },
];

/// Find a built-in function's table index by name.
pub fn builtin_index(name: &str) -> Option<usize> {
    static INDEX: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    INDEX
        .get_or_init(|| {
            BUILTIN_FUNCS
                .iter()
                .enumerate()
                .map(|(i, f)| (f.name, i))
                .collect()
        })
        .get(name)
        .copied()
}

/// Descriptor for a table index, if assigned.
pub fn builtin(index: usize) -> Option<&'static BuiltinFunc> {
    BUILTIN_FUNCS.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        assert_eq!(builtin_index("acos"), Some(0));
        assert_eq!(builtin_index("wide"), Some(BUILTIN_FUNCS.len() - 1));
        assert_eq!(builtin_index("nope"), None);
    }

    #[test]
    fn arities() {
        let idx = builtin_index("atan2").unwrap();
        assert_eq!(builtin(idx).unwrap().arity(), 2);
        assert_eq!(builtin(builtin_index("rand").unwrap()).unwrap().arity(), 0);
        assert!(builtin(BUILTIN_FUNCS.len()).is_none());
    }
}
