//! Interpreter configuration.

/// Default number of evaluation-stack slots allocated up front.
pub const DEFAULT_STACK_CAPACITY: usize = 256;

/// Default limit on nested `execute`/`invoke` levels.
///
/// A procedure call costs two levels. The limit has to trip before the
/// native stack of an 8 MiB main thread runs out in an unoptimized build.
pub const DEFAULT_MAX_NESTING: usize = 200;

/// Tunables for an [`Interp`](crate::Interp).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Slots reserved for the evaluation stack at construction.
    pub initial_stack_capacity: usize,
    /// Deepest allowed nesting of evaluations before
    /// `too many nested evaluations (infinite loop?)` is raised.
    pub max_nesting_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_stack_capacity: DEFAULT_STACK_CAPACITY,
            max_nesting_depth: DEFAULT_MAX_NESTING,
        }
    }
}

impl Config {
    pub fn with_stack_capacity(mut self, slots: usize) -> Self {
        self.initial_stack_capacity = slots;
        self
    }

    pub fn with_max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}
