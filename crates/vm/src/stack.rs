//! The evaluation stack.
//!
//! One stack is shared by every frame of an interpreter. A frame only
//! remembers its base height (a [`FrameMark`]); nothing about the top of
//! the stack is cached across calls that may re-enter the dispatch loop.
//! Popping below the current frame's base is an interpreter bug and
//! panics with `stack consistency violation`.

use quill_common::Value;
use tracing::{debug, warn};

/// Saved stack bookkeeping, restored by [`EvalStack::leave`].
#[derive(Debug)]
#[must_use]
pub struct FrameMark {
    base: usize,
    saved_floor: usize,
    saved_limit: usize,
}

impl FrameMark {
    pub fn base(&self) -> usize {
        self.base
    }
}

#[derive(Debug)]
pub struct EvalStack {
    slots: Vec<Value>,
    /// Lowest height the current frame may pop to.
    floor: usize,
    /// Height the current frame declared it would not exceed.
    limit: usize,
    overrun_reported: bool,
}

impl EvalStack {
    pub fn with_capacity(slots: usize) -> Self {
        Self {
            slots: Vec::with_capacity(slots),
            floor: 0,
            limit: usize::MAX,
            overrun_reported: false,
        }
    }

    /// Begin a frame that declares it needs at most `max_depth` slots.
    /// Storage is grown once here rather than per push.
    pub fn enter(&mut self, max_depth: usize) -> FrameMark {
        self.ensure_room(max_depth);
        let mark = FrameMark {
            base: self.slots.len(),
            saved_floor: self.floor,
            saved_limit: self.limit,
        };
        self.floor = self.slots.len();
        self.limit = self.slots.len() + max_depth;
        self.overrun_reported = false;
        mark
    }

    /// End a frame, discarding anything it left above its base.
    pub fn leave(&mut self, mark: FrameMark) {
        if self.slots.len() < mark.base {
            violation(format_args!(
                "frame base {} is above the stack height {}",
                mark.base,
                self.slots.len()
            ));
        }
        self.slots.truncate(mark.base);
        self.floor = mark.saved_floor;
        self.limit = mark.saved_limit;
    }

    fn ensure_room(&mut self, needed: usize) {
        let len = self.slots.len();
        let capacity = self.slots.capacity();
        if capacity - len >= needed {
            return;
        }
        let mut grown = capacity.max(1);
        while grown - len < needed {
            grown *= 2;
        }
        self.slots.reserve_exact(grown - len);
        debug!(from = capacity, to = self.slots.capacity(), "evaluation stack grown");
    }

    pub fn push(&mut self, value: Value) {
        if self.slots.len() >= self.limit && !self.overrun_reported {
            self.overrun_reported = true;
            warn!(
                limit = self.limit - self.floor,
                "push exceeds the unit's declared maximum stack depth"
            );
        }
        self.slots.push(value);
    }

    /// Remove the top value, transferring its handle to the caller.
    pub fn pop(&mut self) -> Value {
        if self.slots.len() <= self.floor {
            violation(format_args!("pop at frame base {}", self.floor));
        }
        match self.slots.pop() {
            Some(value) => value,
            None => violation(format_args!("pop on an empty stack")),
        }
    }

    pub fn peek(&self) -> &Value {
        self.peek_at(0)
    }

    /// The value `n` slots below the top.
    pub fn peek_at(&self, n: usize) -> &Value {
        if n >= self.depth() {
            violation(format_args!("peek {n} below the top with depth {}", self.depth()));
        }
        &self.slots[self.slots.len() - 1 - n]
    }

    pub fn top_mut(&mut self) -> &mut Value {
        if self.depth() == 0 {
            violation(format_args!("no value above frame base {}", self.floor));
        }
        let top = self.slots.len() - 1;
        &mut self.slots[top]
    }

    /// The top `n` values, bottom first.
    pub fn top_n(&self, n: usize) -> &[Value] {
        if n > self.depth() {
            violation(format_args!("{n} operands requested with depth {}", self.depth()));
        }
        &self.slots[self.slots.len() - n..]
    }

    /// Absolute height.
    pub fn height(&self) -> usize {
        self.slots.len()
    }

    /// Height above the current frame's base.
    pub fn depth(&self) -> usize {
        self.slots.len() - self.floor
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Drop the top `n` values.
    pub fn discard(&mut self, n: usize) {
        if n > self.depth() {
            violation(format_args!("discard {n} with depth {}", self.depth()));
        }
        self.slots.truncate(self.slots.len() - n);
    }

    /// Drop values until the absolute height is `height`.
    pub fn truncate_to(&mut self, height: usize) {
        if height < self.floor || height > self.slots.len() {
            violation(format_args!(
                "unwind to height {height} outside [{}, {}]",
                self.floor,
                self.slots.len()
            ));
        }
        self.slots.truncate(height);
    }
}

fn violation(detail: std::fmt::Arguments<'_>) -> ! {
    panic!("stack consistency violation: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_within_a_frame() {
        let mut stack = EvalStack::with_capacity(4);
        let mark = stack.enter(2);
        stack.push(Value::from(1));
        stack.push(Value::from(2));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.peek_at(1).as_str(), "1");
        assert_eq!(stack.pop().as_str(), "2");
        stack.leave(mark);
        assert_eq!(stack.height(), 0);
    }

    #[test]
    fn enter_grows_before_the_frame_runs() {
        let mut stack = EvalStack::with_capacity(2);
        stack.push(Value::from(0));
        let mark = stack.enter(40);
        assert!(stack.capacity() - stack.height() >= 40);
        assert_eq!(mark.base(), 1);
        stack.leave(mark);
        assert_eq!(stack.pop().as_str(), "0");
    }

    #[test]
    fn nested_frames_restore_the_floor() {
        let mut stack = EvalStack::with_capacity(8);
        let outer = stack.enter(3);
        stack.push(Value::from("a"));
        let inner = stack.enter(1);
        assert_eq!(stack.depth(), 0);
        stack.push(Value::from("b"));
        stack.leave(inner);
        assert_eq!(stack.depth(), 1);
        stack.leave(outer);
    }

    #[test]
    fn truncate_and_discard() {
        let mut stack = EvalStack::with_capacity(8);
        let mark = stack.enter(5);
        for i in 0..5 {
            stack.push(Value::from(i));
        }
        stack.discard(2);
        assert_eq!(stack.peek().as_str(), "2");
        stack.truncate_to(1);
        assert_eq!(stack.top_n(1)[0].as_str(), "0");
        stack.leave(mark);
    }

    #[test]
    #[should_panic(expected = "stack consistency violation")]
    fn pop_below_frame_base_panics() {
        let mut stack = EvalStack::with_capacity(4);
        stack.push(Value::from(1));
        let _mark = stack.enter(1);
        stack.pop();
    }

    #[test]
    #[should_panic(expected = "stack consistency violation")]
    fn unwind_below_frame_base_panics() {
        let mut stack = EvalStack::with_capacity(4);
        stack.push(Value::from(1));
        let _mark = stack.enter(1);
        stack.truncate_to(0);
    }
}
