//! The instruction dispatch loop.
//!
//! Each instruction is decoded at `pc` and handed to `Interp::step`,
//! which inspects its operands without popping them and returns a
//! `Step`: where to go next, how many operands to discard and what to
//! leave in their place. `Interp::epilogue` then applies that uniformly.
//! Because operands stay on the stack until the epilogue, an instruction
//! that fails leaves exactly its operand count for the unwind controller
//! to discard.

use std::cmp::Ordering;

use quill_common::{
    list, CompiledUnit, DecodeError, ForeachInfo, Instruction, Number, Opcode, Value,
};
use tracing::trace;

use crate::error::{Code, ErrorKind, Exception};
use crate::machine::Interp;
use crate::numeric;
use crate::vars::{split_name, Access, WriteMode};

/// Per-invocation state of one compiled unit.
pub(crate) struct Frame<'u> {
    pub(crate) unit: &'u CompiledUnit,
    /// Evaluation-stack height at entry.
    pub(crate) base: usize,
    /// Variable frame the local slots belong to.
    level: usize,
    /// Variable index for each local slot.
    slots: Vec<usize>,
    /// Stack heights saved by `BEGIN_CATCH4`, innermost last.
    pub(crate) catch_stack: Vec<usize>,
    /// Completion code of the last caught exception.
    pub(crate) last_code: i32,
}

impl Frame<'_> {
    fn malformed(&self, at: usize, table: &'static str, index: usize) -> Exception {
        ErrorKind::Malformed(DecodeError::IndexOutOfRange { at, table, index }).into()
    }

    fn literal(&self, at: usize, index: usize) -> Result<Value, Exception> {
        self.unit
            .literals
            .get(index)
            .cloned()
            .ok_or_else(|| self.malformed(at, "literals", index))
    }

    fn slot(&self, at: usize, index: usize) -> Result<usize, Exception> {
        self.slots
            .get(index)
            .copied()
            .ok_or_else(|| self.malformed(at, "locals", index))
    }

    fn foreach_info(&self, at: usize, index: usize) -> Result<&ForeachInfo, Exception> {
        self.unit
            .foreach_infos
            .get(index)
            .ok_or_else(|| self.malformed(at, "foreach", index))
    }
}

pub(crate) enum Next {
    Advance,
    /// Relative to the current instruction.
    Jump(i64),
    Done,
}

/// What the epilogue leaves on the stack after discarding operands.
pub(crate) enum Emit {
    Nothing,
    Push(Value),
    /// Overwrite the deepest operand with a number, in place when that
    /// value is not shared.
    Replace(Number),
}

pub(crate) struct Step {
    next: Next,
    cleanup: usize,
    emit: Emit,
}

impl Step {
    fn push(cleanup: usize, value: Value) -> Self {
        Self {
            next: Next::Advance,
            cleanup,
            emit: Emit::Push(value),
        }
    }

    fn replace(cleanup: usize, n: Number) -> Self {
        Self {
            next: Next::Advance,
            cleanup,
            emit: Emit::Replace(n),
        }
    }

    fn discard(cleanup: usize) -> Self {
        Self {
            next: Next::Advance,
            cleanup,
            emit: Emit::Nothing,
        }
    }

    fn jump(offset: i64, cleanup: usize) -> Self {
        Self {
            next: Next::Jump(offset),
            cleanup,
            emit: Emit::Nothing,
        }
    }
}

/// Where dispatch continues after an exception was processed.
pub(crate) enum Resume {
    At(usize),
    Exit(Exception),
}

fn integer_operand(value: &Value) -> Result<i64, Exception> {
    value
        .number()
        .ok()
        .and_then(|n| n.as_i64())
        .ok_or_else(|| ErrorKind::ExpectedInteger(value.as_str().to_string()).into())
}

fn index_into<T: Clone>(items: &[T], spec: &Value) -> Result<Option<T>, Exception> {
    let idx = list::resolve_index(spec.as_str(), items.len()).map_err(ErrorKind::from)?;
    Ok(usize::try_from(idx).ok().and_then(|i| items.get(i).cloned()))
}

impl Interp {
    /// Execute a compiled unit in the current variable frame.
    ///
    /// Returns the value left by `DONE`, or the exception that abandoned
    /// the frame. Completion codes are passed through unchanged; see
    /// [`Interp::eval_unit`] for top-level handling.
    pub fn execute(&mut self, unit: &CompiledUnit) -> Result<Value, Exception> {
        self.enter_nested()?;
        let level = self.current_level();
        let slots = unit
            .locals
            .iter()
            .map(|name| self.frames[level].resolve(name))
            .collect();
        let mark = self.stack.enter(unit.max_stack_depth as usize);
        let mut frame = Frame {
            unit,
            base: mark.base(),
            level,
            slots,
            catch_stack: Vec::new(),
            last_code: 0,
        };
        let outcome = self.run_frame(&mut frame);
        self.stack.leave(mark);
        self.leave_nested();
        outcome
    }

    fn run_frame(&mut self, frame: &mut Frame<'_>) -> Result<Value, Exception> {
        let unit = frame.unit;
        let code = &unit.code;
        let mut pc = 0usize;
        loop {
            let instr = match Instruction::decode_at(code, pc) {
                Ok(instr) => instr,
                Err(e) => return Err(self.abandon_frame(frame, pc, ErrorKind::Malformed(e).into())),
            };
            trace!(pc, op = instr.opcode.mnemonic(), depth = self.stack.depth(), "dispatch");

            let outcome = self.step(frame, pc, &instr).and_then(|step| {
                let target = match step.next {
                    Next::Done => return Ok(None),
                    Next::Advance => pc + instr.encoded_len(),
                    Next::Jump(offset) => {
                        let target = pc as i64 + offset;
                        if target < 0 || target as usize >= code.len() {
                            return Err(ErrorKind::Malformed(DecodeError::JumpOutOfBounds { at: pc, target }).into());
                        }
                        target as usize
                    }
                };
                self.epilogue(step);
                Ok(Some(target))
            });

            match outcome {
                Ok(Some(next)) => pc = next,
                Ok(None) => return Ok(self.finish_frame()),
                Err(e) if e.is_malformed() => return Err(self.abandon_frame(frame, pc, e)),
                Err(e) => match self.process_exception(frame, pc, &instr, e) {
                    Resume::At(target) => pc = target,
                    Resume::Exit(e) => return Err(e),
                },
            }
        }
    }

    /// Shared instruction epilogue.
    fn epilogue(&mut self, step: Step) {
        match step.emit {
            Emit::Nothing => self.stack.discard(step.cleanup),
            Emit::Push(value) => {
                self.stack.discard(step.cleanup);
                self.stack.push(value);
            }
            Emit::Replace(n) => {
                self.stack.discard(step.cleanup - 1);
                self.stack.top_mut().set_number(n);
            }
        }
    }

    fn finish_frame(&mut self) -> Value {
        let depth = self.stack.depth();
        if depth != 1 {
            panic!("stack consistency violation: DONE with {depth} values above the frame base");
        }
        self.stack.pop()
    }

    fn read_slot(&mut self, frame: &Frame<'_>, at: usize, slot: usize, index: Option<&str>) -> Result<Value, Exception> {
        let var = frame.slot(at, slot)?;
        self.access(frame.level, var, index, Access::Read)
    }

    fn write_slot(
        &mut self,
        frame: &Frame<'_>,
        at: usize,
        slot: usize,
        index: Option<&str>,
        access: Access,
    ) -> Result<Value, Exception> {
        let var = frame.slot(at, slot)?;
        self.access(frame.level, var, index, access)
    }

    fn peek_str(&self, n: usize) -> String {
        self.stack.peek_at(n).as_str().to_string()
    }

    fn step(&mut self, frame: &mut Frame<'_>, pc: usize, instr: &Instruction) -> Result<Step, Exception> {
        use Opcode::*;

        let op0 = instr.index(0);
        let step = match instr.opcode {
            Done => Step {
                next: Next::Done,
                cleanup: 0,
                emit: Emit::Nothing,
            },
            Push1 | Push4 => Step::push(0, frame.literal(pc, op0)?),
            Pop => Step::discard(1),
            Dup => Step::push(0, self.stack.peek().clone()),
            Over => Step::push(0, self.stack.peek_at(op0).clone()),
            Concat1 => {
                let joined: String = self.stack.top_n(op0).iter().map(Value::as_str).collect();
                Step::push(op0, Value::from(joined))
            }
            InvokeStk1 | InvokeStk4 => {
                let argv = self.stack.top_n(op0).to_vec();
                Step::push(op0, self.invoke(&argv, None)?)
            }

            LoadScalar1 | LoadScalar4 => Step::push(0, self.read_slot(frame, pc, op0, None)?),
            LoadScalarStk => {
                let name = self.peek_str(0);
                Step::push(1, self.access_parts(&name, None, Access::Read)?)
            }
            LoadArray1 | LoadArray4 => {
                let index = self.peek_str(0);
                Step::push(1, self.read_slot(frame, pc, op0, Some(&index))?)
            }
            LoadArrayStk => {
                let (name, index) = (self.peek_str(1), self.peek_str(0));
                Step::push(2, self.access_parts(&name, Some(&index), Access::Read)?)
            }
            LoadStk => {
                let full = self.peek_str(0);
                let (name, index) = split_name(&full);
                Step::push(1, self.access_parts(name, index, Access::Read)?)
            }

            StoreScalar1 | StoreScalar4 => self.store_slot(frame, pc, op0, WriteMode::Set)?,
            AppendScalar1 | AppendScalar4 => self.store_slot(frame, pc, op0, WriteMode::Append)?,
            LappendScalar1 | LappendScalar4 => self.store_slot(frame, pc, op0, WriteMode::ListAppend)?,
            StoreArray1 | StoreArray4 => self.store_element(frame, pc, op0, WriteMode::Set)?,
            AppendArray1 => self.store_element(frame, pc, op0, WriteMode::Append)?,
            LappendArray1 => self.store_element(frame, pc, op0, WriteMode::ListAppend)?,
            StoreScalarStk => {
                let (name, value) = (self.peek_str(1), self.stack.peek().clone());
                Step::push(2, self.access_parts(&name, None, Access::Write(value, WriteMode::Set))?)
            }
            StoreArrayStk => {
                let (name, index) = (self.peek_str(2), self.peek_str(1));
                let value = self.stack.peek().clone();
                Step::push(
                    3,
                    self.access_parts(&name, Some(&index), Access::Write(value, WriteMode::Set))?,
                )
            }
            StoreStk => self.store_named(WriteMode::Set)?,
            AppendStk => self.store_named(WriteMode::Append)?,
            LappendStk => self.store_named(WriteMode::ListAppend)?,

            IncrScalar1 => {
                let amount = integer_operand(self.stack.peek())?;
                Step::push(1, self.write_slot(frame, pc, op0, None, Access::Incr(amount))?)
            }
            IncrScalar1Imm => {
                let amount = instr.operand(1);
                Step::push(0, self.write_slot(frame, pc, op0, None, Access::Incr(amount))?)
            }
            IncrScalarStk => {
                let amount = integer_operand(self.stack.peek())?;
                let name = self.peek_str(1);
                Step::push(2, self.access_parts(&name, None, Access::Incr(amount))?)
            }
            IncrScalarStkImm => {
                let name = self.peek_str(0);
                Step::push(1, self.access_parts(&name, None, Access::Incr(instr.operand(0)))?)
            }
            IncrArray1 => {
                let amount = integer_operand(self.stack.peek())?;
                let index = self.peek_str(1);
                Step::push(2, self.write_slot(frame, pc, op0, Some(&index), Access::Incr(amount))?)
            }
            IncrArray1Imm => {
                let index = self.peek_str(0);
                let amount = instr.operand(1);
                Step::push(1, self.write_slot(frame, pc, op0, Some(&index), Access::Incr(amount))?)
            }
            IncrArrayStk => {
                let amount = integer_operand(self.stack.peek())?;
                let (name, index) = (self.peek_str(2), self.peek_str(1));
                Step::push(3, self.access_parts(&name, Some(&index), Access::Incr(amount))?)
            }
            IncrArrayStkImm => {
                let (name, index) = (self.peek_str(1), self.peek_str(0));
                Step::push(2, self.access_parts(&name, Some(&index), Access::Incr(instr.operand(0)))?)
            }

            Jump1 | Jump4 => Step::jump(instr.operand(0), 0),
            JumpTrue1 | JumpTrue4 | JumpFalse1 | JumpFalse4 => {
                let cond = self.stack.peek();
                let truth = cond
                    .boolean()
                    .ok_or_else(|| ErrorKind::ExpectedBoolean(cond.as_str().to_string()))?;
                let on_true = matches!(instr.opcode, JumpTrue1 | JumpTrue4);
                if truth == on_true {
                    Step::jump(instr.operand(0), 1)
                } else {
                    Step::discard(1)
                }
            }

            Lor | Land => {
                let sym = numeric::symbol(instr.opcode);
                let a = numeric::truth(self.stack.peek_at(1), sym)?;
                let b = numeric::truth(self.stack.peek_at(0), sym)?;
                let r = if instr.opcode == Lor { a || b } else { a && b };
                Step::replace(2, Number::Int(r as i32))
            }
            Eq | Neq | Lt | Gt | Le | Ge => {
                let ordering = numeric::compare(self.stack.peek_at(1), self.stack.peek_at(0));
                Step::replace(2, Number::Int(numeric::relation(instr.opcode, ordering) as i32))
            }
            Bitor | Bitxor | Bitand | Lshift | Rshift | Add | Sub | Mult | Div | Mod => {
                let sym = numeric::symbol(instr.opcode);
                let a = numeric::operand(self.stack.peek_at(1), sym)?;
                let b = numeric::operand(self.stack.peek_at(0), sym)?;
                Step::replace(2, numeric::binary(instr.opcode, a, b)?)
            }
            Uplus | Uminus | Bitnot => {
                let a = numeric::operand(self.stack.peek(), numeric::symbol(instr.opcode))?;
                Step::replace(1, numeric::unary(instr.opcode, a)?)
            }
            Not => {
                let b = numeric::truth(self.stack.peek(), "!")?;
                Step::replace(1, Number::Int(!b as i32))
            }
            TryCvtToNumeric => {
                let value = self.stack.peek();
                match value.number() {
                    _ if value.is_numeric_rep() => Step::discard(0),
                    Ok(n) => Step::replace(1, n),
                    Err(quill_common::NumberError::TooLarge) => return Err(ErrorKind::IntegerTooLarge.into()),
                    Err(quill_common::NumberError::FloatTooLarge) => return Err(ErrorKind::FloatOverflow.into()),
                    Err(_) => Step::discard(0),
                }
            }

            CallBuiltinFunc1 => {
                let arity = instr.pops();
                let args = self.stack.top_n(arity).to_vec();
                let n = self.call_builtin(op0, &args)?;
                Step::push(arity, Value::from(n))
            }
            CallFunc1 => {
                let argv = self.stack.top_n(op0).to_vec();
                let Some((name, args)) = argv.split_first() else {
                    return Err(ErrorKind::TooFewMathArgs.into());
                };
                let n = self.call_math(name.as_str(), args)?;
                Step::push(op0, Value::from(n))
            }

            Break => return Err(Exception::control(Code::Break)),
            Continue => return Err(Exception::control(Code::Continue)),
            ForeachStart4 => {
                let counter = frame.foreach_info(pc, op0)?.loop_counter_slot as usize;
                self.write_slot(frame, pc, counter, None, Access::Write(Value::from(-1), WriteMode::Set))?;
                Step::discard(0)
            }
            ForeachStep4 => {
                let more = self.foreach_step(frame, pc, op0)?;
                Step::push(0, Value::from(more))
            }

            BeginCatch4 => {
                if op0 >= frame.unit.ranges.len() {
                    return Err(frame.malformed(pc, "ranges", op0));
                }
                frame.catch_stack.push(self.stack.height());
                Step::discard(0)
            }
            EndCatch => {
                frame.catch_stack.pop();
                Step::discard(0)
            }
            PushResult => Step::push(0, self.result.clone()),
            PushReturnCode => Step::push(0, Value::from(frame.last_code)),

            StrEq | StrNeq => {
                let equal = self.stack.peek_at(1).as_str() == self.stack.peek().as_str();
                Step::replace(2, Number::Int((equal == (instr.opcode == StrEq)) as i32))
            }
            StrCmp => {
                let r = match self.stack.peek_at(1).as_str().cmp(self.stack.peek().as_str()) {
                    Ordering::Less => -1,
                    Ordering::Equal => 0,
                    Ordering::Greater => 1,
                };
                Step::replace(2, Number::Int(r))
            }
            StrLen => {
                let len = self.stack.peek().as_str().chars().count();
                Step::replace(1, Number::from_i64(len as i64))
            }
            StrIndex => {
                let chars: Vec<char> = self.stack.peek_at(1).as_str().chars().collect();
                let found = index_into(&chars, self.stack.peek())?;
                Step::push(2, found.map_or_else(Value::empty, |c| Value::from(c.to_string())))
            }

            List => {
                let items = self.stack.top_n(op0).to_vec();
                Step::push(op0, Value::from_list(items))
            }
            ListLength => {
                let len = self.stack.peek().as_list().map_err(ErrorKind::from)?.len();
                Step::replace(1, Number::from_i64(len as i64))
            }
            ListIndex => {
                let items = self.stack.peek_at(1).as_list().map_err(ErrorKind::from)?;
                let found = index_into(items, self.stack.peek())?;
                Step::push(2, found.unwrap_or_else(Value::empty))
            }

            Return => return Err(Exception::with_code(Code::Return, self.stack.peek().clone())),
        };
        Ok(step)
    }

    fn store_slot(&mut self, frame: &Frame<'_>, pc: usize, slot: usize, mode: WriteMode) -> Result<Step, Exception> {
        let value = self.stack.peek().clone();
        Ok(Step::push(1, self.write_slot(frame, pc, slot, None, Access::Write(value, mode))?))
    }

    fn store_element(&mut self, frame: &Frame<'_>, pc: usize, slot: usize, mode: WriteMode) -> Result<Step, Exception> {
        let index = self.peek_str(1);
        let value = self.stack.peek().clone();
        let stored = self.write_slot(frame, pc, slot, Some(&index), Access::Write(value, mode))?;
        Ok(Step::push(2, stored))
    }

    fn store_named(&mut self, mode: WriteMode) -> Result<Step, Exception> {
        let full = self.peek_str(1);
        let value = self.stack.peek().clone();
        let (name, index) = split_name(&full);
        Ok(Step::push(2, self.access_parts(name, index, Access::Write(value, mode))?))
    }

    /// Advance a foreach loop one iteration; true when the body should run.
    fn foreach_step(&mut self, frame: &Frame<'_>, pc: usize, aux: usize) -> Result<bool, Exception> {
        let info = frame.foreach_info(pc, aux)?.clone();
        let counter_slot = info.loop_counter_slot as usize;
        let iteration = integer_operand(&self.read_slot(frame, pc, counter_slot, None)?)? + 1;
        self.write_slot(frame, pc, counter_slot, None, Access::Write(Value::from(iteration), WriteMode::Set))?;
        let iteration = iteration.max(0) as usize;

        let mut lists = Vec::with_capacity(info.lists.len());
        let mut more = false;
        for entry in &info.lists {
            let value = self.read_slot(frame, pc, entry.temp_slot as usize, None)?;
            let items = value.as_list().map_err(ErrorKind::from)?.to_vec();
            if items.len() > iteration * entry.vars.len() {
                more = true;
            }
            lists.push(items);
        }
        if !more {
            return Ok(false);
        }

        for (entry, items) in info.lists.iter().zip(&lists) {
            for (j, var) in entry.vars.iter().enumerate() {
                let element = items
                    .get(iteration * entry.vars.len() + j)
                    .cloned()
                    .unwrap_or_else(Value::empty);
                self.write_slot(frame, pc, *var as usize, None, Access::Write(element, WriteMode::Set))?;
            }
        }
        Ok(true)
    }
}
