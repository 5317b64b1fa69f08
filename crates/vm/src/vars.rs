//! Variable storage and the access adapter used by the variable
//! instructions.
//!
//! A defined scalar without observers is read and replaced directly.
//! Everything else (observers attached, undefined variables, array
//! elements, appends and increments) goes through the slow path, which
//! runs the observers and reports failures as `can't read`/`can't set`
//! errors.

use std::collections::HashMap;
use std::rc::Rc;

use quill_common::{Number, Value};

use crate::error::{ErrorKind, Exception};
use crate::machine::Interp;

/// An observer attached to a variable.
///
/// Read observers run before the value is fetched, write observers after
/// it is stored. An observer that touches its own variable does not fire
/// again. Returning `Err` fails the access with the given message.
pub trait VarTrace {
    fn fire(&self, interp: &mut Interp, event: &TraceEvent) -> Result<(), String>;
}

impl<F> VarTrace for F
where
    F: Fn(&mut Interp, &TraceEvent) -> Result<(), String>,
{
    fn fire(&self, interp: &mut Interp, event: &TraceEvent) -> Result<(), String> {
        self(interp, event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub op: TraceOp,
    pub name: String,
    pub index: Option<String>,
}

/// How a write combines with the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Set,
    /// String append.
    Append,
    /// Append as a list element.
    ListAppend,
}

#[derive(Debug, Clone)]
pub(crate) enum Access {
    Read,
    Write(Value, WriteMode),
    Incr(i64),
}

enum VarState {
    Undefined,
    Scalar(Value),
    Array(HashMap<String, Value>),
}

pub(crate) struct Var {
    name: String,
    state: VarState,
    traces: Vec<Rc<dyn VarTrace>>,
    tracing: bool,
}

impl Var {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: VarState::Undefined,
            traces: Vec::new(),
            tracing: false,
        }
    }

    fn read(&self, index: Option<&str>) -> Result<Value, &'static str> {
        match (&self.state, index) {
            (VarState::Undefined, _) => Err("no such variable"),
            (VarState::Scalar(v), None) => Ok(v.clone()),
            (VarState::Scalar(_), Some(_)) => Err("variable isn't array"),
            (VarState::Array(_), None) => Err("variable is array"),
            (VarState::Array(elements), Some(i)) => {
                elements.get(i).cloned().ok_or("no such element in array")
            }
        }
    }

    fn slot_mut(&mut self, index: Option<&str>) -> Option<&mut Value> {
        match (&mut self.state, index) {
            (VarState::Scalar(v), None) => Some(v),
            (VarState::Array(elements), Some(i)) => elements.get_mut(i),
            _ => None,
        }
    }

    fn write(&mut self, index: Option<&str>, value: Value, mode: WriteMode) -> Result<Value, String> {
        let slot = match index {
            None => {
                if let VarState::Undefined = self.state {
                    self.state = VarState::Scalar(Value::empty());
                }
                match &mut self.state {
                    VarState::Scalar(v) => v,
                    _ => return Err("variable is array".to_string()),
                }
            }
            Some(i) => {
                if let VarState::Undefined = self.state {
                    self.state = VarState::Array(HashMap::new());
                }
                match &mut self.state {
                    VarState::Array(elements) => elements.entry(i.to_string()).or_insert_with(Value::empty),
                    _ => return Err("variable isn't array".to_string()),
                }
            }
        };
        match mode {
            WriteMode::Set => *slot = value,
            WriteMode::Append => slot.append_str(value.as_str()),
            WriteMode::ListAppend => slot.push_element(value).map_err(|e| e.to_string())?,
        }
        Ok(slot.clone())
    }
}

/// One level of variables: the global level, or one procedure call.
#[derive(Default)]
pub struct VarFrame {
    vars: Vec<Var>,
    by_name: HashMap<String, usize>,
}

impl VarFrame {
    /// Index of the variable called `name`, creating it undefined.
    pub(crate) fn resolve(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        self.vars.push(Var::new(name));
        self.by_name.insert(name.to_string(), self.vars.len() - 1);
        self.vars.len() - 1
    }
}

/// Split `name(index)` into its parts.
pub(crate) fn split_name(full: &str) -> (&str, Option<&str>) {
    match full.find('(') {
        Some(open) if open > 0 && full.ends_with(')') => (&full[..open], Some(&full[open + 1..full.len() - 1])),
        _ => (full, None),
    }
}

fn display_name(name: &str, index: Option<&str>) -> String {
    match index {
        Some(i) => format!("{name}({i})"),
        None => name.to_string(),
    }
}

fn var_error(action: &'static str, name: &str, reason: impl Into<String>) -> Exception {
    Exception::error(ErrorKind::Variable {
        action,
        name: name.to_string(),
        reason: reason.into(),
    })
}

fn incremented(current: &Value, amount: i64) -> Result<Number, ErrorKind> {
    match current.number() {
        Ok(Number::Int(x)) => Ok(Number::from_i64((x as i64).wrapping_add(amount))),
        Ok(Number::Wide(x)) => Ok(Number::Wide(x.wrapping_add(amount))),
        _ => Err(ErrorKind::ExpectedInteger(current.as_str().to_string())),
    }
}

impl Interp {
    fn var(&self, level: usize, var: usize) -> &Var {
        &self.frames[level].vars[var]
    }

    fn var_mut(&mut self, level: usize, var: usize) -> &mut Var {
        &mut self.frames[level].vars[var]
    }

    /// Perform `access` on variable `var` of frame `level`, optionally
    /// on one of its array elements.
    pub(crate) fn access(
        &mut self,
        level: usize,
        var: usize,
        index: Option<&str>,
        access: Access,
    ) -> Result<Value, Exception> {
        let v = self.var_mut(level, var);
        if index.is_none() && v.traces.is_empty() {
            if let VarState::Scalar(current) = &mut v.state {
                match access {
                    Access::Read => return Ok(current.clone()),
                    Access::Write(value, WriteMode::Set) => {
                        *current = value.clone();
                        return Ok(value);
                    }
                    other => return self.access_slow(level, var, index, other),
                }
            }
        }
        self.access_slow(level, var, index, access)
    }

    fn access_slow(
        &mut self,
        level: usize,
        var: usize,
        index: Option<&str>,
        access: Access,
    ) -> Result<Value, Exception> {
        let display = display_name(&self.var(level, var).name, index);
        let reads = matches!(access, Access::Read | Access::Incr(_));
        let writes = !matches!(access, Access::Read);

        if reads {
            self.fire_traces(level, var, TraceOp::Read, index)
                .map_err(|reason| var_error("read", &display, reason))?;
        }

        let written = match access {
            Access::Read => {
                return self
                    .var(level, var)
                    .read(index)
                    .map_err(|reason| var_error("read", &display, reason));
            }
            Access::Write(value, mode) => self
                .var_mut(level, var)
                .write(index, value, mode)
                .map_err(|reason| var_error("set", &display, reason))?,
            Access::Incr(amount) => {
                let next = {
                    let current = self
                        .var(level, var)
                        .read(index)
                        .map_err(|reason| var_error("read", &display, reason))?;
                    incremented(&current, amount)?
                };
                match self.var_mut(level, var).slot_mut(index) {
                    Some(slot) => {
                        slot.set_number(next);
                        slot.clone()
                    }
                    None => return Err(var_error("read", &display, "no such variable")),
                }
            }
        };

        if writes {
            self.fire_traces(level, var, TraceOp::Write, index)
                .map_err(|reason| var_error("set", &display, reason))?;
        }
        Ok(self.var(level, var).read(index).unwrap_or(written))
    }

    fn fire_traces(
        &mut self,
        level: usize,
        var: usize,
        op: TraceOp,
        index: Option<&str>,
    ) -> Result<(), String> {
        let v = self.var_mut(level, var);
        if v.traces.is_empty() || v.tracing {
            return Ok(());
        }
        let traces = v.traces.clone();
        v.tracing = true;
        let event = TraceEvent {
            op,
            name: v.name.clone(),
            index: index.map(str::to_string),
        };
        let mut outcome = Ok(());
        for trace in traces {
            outcome = trace.fire(self, &event);
            if outcome.is_err() {
                break;
            }
        }
        self.var_mut(level, var).tracing = false;
        outcome
    }

    /// Access a variable of the current frame by name and optional index.
    pub(crate) fn access_parts(
        &mut self,
        name: &str,
        index: Option<&str>,
        access: Access,
    ) -> Result<Value, Exception> {
        let level = self.current_level();
        let var = self.frames[level].resolve(name);
        self.access(level, var, index, access)
    }

    fn access_named(&mut self, full: &str, access: Access) -> Result<Value, Exception> {
        let (name, index) = split_name(full);
        self.access_parts(name, index, access)
    }

    /// Read a variable of the current frame; `name(index)` reads an
    /// array element.
    pub fn get_var(&mut self, name: &str) -> Result<Value, Exception> {
        self.access_named(name, Access::Read)
    }

    pub fn set_var(&mut self, name: &str, value: impl Into<Value>) -> Result<Value, Exception> {
        self.set_var_mode(name, value.into(), WriteMode::Set)
    }

    /// Write with an explicit mode. Missing variables are created.
    pub fn set_var_mode(&mut self, name: &str, value: Value, mode: WriteMode) -> Result<Value, Exception> {
        self.access_named(name, Access::Write(value, mode))
    }

    /// Add `amount` to an integer variable, returning the new value.
    pub fn incr_var(&mut self, name: &str, amount: i64) -> Result<Value, Exception> {
        self.access_named(name, Access::Incr(amount))
    }

    /// Attach an observer to a variable of the current frame.
    pub fn trace_var(&mut self, name: &str, trace: impl VarTrace + 'static) {
        let (base, _) = split_name(name);
        let level = self.current_level();
        let var = self.frames[level].resolve(base);
        self.var_mut(level, var).traces.push(Rc::new(trace));
    }
}
