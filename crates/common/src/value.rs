//! Runtime values.
//!
//! A [`Value`] is a reference-counted handle. Every value has a string
//! form; numeric and list views are derived from it on demand and cached
//! inside the cell. Handles may be freely aliased, so mutation goes through
//! [`Value::make_exclusive`] (clone on write) or replaces the handle.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ListError, NumberError};
use crate::list::{format_list, split_list};
use crate::number::{format_double, parse_boolean, parse_number, Number};

#[derive(Debug, Clone)]
enum Rep {
    Text(String),
    Int(i32),
    Wide(i64),
    Double(f64),
    List(Vec<Value>),
}

#[derive(Debug, Clone)]
struct Cell {
    rep: Rep,
    string: OnceCell<String>,
    number: OnceCell<Result<Number, NumberError>>,
    list: OnceCell<Result<Vec<Value>, ListError>>,
}

impl Cell {
    fn new(rep: Rep) -> Self {
        Self {
            rep,
            string: OnceCell::new(),
            number: OnceCell::new(),
            list: OnceCell::new(),
        }
    }
}

/// A reference-counted runtime datum.
#[derive(Clone)]
pub struct Value(Rc<Cell>);

impl Value {
    fn from_rep(rep: Rep) -> Self {
        Value(Rc::new(Cell::new(rep)))
    }

    pub fn empty() -> Self {
        Value::from_rep(Rep::Text(String::new()))
    }

    /// A list value holding `elements`.
    pub fn from_list(elements: Vec<Value>) -> Self {
        Value::from_rep(Rep::List(elements))
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        match &self.0.rep {
            Rep::Text(s) => s,
            rep => self.0.string.get_or_init(|| match rep {
                Rep::Int(v) => v.to_string(),
                Rep::Wide(v) => v.to_string(),
                Rep::Double(v) => format_double(*v),
                Rep::List(items) => format_list(items),
                Rep::Text(s) => s.clone(),
            }),
        }
    }

    /// Numeric view.
    pub fn number(&self) -> Result<Number, NumberError> {
        match self.0.rep {
            Rep::Int(v) => Ok(Number::Int(v)),
            Rep::Wide(v) => Ok(Number::Wide(v)),
            Rep::Double(v) => Ok(Number::Double(v)),
            _ => *self.0.number.get_or_init(|| parse_number(self.as_str())),
        }
    }

    /// Whether the internal representation is already numeric.
    pub fn is_numeric_rep(&self) -> bool {
        matches!(self.0.rep, Rep::Int(_) | Rep::Wide(_) | Rep::Double(_))
    }

    /// Boolean view: numbers, or words such as `true`, `no`, `off`.
    pub fn boolean(&self) -> Option<bool> {
        match self.number() {
            Ok(n) => Some(!n.is_zero()),
            Err(_) => parse_boolean(self.as_str()),
        }
    }

    /// List view.
    pub fn as_list(&self) -> Result<&[Value], ListError> {
        if let Rep::List(items) = &self.0.rep {
            return Ok(items);
        }
        match self.0.list.get_or_init(|| {
            split_list(self.as_str()).map(|parts| parts.into_iter().map(Value::from).collect())
        }) {
            Ok(items) => Ok(items),
            Err(e) => Err(e.clone()),
        }
    }

    /// Number of handles sharing this cell.
    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn is_shared(&self) -> bool {
        self.share_count() > 1
    }

    /// Ensure this handle is the only owner of its cell, copying if needed.
    pub fn make_exclusive(&mut self) {
        Rc::make_mut(&mut self.0);
    }

    /// Whether two handles refer to the same cell.
    pub fn same_object(a: &Value, b: &Value) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Replace the contents with a number. Reuses the cell when this handle
    /// is its only owner; otherwise points this handle at a fresh cell.
    pub fn set_number(&mut self, n: Number) {
        match Rc::get_mut(&mut self.0) {
            Some(cell) => *cell = Cell::new(Rep::from(n)),
            None => *self = Value::from(n),
        }
    }

    /// Append to the string form, copying first if shared.
    pub fn append_str(&mut self, suffix: &str) {
        let mut text = match &self.0.rep {
            Rep::Text(_) => String::new(),
            _ => self.as_str().to_string(),
        };
        let cell = Rc::make_mut(&mut self.0);
        if let Rep::Text(existing) = &mut cell.rep {
            text = std::mem::take(existing);
        }
        text.push_str(suffix);
        *cell = Cell::new(Rep::Text(text));
    }

    /// Append one list element, copying first if shared.
    pub fn push_element(&mut self, element: Value) -> Result<(), ListError> {
        let mut items = match &self.0.rep {
            Rep::List(_) => Vec::new(),
            _ => self.as_list()?.to_vec(),
        };
        let cell = Rc::make_mut(&mut self.0);
        if let Rep::List(existing) = &mut cell.rep {
            items = std::mem::take(existing);
        }
        items.push(element);
        *cell = Cell::new(Rep::List(items));
        Ok(())
    }
}

impl From<Number> for Rep {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(v) => Rep::Int(v),
            Number::Wide(v) => Rep::Wide(v),
            Number::Double(v) => Rep::Double(v),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::from_rep(Rep::from(n))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::from_rep(Rep::Int(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::from(Number::from_i64(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::from_rep(Rep::Double(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::from(v as i32)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from_rep(Rep::Text(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from_rep(Rep::Text(s))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Value::same_object(self, other) || self.as_str() == other.as_str()
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.rep {
            Rep::Text(s) => write!(f, "{s:?}"),
            Rep::Int(v) => write!(f, "Int({v})"),
            Rep::Wide(v) => write!(f, "Wide({v})"),
            Rep::Double(v) => write!(f, "Double({v})"),
            Rep::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Value {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
