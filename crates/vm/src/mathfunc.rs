//! Math function dispatch.
//!
//! Built-in functions are addressed by their index in
//! [`quill_common::BUILTIN_FUNCS`]; user functions are registered per
//! interpreter under a name and shadow built-ins of the same name when
//! called through `CALL_FUNC1`. Both receive arguments converted to the
//! kinds they declare.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use quill_common::{mathfunc, ArgKind, Number, Value};

use crate::error::{Code, ErrorKind, Exception};
use crate::machine::Interp;

/// Callback implementing a user math function.
pub type MathFn = Rc<dyn Fn(&mut Interp, &[Number]) -> Result<Number, Exception>>;

#[derive(Clone)]
pub(crate) struct UserFunc {
    args: Vec<ArgKind>,
    func: MathFn,
}

const RAND_IA: i64 = 16807;
const RAND_IM: i64 = 2147483647;
const RAND_IQ: i64 = 127773;
const RAND_IR: i64 = 2836;
const RAND_MASK: i64 = 123459876;

#[derive(Default)]
pub(crate) struct MathRegistry {
    user: HashMap<String, UserFunc>,
    seed: Option<i64>,
}

impl MathRegistry {
    pub(crate) fn register(&mut self, name: &str, args: &[ArgKind], func: MathFn) {
        self.user.insert(
            name.to_string(),
            UserFunc {
                args: args.to_vec(),
                func,
            },
        );
    }

    fn srand(&mut self, seed: i64) {
        self.seed = Some(scramble(seed));
    }

    /// Minimal standard generator (Park and Miller).
    fn rand(&mut self) -> f64 {
        let seed = self.seed.unwrap_or_else(clock_seed);
        let tmp = seed / RAND_IQ;
        let mut next = RAND_IA * (seed - tmp * RAND_IQ) - RAND_IR * tmp;
        if next < 0 {
            next += RAND_IM;
        }
        self.seed = Some(next);
        next as f64 / RAND_IM as f64
    }
}

fn scramble(seed: i64) -> i64 {
    let seed = seed & 0x7fff_ffff;
    if seed == 0 || seed == 0x7fff_ffff {
        seed ^ RAND_MASK
    } else {
        seed
    }
}

fn clock_seed() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    scramble(nanos)
}

/// Convert one argument to the kind a function declares.
pub(crate) fn convert_arg(value: &Value, kind: ArgKind) -> Result<Number, ErrorKind> {
    let n = value.number().map_err(|_| ErrorKind::NonNumericMathArg)?;
    match (kind, n) {
        (ArgKind::Either, n) => Ok(n),
        (ArgKind::Double, n) => Ok(Number::Double(n.to_f64())),
        (ArgKind::Int, Number::Int(v)) => Ok(Number::Int(v)),
        (ArgKind::Int, Number::Wide(v)) => i32::try_from(v)
            .map(Number::Int)
            .map_err(|_| ErrorKind::IntegerTooLarge),
        (ArgKind::Int, Number::Double(d)) => double_to_int(d),
        (ArgKind::Wide, Number::Double(d)) => double_to_wide(d),
        (ArgKind::Wide, n) => Ok(Number::Wide(n.as_i64().unwrap_or(0))),
    }
}

fn double_to_int(d: f64) -> Result<Number, ErrorKind> {
    let t = d.trunc();
    if t >= i32::MIN as f64 && t <= i32::MAX as f64 {
        Ok(Number::Int(t as i32))
    } else {
        Err(ErrorKind::IntegerTooLarge)
    }
}

fn double_to_wide(d: f64) -> Result<Number, ErrorKind> {
    let t = d.trunc();
    if t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Ok(Number::Wide(t as i64))
    } else {
        Err(ErrorKind::IntegerTooLarge)
    }
}

fn check_result(d: f64) -> Result<Number, ErrorKind> {
    if d.is_nan() {
        Err(ErrorKind::DomainError)
    } else if d.is_infinite() {
        Err(ErrorKind::FloatOverflow)
    } else {
        Ok(Number::Double(d))
    }
}

fn convert_all(args: &[Value], kinds: &[ArgKind]) -> Result<Vec<Number>, ErrorKind> {
    if args.len() < kinds.len() {
        return Err(ErrorKind::TooFewMathArgs);
    }
    if args.len() > kinds.len() {
        return Err(ErrorKind::TooManyMathArgs);
    }
    args.iter().zip(kinds).map(|(v, k)| convert_arg(v, *k)).collect()
}

impl Interp {
    /// Call built-in function `index` with unconverted arguments.
    pub(crate) fn call_builtin(&mut self, index: usize, args: &[Value]) -> Result<Number, Exception> {
        let desc = mathfunc::builtin(index)
            .ok_or_else(|| ErrorKind::UnknownMathFunction(format!("#{index}")))?;
        let numbers = convert_all(args, desc.args)?;
        Ok(self.eval_builtin(desc.name, &numbers)?)
    }

    /// Call a math function by name: user functions first, then built-ins.
    pub(crate) fn call_math(&mut self, name: &str, args: &[Value]) -> Result<Number, Exception> {
        if let Some(user) = self.math.user.get(name).cloned() {
            let numbers = convert_all(args, &user.args)?;
            // Loop codes cannot leave an expression.
            return (user.func)(self, &numbers).map_err(|e| match e.code {
                Code::Break => ErrorKind::OutsideLoop("break").into(),
                Code::Continue => ErrorKind::OutsideLoop("continue").into(),
                _ => e,
            });
        }
        match mathfunc::builtin_index(name) {
            Some(index) => self.call_builtin(index, args),
            None => Err(ErrorKind::UnknownMathFunction(name.to_string()).into()),
        }
    }

    fn eval_builtin(&mut self, name: &str, args: &[Number]) -> Result<Number, ErrorKind> {
        let d = |i: usize| args[i].to_f64();
        let result = match name {
            "acos" => d(0).acos(),
            "asin" => d(0).asin(),
            "atan" => d(0).atan(),
            "atan2" => d(0).atan2(d(1)),
            "ceil" => d(0).ceil(),
            "cos" => d(0).cos(),
            "cosh" => d(0).cosh(),
            "exp" => d(0).exp(),
            "floor" => d(0).floor(),
            "fmod" => d(0) % d(1),
            "hypot" => d(0).hypot(d(1)),
            "log" => d(0).ln(),
            "log10" => d(0).log10(),
            "pow" => d(0).powf(d(1)),
            "sin" => d(0).sin(),
            "sinh" => d(0).sinh(),
            "sqrt" => d(0).sqrt(),
            "tan" => d(0).tan(),
            "tanh" => d(0).tanh(),
            "double" => d(0),
            "abs" => {
                return Ok(match args[0] {
                    Number::Int(v) => Number::from_i64((v as i64).abs()),
                    Number::Wide(v) => Number::Wide(v.wrapping_abs()),
                    Number::Double(v) => Number::Double(v.abs()),
                })
            }
            "int" => {
                return match args[0] {
                    Number::Double(v) => double_to_int(v),
                    n => i32::try_from(n.as_i64().unwrap_or(0))
                        .map(Number::Int)
                        .map_err(|_| ErrorKind::IntegerTooLarge),
                }
            }
            "round" => {
                return match args[0] {
                    Number::Double(v) => double_to_int(v.round()),
                    n => Ok(n),
                }
            }
            "wide" => {
                return match args[0] {
                    Number::Double(v) => double_to_wide(v),
                    n => Ok(Number::Wide(n.as_i64().unwrap_or(0))),
                }
            }
            "rand" => self.math.rand(),
            "srand" => {
                self.math.srand(args[0].as_i64().unwrap_or(0));
                self.math.rand()
            }
            other => return Err(ErrorKind::UnknownMathFunction(other.to_string())),
        };
        check_result(result)
    }

    /// Register a user math function taking arguments of the given kinds.
    pub fn register_math_func<F>(&mut self, name: &str, args: &[ArgKind], func: F)
    where
        F: Fn(&mut Interp, &[Number]) -> Result<Number, Exception> + 'static,
    {
        self.math.register(name, args, Rc::new(func));
    }
}
