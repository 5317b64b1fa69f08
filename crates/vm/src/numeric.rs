//! Numeric coercion for the operator instructions.
//!
//! Operands are first given a [`Number`] view. A binary operation then
//! runs in the widest representation of the two: double if either is a
//! double, else 64-bit if either is wide, else native. Native results that
//! overflow 32 bits come back as wide.

use std::cmp::Ordering;

use quill_common::{Number, NumberError, Opcode, Value};

use crate::error::ErrorKind;

/// Operator symbol used in operand diagnostics.
pub fn symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Lor => "||",
        Opcode::Land => "&&",
        Opcode::Bitor => "|",
        Opcode::Bitxor => "^",
        Opcode::Bitand => "&",
        Opcode::Eq => "==",
        Opcode::Neq => "!=",
        Opcode::Lt => "<",
        Opcode::Gt => ">",
        Opcode::Le => "<=",
        Opcode::Ge => ">=",
        Opcode::Lshift => "<<",
        Opcode::Rshift => ">>",
        Opcode::Add | Opcode::Uplus => "+",
        Opcode::Sub | Opcode::Uminus => "-",
        Opcode::Mult => "*",
        Opcode::Div => "/",
        Opcode::Mod => "%",
        Opcode::Bitnot => "~",
        Opcode::Not => "!",
        other => other.mnemonic(),
    }
}

fn operand_error(err: NumberError, op: &'static str) -> ErrorKind {
    match err {
        NumberError::Empty => ErrorKind::IllegalOperand {
            problem: "empty string",
            op,
        },
        NumberError::NotNumeric => ErrorKind::IllegalOperand {
            problem: "non-numeric string",
            op,
        },
        NumberError::InvalidOctal => ErrorKind::IllegalOperand {
            problem: "invalid octal number",
            op,
        },
        NumberError::TooLarge => ErrorKind::IntegerTooLarge,
        NumberError::FloatTooLarge => ErrorKind::FloatOverflow,
    }
}

/// Numeric view of an operand of `op`.
pub fn operand(value: &Value, op: &'static str) -> Result<Number, ErrorKind> {
    value.number().map_err(|e| operand_error(e, op))
}

/// Boolean view of an operand of a logical operator.
pub fn truth(value: &Value, op: &'static str) -> Result<bool, ErrorKind> {
    if let Some(b) = value.boolean() {
        return Ok(b);
    }
    Err(match value.number() {
        Err(e) => operand_error(e, op),
        Ok(_) => ErrorKind::ExpectedBoolean(value.as_str().to_string()),
    })
}

fn integer(n: Number, op: &'static str) -> Result<i64, ErrorKind> {
    n.as_i64().ok_or(ErrorKind::IllegalOperand {
        problem: "floating-point value",
        op,
    })
}

/// Quotient rounded toward negative infinity. `b` must be non-zero.
pub fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Remainder with the sign of the divisor. `b` must be non-zero.
pub fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn check_double(op: Opcode, a: f64, b: f64, result: f64) -> Result<Number, ErrorKind> {
    if result.is_nan() {
        return Err(ErrorKind::DomainError);
    }
    if result.is_infinite() {
        return Err(ErrorKind::FloatOverflow);
    }
    let lost = match op {
        Opcode::Mult => a != 0.0 && b != 0.0,
        Opcode::Div => a != 0.0,
        _ => false,
    };
    if result == 0.0 && lost {
        return Err(ErrorKind::FloatUnderflow);
    }
    Ok(Number::Double(result))
}

/// Apply a binary arithmetic, bitwise or shift operator.
pub fn binary(op: Opcode, a: Number, b: Number) -> Result<Number, ErrorKind> {
    let sym = symbol(op);
    match op {
        Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::Div => {}
        Opcode::Mod | Opcode::Bitor | Opcode::Bitxor | Opcode::Bitand => {
            return bitwise_or_mod(op, integer(a, sym)?, integer(b, sym)?, wide(a, b));
        }
        Opcode::Lshift | Opcode::Rshift => return shift(op, a, integer(a, sym)?, integer(b, sym)?),
        _ => unreachable!("{} is not a binary numeric operator", op.mnemonic()),
    }

    if b.is_zero() && op == Opcode::Div {
        return Err(ErrorKind::DivideByZero);
    }

    if a.is_double() || b.is_double() {
        let (x, y) = (a.to_f64(), b.to_f64());
        let r = match op {
            Opcode::Add => x + y,
            Opcode::Sub => x - y,
            Opcode::Mult => x * y,
            _ => x / y,
        };
        return check_double(op, x, y, r);
    }

    let (x, y) = (a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0));
    if wide(a, b) {
        let r = match op {
            Opcode::Add => x.wrapping_add(y),
            Opcode::Sub => x.wrapping_sub(y),
            Opcode::Mult => x.wrapping_mul(y),
            _ => floor_div(x, y),
        };
        return Ok(Number::Wide(r));
    }

    // Both native: 64-bit intermediate cannot overflow.
    let r = match op {
        Opcode::Add => x + y,
        Opcode::Sub => x - y,
        Opcode::Mult => x * y,
        _ => floor_div(x, y),
    };
    Ok(Number::from_i64(r))
}

fn wide(a: Number, b: Number) -> bool {
    matches!(a, Number::Wide(_)) || matches!(b, Number::Wide(_))
}

fn bitwise_or_mod(op: Opcode, x: i64, y: i64, wide: bool) -> Result<Number, ErrorKind> {
    let r = match op {
        Opcode::Mod => {
            if y == 0 {
                return Err(ErrorKind::DivideByZero);
            }
            floor_mod(x, y)
        }
        Opcode::Bitor => x | y,
        Opcode::Bitxor => x ^ y,
        _ => x & y,
    };
    Ok(if wide {
        Number::Wide(r)
    } else {
        Number::from_i64(r)
    })
}

fn shift(op: Opcode, a: Number, x: i64, n: i64) -> Result<Number, ErrorKind> {
    if n < 0 {
        return Err(ErrorKind::NegativeShift);
    }
    let r = match op {
        Opcode::Lshift if n >= 64 => 0,
        Opcode::Lshift => x.wrapping_shl(n as u32),
        _ if n >= 64 => x >> 63,
        _ => x >> n,
    };
    Ok(match a {
        Number::Wide(_) => Number::Wide(r),
        _ => Number::from_i64(r),
    })
}

/// Compare two values: numerically when both have a numeric view,
/// otherwise by their string forms.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.number(), b.number()) {
        (Ok(x), Ok(y)) => compare_numbers(x, y),
        _ => a.as_str().cmp(b.as_str()),
    }
}

fn compare_numbers(x: Number, y: Number) -> Ordering {
    match (x.as_i64(), y.as_i64()) {
        (Some(i), Some(j)) => i.cmp(&j),
        _ => x
            .to_f64()
            .partial_cmp(&y.to_f64())
            .unwrap_or(Ordering::Equal),
    }
}

/// Result of a comparison operator.
pub fn relation(op: Opcode, ordering: Ordering) -> bool {
    match op {
        Opcode::Eq => ordering == Ordering::Equal,
        Opcode::Neq => ordering != Ordering::Equal,
        Opcode::Lt => ordering == Ordering::Less,
        Opcode::Gt => ordering == Ordering::Greater,
        Opcode::Le => ordering != Ordering::Greater,
        _ => ordering != Ordering::Less,
    }
}

/// Apply a unary numeric operator.
pub fn unary(op: Opcode, a: Number) -> Result<Number, ErrorKind> {
    match op {
        Opcode::Uplus => Ok(a),
        Opcode::Uminus => Ok(match a {
            Number::Int(x) => Number::from_i64(-(x as i64)),
            Number::Wide(x) => Number::Wide(x.wrapping_neg()),
            Number::Double(x) => Number::Double(-x),
        }),
        _ => match a {
            Number::Int(x) => Ok(Number::Int(!x)),
            Number::Wide(x) => Ok(Number::Wide(!x)),
            Number::Double(_) => Err(ErrorKind::IllegalOperand {
                problem: "floating-point value",
                op: symbol(op),
            }),
        },
    }
}
