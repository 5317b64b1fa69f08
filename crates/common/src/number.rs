//! Numeric representations and the string ↔ number conversions.

use std::fmt;

use crate::error::NumberError;

/// A tagged numeric value.
///
/// `Int` is the native integer representation, `Wide` the 64-bit one.
/// Integer parsing yields `Int` whenever the value fits in 32 bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    Wide(i64),
    Double(f64),
}

impl Number {
    /// Narrowest integer representation holding `value`.
    pub fn from_i64(value: i64) -> Number {
        match i32::try_from(value) {
            Ok(v) => Number::Int(v),
            Err(_) => Number::Wide(value),
        }
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Number::Double(_))
    }

    /// Integer value, if this is an integer representation.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Int(v) => Some(v as i64),
            Number::Wide(v) => Some(v),
            Number::Double(_) => None,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match *self {
            Number::Int(v) => v as f64,
            Number::Wide(v) => v as f64,
            Number::Double(v) => v,
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Number::Int(v) => v == 0,
            Number::Wide(v) => v == 0,
            Number::Double(v) => v == 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(v) => write!(f, "{v}"),
            Number::Wide(v) => write!(f, "{v}"),
            Number::Double(v) => f.write_str(&format_double(v)),
        }
    }
}

/// Parse the numeric view of a string.
///
/// Accepts surrounding whitespace, an optional sign, `0x` hex, leading-zero
/// octal, decimal integers and decimal floats. Integer magnitudes up to
/// 2^64-1 wrap into 64 bits.
pub fn parse_number(text: &str) -> Result<Number, NumberError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NumberError::Empty);
    }

    let (negative, body) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if body.is_empty() {
        return Err(NumberError::NotNumeric);
    }

    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(NumberError::NotNumeric);
        }
        u64::from_str_radix(hex, 16).map_err(|_| NumberError::TooLarge)?
    } else if body.bytes().all(|b| b.is_ascii_digit()) {
        if body.len() > 1 && body.starts_with('0') {
            if body.bytes().any(|b| b == b'8' || b == b'9') {
                return Err(NumberError::InvalidOctal);
            }
            u64::from_str_radix(&body[1..], 8).map_err(|_| NumberError::TooLarge)?
        } else {
            body.parse::<u64>().map_err(|_| NumberError::TooLarge)?
        }
    } else {
        return parse_double(trimmed, body);
    };

    let value = magnitude as i64;
    Ok(Number::from_i64(if negative { value.wrapping_neg() } else { value }))
}

fn parse_double(signed: &str, body: &str) -> Result<Number, NumberError> {
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };

    let mut digits = 0;
    let mut dots = 0;
    for b in mantissa.bytes() {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return Err(NumberError::NotNumeric),
        }
    }
    if digits == 0 || dots > 1 {
        return Err(NumberError::NotNumeric);
    }
    if let Some(exp) = exponent {
        let exp_digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        if exp_digits.is_empty() || !exp_digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NumberError::NotNumeric);
        }
    }

    let value: f64 = signed.parse().map_err(|_| NumberError::NotNumeric)?;
    if value.is_infinite() {
        return Err(NumberError::FloatTooLarge);
    }
    Ok(Number::Double(value))
}

/// Format a double the way values print it.
///
/// Uses the shortest digits that round-trip; integral values keep a
/// trailing `.0`, and very large or very small magnitudes switch to
/// exponent form with a signed two-digit exponent (`1e+300`, `1.5e-07`).
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e17).contains(&magnitude) {
        let raw = format!("{value:e}");
        let (mantissa, exponent) = raw.split_once('e').unwrap_or((&raw, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }

    let mut text = format!("{value}");
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Boolean view of a word: a number (non-zero is true), a prefix of
/// `true`/`false`/`yes`/`no`, or `on`/`off` (at least two characters).
pub fn parse_boolean(text: &str) -> Option<bool> {
    if let Ok(n) = parse_number(text) {
        return Some(!n.is_zero());
    }
    let word = text.to_ascii_lowercase();
    if word.is_empty() {
        return None;
    }
    let prefix_of = |full: &str| full.starts_with(word.as_str());
    if prefix_of("true") || prefix_of("yes") {
        Some(true)
    } else if prefix_of("false") || prefix_of("no") {
        Some(false)
    } else if word.len() >= 2 && prefix_of("on") {
        Some(true)
    } else if word.len() >= 2 && prefix_of("off") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_pick_narrowest_rep() {
        assert_eq!(parse_number("42"), Ok(Number::Int(42)));
        assert_eq!(parse_number("-7"), Ok(Number::Int(-7)));
        assert_eq!(parse_number("4294967296"), Ok(Number::Wide(4294967296)));
        assert_eq!(parse_number("  12 "), Ok(Number::Int(12)));
    }

    #[test]
    fn hex_and_octal() {
        assert_eq!(parse_number("0x1F"), Ok(Number::Int(31)));
        assert_eq!(parse_number("017"), Ok(Number::Int(15)));
        assert_eq!(parse_number("08"), Err(NumberError::InvalidOctal));
        assert_eq!(parse_number("0x"), Err(NumberError::NotNumeric));
    }

    #[test]
    fn magnitudes_wrap_into_64_bits() {
        assert_eq!(parse_number("18446744073709551615"), Ok(Number::Int(-1)));
        assert_eq!(parse_number("18446744073709551616"), Err(NumberError::TooLarge));
    }

    #[test]
    fn doubles() {
        assert_eq!(parse_number("2.5"), Ok(Number::Double(2.5)));
        assert_eq!(parse_number(".5"), Ok(Number::Double(0.5)));
        assert_eq!(parse_number("1e3"), Ok(Number::Double(1000.0)));
        assert_eq!(parse_number("08.5"), Ok(Number::Double(8.5)));
        assert_eq!(parse_number("1e999"), Err(NumberError::FloatTooLarge));
    }

    #[test]
    fn non_numbers() {
        assert_eq!(parse_number(""), Err(NumberError::Empty));
        assert_eq!(parse_number("   "), Err(NumberError::Empty));
        assert_eq!(parse_number("abc"), Err(NumberError::NotNumeric));
        assert_eq!(parse_number("inf"), Err(NumberError::NotNumeric));
        assert_eq!(parse_number("nan"), Err(NumberError::NotNumeric));
        assert_eq!(parse_number("1e"), Err(NumberError::NotNumeric));
        assert_eq!(parse_number("-"), Err(NumberError::NotNumeric));
        assert_eq!(parse_number("1.2.3"), Err(NumberError::NotNumeric));
    }

    #[test]
    fn double_formatting() {
        assert_eq!(format_double(3.5), "3.5");
        assert_eq!(format_double(4.0), "4.0");
        assert_eq!(format_double(-0.25), "-0.25");
        assert_eq!(format_double(1e300), "1e+300");
        assert_eq!(format_double(1.5e-7), "1.5e-07");
        assert_eq!(format_double(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_double(f64::INFINITY), "Inf");
    }

    #[test]
    fn booleans() {
        assert_eq!(parse_boolean("1"), Some(true));
        assert_eq!(parse_boolean("0.0"), Some(false));
        assert_eq!(parse_boolean("tr"), Some(true));
        assert_eq!(parse_boolean("NO"), Some(false));
        assert_eq!(parse_boolean("on"), Some(true));
        assert_eq!(parse_boolean("of"), Some(false));
        assert_eq!(parse_boolean("o"), None);
        assert_eq!(parse_boolean(""), None);
        assert_eq!(parse_boolean("maybe"), None);
    }
}
