//! Tokenizer for quill assembly text.

use std::fmt::{self, Write as _};
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::AsmError;

/// A single token from an assembly line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Mnemonic, directive, label, local name or `key=value` pair.
    Word(String),
    /// A numeric literal (decimal or hex, optionally signed).
    Number(i64),
    /// A double-quoted string with escapes resolved.
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::Number(n) => write!(f, "{n}"),
            Token::Str(s) => f.write_str(&quote(s)),
        }
    }
}

/// Tokenize a single line of assembly text.
///
/// Returns an empty Vec for blank lines and comment-only lines.
/// Comments start with `;` outside a string and extend to end of line.
pub(crate) fn tokenize_line(line: &str, line_num: usize) -> Result<Vec<Token>, AsmError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == ';' {
            break;
        }
        if c == '"' {
            chars.next();
            tokens.push(Token::Str(read_string(&mut chars, line_num)?));
            continue;
        }

        let mut end = line.len();
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == ';' || c == '"' {
                end = i;
                break;
            }
            chars.next();
        }
        tokens.push(word_token(&line[start..end], line_num)?);
    }

    Ok(tokens)
}

fn word_token(word: &str, line: usize) -> Result<Token, AsmError> {
    let negative = word.starts_with('-');
    let unsigned = word
        .strip_prefix('-')
        .or_else(|| word.strip_prefix('+'))
        .unwrap_or(word);
    if !unsigned.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(Token::Word(word.to_string()));
    }

    let magnitude = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => unsigned.parse::<i64>(),
    }
    .map_err(|_| AsmError::InvalidNumber {
        line,
        token: word.to_string(),
    })?;
    Ok(Token::Number(if negative { -magnitude } else { magnitude }))
}

fn read_string(chars: &mut Peekable<CharIndices<'_>>, line: usize) -> Result<String, AsmError> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => {
                let (_, escape) = chars.next().ok_or(AsmError::UnterminatedString { line })?;
                match escape {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    'u' => out.push(read_unicode_escape(chars, line)?),
                    other => {
                        return Err(AsmError::BadEscape {
                            line,
                            escape: format!("\\{other}"),
                        })
                    }
                }
            }
            c => out.push(c),
        }
    }
    Err(AsmError::UnterminatedString { line })
}

/// Reads the `{hex}` part of a `\u{hex}` escape.
fn read_unicode_escape(chars: &mut Peekable<CharIndices<'_>>, line: usize) -> Result<char, AsmError> {
    let mut digits = String::new();
    let bad = |digits: &str| AsmError::BadEscape {
        line,
        escape: format!("\\u{digits}"),
    };
    if chars.next().map(|(_, c)| c) != Some('{') {
        return Err(bad(""));
    }
    loop {
        match chars.next() {
            Some((_, '}')) => break,
            Some((_, c)) if c.is_ascii_hexdigit() && digits.len() < 6 => digits.push(c),
            _ => return Err(bad(&format!("{{{digits}"))),
        }
    }
    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| bad(&format!("{{{digits}}}")))
}

/// Render `text` as a string token that reads back unchanged.
pub(crate) fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
