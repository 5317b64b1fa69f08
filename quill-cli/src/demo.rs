//! Demonstration commands available to `quill run`.
//!
//! | Command | Behavior |
//! |---|---|
//! | `puts ?-nonewline? string` | write `string` to the output |
//! | `list ?arg ...?` | a list of the arguments |
//! | `error message` | raise an error |
//! | `break`, `continue` | raise the loop completion codes |
//! | `return ?-code code? ?value?` | complete with `code` (default `return`) |

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use quill_common::Value;
use quill_vm::{Code, Command, ErrorKind, Exception, Interp};

/// `puts`, writing to a shared sink.
pub struct Puts<W> {
    out: Rc<RefCell<W>>,
}

impl<W: Write> Command for Puts<W> {
    fn invoke(&self, _interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
        let (newline, text) = match argv {
            [_, text] => (true, text),
            [_, flag, text] if flag.as_str() == "-nonewline" => (false, text),
            _ => return Err(ErrorKind::WrongArgs("puts ?-nonewline? string".into()).into()),
        };
        let mut out = self.out.borrow_mut();
        let written = if newline {
            writeln!(out, "{text}")
        } else {
            write!(out, "{text}")
        };
        written
            .and_then(|()| out.flush())
            .map_err(|e| Exception::message(format!("error writing output: {e}")))?;
        Ok(Value::empty())
    }
}

fn list(_interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
    Ok(Value::from_list(argv[1..].to_vec()))
}

fn error(_interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
    match argv {
        [_, message] => Err(Exception::message(message.as_str())),
        _ => Err(ErrorKind::WrongArgs("error message".into()).into()),
    }
}

fn break_cmd(_interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
    if argv.len() != 1 {
        return Err(ErrorKind::WrongArgs("break".into()).into());
    }
    Err(Exception::control(Code::Break))
}

fn continue_cmd(_interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
    if argv.len() != 1 {
        return Err(ErrorKind::WrongArgs("continue".into()).into());
    }
    Err(Exception::control(Code::Continue))
}

/// Parse a completion code given by name or number. `None` means `ok`.
fn parse_code(text: &str) -> Result<Option<Code>, Exception> {
    let code = match text {
        "ok" => None,
        "error" => Some(Code::Error),
        "return" => Some(Code::Return),
        "break" => Some(Code::Break),
        "continue" => Some(Code::Continue),
        other => {
            let n = other.parse::<i32>().map_err(|_| {
                Exception::message(format!(
                    "bad completion code \"{other}\": must be ok, error, return, break, continue, or an integer"
                ))
            })?;
            Code::from_int(n)
        }
    };
    Ok(code)
}

fn return_cmd(_interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
    let (code, rest) = match argv {
        [_, flag, code, rest @ ..] if flag.as_str() == "-code" => (parse_code(code.as_str())?, rest),
        [_, rest @ ..] => (Some(Code::Return), rest),
        [] => (Some(Code::Return), argv),
    };
    let value = match rest {
        [] => Value::empty(),
        [value] => value.clone(),
        _ => return Err(ErrorKind::WrongArgs("return ?-code code? ?value?".into()).into()),
    };
    match code {
        None => Ok(value),
        Some(code) => Err(Exception::with_code(code, value)),
    }
}

/// Register the demonstration commands, with `puts` writing to `out`.
pub fn register<W: Write + 'static>(interp: &mut Interp, out: Rc<RefCell<W>>) {
    interp.register_command("puts", Puts { out });
    interp.register_command("list", list);
    interp.register_command("error", error);
    interp.register_command("break", break_cmd);
    interp.register_command("continue", continue_cmd);
    interp.register_command("return", return_cmd);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp() -> (Interp, Rc<RefCell<Vec<u8>>>) {
        let out = Rc::new(RefCell::new(Vec::new()));
        let mut interp = Interp::new();
        register(&mut interp, Rc::clone(&out));
        (interp, out)
    }

    fn call(interp: &mut Interp, words: &[&str]) -> Result<Value, Exception> {
        let argv: Vec<Value> = words.iter().map(|w| Value::from(*w)).collect();
        interp.invoke(&argv, None)
    }

    #[test]
    fn puts_writes_lines() {
        let (mut interp, out) = interp();
        call(&mut interp, &["puts", "hello"]).unwrap();
        call(&mut interp, &["puts", "-nonewline", "a"]).unwrap();
        call(&mut interp, &["puts", "b"]).unwrap();
        assert_eq!(String::from_utf8(out.borrow().clone()).unwrap(), "hello\nab\n");
    }

    #[test]
    fn puts_usage() {
        let (mut interp, _) = interp();
        let err = call(&mut interp, &["puts"]).unwrap_err();
        assert_eq!(err.value.as_str(), "wrong # args: should be \"puts ?-nonewline? string\"");
    }

    #[test]
    fn list_quotes_elements() {
        let (mut interp, _) = interp();
        let value = call(&mut interp, &["list", "a", "b c", ""]).unwrap();
        assert_eq!(value.as_str(), "a {b c} {}");
    }

    #[test]
    fn error_raises_message() {
        let (mut interp, _) = interp();
        let err = call(&mut interp, &["error", "boom"]).unwrap_err();
        assert_eq!(err.code, Code::Error);
        assert_eq!(err.value.as_str(), "boom");
    }

    #[test]
    fn loop_controls() {
        let (mut interp, _) = interp();
        assert_eq!(call(&mut interp, &["break"]).unwrap_err().code, Code::Break);
        assert_eq!(call(&mut interp, &["continue"]).unwrap_err().code, Code::Continue);
        assert_eq!(call(&mut interp, &["break", "x"]).unwrap_err().code, Code::Error);
    }

    #[test]
    fn return_codes() {
        let (mut interp, _) = interp();
        let err = call(&mut interp, &["return", "v"]).unwrap_err();
        assert_eq!((err.code, err.value.as_str()), (Code::Return, "v"));

        let err = call(&mut interp, &["return", "-code", "7", "x"]).unwrap_err();
        assert_eq!(err.code, Code::Other(7));

        let err = call(&mut interp, &["return", "-code", "break"]).unwrap_err();
        assert_eq!(err.code, Code::Break);

        let value = call(&mut interp, &["return", "-code", "ok", "fine"]).unwrap();
        assert_eq!(value.as_str(), "fine");

        let err = call(&mut interp, &["return", "-code", "bogus"]).unwrap_err();
        assert!(err.value.as_str().starts_with("bad completion code \"bogus\""));
    }
}
