//! Commands invoked by `INVOKE_STK1`/`INVOKE_STK4`.

use std::rc::Rc;

use quill_common::{CompiledUnit, Value};

use crate::error::{Code, ErrorKind, Exception};
use crate::machine::Interp;
use crate::vars::VarFrame;

/// A named operation. `argv[0]` is the command name.
pub trait Command {
    fn invoke(&self, interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception>;
}

impl<F> Command for F
where
    F: Fn(&mut Interp, &[Value]) -> Result<Value, Exception>,
{
    fn invoke(&self, interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
        self(interp, argv)
    }
}

/// A procedure: a compiled body run in a fresh variable frame.
pub struct ProcCommand {
    name: String,
    params: Vec<String>,
    body: Rc<CompiledUnit>,
}

impl ProcCommand {
    pub fn new(name: &str, params: &[&str], body: CompiledUnit) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Rc::new(body),
        }
    }

    fn usage(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.params.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Command for ProcCommand {
    fn invoke(&self, interp: &mut Interp, argv: &[Value]) -> Result<Value, Exception> {
        let args = argv.get(1..).unwrap_or_default();
        if args.len() != self.params.len() {
            return Err(ErrorKind::WrongArgs(self.usage()).into());
        }

        interp.frames.push(VarFrame::default());
        let bound = self
            .params
            .iter()
            .zip(args)
            .try_for_each(|(param, arg)| interp.set_var(param, arg.clone()).map(|_| ()));
        let outcome = bound.and_then(|()| interp.execute(&self.body));
        interp.frames.pop();

        match outcome {
            Ok(value) => Ok(value),
            Err(e) if e.code == Code::Return => Ok(e.value),
            Err(e) => {
                let mut e = match e.code {
                    Code::Break => ErrorKind::OutsideLoop("break").into(),
                    Code::Continue => ErrorKind::OutsideLoop("continue").into(),
                    _ => e,
                };
                if e.code == Code::Error {
                    e.add_info(&format!("\n    (procedure \"{}\")", self.name));
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_lists_parameters() {
        let proc_ = ProcCommand::new("add", &["a", "b"], CompiledUnit::default());
        assert_eq!(proc_.usage(), "add a b");
    }

    #[test]
    fn wrong_arg_count() {
        let mut interp = Interp::new();
        interp.register_proc("add", &["a", "b"], CompiledUnit::default());
        let err = interp
            .invoke(&[Value::from("add"), Value::from(1)], None)
            .unwrap_err();
        assert_eq!(err.to_string(), "wrong # args: should be \"add a b\"");
    }

    #[test]
    fn closures_are_commands() {
        let mut interp = Interp::new();
        interp.register_command("twice", |_: &mut Interp, argv: &[Value]| {
            Ok(Value::from(format!("{0}{0}", argv[1])))
        });
        let out = interp.invoke(&[Value::from("twice"), Value::from("ab")], None).unwrap();
        assert_eq!(out.as_str(), "abab");
        assert_eq!(interp.result().as_str(), "abab");
    }
}
