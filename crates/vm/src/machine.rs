//! Interpreter state: evaluation stack, variable frames, command and math
//! registries, the interpreter result and the asynchronous-event flag.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quill_common::{CompiledUnit, Value};
use tracing::debug;

use crate::command::{Command, ProcCommand};
use crate::config::Config;
use crate::error::{Code, ErrorKind, Exception};
use crate::mathfunc::MathRegistry;
use crate::stack::EvalStack;
use crate::vars::VarFrame;

/// Flag that asks the interpreter to run its async handlers.
///
/// It may be marked from any thread; the interpreter only polls it
/// between top-level units in [`Interp::eval_unit`].
#[derive(Debug, Clone, Default)]
pub struct AsyncFlag(Arc<AtomicBool>);

impl AsyncFlag {
    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Handler run when the async flag is found set. It receives the
/// completion of the unit just evaluated and may replace it.
pub type AsyncHandler = Rc<dyn Fn(&mut Interp, Result<Value, Exception>) -> Result<Value, Exception>>;

/// A bytecode interpreter.
pub struct Interp {
    pub(crate) stack: EvalStack,
    /// Variable frames; index 0 is the global frame.
    pub(crate) frames: Vec<VarFrame>,
    pub(crate) commands: HashMap<String, Rc<dyn Command>>,
    pub(crate) math: MathRegistry,
    pub(crate) config: Config,
    nesting: usize,
    pub(crate) result: Value,
    error_info: String,
    error_code: &'static str,
    async_flag: AsyncFlag,
    async_handlers: Vec<AsyncHandler>,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            stack: EvalStack::with_capacity(config.initial_stack_capacity),
            frames: vec![VarFrame::default()],
            commands: HashMap::new(),
            math: MathRegistry::default(),
            config,
            nesting: 0,
            result: Value::empty(),
            error_info: String::new(),
            error_code: "NONE",
            async_flag: AsyncFlag::default(),
            async_handlers: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The most recent command or unit result.
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Error trace of the most recent error caught or reported.
    pub fn error_info(&self) -> &str {
        &self.error_info
    }

    pub fn error_code(&self) -> &'static str {
        self.error_code
    }

    /// Current height of the evaluation stack.
    pub fn stack_height(&self) -> usize {
        self.stack.height()
    }

    pub(crate) fn current_level(&self) -> usize {
        self.frames.len() - 1
    }

    /// Handle to this interpreter's async flag.
    pub fn async_flag(&self) -> AsyncFlag {
        self.async_flag.clone()
    }

    pub fn on_async<F>(&mut self, handler: F)
    where
        F: Fn(&mut Interp, Result<Value, Exception>) -> Result<Value, Exception> + 'static,
    {
        self.async_handlers.push(Rc::new(handler));
    }

    pub fn register_command(&mut self, name: &str, command: impl Command + 'static) {
        self.commands.insert(name.to_string(), Rc::new(command));
    }

    /// Register a procedure whose body runs in its own variable frame.
    pub fn register_proc(&mut self, name: &str, params: &[&str], body: CompiledUnit) {
        self.register_command(name, ProcCommand::new(name, params, body));
    }

    pub(crate) fn enter_nested(&mut self) -> Result<(), Exception> {
        if self.nesting >= self.config.max_nesting_depth {
            return Err(ErrorKind::NestingLimit.into());
        }
        self.nesting += 1;
        Ok(())
    }

    pub(crate) fn leave_nested(&mut self) {
        self.nesting -= 1;
    }

    pub(crate) fn record_error(&mut self, e: &Exception) {
        self.error_info = e.info.clone();
        self.error_code = e.error_code();
    }

    /// Invoke a command. `hint` is the command's source text; an error not
    /// yet attributed is attributed to it.
    pub fn invoke(&mut self, argv: &[Value], hint: Option<&str>) -> Result<Value, Exception> {
        let Some(name) = argv.first() else {
            return Ok(Value::empty());
        };
        self.enter_nested()?;
        let command = self.commands.get(name.as_str()).cloned();
        let mut outcome = match command {
            Some(command) => command.invoke(self, argv),
            None => Err(ErrorKind::UnknownCommand(name.as_str().to_string()).into()),
        };
        self.leave_nested();

        match &mut outcome {
            Ok(value) => self.result = value.clone(),
            Err(e) => {
                if let (Code::Error, Some(text)) = (e.code, hint) {
                    e.attribute(None, Some(text));
                }
                self.result = e.value.clone();
            }
        }
        outcome
    }

    /// Evaluate a unit at top level.
    ///
    /// A `return` becomes a normal result and a stray `break`/`continue`
    /// becomes an error. Afterwards the async flag is polled and, if set,
    /// every async handler runs on the completion in turn.
    pub fn eval_unit(&mut self, unit: &CompiledUnit) -> Result<Value, Exception> {
        let mut outcome = match self.execute(unit) {
            Err(e) if e.code == Code::Return => Ok(e.value),
            Err(e) if e.code == Code::Break => Err(ErrorKind::OutsideLoop("break").into()),
            Err(e) if e.code == Code::Continue => Err(ErrorKind::OutsideLoop("continue").into()),
            other => other,
        };

        if self.async_flag.take() {
            debug!(handlers = self.async_handlers.len(), "async event ready");
            for handler in self.async_handlers.clone() {
                outcome = handler(self, outcome);
            }
        }

        match &outcome {
            Ok(value) => self.result = value.clone(),
            Err(e) => {
                self.result = e.value.clone();
                self.record_error(e);
            }
        }
        outcome
    }
}
