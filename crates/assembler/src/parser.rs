//! Parser: token lines → compiled unit, via [`UnitBuilder`].
//!
//! Each line is a label definition, a directive, an instruction, or a
//! label followed by one of the other two. Labels may be referenced
//! before they are defined; they are resolved when the unit is finished.

use std::collections::HashMap;

use quill_common::{
    BuildError, CompiledUnit, ForeachInfo, ForeachList, Label, Opcode, RangeKind, UnitBuilder, Value,
};

use crate::error::AsmError;
use crate::lexer::Token;

struct LabelInfo {
    label: Label,
    defined: bool,
    first_line: usize,
}

/// Accumulates parsed lines into a unit.
pub(crate) struct Assembler {
    builder: UnitBuilder,
    labels: HashMap<String, LabelInfo>,
    /// Code offset of each instruction to the line it came from.
    lines: HashMap<usize, usize>,
}

impl Assembler {
    pub(crate) fn new() -> Self {
        Self {
            builder: UnitBuilder::new(),
            labels: HashMap::new(),
            lines: HashMap::new(),
        }
    }

    /// Parse one tokenized line.
    pub(crate) fn line(&mut self, tokens: &[Token], line: usize) -> Result<(), AsmError> {
        let mut rest = tokens;
        if let Some(Token::Word(w)) = rest.first() {
            if let Some(name) = w.strip_suffix(':') {
                if name.is_empty() {
                    return Err(unexpected(&rest[0], line));
                }
                self.define_label(name, line)?;
                rest = &rest[1..];
            }
        }

        let Some((head, args)) = rest.split_first() else {
            return Ok(());
        };
        match head {
            Token::Word(w) if w.starts_with('.') => self.directive(w, args, line),
            Token::Word(w) => self.instruction(w, args, line),
            other => Err(unexpected(other, line)),
        }
    }

    /// Resolve labels and produce the unit.
    pub(crate) fn finish(self) -> Result<CompiledUnit, AsmError> {
        let undefined = self
            .labels
            .iter()
            .filter(|(_, info)| !info.defined)
            .min_by_key(|(_, info)| info.first_line);
        if let Some((name, info)) = undefined {
            return Err(AsmError::UndefinedLabel {
                line: info.first_line,
                name: name.clone(),
            });
        }

        let Assembler { builder, lines, .. } = self;
        builder.finish().map_err(|source| {
            let line = match &source {
                BuildError::JumpOutOfRange { at, .. } => lines.get(at).copied().unwrap_or(0),
                _ => 0,
            };
            AsmError::Build { line, source }
        })
    }

    fn define_label(&mut self, name: &str, line: usize) -> Result<(), AsmError> {
        let label = self.label_ref(name, line);
        if let Some(info) = self.labels.get_mut(name) {
            if info.defined {
                return Err(AsmError::DuplicateLabel {
                    line,
                    name: name.to_string(),
                });
            }
            info.defined = true;
        }
        self.builder
            .bind(label)
            .map_err(|source| AsmError::Build { line, source })
    }

    fn label_ref(&mut self, name: &str, line: usize) -> Label {
        if let Some(info) = self.labels.get(name) {
            return info.label;
        }
        let label = self.builder.label();
        self.labels.insert(
            name.to_string(),
            LabelInfo {
                label,
                defined: false,
                first_line: line,
            },
        );
        label
    }

    fn instruction(&mut self, mnemonic: &str, args: &[Token], line: usize) -> Result<(), AsmError> {
        let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AsmError::UnknownOpcode {
            line,
            token: mnemonic.to_string(),
        })?;
        let expected = opcode.operands().len();
        check_arity(args, expected, opcode.mnemonic(), line)?;

        let at = self.builder.offset();
        self.lines.insert(at, line);

        let emitted = if opcode.is_jump() {
            match &args[0] {
                Token::Word(name) => {
                    let label = self.label_ref(name, line);
                    self.builder.jump(opcode, label)
                }
                Token::Number(n) => self.builder.emit(opcode, &[*n]),
                other => return Err(unexpected(other, line)),
            }
        } else {
            let mut operands = Vec::with_capacity(expected);
            for (i, arg) in args.iter().enumerate() {
                operands.push(self.operand(opcode, i, arg, line)?);
            }
            self.builder.emit(opcode, &operands)
        };
        emitted.map_err(|source| AsmError::Build { line, source })?;
        Ok(())
    }

    fn operand(&mut self, opcode: Opcode, i: usize, arg: &Token, line: usize) -> Result<i64, AsmError> {
        let push = matches!(opcode, Opcode::Push1 | Opcode::Push4);
        match arg {
            Token::Number(n) => Ok(*n),
            Token::Str(text) if i == 0 && push => Ok(self.builder.literal(text) as i64),
            Token::Word(name) | Token::Str(name) if i == 0 && opcode.takes_local_slot() => {
                Ok(self.builder.local(name) as i64)
            }
            other => Err(unexpected(other, line)),
        }
    }

    fn directive(&mut self, name: &str, args: &[Token], line: usize) -> Result<(), AsmError> {
        match name {
            ".source" => {
                check_arity(args, 1, ".source", line)?;
                let text = string(&args[0], line)?;
                self.builder.source(text);
            }
            ".local" => {
                check_arity(args, 1, ".local", line)?;
                let local = match &args[0] {
                    Token::Word(w) | Token::Str(w) => w,
                    other => return Err(unexpected(other, line)),
                };
                self.builder.add_local(local);
            }
            ".literal" => {
                check_arity(args, 1, ".literal", line)?;
                let text = string(&args[0], line)?;
                self.builder.add_literal(Value::from(text));
            }
            ".maxstack" => {
                check_arity(args, 1, ".maxstack", line)?;
                let depth = number::<u32>(&args[0], line)?;
                self.builder.max_stack(depth);
            }
            ".range" => self.range(args, line)?,
            ".cmd" => {
                check_arity(args, 4, ".cmd", line)?;
                let start = self.label_arg(&args[0], line)?;
                let end = self.label_arg(&args[1], line)?;
                let src_offset = number::<u32>(&args[2], line)?;
                let src_len = number::<u32>(&args[3], line)?;
                self.builder.add_command(start, end, src_offset, src_len);
            }
            ".foreach" => self.foreach(args, line)?,
            _ => {
                return Err(AsmError::UnknownDirective {
                    line,
                    token: name.to_string(),
                })
            }
        }
        Ok(())
    }

    /// `.range loop|catch START END [break=L] [continue=L] [catch=L]`
    fn range(&mut self, args: &[Token], line: usize) -> Result<(), AsmError> {
        if args.len() < 3 {
            return Err(AsmError::MissingArgument {
                line,
                name: ".range",
                expected: 3,
            });
        }
        let kind = match &args[0] {
            Token::Word(w) if w == "loop" => RangeKind::Loop,
            Token::Word(w) if w == "catch" => RangeKind::Catch,
            other => return Err(unexpected(other, line)),
        };
        let start = self.label_arg(&args[1], line)?;
        let end = self.label_arg(&args[2], line)?;
        let range = self.builder.add_range(kind, start, end);

        for arg in &args[3..] {
            let (key, target) = pair(arg, line)?;
            let label = self.label_ref(target, line);
            match key {
                "break" => self.builder.set_break(range, label),
                "continue" => self.builder.set_continue(range, label),
                "catch" => self.builder.set_catch(range, label),
                _ => return Err(unexpected(arg, line)),
            }
        }
        Ok(())
    }

    /// `.foreach counter=SLOT list=TEMP:V1,V2 ...`
    fn foreach(&mut self, args: &[Token], line: usize) -> Result<(), AsmError> {
        let Some((first, lists)) = args.split_first() else {
            return Err(AsmError::MissingArgument {
                line,
                name: ".foreach",
                expected: 1,
            });
        };
        let loop_counter_slot = match pair(first, line)? {
            ("counter", slot) => self.slot(slot),
            _ => return Err(unexpected(first, line)),
        };

        let mut info = ForeachInfo {
            loop_counter_slot,
            lists: Vec::with_capacity(lists.len()),
        };
        for arg in lists {
            let ("list", spec) = pair(arg, line)? else {
                return Err(unexpected(arg, line));
            };
            let (temp, vars) = spec.split_once(':').ok_or_else(|| unexpected(arg, line))?;
            info.lists.push(ForeachList {
                temp_slot: self.slot(temp),
                vars: vars
                    .split(',')
                    .filter(|v| !v.is_empty())
                    .map(|v| self.slot(v))
                    .collect(),
            });
        }
        self.builder.foreach_info(info);
        Ok(())
    }

    /// A slot written either as a number or as a local name.
    fn slot(&mut self, text: &str) -> u32 {
        text.parse().unwrap_or_else(|_| self.builder.local(text))
    }

    fn label_arg(&mut self, arg: &Token, line: usize) -> Result<Label, AsmError> {
        match arg {
            Token::Word(name) => Ok(self.label_ref(name, line)),
            other => Err(unexpected(other, line)),
        }
    }
}

fn unexpected(token: &Token, line: usize) -> AsmError {
    AsmError::UnexpectedToken {
        line,
        token: token.to_string(),
    }
}

fn check_arity(args: &[Token], expected: usize, name: &'static str, line: usize) -> Result<(), AsmError> {
    if args.len() < expected {
        return Err(AsmError::MissingArgument { line, name, expected });
    }
    match args.get(expected) {
        Some(extra) => Err(unexpected(extra, line)),
        None => Ok(()),
    }
}

fn string(arg: &Token, line: usize) -> Result<&str, AsmError> {
    match arg {
        Token::Str(text) => Ok(text),
        other => Err(unexpected(other, line)),
    }
}

fn number<T: TryFrom<i64>>(arg: &Token, line: usize) -> Result<T, AsmError> {
    match arg {
        Token::Number(n) => T::try_from(*n).map_err(|_| AsmError::InvalidNumber {
            line,
            token: n.to_string(),
        }),
        other => Err(unexpected(other, line)),
    }
}

/// Split a `key=value` word.
fn pair(arg: &Token, line: usize) -> Result<(&str, &str), AsmError> {
    match arg {
        Token::Word(w) => w.split_once('=').ok_or_else(|| unexpected(arg, line)),
        other => Err(unexpected(other, line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize_line;

    fn parse(text: &str) -> Result<CompiledUnit, AsmError> {
        let mut asm = Assembler::new();
        for (idx, line) in text.lines().enumerate() {
            let tokens = tokenize_line(line, idx + 1)?;
            asm.line(&tokens, idx + 1)?;
        }
        asm.finish()
    }

    #[test]
    fn push_strings_are_interned() {
        let unit = parse("PUSH1 \"a\"\nPUSH1 \"b\"\nPUSH1 \"a\"\nDONE\n").unwrap();
        assert_eq!(unit.literals, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(unit.code, vec![0x01, 0, 0x01, 1, 0x01, 0, 0x00]);
    }

    #[test]
    fn literal_directive_keeps_duplicates() {
        let unit = parse(".literal \"x\"\n.literal \"x\"\nPUSH1 1\nDONE\n").unwrap();
        assert_eq!(unit.literals.len(), 2);
        assert_eq!(unit.code, vec![0x01, 1, 0x00]);
    }

    #[test]
    fn local_names_become_slots() {
        let unit = parse(".local \"i\"\nINCR_SCALAR1_IMM j 2\nLOAD_SCALAR1 i\nDONE\n").unwrap();
        assert_eq!(unit.locals, vec!["i".to_string(), "j".to_string()]);
        assert_eq!(unit.code, vec![0x19, 1, 2, 0x09, 0, 0x00]);
    }

    #[test]
    fn labels_resolve_both_directions() {
        let unit = parse("top: PUSH1 \"1\"\nJUMP_FALSE1 out\nJUMP1 top\nout:\nPUSH1 \"x\"\nDONE\n").unwrap();
        assert_eq!(&unit.code[2..6], &[0x2b, 4, 0x27, 0xfc]);
    }

    #[test]
    fn range_and_foreach_directives() {
        let text = "\
.foreach counter=n list=l:x,y
.range loop a b break=b continue=a
a: FOREACH_STEP4 0
JUMP_FALSE1 b
JUMP1 a
b: PUSH1 \"\"
DONE
";
        let unit = parse(text).unwrap();
        assert_eq!(unit.locals, vec!["n", "l", "x", "y"]);
        assert_eq!(unit.foreach_infos[0].lists[0].vars, vec![2, 3]);
        let range = &unit.ranges[0];
        assert_eq!((range.code_start, range.code_len), (0, 9));
        assert_eq!(range.break_target, Some(9));
        assert_eq!(range.continue_target, Some(0));
        assert_eq!(range.catch_target, None);
    }

    #[test]
    fn errors() {
        assert!(matches!(parse("NOPE"), Err(AsmError::UnknownOpcode { line: 1, .. })));
        assert!(matches!(parse(".bogus 1"), Err(AsmError::UnknownDirective { .. })));
        assert!(matches!(
            parse("PUSH1"),
            Err(AsmError::MissingArgument {
                name: "PUSH1",
                expected: 1,
                ..
            })
        ));
        assert!(matches!(parse("ADD 1"), Err(AsmError::UnexpectedToken { .. })));
        assert!(matches!(parse("ADD \"x\""), Err(AsmError::UnexpectedToken { .. })));
        assert!(matches!(parse("a:\na:"), Err(AsmError::DuplicateLabel { line: 2, .. })));
        assert!(matches!(parse(".maxstack -1"), Err(AsmError::InvalidNumber { .. })));
        assert!(matches!(parse(".range both a b"), Err(AsmError::UnexpectedToken { .. })));
        assert!(matches!(
            parse("PUSH1 300"),
            Err(AsmError::Build {
                line: 1,
                source: BuildError::OperandOutOfRange { .. }
            })
        ));
    }

    #[test]
    fn undefined_label_reports_first_reference() {
        let err = parse("DONE\nJUMP1 gone\nJUMP1 gone\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::UndefinedLabel {
                line: 2,
                name: "gone".to_string()
            }
        );
    }
}
