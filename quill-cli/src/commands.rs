//! CLI command implementations.
//!
//! Each command reports its own diagnostics on stderr and returns the
//! process exit code on failure.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use quill_common::{CompiledUnit, Instruction};
use quill_vm::{Code, Config, Interp};
use tracing::{debug, info};

use crate::demo;

/// Exit code for unreadable, undecodable or unassemblable input.
pub const EXIT_INPUT: i32 = 1;
/// Exit code for a unit rejected by the verifier.
pub const EXIT_VERIFY: i32 = 2;
/// Exit code for an evaluation that did not complete normally.
pub const EXIT_RUNTIME: i32 = 3;

/// Assemble a `.qasm` text file to a `.qbc` container.
pub fn assemble(input: &Path, output: Option<&Path>) -> Result<(), i32> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input));

    let text = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", input.display());
        EXIT_INPUT
    })?;

    let unit = quill_assembler::assemble(&text).map_err(|e| {
        eprintln!("error: {e}");
        EXIT_INPUT
    })?;

    let bytes = unit.encode();
    fs::write(&output, &bytes).map_err(|e| {
        eprintln!("error: cannot write '{}': {e}", output.display());
        EXIT_INPUT
    })?;

    eprintln!(
        "assembled {} instructions ({} bytes) -> {}",
        instruction_count(&unit),
        bytes.len(),
        output.display()
    );
    Ok(())
}

/// Verify a `.qbc` container.
pub fn verify(input: &Path) -> Result<(), i32> {
    let unit = read_unit(input)?;
    check(&unit)?;
    println!("OK: {} ({} instructions)", input.display(), instruction_count(&unit));
    Ok(())
}

/// Verify and execute a `.qbc` container with the demonstration commands.
pub fn run(input: &Path, config: Config) -> Result<(), i32> {
    let unit = read_unit(input)?;
    check(&unit)?;

    let mut interp = Interp::with_config(config);
    demo::register(&mut interp, Rc::new(RefCell::new(io::stdout())));
    info!(path = %input.display(), "running unit");

    match interp.eval_unit(&unit) {
        Ok(value) => {
            if !value.as_str().is_empty() {
                println!("{value}");
            }
            Ok(())
        }
        Err(e) if e.code == Code::Error => {
            eprintln!("runtime error: {}", e.info);
            Err(EXIT_RUNTIME)
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            Err(EXIT_RUNTIME)
        }
    }
}

/// Disassemble a `.qbc` container to text.
pub fn disassemble(input: &Path) -> Result<(), i32> {
    let unit = read_unit(input)?;
    let text = quill_assembler::disassemble(&unit).map_err(|e| {
        eprintln!("error: cannot disassemble '{}': {e}", input.display());
        EXIT_INPUT
    })?;
    print!("{text}");
    Ok(())
}

/// Print the blake3 digest of a `.qbc` container.
pub fn hash(input: &Path) -> Result<(), i32> {
    let unit = read_unit(input)?;
    println!("{}  {}", unit.digest(), input.display());
    Ok(())
}

// --- Helpers ---

/// Read and decode a `.qbc` container.
fn read_unit(path: &Path) -> Result<CompiledUnit, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", path.display());
        EXIT_INPUT
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "read container");

    CompiledUnit::decode(&bytes).map_err(|e| {
        eprintln!("error: invalid container: {e}");
        EXIT_INPUT
    })
}

fn check(unit: &CompiledUnit) -> Result<(), i32> {
    quill_verifier::verify(unit).map_err(|errors| {
        for e in &errors {
            eprintln!("error: {e}");
        }
        EXIT_VERIFY
    })
}

fn instruction_count(unit: &CompiledUnit) -> usize {
    Instruction::decode_all(&unit.code).map_or(0, |instrs| instrs.len())
}

/// The path a default `assemble` writes to.
pub fn default_output(input: &Path) -> PathBuf {
    input.with_extension("qbc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_replaces_extension() {
        assert_eq!(default_output(Path::new("dir/prog.qasm")), PathBuf::from("dir/prog.qbc"));
        assert_eq!(default_output(Path::new("prog")), PathBuf::from("prog.qbc"));
    }

    #[test]
    fn instruction_count_of_undecodable_code() {
        let unit = CompiledUnit {
            code: vec![0xff],
            ..CompiledUnit::default()
        };
        assert_eq!(instruction_count(&unit), 0);
    }
}
