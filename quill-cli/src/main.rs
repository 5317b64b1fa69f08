//! The `quill` binary.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use quill_cli::commands;
use quill_vm::Config;

#[derive(Parser, Debug)]
#[command(name = "quill", version, about = "Assemble, verify and run quill compiled units")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble text to a binary container
    Assemble {
        input: PathBuf,
        /// Output path (defaults to the input with a .qbc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify a binary container
    Verify { input: PathBuf },
    /// Verify and execute a binary container
    Run {
        input: PathBuf,
        /// Evaluation-stack slots reserved up front
        #[arg(long)]
        stack_size: Option<usize>,
        /// Maximum nested evaluation depth
        #[arg(long)]
        max_nesting: Option<usize>,
    },
    /// Disassemble a binary container to text
    Disassemble { input: PathBuf },
    /// Print the blake3 digest of a binary container
    Hash { input: PathBuf },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { commands::EXIT_INPUT } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    quill_cli::init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Assemble { input, output } => commands::assemble(&input, output.as_deref()),
        Commands::Verify { input } => commands::verify(&input),
        Commands::Run {
            input,
            stack_size,
            max_nesting,
        } => {
            let mut config = Config::default();
            if let Some(slots) = stack_size {
                config = config.with_stack_capacity(slots);
            }
            if let Some(depth) = max_nesting {
                config = config.with_max_nesting(depth);
            }
            commands::run(&input, config)
        }
        Commands::Disassemble { input } => commands::disassemble(&input),
        Commands::Hash { input } => commands::hash(&input),
    };

    if let Err(code) = result {
        process::exit(code);
    }
}
