//! Quill CLI: assemble, verify, run, disassemble and hash compiled units.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input/decode/assembly error
//! - 2: Verification failure
//! - 3: Runtime error

pub mod commands;
pub mod demo;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging on stderr.
///
/// `-v` selects `debug` and `-vv` (or more) `trace`. Without a flag the
/// filter comes from `RUST_LOG`, defaulting to `warn`.
pub fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
