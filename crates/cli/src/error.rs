//! The CLI's own error type
//!
//! Every subcommand boundary — a missing file, a malformed bytecode
//! file, a compile or runtime error — collapses into one of these so
//! `main` has a single place to print a message and pick an exit code.
//! Library crates keep their own typed errors (`FormatError`,
//! `RuntimeError`); this type only exists to unify them for reporting.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CliError {
    Io { path: PathBuf, source: std::io::Error },
    File(silk_core::format::FormatError),
    Diagnostics(usize),
    Runtime(silk_runtime::RuntimeError),
}

impl CliError {
    /// The exit code documented for this kind of failure: `2` for a
    /// malformed bytecode file, `1` for everything else that blocks
    /// execution.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::File(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io { path, source } => {
                write!(f, "{}: {source}", path.display())
            }
            CliError::File(e) => write!(f, "file error: {e}"),
            CliError::Diagnostics(count) => {
                write!(f, "{count} diagnostic(s) blocked execution")
            }
            CliError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<silk_core::format::FormatError> for CliError {
    fn from(e: silk_core::format::FormatError) -> Self {
        CliError::File(e)
    }
}

impl From<silk_runtime::RuntimeError> for CliError {
    fn from(e: silk_runtime::RuntimeError) -> Self {
        CliError::Runtime(e)
    }
}
