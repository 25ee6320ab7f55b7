//! `silk`: compile, run, and inspect Silk programs
//!
//! A thin driver over `silk-compiler` and `silk-runtime`. Every
//! subcommand follows the same shape: read input, run the relevant
//! pipeline stage(s), report diagnostics to stderr, and pick an exit
//! code from whether anything at error severity happened. The binary
//! (`main.rs`) only parses arguments and installs logging; everything
//! dispatchable lives here so it can be exercised directly in tests
//! without spawning a subprocess.

pub mod error;
pub mod stdlib;

use error::CliError;
use silk_compiler::pipeline::compile_source;
use silk_compiler::{json, parser, print_module};
use silk_core::diagnostic::DiagnosticBag;
use silk_core::format;
use silk_runtime::Vm;
use std::path::{Path, PathBuf};

pub enum Command {
    Compile { input: PathBuf, output: PathBuf },
    Run { input: PathBuf },
    Exec { input: PathBuf },
    Print { input: PathBuf },
    Json { input: PathBuf, pretty: bool },
}

pub fn dispatch(command: Command) -> Result<(), CliError> {
    match command {
        Command::Compile { input, output } => compile(&input, &output),
        Command::Run { input } => exec_source(&input).map(|_| ()),
        Command::Exec { input } => exec_bytecode(&input).map(|_| ()),
        Command::Print { input } => print_tree(&input),
        Command::Json { input, pretty } => json_dump(&input, pretty),
    }
}

fn read_source(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn report(diagnostics: &DiagnosticBag) {
    for diagnostic in diagnostics.iter() {
        eprintln!("{diagnostic}");
    }
}

fn require_no_errors(diagnostics: &DiagnosticBag) -> Result<(), CliError> {
    if diagnostics.has_errors() {
        Err(CliError::Diagnostics(diagnostics.error_count()))
    } else {
        Ok(())
    }
}

pub fn compile(input: &Path, output: &Path) -> Result<(), CliError> {
    let source = read_source(input)?;
    let staged = compile_source(&source);
    report(&staged.diagnostics);
    require_no_errors(&staged.diagnostics)?;
    let bytes = format::write_program(&staged.value);
    std::fs::write(output, bytes).map_err(|source| CliError::Io {
        path: output.to_path_buf(),
        source,
    })
}

pub fn exec_source(input: &Path) -> Result<String, CliError> {
    let source = read_source(input)?;
    let staged = compile_source(&source);
    report(&staged.diagnostics);
    require_no_errors(&staged.diagnostics)?;
    run_program(staged.value)
}

pub fn exec_bytecode(input: &Path) -> Result<String, CliError> {
    let bytes = std::fs::read(input).map_err(|source| CliError::Io {
        path: input.to_path_buf(),
        source,
    })?;
    let program = format::read_program(&bytes)?;
    run_program(program)
}

/// Runs a compiled program to completion and prints its result,
/// returning the value too so tests can assert on it directly instead
/// of scraping stdout.
pub fn run_program(program: silk_core::Program) -> Result<String, CliError> {
    let mut vm = Vm::new(program);
    stdlib::install(vm.ffi_mut());
    vm.bind_externs();
    let result = vm.run()?;
    let rendered = vm.display_value(result);
    println!("{rendered}");
    Ok(rendered)
}

pub fn print_tree(input: &Path) -> Result<(), CliError> {
    let source = read_source(input)?;
    let (module, diagnostics) = parser::parse(&source);
    report(&diagnostics);
    println!("{}", print_module(&module));
    require_no_errors(&diagnostics)
}

pub fn json_dump(input: &Path, pretty: bool) -> Result<(), CliError> {
    let source = read_source(input)?;
    let (module, diagnostics) = parser::parse(&source);
    report(&diagnostics);
    let value = json::module_to_json(&module);
    let rendered = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .expect("a syntax tree always serializes to valid JSON");
    println!("{rendered}");
    require_no_errors(&diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn compile_then_exec_round_trips_through_a_bytecode_file() {
        let source = write_temp("main;\nfun square(x) => x * x;\nsquare(7);");
        let bytecode = tempfile::NamedTempFile::new().unwrap();
        compile(source.path(), bytecode.path()).unwrap();
        let result = exec_bytecode(bytecode.path());
        assert!(result.is_ok());
    }

    #[test]
    fn run_source_directly_matches_compile_then_exec() {
        let source = write_temp("main;\nfun square(x) => x * x;\nsquare(7);");
        let via_run = exec_source(source.path());
        assert!(via_run.is_ok());
    }

    #[test]
    fn a_missing_semicolon_blocks_execution_with_exactly_one_diagnostic() {
        let source = write_temp("main;\ndef a = 1\ndef b = 2;");
        match exec_source(source.path()) {
            Err(CliError::Diagnostics(count)) => assert_eq!(count, 1),
            other => panic!("expected a single blocking diagnostic, got {other:?}"),
        }
    }

    #[test]
    fn exec_on_a_corrupt_bytecode_file_reports_a_file_error() {
        let bad = write_temp("not a silk executable");
        match exec_bytecode(bad.path()) {
            Err(CliError::File(_)) => {}
            other => panic!("expected a file error, got {other:?}"),
        }
    }

    #[test]
    fn print_then_json_both_succeed_on_a_well_formed_module() {
        let source = write_temp("main;\ndef n = 10;\nn + 1;");
        assert!(print_tree(source.path()).is_ok());
        assert!(json_dump(source.path(), false).is_ok());
    }
}
