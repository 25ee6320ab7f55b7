//! `silk`: compile, run, and inspect Silk programs
//!
//! Parses arguments and installs logging, then hands off to the
//! `silk_cli` library for everything dispatchable.

use clap::{Parser, Subcommand};
use silk_cli::error::CliError;
use silk_cli::Command as CliCommand;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "silk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile, run, and inspect Silk programs", long_about = None)]
struct Cli {
    /// Raise the log level to debug.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file to a bytecode file.
    Compile {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Compile and run a source file in one step.
    Run { input: PathBuf },
    /// Run a previously compiled bytecode file.
    Exec { input: PathBuf },
    /// Pretty-print the parsed syntax tree.
    Print { input: PathBuf },
    /// Serialize the parsed syntax tree as JSON.
    Json {
        input: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
}

impl From<Command> for CliCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::Compile { input, output } => CliCommand::Compile { input, output },
            Command::Run { input } => CliCommand::Run { input },
            Command::Exec { input } => CliCommand::Exec { input },
            Command::Print { input } => CliCommand::Print { input },
            Command::Json { input, pretty } => CliCommand::Json { input, pretty },
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match silk_cli::dispatch(cli.command.into()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "silk_cli=debug" } else { "silk_cli=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
