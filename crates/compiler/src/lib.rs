//! Silk Compiler: scanner, Pratt parser, and bytecode compiler
//!
//! The front half of the toolchain, taking Silk source text through to
//! a [`silk_core::Program`] the Moth VM (`silk-runtime`) can execute:
//!
//! - `scanner`/`token`: turn source text into a `Token` stream.
//! - `ast`/`precedence`: the syntax tree and its operator precedence
//!   table.
//! - `parser`: a Pratt parser building a [`parser::Module`] from tokens.
//! - `compiler`: lowers a `Module` into Moth bytecode.
//! - `pipeline`: composes the stages above behind a uniform interface.
//! - `printer`: renders a `Module` back to source text.
//! - `json` (behind the `serde` feature): renders a `Module` as JSON.
//!
//! Every stage accumulates diagnostics in a `DiagnosticBag` rather than
//! aborting at the first error, so a single malformed declaration never
//! prevents the rest of a module from compiling.

pub mod ast;
pub mod compiler;
#[cfg(feature = "serde")]
pub mod json;
pub mod parser;
pub mod pipeline;
pub mod precedence;
pub mod printer;
pub mod scanner;
pub mod token;

pub use compiler::compile;
pub use parser::{parse, Module};
pub use pipeline::compile_source;
pub use printer::print_module;
