//! Composable compilation stages
//!
//! Each [`Stage`] consumes an `Input` and produces an `Output`, folding
//! any diagnostics it raised into the value it returns. Stages compose
//! with `.then()` into a [`Pipeline`] that is itself a `Stage`, so
//! `a.then(b).then(c)` builds a three-stage pipeline without an
//! intermediate driver type. This mirrors the original compiler's
//! template-based `Stage`/`A >> B` design, but trades its
//! visitor-method-per-node-kind interface for
//! Rust's exhaustive `match` — the syntax tree's tagged union already
//! gets a compiler error for an unhandled variant, so no separate
//! dispatch mechanism is needed.

use crate::compiler;
use crate::parser::{self, Module};
use silk_core::{DiagnosticBag, Program};

/// A value paired with the diagnostics its stage accumulated.
pub struct Staged<T> {
    pub value: T,
    pub diagnostics: DiagnosticBag,
}

impl<T> Staged<T> {
    pub fn new(value: T, diagnostics: DiagnosticBag) -> Self {
        Staged { value, diagnostics }
    }
}

pub trait Stage {
    type Input;
    type Output;

    fn execute(&self, input: Staged<Self::Input>) -> Staged<Self::Output>;

    fn then<B>(self, next: B) -> Pipeline<Self, B>
    where
        Self: Sized,
        B: Stage<Input = Self::Output>,
    {
        Pipeline { a: self, b: next }
    }
}

pub struct Pipeline<A, B> {
    a: A,
    b: B,
}

impl<A, B> Stage for Pipeline<A, B>
where
    A: Stage,
    B: Stage<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn execute(&self, input: Staged<Self::Input>) -> Staged<Self::Output> {
        self.b.execute(self.a.execute(input))
    }
}

/// Source text to a parsed [`Module`].
pub struct ParseStage;

impl Stage for ParseStage {
    type Input = String;
    type Output = Module;

    fn execute(&self, input: Staged<String>) -> Staged<Module> {
        let (module, mut diagnostics) = parser::parse(&input.value);
        diagnostics.extend(input.diagnostics);
        Staged::new(module, diagnostics)
    }
}

/// A parsed [`Module`] to a compiled [`Program`].
pub struct CompileStage;

impl Stage for CompileStage {
    type Input = Module;
    type Output = Program;

    fn execute(&self, input: Staged<Module>) -> Staged<Program> {
        let (program, diagnostics) = compiler::compile(&input.value, input.diagnostics);
        Staged::new(program, diagnostics)
    }
}

/// The full `Source -> Tokens -> SyntaxTree -> Module -> Program`
/// pipeline, collapsed to its two observable stages (scanning and
/// parsing are fused inside [`ParseStage`], since nothing downstream
/// needs the token stream on its own).
pub fn compile_source(source: &str) -> Staged<Program> {
    let pipeline = ParseStage.then(CompileStage);
    pipeline.execute(Staged::new(source.to_string(), DiagnosticBag::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_compiles_source_straight_through() {
        let staged = compile_source("main;\n1 + 1;");
        assert!(!staged.diagnostics.has_errors());
        assert!(!staged.value.bytes.is_empty());
    }

    #[test]
    fn pipeline_carries_parse_errors_into_the_compiled_result() {
        let staged = compile_source("main;\ndef a = ;");
        assert!(staged.diagnostics.has_errors());
    }
}
