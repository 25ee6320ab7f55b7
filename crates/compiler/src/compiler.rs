//! The bytecode compiler
//!
//! Walks the syntax tree and emits Moth bytecode directly into a
//! [`Program`]'s instruction buffer — no intermediate three-address form.
//! Locals are resolved at compile time against a scope stack (`Locals`);
//! anything not found there compiles to a global `SYM*`/`DEF*`/`ASN*`
//! reference, resolved by the symbol table rather than by name at
//! runtime. Like the scanner and parser, compile errors accumulate in a
//! [`DiagnosticBag`] instead of aborting — a malformed function body
//! still lets the rest of the module compile.

use crate::ast::{
    strip_comment, AssignmentKind, BinaryOpKind, IterationControlKind, Lambda, NodeData,
    UnaryOpKind, VariableKind,
};
use crate::parser::Module;
use silk_core::object::{HeapObject, SilkFunction};
use silk_core::opcode::{Opcode, Width};
use silk_core::program::{Constant, Program};
use silk_core::value::Value;
use silk_core::{DiagnosticBag, Location};

/// One lexical local: its name and the scope depth it was declared at.
/// The stack slot a local lives in is simply its position in `locals`.
struct Local {
    name: String,
    depth: usize,
}

/// A single function's (or the top-level routine's) in-progress
/// instruction buffer and its lexical scope.
struct Target {
    bytes: Vec<u8>,
    locals: Vec<Local>,
    depth: usize,
    /// Byte offsets of pending `break`/`continue` jumps within the
    /// innermost enclosing loop, patched once that loop's body is done.
    loop_breaks: Vec<usize>,
    loop_continues: Vec<usize>,
}

impl Target {
    fn new() -> Self {
        Target {
            bytes: Vec::new(),
            locals: Vec::new(),
            depth: 0,
            loop_breaks: Vec::new(),
            loop_continues: Vec::new(),
        }
    }

    fn emit_op(&mut self, op: Opcode) {
        self.bytes.push(op as u8);
    }

    fn emit_operand(&mut self, family_for: fn(usize) -> Opcode, index: usize) {
        let op = family_for(index);
        self.bytes.push(op as u8);
        let width = op.operand_width().expect("family opcode always has a width");
        width.encode(index as u32, &mut self.bytes);
    }

    /// Emits a 2-byte-wide jump opcode with a placeholder offset,
    /// returning the byte offset of that placeholder for later patching.
    fn emit_jump(&mut self, op: Opcode) -> usize {
        self.bytes.push(op as u8);
        let at = self.bytes.len();
        Width::Two.encode(0, &mut self.bytes);
        at
    }

    /// Patches a previously emitted forward jump to land just after the
    /// current end of the buffer.
    fn patch_jump(&mut self, placeholder: usize) {
        let offset = (self.bytes.len() - (placeholder + Width::Two.bytes())) as u32;
        let patched = offset.to_be_bytes();
        self.bytes[placeholder] = patched[2];
        self.bytes[placeholder + 1] = patched[3];
    }

    /// Emits a backward jump to `target` (a byte offset already written).
    fn emit_backward_jump(&mut self, target: usize) {
        self.emit_op(Opcode::Jbw);
        let offset = (self.bytes.len() + Width::Two.bytes() - target) as u32;
        Width::Two.encode(offset, &mut self.bytes);
    }

    fn begin_scope(&mut self) {
        self.depth += 1;
    }

    fn end_scope(&mut self) {
        self.depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth > self.depth {
                self.locals.pop();
                self.emit_op(Opcode::Pop);
            } else {
                break;
            }
        }
    }

    fn declare_local(&mut self, name: String) -> usize {
        self.locals.push(Local { name, depth: self.depth });
        self.locals.len() - 1
    }

    fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|l| l.name == name)
    }
}

/// Constructs that are recognized syntactically but intentionally never
/// lowered: their declarations are parsed, but using them is a compile
/// error rather than a silent no-op.
const UNIMPLEMENTED_CONSTRUCTS: &str =
    "enum, obj, macro, match, circuit, and foreach are reserved but not yet implemented";

pub struct Compiler {
    program: Program,
    target: Target,
    func_targets: Vec<Target>,
    pub diagnostics: DiagnosticBag,
}

/// Compile a parsed [`Module`] into a [`Program`]. Diagnostics from
/// compilation are merged with any already present in `diagnostics`
/// (typically carried over from the scanner/parser stages).
pub fn compile(module: &Module, mut diagnostics: DiagnosticBag) -> (Program, DiagnosticBag) {
    let mut compiler = Compiler {
        program: Program::new(),
        target: Target::new(),
        func_targets: Vec::new(),
        diagnostics: DiagnosticBag::new(),
    };
    for item in &module.items {
        compiler.compile_item(item);
    }
    compiler.target.emit_op(Opcode::Fin);
    compiler.program.bytes = std::mem::take(&mut compiler.target.bytes);
    diagnostics.extend(compiler.diagnostics);
    (compiler.program, diagnostics)
}

impl Compiler {
    fn error(&mut self, location: Location, message: impl Into<String>) {
        self.diagnostics.error(location, message);
    }

    fn current(&mut self) -> &mut Target {
        self.func_targets.last_mut().unwrap_or(&mut self.target)
    }

    fn push_constant(&mut self, constant: Constant) -> usize {
        self.program.push_constant(constant)
    }

    fn compile_item(&mut self, node: &crate::ast::Node) {
        let node = strip_comment(node);
        match &node.data {
            NodeData::ModuleMain | NodeData::ModuleDeclaration { .. } => {}
            NodeData::ModuleImport { .. } => {
                // Module linking across files is not resolved by this
                // compiler (see `DESIGN.md` — open question).
            }
            NodeData::DeclarationFunction { name, lambda } => {
                self.compile_function_declaration(node.location, name, lambda);
            }
            NodeData::DeclarationEnum
            | NodeData::DeclarationObject
            | NodeData::DeclarationMacro => {
                self.error(node.location, UNIMPLEMENTED_CONSTRUCTS);
            }
            NodeData::DeclarationExternLibrary { children, .. } => {
                for child in children {
                    self.compile_item(child);
                }
            }
            NodeData::DeclarationExternFunction { name, .. } => {
                // Binding the symbol lets calls resolve; the FFI table
                // itself is wired up by the runtime's `ffi::bind`.
                self.program.symbols.intern(name);
            }
            _ => self.compile_statement(node),
        }
    }

    fn compile_function_declaration(
        &mut self,
        location: Location,
        name: &str,
        lambda: &Lambda,
    ) {
        let bytes = self.compile_lambda_body(lambda);
        let function = SilkFunction {
            name: name.to_string(),
            arity: lambda.params.len() as u8,
            bytes,
        };
        let index = self.push_constant(Constant::Object(HeapObject::Function(function)));
        self.current().emit_operand(Opcode::val_for, index);
        let sym = self.program.symbols.intern(name);
        self.current().emit_operand(Opcode::def_for, sym);
        let _ = location;
    }

    /// Compiles a lambda's body into its own self-contained instruction
    /// buffer, returning the raw bytes (the caller embeds them in a
    /// `Function` heap object). Parameters become the function's first
    /// locals, laid down by the calling convention before entry.
    fn compile_lambda_body(&mut self, lambda: &Lambda) -> Vec<u8> {
        let mut target = Target::new();
        for param in &lambda.params {
            target.declare_local(param.clone());
        }
        self.func_targets.push(target);
        for stmt in &lambda.body {
            self.compile_statement(stmt);
        }
        let mut target = self.func_targets.pop().unwrap();
        // A function whose body falls through without an explicit
        // `return` yields void, mirroring the VM's `RETV`/`RET` split.
        target.emit_op(Opcode::Vid);
        target.emit_op(Opcode::Retv);
        target.bytes
    }

    fn compile_statement(&mut self, node: &crate::ast::Node) {
        let node = strip_comment(node);
        let location = node.location;
        match &node.data {
            NodeData::StatementEmpty => {}
            NodeData::StatementExpression { child } => {
                self.compile_expression(child);
                self.current().emit_op(Opcode::Pop);
            }
            NodeData::StatementBlock { children } => {
                self.current().begin_scope();
                for child in children {
                    self.compile_statement(child);
                }
                self.current().end_scope();
            }
            NodeData::StatementVariable { name, init, kind } => {
                self.compile_expression(init);
                self.declare_binding(name, *kind);
            }
            NodeData::StatementConstant { name, init } => {
                self.compile_expression(init);
                self.declare_binding(name, VariableKind::Def);
            }
            NodeData::StatementReturn { value, .. } => {
                match value {
                    Some(expr) => {
                        self.compile_expression(expr);
                        self.current().emit_op(Opcode::Retv);
                    }
                    None => {
                        self.current().emit_op(Opcode::Vid);
                        self.current().emit_op(Opcode::Retv);
                    }
                }
            }
            NodeData::StatementIterationControl { kind } => {
                let placeholder = self.current().emit_jump(Opcode::Jmp);
                match kind {
                    IterationControlKind::Break => self.current().loop_breaks.push(placeholder),
                    IterationControlKind::Continue => {
                        self.current().loop_continues.push(placeholder)
                    }
                }
            }
            NodeData::StatementIf { cond, conseq, altern } => {
                self.compile_expression(cond);
                let else_jump = self.current().emit_jump(Opcode::Jpf);
                self.current().emit_op(Opcode::Pop);
                self.compile_statement(conseq);
                if let Some(altern) = altern {
                    let end_jump = self.current().emit_jump(Opcode::Jmp);
                    self.current().patch_jump(else_jump);
                    self.current().emit_op(Opcode::Pop);
                    self.compile_statement(altern);
                    self.current().patch_jump(end_jump);
                } else {
                    self.current().patch_jump(else_jump);
                    self.current().emit_op(Opcode::Pop);
                }
            }
            NodeData::StatementWhile { cond, body } => {
                self.compile_loop(None, Some(cond), None, body);
            }
            NodeData::StatementLoop { body } => {
                self.compile_loop(None, None, None, body);
            }
            NodeData::StatementFor { init, cond, incr, body } => {
                self.current().begin_scope();
                if let Some(init) = init {
                    self.compile_statement(init);
                }
                self.compile_loop(None, cond.as_deref(), incr.as_deref(), body);
                self.current().end_scope();
            }
            NodeData::StatementForeach { .. } => {
                self.error(location, UNIMPLEMENTED_CONSTRUCTS);
            }
            NodeData::StatementSwitch { label } => {
                // A bare `switch` value without arms is syntactically a
                // labeled no-op; arms are handled inside `circuit`.
                self.compile_expression(label);
                self.current().emit_op(Opcode::Pop);
            }
            NodeData::StatementCircuit { .. } | NodeData::StatementMatch => {
                self.error(location, UNIMPLEMENTED_CONSTRUCTS);
            }
            _ => {
                self.error(location, "expected a statement");
            }
        }
    }

    fn declare_binding(&mut self, name: &str, kind: VariableKind) {
        if self.func_targets.is_empty() && self.target.depth == 0 {
            // Top-level bindings are always globals, `let` included —
            // there is no enclosing frame for them to be local to.
            let _ = kind;
            let sym = self.program.symbols.intern(name);
            self.current().emit_operand(Opcode::def_for, sym);
        } else {
            self.current().declare_local(name.to_string());
            // The value is already on the stack in the slot the local
            // now names; nothing further to emit.
        }
    }

    /// Shared lowering for `while`, `loop`, and the `for` family: a
    /// back-edge to `cond`, a `JPF` out when false, `continue` targets
    /// land on the increment step (or the back-edge when there is none).
    fn compile_loop(
        &mut self,
        _label: Option<&str>,
        cond: Option<&crate::ast::Node>,
        incr: Option<&crate::ast::Node>,
        body: &crate::ast::Node,
    ) {
        let saved_breaks = std::mem::take(&mut self.current().loop_breaks);
        let saved_continues = std::mem::take(&mut self.current().loop_continues);

        let loop_start = self.current().bytes.len();
        let exit_jump = cond.map(|cond| {
            self.compile_expression(cond);
            let jump = self.current().emit_jump(Opcode::Jpf);
            self.current().emit_op(Opcode::Pop);
            jump
        });

        self.compile_statement(body);

        let continue_target = self.current().bytes.len();
        if let Some(incr) = incr {
            self.compile_expression(incr);
            self.current().emit_op(Opcode::Pop);
        }
        self.current().emit_backward_jump(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.current().patch_jump(exit_jump);
            self.current().emit_op(Opcode::Pop);
        }

        let breaks = std::mem::replace(&mut self.current().loop_breaks, saved_breaks);
        let continues = std::mem::replace(&mut self.current().loop_continues, saved_continues);
        for at in breaks {
            self.current().patch_jump(at);
        }
        // `continue` jumps were emitted as forward `JMP`s; retarget them
        // to land on the increment step by rewriting their operand as a
        // relative offset computed now that we know where that is.
        for at in continues {
            let offset = (continue_target as i64 - (at as i64 + Width::Two.bytes() as i64)).abs() as u32;
            let bytes = offset.to_be_bytes();
            self.current().bytes[at] = bytes[2];
            self.current().bytes[at + 1] = bytes[3];
        }
    }

    fn compile_expression(&mut self, node: &crate::ast::Node) {
        let node = strip_comment(node);
        let location = node.location;
        match &node.data {
            NodeData::ExpressionVoid => self.current().emit_op(Opcode::Vid),
            NodeData::ExpressionBool(true) => self.current().emit_op(Opcode::Tru),
            NodeData::ExpressionBool(false) => self.current().emit_op(Opcode::Fal),
            NodeData::ExpressionNat(n) => self.push_value(Value::Int(*n as i64)),
            NodeData::ExpressionInt(n) => self.push_value(Value::Int(*n)),
            NodeData::ExpressionReal(r) => self.push_value(Value::Real(*r)),
            NodeData::ExpressionRealKeyword(kw) => {
                use crate::ast::RealKeyword::*;
                self.current().emit_op(match kw {
                    Pi => Opcode::Pi,
                    Tau => Opcode::Tau,
                    Euler => Opcode::Eul,
                });
            }
            NodeData::ExpressionChar(c) => self.push_value(Value::Char(*c)),
            NodeData::ExpressionString { parsed, .. } => {
                let string = silk_core::object::SilkString::new(parsed.clone());
                let index = self.push_constant(Constant::Object(HeapObject::String(string)));
                self.current().emit_operand(Opcode::val_for, index);
            }
            NodeData::ExpressionIdentifier { name } => self.compile_identifier_load(location, name),
            NodeData::ExpressionTuple { children } | NodeData::ExpressionArray { children } => {
                for child in children {
                    self.compile_expression(child);
                }
                self.current().emit_op(Opcode::Arr);
                self.current().bytes.push(children.len() as u8);
            }
            NodeData::ExpressionVector { children } => {
                for child in children {
                    self.compile_expression(child);
                }
                self.current().emit_op(Opcode::Vec);
                self.current().bytes.push(children.len() as u8);
            }
            NodeData::ExpressionDictionary { pairs } => {
                for (key, value) in pairs {
                    self.compile_dictionary_key(key);
                    self.compile_expression(value);
                }
                self.current().emit_op(Opcode::Dct);
                self.current().bytes.push(pairs.len() as u8);
            }
            NodeData::ExpressionUnaryOp { child, kind } => {
                self.compile_expression(child);
                self.current().emit_op(match kind {
                    UnaryOpKind::Not => Opcode::Not,
                    UnaryOpKind::Neg => Opcode::Neg,
                });
            }
            NodeData::ExpressionBinaryOp { left, right, kind } => {
                self.compile_binary_op(location, left, right, *kind);
            }
            NodeData::ExpressionRange { left, right } => {
                // Ranges are lowered as a two-element array; the runtime
                // iteration protocol (`foreach`) that would consume them
                // natively is not implemented (see `DESIGN.md`).
                self.compile_expression(left);
                self.compile_expression(right);
                self.current().emit_op(Opcode::Arr);
                self.current().bytes.push(2);
            }
            NodeData::ExpressionAssignment { assignee, child, kind } => {
                self.compile_assignment(location, assignee, child, *kind);
            }
            NodeData::ExpressionCall { callee, args } => {
                for arg in args {
                    self.compile_expression(arg);
                }
                self.compile_expression(callee);
                self.current().emit_op(Opcode::Cal);
                self.current().bytes.push(args.len() as u8);
            }
            NodeData::ExpressionLambda(lambda) => {
                let bytes = self.compile_lambda_body(lambda);
                let function = SilkFunction {
                    name: "<lambda>".to_string(),
                    arity: lambda.params.len() as u8,
                    bytes,
                };
                let index = self.push_constant(Constant::Object(HeapObject::Function(function)));
                self.current().emit_operand(Opcode::val_for, index);
            }
            NodeData::ExpressionContinuation => {
                self.error(location, "continuation expressions are not implemented");
                self.current().emit_op(Opcode::Vid);
            }
            _ => {
                self.error(location, "expected an expression");
                self.current().emit_op(Opcode::Vid);
            }
        }
    }

    fn push_value(&mut self, value: Value) {
        let index = self.push_constant(Constant::Value(value));
        self.current().emit_operand(Opcode::val_for, index);
    }

    /// A dictionary literal's key is compiled as a value expression
    /// except when it is a bare identifier, which is treated as a
    /// literal string key (mirrors `.`-style member access).
    fn compile_dictionary_key(&mut self, key: &crate::ast::Node) {
        let key = strip_comment(key);
        if let NodeData::ExpressionIdentifier { name } = &key.data {
            let string = silk_core::object::SilkString::new(name.clone());
            let index = self.push_constant(Constant::Object(HeapObject::String(string)));
            self.current().emit_operand(Opcode::val_for, index);
        } else {
            self.compile_expression(key);
        }
    }

    fn compile_binary_op(
        &mut self,
        location: Location,
        left: &crate::ast::Node,
        right: &crate::ast::Node,
        kind: BinaryOpKind,
    ) {
        match kind {
            BinaryOpKind::And => {
                self.compile_expression(left);
                let short_circuit = self.current().emit_jump(Opcode::Jpf);
                self.current().emit_op(Opcode::Pop);
                self.compile_expression(right);
                self.current().patch_jump(short_circuit);
                return;
            }
            BinaryOpKind::Or => {
                self.compile_expression(left);
                let short_circuit = self.current().emit_jump(Opcode::Jpt);
                self.current().emit_op(Opcode::Pop);
                self.compile_expression(right);
                self.current().patch_jump(short_circuit);
                return;
            }
            BinaryOpKind::Index => {
                self.compile_expression(left);
                self.compile_dictionary_key(right);
                self.current().emit_op(Opcode::Idx);
                return;
            }
            _ => {}
        }
        self.compile_expression(left);
        self.compile_expression(right);
        let op = match kind {
            BinaryOpKind::Add => Opcode::Add,
            BinaryOpKind::Sub => Opcode::Sub,
            BinaryOpKind::Mul => Opcode::Mul,
            BinaryOpKind::Div => Opcode::Div,
            BinaryOpKind::FloorDiv => Opcode::Riv,
            BinaryOpKind::Mod => Opcode::Mod,
            BinaryOpKind::Pow => Opcode::Pow,
            BinaryOpKind::Eq => Opcode::Eq,
            BinaryOpKind::Neq => Opcode::Neq,
            BinaryOpKind::Gt => Opcode::Gt,
            BinaryOpKind::Gte => Opcode::Gte,
            BinaryOpKind::Lt => Opcode::Lt,
            BinaryOpKind::Lte => Opcode::Lte,
            BinaryOpKind::Merge => Opcode::Mrg,
            BinaryOpKind::And | BinaryOpKind::Or | BinaryOpKind::Index => unreachable!(),
        };
        self.current().emit_op(op);
        let _ = location;
    }

    fn compile_identifier_load(&mut self, _location: Location, name: &str) {
        if let Some(slot) = self.current().resolve_local(name) {
            self.current().emit_op(Opcode::Psh);
            Width::Two.encode(slot as u32, &mut self.current().bytes);
        } else {
            let sym = self.program.symbols.intern(name);
            self.current().emit_operand(Opcode::sym_for, sym);
        }
    }

    fn compile_assignment(
        &mut self,
        location: Location,
        assignee: &crate::ast::Node,
        value: &crate::ast::Node,
        kind: AssignmentKind,
    ) {
        let assignee = strip_comment(assignee);
        let NodeData::ExpressionIdentifier { name } = &assignee.data else {
            self.error(location, "assignment target must be a name");
            self.compile_expression(value);
            return;
        };
        if kind != AssignmentKind::Assign {
            self.compile_identifier_load(location, name);
            self.compile_expression(value);
            let op = match kind {
                AssignmentKind::AddAssign => Opcode::Add,
                AssignmentKind::SubAssign => Opcode::Sub,
                AssignmentKind::MulAssign => Opcode::Mul,
                AssignmentKind::DivAssign => Opcode::Div,
                AssignmentKind::FloorDivAssign => Opcode::Riv,
                AssignmentKind::PowAssign => Opcode::Pow,
                AssignmentKind::Assign => unreachable!(),
            };
            self.current().emit_op(op);
        } else {
            self.compile_expression(value);
        }
        self.store_identifier(name);
    }

    fn store_identifier(&mut self, name: &str) {
        if let Some(slot) = self.current().resolve_local(name) {
            self.current().emit_op(Opcode::Str);
            Width::Two.encode(slot as u32, &mut self.current().bytes);
        } else {
            let sym = self.program.symbols.intern(name);
            self.current().emit_operand(Opcode::asn_for, sym);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_source(source: &str) -> Program {
        let (module, diagnostics) = parse(source);
        let (program, diagnostics) = compile(&module, diagnostics);
        assert!(
            !diagnostics.has_errors(),
            "unexpected errors: {:?}",
            diagnostics.iter().collect::<Vec<_>>()
        );
        program
    }

    #[test]
    fn arithmetic_expression_statement_ends_in_fin() {
        let program = compile_source("main;\n1 + 2;");
        assert_eq!(*program.bytes.last().unwrap(), Opcode::Fin as u8);
    }

    #[test]
    fn function_declaration_binds_a_global_symbol() {
        let program = compile_source("main;\nfun square(x) => x * x;");
        assert_eq!(program.symbols.find("square"), Some(0));
        assert_eq!(program.rodata.len(), 1);
        assert!(matches!(
            &program.rodata[0],
            Constant::Object(HeapObject::Function(f)) if f.name == "square" && f.arity == 1
        ));
    }

    #[test]
    fn while_loop_emits_a_backward_jump() {
        let program = compile_source("main;\ndef n = 0;\nwhile (n < 3) { n += 1; }");
        assert!(program.bytes.contains(&(Opcode::Jbw as u8)));
        assert!(program.bytes.contains(&(Opcode::Jpf as u8)));
    }

    #[test]
    fn short_circuit_and_emits_exactly_one_jpf() {
        let program = compile_source("main;\nfalse and true;");
        let jpf_count = program.bytes.iter().filter(|&&b| b == Opcode::Jpf as u8).count();
        assert_eq!(jpf_count, 1);
    }

    #[test]
    fn unimplemented_constructs_are_rejected() {
        let (module, diagnostics) = parse("main;\nenum Color { }");
        let (_, diagnostics) = compile(&module, diagnostics);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn string_concatenation_interns_two_constants() {
        let program = compile_source("main;\n'foo' + 'bar';");
        assert_eq!(program.rodata.len(), 2);
    }
}
