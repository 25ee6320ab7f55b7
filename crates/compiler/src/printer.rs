//! Syntax-tree pretty-printer
//!
//! Renders a parsed [`crate::parser::Module`] back to Silk source text:
//! one handler per `NodeData` variant, matching the tagged-union
//! design the tree itself uses. This is the reverse of parsing, not a
//! formatter tuned for a particular house style — round-tripping
//! reformats numeric literals to their canonical spelling and drops
//! redundant parenthesization, since precedence is reconstructed from
//! the tree rather than preserved from source text.

use crate::ast::{
    AssignmentKind, BinaryOpKind, CommentPlacement, Lambda, Node, NodeData, RealKeyword,
    UnaryOpKind, VariableKind,
};
use crate::parser::Module;

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    if let Some(path) = &module.path {
        out.push_str(&format!("pkg '{path}';\n"));
    }
    let mut printer = Printer { out: &mut out, depth: 0 };
    for item in &module.items {
        printer.print_item(item);
    }
    out
}

struct Printer<'a> {
    out: &'a mut String,
    depth: usize,
}

impl Printer<'_> {
    fn indent(&mut self) {
        self.out.push_str(&"  ".repeat(self.depth));
    }

    fn print_item(&mut self, node: &Node) {
        self.indent();
        self.print_node(node);
        if needs_trailing_semicolon(&node.data) {
            self.out.push(';');
        }
        self.out.push('\n');
    }

    fn print_node(&mut self, node: &Node) {
        match &node.data {
            NodeData::ModuleMain => self.out.push_str("main"),
            NodeData::ModuleDeclaration { path } => self.out.push_str(&format!("pkg '{path}'")),
            NodeData::ModuleImport { name, imports } => {
                self.out.push_str(&format!("use '{name}'"));
                if !imports.is_empty() {
                    self.out.push_str(&format!(" {{ {} }}", imports.join(", ")));
                }
            }

            NodeData::DeclarationFunction { name, lambda } => {
                self.out.push_str(&format!("fun {name}"));
                self.print_lambda(lambda);
            }
            NodeData::DeclarationEnum => self.out.push_str("enum"),
            NodeData::DeclarationObject => self.out.push_str("obj"),
            NodeData::DeclarationExternLibrary { name, children } => {
                self.out.push_str(&format!("dll '{name}' {{\n"));
                self.depth += 1;
                for child in children {
                    self.print_item(child);
                }
                self.depth -= 1;
                self.indent();
                self.out.push('}');
            }
            NodeData::DeclarationExternFunction {
                name,
                params,
                ret_type,
            } => {
                self.out.push_str(&format!("fun {name}({})", params.join(", ")));
                if let Some(ret) = ret_type {
                    self.out.push_str(&format!(" :: {ret}"));
                }
            }
            NodeData::DeclarationMacro => self.out.push_str("macro"),

            NodeData::StatementEmpty => {}
            NodeData::StatementExpression { child } => self.print_node(child),
            NodeData::StatementBlock { children } => {
                self.out.push_str("{\n");
                self.depth += 1;
                for child in children {
                    self.print_item(child);
                }
                self.depth -= 1;
                self.indent();
                self.out.push('}');
            }
            NodeData::StatementCircuit { .. } => self.out.push_str("circuit { }"),
            NodeData::StatementVariable { name, init, kind } => {
                let keyword = match kind {
                    VariableKind::Let => "let",
                    VariableKind::Def => "def",
                };
                self.out.push_str(&format!("{keyword} {name} = "));
                self.print_node(init);
            }
            NodeData::StatementConstant { name, init } => {
                self.out.push_str(&format!("const {name} = "));
                self.print_node(init);
            }
            NodeData::StatementReturn { value, .. } => {
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.print_node(value);
                }
            }
            NodeData::StatementSwitch { label } => {
                self.out.push_str("switch ");
                self.print_node(label);
            }
            NodeData::StatementIterationControl { kind } => {
                use crate::ast::IterationControlKind::*;
                self.out.push_str(match kind {
                    Break => "break",
                    Continue => "continue",
                });
            }
            NodeData::StatementIf {
                cond,
                conseq,
                altern,
            } => {
                self.out.push_str("if (");
                self.print_node(cond);
                self.out.push_str(") ");
                self.print_node(conseq);
                if let Some(altern) = altern {
                    self.out.push_str(" else ");
                    self.print_node(altern);
                }
            }
            NodeData::StatementWhile { cond, body } => {
                self.out.push_str("while (");
                self.print_node(cond);
                self.out.push_str(") ");
                self.print_node(body);
            }
            NodeData::StatementLoop { body } => {
                self.out.push_str("loop ");
                self.print_node(body);
            }
            NodeData::StatementFor {
                init,
                cond,
                incr,
                body,
            } => {
                self.out.push_str("for (");
                if let Some(init) = init {
                    self.print_node(init);
                }
                self.out.push_str("; ");
                if let Some(cond) = cond {
                    self.print_node(cond);
                }
                self.out.push_str("; ");
                if let Some(incr) = incr {
                    self.print_node(incr);
                }
                self.out.push_str(") ");
                self.print_node(body);
            }
            NodeData::StatementForeach {
                iter_kind,
                iter,
                collection,
                body,
            } => {
                let keyword = match iter_kind {
                    VariableKind::Let => "let",
                    VariableKind::Def => "def",
                };
                self.out.push_str(&format!("foreach ({keyword} {iter} in "));
                self.print_node(collection);
                self.out.push_str(") ");
                self.print_node(body);
            }
            NodeData::StatementMatch => self.out.push_str("match"),

            NodeData::ExpressionIdentifier { name } => self.out.push_str(name),
            NodeData::ExpressionVoid => self.out.push_str("void"),
            NodeData::ExpressionContinuation => self.out.push_str("continue"),
            NodeData::ExpressionBool(b) => self.out.push_str(&b.to_string()),
            NodeData::ExpressionNat(n) => self.out.push_str(&n.to_string()),
            NodeData::ExpressionInt(n) => self.out.push_str(&n.to_string()),
            NodeData::ExpressionReal(r) => self.out.push_str(&r.to_string()),
            NodeData::ExpressionRealKeyword(k) => self.out.push_str(match k {
                RealKeyword::Pi => "pi",
                RealKeyword::Tau => "tau",
                RealKeyword::Euler => "euler",
            }),
            NodeData::ExpressionChar(c) => self.out.push_str(&format!("\"{c}")),
            NodeData::ExpressionString { parsed, .. } => {
                self.out.push_str(&format!("'{parsed}'"));
            }
            NodeData::ExpressionTuple { children } => {
                self.out.push('(');
                self.print_comma_separated(children);
                self.out.push(')');
            }
            NodeData::ExpressionUnaryOp { child, kind } => {
                self.out.push_str(match kind {
                    UnaryOpKind::Not => "not ",
                    UnaryOpKind::Neg => "-",
                });
                self.print_node(child);
            }
            NodeData::ExpressionBinaryOp { left, right, kind } => {
                self.print_node(left);
                self.out.push_str(&format!(" {} ", binary_op_symbol(*kind)));
                self.print_node(right);
            }
            NodeData::ExpressionRange { left, right } => {
                self.print_node(left);
                self.out.push_str("..");
                self.print_node(right);
            }
            NodeData::ExpressionVector { children } => {
                self.out.push('<');
                self.print_comma_separated(children);
                self.out.push('>');
            }
            NodeData::ExpressionArray { children } => {
                self.out.push('[');
                self.print_comma_separated(children);
                self.out.push(']');
            }
            NodeData::ExpressionDictionary { pairs } => {
                self.out.push_str("#{");
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.print_node(key);
                    self.out.push_str(": ");
                    self.print_node(value);
                }
                self.out.push('}');
            }
            NodeData::ExpressionAssignment {
                assignee,
                child,
                kind,
            } => {
                self.print_node(assignee);
                self.out.push_str(&format!(" {} ", assignment_op_symbol(*kind)));
                self.print_node(child);
            }
            NodeData::ExpressionCall { callee, args } => {
                self.print_node(callee);
                self.out.push('(');
                self.print_comma_separated(args);
                self.out.push(')');
            }
            NodeData::ExpressionLambda(lambda) => {
                self.out.push_str("fun");
                self.print_lambda(lambda);
            }

            NodeData::Comment {
                placement,
                text,
                child,
            } => match placement {
                CommentPlacement::Before => {
                    self.out.push_str(&format!("# {text}\n"));
                    self.indent();
                    self.print_node(child);
                }
                CommentPlacement::After => {
                    self.print_node(child);
                    self.out.push_str(&format!(" # {text}"));
                }
            },
        }
    }

    fn print_lambda(&mut self, lambda: &Lambda) {
        self.out.push('(');
        self.out.push_str(&lambda.params.join(", "));
        self.out.push(')');
        // `fun f(x) => expr;` desugars to a body of one implicit
        // `return expr` statement; reproduce the arrow form rather than
        // printing the desugared `return`.
        match lambda.body.as_slice() {
            [Node {
                data:
                    NodeData::StatementReturn {
                        continuation: None,
                        value: Some(value),
                    },
                ..
            }] => {
                self.out.push_str(" => ");
                self.print_node(value);
                self.out.push(';');
            }
            _ => {
                self.out.push_str(" {\n");
                self.depth += 1;
                for statement in &lambda.body {
                    self.print_item(statement);
                }
                self.depth -= 1;
                self.indent();
                self.out.push('}');
            }
        }
    }

    fn print_comma_separated(&mut self, nodes: &[Node]) {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.print_node(node);
        }
    }
}

fn binary_op_symbol(kind: BinaryOpKind) -> &'static str {
    use BinaryOpKind::*;
    match kind {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        FloorDiv => "//",
        Mod => "%",
        Pow => "**",
        And => "and",
        Or => "or",
        Eq => "==",
        Neq => "!=",
        Lt => "<",
        Lte => "<=",
        Gt => ">",
        Gte => ">=",
        Merge => "|",
        Index => ".",
    }
}

fn assignment_op_symbol(kind: AssignmentKind) -> &'static str {
    use AssignmentKind::*;
    match kind {
        Assign => "=",
        AddAssign => "+=",
        SubAssign => "-=",
        DivAssign => "/=",
        FloorDivAssign => "//=",
        MulAssign => "*=",
        PowAssign => "**=",
    }
}

/// Statements that parse with a trailing `;` get one back; block-shaped
/// forms (`if`, `while`, blocks, function declarations with a `{ }`
/// body) don't need it, matching how the parser doesn't require one
/// after them either.
fn needs_trailing_semicolon(data: &NodeData) -> bool {
    !matches!(
        data,
        NodeData::StatementBlock { .. }
            | NodeData::StatementIf { .. }
            | NodeData::StatementWhile { .. }
            | NodeData::StatementLoop { .. }
            | NodeData::StatementFor { .. }
            | NodeData::StatementForeach { .. }
            | NodeData::DeclarationExternLibrary { .. }
            | NodeData::DeclarationFunction { .. }
            | NodeData::StatementEmpty
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn printing_a_simple_module_reproduces_equivalent_statements() {
        let (module, diagnostics) = parse("main;\ndef n = 10;\nn + 1;");
        assert!(!diagnostics.has_errors());
        let printed = print_module(&module);
        assert!(printed.contains("main;"));
        assert!(printed.contains("def n = 10;"));
        assert!(printed.contains("n + 1;"));
    }

    #[test]
    fn reparsing_the_printed_output_yields_an_equivalent_tree() {
        let (module, diagnostics) = parse("main;\nfun square(x) => x * x;\nsquare(7);");
        assert!(!diagnostics.has_errors());
        let printed = print_module(&module);
        let (reparsed, reparsed_diagnostics) = parse(&printed);
        assert!(!reparsed_diagnostics.has_errors());
        assert_eq!(reparsed.items.len(), module.items.len());
    }
}
