//! Syntax-tree JSON serializer
//!
//! One `serde_json::Value` object per tree node: a lowercase `"kind"`
//! discriminator (the `NodeData` variant name, snake_cased) plus the
//! variant's own fields flattened alongside it, and a nested
//! `"location"` object. No intermediate `serde::Serialize` derive is
//! used — the tree's `Box`/`Vec` shape doesn't map cleanly onto one,
//! and the discriminator naming (`"kind":"break"`, not
//! `"kind":"Break"` or `"kind":"StatementIterationControl"`) needs
//! hand control anyway.

use crate::ast::{
    AssignmentKind, BinaryOpKind, CommentPlacement, IterationControlKind, Lambda, Node, NodeData,
    RealKeyword, UnaryOpKind, VariableKind,
};
use crate::parser::Module;
use serde_json::{json, Value};

pub fn module_to_json(module: &Module) -> Value {
    json!({
        "path": module.path,
        "items": module.items.iter().map(node_to_json).collect::<Vec<_>>(),
    })
}

fn location_json(node: &Node) -> Value {
    json!({ "line": node.location.line, "column": node.location.column })
}

fn node_to_json(node: &Node) -> Value {
    let location = location_json(node);
    let mut value = match &node.data {
        NodeData::ModuleMain => json!({ "kind": "main" }),
        NodeData::ModuleDeclaration { path } => json!({ "kind": "module", "path": path }),
        NodeData::ModuleImport { name, imports } => {
            json!({ "kind": "import", "name": name, "imports": imports })
        }

        NodeData::DeclarationFunction { name, lambda } => {
            json!({ "kind": "function", "name": name, "lambda": lambda_to_json(lambda) })
        }
        NodeData::DeclarationEnum => json!({ "kind": "enum" }),
        NodeData::DeclarationObject => json!({ "kind": "object" }),
        NodeData::DeclarationExternLibrary { name, children } => json!({
            "kind": "extern_library",
            "name": name,
            "children": children.iter().map(node_to_json).collect::<Vec<_>>(),
        }),
        NodeData::DeclarationExternFunction {
            name,
            params,
            ret_type,
        } => json!({
            "kind": "extern_function",
            "name": name,
            "params": params,
            "ret_type": ret_type,
        }),
        NodeData::DeclarationMacro => json!({ "kind": "macro" }),

        NodeData::StatementEmpty => json!({ "kind": "empty" }),
        NodeData::StatementExpression { child } => {
            json!({ "kind": "expression_statement", "child": node_to_json(child) })
        }
        NodeData::StatementBlock { children } => json!({
            "kind": "block",
            "children": children.iter().map(node_to_json).collect::<Vec<_>>(),
        }),
        NodeData::StatementCircuit {
            default_switch,
            labels,
        } => json!({
            "kind": "circuit",
            "default_switch": default_switch.as_deref().map(node_to_json),
            "labels": labels.iter().map(node_to_json).collect::<Vec<_>>(),
        }),
        NodeData::StatementVariable { name, init, kind } => json!({
            "kind": "variable",
            "name": name,
            "init": node_to_json(init),
            "variable_kind": variable_kind_str(*kind),
        }),
        NodeData::StatementConstant { name, init } => json!({
            "kind": "constant",
            "name": name,
            "init": node_to_json(init),
        }),
        NodeData::StatementReturn {
            continuation,
            value,
        } => json!({
            "kind": "return",
            "continuation": continuation.as_deref().map(node_to_json),
            "value": value.as_deref().map(node_to_json),
        }),
        NodeData::StatementSwitch { label } => json!({ "kind": "switch", "label": node_to_json(label) }),
        NodeData::StatementIterationControl { kind } => json!({
            "kind": match kind {
                IterationControlKind::Break => "break",
                IterationControlKind::Continue => "continue",
            },
        }),
        NodeData::StatementIf {
            cond,
            conseq,
            altern,
        } => json!({
            "kind": "if",
            "cond": node_to_json(cond),
            "conseq": node_to_json(conseq),
            "altern": altern.as_deref().map(node_to_json),
        }),
        NodeData::StatementWhile { cond, body } => json!({
            "kind": "while",
            "cond": node_to_json(cond),
            "body": node_to_json(body),
        }),
        NodeData::StatementLoop { body } => json!({ "kind": "loop", "body": node_to_json(body) }),
        NodeData::StatementFor {
            init,
            cond,
            incr,
            body,
        } => json!({
            "kind": "for",
            "init": init.as_deref().map(node_to_json),
            "cond": cond.as_deref().map(node_to_json),
            "incr": incr.as_deref().map(node_to_json),
            "body": node_to_json(body),
        }),
        NodeData::StatementForeach {
            iter_kind,
            iter,
            collection,
            body,
        } => json!({
            "kind": "foreach",
            "iter_kind": variable_kind_str(*iter_kind),
            "iter": iter,
            "collection": node_to_json(collection),
            "body": node_to_json(body),
        }),
        NodeData::StatementMatch => json!({ "kind": "match" }),

        NodeData::ExpressionIdentifier { name } => json!({ "kind": "identifier", "name": name }),
        NodeData::ExpressionVoid => json!({ "kind": "void" }),
        NodeData::ExpressionContinuation => json!({ "kind": "continuation" }),
        NodeData::ExpressionBool(b) => json!({ "kind": "bool", "value": b }),
        NodeData::ExpressionNat(n) => json!({ "kind": "nat", "value": n }),
        NodeData::ExpressionInt(n) => json!({ "kind": "int", "value": n }),
        NodeData::ExpressionReal(r) => json!({ "kind": "real", "value": r }),
        NodeData::ExpressionRealKeyword(k) => json!({
            "kind": "real_keyword",
            "value": match k {
                RealKeyword::Pi => "pi",
                RealKeyword::Tau => "tau",
                RealKeyword::Euler => "euler",
            },
        }),
        NodeData::ExpressionChar(c) => json!({ "kind": "char", "value": c.to_string() }),
        NodeData::ExpressionString { raw, parsed } => json!({
            "kind": "string",
            "raw": raw,
            "parsed": parsed,
        }),
        NodeData::ExpressionTuple { children } => json!({
            "kind": "tuple",
            "children": children.iter().map(node_to_json).collect::<Vec<_>>(),
        }),
        NodeData::ExpressionUnaryOp { child, kind } => json!({
            "kind": "unary_op",
            "op": match kind {
                UnaryOpKind::Not => "not",
                UnaryOpKind::Neg => "neg",
            },
            "child": node_to_json(child),
        }),
        NodeData::ExpressionBinaryOp { left, right, kind } => json!({
            "kind": "binary_op",
            "op": binary_op_str(*kind),
            "left": node_to_json(left),
            "right": node_to_json(right),
        }),
        NodeData::ExpressionRange { left, right } => json!({
            "kind": "range",
            "left": node_to_json(left),
            "right": node_to_json(right),
        }),
        NodeData::ExpressionVector { children } => json!({
            "kind": "vector",
            "children": children.iter().map(node_to_json).collect::<Vec<_>>(),
        }),
        NodeData::ExpressionArray { children } => json!({
            "kind": "array",
            "children": children.iter().map(node_to_json).collect::<Vec<_>>(),
        }),
        NodeData::ExpressionDictionary { pairs } => json!({
            "kind": "dictionary",
            "pairs": pairs
                .iter()
                .map(|(k, v)| json!({ "key": node_to_json(k), "value": node_to_json(v) }))
                .collect::<Vec<_>>(),
        }),
        NodeData::ExpressionAssignment {
            assignee,
            child,
            kind,
        } => json!({
            "kind": "assignment",
            "op": assignment_op_str(*kind),
            "assignee": node_to_json(assignee),
            "child": node_to_json(child),
        }),
        NodeData::ExpressionCall { callee, args } => json!({
            "kind": "call",
            "callee": node_to_json(callee),
            "args": args.iter().map(node_to_json).collect::<Vec<_>>(),
        }),
        NodeData::ExpressionLambda(lambda) => json!({
            "kind": "lambda",
            "lambda": lambda_to_json(lambda),
        }),

        NodeData::Comment {
            placement,
            text,
            child,
        } => json!({
            "kind": "comment",
            "placement": match placement {
                CommentPlacement::Before => "before",
                CommentPlacement::After => "after",
            },
            "text": text,
            "child": node_to_json(child),
        }),
    };
    value["location"] = location;
    value
}

fn lambda_to_json(lambda: &Lambda) -> Value {
    json!({
        "params": lambda.params,
        "body": lambda.body.iter().map(node_to_json).collect::<Vec<_>>(),
    })
}

fn variable_kind_str(kind: VariableKind) -> &'static str {
    match kind {
        VariableKind::Let => "let",
        VariableKind::Def => "def",
    }
}

fn binary_op_str(kind: BinaryOpKind) -> &'static str {
    use BinaryOpKind::*;
    match kind {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        Div => "div",
        FloorDiv => "floor_div",
        Mod => "mod",
        Pow => "pow",
        And => "and",
        Or => "or",
        Eq => "eq",
        Neq => "neq",
        Lt => "lt",
        Lte => "lte",
        Gt => "gt",
        Gte => "gte",
        Merge => "merge",
        Index => "index",
    }
}

fn assignment_op_str(kind: AssignmentKind) -> &'static str {
    use AssignmentKind::*;
    match kind {
        Assign => "assign",
        AddAssign => "add_assign",
        SubAssign => "sub_assign",
        DivAssign => "div_assign",
        FloorDivAssign => "floor_div_assign",
        MulAssign => "mul_assign",
        PowAssign => "pow_assign",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn every_top_level_item_serializes_with_a_kind_discriminator() {
        let (module, diagnostics) = parse("main;\ndef n = 10;\nbreak;");
        assert!(!diagnostics.has_errors());
        let value = module_to_json(&module);
        let items = value["items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["kind"], "main");
        assert_eq!(items[1]["kind"], "variable");
        assert_eq!(items[2]["kind"], "break");
    }

    #[test]
    fn nested_binary_expression_carries_its_operator_name() {
        let (module, diagnostics) = parse("main;\n1 + 2 * 3;");
        assert!(!diagnostics.has_errors());
        let value = module_to_json(&module);
        let expr = &value["items"][1]["child"];
        assert_eq!(expr["kind"], "binary_op");
        assert_eq!(expr["op"], "add");
        assert_eq!(expr["right"]["op"], "mul");
    }
}
