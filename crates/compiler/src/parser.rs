//! The Pratt parser
//!
//! Recursively descends through declaration → statement → expression by
//! inspecting the current token's kind; expressions use precedence
//! climbing (see [`crate::precedence`]). On an error inside a
//! declaration or statement, the parser consumes tokens until the next
//! `;` and resumes — a later stage still runs on the partial result.

use crate::ast::*;
use crate::precedence::Precedence;
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};
use silk_core::{DiagnosticBag, Location};

/// A parsed module: an optional `pkg` path declaration plus its
/// top-level declarations and statements, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub path: Option<String>,
    pub items: Vec<Node>,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub diagnostics: DiagnosticBag,
}

/// Parse a complete source file into a [`Module`]. Always returns a
/// module, even on error — diagnostics accumulate in the returned bag
/// rather than aborting the parse.
pub fn parse(source: &str) -> (Module, DiagnosticBag) {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();
    loop {
        let tok = scanner.scan();
        let end = tok.is_end();
        tokens.push(tok);
        if end {
            break;
        }
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        diagnostics: scanner.diagnostics,
    };
    let module = parser.parse_module();
    (module, parser.diagnostics)
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn location(&self) -> Location {
        self.peek().location
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Token {
        if self.check(kind) {
            self.advance()
        } else {
            self.error(message);
            self.peek().clone()
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.diagnostics.error(self.location(), message);
    }

    /// Error recovery: consume tokens until the next `;` (consuming it
    /// too) or `END`, then resume parsing.
    fn synchronize(&mut self) {
        while !self.check(TokenKind::End) {
            if self.check(TokenKind::Semicolon) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn at_end(&self) -> bool {
        self.check(TokenKind::End)
    }

    // ---- Module ----

    fn parse_module(&mut self) -> Module {
        let mut path = None;
        let mut items = Vec::new();
        while !self.at_end() {
            if self.check(TokenKind::Pkg) && path.is_none() && items.is_empty() {
                path = self.parse_pkg_declaration();
                continue;
            }
            let before = self.pos;
            items.push(self.parse_item());
            if self.pos == before {
                // Safety valve: a prefix parser that couldn't make sense
                // of the current token still must not stall the loop.
                self.synchronize();
            }
        }
        Module { path, items }
    }

    fn parse_pkg_declaration(&mut self) -> Option<String> {
        let location = self.location();
        self.advance(); // 'pkg'
        let name_tok = self.expect(TokenKind::String, "expected a package path string");
        self.expect(TokenKind::Semicolon, "expected ';' after package declaration");
        let _ = location;
        Some(unquote_string(&name_tok.lexeme))
    }

    fn parse_item(&mut self) -> Node {
        let location = self.location();
        let data = match self.peek_kind() {
            TokenKind::Main => {
                self.advance();
                self.expect(TokenKind::Semicolon, "expected ';' after 'main'");
                NodeData::ModuleMain
            }
            TokenKind::Use => self.parse_use(),
            TokenKind::Fun => self.parse_function_declaration(),
            TokenKind::Enum => self.parse_enum_declaration(),
            TokenKind::Obj => self.parse_object_declaration(),
            TokenKind::Dll => self.parse_extern_library(),
            TokenKind::Macro => self.parse_macro_declaration(),
            _ => return self.parse_statement(),
        };
        Node::new(location, data)
    }

    fn parse_use(&mut self) -> NodeData {
        self.advance(); // 'use'
        let name_tok = self.expect(TokenKind::String, "expected a module name string");
        let mut imports = Vec::new();
        if self.matches(TokenKind::LBrace) {
            if !self.check(TokenKind::RBrace) {
                loop {
                    let ident = self.expect(TokenKind::Identifier, "expected an imported name");
                    imports.push(ident.lexeme);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RBrace, "expected '}' after import list");
        }
        self.expect(TokenKind::Semicolon, "expected ';' after use declaration");
        NodeData::ModuleImport {
            name: unquote_string(&name_tok.lexeme),
            imports,
        }
    }

    fn parse_function_declaration(&mut self) -> NodeData {
        self.advance(); // 'fun'
        let name = self
            .expect(TokenKind::Identifier, "expected a function name")
            .lexeme;
        let lambda = self.parse_lambda_tail();
        NodeData::DeclarationFunction { name, lambda }
    }

    /// Parses `(params?) :: return_type? ( => expr ; | { block } )`,
    /// with `fun` (or a lambda literal's leading keyword) already consumed.
    fn parse_lambda_tail(&mut self) -> Lambda {
        self.expect(TokenKind::LParen, "expected '(' to start a parameter list");
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let name = self
                    .expect(TokenKind::Identifier, "expected a parameter name")
                    .lexeme;
                if self.matches(TokenKind::ColonColon) {
                    self.skip_type_annotation();
                }
                params.push(name);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after parameter list");
        if self.matches(TokenKind::ColonColon) {
            self.skip_type_annotation();
        }
        let body = if self.matches(TokenKind::FatArrow) {
            let expr = self.parse_expression(Precedence::Assignment);
            self.expect(TokenKind::Semicolon, "expected ';' after '=>' function body");
            vec![Node::new(
                expr.location,
                NodeData::StatementReturn {
                    continuation: None,
                    value: Some(Box::new(expr)),
                },
            )]
        } else {
            self.parse_block_body()
        };
        Lambda { params, body }
    }

    /// Type annotations are parsed and discarded everywhere they appear.
    fn skip_type_annotation(&mut self) {
        // A type name, optionally `[...]` or `(...)` qualified; we only
        // need to consume it, never interpret it.
        if self.check(TokenKind::Identifier) || self.check(TokenKind::Void) {
            self.advance();
        } else {
            self.error("expected a type annotation");
        }
    }

    fn parse_block_body(&mut self) -> Vec<Node> {
        self.expect(TokenKind::LBrace, "expected '{' to start a block");
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            statements.push(self.parse_statement());
        }
        self.expect(TokenKind::RBrace, "expected '}' to close a block");
        statements
    }

    /// `enum`, `obj`, and `macro` are reserved: the parser accepts their
    /// syntax (a name plus a brace-balanced body) but the compiler
    /// refuses to lower them (see `DESIGN.md`).
    fn parse_enum_declaration(&mut self) -> NodeData {
        self.advance(); // 'enum'
        self.expect(TokenKind::Identifier, "expected an enum name");
        self.skip_balanced_braces();
        NodeData::DeclarationEnum
    }

    fn parse_object_declaration(&mut self) -> NodeData {
        self.advance(); // 'obj'
        self.expect(TokenKind::Identifier, "expected an object name");
        self.skip_balanced_braces();
        NodeData::DeclarationObject
    }

    fn parse_macro_declaration(&mut self) -> NodeData {
        self.advance(); // 'macro'
        self.expect(TokenKind::Identifier, "expected a macro name");
        if self.matches(TokenKind::LParen) {
            while !self.check(TokenKind::RParen) && !self.at_end() {
                self.advance();
            }
            self.expect(TokenKind::RParen, "expected ')' after macro parameters");
        }
        self.skip_balanced_braces();
        NodeData::DeclarationMacro
    }

    fn parse_extern_library(&mut self) -> NodeData {
        self.advance(); // 'dll'
        let name = self
            .expect(TokenKind::String, "expected an external library path string")
            .lexeme;
        self.expect(TokenKind::LBrace, "expected '{' to start an extern block");
        let mut children = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            children.push(self.parse_extern_function());
        }
        self.expect(TokenKind::RBrace, "expected '}' to close an extern block");
        NodeData::DeclarationExternLibrary {
            name: unquote_string(&name),
            children,
        }
    }

    fn parse_extern_function(&mut self) -> Node {
        let location = self.location();
        self.expect(TokenKind::Fun, "expected 'fun' in an extern block");
        let name = self
            .expect(TokenKind::Identifier, "expected a function name")
            .lexeme;
        self.expect(TokenKind::LParen, "expected '(' to start a parameter list");
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let pname = self
                    .expect(TokenKind::Identifier, "expected a parameter name")
                    .lexeme;
                if self.matches(TokenKind::ColonColon) {
                    self.skip_type_annotation();
                }
                params.push(pname);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after parameter list");
        let ret_type = if self.matches(TokenKind::ColonColon) {
            let tok = self.peek().clone();
            self.skip_type_annotation();
            Some(tok.lexeme)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "expected ';' after extern function declaration");
        Node::new(
            location,
            NodeData::DeclarationExternFunction {
                name,
                params,
                ret_type,
            },
        )
    }

    fn skip_balanced_braces(&mut self) {
        self.expect(TokenKind::LBrace, "expected '{'");
        let mut depth = 1usize;
        while depth > 0 && !self.at_end() {
            match self.advance().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
        }
    }

    // ---- Statements ----

    fn parse_statement(&mut self) -> Node {
        let location = self.location();
        let data = match self.peek_kind() {
            TokenKind::Semicolon => {
                self.advance();
                NodeData::StatementEmpty
            }
            TokenKind::LBrace => NodeData::StatementBlock {
                children: self.parse_block_body(),
            },
            TokenKind::Let | TokenKind::Def => self.parse_variable_statement(),
            TokenKind::Const => self.parse_constant_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "expected ';' after 'break'");
                NodeData::StatementIterationControl {
                    kind: IterationControlKind::Break,
                }
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "expected ';' after 'continue'");
                NodeData::StatementIterationControl {
                    kind: IterationControlKind::Continue,
                }
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Loop => self.parse_loop_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Foreach => self.parse_foreach_statement(),
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Match => {
                self.parse_match_statement();
                NodeData::StatementMatch
            }
            TokenKind::Circuit => self.parse_circuit_statement(),
            _ => {
                let expr = self.parse_expression(Precedence::Assignment);
                self.expect(TokenKind::Semicolon, "expected ';' after expression statement");
                NodeData::StatementExpression {
                    child: Box::new(expr),
                }
            }
        };
        Node::new(location, data)
    }

    fn parse_variable_statement(&mut self) -> NodeData {
        let kind = if self.matches(TokenKind::Let) {
            VariableKind::Let
        } else {
            self.advance(); // 'def'
            VariableKind::Def
        };
        let name = self
            .expect(TokenKind::Identifier, "expected a variable name")
            .lexeme;
        if self.matches(TokenKind::ColonColon) {
            self.skip_type_annotation();
        }
        self.expect(TokenKind::Eq, "expected '=' in variable declaration");
        let init = self.parse_expression(Precedence::Assignment);
        self.expect(TokenKind::Semicolon, "expected ';' after variable declaration");
        NodeData::StatementVariable {
            name,
            init: Box::new(init),
            kind,
        }
    }

    fn parse_constant_statement(&mut self) -> NodeData {
        self.advance(); // 'const'
        let name = self
            .expect(TokenKind::Identifier, "expected a constant name")
            .lexeme;
        if self.matches(TokenKind::ColonColon) {
            self.skip_type_annotation();
        }
        self.expect(TokenKind::Eq, "expected '=' in constant declaration");
        let init = self.parse_expression(Precedence::Assignment);
        self.expect(TokenKind::Semicolon, "expected ';' after constant declaration");
        NodeData::StatementConstant {
            name,
            init: Box::new(init),
        }
    }

    fn parse_return_statement(&mut self) -> NodeData {
        self.advance(); // 'return'
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression(Precedence::Assignment)))
        };
        self.expect(TokenKind::Semicolon, "expected ';' after return statement");
        NodeData::StatementReturn {
            continuation: None,
            value,
        }
    }

    fn parse_if_statement(&mut self) -> NodeData {
        self.advance(); // 'if'
        self.expect(TokenKind::LParen, "expected '(' after 'if'");
        let cond = self.parse_expression(Precedence::Assignment);
        self.expect(TokenKind::RParen, "expected ')' after if condition");
        let conseq = self.parse_statement();
        let altern = if self.matches(TokenKind::Else) {
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };
        NodeData::StatementIf {
            cond: Box::new(cond),
            conseq: Box::new(conseq),
            altern,
        }
    }

    fn parse_while_statement(&mut self) -> NodeData {
        self.advance(); // 'while'
        self.expect(TokenKind::LParen, "expected '(' after 'while'");
        let cond = self.parse_expression(Precedence::Assignment);
        self.expect(TokenKind::RParen, "expected ')' after while condition");
        let body = self.parse_statement();
        NodeData::StatementWhile {
            cond: Box::new(cond),
            body: Box::new(body),
        }
    }

    fn parse_loop_statement(&mut self) -> NodeData {
        self.advance(); // 'loop'
        let body = self.parse_statement();
        NodeData::StatementLoop {
            body: Box::new(body),
        }
    }

    fn parse_for_statement(&mut self) -> NodeData {
        self.advance(); // 'for'
        self.expect(TokenKind::LParen, "expected '(' after 'for'");
        let init = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else {
            let stmt = self.parse_statement(); // consumes its own ';'
            Some(Box::new(stmt))
        };
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression(Precedence::Assignment)))
        };
        self.expect(TokenKind::Semicolon, "expected ';' after for condition");
        let incr = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expression(Precedence::Assignment)))
        };
        self.expect(TokenKind::RParen, "expected ')' after for clauses");
        let body = self.parse_statement();
        NodeData::StatementFor {
            init,
            cond,
            incr,
            body: Box::new(body),
        }
    }

    fn parse_foreach_statement(&mut self) -> NodeData {
        self.advance(); // 'foreach'
        self.expect(TokenKind::LParen, "expected '(' after 'foreach'");
        let iter_kind = if self.matches(TokenKind::Def) {
            VariableKind::Def
        } else {
            self.expect(TokenKind::Let, "expected 'let' or 'def' in foreach binding");
            VariableKind::Let
        };
        let iter = self
            .expect(TokenKind::Identifier, "expected a loop variable name")
            .lexeme;
        self.expect(TokenKind::In, "expected 'in' in foreach statement");
        let collection = self.parse_expression(Precedence::Assignment);
        self.expect(TokenKind::RParen, "expected ')' after foreach collection");
        let body = self.parse_statement();
        NodeData::StatementForeach {
            iter_kind,
            iter,
            collection: Box::new(collection),
            body: Box::new(body),
        }
    }

    fn parse_switch_statement(&mut self) -> NodeData {
        self.advance(); // 'switch'
        let label = self.parse_expression(Precedence::Assignment);
        self.expect(TokenKind::Semicolon, "expected ';' after switch label");
        NodeData::StatementSwitch {
            label: Box::new(label),
        }
    }

    fn parse_match_statement(&mut self) {
        self.advance(); // 'match'
        self.expect(TokenKind::LParen, "expected '(' after 'match'");
        self.parse_expression(Precedence::Assignment);
        self.expect(TokenKind::RParen, "expected ')' after match subject");
        self.skip_balanced_braces();
    }

    fn parse_circuit_statement(&mut self) -> NodeData {
        self.advance(); // 'circuit'
        self.skip_balanced_braces();
        NodeData::StatementCircuit {
            default_switch: None,
            labels: Vec::new(),
        }
    }

    // ---- Expressions ----

    fn parse_expression(&mut self, min_prec: Precedence) -> Node {
        let mut left = self.parse_prefix();
        loop {
            let Some(prec) = infix_precedence(self.peek_kind()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            left = self.parse_infix(left, prec);
        }
        left
    }

    fn parse_prefix(&mut self) -> Node {
        let location = self.location();
        match self.peek_kind() {
            TokenKind::Not => {
                self.advance();
                let child = self.parse_expression(Precedence::Unary);
                Node::new(
                    location,
                    NodeData::ExpressionUnaryOp {
                        child: Box::new(child),
                        kind: UnaryOpKind::Not,
                    },
                )
            }
            TokenKind::Minus => {
                self.advance();
                let child = self.parse_expression(Precedence::Unary);
                Node::new(
                    location,
                    NodeData::ExpressionUnaryOp {
                        child: Box::new(child),
                        kind: UnaryOpKind::Neg,
                    },
                )
            }
            TokenKind::Plus => {
                // Unary plus is a no-op; the operand stands for itself.
                self.advance();
                self.parse_expression(Precedence::Unary)
            }
            TokenKind::LParen => self.parse_grouping_or_tuple(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::Lt => self.parse_vector_literal(),
            TokenKind::HashBrace => self.parse_dictionary_literal(),
            TokenKind::Fun => {
                self.advance();
                Node::new(location, NodeData::ExpressionLambda(self.parse_lambda_tail()))
            }
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                Node::new(location, NodeData::ExpressionIdentifier { name })
            }
            TokenKind::Void => {
                self.advance();
                Node::new(location, NodeData::ExpressionVoid)
            }
            TokenKind::True => {
                self.advance();
                Node::new(location, NodeData::ExpressionBool(true))
            }
            TokenKind::False => {
                self.advance();
                Node::new(location, NodeData::ExpressionBool(false))
            }
            TokenKind::Natural => {
                let lexeme = self.advance().lexeme;
                let value = lexeme.parse::<u64>().unwrap_or_else(|_| {
                    self.error(format!("invalid natural literal '{lexeme}'"));
                    0
                });
                Node::new(location, NodeData::ExpressionNat(value))
            }
            TokenKind::Integer => {
                let lexeme = self.advance().lexeme;
                let value = lexeme.parse::<i64>().unwrap_or_else(|_| {
                    self.error(format!("invalid integer literal '{lexeme}'"));
                    0
                });
                Node::new(location, NodeData::ExpressionInt(value))
            }
            TokenKind::Real => {
                let lexeme = self.advance().lexeme;
                let value = lexeme.parse::<f64>().unwrap_or_else(|_| {
                    self.error(format!("invalid real literal '{lexeme}'"));
                    0.0
                });
                Node::new(location, NodeData::ExpressionReal(value))
            }
            TokenKind::Pi => {
                self.advance();
                Node::new(location, NodeData::ExpressionRealKeyword(RealKeyword::Pi))
            }
            TokenKind::Tau => {
                self.advance();
                Node::new(location, NodeData::ExpressionRealKeyword(RealKeyword::Tau))
            }
            TokenKind::Euler => {
                self.advance();
                Node::new(location, NodeData::ExpressionRealKeyword(RealKeyword::Euler))
            }
            TokenKind::Character => {
                let lexeme = self.advance().lexeme;
                let c = lexeme.chars().nth(1).unwrap_or('\0');
                Node::new(location, NodeData::ExpressionChar(c))
            }
            TokenKind::String => {
                let lexeme = self.advance().lexeme;
                let parsed = unquote_string(&lexeme);
                Node::new(
                    location,
                    NodeData::ExpressionString {
                        raw: lexeme,
                        parsed,
                    },
                )
            }
            other => {
                self.error(format!("rule not found: no prefix parser for {other:?}"));
                self.advance();
                Node::new(location, NodeData::ExpressionVoid)
            }
        }
    }

    fn parse_grouping_or_tuple(&mut self) -> Node {
        let location = self.location();
        self.advance(); // '('
        if self.check(TokenKind::RParen) {
            self.advance();
            return Node::new(location, NodeData::ExpressionTuple { children: Vec::new() });
        }
        let first = self.parse_expression(Precedence::Assignment);
        if self.matches(TokenKind::Comma) {
            let mut children = vec![first];
            if !self.check(TokenKind::RParen) {
                loop {
                    children.push(self.parse_expression(Precedence::Assignment));
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "expected ')' to close a tuple");
            Node::new(location, NodeData::ExpressionTuple { children })
        } else {
            self.expect(TokenKind::RParen, "expected ')' to close a grouped expression");
            first
        }
    }

    fn parse_array_literal(&mut self) -> Node {
        let location = self.location();
        self.advance(); // '['
        let mut children = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                children.push(self.parse_expression(Precedence::Assignment));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RBracket) {
                    break; // trailing comma
                }
            }
        }
        self.expect(TokenKind::RBracket, "expected ']' to close an array literal");
        Node::new(location, NodeData::ExpressionArray { children })
    }

    fn parse_vector_literal(&mut self) -> Node {
        let location = self.location();
        self.advance(); // '<'
        let mut children = Vec::new();
        if !self.check(TokenKind::Gt) {
            loop {
                children.push(self.parse_expression(Precedence::Comparison.higher()));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::Gt) {
                    break;
                }
            }
        }
        self.expect(TokenKind::Gt, "expected '>' to close a vector literal");
        if children.len() > silk_core::object::MAX_VECTOR_CARDINALITY {
            self.error(format!(
                "vector cardinality {} exceeds the maximum of {}",
                children.len(),
                silk_core::object::MAX_VECTOR_CARDINALITY
            ));
        }
        Node::new(location, NodeData::ExpressionVector { children })
    }

    fn parse_dictionary_literal(&mut self) -> Node {
        let location = self.location();
        self.advance(); // '#{'
        let mut pairs = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                let key = self.parse_expression(Precedence::Assignment.higher());
                self.expect(TokenKind::Colon, "expected ':' in dictionary literal");
                let value = self.parse_expression(Precedence::Assignment);
                pairs.push((key, value));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' to close a dictionary literal");
        Node::new(location, NodeData::ExpressionDictionary { pairs })
    }

    fn parse_infix(&mut self, left: Node, prec: Precedence) -> Node {
        let location = self.location();
        let op = self.advance();
        match op.kind {
            TokenKind::LParen => {
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression(Precedence::Assignment));
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "expected ')' after call arguments");
                Node::new(
                    location,
                    NodeData::ExpressionCall {
                        callee: Box::new(left),
                        args,
                    },
                )
            }
            TokenKind::Dot => {
                let right = self.parse_expression(prec.higher());
                Node::new(
                    location,
                    NodeData::ExpressionBinaryOp {
                        left: Box::new(left),
                        right: Box::new(right),
                        kind: BinaryOpKind::Index,
                    },
                )
            }
            TokenKind::DotDot => {
                let right = self.parse_expression(prec.same());
                Node::new(
                    location,
                    NodeData::ExpressionRange {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                )
            }
            TokenKind::StarStar => {
                // Right-associative: recurse at the *same* precedence.
                let right = self.parse_expression(prec.same());
                Node::new(
                    location,
                    NodeData::ExpressionBinaryOp {
                        left: Box::new(left),
                        right: Box::new(right),
                        kind: BinaryOpKind::Pow,
                    },
                )
            }
            TokenKind::And => {
                let right = self.parse_expression(prec.higher());
                Node::new(
                    location,
                    NodeData::ExpressionBinaryOp {
                        left: Box::new(left),
                        right: Box::new(right),
                        kind: BinaryOpKind::And,
                    },
                )
            }
            TokenKind::Or => {
                let right = self.parse_expression(prec.higher());
                Node::new(
                    location,
                    NodeData::ExpressionBinaryOp {
                        left: Box::new(left),
                        right: Box::new(right),
                        kind: BinaryOpKind::Or,
                    },
                )
            }
            TokenKind::Pipe => {
                let right = self.parse_expression(prec.higher());
                Node::new(
                    location,
                    NodeData::ExpressionBinaryOp {
                        left: Box::new(left),
                        right: Box::new(right),
                        kind: BinaryOpKind::Merge,
                    },
                )
            }
            kind if binary_op_kind(kind).is_some() => {
                let right = self.parse_expression(prec.higher());
                Node::new(
                    location,
                    NodeData::ExpressionBinaryOp {
                        left: Box::new(left),
                        right: Box::new(right),
                        kind: binary_op_kind(kind).unwrap(),
                    },
                )
            }
            kind if assignment_kind(kind).is_some() => {
                // Right-associative: `a = b = c` assigns `c` to `b` then `b` to `a`.
                let right = self.parse_expression(prec.same());
                Node::new(
                    location,
                    NodeData::ExpressionAssignment {
                        assignee: Box::new(left),
                        child: Box::new(right),
                        kind: assignment_kind(kind).unwrap(),
                    },
                )
            }
            other => {
                self.error(format!("no infix parser for {other:?}"));
                left
            }
        }
    }
}

fn infix_precedence(kind: TokenKind) -> Option<Precedence> {
    use TokenKind::*;
    Some(match kind {
        LParen | Dot => Precedence::Call,
        StarStar | Pipe => Precedence::Power,
        Star | Slash | SlashSlash | Percent => Precedence::Factor,
        Plus | Minus => Precedence::Term,
        Lt | Lte | Gt | Gte => Precedence::Comparison,
        EqEq | BangEq => Precedence::Equality,
        And => Precedence::And,
        Or => Precedence::Or,
        Eq | PlusEq | MinusEq | StarEq | StarStarEq | SlashEq | SlashSlashEq | DotDot => {
            Precedence::Assignment
        }
        _ => return None,
    })
}

fn binary_op_kind(kind: TokenKind) -> Option<BinaryOpKind> {
    use TokenKind::*;
    Some(match kind {
        Plus => BinaryOpKind::Add,
        Minus => BinaryOpKind::Sub,
        Star => BinaryOpKind::Mul,
        Slash => BinaryOpKind::Div,
        SlashSlash => BinaryOpKind::FloorDiv,
        Percent => BinaryOpKind::Mod,
        EqEq => BinaryOpKind::Eq,
        BangEq => BinaryOpKind::Neq,
        Lt => BinaryOpKind::Lt,
        Lte => BinaryOpKind::Lte,
        Gt => BinaryOpKind::Gt,
        Gte => BinaryOpKind::Gte,
        _ => return None,
    })
}

fn assignment_kind(kind: TokenKind) -> Option<AssignmentKind> {
    use TokenKind::*;
    Some(match kind {
        Eq => AssignmentKind::Assign,
        PlusEq => AssignmentKind::AddAssign,
        MinusEq => AssignmentKind::SubAssign,
        SlashEq => AssignmentKind::DivAssign,
        SlashSlashEq => AssignmentKind::FloorDivAssign,
        StarEq => AssignmentKind::MulAssign,
        StarStarEq => AssignmentKind::PowAssign,
        _ => return None,
    })
}

/// Strip the delimiting quotes from a literal lexeme (`'hi'` -> `hi`).
/// No escape processing beyond the delimiters themselves is specified.
fn unquote_string(lexeme: &str) -> String {
    lexeme
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(lexeme)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Module {
        let (module, diagnostics) = parse(source);
        assert!(
            !diagnostics.has_errors(),
            "unexpected errors: {:?}",
            diagnostics.iter().collect::<Vec<_>>()
        );
        module
    }

    #[test]
    fn precedence_multiplication_binds_tighter_than_addition() {
        let module = parse_ok("main; 1 + 2 * 3;");
        let NodeData::StatementExpression { child } = &module.items[1].data else {
            panic!("expected expression statement");
        };
        let NodeData::ExpressionBinaryOp { kind: BinaryOpKind::Add, right, .. } = &child.data
        else {
            panic!("expected a top-level addition");
        };
        assert!(matches!(
            right.data,
            NodeData::ExpressionBinaryOp {
                kind: BinaryOpKind::Mul,
                ..
            }
        ));
    }

    #[test]
    fn power_is_right_associative() {
        let module = parse_ok("main; 2 ** 3 ** 2;");
        let NodeData::StatementExpression { child } = &module.items[1].data else {
            panic!("expected expression statement");
        };
        let NodeData::ExpressionBinaryOp { kind: BinaryOpKind::Pow, left, right } = &child.data
        else {
            panic!("expected a top-level power");
        };
        assert!(matches!(left.data, NodeData::ExpressionNat(2)));
        assert!(matches!(
            right.data,
            NodeData::ExpressionBinaryOp {
                kind: BinaryOpKind::Pow,
                ..
            }
        ));
    }

    #[test]
    fn function_declaration_with_expression_body() {
        let module = parse_ok("main;\nfun square(x) => x * x;");
        let NodeData::DeclarationFunction { name, lambda } = &module.items[1].data else {
            panic!("expected a function declaration");
        };
        assert_eq!(name, "square");
        assert_eq!(lambda.params, vec!["x".to_string()]);
        assert_eq!(lambda.body.len(), 1);
    }

    #[test]
    fn missing_semicolon_recovers_at_the_next_one() {
        let (module, diagnostics) = parse("main;\ndef a = 1\ndef b = 2;");
        assert_eq!(diagnostics.error_count(), 1);
        // `a`'s declaration is still produced even though malformed, and
        // `b`'s declaration parses cleanly afterward.
        assert_eq!(module.items.len(), 3);
        assert!(matches!(
            module.items[2].data,
            NodeData::StatementVariable { .. }
        ));
    }

    #[test]
    fn short_circuit_expressions_parse_as_binary_ops() {
        let module = parse_ok("main;\ndef x = false or true;\ndef y = true and false;");
        assert!(matches!(
            &module.items[1].data,
            NodeData::StatementVariable { init, .. }
            if matches!(init.data, NodeData::ExpressionBinaryOp { kind: BinaryOpKind::Or, .. })
        ));
        assert!(matches!(
            &module.items[2].data,
            NodeData::StatementVariable { init, .. }
            if matches!(init.data, NodeData::ExpressionBinaryOp { kind: BinaryOpKind::And, .. })
        ));
    }

    #[test]
    fn tuple_vs_grouping() {
        let module = parse_ok("main;\n(1);\n(1, 2);");
        assert!(matches!(
            &module.items[1].data,
            NodeData::StatementExpression { child } if matches!(child.data, NodeData::ExpressionNat(1))
        ));
        assert!(matches!(
            &module.items[2].data,
            NodeData::StatementExpression { child }
            if matches!(&child.data, NodeData::ExpressionTuple { children } if children.len() == 2)
        ));
    }
}
