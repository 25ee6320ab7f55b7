//! The syntax tree
//!
//! A single tagged-union node (`Node { location, data }`) rather than a
//! class hierarchy: every pass matches exhaustively on `NodeData`, so
//! adding a variant is a compile error everywhere it isn't yet handled.
//! Children are owned exclusively by their parent — there are no
//! back-pointers and no cycles, so a `Box<Node>` per child is enough;
//! no arena or node-id indirection is needed at this tree depth.

use silk_core::Location;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub location: Location,
    pub data: NodeData,
}

impl Node {
    pub fn new(location: Location, data: NodeData) -> Self {
        Node { location, data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Let,
    Def,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationControlKind {
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Merge,
    /// `left . right` or `left[right]`: member/index access. If `right`
    /// is an `ExpressionIdentifier`, the compiler treats its name as a
    /// literal dictionary key rather than resolving it as a variable.
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentKind {
    Assign,
    AddAssign,
    SubAssign,
    DivAssign,
    FloorDivAssign,
    MulAssign,
    PowAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealKeyword {
    Pi,
    Tau,
    Euler,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentPlacement {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    // ---- Module-level ----
    ModuleMain,
    ModuleDeclaration { path: String },
    ModuleImport { name: String, imports: Vec<String> },

    // ---- Declarations ----
    DeclarationFunction { name: String, lambda: Lambda },
    DeclarationEnum,
    DeclarationObject,
    DeclarationExternLibrary { name: String, children: Vec<Node> },
    DeclarationExternFunction {
        name: String,
        params: Vec<String>,
        ret_type: Option<String>,
    },
    DeclarationMacro,

    // ---- Statements ----
    StatementEmpty,
    StatementExpression { child: Box<Node> },
    StatementBlock { children: Vec<Node> },
    StatementCircuit {
        default_switch: Option<Box<Node>>,
        labels: Vec<Node>,
    },
    StatementVariable {
        name: String,
        init: Box<Node>,
        kind: VariableKind,
    },
    StatementConstant { name: String, init: Box<Node> },
    StatementReturn {
        continuation: Option<Box<Node>>,
        value: Option<Box<Node>>,
    },
    StatementSwitch { label: Box<Node> },
    StatementIterationControl { kind: IterationControlKind },
    StatementIf {
        cond: Box<Node>,
        conseq: Box<Node>,
        altern: Option<Box<Node>>,
    },
    StatementWhile { cond: Box<Node>, body: Box<Node> },
    StatementLoop { body: Box<Node> },
    StatementFor {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        incr: Option<Box<Node>>,
        body: Box<Node>,
    },
    StatementForeach {
        iter_kind: VariableKind,
        iter: String,
        collection: Box<Node>,
        body: Box<Node>,
    },
    StatementMatch,

    // ---- Expressions ----
    ExpressionIdentifier { name: String },
    ExpressionVoid,
    ExpressionContinuation,
    ExpressionBool(bool),
    ExpressionNat(u64),
    ExpressionInt(i64),
    ExpressionReal(f64),
    ExpressionRealKeyword(RealKeyword),
    ExpressionChar(char),
    ExpressionString { raw: String, parsed: String },
    ExpressionTuple { children: Vec<Node> },
    ExpressionUnaryOp { child: Box<Node>, kind: UnaryOpKind },
    ExpressionBinaryOp {
        left: Box<Node>,
        right: Box<Node>,
        kind: BinaryOpKind,
    },
    ExpressionRange { left: Box<Node>, right: Box<Node> },
    ExpressionVector { children: Vec<Node> },
    ExpressionArray { children: Vec<Node> },
    ExpressionDictionary { pairs: Vec<(Node, Node)> },
    ExpressionAssignment {
        assignee: Box<Node>,
        child: Box<Node>,
        kind: AssignmentKind,
    },
    ExpressionCall { callee: Box<Node>, args: Vec<Node> },
    ExpressionLambda(Lambda),

    // ---- Transparent wrapper ----
    Comment {
        placement: CommentPlacement,
        text: String,
        child: Box<Node>,
    },
}

/// Unwrap any `Comment` wrappers to get at the node every pass actually
/// cares about. All passes call this before matching on `NodeData`.
pub fn strip_comment(node: &Node) -> &Node {
    let mut current = node;
    while let NodeData::Comment { child, .. } = &current.data {
        current = child;
    }
    current
}
