//! Syntax tree of one source file
//!
//! Every node carries the [`Span`] diagnostics report against. Names are
//! plain strings; binding them to declarations is the compiler's job.

use std::fmt;

pub use crate::diagnostics::Span;

#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file: String,
    pub statements: Vec<Statement>,
}

// ── Type nodes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordType {
    Any,
    Unknown,
    Never,
    Null,
    Undefined,
    Void,
    String,
    Number,
    Boolean,
}

impl KeywordType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "any" => Some(Self::Any),
            "unknown" => Some(Self::Unknown),
            "never" => Some(Self::Never),
            "null" => Some(Self::Null),
            "undefined" => Some(Self::Undefined),
            "void" => Some(Self::Void),
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TupleElement {
    pub spread: bool,
    pub ty: TypeNode,
}

#[derive(Debug, Clone)]
pub struct PropertySignature {
    pub name: String,
    pub optional: bool,
    pub ty: TypeNode,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TypeNode {
    Keyword {
        kind: KeywordType,
        span: Span,
    },
    StringLiteral {
        value: String,
        span: Span,
    },
    NumberLiteral {
        value: f64,
        span: Span,
    },
    BooleanLiteral {
        value: bool,
        span: Span,
    },
    Reference {
        name: Ident,
        args: Vec<TypeNode>,
        span: Span,
    },
    Union {
        members: Vec<TypeNode>,
        span: Span,
    },
    Intersection {
        members: Vec<TypeNode>,
        span: Span,
    },
    Tuple {
        elements: Vec<TupleElement>,
        span: Span,
    },
    Array {
        element: Box<TypeNode>,
        span: Span,
    },
    Object {
        members: Vec<PropertySignature>,
        span: Span,
    },
    Function {
        params: Vec<Param>,
        ret: Box<TypeNode>,
        span: Span,
    },
    IndexedAccess {
        object: Box<TypeNode>,
        index: Box<TypeNode>,
        span: Span,
    },
    KeyOf {
        operand: Box<TypeNode>,
        span: Span,
    },
    /// `typeof x`
    Query {
        name: Ident,
        span: Span,
    },
    Conditional {
        check: Box<TypeNode>,
        extends: Box<TypeNode>,
        when_true: Box<TypeNode>,
        when_false: Box<TypeNode>,
        span: Span,
    },
    Infer {
        name: Ident,
        span: Span,
    },
    /// `` `head${T}text${U}tail` ``: each span is a hole followed by text
    TemplateLiteral {
        head: String,
        spans: Vec<(TypeNode, String)>,
        span: Span,
    },
}

impl TypeNode {
    pub fn span(&self) -> Span {
        match self {
            TypeNode::Keyword { span, .. }
            | TypeNode::StringLiteral { span, .. }
            | TypeNode::NumberLiteral { span, .. }
            | TypeNode::BooleanLiteral { span, .. }
            | TypeNode::Reference { span, .. }
            | TypeNode::Union { span, .. }
            | TypeNode::Intersection { span, .. }
            | TypeNode::Tuple { span, .. }
            | TypeNode::Array { span, .. }
            | TypeNode::Object { span, .. }
            | TypeNode::Function { span, .. }
            | TypeNode::IndexedAccess { span, .. }
            | TypeNode::KeyOf { span, .. }
            | TypeNode::Query { span, .. }
            | TypeNode::Conditional { span, .. }
            | TypeNode::Infer { span, .. }
            | TypeNode::TemplateLiteral { span, .. } => *span,
        }
    }
}

// ── Declarations ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: Ident,
    pub constraint: Option<TypeNode>,
    pub default: Option<TypeNode>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Ident,
    pub annotation: Option<TypeNode>,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Const,
    Let,
    Var,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKind::Const => write!(f, "const"),
            VarKind::Let => write!(f, "let"),
            VarKind::Var => write!(f, "var"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeAlias {
    pub name: Ident,
    pub params: Vec<TypeParam>,
    pub body: TypeNode,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub kind: VarKind,
    pub name: Ident,
    pub annotation: Option<TypeNode>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeNode>,
    pub body: Vec<Statement>,
    pub span: Span,
}

// ── Statements ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Statement {
    TypeAlias(TypeAlias),
    Variable(VariableDecl),
    Function(FunctionDecl),
    Assignment {
        target: Ident,
        value: Expr,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
        span: Span,
    },
    Block {
        statements: Vec<Statement>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Expression(Expr),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::TypeAlias(alias) => alias.span,
            Statement::Variable(decl) => decl.span,
            Statement::Function(func) => func.span,
            Statement::Assignment { span, .. }
            | Statement::If { span, .. }
            | Statement::Block { span, .. }
            | Statement::Return { span, .. } => *span,
            Statement::Expression(expr) => expr.span(),
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub const ALL: [BinaryOp; 15] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::Lt,
        BinaryOp::Gt,
        BinaryOp::Le,
        BinaryOp::Ge,
        BinaryOp::Eq,
        BinaryOp::NotEq,
        BinaryOp::StrictEq,
        BinaryOp::StrictNotEq,
        BinaryOp::And,
        BinaryOp::Or,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
    TypeOf,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
            UnaryOp::Plus => "+",
            UnaryOp::TypeOf => "typeof",
        }
    }

    pub const ALL: [UnaryOp; 4] = [UnaryOp::Not, UnaryOp::Negate, UnaryOp::Plus, UnaryOp::TypeOf];
}

#[derive(Debug, Clone)]
pub struct ArrayElement {
    pub spread: bool,
    pub expr: Expr,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Identifier {
        name: String,
        span: Span,
    },
    StringLiteral {
        value: String,
        span: Span,
    },
    NumberLiteral {
        value: f64,
        span: Span,
    },
    BoolLiteral {
        value: bool,
        span: Span,
    },
    Null {
        span: Span,
    },
    Template {
        head: String,
        spans: Vec<(Expr, String)>,
        span: Span,
    },
    Array {
        elements: Vec<ArrayElement>,
        span: Span,
    },
    Object {
        properties: Vec<(String, Expr)>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        property: Ident,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Identifier { span, .. }
            | Expr::StringLiteral { span, .. }
            | Expr::NumberLiteral { span, .. }
            | Expr::BoolLiteral { span, .. }
            | Expr::Null { span }
            | Expr::Template { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Call { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. } => *span,
        }
    }
}
