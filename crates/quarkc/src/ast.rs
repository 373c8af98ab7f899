//! Abstract syntax tree (spec §3 "AST node").
//!
//! Tree-shaped ownership throughout: every node owns its children outright,
//! there are no back-pointers, and polymorphism is a tagged enum matched
//! exhaustively rather than a shared base class (spec §9).

use crate::span::Span;

/// Tagged variant for source-level types, spelled the way the parser reads
/// them off the token stream. Resolved/inferred types live in
/// `semantic::Type`; this is the pre-elaboration, syntactic type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Int,
    Float,
    Double,
    Bool,
    Str,
    Char,
    Void,
    Named(String),
    Pointer(Box<TypeExpr>),
    Array(Box<TypeExpr>, Option<u32>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    List(Box<TypeExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructLiteralField {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(i64),
    Float(f64),
    String(String),
    Char(char),
    Bool(bool),
    Null,
    Variable(String),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    MethodCall(Box<Expr>, String, Vec<Expr>),
    StaticCall(TypeExpr, String, Vec<Expr>),
    MemberAccess(Box<Expr>, String),
    AddressOf(Box<Expr>),
    Dereference(Box<Expr>),
    Range(Box<Expr>, Box<Expr>),
    ArrayLiteral(Vec<Expr>),
    MapLiteral(Vec<(Expr, Expr)>),
    ArrayAccess(Box<Expr>, Box<Expr>),
    StructLiteral(String, Vec<StructLiteralField>),
    Cast(TypeExpr, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// An expression denotes an lvalue iff it names a memory location a
    /// value can be written through (spec §4.3).
    #[must_use]
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Variable(_) | ExprKind::MemberAccess(..) | ExprKind::ArrayAccess(..) | ExprKind::Dereference(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: TypeExpr,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Import(Vec<String>),
    Module(String),
    VarDecl(Option<TypeExpr>, String, Option<Expr>),
    Assign(String, Expr),
    MemberAssign(Expr, String, Expr),
    DerefAssign(Expr, Expr),
    ArrayAssign(Expr, Expr, Expr),
    ExprStmt(Expr),
    If(Expr, Vec<Stmt>, Vec<(Expr, Vec<Stmt>)>, Option<Vec<Stmt>>),
    While(Expr, Vec<Stmt>),
    For(String, Expr, Vec<Stmt>),
    Match(Expr, Vec<MatchArm>),
    Return(Option<Expr>),
    Break,
    Continue,
    FunctionDef(FunctionDef),
    ExternFn(String, TypeExpr, Vec<Param>),
    ExternStructDecl(String),
    StructDef(String, Option<String>, Vec<Field>, Vec<FunctionDef>),
    ImplBlock(String, Vec<FunctionDef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    #[must_use]
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// An ordered sequence of top-level statements; owns every AST node
/// transitively reachable from it (spec §3 "A `Program`").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    #[must_use]
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }

    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.statements.iter().find_map(|stmt| match &stmt.kind {
            StmtKind::Module(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.statements.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::FunctionDef(def) => Some(def),
            _ => None,
        })
    }
}
