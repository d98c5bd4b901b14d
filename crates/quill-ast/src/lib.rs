//! The shape of input the compiler expects from a parser.
//!
//! The scanner and recursive-descent parser are out of scope for this
//! workspace (they are external collaborators per the runtime's design
//! document). This crate exists only to give `quill-compiler` something
//! concrete to lower, so the compiler's contract with "whatever a parser
//! produces" is documented rather than implicit.

use std::fmt;

/// A source position, carried through for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Decimal(f64),
    String(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Gr,
    Grq,
    Le,
    Leq,
    LogAnd,
    LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
    Inv,
}

/// An expression node. Deliberately minimal: enough surface for the
/// compiler's lowering, codegen and optimizer passes to be exercised
/// end-to-end without pretending to be a full language grammar.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Literal, Span),
    Ident(String, Span),
    Binary(BinOp, Box<Expr>, Box<Expr>, Span),
    Unary(UnOp, Box<Expr>, Span),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
        span: Span,
    },
    GetAttr {
        target: Box<Expr>,
        name: String,
        span: Span,
    },
    SetAttr {
        target: Box<Expr>,
        name: String,
        value: Box<Expr>,
        span: Span,
    },
    Subscript {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    List(Vec<Expr>, Span),
    Tuple(Vec<Expr>, Span),
    Dict(Vec<(Expr, Expr)>, Span),
    Set(Vec<Expr>, Span),
    Spawn(Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, s)
            | Expr::Ident(_, s)
            | Expr::Binary(_, _, _, s)
            | Expr::Unary(_, _, s)
            | Expr::Call { span: s, .. }
            | Expr::GetAttr { span: s, .. }
            | Expr::SetAttr { span: s, .. }
            | Expr::Subscript { span: s, .. }
            | Expr::List(_, s)
            | Expr::Tuple(_, s)
            | Expr::Dict(_, s)
            | Expr::Set(_, s)
            | Expr::Spawn(_, s) => *s,
        }
    }
}

/// A statement node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Let { name: String, value: Expr, is_const: bool },
    Assign { target: Expr, value: Expr },
    If { cond: Expr, then_body: Block, else_body: Option<Block> },
    While { cond: Expr, body: Block },
    Loop { body: Block },
    Break,
    Continue,
    Return(Option<Expr>),
    FuncDef(FuncDef),
    Import { what: String, as_name: Option<String> },
    Sync { guard: Expr, body: Block },
    Trap { body: Block, handlers: Vec<(String, String, Block)> },
    Defer(Expr),
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<Param>,
    pub variadic: Option<String>,
    pub kwargs: Option<String>,
    pub body: Block,
}

/// Top-level compilation unit handed to `quill-compiler`.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub name: String,
    pub body: Block,
}
