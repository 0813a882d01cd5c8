//! Abstract syntax for the QCL source language.

use num_bigint::BigInt;

use crate::error::Point;

/// A possibly package-qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub package: Option<String>,
    pub name: String,
}

impl Name {
    pub fn plain(name: impl Into<String>) -> Name {
        Name {
            package: None,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.package {
            Some(pkg) => write!(f, "{pkg}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Source-level type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Bool,
    /// `intN`; `N == 0` is the unsized `int`.
    Int(u32),
    /// `uintN`; `N == 0` is the unsized `uint`.
    Uint(u32),
    Str,
    /// `[len]elem` with a constant length expression.
    Array { len: Box<Expr>, elem: Box<TypeExpr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Band,
    Bor,
    Bxor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
    And,
    Or,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Band => "&",
            BinaryOp::Bor => "|",
            BinaryOp::Bxor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Complement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Name(Name, Point),
    Int(BigInt, Point),
    Bool(bool, Point),
    Str(String, Point),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        point: Point,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        point: Point,
    },
    Call {
        name: Name,
        args: Vec<Expr>,
        point: Point,
    },
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
        point: Point,
    },
    Slice {
        expr: Box<Expr>,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
        point: Point,
    },
}

impl Expr {
    pub fn point(&self) -> &Point {
        match self {
            Expr::Name(_, point)
            | Expr::Int(_, point)
            | Expr::Bool(_, point)
            | Expr::Str(_, point) => point,
            Expr::Binary { point, .. }
            | Expr::Unary { point, .. }
            | Expr::Call { point, .. }
            | Expr::Index { point, .. }
            | Expr::Slice { point, .. } => point,
        }
    }
}

/// Assignment target.
#[derive(Debug, Clone)]
pub enum LValue {
    Name(Name, Point),
    Index {
        name: Name,
        index: Expr,
        point: Point,
    },
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Var {
        names: Vec<String>,
        typ: TypeExpr,
        init: Option<Expr>,
        point: Point,
    },
    Assign {
        targets: Vec<LValue>,
        op: Option<BinaryOp>,
        values: Vec<Expr>,
        define: bool,
        point: Point,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        els: Option<Vec<Stmt>>,
        point: Point,
    },
    For {
        init: Box<Stmt>,
        cond: Expr,
        post: Box<Stmt>,
        body: Vec<Stmt>,
        point: Point,
    },
    Return {
        values: Vec<Expr>,
        point: Point,
    },
    Expr(Expr),
}

/// A function parameter or result.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub typ: TypeExpr,
    pub point: Point,
}

#[derive(Debug, Clone)]
pub struct Func {
    pub name: String,
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    pub body: Vec<Stmt>,
    pub point: Point,
}

/// A package-level constant declaration.
#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub name: String,
    pub init: Expr,
    pub point: Point,
}

/// A parsed package: one or more source files merged.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    /// Import alias to package name.
    pub imports: Vec<(String, String)>,
    pub consts: Vec<ConstDecl>,
    pub funcs: Vec<Func>,
}

impl Package {
    pub fn func(&self, name: &str) -> Option<&Func> {
        self.funcs.iter().find(|f| f.name == name)
    }
}
