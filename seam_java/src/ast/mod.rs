pub mod display;

use serde::{Deserialize, Serialize};

/// Identifier of a [`Block`] within one parse. Block ids are assigned in
/// source order by the parser and are unique within a compilation unit;
/// consumers use them to tell apart the `then` and `else` blocks of an `if`
/// without relying on statement equality.
pub type BlockId = usize;

/// A reference to a named type. The host subset keeps types as plain names;
/// generics and arrays are out of scope for patch matching.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
}

impl TypeRef {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Str(String),
    Char(char),
    Bool(bool),
    Null,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// An expression of the host subset.
///
/// Expressions carry no positions of their own; the enclosing [`Stmt`] has
/// the line number, which is the granularity the patch engine anchors at.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A bare name: a local, a parameter or a field read without receiver
    Name(String),
    Lit(Literal),
    /// A method invocation, optionally through a receiver expression
    Call {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    /// A field access through an explicit receiver
    Field { receiver: Box<Expr>, name: String },
    /// An object construction, `new T(args)`
    New { class: TypeRef, args: Vec<Expr> },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn call<T: Into<String>>(name: T, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: None,
            name: name.into(),
            args,
        }
    }

    pub fn name<T: Into<String>>(name: T) -> Self {
        Expr::Name(name.into())
    }

    /// The invocation name when this expression is a receiver-less call
    pub fn bare_call_name(&self) -> Option<&str> {
        match self {
            Expr::Call {
                receiver: None,
                name,
                ..
            } => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub stmts: Vec<Stmt>,
    pub line: usize,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// An expression at statement position, e.g. a call or an assignment
    Expr { expr: Expr, line: usize },
    /// A local variable declaration with optional initializer
    Local {
        ty: TypeRef,
        name: String,
        init: Option<Expr>,
        line: usize,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        line: usize,
    },
    While {
        cond: Expr,
        body: Block,
        line: usize,
    },
    Return { value: Option<Expr>, line: usize },
}

impl Stmt {
    pub fn line(&self) -> usize {
        match self {
            Stmt::Expr { line, .. }
            | Stmt::Local { line, .. }
            | Stmt::If { line, .. }
            | Stmt::While { line, .. }
            | Stmt::Return { line, .. } => *line,
        }
    }

    /// The branch condition when this statement opens a branch
    pub fn branch_cond(&self) -> Option<&Expr> {
        match self {
            Stmt::If { cond, .. } | Stmt::While { cond, .. } => Some(cond),
            _ => None,
        }
    }

    /// The invocation name when this statement is a bare call, e.g.
    /// `__SmPLDots__(...)` marker statements
    pub fn bare_call_name(&self) -> Option<&str> {
        match self {
            Stmt::Expr { expr, .. } => expr.bare_call_name(),
            _ => None,
        }
    }

    /// The call arguments when this statement is a bare call
    pub fn bare_call_args(&self) -> Option<&[Expr]> {
        match self {
            Stmt::Expr {
                expr:
                    Expr::Call {
                        receiver: None,
                        args,
                        ..
                    },
                ..
            } => Some(args),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub ty: TypeRef,
    pub name: String,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub modifiers: Vec<String>,
    pub ret: TypeRef,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub line: usize,
}

impl Method {
    /// Structural equality of the header alone: modifiers, return type,
    /// name and parameters, ignoring line positions and bodies
    pub fn header_eq(&self, other: &Method) -> bool {
        self.modifiers == other.modifiers
            && self.ret == other.ret
            && self.name == other.name
            && self.params == other.params
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub ty: TypeRef,
    pub name: String,
    pub init: Option<Expr>,
    pub line: usize,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub line: usize,
}

impl Class {
    pub fn method<T: AsRef<str>>(&self, name: T) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name.as_ref())
    }
}
