use crate::ast::{BinaryOp, Block, Expr, Literal, Method, Param, Stmt, TypeRef, UnaryOp};
use std::fmt::{Display, Formatter};

/// Renders AST nodes back to compact single-line source text. The rendering
/// is used for diagnostics and for stringifying metavariable bindings, so it
/// must be deterministic; it makes no attempt to reproduce the original
/// whitespace.
impl Display for TypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Char(c) => write!(f, "'{c}'"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{op}")
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Name(n) => write!(f, "{n}"),
            Expr::Lit(l) => write!(f, "{l}"),
            Expr::Call {
                receiver,
                name,
                args,
            } => {
                if let Some(r) = receiver {
                    write!(f, "{r}.")?;
                }
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Field { receiver, name } => write!(f, "{receiver}.{name}"),
            Expr::New { class, args } => {
                write!(f, "new {class}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Unary { op, operand } => write!(f, "{op}{operand}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Expr::Assign { target, value } => write!(f, "{target} = {value}"),
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Stmt::Expr { expr, .. } => write!(f, "{expr};"),
            Stmt::Local { ty, name, init, .. } => {
                write!(f, "{ty} {name}")?;
                if let Some(init) = init {
                    write!(f, " = {init}")?;
                }
                write!(f, ";")
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                write!(f, "if ({cond}) {then_block}")?;
                if let Some(e) = else_block {
                    write!(f, " else {e}")?;
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => write!(f, "while ({cond}) {body}"),
            Stmt::Return { value, .. } => match value {
                Some(v) => write!(f, "return {v};"),
                None => write!(f, "return;"),
            },
        }
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for s in &self.stmts {
            write!(f, " {s}")?;
        }
        write!(f, " }}")
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for m in &self.modifiers {
            write!(f, "{m} ")?;
        }
        write!(f, "{} {}(", self.ret, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") {}", self.body)
    }
}
