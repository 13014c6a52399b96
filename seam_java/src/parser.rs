use crate::ast::{
    BinaryOp, Block, Class, Expr, Field, Literal, Method, Param, Stmt, TypeRef, UnaryOp,
};
use crate::error::SeamJavaError;
use crate::lexer::{lex, SpannedTok, Tok};
use tracing::trace;

const MODIFIERS: &[&str] = &["public", "private", "protected", "static", "final"];

struct Cursor {
    toks: Vec<SpannedTok>,
    pos: usize,
    next_block: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.toks.get(self.pos + ahead).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<&SpannedTok> {
        let t = self.toks.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: Tok, expected: &str) -> Result<usize, SeamJavaError> {
        match self.toks.get(self.pos) {
            Some(t) if t.tok == tok => {
                self.pos += 1;
                Ok(t.line)
            }
            Some(t) => Err(SeamJavaError::Parse {
                line: t.line,
                expected: expected.to_string(),
                found: format!("{:?}", t.tok),
            }),
            None => Err(SeamJavaError::UnexpectedEof(expected.to_string())),
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, usize), SeamJavaError> {
        match self.toks.get(self.pos) {
            Some(t) => {
                if let Tok::Ident(name) = &t.tok {
                    let out = (name.clone(), t.line);
                    self.pos += 1;
                    Ok(out)
                } else {
                    Err(SeamJavaError::Parse {
                        line: t.line,
                        expected: expected.to_string(),
                        found: format!("{:?}", t.tok),
                    })
                }
            }
            None => Err(SeamJavaError::UnexpectedEof(expected.to_string())),
        }
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn fresh_block(&mut self) -> usize {
        let id = self.next_block;
        self.next_block += 1;
        id
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T, SeamJavaError> {
        match self.toks.get(self.pos) {
            Some(t) => Err(SeamJavaError::Parse {
                line: t.line,
                expected: expected.to_string(),
                found: format!("{:?}", t.tok),
            }),
            None => Err(SeamJavaError::UnexpectedEof(expected.to_string())),
        }
    }
}

/// Parse a compilation unit containing a single class declaration
pub fn parse_class(source: &str) -> Result<Class, SeamJavaError> {
    let mut c = Cursor {
        toks: lex(source)?,
        pos: 0,
        next_block: 0,
    };
    let line = c.expect(Tok::Class, "`class`")?;
    let (name, _) = c.expect_ident("class name")?;
    c.expect(Tok::LBrace, "`{`")?;

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    while c.peek() != Some(&Tok::RBrace) {
        parse_member(&mut c, &mut fields, &mut methods)?;
    }
    c.expect(Tok::RBrace, "`}`")?;
    trace!(
        class = %name,
        fields = fields.len(),
        methods = methods.len(),
        "parsed class"
    );
    Ok(Class {
        name,
        fields,
        methods,
        line,
    })
}

/// Parse a single method declaration, as written inside a class body
pub fn parse_method(source: &str) -> Result<Method, SeamJavaError> {
    let mut c = Cursor {
        toks: lex(source)?,
        pos: 0,
        next_block: 0,
    };
    let mut fields = Vec::new();
    let mut methods = Vec::new();
    parse_member(&mut c, &mut fields, &mut methods)?;
    methods
        .pop()
        .ok_or_else(|| SeamJavaError::UnexpectedEof("a method declaration".to_string()))
}

fn parse_member(
    c: &mut Cursor,
    fields: &mut Vec<Field>,
    methods: &mut Vec<Method>,
) -> Result<(), SeamJavaError> {
    let mut modifiers = Vec::new();
    while let Some(Tok::Ident(word)) = c.peek() {
        if MODIFIERS.contains(&word.as_str()) {
            modifiers.push(word.clone());
            c.next();
        } else {
            break;
        }
    }
    let (ty, line) = c.expect_ident("a type name")?;
    let ty = TypeRef::new(ty);
    let (name, _) = c.expect_ident("a member name")?;

    if c.peek() == Some(&Tok::LParen) {
        c.next();
        let params = parse_params(c)?;
        let body = parse_block(c)?;
        methods.push(Method {
            modifiers,
            ret: ty,
            name,
            params,
            body,
            line,
        });
    } else {
        let init = if c.eat(&Tok::Assign) {
            Some(parse_expr(c)?)
        } else {
            None
        };
        c.expect(Tok::Semi, "`;`")?;
        fields.push(Field {
            ty,
            name,
            init,
            line,
        });
    }
    Ok(())
}

fn parse_params(c: &mut Cursor) -> Result<Vec<Param>, SeamJavaError> {
    let mut params = Vec::new();
    if c.eat(&Tok::RParen) {
        return Ok(params);
    }
    loop {
        let (ty, _) = c.expect_ident("a parameter type")?;
        let (name, _) = c.expect_ident("a parameter name")?;
        params.push(Param {
            ty: TypeRef::new(ty),
            name,
        });
        if c.eat(&Tok::Comma) {
            continue;
        }
        c.expect(Tok::RParen, "`)`")?;
        break;
    }
    Ok(params)
}

fn parse_block(c: &mut Cursor) -> Result<Block, SeamJavaError> {
    let id = c.fresh_block();
    let line = c.expect(Tok::LBrace, "`{`")?;
    let mut stmts = Vec::new();
    while c.peek() != Some(&Tok::RBrace) {
        stmts.push(parse_stmt(c)?);
    }
    c.expect(Tok::RBrace, "`}`")?;
    Ok(Block { id, stmts, line })
}

fn parse_stmt(c: &mut Cursor) -> Result<Stmt, SeamJavaError> {
    let line = c.line();
    match c.peek() {
        Some(Tok::If) => {
            c.next();
            c.expect(Tok::LParen, "`(`")?;
            let cond = parse_expr(c)?;
            c.expect(Tok::RParen, "`)`")?;
            let then_block = parse_block(c)?;
            let else_block = if c.eat(&Tok::Else) {
                if c.peek() == Some(&Tok::If) {
                    // else-if chains become a synthetic block holding one `if`
                    let id = c.fresh_block();
                    let inner_line = c.line();
                    let inner = parse_stmt(c)?;
                    Some(Block {
                        id,
                        stmts: vec![inner],
                        line: inner_line,
                    })
                } else {
                    Some(parse_block(c)?)
                }
            } else {
                None
            };
            Ok(Stmt::If {
                cond,
                then_block,
                else_block,
                line,
            })
        }
        Some(Tok::While) => {
            c.next();
            c.expect(Tok::LParen, "`(`")?;
            let cond = parse_expr(c)?;
            c.expect(Tok::RParen, "`)`")?;
            let body = parse_block(c)?;
            Ok(Stmt::While { cond, body, line })
        }
        Some(Tok::Return) => {
            c.next();
            let value = if c.peek() == Some(&Tok::Semi) {
                None
            } else {
                Some(parse_expr(c)?)
            };
            c.expect(Tok::Semi, "`;`")?;
            Ok(Stmt::Return { value, line })
        }
        Some(Tok::Ident(_)) if matches!(c.peek_at(1), Some(Tok::Ident(_))) => {
            // two names in a row start a local declaration
            let (ty, _) = c.expect_ident("a type name")?;
            let (name, _) = c.expect_ident("a variable name")?;
            let init = if c.eat(&Tok::Assign) {
                Some(parse_expr(c)?)
            } else {
                None
            };
            c.expect(Tok::Semi, "`;`")?;
            Ok(Stmt::Local {
                ty: TypeRef::new(ty),
                name,
                init,
                line,
            })
        }
        Some(_) => {
            let expr = parse_expr(c)?;
            c.expect(Tok::Semi, "`;`")?;
            Ok(Stmt::Expr { expr, line })
        }
        None => c.unexpected("a statement"),
    }
}

fn parse_expr(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let lhs = parse_or(c)?;
    if c.eat(&Tok::Assign) {
        let value = parse_expr(c)?;
        return Ok(Expr::Assign {
            target: Box::new(lhs),
            value: Box::new(value),
        });
    }
    Ok(lhs)
}

fn parse_or(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let mut lhs = parse_and(c)?;
    while c.eat(&Tok::OrOr) {
        let rhs = parse_and(c)?;
        lhs = binary(BinaryOp::Or, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_and(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let mut lhs = parse_equality(c)?;
    while c.eat(&Tok::AndAnd) {
        let rhs = parse_equality(c)?;
        lhs = binary(BinaryOp::And, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_equality(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let mut lhs = parse_relational(c)?;
    loop {
        let op = match c.peek() {
            Some(Tok::EqEq) => BinaryOp::Eq,
            Some(Tok::NotEq) => BinaryOp::Ne,
            _ => break,
        };
        c.next();
        let rhs = parse_relational(c)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_relational(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let mut lhs = parse_additive(c)?;
    loop {
        let op = match c.peek() {
            Some(Tok::Lt) => BinaryOp::Lt,
            Some(Tok::Le) => BinaryOp::Le,
            Some(Tok::Gt) => BinaryOp::Gt,
            Some(Tok::Ge) => BinaryOp::Ge,
            _ => break,
        };
        c.next();
        let rhs = parse_additive(c)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_additive(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let mut lhs = parse_multiplicative(c)?;
    loop {
        let op = match c.peek() {
            Some(Tok::Plus) => BinaryOp::Add,
            Some(Tok::Minus) => BinaryOp::Sub,
            _ => break,
        };
        c.next();
        let rhs = parse_multiplicative(c)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_multiplicative(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let mut lhs = parse_unary(c)?;
    loop {
        let op = match c.peek() {
            Some(Tok::Star) => BinaryOp::Mul,
            Some(Tok::Slash) => BinaryOp::Div,
            Some(Tok::Percent) => BinaryOp::Rem,
            _ => break,
        };
        c.next();
        let rhs = parse_unary(c)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_unary(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let op = match c.peek() {
        Some(Tok::Bang) => Some(UnaryOp::Not),
        Some(Tok::Minus) => Some(UnaryOp::Neg),
        _ => None,
    };
    if let Some(op) = op {
        c.next();
        let operand = parse_unary(c)?;
        return Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        });
    }
    parse_postfix(c)
}

fn parse_postfix(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    let mut expr = parse_primary(c)?;
    while c.eat(&Tok::Dot) {
        let (name, _) = c.expect_ident("a member name")?;
        if c.eat(&Tok::LParen) {
            let args = parse_args(c)?;
            expr = Expr::Call {
                receiver: Some(Box::new(expr)),
                name,
                args,
            };
        } else {
            expr = Expr::Field {
                receiver: Box::new(expr),
                name,
            };
        }
    }
    Ok(expr)
}

fn parse_primary(c: &mut Cursor) -> Result<Expr, SeamJavaError> {
    match c.peek().cloned() {
        Some(Tok::Ident(name)) => {
            c.next();
            if c.eat(&Tok::LParen) {
                let args = parse_args(c)?;
                Ok(Expr::Call {
                    receiver: None,
                    name,
                    args,
                })
            } else {
                Ok(Expr::Name(name))
            }
        }
        Some(Tok::Int(v)) => {
            c.next();
            Ok(Expr::Lit(Literal::Int(v)))
        }
        Some(Tok::Str(s)) => {
            c.next();
            Ok(Expr::Lit(Literal::Str(s)))
        }
        Some(Tok::CharLit(ch)) => {
            c.next();
            Ok(Expr::Lit(Literal::Char(ch)))
        }
        Some(Tok::True) => {
            c.next();
            Ok(Expr::Lit(Literal::Bool(true)))
        }
        Some(Tok::False) => {
            c.next();
            Ok(Expr::Lit(Literal::Bool(false)))
        }
        Some(Tok::Null) => {
            c.next();
            Ok(Expr::Lit(Literal::Null))
        }
        Some(Tok::New) => {
            c.next();
            let (class, _) = c.expect_ident("a class name")?;
            c.expect(Tok::LParen, "`(`")?;
            let args = parse_args(c)?;
            Ok(Expr::New {
                class: TypeRef::new(class),
                args,
            })
        }
        Some(Tok::LParen) => {
            c.next();
            let inner = parse_expr(c)?;
            c.expect(Tok::RParen, "`)`")?;
            Ok(inner)
        }
        _ => c.unexpected("an expression"),
    }
}

fn parse_args(c: &mut Cursor) -> Result<Vec<Expr>, SeamJavaError> {
    let mut args = Vec::new();
    if c.eat(&Tok::RParen) {
        return Ok(args);
    }
    loop {
        args.push(parse_expr(c)?);
        if c.eat(&Tok::Comma) {
            continue;
        }
        c.expect(Tok::RParen, "`)`")?;
        break;
    }
    Ok(args)
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_class() {
        let src = r#"
class RewrittenSmPLRule {
    String name = "rule1";
    void work(int x) {
        foo(x);
    }
}
"#;
        let class = parse_class(src).unwrap();
        assert_eq!(class.name, "RewrittenSmPLRule");
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "work");
    }

    #[test]
    fn statement_lines_match_source() {
        let src = "class C {\nvoid m() {\na();\n\nb();\n}\n}";
        let class = parse_class(src).unwrap();
        let body = &class.methods[0].body;
        assert_eq!(body.stmts[0].line(), 3);
        // the blank line is preserved in the numbering
        assert_eq!(body.stmts[1].line(), 5);
    }

    #[test]
    fn local_decl_vs_expression_statement() {
        let m = parse_method("void m() { int x = f(); x = g(); }").unwrap();
        assert!(matches!(m.body.stmts[0], Stmt::Local { .. }));
        assert!(matches!(m.body.stmts[1], Stmt::Expr { .. }));
    }

    #[test]
    fn else_if_becomes_nested_block() {
        let m = parse_method("void m() { if (a) { x(); } else if (b) { y(); } }").unwrap();
        match &m.body.stmts[0] {
            Stmt::If { else_block, .. } => {
                let e = else_block.as_ref().unwrap();
                assert!(matches!(e.stmts[0], Stmt::If { .. }));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn block_ids_are_unique() {
        let m = parse_method("void m() { if (a) { x(); } else { y(); } while (b) { z(); } }")
            .unwrap();
        let mut ids = vec![m.body.id];
        for s in &m.body.stmts {
            match s {
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    ids.push(then_block.id);
                    if let Some(e) = else_block {
                        ids.push(e.id);
                    }
                }
                Stmt::While { body, .. } => ids.push(body.id),
                _ => {}
            }
        }
        let len = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), len);
    }

    #[test]
    fn object_construction() {
        let m = parse_method("void m() { Foo x = new Bar(1, y); use(new Baz()); }").unwrap();
        match &m.body.stmts[0] {
            Stmt::Local { init: Some(init), .. } => {
                assert_eq!(format!("{init}"), "new Bar(1, y)");
                let Expr::New { class, args } = init else {
                    panic!("expected a construction, got {init:?}");
                };
                assert_eq!(class.name, "Bar");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected local declaration, got {other:?}"),
        }
        let Stmt::Expr { expr, .. } = &m.body.stmts[1] else {
            panic!("expected expression statement");
        };
        assert_eq!(format!("{expr}"), "use(new Baz())");
    }

    #[test]
    fn precedence_shapes() {
        let m = parse_method("void m() { x = a + b * c; }").unwrap();
        let Stmt::Expr { expr, .. } = &m.body.stmts[0] else {
            panic!("expected expression statement");
        };
        assert_eq!(format!("{expr}"), "x = a + b * c");
        match expr {
            Expr::Assign { value, .. } => match value.as_ref() {
                Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                    assert!(matches!(rhs.as_ref(), Expr::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("expected addition, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }
}
