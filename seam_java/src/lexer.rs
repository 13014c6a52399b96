use crate::error::SeamJavaError;
use logos::Logos;

/// Token set of the Java-shaped host subset. Whitespace is skipped;
/// positions are recovered from byte spans after the fact so that blank
/// lines still advance line numbers (the patch views rely on that).
#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\f\n]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
pub enum Tok {
    #[token("class")]
    Class,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("new")]
    New,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),
    #[regex(r"'([^'\\\n]|\\.)'", |lex| unescape_char(lex.slice()))]
    CharLit(char),

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
}

fn unescape(slice: &str) -> Option<String> {
    let body = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn unescape_char(slice: &str) -> Option<char> {
    unescape(slice).and_then(|s| s.chars().next())
}

/// A token together with the 1-based source line it starts on
#[derive(Clone, Debug, PartialEq)]
pub struct SpannedTok {
    pub tok: Tok,
    pub line: usize,
}

/// Tokenize a full source text, attaching line numbers
pub fn lex(source: &str) -> Result<Vec<SpannedTok>, SeamJavaError> {
    // byte offsets at which each line starts, for span -> line recovery
    let mut line_starts = vec![0usize];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            line_starts.push(i + 1);
        }
    }
    let line_of = |offset: usize| match line_starts.binary_search(&offset) {
        Ok(i) => i + 1,
        Err(i) => i,
    };

    let mut out = Vec::new();
    let mut lexer = Tok::lexer(source);
    while let Some(res) = lexer.next() {
        let line = line_of(lexer.span().start);
        match res {
            Ok(tok) => out.push(SpannedTok { tok, line }),
            Err(()) => return Err(SeamJavaError::Lex(line)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_survive_blank_lines() {
        let toks = lex("foo();\n\n\nbar();\n").unwrap();
        assert_eq!(toks[0].line, 1);
        let bar = toks
            .iter()
            .find(|t| t.tok == Tok::Ident("bar".to_string()))
            .unwrap();
        assert_eq!(bar.line, 4);
    }

    #[test]
    fn operators_longest_match() {
        let toks = lex("a == b = c").unwrap();
        let kinds: Vec<_> = toks.into_iter().map(|t| t.tok).collect();
        assert_eq!(
            kinds,
            vec![
                Tok::Ident("a".into()),
                Tok::EqEq,
                Tok::Ident("b".into()),
                Tok::Assign,
                Tok::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let toks = lex(r#"log("a\nb");"#).unwrap();
        assert!(toks.iter().any(|t| t.tok == Tok::Str("a\nb".to_string())));
    }

    #[test]
    fn rejects_stray_bytes() {
        assert!(matches!(lex("foo ~ bar"), Err(SeamJavaError::Lex(1))));
    }
}
