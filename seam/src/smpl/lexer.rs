use crate::error::SeamError;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Parser)]
#[grammar = "smpl/grammar.pest"]
pub struct PatchParser;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Rulename,
    MetavarType,
    MetavarIdentifier,
    WhenMatches,
    Code,
    Addition,
    Deletion,
    Dots,
    OptDotsBegin,
    OptDotsEnd,
    DisjunctionBegin,
    DisjunctionContinue,
    DisjunctionEnd,
    Newline,
}

/// One lexed patch token. `line` is the 1-based patch line the token starts
/// on; `text` carries the token payload (rule name, metavariable name,
/// regex literal, code fragment, or dots constraint tail).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    fn new<T: Into<String>>(kind: TokenKind, text: T, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }
}

/// Tokenize a full patch text
pub fn lex(patch: &str) -> Result<Vec<Token>, SeamError> {
    if patch.trim().is_empty() {
        return Err(SeamError::EmptyMatchContext);
    }
    let mut pairs = PatchParser::parse(Rule::patch, patch)?;
    let patch_pair = pairs.next().ok_or(SeamError::EmptyMatchContext)?;

    let mut tokens = Vec::new();
    for pair in patch_pair.into_inner() {
        match pair.as_rule() {
            Rule::header => lex_header(pair, &mut tokens),
            Rule::meta_item => lex_meta_item(pair, &mut tokens),
            Rule::terminator => {}
            Rule::raw_body => lex_body(pair, &mut tokens),
            Rule::EOI => {}
            _ => unreachable!(),
        }
    }
    trace!(tokens = tokens.len(), "lexed patch");
    Ok(tokens)
}

fn lex_header(pair: Pair<Rule>, tokens: &mut Vec<Token>) {
    let line = pair.line_col().0;
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::rulename {
            let name = inner.as_str().trim();
            if !name.is_empty() {
                tokens.push(Token::new(TokenKind::Rulename, name, line));
            }
        }
    }
}

fn lex_meta_item(pair: Pair<Rule>, tokens: &mut Vec<Token>) {
    for item in pair.into_inner() {
        let line = item.line_col().0;
        match item.as_rule() {
            Rule::metadecl => {
                for part in item.into_inner() {
                    let kind = match part.as_rule() {
                        Rule::kindword => TokenKind::MetavarType,
                        Rule::mv_name => TokenKind::MetavarIdentifier,
                        _ => unreachable!(),
                    };
                    tokens.push(Token::new(kind, part.as_str(), part.line_col().0));
                }
            }
            Rule::subject_when => {
                for part in item.into_inner() {
                    match part.as_rule() {
                        Rule::mv_name => tokens.push(Token::new(
                            TokenKind::MetavarIdentifier,
                            part.as_str(),
                            part.line_col().0,
                        )),
                        Rule::quoted => tokens.push(Token::new(
                            TokenKind::WhenMatches,
                            unquote(part.as_str()),
                            part.line_col().0,
                        )),
                        _ => unreachable!(),
                    }
                }
            }
            Rule::bare_when => {
                for part in item.into_inner() {
                    if part.as_rule() == Rule::quoted {
                        tokens.push(Token::new(
                            TokenKind::WhenMatches,
                            unquote(part.as_str()),
                            line,
                        ));
                    }
                }
            }
            _ => unreachable!(),
        }
    }
}

fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

fn lex_body(pair: Pair<Rule>, tokens: &mut Vec<Token>) {
    let start_line = pair.line_col().0;
    let raw = pair.as_str();
    let mut fragments: Vec<&str> = raw.split('\n').collect();
    // a trailing newline leaves an empty fragment that is not a patch line
    if fragments.last().is_some_and(|f| f.is_empty()) {
        fragments.pop();
    }
    for (i, fragment) in fragments.into_iter().enumerate() {
        let line = start_line + i;
        if i == 0 && fragment.trim().is_empty() {
            // remainder of the terminator line
            continue;
        }
        lex_body_line(fragment.trim_end_matches('\r'), line, tokens);
    }
}

fn lex_body_line(text: &str, line: usize, tokens: &mut Vec<Token>) {
    let trimmed = text.trim_start();
    let rest = match trimmed.chars().next() {
        None => {
            tokens.push(Token::new(TokenKind::Newline, "", line));
            return;
        }
        Some('+') => {
            tokens.push(Token::new(TokenKind::Addition, "+", line));
            &trimmed[1..]
        }
        Some('-') => {
            tokens.push(Token::new(TokenKind::Deletion, "-", line));
            &trimmed[1..]
        }
        Some(_) => trimmed,
    };
    let payload = rest.trim();
    if payload.is_empty() {
        tokens.push(Token::new(TokenKind::Newline, "", line));
        return;
    }
    let token = if payload == "<..." {
        Token::new(TokenKind::OptDotsBegin, payload, line)
    } else if payload == "...>" {
        Token::new(TokenKind::OptDotsEnd, payload, line)
    } else if let Some(tail) = payload.strip_prefix("...") {
        Token::new(TokenKind::Dots, tail.trim(), line)
    } else if payload == "(" {
        Token::new(TokenKind::DisjunctionBegin, payload, line)
    } else if payload == "|" {
        Token::new(TokenKind::DisjunctionContinue, payload, line)
    } else if payload == ")" {
        Token::new(TokenKind::DisjunctionEnd, payload, line)
    } else {
        Token::new(TokenKind::Code, rest.trim_end(), line)
    };
    tokens.push(token);
    tokens.push(Token::new(TokenKind::Newline, "", line));
}
