use thiserror::Error;

/// An error produced while lexing or parsing Java-shaped source text
#[derive(Debug, Error)]
pub enum SeamJavaError {
    /// The lexer hit a character sequence no token rule accepts
    #[error("unrecognized input at line {0}")]
    Lex(usize),
    /// The parser found a token it did not expect.
    /// Line numbers refer to the source handed to the parser, which for
    /// rewritten patch views is the rewritten source, not the original patch.
    #[error("parse error at line {line}: expected {expected}, found {found}")]
    Parse {
        line: usize,
        expected: String,
        found: String,
    },
    /// The token stream ended while a production was still open
    #[error("unexpected end of input: expected {0}")]
    UnexpectedEof(String),
}
