//! Provides definitions of tokens for the Oberon-0 language.
use logos::{Lexer, Logos};

use oberon0_dsl::core::SourceSpan;

/// Consumes a block comment starting after the opening `(*`. Comments
/// nest. Returns false when the input ends before the comment closes.
fn block_comment(lex: &mut Lexer<TokenType>) -> bool {
    let bytes = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i < bytes.len() && depth > 0 {
        if bytes[i] == b'(' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b')') {
            depth -= 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    lex.bump(i);
    depth == 0
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenType {
    /// A `(* ... *)` comment, possibly nested. Dropped before parsing.
    #[token("(*", block_comment)]
    Comment,

    // Grouping and punctuation
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Period,
    #[token(":=")]
    Assign,

    // Operators
    #[token("&")]
    And,
    #[token("~")]
    Not,
    #[token("*")]
    Times,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("=")]
    Equal,
    #[token("#")]
    NotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,

    // Literals and identifiers
    #[regex("[0-9]+")]
    Number,
    /// A hexadecimal literal, written `!ff`.
    #[regex("![0-9a-fA-F]+")]
    HexNumber,
    #[regex("[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    // Keywords
    #[token("div")]
    Div,
    #[token("mod")]
    Mod,
    #[token("or")]
    Or,
    #[token("of")]
    Of,
    #[token("then")]
    Then,
    #[token("do")]
    Do,
    #[token("end")]
    End,
    #[token("else")]
    Else,
    #[token("elsif")]
    Elsif,
    #[token("until")]
    Until,
    #[token("if")]
    If,
    #[token("while")]
    While,
    #[token("repeat")]
    Repeat,
    #[token("array")]
    Array,
    #[token("record")]
    Record,
    #[token("const")]
    Const,
    #[token("type")]
    Type,
    #[token("var")]
    Var,
    #[token("procedure")]
    Procedure,
    #[token("begin")]
    Begin,
    #[token("module")]
    Module,

    /// Synthesized after the last real token; the pattern never occurs in
    /// source text.
    #[token("\0")]
    Eof,
}

/// A token together with its location and text.
#[derive(Clone, Debug)]
pub struct Token {
    pub token_type: TokenType,
    pub span: SourceSpan,
    pub text: String,
}
