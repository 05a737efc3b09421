//! Lexer for Oberon-0 source text. The lexer transforms text into tokens
//! (tokens are the input to the parser).

use logos::Logos;

use oberon0_dsl::core::{FileId, SourceSpan};
use oberon0_dsl::diagnostic::{Diagnostic, Label};
use oberon0_dsl::problems::Problem;

use crate::token::{Token, TokenType};

/// Tokenizes an Oberon-0 program.
///
/// Returns the tokens and a list of diagnostics rather than a result:
/// parsing continues even with token errors so that one run reports as
/// much as it can. Comments are dropped, and the token list always ends
/// with a synthesized `Eof` token.
pub fn tokenize(source: &str, file_id: &FileId) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut lexer = TokenType::lexer(source);

    while let Some(token) = lexer.next() {
        let span = lexer.span();
        let span = SourceSpan::range(span.start, span.end).with_file_id(file_id);
        match token {
            Ok(TokenType::Comment) => {}
            Ok(token_type) => tokens.push(Token {
                token_type,
                span,
                text: lexer.slice().to_owned(),
            }),
            Err(_) => {
                if lexer.slice().starts_with("(*") {
                    diagnostics.push(Diagnostic::problem(
                        Problem::UnterminatedComment,
                        Label::span(span, "comment reaches the end of the file"),
                    ));
                } else {
                    diagnostics.push(Diagnostic::problem(
                        Problem::InvalidToken,
                        Label::span(span, format!("the text '{}' is not valid here", lexer.slice())),
                    ));
                }
            }
        }
    }

    tokens.push(Token {
        token_type: TokenType::Eof,
        span: SourceSpan::range(source.len(), source.len()).with_file_id(file_id),
        text: String::new(),
    });
    (tokens, diagnostics)
}
