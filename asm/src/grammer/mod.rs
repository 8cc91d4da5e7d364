pub mod ast;
pub mod lexer;
pub mod parser;
pub mod parsercore;
pub mod token;

use crate::error::Error;
use ast::SourceLine;
use lexer::Lexer;
use parsercore::{unexpected, Parser};
use token::TokenKind;

/// Parse a whole source file.
/// Lines that fail to parse are dropped and reported with their zero-based line index.
pub fn parse_source(file: usize, code: &str) -> (Vec<SourceLine>, Vec<(usize, Error)>) {
    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for (idx, tokens) in Lexer::new(file, code).parse().into_iter().enumerate() {
        if let Some(bad) = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Error(_)))
        {
            errors.push((idx, unexpected(bad)));
            continue;
        }
        let comment = tokens.iter().find_map(|t| match &t.kind {
            TokenKind::Comment(c) => Some(c.clone()),
            _ => None,
        });
        let (line, errs) = Parser::new(tokens.into_iter()).parse(file, idx);
        errors.extend(errs.into_iter().map(|e| (idx, e)));
        if let Some(mut line) = line {
            if line.label.is_none() && line.stmt.is_none() && comment.is_none() {
                continue;
            }
            line.comment = comment;
            lines.push(line);
        }
    }
    (lines, errors)
}
