use super::token::{Token, TokenKind};
use crate::error::Error;
use std::iter::Peekable;

pub struct Parser<I: Iterator<Item = Token>> {
    tokens: Peekable<I>,
    errors: Vec<Error>,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        Parser {
            tokens: tokens.peekable(),
            errors: Vec::new(),
        }
    }

    pub fn error(&mut self, e: Error) {
        self.errors.push(e);
    }

    pub fn geterrors(self) -> Vec<Error> {
        self.errors
    }
}

impl<I: Iterator<Item = Token>> Parser<I> {
    /// Skip comments
    fn skip(&mut self) {
        while let Some(token) = self.tokens.peek() {
            match &token.kind {
                TokenKind::Comment(_) => self.tokens.next(),
                _ => break,
            };
        }
    }

    /// Peek : Watch next token without consuming it
    pub fn peek(&mut self) -> Option<&Token> {
        self.skip();
        self.tokens.peek()
    }

    /// Next : Consume next token and return it
    pub fn next(&mut self) -> Option<Token> {
        self.skip();
        self.tokens.next()
    }

    /// True when only comments are left
    pub fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Peek and check next token is match with condition
    pub fn check_if<F: Fn(&Token) -> bool>(&mut self, cond: F) -> bool {
        self.skip();
        if let Some(token) = self.tokens.peek() {
            if cond(token) {
                return true;
            }
        }
        false
    }

    /// Consume if next token is match with condition
    pub fn consume_if<F: Fn(&Token) -> bool>(&mut self, cond: F) -> Option<Token> {
        self.skip();
        self.tokens.next_if(|token| cond(token))
    }

    /// Consume until next token is match with condition
    pub fn consume_until<F: Fn(&Token) -> bool>(&mut self, cond: F) {
        while let Some(tok) = self.tokens.peek() {
            if cond(tok) {
                return;
            }
            self.tokens.next();
        }
    }

    /// Next token must be match with condition (skipping comments)
    pub fn expect_tobe<F: Fn(&Token) -> bool>(&mut self, cond: F) -> Result<Token, Error> {
        self.skip();
        if let Some(token) = self.tokens.peek().cloned() {
            if cond(&token) {
                self.tokens.next();
                Ok(token)
            } else {
                Err(unexpected(&token))
            }
        } else {
            Err(Error::UnexpectedEOL)
        }
    }
}

/// Unexpected token error quoting the token as it reads in the source
pub fn unexpected(token: &Token) -> Error {
    use TokenKind::*;
    let text = match &token.kind {
        Ident(s) | Number(s, _) | Real(s, _) | Error(s) => s.clone(),
        Text(s) => format!("\"{s}\""),
        Char(s) => format!("'{s}'"),
        Directive(s) => format!("#{s}"),
        MacroParam(s) => format!("{{{{{s}}}}}"),
        Comment(s) => s.clone(),
        LoopCounter => "$cnt".to_string(),
        kind => symbol(kind).to_string(),
    };
    crate::error::Error::UnexpectedToken(text)
}

fn symbol(kind: &TokenKind) -> &'static str {
    use TokenKind::*;
    match kind {
        EqualEqual => "==",
        ExclEqual => "!=",
        RAngleEqual => ">=",
        LAngleEqual => "<=",
        LAngleLAngle => "<<",
        RAngleRAngle => ">>",
        Arrow => "->",
        ColonColon => "::",
        ColonEqual => ":=",
        Equal => "=",
        Plus => "+",
        Minus => "-",
        Star => "*",
        Slash => "/",
        Percent => "%",
        Ampasand => "&",
        Pipe => "|",
        Caret => "^",
        Excl => "!",
        Tilde => "~",
        Question => "?",
        Colon => ":",
        Comma => ",",
        Period => ".",
        Dollar => "$",
        LParen => "(",
        RParen => ")",
        LBracket => "[",
        RBracket => "]",
        LAngle => "<",
        RAngle => ">",
        _ => "?",
    }
}

#[macro_export]
macro_rules! check {
    ($parser:expr, $kind:pat) => {
        $parser.check_if(|token| matches!(&token.kind, $kind))
    };
}

#[macro_export]
macro_rules! expect {
    ($parser:expr, $kind:pat) => {
        $parser.expect_tobe(|token| matches!(&token.kind, $kind))
    };
}

#[macro_export]
macro_rules! optional {
    ($parser:expr, $trigger:pat, $following:expr) => {
        if check!($parser, $trigger) {
            expect!($parser, $trigger)?;
            Some($following)
        } else {
            None
        }
    };
    ($parser:expr, $trigger:pat) => {
        $parser.consume_if(|token| matches!(&token.kind, $trigger))
    };
}

/// Parse delimited elements up to the end of the line
/// [ element { delimiter element } ]
#[macro_export]
macro_rules! repeat {
    ($parser:expr, $elem:expr, $delimiter:pat) => {{
        let mut items = Vec::new();
        if !$parser.at_end() {
            items.push($elem?);
            while check!($parser, $delimiter) {
                expect!($parser, $delimiter)?;
                items.push($elem?);
            }
        }
        items
    }};
}
