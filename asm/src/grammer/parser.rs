use super::ast::{
    BinaryOp, Directive, Expr, Operand, Operation, Pragma, Sign, SourceLine, Statement, Stmt,
    SymbolRef, UnaryOp,
};
use super::lexer::spectrum_bytes;
use super::parsercore::{unexpected, Parser};
use super::token::{Keyword, Token, TokenKind::*, Word};
use crate::error::Error;
use crate::{check, expect, optional, repeat};
use arch::cond::Cond;
use arch::reg::{IdxReg, Reg16, Reg8, Reg8Idx, SpecReg};

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn parse(mut self, file: usize, line: usize) -> (Option<SourceLine>, Vec<Error>) {
        match self.parse_line() {
            Ok((label, stmt)) => {
                let line = SourceLine {
                    file,
                    line,
                    label,
                    stmt,
                    comment: None,
                };
                (Some(line), self.geterrors())
            }
            Err(err) => {
                self.error(err);
                (None, self.geterrors())
            }
        }
    }
}

impl<I: Iterator<Item = Token>> Parser<I> {
    /// line = directive | [ label ] [ stmt ]
    /// label = ident ":" | ident
    fn parse_line(&mut self) -> Result<(Option<String>, Option<Stmt>), Error> {
        let Some(first) = self.peek().cloned() else {
            return Ok((None, None));
        };
        let label;
        match first.kind {
            // Directive: "#" ident args
            Directive(name) => {
                self.next();
                let directive = self.parse_directive(&name)?;
                self.expect_end()?;
                return Ok((None, Some(Stmt::Directive(directive))));
            }

            // Anonymous field assignment: "->" pragma
            Arrow => {
                self.next();
                return Ok((None, Some(self.parse_field_assign(None)?)));
            }

            Ident(name) => {
                self.next();
                if check!(self, Colon) {
                    // Label: ident ":"
                    expect!(self, Colon)?;
                    label = Some(name);
                } else if let Some(word) = Word::parse(&name) {
                    return Ok((None, Some(self.parse_word(word)?)));
                } else {
                    match self.peek().map(|t| t.kind.clone()) {
                        // Invocation: ident "(" args ")"
                        Some(LParen) => return Ok((None, Some(self.parse_call(name)?))),

                        // Variable: ident ( "=" | ":=" ) expr
                        Some(Equal) | Some(ColonEqual) => {
                            self.next();
                            let expr = self.parse_expr()?;
                            self.expect_end()?;
                            return Ok((Some(name), Some(Stmt::Pragma(Pragma::Var(expr)))));
                        }

                        // Field assignment: ident "->" pragma
                        Some(Arrow) => {
                            self.next();
                            return Ok((None, Some(self.parse_field_assign(Some(name))?)));
                        }

                        // Label-only line
                        None => return Ok((Some(name), None)),

                        // Label without colon
                        _ => label = Some(name),
                    }
                }
            }

            _ => return Err(unexpected(&first)),
        }

        // Statement after the label
        let Some(token) = self.next() else {
            return Ok((label, None));
        };
        match &token.kind {
            Ident(name) => {
                if let Some(word) = Word::parse(name) {
                    Ok((label, Some(self.parse_word(word)?)))
                } else if check!(self, LParen) {
                    Ok((label, Some(self.parse_call(name.clone())?)))
                } else {
                    Err(unexpected(&token))
                }
            }
            _ => Err(unexpected(&token)),
        }
    }

    /// Statement introduced by a mnemonic or keyword
    fn parse_word(&mut self, word: Word) -> Result<Stmt, Error> {
        let stmt = match word {
            Word::Op(mnemonic) => {
                let operands = self.parse_operands()?;
                Stmt::Op(Operation {
                    mnemonic,
                    operands,
                })
            }
            Word::Kw(kw) => {
                if let Some(pragma) = self.parse_pragma(kw)? {
                    Stmt::Pragma(pragma)
                } else {
                    Stmt::Statement(self.parse_statement(kw)?)
                }
            }
        };
        self.expect_end()?;
        Ok(stmt)
    }

    /// pragma = keyword args
    fn parse_pragma(&mut self, kw: Keyword) -> Result<Option<Pragma>, Error> {
        use Keyword as K;
        let pragma = match kw {
            K::Org => Pragma::Org(self.parse_expr()?),
            K::Ent => Pragma::Ent(self.parse_expr()?),
            K::Xent => Pragma::Xent(self.parse_expr()?),
            K::Disp => Pragma::Disp(self.parse_expr()?),
            K::Equ => Pragma::Equ(self.parse_expr()?),
            K::Var => Pragma::Var(self.parse_expr()?),

            // skip = "skip" expr [ "," expr ]
            K::Skip => {
                let target = self.parse_expr()?;
                let fill = optional!(self, Comma, self.parse_expr()?);
                Pragma::Skip(target, fill)
            }

            // defb = "defb" expr { "," expr }
            K::DefB => Pragma::DefB(self.parse_expr_list()?),
            K::DefW => Pragma::DefW(self.parse_expr_list()?),
            K::DefM => Pragma::DefM(self.parse_expr()?),
            K::DefN => Pragma::DefN(self.parse_expr()?),
            K::DefC => Pragma::DefC(self.parse_expr()?),
            K::DefH => Pragma::DefH(self.parse_expr()?),
            K::DefS => Pragma::DefS(self.parse_expr()?),

            // fillb = "fillb" expr "," expr
            K::FillB | K::FillW => {
                let count = self.parse_expr()?;
                expect!(self, Comma)?;
                let value = self.parse_expr()?;
                match kw {
                    K::FillB => Pragma::FillB(count, value),
                    _ => Pragma::FillW(count, value),
                }
            }

            // model = "model" ( ident | number )
            K::Model => match self.next() {
                Some(Token {
                    kind: Ident(s) | Number(s, _),
                    ..
                }) => Pragma::Model(s),
                Some(token) => return Err(unexpected(&token)),
                None => return Err(Error::UnexpectedEOL),
            },

            K::Align => Pragma::Align(self.parse_optional_expr()?),
            K::Trace => Pragma::Trace(false, self.parse_expr_list()?),
            K::TraceHex => Pragma::Trace(true, self.parse_expr_list()?),
            K::RndSeed => Pragma::RndSeed(self.parse_optional_expr()?),
            K::DefG => Pragma::DefG(self.parse_expr()?),
            K::DefGX => Pragma::DefGX(self.parse_expr()?),
            K::Error => Pragma::Error(self.parse_expr()?),

            // includebin = "includebin" expr [ "," expr [ "," expr ] ]
            K::IncludeBin => {
                let file = self.parse_expr()?;
                let offset = optional!(self, Comma, self.parse_expr()?);
                let length = match offset {
                    Some(_) => optional!(self, Comma, self.parse_expr()?),
                    None => None,
                };
                Pragma::IncludeBin(file, offset, length)
            }

            _ => return Ok(None),
        };
        Ok(Some(pragma))
    }

    /// statement = keyword args
    fn parse_statement(&mut self, kw: Keyword) -> Result<Statement, Error> {
        use Keyword as K;
        let stmt = match kw {
            K::If => Statement::If(self.parse_expr()?),
            K::IfUsed => Statement::IfUsed(self.parse_symbol()?),
            K::IfNUsed => Statement::IfNUsed(self.parse_symbol()?),
            K::Elif => Statement::Elif(self.parse_expr()?),
            K::Else => Statement::Else,
            K::EndIf => Statement::EndIf,
            K::Loop => Statement::Loop(self.parse_expr()?),
            K::EndLoop => Statement::EndLoop,
            K::While => Statement::While(self.parse_expr()?),
            K::EndWhile => Statement::EndWhile,
            K::Repeat => Statement::Repeat,
            K::Until => Statement::Until(self.parse_expr()?),

            // for = "for" ident "=" expr "to" expr [ "step" expr ]
            K::For => {
                let var = self.parse_ident()?;
                if optional!(self, ColonEqual).is_none() {
                    expect!(self, Equal)?;
                }
                let from = self.parse_expr()?;
                self.expect_keyword(K::To)?;
                let to = self.parse_expr()?;
                let step = if self.check_keyword(K::Step) {
                    self.next();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Statement::For(var, from, to, step)
            }

            K::Next => Statement::Next,
            K::Break => Statement::Break,
            K::Continue => Statement::Continue,

            // macro = "macro" [ "(" [ ident { "," ident } ] ")" ]
            K::Macro => {
                let mut params = Vec::new();
                if optional!(self, LParen).is_some() {
                    if !check!(self, RParen) {
                        params.push(self.parse_ident()?);
                        while optional!(self, Comma).is_some() {
                            params.push(self.parse_ident()?);
                        }
                    }
                    expect!(self, RParen)?;
                }
                Statement::Macro(params)
            }

            K::EndMacro => Statement::EndMacro,
            K::Proc => Statement::Proc,
            K::EndProc => Statement::EndProc,

            // local = "local" ident { "," ident }
            K::Local => Statement::Local(repeat!(self, self.parse_ident(), Comma)),

            // module = "module" [ ident ]
            K::Module => match self.peek().map(|t| t.kind.clone()) {
                Some(Ident(_)) => Statement::Module(Some(self.parse_ident()?)),
                _ => Statement::Module(None),
            },

            K::EndModule => Statement::EndModule,
            K::Struct => Statement::Struct,
            K::EndStruct => Statement::EndStruct,

            // "to" and "step" only appear inside "for"
            _ => {
                return Err(Error::UnexpectedToken(format!("{kw:?}").to_ascii_lowercase()));
            }
        };
        Ok(stmt)
    }

    /// directive = "#define" ident | "#if" expr | "#include" string | ...
    fn parse_directive(&mut self, name: &str) -> Result<Directive, Error> {
        let directive = match name {
            "define" => Directive::Define(self.parse_ident()?),
            "undef" => Directive::Undef(self.parse_ident()?),
            "ifdef" => Directive::IfDef(self.parse_ident()?),
            "ifndef" => Directive::IfNDef(self.parse_ident()?),
            "if" => Directive::If(self.parse_expr()?),
            "ifmod" => Directive::IfMod(self.parse_model_name()?),
            "ifnmod" => Directive::IfNMod(self.parse_model_name()?),
            "else" => Directive::Else,
            "endif" => Directive::EndIf,
            "include" => match self.next() {
                Some(Token { kind: Text(s), .. }) => Directive::Include(s),
                Some(token) => return Err(unexpected(&token)),
                None => return Err(Error::UnexpectedEOL),
            },
            other => return Err(Error::UnexpectedToken(format!("#{other}"))),
        };
        Ok(directive)
    }

    /// call = ident "(" [ operand { "," operand } ] ")"
    fn parse_call(&mut self, name: String) -> Result<Stmt, Error> {
        expect!(self, LParen)?;
        let inner = self.take_group(LParen)?;
        self.expect_end()?;
        if inner.is_empty() {
            return Ok(Stmt::Call(name, Vec::new()));
        }
        // an empty argument stands for the empty string
        let args = split_operands(inner)
            .into_iter()
            .map(|part| match part.is_empty() {
                true => Ok(Operand::Expr(Expr::Text(String::new()))),
                false => parse_operand(part),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Stmt::Call(name, args))
    }

    /// field-assign = [ ident ] "->" pragma
    fn parse_field_assign(&mut self, field: Option<String>) -> Result<Stmt, Error> {
        let token = self.next().ok_or(Error::UnexpectedEOL)?;
        if let Ident(name) = &token.kind {
            if let Some(Word::Kw(kw)) = Word::parse(name) {
                if let Some(pragma) = self.parse_pragma(kw)? {
                    self.expect_end()?;
                    return Ok(Stmt::FieldAssign(field, pragma));
                }
            }
        }
        Err(unexpected(&token))
    }

    /// operands = [ operand { "," operand } ]
    fn parse_operands(&mut self) -> Result<Vec<Operand>, Error> {
        let mut rest = Vec::new();
        while let Some(token) = self.next() {
            rest.push(token);
        }
        if rest.is_empty() {
            return Ok(Vec::new());
        }
        split_operands(rest).into_iter().map(parse_operand).collect()
    }

    /// Tokens up to the bracket closing an already consumed opener
    fn take_group(&mut self, open: super::token::TokenKind) -> Result<Vec<Token>, Error> {
        let mut depth = 1;
        let mut inner = Vec::new();
        while let Some(token) = self.next() {
            match token.kind {
                LParen | LBracket => depth += 1,
                RParen | RBracket => {
                    depth -= 1;
                    if depth == 0 {
                        return match (&open, &token.kind) {
                            (LParen, RParen) | (LBracket, RBracket) => Ok(inner),
                            _ => Err(unexpected(&token)),
                        };
                    }
                }
                _ => {}
            }
            inner.push(token);
        }
        Err(Error::UnexpectedEOL)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, Error> {
        Ok(repeat!(self, self.parse_expr(), Comma))
    }

    fn parse_optional_expr(&mut self) -> Result<Option<Expr>, Error> {
        if self.at_end() {
            Ok(None)
        } else {
            self.parse_expr().map(Some)
        }
    }

    fn parse_model_name(&mut self) -> Result<String, Error> {
        match self.next() {
            Some(Token {
                kind: Ident(s) | Number(s, _),
                ..
            }) => Ok(s),
            Some(token) => Err(unexpected(&token)),
            None => Err(Error::UnexpectedEOL),
        }
    }

    fn check_keyword(&mut self, kw: Keyword) -> bool {
        self.check_if(|t| match &t.kind {
            Ident(s) => s.parse::<Keyword>().ok() == Some(kw),
            _ => false,
        })
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), Error> {
        self.expect_tobe(|t| match &t.kind {
            Ident(s) => s.parse::<Keyword>().ok() == Some(kw),
            _ => false,
        })
        .map(|_| ())
    }

    fn expect_end(&mut self) -> Result<(), Error> {
        match self.next() {
            Some(token) => Err(unexpected(&token)),
            None => Ok(()),
        }
    }

    /// symbol = [ "::" ] ident
    fn parse_symbol(&mut self) -> Result<SymbolRef, Error> {
        let rooted = optional!(self, ColonColon).is_some();
        let name = self.parse_ident()?;
        let mut symbol = SymbolRef::parse(&name);
        symbol.rooted = rooted;
        Ok(symbol)
    }

    /// ident = ( "A".."Z" | "a".."z" | "_" ) { "0".."9" | "A".."Z" | "a".."z" | "_" }
    fn parse_ident(&mut self) -> Result<String, Error> {
        match self.next() {
            Some(Token { kind: Ident(s), .. }) => Ok(s),
            Some(token) => Err(unexpected(&token)),
            None => Err(Error::UnexpectedEOL),
        }
    }
}

// ----------------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------------

impl<I: Iterator<Item = Token>> Parser<I> {
    /// expr = or-expr [ "?" expr ":" expr ]
    pub fn parse_expr(&mut self) -> Result<Expr, Error> {
        let cond = self.parse_or_expr()?;
        if check!(self, Question) {
            // Conditional: or-expr "?" expr ":" expr
            expect!(self, Question)?;
            let then = self.parse_expr()?;
            expect!(self, Colon)?;
            let other = self.parse_expr()?;
            return Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(other)));
        }
        Ok(cond)
    }

    /// or-expr = xor-expr { "|" xor-expr }
    fn parse_or_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_xor_expr()?;
        while check!(self, Pipe) {
            // Bitwise OR: expr "|" xor-expr
            expect!(self, Pipe)?;
            let rhs = self.parse_xor_expr()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs))
        }
        Ok(lhs)
    }

    /// xor-expr = and-expr { "^" and-expr }
    fn parse_xor_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_and_expr()?;
        while check!(self, Caret) {
            // Bitwise XOR: expr "^" and-expr
            expect!(self, Caret)?;
            let rhs = self.parse_and_expr()?;
            lhs = Expr::Binary(BinaryOp::Xor, Box::new(lhs), Box::new(rhs))
        }
        Ok(lhs)
    }

    /// and-expr = eq-expr { "&" eq-expr }
    fn parse_and_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_eq_expr()?;
        while check!(self, Ampasand) {
            // Bitwise AND: expr "&" eq-expr
            expect!(self, Ampasand)?;
            let rhs = self.parse_eq_expr()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs))
        }
        Ok(lhs)
    }

    /// eq-expr = relat-expr { ( "==" | "!=" ) relat-expr }
    fn parse_eq_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_relat_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(EqualEqual) => BinaryOp::Eq,
                Some(ExclEqual) => BinaryOp::Ne,
                _ => break,
            };
            self.next();
            let rhs = self.parse_relat_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// relat-expr = shift-expr { ( "<" | "<=" | ">" | ">=" ) shift-expr }
    fn parse_relat_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_shift_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(LAngleEqual) => BinaryOp::Le,
                Some(LAngle) => BinaryOp::Lt,
                Some(RAngleEqual) => BinaryOp::Ge,
                Some(RAngle) => BinaryOp::Gt,
                _ => break,
            };
            self.next();
            let rhs = self.parse_shift_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// shift-expr = add-expr { ( "<<" | ">>" ) add-expr }
    fn parse_shift_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_add_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(LAngleLAngle) => BinaryOp::Shl,
                Some(RAngleRAngle) => BinaryOp::Shr,
                _ => break,
            };
            self.next();
            let rhs = self.parse_add_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// add-expr = mul-expr { ( "+" | "-" ) mul-expr }
    fn parse_add_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_mul_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(Plus) => BinaryOp::Add,
                Some(Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.parse_mul_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// mul-expr = unary-expr { ( "*" | "/" | "%" ) unary-expr }
    fn parse_mul_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(Star) => BinaryOp::Mul,
                Some(Slash) => BinaryOp::Div,
                Some(Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.next();
            let rhs = self.parse_unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// unary-expr = ( "+" | "-" | "!" | "~" ) unary-expr | prim-expr
    fn parse_unary_expr(&mut self) -> Result<Expr, Error> {
        let op = match self.peek().map(|t| &t.kind) {
            Some(Plus) => UnaryOp::Pos,
            Some(Minus) => UnaryOp::Neg,
            Some(Excl) => UnaryOp::Not,
            Some(Tilde) => UnaryOp::Inv,
            _ => return self.parse_prim_expr(),
        };
        self.next();
        let expr = self.parse_unary_expr()?;
        Ok(Expr::Unary(op, Box::new(expr)))
    }

    /// prim-expr = "(" expr ")" | "[" expr "]" | literal | "$" | "." | "$cnt" | macro-param
    ///           | [ "::" ] ident | ident "(" [ expr { "," expr } ] ")"
    fn parse_prim_expr(&mut self) -> Result<Expr, Error> {
        let token = self.next().ok_or(Error::UnexpectedEOL)?;
        match token.kind {
            // Parenthesized expression: "(" expr ")"
            LParen => {
                let inner = self.parse_expr()?;
                expect!(self, RParen)?;
                Ok(inner)
            }

            // Bracketed expression: "[" expr "]"
            LBracket => {
                let inner = self.parse_expr()?;
                expect!(self, RBracket)?;
                Ok(inner)
            }

            // Literals
            Number(_, val) => Ok(Expr::Integer(val)),
            Real(_, val) => Ok(Expr::Real(val)),
            Text(s) => Ok(Expr::Text(s)),
            Char(s) => Ok(Expr::Integer(
                spectrum_bytes(&s).first().copied().unwrap_or(0) as i64,
            )),

            // Current address: "$" | "."
            Dollar | Period => Ok(Expr::CurAddr),

            // Loop counter: "$cnt"
            LoopCounter => Ok(Expr::LoopCounter),

            // Macro parameter: "{{" ident "}}"
            MacroParam(name) => Ok(Expr::MacroParam(name)),

            // Rooted symbol: "::" ident
            ColonColon => {
                let name = self.parse_ident()?;
                let mut symbol = SymbolRef::parse(&name);
                symbol.rooted = true;
                Ok(Expr::Symbol(symbol))
            }

            Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    return Ok(Expr::Bool(true));
                }
                if name.eq_ignore_ascii_case("false") {
                    return Ok(Expr::Bool(false));
                }

                // Function call: ident "(" [ expr { "," expr } ] ")"
                if !name.contains('.') && check!(self, LParen) {
                    expect!(self, LParen)?;
                    let mut args = Vec::new();
                    if !check!(self, RParen) {
                        args.push(self.parse_expr()?);
                        while optional!(self, Comma).is_some() {
                            args.push(self.parse_expr()?);
                        }
                    }
                    expect!(self, RParen)?;
                    return Ok(Expr::Call(name.to_ascii_lowercase(), args));
                }

                Ok(Expr::Symbol(SymbolRef::parse(&name)))
            }

            _ => Err(unexpected(&token)),
        }
    }
}

// ----------------------------------------------------------------------------
// Operands
// ----------------------------------------------------------------------------

/// Split tokens at the commas outside of brackets
fn split_operands(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut parts = vec![Vec::new()];
    let mut depth = 0i32;
    for token in tokens {
        match token.kind {
            LParen | LBracket => depth += 1,
            RParen | RBracket => depth -= 1,
            Comma if depth == 0 => {
                parts.push(Vec::new());
                continue;
            }
            _ => {}
        }
        if let Some(last) = parts.last_mut() {
            last.push(token);
        }
    }
    parts
}

/// Register and condition names usable as a whole operand
fn register_operand(name: &str) -> Option<Operand> {
    if name.eq_ignore_ascii_case("af'") {
        return Some(Operand::AFAlt);
    }
    if name.eq_ignore_ascii_case("af") {
        return Some(Operand::AF);
    }
    if let Ok(r) = Reg8::parse(name) {
        return Some(Operand::Reg8(r));
    }
    if let Ok(r) = Reg8Idx::parse(name) {
        return Some(Operand::Reg8Idx(r));
    }
    if let Ok(r) = SpecReg::parse(name) {
        return Some(Operand::Spec(r));
    }
    if let Ok(r) = Reg16::parse(name) {
        return Some(Operand::Reg16(r));
    }
    if let Ok(r) = IdxReg::parse(name) {
        return Some(Operand::Idx(r));
    }
    Cond::parse(name).ok().map(Operand::Cond)
}

fn parse_expr_tokens(tokens: Vec<Token>) -> Result<Expr, Error> {
    let mut parser = Parser::new(tokens.into_iter());
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// operand = register | condition | "(" indirect ")" | expr | macro-param
pub fn parse_operand(tokens: Vec<Token>) -> Result<Operand, Error> {
    match tokens.as_slice() {
        [] => return Err(Error::UnexpectedEOL),
        [Token { kind: Ident(name), .. }] => {
            if let Some(op) = register_operand(name) {
                return Ok(op);
            }
        }
        [Token {
            kind: MacroParam(name),
            ..
        }] => return Ok(Operand::MacroParam(name.clone())),
        _ => {}
    }

    // "(" ... ")" spanning the whole operand
    if matches!(tokens[0].kind, LParen) && closes_at_end(&tokens) {
        let inner = tokens[1..tokens.len() - 1].to_vec();
        if let [Token { kind: Ident(name), .. }] = inner.as_slice() {
            if name.eq_ignore_ascii_case("c") {
                return Ok(Operand::CPort);
            }
            if let Ok(r) = Reg16::parse(name) {
                return Ok(Operand::RegIndirect(r));
            }
            if let Ok(r) = IdxReg::parse(name) {
                return Ok(Operand::Indexed(r, None));
            }
        }
        if let [Token { kind: Ident(name), .. }, sign, rest @ ..] = inner.as_slice() {
            if let Ok(r) = IdxReg::parse(name) {
                let sign = match sign.kind {
                    Plus => Sign::Plus,
                    Minus => Sign::Minus,
                    _ => return Err(unexpected(sign)),
                };
                let disp = parse_expr_tokens(rest.to_vec())?;
                return Ok(Operand::Indexed(r, Some((sign, disp))));
            }
        }
        return Ok(Operand::Mem(parse_expr_tokens(inner)?));
    }

    Ok(Operand::Expr(parse_expr_tokens(tokens)?))
}

fn closes_at_end(tokens: &[Token]) -> bool {
    let mut depth = 0;
    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            LParen | LBracket => depth += 1,
            RParen | RBracket => {
                depth -= 1;
                if depth == 0 {
                    return idx == tokens.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammer::lexer::LineLexer;
    use arch::op::Mnemonic;
    use pretty_assertions::assert_eq;

    fn line(code: &str) -> SourceLine {
        let tokens = LineLexer::new(code, 0, 0).parse();
        let (line, errors) = Parser::new(tokens.into_iter()).parse(0, 0);
        assert!(errors.is_empty(), "{errors:?}");
        line.unwrap_or_else(|| panic!("no line for {code}"))
    }

    fn expr(code: &str) -> Expr {
        let tokens = LineLexer::new(code, 0, 0).parse();
        parse_expr_tokens(tokens).unwrap()
    }

    #[test]
    fn labels() {
        let l = line("Start: nop");
        assert_eq!(l.label.as_deref(), Some("Start"));
        let l = line("Start nop");
        assert_eq!(l.label.as_deref(), Some("Start"));
        let l = line("Hanging");
        assert_eq!(l.label.as_deref(), Some("Hanging"));
        assert_eq!(l.stmt, None);
        let l = line("loop: ret");
        assert_eq!(l.label.as_deref(), Some("loop"));
        let l = line("count = count + 1");
        assert_eq!(l.label.as_deref(), Some("count"));
        assert!(matches!(l.stmt, Some(Stmt::Pragma(Pragma::Var(_)))));
    }

    #[test]
    fn operands() {
        let l = line("ld (ix-3),a");
        let Some(Stmt::Op(op)) = l.stmt else { panic!() };
        assert_eq!(op.mnemonic, Mnemonic::LD);
        assert_eq!(
            op.operands,
            vec![
                Operand::Indexed(IdxReg::IX, Some((Sign::Minus, Expr::Integer(3)))),
                Operand::Reg8(Reg8::A),
            ]
        );

        let l = line("ld hl,(2+3)*2");
        let Some(Stmt::Op(op)) = l.stmt else { panic!() };
        assert!(matches!(op.operands[1], Operand::Expr(Expr::Binary(BinaryOp::Mul, ..))));

        let l = line("out (c),a");
        let Some(Stmt::Op(op)) = l.stmt else { panic!() };
        assert_eq!(op.operands[0], Operand::CPort);

        let l = line("jr nz,Target");
        let Some(Stmt::Op(op)) = l.stmt else { panic!() };
        assert_eq!(op.operands[0], Operand::Cond(Cond::NZ));
    }

    #[test]
    fn statements() {
        let l = line(".for _i = 1 .to 10 .step 2");
        assert!(matches!(
            l.stmt,
            Some(Stmt::Statement(Statement::For(ref v, _, _, Some(_)))) if v == "_i"
        ));
        let l = line("Sum: .macro(a, b)");
        assert_eq!(
            l.stmt,
            Some(Stmt::Statement(Statement::Macro(vec!["a".into(), "b".into()])))
        );
        let l = line("MyMacro(a, (hl), 3)");
        let Some(Stmt::Call(name, args)) = l.stmt else { panic!() };
        assert_eq!(name, "MyMacro");
        assert_eq!(args.len(), 3);
        assert_eq!(args[1], Operand::RegIndirect(Reg16::HL));
        let l = line("Here: MyMacro(1)");
        assert_eq!(l.label.as_deref(), Some("Here"));
        assert!(matches!(l.stmt, Some(Stmt::Call(ref name, ref args)) if name == "MyMacro" && args.len() == 1));
        let tokens = LineLexer::new("Here: Unknown", 0, 0).parse();
        let (l, errors) = Parser::new(tokens.into_iter()).parse(0, 0);
        assert!(l.is_none());
        assert_eq!(errors, vec![Error::UnexpectedToken("Unknown".into())]);
        let l = line("field1 -> .defb 3");
        assert!(matches!(l.stmt, Some(Stmt::FieldAssign(Some(_), Pragma::DefB(_)))));
        let l = line("#ifdef DEBUG");
        assert_eq!(l.stmt, Some(Stmt::Directive(Directive::IfDef("DEBUG".into()))));
    }

    #[test]
    fn precedence() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Integer(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Integer(2)),
                    Box::new(Expr::Integer(3))
                ))
            )
        );
        assert!(matches!(expr("a > 1 ? 2 : 3"), Expr::Cond(..)));
        assert!(matches!(expr("max(1, 2)"), Expr::Call(ref n, ref a) if n == "max" && a.len() == 2));
        assert_eq!(expr("'A'"), Expr::Integer(65));
    }

    #[test]
    fn syntax_errors() {
        let tokens = LineLexer::new("ld a,", 0, 0).parse();
        let (line, errors) = Parser::new(tokens.into_iter()).parse(0, 0);
        assert!(line.is_none());
        assert_eq!(errors, vec![Error::UnexpectedEOL]);
    }
}
