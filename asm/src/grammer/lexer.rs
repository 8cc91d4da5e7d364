use super::token::{Pos, Token, TokenKind};
use std::iter::Peekable;
use std::str::CharIndices;

pub struct Lexer<'a> {
    file: usize,
    code: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(file: usize, code: &'a str) -> Self {
        Self { file, code }
    }

    /// Tokens of each physical line
    pub fn parse(self) -> Vec<Vec<Token>> {
        self.code
            .lines()
            .enumerate()
            .map(|(idx, line)| LineLexer::new(line, self.file, idx).parse())
            .collect()
    }
}

pub struct LineLexer<'a> {
    iter: Peekable<CharIndices<'a>>,
    file: usize,
    line: usize,
}

impl<'a> LineLexer<'a> {
    pub fn new(code: &'a str, file: usize, line: usize) -> Self {
        Self {
            iter: code.char_indices().peekable(),
            file,
            line,
        }
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

impl<'a> LineLexer<'a> {
    fn peek_nth(&self, n: usize) -> Option<(usize, char)> {
        self.iter.clone().nth(n)
    }
    fn peek_char(&self, n: usize) -> Option<char> {
        self.peek_nth(n).map(|(_, ch)| ch)
    }
    fn consume(&mut self) -> Option<(usize, char)> {
        self.iter.next()
    }
    fn consume_while<F: Fn(char) -> bool>(&mut self, cond: F) -> String {
        let mut lexeme = String::new();
        while let Some((_, ch)) = self.iter.next_if(|(_, ch)| cond(*ch)) {
            lexeme.push(ch);
        }
        lexeme
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

const DIRECTIVES: [&str; 10] = [
    "define", "undef", "ifdef", "ifndef", "if", "ifmod", "ifnmod", "else", "endif", "include",
];

// ----------------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------------

impl<'a> LineLexer<'a> {
    pub fn parse(mut self) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();
        while let Some((idx, ch0)) = self.peek_nth(0) {
            // 0. Skip whitespaces
            if ch0.is_whitespace() {
                self.consume();
                continue;
            }

            let pos = Pos {
                file: self.file,
                line: self.line,
                col: idx,
            };
            let ch1 = self.peek_char(1);

            // 1. Comment
            if ch0 == ';' || (ch0 == '/' && ch1 == Some('/')) {
                self.consume();
                if ch0 == '/' {
                    self.consume();
                }
                while self.iter.next_if(|(_, c)| c.is_whitespace()).is_some() {}
                let comment = self.iter.by_ref().map(|(_, ch)| ch).collect::<String>();
                tokens.push(Token::new(TokenKind::Comment(comment), pos));
                break;
            }

            // 2. Preprocessor directive, only as the first token
            if ch0 == '#' && tokens.is_empty() {
                if let Some(kind) = self.parse_directive() {
                    tokens.push(Token::new(kind, pos));
                    continue;
                }
            }

            // 3. Macro parameter: {{name}}
            if ch0 == '{' && ch1 == Some('{') {
                tokens.push(Token::new(self.parse_macro_param(), pos));
                continue;
            }

            // 4. Prefixed numbers and the special '$' and '.' forms
            let prev_ends_operand = tokens
                .last()
                .map(|t| t.kind.ends_operand())
                .unwrap_or(false);
            match (ch0, ch1) {
                ('#', Some(c)) if c.is_ascii_hexdigit() => {
                    self.consume();
                    tokens.push(Token::new(self.parse_radix("#", 16), pos));
                    continue;
                }
                ('$', _) => {
                    tokens.push(Token::new(self.parse_dollar(), pos));
                    continue;
                }
                ('%', Some('0' | '1')) if !prev_ends_operand => {
                    self.consume();
                    tokens.push(Token::new(self.parse_radix("%", 2), pos));
                    continue;
                }
                ('.', Some(c)) if is_ident_start(c) => {
                    self.consume();
                    let name = self.consume_while(is_ident_char);
                    let kind = if name.eq_ignore_ascii_case("cnt") {
                        TokenKind::LoopCounter
                    } else {
                        TokenKind::Ident(name)
                    };
                    tokens.push(Token::new(kind, pos));
                    continue;
                }
                _ => {}
            }

            // 5. Double character token
            if let Some(ch1) = ch1 {
                if let Some(kind) = double_char_token(ch0, ch1) {
                    self.consume();
                    self.consume();
                    tokens.push(Token::new(kind, pos));
                    continue;
                }
            }

            // 6. Single character token
            if let Some(kind) = single_char_token(ch0) {
                self.consume();
                tokens.push(Token::new(kind, pos));
                continue;
            }

            // 7. Number literal
            if ch0.is_ascii_digit() {
                tokens.push(Token::new(self.parse_number(), pos));
                continue;
            }

            // 8. Char literal
            if ch0 == '\'' {
                tokens.push(Token::new(self.parse_quoted('\''), pos));
                continue;
            }

            // 9. String literal
            if ch0 == '"' {
                tokens.push(Token::new(self.parse_quoted('"'), pos));
                continue;
            }

            // 10. Identifier, possibly dotted
            if is_ident_start(ch0) {
                tokens.push(Token::new(self.parse_ident(), pos));
                continue;
            }

            // Error
            self.consume();
            tokens.push(Token::new(TokenKind::Error(format!("{ch0}")), pos));
        }
        tokens
    }

    fn parse_directive(&mut self) -> Option<TokenKind> {
        let name = self
            .iter
            .clone()
            .skip(1)
            .map(|(_, c)| c)
            .take_while(|c| is_ident_char(*c))
            .collect::<String>()
            .to_ascii_lowercase();
        if !DIRECTIVES.contains(&name.as_str()) {
            return None;
        }
        for _ in 0..=name.len() {
            self.consume();
        }
        Some(TokenKind::Directive(name))
    }

    fn parse_macro_param(&mut self) -> TokenKind {
        self.consume(); // consume '{'
        self.consume(); // consume '{'
        while self.iter.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let name = self.consume_while(is_ident_char);
        while self.iter.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        if name.is_empty() || self.peek_char(0) != Some('}') || self.peek_char(1) != Some('}') {
            return TokenKind::Error(format!("{{{{{name}"));
        }
        self.consume();
        self.consume();
        TokenKind::MacroParam(name)
    }

    // $: current address, $cnt: loop counter, $FF: hexadecimal
    fn parse_dollar(&mut self) -> TokenKind {
        self.consume();
        let word = self
            .iter
            .clone()
            .map(|(_, c)| c)
            .take_while(|c| is_ident_char(*c))
            .collect::<String>();
        if word.eq_ignore_ascii_case("cnt") {
            for _ in 0..3 {
                self.consume();
            }
            return TokenKind::LoopCounter;
        }
        match self.peek_char(0) {
            Some(c) if c.is_ascii_hexdigit() => self.parse_radix("$", 16),
            _ => TokenKind::Dollar,
        }
    }

    fn parse_radix(&mut self, prefix: &str, radix: u32) -> TokenKind {
        let digits = self.consume_while(is_ident_char);
        let lexeme = format!("{prefix}{digits}");
        match i64::from_str_radix(&digits.replace('_', ""), radix) {
            Ok(num) => TokenKind::Number(lexeme, num),
            Err(_) => TokenKind::Error(lexeme),
        }
    }

    fn parse_number(&mut self) -> TokenKind {
        let run = self.consume_while(is_ident_char);
        let plain = run.replace('_', "");
        let lower = plain.to_ascii_lowercase();
        let number = |digits: &str, radix: u32| match i64::from_str_radix(digits, radix) {
            Ok(num) if !digits.is_empty() => TokenKind::Number(run.clone(), num),
            _ => TokenKind::Error(run.clone()),
        };

        // 0x1F
        if let Some(hex) = lower.strip_prefix("0x") {
            return number(hex, 16);
        }
        // 1Fh
        if let Some(hex) = lower.strip_suffix('h') {
            if hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return number(hex, 16);
            }
        }
        // 0b0101
        if let Some(bin) = lower.strip_prefix("0b") {
            if !bin.is_empty() && bin.chars().all(|c| c == '0' || c == '1') {
                return number(bin, 2);
            }
        }
        // 0101b
        if let Some(bin) = lower.strip_suffix('b') {
            if bin.chars().all(|c| c == '0' || c == '1') {
                return number(bin, 2);
            }
        }
        // 123, 1.5, 1e3, 1.5e-3
        if lower.chars().all(|c| c.is_ascii_digit()) {
            let next_is_digit = self.peek_char(1).map(|c| c.is_ascii_digit());
            if self.peek_char(0) == Some('.') && next_is_digit == Some(true) {
                self.consume();
                let frac = self.consume_while(|c| c.is_ascii_digit());
                let exp = self.parse_exponent();
                return real(format!("{plain}.{frac}{exp}"));
            }
            return number(&plain, 10);
        }
        if let Some((mantissa, exp)) = lower.split_once('e') {
            if mantissa.chars().all(|c| c.is_ascii_digit()) {
                if !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit()) {
                    return real(lower.clone());
                }
                if exp.is_empty() {
                    let sign = self.peek_char(0);
                    let digit = self.peek_char(1).map(|c| c.is_ascii_digit());
                    if matches!(sign, Some('+' | '-')) && digit == Some(true) {
                        self.consume();
                        let digits = self.consume_while(|c| c.is_ascii_digit());
                        return real(format!("{lower}{}{digits}", sign.unwrap_or('+')));
                    }
                }
            }
        }
        TokenKind::Error(run)
    }

    fn parse_exponent(&mut self) -> String {
        if !matches!(self.peek_char(0), Some('e' | 'E')) {
            return String::new();
        }
        let (sign, first) = match (self.peek_char(1), self.peek_char(2)) {
            (Some(s @ ('+' | '-')), Some(d)) => (Some(s), d),
            (Some(d), _) => (None, d),
            _ => return String::new(),
        };
        if !first.is_ascii_digit() {
            return String::new();
        }
        self.consume();
        if sign.is_some() {
            self.consume();
        }
        let digits = self.consume_while(|c| c.is_ascii_digit());
        format!("e{}{digits}", sign.map(String::from).unwrap_or_default())
    }

    // Text: "hoge\"fuga", Char: 'a'
    fn parse_quoted(&mut self, quote: char) -> TokenKind {
        self.consume();

        let mut lexeme = String::new();
        while let Some((_, ch)) = self.consume() {
            match ch {
                '\\' => {
                    lexeme.push('\\');
                    if let Some((_, next)) = self.consume() {
                        lexeme.push(next);
                    }
                }
                c if c == quote => {
                    return match quote {
                        '"' => TokenKind::Text(lexeme),
                        _ if lexeme.is_empty() => TokenKind::Error("''".to_string()),
                        _ => TokenKind::Char(lexeme),
                    };
                }
                c => lexeme.push(c),
            }
        }
        TokenKind::Error(format!("{quote}{lexeme}"))
    }

    fn parse_ident(&mut self) -> TokenKind {
        let mut lexeme = self.consume_while(is_ident_char);

        // af'
        if lexeme.eq_ignore_ascii_case("af") && self.peek_char(0) == Some('\'') {
            self.consume();
            lexeme.push('\'');
            return TokenKind::Ident(lexeme);
        }

        // Module.Struct.field
        while self.peek_char(0) == Some('.') && self.peek_char(1).map(is_ident_start) == Some(true)
        {
            self.consume();
            lexeme.push('.');
            lexeme.push_str(&self.consume_while(is_ident_char));
        }
        TokenKind::Ident(lexeme)
    }
}

fn real(lexeme: String) -> TokenKind {
    match lexeme.parse::<f64>() {
        Ok(num) => TokenKind::Real(lexeme, num),
        Err(_) => TokenKind::Error(lexeme),
    }
}

fn double_char_token(ch0: char, ch1: char) -> Option<TokenKind> {
    match (ch0, ch1) {
        ('=', '=') => Some(TokenKind::EqualEqual),
        ('!', '=') => Some(TokenKind::ExclEqual),
        ('<', '=') => Some(TokenKind::LAngleEqual),
        ('>', '=') => Some(TokenKind::RAngleEqual),
        ('<', '<') => Some(TokenKind::LAngleLAngle),
        ('>', '>') => Some(TokenKind::RAngleRAngle),
        ('-', '>') => Some(TokenKind::Arrow),
        (':', ':') => Some(TokenKind::ColonColon),
        (':', '=') => Some(TokenKind::ColonEqual),
        _ => None,
    }
}

fn single_char_token(ch: char) -> Option<TokenKind> {
    match ch {
        '=' => Some(TokenKind::Equal),
        '+' => Some(TokenKind::Plus),
        '-' => Some(TokenKind::Minus),
        '*' => Some(TokenKind::Star),
        '/' => Some(TokenKind::Slash),
        '%' => Some(TokenKind::Percent),
        '&' => Some(TokenKind::Ampasand),
        '|' => Some(TokenKind::Pipe),
        '^' => Some(TokenKind::Caret),
        '!' => Some(TokenKind::Excl),
        '~' => Some(TokenKind::Tilde),
        '?' => Some(TokenKind::Question),
        ':' => Some(TokenKind::Colon),
        ',' => Some(TokenKind::Comma),
        '.' => Some(TokenKind::Period),
        '(' => Some(TokenKind::LParen),
        ')' => Some(TokenKind::RParen),
        '[' => Some(TokenKind::LBracket),
        ']' => Some(TokenKind::RBracket),
        '<' => Some(TokenKind::LAngle),
        '>' => Some(TokenKind::RAngle),
        _ => None,
    }
}

/// Bytes of a string literal with the ZX Spectrum escapes applied
pub fn spectrum_bytes(raw: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            bytes.push(ch as u32 as u8);
            continue;
        }
        let Some(esc) = chars.next() else {
            bytes.push(b'\\');
            break;
        };
        let byte = match esc {
            'i' => 0x10, // ink
            'p' => 0x11, // paper
            'f' => 0x12, // flash
            'b' => 0x13, // bright
            'I' => 0x14, // inverse
            'o' => 0x15, // over
            'a' => 0x16, // at
            't' => 0x17, // tab
            'P' => 0x60, // pound sign
            'C' => 0x7F, // copyright sign
            '0' => 0x00,
            'x' => {
                let mut value = None;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = Some(value.unwrap_or(0) * 16 + d);
                            chars.next();
                        }
                        None => break,
                    }
                }
                match value {
                    Some(v) => v as u8,
                    None => b'x',
                }
            }
            other => other as u32 as u8,
        };
        bytes.push(byte);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(code: &str) -> Vec<TokenKind> {
        LineLexer::new(code, 0, 0)
            .parse()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn numbers() {
        use TokenKind::*;
        assert_eq!(kinds("#1F"), vec![Number("#1F".into(), 0x1F)]);
        assert_eq!(kinds("$4000"), vec![Number("$4000".into(), 0x4000)]);
        assert_eq!(kinds("0x10"), vec![Number("0x10".into(), 0x10)]);
        assert_eq!(kinds("0FFh"), vec![Number("0FFh".into(), 0xFF)]);
        assert_eq!(kinds("%0101"), vec![Number("%0101".into(), 5)]);
        assert_eq!(kinds("0b11"), vec![Number("0b11".into(), 3)]);
        assert_eq!(kinds("101b"), vec![Number("101b".into(), 5)]);
        assert_eq!(kinds("1.5"), vec![Real("1.5".into(), 1.5)]);
        assert_eq!(kinds("2e3"), vec![Real("2e3".into(), 2000.0)]);
        assert_eq!(kinds("1.5e-1"), vec![Real("1.5e-1".into(), 0.15)]);
    }

    #[test]
    fn percent_is_modulo_after_operand() {
        use TokenKind::*;
        assert_eq!(
            kinds("7 % 1"),
            vec![Number("7".into(), 7), Percent, Number("1".into(), 1)]
        );
    }

    #[test]
    fn specials() {
        use TokenKind::*;
        assert_eq!(
            kinds("ex af,af'"),
            vec![Ident("ex".into()), Ident("af".into()), Comma, Ident("af'".into())]
        );
        assert_eq!(kinds("$cnt .cnt $"), vec![LoopCounter, LoopCounter, Dollar]);
        assert_eq!(
            kinds(".defb {{value}}"),
            vec![Ident("defb".into()), MacroParam("value".into())]
        );
        assert_eq!(kinds("#define DEBUG")[0], Directive("define".into()));
        assert_eq!(
            kinds("ld a,::Mod.Struct.field ; load"),
            vec![
                Ident("ld".into()),
                Ident("a".into()),
                Comma,
                ColonColon,
                Ident("Mod.Struct.field".into()),
                Comment("load".into()),
            ]
        );
    }

    #[test]
    fn strings() {
        use TokenKind::*;
        assert_eq!(kinds(r#""a\"b""#), vec![Text(r#"a\"b"#.into())]);
        assert_eq!(kinds("'x'"), vec![Char("x".into())]);
        assert!(matches!(kinds("\"open")[0], Error(_)));
        assert_eq!(spectrum_bytes(r"\i\P\C\x41\\"), vec![0x10, 0x60, 0x7F, 0x41, b'\\']);
    }
}
