use arch::op::Mnemonic;
use strum::EnumString;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, pos: Pos) -> Self {
        Token { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Double character tokens
    EqualEqual,   // '=='
    ExclEqual,    // '!='
    RAngleEqual,  // '>='
    LAngleEqual,  // '<='
    LAngleLAngle, // '<<'
    RAngleRAngle, // '>>'
    Arrow,        // '->'
    ColonColon,   // '::'
    ColonEqual,   // ':='

    // Single character tokens
    Equal,    // '='
    Plus,     // '+'
    Minus,    // '-'
    Star,     // '*'
    Slash,    // '/'
    Percent,  // '%'
    Ampasand, // '&'
    Pipe,     // '|'
    Caret,    // '^'
    Excl,     // '!'
    Tilde,    // '~'
    Question, // '?'
    Colon,    // ':'
    Comma,    // ','
    Period,   // '.'
    Dollar,   // '$'
    LParen,   // '('
    RParen,   // ')'
    LBracket, // '['
    RBracket, // ']'
    LAngle,   // '<'
    RAngle,   // '>'

    // Names
    Ident(String),      // label, symbol, mnemonic, or keyword (dotted form without its dot)
    Directive(String),  // "#define", stored lower-case without '#'
    MacroParam(String), // "{{name}}"
    LoopCounter,        // "$cnt" | ".cnt"

    // Literals
    Number(String, i64),
    Real(String, f64),
    Text(String), // raw contents, escapes kept
    Char(String), // raw contents, escapes kept

    // Special
    Comment(String), // Comment
    Error(String),   // Error
}

impl TokenKind {
    /// Tokens after which a '%' is the modulo operator
    pub fn ends_operand(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Ident(_)
                | Number(..)
                | Real(..)
                | Text(_)
                | Char(_)
                | MacroParam(_)
                | LoopCounter
                | Dollar
                | Period
                | RParen
                | RBracket
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pos {
    pub file: usize,
    pub line: usize,
    pub col: usize,
}

/// Words with a fixed meaning at the start of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Keyword {
    // Pragmas
    #[strum(serialize = "org")]
    Org,
    #[strum(serialize = "ent")]
    Ent,
    #[strum(serialize = "xent")]
    Xent,
    #[strum(serialize = "disp")]
    Disp,
    #[strum(serialize = "equ")]
    Equ,
    #[strum(serialize = "var")]
    Var,
    #[strum(serialize = "skip")]
    Skip,
    #[strum(serialize = "defb", serialize = "db")]
    DefB,
    #[strum(serialize = "defw", serialize = "dw")]
    DefW,
    #[strum(serialize = "defm", serialize = "dm")]
    DefM,
    #[strum(serialize = "defn", serialize = "dn")]
    DefN,
    #[strum(serialize = "defc", serialize = "dc")]
    DefC,
    #[strum(serialize = "defh", serialize = "dh")]
    DefH,
    #[strum(serialize = "defs", serialize = "ds")]
    DefS,
    #[strum(serialize = "fillb")]
    FillB,
    #[strum(serialize = "fillw")]
    FillW,
    #[strum(serialize = "model")]
    Model,
    #[strum(serialize = "align")]
    Align,
    #[strum(serialize = "trace")]
    Trace,
    #[strum(serialize = "tracehex")]
    TraceHex,
    #[strum(serialize = "rndseed")]
    RndSeed,
    #[strum(serialize = "defg", serialize = "dg")]
    DefG,
    #[strum(serialize = "defgx", serialize = "dgx")]
    DefGX,
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "includebin", serialize = "include_bin")]
    IncludeBin,

    // Statements
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "ifused")]
    IfUsed,
    #[strum(serialize = "ifnused")]
    IfNUsed,
    #[strum(serialize = "elif")]
    Elif,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "endif")]
    EndIf,
    #[strum(serialize = "loop")]
    Loop,
    #[strum(serialize = "endl", serialize = "lend")]
    EndLoop,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "endw", serialize = "wend")]
    EndWhile,
    #[strum(serialize = "repeat")]
    Repeat,
    #[strum(serialize = "until")]
    Until,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "to")]
    To,
    #[strum(serialize = "step")]
    Step,
    #[strum(serialize = "next")]
    Next,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "continue")]
    Continue,
    #[strum(serialize = "macro")]
    Macro,
    #[strum(serialize = "endm", serialize = "mend")]
    EndMacro,
    #[strum(serialize = "proc")]
    Proc,
    #[strum(serialize = "endp", serialize = "pend")]
    EndProc,
    #[strum(serialize = "local")]
    Local,
    #[strum(serialize = "module", serialize = "scope")]
    Module,
    #[strum(
        serialize = "endmodule",
        serialize = "endmod",
        serialize = "moduleend",
        serialize = "endscope",
        serialize = "scopeend"
    )]
    EndModule,
    #[strum(serialize = "struct")]
    Struct,
    #[strum(serialize = "ends")]
    EndStruct,
}

/// Classification of an identifier at statement position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Word {
    Op(Mnemonic),
    Kw(Keyword),
}

impl Word {
    pub fn parse(s: &str) -> Option<Word> {
        if let Ok(kw) = s.parse::<Keyword>() {
            return Some(Word::Kw(kw));
        }
        Mnemonic::parse(s).ok().map(Word::Op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words() {
        assert_eq!(Word::parse("DB"), Some(Word::Kw(Keyword::DefB)));
        assert_eq!(Word::parse("EndMod"), Some(Word::Kw(Keyword::EndModule)));
        assert_eq!(Word::parse("ldir"), Some(Word::Op(Mnemonic::LDIR)));
        assert_eq!(Word::parse("MyLabel"), None);
    }
}
