use arch::cond::Cond;
use arch::op::Mnemonic;
use arch::reg::{IdxReg, Reg16, Reg8, Reg8Idx, SpecReg};
use std::fmt;

/// One physical source line after parsing
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub file: usize,
    pub line: usize,
    pub label: Option<String>,
    pub stmt: Option<Stmt>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Op(Operation),                       // mnemonic [ operand { "," operand } ]
    Pragma(Pragma),                      // "." pragma args
    Statement(Statement),                // "." statement args
    Directive(Directive),                // "#" directive args
    Call(String, Vec<Operand>),          // ident "(" [ operand { "," operand } ] ")"
    FieldAssign(Option<String>, Pragma), // [ ident ] "->" pragma
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg8(Reg8),                                // a, b, c, d, e, h, l
    Reg8Idx(Reg8Idx),                          // xh, xl, yh, yl
    Spec(SpecReg),                             // i, r
    Reg16(Reg16),                              // bc, de, hl, sp
    Idx(IdxReg),                               // ix, iy
    AF,                                        // af
    AFAlt,                                     // af'
    RegIndirect(Reg16),                        // "(" bc | de | hl | sp ")"
    CPort,                                     // "(" c ")"
    Indexed(IdxReg, Option<(Sign, Expr)>),     // "(" ix | iy [ ( "+" | "-" ) expr ] ")"
    Mem(Expr),                                 // "(" expr ")"
    Cond(Cond),                                // nz, z, nc, po, pe, p, m
    Expr(Expr),                                // expr
    MacroParam(String),                        // "{{" ident "}}"
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sign {
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pragma {
    Org(Expr),
    Ent(Expr),
    Xent(Expr),
    Disp(Expr),
    Equ(Expr),
    Var(Expr),
    Skip(Expr, Option<Expr>),
    DefB(Vec<Expr>),
    DefW(Vec<Expr>),
    DefM(Expr),
    DefN(Expr),
    DefC(Expr),
    DefH(Expr),
    DefS(Expr),
    FillB(Expr, Expr),
    FillW(Expr, Expr),
    Model(String),
    Align(Option<Expr>),
    Trace(bool, Vec<Expr>),
    RndSeed(Option<Expr>),
    DefG(Expr),
    DefGX(Expr),
    Error(Expr),
    IncludeBin(Expr, Option<Expr>, Option<Expr>),
}

impl Pragma {
    /// Pragmas that bind the line label themselves
    pub fn sets_label(&self) -> bool {
        matches!(self, Pragma::Org(_) | Pragma::Equ(_) | Pragma::Var(_))
    }

    /// Pragmas allowed in a struct body and in field assignments
    pub fn emits_data(&self) -> bool {
        use Pragma::*;
        matches!(
            self,
            DefB(_)
                | DefW(_)
                | DefM(_)
                | DefN(_)
                | DefC(_)
                | DefH(_)
                | DefS(_)
                | FillB(..)
                | FillW(..)
                | DefG(_)
                | DefGX(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    If(Expr),
    IfUsed(SymbolRef),
    IfNUsed(SymbolRef),
    Elif(Expr),
    Else,
    EndIf,
    Loop(Expr),
    EndLoop,
    While(Expr),
    EndWhile,
    Repeat,
    Until(Expr),
    For(String, Expr, Expr, Option<Expr>),
    Next,
    Break,
    Continue,
    Macro(Vec<String>),
    EndMacro,
    Proc,
    EndProc,
    Local(Vec<String>),
    Module(Option<String>),
    EndModule,
    Struct,
    EndStruct,
}

/// Statements that open or close a nested body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    If,
    Loop,
    While,
    Repeat,
    For,
    Macro,
    Proc,
    Module,
    Struct,
}

impl Block {
    /// Name of the closing statement, as shown in diagnostics
    pub fn closer(self) -> &'static str {
        match self {
            Block::If => "ENDIF",
            Block::Loop => "ENDL/LEND",
            Block::While => "ENDW/WEND",
            Block::Repeat => "UNTIL",
            Block::For => "NEXT",
            Block::Macro => "ENDM/MEND",
            Block::Proc => "ENDP/PEND",
            Block::Module => "ENDMODULE/MODULEEND",
            Block::Struct => "ENDS",
        }
    }

    pub fn opener(self) -> &'static str {
        match self {
            Block::If => "IF",
            Block::Loop => "LOOP",
            Block::While => "WHILE",
            Block::Repeat => "REPEAT",
            Block::For => "FOR",
            Block::Macro => "MACRO",
            Block::Proc => "PROC",
            Block::Module => "MODULE",
            Block::Struct => "STRUCT",
        }
    }
}

impl Statement {
    pub fn opens(&self) -> Option<Block> {
        use Statement::*;
        match self {
            If(_) | IfUsed(_) | IfNUsed(_) => Some(Block::If),
            Loop(_) => Some(Block::Loop),
            While(_) => Some(Block::While),
            Repeat => Some(Block::Repeat),
            For(..) => Some(Block::For),
            Macro(_) => Some(Block::Macro),
            Proc => Some(Block::Proc),
            Module(_) => Some(Block::Module),
            Struct => Some(Block::Struct),
            _ => None,
        }
    }

    pub fn closes(&self) -> Option<Block> {
        use Statement::*;
        match self {
            EndIf => Some(Block::If),
            EndLoop => Some(Block::Loop),
            EndWhile => Some(Block::While),
            Until(_) => Some(Block::Repeat),
            Next => Some(Block::For),
            EndMacro => Some(Block::Macro),
            EndProc => Some(Block::Proc),
            EndModule => Some(Block::Module),
            EndStruct => Some(Block::Struct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Define(String),
    Undef(String),
    IfDef(String),
    IfNDef(String),
    If(Expr),
    IfMod(String),
    IfNMod(String),
    Else,
    EndIf,
    Include(String),
}

/// Possibly qualified symbol name: `name`, `Mod.name`, `::Mod.name`
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRef {
    pub path: Vec<String>,
    pub rooted: bool,
}

impl SymbolRef {
    pub fn parse(text: &str) -> Self {
        let (rooted, rest) = match text.strip_prefix("::") {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        SymbolRef {
            path: rest.split('.').map(|s| s.to_ascii_uppercase()).collect(),
            rooted,
        }
    }

    /// Upper-cased dotted name without the root marker
    pub fn joined(&self) -> String {
        self.path.join(".")
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rooted {
            write!(f, "::")?;
        }
        write!(f, "{}", self.joined())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i64),                          // num-lit | char-lit
    Real(f64),                             // real-lit
    Bool(bool),                            // "true" | "false"
    Text(String),                          // string-lit
    Symbol(SymbolRef),                     // [ "::" ] ident { "." ident }
    CurAddr,                               // "$" | "."
    LoopCounter,                           // "$cnt"
    MacroParam(String),                    // "{{" ident "}}"
    Unary(UnaryOp, Box<Expr>),             // ( "+" | "-" | "!" | "~" ) expr
    Binary(BinaryOp, Box<Expr>, Box<Expr>), // expr (binop) expr
    Cond(Box<Expr>, Box<Expr>, Box<Expr>), // expr "?" expr ":" expr
    Call(String, Vec<Expr>),               // ident "(" [ expr { "," expr } ] ")"
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Pos, // "+"
    Neg, // "-"
    Not, // "!"
    Inv, // "~"
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add, // "+"
    Sub, // "-"
    Mul, // "*"
    Div, // "/"
    Mod, // "%"
    And, // "&"
    Or,  // "|"
    Xor, // "^"
    Shl, // "<<"
    Shr, // ">>"
    Eq,  // "=="
    Ne,  // "!="
    Lt,  // "<"
    Le,  // "<="
    Gt,  // ">"
    Ge,  // ">="
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Inv => "~",
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            And => "&",
            Or => "|",
            Xor => "^",
            Shl => "<<",
            Shr => ">>",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
        }
    }
}

impl Expr {
    /// Visit this expression and all of its subexpressions
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unary(_, e) => e.walk(f),
            Expr::Binary(_, l, r) => {
                l.walk(f);
                r.walk(f);
            }
            Expr::Cond(c, t, e) => {
                c.walk(f);
                t.walk(f);
                e.walk(f);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.walk(f)),
            _ => {}
        }
    }

    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        f(self);
        match self {
            Expr::Unary(_, e) => e.walk_mut(f),
            Expr::Binary(_, l, r) => {
                l.walk_mut(f);
                r.walk_mut(f);
            }
            Expr::Cond(c, t, e) => {
                c.walk_mut(f);
                t.walk_mut(f);
                e.walk_mut(f);
            }
            Expr::Call(_, args) => args.iter_mut().for_each(|a| a.walk_mut(f)),
            _ => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(v) => write!(f, "{v}"),
            Expr::Real(v) => write!(f, "{v}"),
            Expr::Bool(v) => write!(f, "{v}"),
            Expr::Text(s) => write!(f, "\"{s}\""),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::CurAddr => write!(f, "$"),
            Expr::LoopCounter => write!(f, "$cnt"),
            Expr::MacroParam(p) => write!(f, "{{{{{p}}}}}"),
            Expr::Unary(op, e) => write!(f, "{}{}", op.symbol(), e),
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::Cond(c, t, e) => write!(f, "({c} ? {t} : {e})"),
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg8(r) => write!(f, "{r}"),
            Operand::Reg8Idx(r) => write!(f, "{r}"),
            Operand::Spec(r) => write!(f, "{r}"),
            Operand::Reg16(r) => write!(f, "{r}"),
            Operand::Idx(r) => write!(f, "{r}"),
            Operand::AF => write!(f, "AF"),
            Operand::AFAlt => write!(f, "AF'"),
            Operand::RegIndirect(r) => write!(f, "({r})"),
            Operand::CPort => write!(f, "(C)"),
            Operand::Indexed(r, None) => write!(f, "({r})"),
            Operand::Indexed(r, Some((Sign::Plus, e))) => write!(f, "({r}+{e})"),
            Operand::Indexed(r, Some((Sign::Minus, e))) => write!(f, "({r}-{e})"),
            Operand::Mem(e) => write!(f, "({e})"),
            Operand::Cond(c) => write!(f, "{c}"),
            Operand::Expr(e) => write!(f, "{e}"),
            Operand::MacroParam(p) => write!(f, "{{{{{p}}}}}"),
        }
    }
}
