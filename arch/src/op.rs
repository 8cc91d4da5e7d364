use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Default,
    FromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
)]
#[repr(u8)]
pub enum Mnemonic {
    // Operand-free
    #[default]
    NOP,
    RLCA,
    RRCA,
    RLA,
    RRA,
    DAA,
    CPL,
    SCF,
    CCF,
    HALT,
    EXX,
    DI,
    EI,
    NEG,
    RETN,
    RETI,
    RRD,
    RLD,
    LDI,
    CPI,
    INI,
    OUTI,
    LDD,
    CPD,
    IND,
    OUTD,
    LDIR,
    CPIR,
    INIR,
    OTIR,
    LDDR,
    CPDR,
    INDR,
    OTDR,

    // ZX Spectrum Next, operand-free
    SWAPNIB,
    MUL,
    OUTINB,
    LDIX,
    LDIRX,
    LDDX,
    LDDRX,
    PIXELDN,
    PIXELAD,
    SETAE,
    LDPIRX,
    LDIRSCALE,

    // Loads and arithmetic
    LD,
    INC,
    DEC,
    ADD,
    ADC,
    SUB,
    SBC,
    AND,
    XOR,
    OR,
    CP,

    // Bit manipulation
    BIT,
    RES,
    SET,
    RLC,
    RRC,
    RL,
    RR,
    SLA,
    SRA,
    #[strum(to_string = "SLL", serialize = "SLI")]
    SLL,
    SRL,

    // Flow
    JP,
    JR,
    DJNZ,
    CALL,
    RET,
    RST,

    // Stack, exchange, I/O
    PUSH,
    POP,
    EX,
    IN,
    OUT,
    IM,

    // ZX Spectrum Next, with operands
    TEST,
    MIRROR,
    NEXTREG,
}

impl Mnemonic {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Undefined Op: {s}")),
        }
    }

    pub fn alu(self) -> Option<AluOp> {
        use Mnemonic::*;
        match self {
            ADD => Some(AluOp::ADD),
            ADC => Some(AluOp::ADC),
            SUB => Some(AluOp::SUB),
            SBC => Some(AluOp::SBC),
            AND => Some(AluOp::AND),
            XOR => Some(AluOp::XOR),
            OR => Some(AluOp::OR),
            CP => Some(AluOp::CP),
            _ => None,
        }
    }

    pub fn shift(self) -> Option<ShiftOp> {
        use Mnemonic::*;
        match self {
            RLC => Some(ShiftOp::RLC),
            RRC => Some(ShiftOp::RRC),
            RL => Some(ShiftOp::RL),
            RR => Some(ShiftOp::RR),
            SLA => Some(ShiftOp::SLA),
            SRA => Some(ShiftOp::SRA),
            SLL => Some(ShiftOp::SLL),
            SRL => Some(ShiftOp::SRL),
            _ => None,
        }
    }

    /// Base of the `CB`-prefixed bit test/reset/set group
    pub fn bit_base(self) -> Option<u8> {
        match self {
            Mnemonic::BIT => Some(0x40),
            Mnemonic::RES => Some(0x80),
            Mnemonic::SET => Some(0xC0),
            _ => None,
        }
    }

    /// Instructions only the ZX Spectrum Next understands
    pub fn is_next_only(self) -> bool {
        use Mnemonic::*;
        matches!(
            self,
            SWAPNIB
                | MUL
                | OUTINB
                | LDIX
                | LDIRX
                | LDDX
                | LDDRX
                | PIXELDN
                | PIXELAD
                | SETAE
                | LDPIRX
                | LDIRSCALE
                | TEST
                | MIRROR
                | NEXTREG
        )
    }
}

/// 8-bit ALU group, in `alu` field order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, FromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum AluOp {
    #[default]
    ADD,
    ADC,
    SUB,
    SBC,
    AND,
    XOR,
    OR,
    CP,
}

impl AluOp {
    pub fn code(self) -> u8 {
        self.into()
    }

    /// These take an explicit `A` as their first operand
    pub fn needs_accumulator(self) -> bool {
        matches!(self, AluOp::ADD | AluOp::ADC | AluOp::SBC)
    }
}

/// Rotate and shift group of the `CB` table
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, FromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum ShiftOp {
    #[default]
    RLC,
    RRC,
    RL,
    RR,
    SLA,
    SRA,
    SLL,
    SRL,
}

impl ShiftOp {
    pub fn code(self) -> u8 {
        self.into()
    }
}

#[test]
fn test() {
    assert_eq!(Mnemonic::parse("ld"), Ok(Mnemonic::LD));
    assert_eq!(Mnemonic::parse("sli"), Ok(Mnemonic::SLL));
    assert!(Mnemonic::parse("hoge").is_err());
    assert_eq!(Mnemonic::SBC.alu().map(AluOp::code), Some(3));
    assert_eq!(Mnemonic::SRL.shift().map(ShiftOp::code), Some(7));
    assert_eq!(Mnemonic::RES.bit_base(), Some(0x80));
    assert!(Mnemonic::NEXTREG.is_next_only());
    assert!(!Mnemonic::LDIR.is_next_only());
}
