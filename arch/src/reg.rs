use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// 8-bit registers, numbered by their slot in the `r` field of an opcode.
/// Slot 6 belongs to `(HL)` and is never a register of its own.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Serialize,
    Deserialize,
    Default,
    FromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
    Eq,
)]
#[repr(u8)]
pub enum Reg8 {
    B = 0,
    C = 1,
    D = 2,
    E = 3,
    H = 4,
    L = 5,
    #[default]
    A = 7,
}

impl Reg8 {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown 8-bit register: {s}")),
        }
    }

    /// Index in the 3-bit register field
    pub fn code(self) -> u8 {
        self.into()
    }
}

/// Halves of the index registers (undocumented, but widely used)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Serialize,
    Deserialize,
    Default,
    FromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
    Eq,
)]
#[repr(u8)]
pub enum Reg8Idx {
    #[default]
    #[strum(to_string = "XH", serialize = "IXH", serialize = "HX")]
    XH,
    #[strum(to_string = "XL", serialize = "IXL", serialize = "LX")]
    XL,
    #[strum(to_string = "YH", serialize = "IYH", serialize = "HY")]
    YH,
    #[strum(to_string = "YL", serialize = "IYL", serialize = "LY")]
    YL,
}

impl Reg8Idx {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown index half register: {s}")),
        }
    }

    pub fn owner(self) -> IdxReg {
        match self {
            Reg8Idx::XH | Reg8Idx::XL => IdxReg::IX,
            Reg8Idx::YH | Reg8Idx::YL => IdxReg::IY,
        }
    }

    pub fn is_low(self) -> bool {
        matches!(self, Reg8Idx::XL | Reg8Idx::YL)
    }
}

/// 16-bit register pairs in `rr` field order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Serialize,
    Deserialize,
    Default,
    FromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
    Eq,
)]
#[repr(u8)]
pub enum Reg16 {
    #[default]
    BC,
    DE,
    HL,
    SP,
}

impl Reg16 {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown 16-bit register: {s}")),
        }
    }

    pub fn code(self) -> u8 {
        self.into()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Serialize,
    Deserialize,
    Default,
    FromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
    Eq,
)]
#[repr(u8)]
pub enum IdxReg {
    #[default]
    IX,
    IY,
}

impl IdxReg {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown index register: {s}")),
        }
    }

    pub fn prefix(self) -> u8 {
        match self {
            IdxReg::IX => 0xDD,
            IdxReg::IY => 0xFD,
        }
    }
}

/// Interrupt vector and refresh registers
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Serialize,
    Deserialize,
    Default,
    FromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
    Eq,
)]
#[repr(u8)]
pub enum SpecReg {
    #[default]
    I,
    R,
}

impl SpecReg {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown special register: {s}")),
        }
    }
}

#[test]
fn test() {
    assert_eq!(Reg8::parse("a"), Ok(Reg8::A));
    assert_eq!(Reg8::A.code(), 7);
    assert_eq!(Reg8::from(6u8), Reg8::A);
    assert!(Reg8::parse("hoge").is_err());
    assert_eq!(Reg8Idx::parse("ixh"), Ok(Reg8Idx::XH));
    assert_eq!(Reg8Idx::parse("ly"), Ok(Reg8Idx::YL));
    assert_eq!(Reg8Idx::YL.to_string(), "YL");
    assert_eq!(Reg8Idx::YL.owner(), IdxReg::IY);
    assert_eq!(Reg16::parse("sp").map(Reg16::code), Ok(3));
    assert_eq!(IdxReg::IY.prefix(), 0xFD);
    assert_eq!(SpecReg::parse("r"), Ok(SpecReg::R));
}
