use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Condition codes in `cc` field order
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
pub enum Cond {
    #[default]
    NZ,
    Z,
    NC,
    C,
    PO,
    PE,
    P,
    M,
}

impl Cond {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown condition: {s}")),
        }
    }

    pub fn code(self) -> u8 {
        self.into()
    }

    /// `jr` only knows the first four conditions
    pub fn is_relative(self) -> bool {
        self.code() < 4
    }
}

#[test]
fn test() {
    assert_eq!(Cond::parse("nz"), Ok(Cond::NZ));
    assert_eq!(Cond::parse("pe").map(Cond::code), Ok(5));
    assert!(Cond::C.is_relative());
    assert!(!Cond::M.is_relative());
    assert!(Cond::parse("hoge").is_err());
}
