use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// ZX Spectrum models a program can be built for
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
pub enum Model {
    #[default]
    #[strum(to_string = "SPECTRUM48", serialize = "48")]
    #[serde(alias = "48")]
    SPECTRUM48,
    #[strum(to_string = "SPECTRUM128", serialize = "128")]
    #[serde(alias = "128")]
    SPECTRUM128,
    #[strum(to_string = "SPECTRUMP3", serialize = "P3")]
    #[serde(alias = "P3")]
    SPECTRUMP3,
    NEXT,
}

impl Model {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(a) => Ok(a),
            Err(_) => Err(format!("Unknown model: {s}")),
        }
    }

    pub fn has_next_ops(self) -> bool {
        self == Model::NEXT
    }
}

#[test]
fn test() {
    assert_eq!(Model::parse("next"), Ok(Model::NEXT));
    assert_eq!(Model::parse("Spectrum128"), Ok(Model::SPECTRUM128));
    assert_eq!(Model::parse("48"), Ok(Model::SPECTRUM48));
    assert!(Model::parse("c64").is_err());
    assert!(Model::NEXT.has_next_ops());
}
