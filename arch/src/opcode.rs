use crate::op::Mnemonic;
use bimap::BiMap;
use once_cell::sync::Lazy;

/// Encodings of the instructions without operands.
/// Values above 0xFF carry their prefix in the high byte.
pub static TRIVIAL: Lazy<BiMap<Mnemonic, u16>> = Lazy::new(|| {
    use Mnemonic::*;
    let mut map = BiMap::new();
    for (op, code) in [
        (NOP, 0x00),
        (RLCA, 0x07),
        (RRCA, 0x0F),
        (RLA, 0x17),
        (RRA, 0x1F),
        (DAA, 0x27),
        (CPL, 0x2F),
        (SCF, 0x37),
        (CCF, 0x3F),
        (HALT, 0x76),
        (EXX, 0xD9),
        (DI, 0xF3),
        (EI, 0xFB),
        (NEG, 0xED44),
        (RETN, 0xED45),
        (RETI, 0xED4D),
        (RRD, 0xED67),
        (RLD, 0xED6F),
        (LDI, 0xEDA0),
        (CPI, 0xEDA1),
        (INI, 0xEDA2),
        (OUTI, 0xEDA3),
        (LDD, 0xEDA8),
        (CPD, 0xEDA9),
        (IND, 0xEDAA),
        (OUTD, 0xEDAB),
        (LDIR, 0xEDB0),
        (CPIR, 0xEDB1),
        (INIR, 0xEDB2),
        (OTIR, 0xEDB3),
        (LDDR, 0xEDB8),
        (CPDR, 0xEDB9),
        (INDR, 0xEDBA),
        (OTDR, 0xEDBB),
        (SWAPNIB, 0xED23),
        (MUL, 0xED30),
        (OUTINB, 0xED90),
        (LDIX, 0xEDA4),
        (LDIRX, 0xEDB4),
        (LDDX, 0xEDAC),
        (LDDRX, 0xEDBC),
        (PIXELDN, 0xED93),
        (PIXELAD, 0xED94),
        (SETAE, 0xED95),
        (LDPIRX, 0xEDB7),
        (LDIRSCALE, 0xEDB6),
    ] {
        map.insert(op, code);
    }
    map
});

pub fn trivial_opcode(op: Mnemonic) -> Option<u16> {
    TRIVIAL.get_by_left(&op).copied()
}

/// Reverse lookup, used by listings
pub fn trivial_mnemonic(code: u16) -> Option<Mnemonic> {
    TRIVIAL.get_by_right(&code).copied()
}

#[test]
fn test() {
    assert_eq!(trivial_opcode(Mnemonic::NOP), Some(0x00));
    assert_eq!(trivial_opcode(Mnemonic::LDIR), Some(0xEDB0));
    assert_eq!(trivial_opcode(Mnemonic::LD), None);
    assert_eq!(trivial_mnemonic(0xED30), Some(Mnemonic::MUL));
    assert_eq!(trivial_mnemonic(0x01), None);
}
