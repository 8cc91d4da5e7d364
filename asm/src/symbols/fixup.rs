use super::module::ModuleId;
use super::scope::ScopeId;
use crate::grammer::ast::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    /// Relative displacement of `jr`/`djnz`
    Jr,
    Bit8,
    Bit16,
    Equ,
    Ent,
    Xent,
    /// Field override inside a struct invocation
    StructBit8,
    StructBit16,
}

impl FixupKind {
    /// Bytes patched in the segment
    pub fn span(self) -> usize {
        match self {
            FixupKind::Bit16 | FixupKind::StructBit16 => 2,
            FixupKind::Jr | FixupKind::Bit8 | FixupKind::StructBit8 => 1,
            FixupKind::Equ | FixupKind::Ent | FixupKind::Xent => 0,
        }
    }
}

/// Symbol table slot receiving a late `.equ`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Local(ScopeId),
    Module(ModuleId),
}

/// An expression waiting for its symbols
#[derive(Debug, Clone)]
pub struct Fixup {
    pub kind: FixupKind,
    pub segment: usize,
    /// Offset of the patched byte within the segment. For `Jr`, the opcode's offset.
    pub offset: usize,
    pub expr: Expr,
    pub target: Option<(Slot, String)>,
    /// Scopes and module visible when the fixup was created
    pub scope: Option<ScopeId>,
    pub module: ModuleId,
    /// Value of `$` on the line that created it
    pub origin: u16,
    pub file: usize,
    pub line: usize,
    pub resolved: bool,
}

/// Relative jump displacement from the instruction at `addr`
pub fn relative_distance(target: i64, addr: u16) -> Option<u8> {
    let dist = target - (addr as i64 + 2);
    if (-128..=127).contains(&dist) {
        Some(dist as i8 as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert_eq!(relative_distance(0x8004, 0x8000), Some(2));
        assert_eq!(relative_distance(0x8000 + 2 + 127, 0x8000), Some(0x7F));
        assert_eq!(relative_distance(0x8000 + 2 - 128, 0x8000), Some(0x80));
        assert_eq!(relative_distance(0x8000 + 2 + 128, 0x8000), None);
        assert_eq!(relative_distance(0x8000 + 2 - 129, 0x8000), None);
    }
}
