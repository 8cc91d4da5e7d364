//! Z80 instruction encoder

use super::{Assembler, Code};
use crate::error::Error;
use crate::eval::Evaluated;
use crate::grammer::ast::{Expr, Operand as O, Operation, Sign, UnaryOp};
use crate::symbols::fixup::{relative_distance, FixupKind};
use crate::value::Value;
use arch::cond::Cond;
use arch::model::Model;
use arch::op::{AluOp, Mnemonic};
use arch::opcode::trivial_opcode;
use arch::reg::{IdxReg, Reg16, Reg8, SpecReg};

impl Code {
    /// Opcode with an optional prefix in its high byte
    fn op(&mut self, code: u16) {
        if code > 0xFF {
            self.byte((code >> 8) as u8);
        }
        self.byte(code as u8);
    }
}

/// `c` reads as a register until a condition is expected
fn condition(op: &O) -> Option<Cond> {
    match op {
        O::Cond(c) => Some(*c),
        O::Reg8(Reg8::C) => Some(Cond::C),
        _ => None,
    }
}

fn invalid(m: Mnemonic) -> Error {
    Error::InvalidOperation(m.to_string())
}

impl Assembler {
    /// Model the code is built for: the `.model` pragma, else the option
    pub fn effective_model(&self) -> Model {
        self.model
            .or(self.options.current_model)
            .unwrap_or_default()
    }

    fn require_next(&self) -> Result<(), Error> {
        if self.effective_model().has_next_ops() {
            Ok(())
        } else {
            Err(Error::NextOnly)
        }
    }

    // ------------------------------------------------------------------------
    // Operand bytes
    // ------------------------------------------------------------------------

    /// Append an 8 or 16-bit value, or a placeholder with a fixup when it is not known yet
    pub(super) fn immediate(&mut self, code: &mut Code, expr: &Expr, kind: FixupKind) -> Result<(), Error> {
        let value = match self.eval(expr)? {
            Evaluated::Ready(Value::String(_)) => return Err(Error::NumericExpected),
            Evaluated::Ready(v) => v.as_word().unwrap_or_default(),
            Evaluated::Pending(_) => {
                code.fixups.push((kind, code.len(), expr.clone()));
                0
            }
        };
        code.byte(value as u8);
        if kind == FixupKind::Bit16 {
            code.byte((value >> 8) as u8);
        }
        Ok(())
    }

    fn displacement(&mut self, code: &mut Code, disp: &Option<(Sign, Expr)>) -> Result<(), Error> {
        match disp {
            None => {
                code.byte(0);
                Ok(())
            }
            Some((Sign::Plus, e)) => self.immediate(code, e, FixupKind::Bit8),
            Some((Sign::Minus, e)) => {
                let negated = Expr::Unary(UnaryOp::Neg, Box::new(e.clone()));
                self.immediate(code, &negated, FixupKind::Bit8)
            }
        }
    }

    /// prefix, opcode, displacement
    fn indexed(
        &mut self,
        code: &mut Code,
        reg: IdxReg,
        disp: &Option<(Sign, Expr)>,
        opcode: u8,
    ) -> Result<(), Error> {
        code.extend(&[reg.prefix(), opcode]);
        self.displacement(code, disp)
    }

    /// Relative branch measured from the opcode's own address
    fn relative(&mut self, code: &mut Code, opcode: u8, target: &O) -> Result<(), Error> {
        let O::Expr(expr) = target else {
            return Err(Error::InvalidOperand(
                Mnemonic::JR.to_string(),
                target.to_string(),
            ));
        };
        let dist = match self.eval(expr)? {
            Evaluated::Ready(Value::String(_)) => return Err(Error::NumericExpected),
            Evaluated::Ready(v) => {
                let target = v.as_word().unwrap_or_default() as i64;
                relative_distance(target, self.origin)
                    .ok_or(Error::RelativeJump(target - (self.origin as i64 + 2)))?
            }
            Evaluated::Pending(_) => {
                code.fixups.push((FixupKind::Jr, code.len(), expr.clone()));
                0
            }
        };
        code.extend(&[opcode, dist]);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    pub fn emit_operation(&mut self, op: &Operation) -> Result<(), Error> {
        use Mnemonic::*;
        let m = op.mnemonic;
        if m.is_next_only() {
            self.require_next()?;
        }
        let ops = op.operands.as_slice();
        let mut code = Code::new();

        if let Some(opcode) = trivial_opcode(m) {
            match (m, ops) {
                (_, []) => code.op(opcode),
                (MUL, [O::Reg8(Reg8::D), O::Reg8(Reg8::E)]) => code.op(opcode),
                _ => return Err(invalid(m)),
            }
            return self.emit_code(code);
        }

        match m {
            LD => self.encode_ld(&mut code, ops)?,
            INC | DEC => self.encode_inc_dec(&mut code, m, ops)?,
            BIT | RES | SET => self.encode_bit(&mut code, m, ops)?,
            JP => self.encode_jp(&mut code, ops)?,
            JR => match ops {
                [target] => self.relative(&mut code, 0x18, target)?,
                [cc, target] => {
                    let c = condition(cc).ok_or_else(|| invalid(m))?;
                    if !c.is_relative() {
                        return Err(Error::Condition(m.to_string(), c.to_string()));
                    }
                    self.relative(&mut code, 0x20 | c.code() << 3, target)?
                }
                _ => return Err(invalid(m)),
            },
            DJNZ => match ops {
                [target] => self.relative(&mut code, 0x10, target)?,
                _ => return Err(invalid(m)),
            },
            CALL => match ops {
                [O::Expr(e)] => {
                    code.byte(0xCD);
                    self.immediate(&mut code, e, FixupKind::Bit16)?;
                }
                [cc, O::Expr(e)] => {
                    let c = condition(cc).ok_or_else(|| invalid(m))?;
                    code.byte(0xC4 | c.code() << 3);
                    self.immediate(&mut code, e, FixupKind::Bit16)?;
                }
                _ => return Err(invalid(m)),
            },
            RET => match ops {
                [] => code.byte(0xC9),
                [cc] => {
                    let c = condition(cc).ok_or_else(|| invalid(m))?;
                    code.byte(0xC0 | c.code() << 3);
                }
                _ => return Err(invalid(m)),
            },
            RST => match ops {
                [O::Expr(e)] => {
                    let target = self.eval_int(e)?;
                    if target % 8 != 0 || !(0..=0x38).contains(&target) {
                        return Err(Error::RstTarget(target));
                    }
                    code.byte(0xC7 | target as u8);
                }
                _ => return Err(invalid(m)),
            },
            PUSH | POP => self.encode_stack(&mut code, m, ops)?,
            EX => self.encode_ex(&mut code, ops)?,
            IN => self.encode_in(&mut code, ops)?,
            OUT => self.encode_out(&mut code, ops)?,
            IM => match ops {
                [O::Expr(e)] => match self.eval_int(e)? {
                    0 => code.op(0xED46),
                    1 => code.op(0xED56),
                    2 => code.op(0xED5E),
                    mode => return Err(Error::InterruptMode(mode)),
                },
                _ => return Err(invalid(m)),
            },
            TEST => match ops {
                [O::Expr(e)] => {
                    code.op(0xED27);
                    self.immediate(&mut code, e, FixupKind::Bit8)?;
                }
                _ => return Err(invalid(m)),
            },
            MIRROR => match ops {
                [O::Reg8(Reg8::A)] => code.op(0xED24),
                [O::Reg16(Reg16::DE)] => code.op(0xED26),
                [other] => return Err(Error::FirstOperand(m.to_string(), other.to_string())),
                _ => return Err(invalid(m)),
            },
            NEXTREG => match ops {
                [O::Expr(reg), O::Reg8(Reg8::A)] => {
                    code.op(0xED92);
                    self.immediate(&mut code, reg, FixupKind::Bit8)?;
                }
                [O::Expr(reg), O::Expr(value)] => {
                    code.op(0xED91);
                    self.immediate(&mut code, reg, FixupKind::Bit8)?;
                    self.immediate(&mut code, value, FixupKind::Bit8)?;
                }
                [O::Expr(_), other] => {
                    return Err(Error::SecondOperand(
                        m.to_string(),
                        "<expr>".into(),
                        other.to_string(),
                    ))
                }
                _ => return Err(invalid(m)),
            },
            _ => {
                if let Some(alu) = m.alu() {
                    self.encode_alu(&mut code, m, alu, ops)?;
                } else if let Some(shift) = m.shift() {
                    match ops {
                        [target] => self.encode_cb(&mut code, m, shift.code() << 3, target, None)?,
                        [target @ O::Indexed(..), O::Reg8(r)] => {
                            self.encode_cb(&mut code, m, shift.code() << 3, target, Some(*r))?
                        }
                        _ => return Err(invalid(m)),
                    }
                } else {
                    return Err(invalid(m));
                }
            }
        }
        self.emit_code(code)
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    fn encode_ld(&mut self, code: &mut Code, ops: &[O]) -> Result<(), Error> {
        let [dst, src] = ops else {
            return Err(invalid(Mnemonic::LD));
        };
        let bad = || Error::InvalidLoad(dst.to_string(), src.to_string());
        match (dst, src) {
            // 8-bit destination
            (O::Reg8(d), O::Reg8(s)) => code.byte(0x40 | d.code() << 3 | s.code()),
            (O::Reg8(Reg8::A), O::RegIndirect(Reg16::BC)) => code.byte(0x0A),
            (O::Reg8(Reg8::A), O::RegIndirect(Reg16::DE)) => code.byte(0x1A),
            (O::Reg8(d), O::RegIndirect(Reg16::HL)) => code.byte(0x46 | d.code() << 3),
            (O::Reg8(Reg8::A), O::Spec(SpecReg::I)) => code.op(0xED57),
            (O::Reg8(Reg8::A), O::Spec(SpecReg::R)) => code.op(0xED5F),
            (O::Reg8(d), O::Reg8Idx(s)) if !matches!(d, Reg8::H | Reg8::L) => {
                code.extend(&[s.owner().prefix(), 0x44 | d.code() << 3 | s.is_low() as u8])
            }
            (O::Reg8(d), O::Expr(e)) => {
                code.byte(0x06 | d.code() << 3);
                self.immediate(code, e, FixupKind::Bit8)?;
            }
            (O::Reg8(Reg8::A), O::Mem(e)) => {
                code.byte(0x3A);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Reg8(d), O::Indexed(r, disp)) => self.indexed(code, *r, disp, 0x46 | d.code() << 3)?,

            // index halves
            (O::Reg8Idx(d), O::Reg8(s)) if !matches!(s, Reg8::H | Reg8::L) => {
                code.extend(&[d.owner().prefix(), 0x60 | (d.is_low() as u8) << 3 | s.code()])
            }
            (O::Reg8Idx(d), O::Reg8Idx(s)) if d.owner() == s.owner() => code.extend(&[
                d.owner().prefix(),
                0x64 | (d.is_low() as u8) << 3 | s.is_low() as u8,
            ]),
            (O::Reg8Idx(d), O::Expr(e)) => {
                code.extend(&[d.owner().prefix(), 0x26 | (d.is_low() as u8) << 3]);
                self.immediate(code, e, FixupKind::Bit8)?;
            }

            // i, r
            (O::Spec(SpecReg::I), O::Reg8(Reg8::A)) => code.op(0xED47),
            (O::Spec(SpecReg::R), O::Reg8(Reg8::A)) => code.op(0xED4F),

            // register indirect destination
            (O::RegIndirect(Reg16::BC), O::Reg8(Reg8::A)) => code.byte(0x02),
            (O::RegIndirect(Reg16::DE), O::Reg8(Reg8::A)) => code.byte(0x12),
            (O::RegIndirect(Reg16::HL), O::Reg8(s)) => code.byte(0x70 | s.code()),
            (O::RegIndirect(Reg16::HL), O::Expr(e)) => {
                code.byte(0x36);
                self.immediate(code, e, FixupKind::Bit8)?;
            }

            // memory destination
            (O::Mem(e), O::Reg8(Reg8::A)) => {
                code.byte(0x32);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Mem(e), O::Reg16(Reg16::HL)) => {
                code.byte(0x22);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Mem(e), O::Reg16(s)) => {
                code.op(0xED43 | (s.code() as u16) << 4);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Mem(e), O::Idx(r)) => {
                code.extend(&[r.prefix(), 0x22]);
                self.immediate(code, e, FixupKind::Bit16)?;
            }

            // 16-bit destination
            (O::Reg16(Reg16::HL), O::Mem(e)) => {
                code.byte(0x2A);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Reg16(d), O::Mem(e)) => {
                code.op(0xED4B | (d.code() as u16) << 4);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Reg16(d), O::Expr(e)) => {
                code.byte(0x01 | d.code() << 4);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Reg16(Reg16::SP), O::Reg16(Reg16::HL)) => code.byte(0xF9),
            (O::Reg16(Reg16::SP), O::Idx(r)) => code.extend(&[r.prefix(), 0xF9]),
            (O::Idx(r), O::Mem(e)) => {
                code.extend(&[r.prefix(), 0x2A]);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (O::Idx(r), O::Expr(e)) => {
                code.extend(&[r.prefix(), 0x21]);
                self.immediate(code, e, FixupKind::Bit16)?;
            }

            // indexed destination
            (O::Indexed(r, disp), O::Reg8(s)) => self.indexed(code, *r, disp, 0x70 | s.code())?,
            (O::Indexed(r, disp), O::Expr(e)) => {
                self.indexed(code, *r, disp, 0x36)?;
                self.immediate(code, e, FixupKind::Bit8)?;
            }
            _ => return Err(bad()),
        }
        Ok(())
    }

    fn encode_inc_dec(&mut self, code: &mut Code, m: Mnemonic, ops: &[O]) -> Result<(), Error> {
        let dec = (m == Mnemonic::DEC) as u8;
        match ops {
            [O::Reg8(r)] => code.byte(0x04 | r.code() << 3 | dec),
            [O::RegIndirect(Reg16::HL)] => code.byte(0x34 | dec),
            [O::Indexed(r, disp)] => self.indexed(code, *r, disp, 0x34 | dec)?,
            [O::Reg8Idx(r)] => {
                code.extend(&[r.owner().prefix(), 0x24 | (r.is_low() as u8) << 3 | dec])
            }
            [O::Reg16(r)] => code.byte(0x03 | r.code() << 4 | dec << 3),
            [O::Idx(r)] => code.extend(&[r.prefix(), 0x23 | dec << 3]),
            [other] => return Err(Error::InvalidOperand(m.to_string(), other.to_string())),
            _ => return Err(invalid(m)),
        }
        Ok(())
    }

    fn encode_alu(&mut self, code: &mut Code, m: Mnemonic, alu: AluOp, ops: &[O]) -> Result<(), Error> {
        let name = m.to_string();
        let operand = match ops {
            [O::Reg8(Reg8::A), src] => src,
            [dst @ (O::Reg16(_) | O::Idx(_)), src] if alu.needs_accumulator() => {
                return self.encode_alu16(code, m, alu, dst, src)
            }
            [O::Reg8(_), _] if alu.needs_accumulator() => return Err(Error::AccumulatorOnly(name)),
            [_, _] if alu.needs_accumulator() => return Err(invalid(m)),
            [_, _] => return Err(Error::TwoArgumentForm(name)),
            [src] if !alu.needs_accumulator() => src,
            _ => return Err(invalid(m)),
        };
        let base = alu.code() << 3;
        match operand {
            O::Reg8(r) => code.byte(0x80 | base | r.code()),
            O::RegIndirect(Reg16::HL) => code.byte(0x86 | base),
            O::Reg8Idx(r) => code.extend(&[r.owner().prefix(), 0x84 | base | r.is_low() as u8]),
            O::Indexed(r, disp) => self.indexed(code, *r, disp, 0x86 | base)?,
            O::Expr(e) => {
                code.byte(0xC6 | base);
                self.immediate(code, e, FixupKind::Bit8)?;
            }
            other => return Err(Error::AluSecondOperand(name, other.to_string())),
        }
        Ok(())
    }

    fn encode_alu16(&mut self, code: &mut Code, m: Mnemonic, alu: AluOp, dst: &O, src: &O) -> Result<(), Error> {
        let bad = || Error::SecondOperand(m.to_string(), dst.to_string(), src.to_string());
        match (alu, dst, src) {
            (_, O::Reg16(Reg16::HL), O::Reg16(r)) => {
                let base: u16 = match alu {
                    AluOp::ADD => 0x09,
                    AluOp::ADC => 0xED4A,
                    _ => 0xED42,
                };
                code.op(base | (r.code() as u16) << 4);
            }
            (AluOp::ADD, O::Reg16(d), O::Reg8(Reg8::A)) if *d != Reg16::SP => {
                self.require_next()?;
                code.op(match d {
                    Reg16::HL => 0xED31,
                    Reg16::DE => 0xED32,
                    _ => 0xED33,
                });
            }
            (AluOp::ADD, O::Reg16(d), O::Expr(e)) if *d != Reg16::SP => {
                self.require_next()?;
                code.op(match d {
                    Reg16::HL => 0xED34,
                    Reg16::DE => 0xED35,
                    _ => 0xED36,
                });
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            (AluOp::ADD, O::Reg16(d), O::Reg8(_)) if *d != Reg16::SP => return Err(bad()),
            (AluOp::ADD, O::Idx(i), O::Reg16(r)) if *r != Reg16::HL => {
                code.extend(&[i.prefix(), 0x09 | r.code() << 4])
            }
            (AluOp::ADD, O::Idx(i), O::Idx(j)) if i == j => code.extend(&[i.prefix(), 0x29]),
            (_, O::Reg16(Reg16::HL), _) | (AluOp::ADD, O::Idx(_), _) => return Err(bad()),
            (_, O::Idx(_), _) => return Err(invalid(m)),
            _ => return Err(Error::FirstOperand(m.to_string(), dst.to_string())),
        }
        Ok(())
    }

    fn encode_bit(&mut self, code: &mut Code, m: Mnemonic, ops: &[O]) -> Result<(), Error> {
        let base = m.bit_base().ok_or_else(|| invalid(m))?;
        let (index, target, copy) = match ops {
            [O::Expr(n), target] => (n, target, None),
            [O::Expr(n), target @ O::Indexed(..), O::Reg8(r)] => (n, target, Some(*r)),
            _ => return Err(invalid(m)),
        };
        let bit = self.eval_int(index)?;
        if !(0..=7).contains(&bit) {
            return Err(Error::BitIndex(bit));
        }
        self.encode_cb(code, m, base | (bit as u8) << 3, target, copy)
    }

    /// `CB`-prefixed forms on a register, `(hl)` or `(ix+d)`
    fn encode_cb(
        &mut self,
        code: &mut Code,
        m: Mnemonic,
        opcode: u8,
        target: &O,
        copy: Option<Reg8>,
    ) -> Result<(), Error> {
        match (target, copy) {
            (O::Reg8(r), None) => code.extend(&[0xCB, opcode | r.code()]),
            (O::RegIndirect(Reg16::HL), None) => code.extend(&[0xCB, opcode | 6]),
            (O::Indexed(r, disp), _) => {
                code.extend(&[r.prefix(), 0xCB]);
                self.displacement(code, disp)?;
                code.byte(opcode | copy.map_or(6, Reg8::code));
            }
            (other, None) => return Err(Error::InvalidOperand(m.to_string(), other.to_string())),
            _ => return Err(invalid(m)),
        }
        Ok(())
    }

    fn encode_jp(&mut self, code: &mut Code, ops: &[O]) -> Result<(), Error> {
        let indirect = |op: &O| matches!(op, O::RegIndirect(_) | O::Indexed(..) | O::Mem(_) | O::CPort);
        match ops {
            [O::Expr(e)] => {
                code.byte(0xC3);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            [O::RegIndirect(Reg16::HL)] => code.byte(0xE9),
            [O::Indexed(r, None)] => code.extend(&[r.prefix(), 0xE9]),
            [O::CPort] => {
                self.require_next()?;
                code.op(0xED98);
            }
            [target] if indirect(target) => return Err(Error::JpIndirect),
            [cc, target] if condition(cc).is_some() && indirect(target) => {
                return Err(Error::JpCondition)
            }
            [cc, O::Expr(e)] => {
                let c = condition(cc).ok_or_else(|| invalid(Mnemonic::JP))?;
                code.byte(0xC2 | c.code() << 3);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            _ => return Err(invalid(Mnemonic::JP)),
        }
        Ok(())
    }

    fn encode_stack(&mut self, code: &mut Code, m: Mnemonic, ops: &[O]) -> Result<(), Error> {
        let pop = m == Mnemonic::POP;
        match ops {
            [O::Reg16(Reg16::SP)] => {
                return Err(Error::InvalidOperand(m.to_string(), Reg16::SP.to_string()))
            }
            [O::Reg16(r)] => code.byte((if pop { 0xC1 } else { 0xC5 }) | r.code() << 4),
            [O::AF] => code.byte(if pop { 0xF1 } else { 0xF5 }),
            [O::AFAlt] => return Err(Error::AltAf(m.to_string())),
            [O::Idx(r)] => code.extend(&[r.prefix(), if pop { 0xE1 } else { 0xE5 }]),
            [O::Expr(_)] if pop => return Err(Error::PopExpression),
            [O::Expr(e)] => {
                self.require_next()?;
                code.op(0xED8A);
                self.immediate(code, e, FixupKind::Bit16)?;
            }
            [other] => return Err(Error::InvalidOperand(m.to_string(), other.to_string())),
            _ => return Err(invalid(m)),
        }
        Ok(())
    }

    fn encode_ex(&mut self, code: &mut Code, ops: &[O]) -> Result<(), Error> {
        match ops {
            [O::AF, O::AFAlt] => code.byte(0x08),
            [O::AF, _] => return Err(Error::ExAf),
            [O::Reg16(Reg16::DE), O::Reg16(Reg16::HL)] => code.byte(0xEB),
            [O::Reg16(Reg16::DE), _] => return Err(Error::ExDe),
            [O::RegIndirect(Reg16::SP), O::Reg16(Reg16::HL)] => code.byte(0xE3),
            [O::RegIndirect(Reg16::SP), O::Idx(r)] => code.extend(&[r.prefix(), 0xE3]),
            [O::RegIndirect(Reg16::SP), _] => return Err(Error::ExSp),
            [_, _] => return Err(Error::ExFirst),
            _ => return Err(invalid(Mnemonic::EX)),
        }
        Ok(())
    }

    fn encode_in(&mut self, code: &mut Code, ops: &[O]) -> Result<(), Error> {
        match ops {
            [O::Reg8(Reg8::A), O::Mem(port)] => {
                code.byte(0xDB);
                self.immediate(code, port, FixupKind::Bit8)?;
            }
            [O::Reg8(_), O::Mem(_)] => return Err(Error::InPortRegister),
            [O::Reg8(r), O::CPort] => code.extend(&[0xED, 0x40 | r.code() << 3]),
            [O::CPort] => code.op(0xED70),
            // `in f,(c)`
            [O::Expr(Expr::Symbol(f)), O::CPort] if f.joined() == "F" && !f.rooted => code.op(0xED70),
            _ => return Err(invalid(Mnemonic::IN)),
        }
        Ok(())
    }

    fn encode_out(&mut self, code: &mut Code, ops: &[O]) -> Result<(), Error> {
        match ops {
            [O::Mem(port), O::Reg8(Reg8::A)] => {
                code.byte(0xD3);
                self.immediate(code, port, FixupKind::Bit8)?;
            }
            [O::Mem(_), _] => return Err(Error::InPortRegister),
            [O::CPort, O::Reg8(r)] => code.extend(&[0xED, 0x41 | r.code() << 3]),
            [O::CPort, O::Expr(e)] => {
                if self.eval_int(e)? != 0 {
                    return Err(Error::OutValue);
                }
                code.op(0xED71);
            }
            _ => return Err(invalid(Mnemonic::OUT)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::emit::Assembler;
    use crate::grammer::parse_source;
    use crate::options::AssemblerOptions;
    use pretty_assertions::assert_eq;

    fn assemble(source: &str) -> (Vec<u8>, Vec<String>) {
        let (lines, errors) = parse_source(0, source);
        assert!(errors.is_empty(), "{errors:?}");
        let mut asm = Assembler::new(AssemblerOptions::default(), vec!["test.asm".into()], vec![None]);
        asm.run(&lines);
        let bytes = asm.segments.iter().flat_map(|s| s.bytes.clone()).collect();
        let codes = asm.errors.iter().map(|e| e.code.clone()).collect();
        (bytes, codes)
    }

    macro_rules! emits {
        ($src:expr, [$($b:expr),* $(,)?]) => {
            let (bytes, errors) = assemble($src);
            assert_eq!(errors, Vec::<String>::new(), "{}", $src);
            assert_eq!(bytes, vec![$($b as u8),*], "{}", $src);
        };
    }

    macro_rules! fails {
        ($src:expr, $code:expr) => {
            let (_, errors) = assemble($src);
            assert_eq!(errors, vec![$code.to_string()], "{}", $src);
        };
    }

    #[test]
    fn loads() {
        emits!("ld a,b", [0x78]);
        emits!("ld (hl),e", [0x73]);
        emits!("ld a,(bc)", [0x0A]);
        emits!("ld (de),a", [0x12]);
        emits!("ld a,i", [0xED, 0x57]);
        emits!("ld r,a", [0xED, 0x4F]);
        emits!("ld b,xh", [0xDD, 0x44]);
        emits!("ld yl,c", [0xFD, 0x69]);
        emits!("ld xh,xl", [0xDD, 0x65]);
        emits!("ld xl,#12", [0xDD, 0x2E, 0x12]);
        emits!("ld a,(#4000)", [0x3A, 0x00, 0x40]);
        emits!("ld (#4000),hl", [0x22, 0x00, 0x40]);
        emits!("ld (#4000),de", [0xED, 0x53, 0x00, 0x40]);
        emits!("ld sp,(#4000)", [0xED, 0x7B, 0x00, 0x40]);
        emits!("ld bc,#1234", [0x01, 0x34, 0x12]);
        emits!("ld sp,iy", [0xFD, 0xF9]);
        emits!("ld ix,(#4000)", [0xDD, 0x2A, 0x00, 0x40]);
        emits!("ld (ix+3),#FF", [0xDD, 0x36, 0x03, 0xFF]);
        emits!("ld c,(iy-2)", [0xFD, 0x4E, 0xFE]);
        emits!("ld (ix),a", [0xDD, 0x77, 0x00]);
        fails!("ld h,xl", "Z0021");
        fails!("ld b,(bc)", "Z0021");
        fails!("ld xh,yl", "Z0021");
        fails!("ld bc,de", "Z0021");
    }

    #[test]
    fn arithmetic() {
        emits!("add a,c", [0x81]);
        emits!("sub (hl)", [0x96]);
        emits!("and a,#0F", [0xE6, 0x0F]);
        emits!("cp (ix+5)", [0xDD, 0xBE, 0x05]);
        emits!("xor yh", [0xFD, 0xAC]);
        emits!("add hl,sp", [0x39]);
        emits!("adc hl,de", [0xED, 0x5A]);
        emits!("sbc hl,bc", [0xED, 0x42]);
        emits!("add ix,ix", [0xDD, 0x29]);
        emits!("add iy,bc", [0xFD, 0x09]);
        emits!("inc (iy+1)", [0xFD, 0x34, 0x01]);
        emits!("dec sp", [0x3B]);
        emits!("dec xl", [0xDD, 0x2D]);
        emits!("inc ix", [0xDD, 0x23]);
        fails!("add b,c", "Z0007");
        fails!("or b,c", "Z0023");
        fails!("add bc,de", "Z0009");
        fails!("adc hl,ix", "Z0010");
        fails!("add hl,a", "Z0102");
        fails!("add a,(bc)", "Z0008");
    }

    #[test]
    fn bits() {
        emits!("bit 7,a", [0xCB, 0x7F]);
        emits!("set 0,(hl)", [0xCB, 0xC6]);
        emits!("res 3,(ix+2)", [0xDD, 0xCB, 0x02, 0x9E]);
        emits!("set 1,(iy-1),b", [0xFD, 0xCB, 0xFF, 0xC8]);
        emits!("rl c", [0xCB, 0x11]);
        emits!("sll (hl)", [0xCB, 0x36]);
        emits!("srl (ix+1),a", [0xDD, 0xCB, 0x01, 0x3F]);
        fails!("bit 8,a", "Z0002");
        fails!("rr (bc)", "Z0004");
    }

    #[test]
    fn flow() {
        emits!("jp #1234", [0xC3, 0x34, 0x12]);
        emits!("jp c,#1234", [0xDA, 0x34, 0x12]);
        emits!("jp (hl)", [0xE9]);
        emits!("jp (iy)", [0xFD, 0xE9]);
        emits!("call pe,#0000", [0xEC, 0x00, 0x00]);
        emits!("ret", [0xC9]);
        emits!("ret nz", [0xC0]);
        emits!("rst #38", [0xFF]);
        emits!("jr $", [0x18, 0xFE]);
        emits!("djnz $+2", [0x10, 0x00]);
        fails!("jp z,(hl)", "Z0017");
        fails!("jp (bc)", "Z0016");
        fails!("jr po,$", "Z0011");
        fails!("rst #11", "Z0018");
    }

    #[test]
    fn relative_bounds() {
        emits!("jr $+129", [0x18, 0x7F]);
        emits!("jr $-126", [0x18, 0x80]);
        fails!("jr $+130", "Z0022");
        fails!("jr $-127", "Z0022");
    }

    #[test]
    fn stack_and_io() {
        emits!("push af", [0xF5]);
        emits!("pop de", [0xD1]);
        emits!("push iy", [0xFD, 0xE5]);
        emits!("ex af,af'", [0x08]);
        emits!("ex de,hl", [0xEB]);
        emits!("ex (sp),ix", [0xDD, 0xE3]);
        emits!("in a,(#FE)", [0xDB, 0xFE]);
        emits!("in e,(c)", [0xED, 0x58]);
        emits!("in (c)", [0xED, 0x70]);
        emits!("out (c),0", [0xED, 0x71]);
        emits!("out (#FE),a", [0xD3, 0xFE]);
        emits!("im 2", [0xED, 0x5E]);
        emits!("ldir", [0xED, 0xB0]);
        fails!("push af'", "Z0019");
        fails!("pop #1234", "Z0024");
        fails!("ex af,bc", "Z0012");
        fails!("ex hl,de", "Z0014");
        fails!("in b,(#FE)", "Z0005");
        fails!("out (c),1", "Z0006");
        fails!("im 3", "Z0020");
        fails!("nop a", "Z0001");
    }

    #[test]
    fn next_extensions() {
        fails!("swapnib", "Z0102");
        emits!(".model next\nswapnib", [0xED, 0x23]);
        emits!(".model next\nmul d,e", [0xED, 0x30]);
        emits!(".model next\ntest #80", [0xED, 0x27, 0x80]);
        emits!(".model next\nmirror de", [0xED, 0x26]);
        emits!(".model next\nnextreg 7,a", [0xED, 0x92, 0x07]);
        emits!(".model next\nnextreg 7,3", [0xED, 0x91, 0x07, 0x03]);
        emits!(".model next\npush #1234", [0xED, 0x8A, 0x34, 0x12]);
        emits!(".model next\nadd de,a", [0xED, 0x32]);
        emits!(".model next\nadd bc,#100", [0xED, 0x36, 0x00, 0x01]);
        emits!(".model next\njp (c)", [0xED, 0x98]);
    }

    #[test]
    fn forward_references() {
        emits!(
            "jr nz,ForwAddr\nld b,#0A\nForwAddr: nop",
            [0x20, 0x02, 0x06, 0x0A, 0x00]
        );
        emits!("ld hl,Data\nData: .defb 1", [0x21, 0x03, 0x80, 0x01]);
        emits!("ld (ix-Off),a\nOff .equ 2", [0xDD, 0x77, 0xFE]);
    }
}
