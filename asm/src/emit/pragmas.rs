use super::{Assembler, Code};
use crate::error::Error;
use crate::eval::Evaluated;
use crate::functions::Rng;
use crate::grammer::ast::{Expr, Pragma};
use crate::grammer::lexer::spectrum_bytes;
use crate::output::Segment;
use crate::symbols::fixup::FixupKind;
use crate::symbols::SymbolKind;
use crate::value::Value;
use arch::model::Model;
use itertools::Itertools;
use std::path::PathBuf;

/// Bytes of a `.defg`/`.defgx` bit pattern, most significant bit first.
/// `.`, `-`, `_` and, unless `strip` drops them, spaces are 0 bits.
fn pattern_bytes(pattern: &str, strip: bool) -> Vec<u8> {
    let mut pattern = pattern.trim();
    let mut align_left = true;
    if strip {
        if let Some(rest) = pattern.strip_prefix('<') {
            pattern = rest;
        } else if let Some(rest) = pattern.strip_prefix('>') {
            pattern = rest;
            align_left = false;
        }
    }
    let mut bits = pattern
        .chars()
        .filter(|c| !strip || *c != ' ')
        .map(|c| !matches!(c, ' ' | '.' | '-' | '_'))
        .collect::<Vec<_>>();
    let pad = (8 - bits.len() % 8) % 8;
    if align_left {
        bits.extend(std::iter::repeat(false).take(pad));
    } else {
        bits.splice(0..0, std::iter::repeat(false).take(pad));
    }
    bits.chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &bit| acc << 1 | bit as u8))
        .collect()
}

impl Assembler {
    pub fn emit_pragma(&mut self, pragma: &Pragma, label: Option<&str>) -> Result<(), Error> {
        match pragma {
            Pragma::Org(e) => {
                let addr = self.eval_int(e)? as u16;
                match self.segments.last_mut() {
                    Some(seg) if seg.bytes.is_empty() => seg.start = addr,
                    _ => {
                        tracing::debug!(start = addr, "segment opened");
                        self.segments.push(Segment::new(addr));
                    }
                }
                if let Some(label) = label {
                    self.bind_label(label, addr);
                }
            }
            Pragma::Ent(e) | Pragma::Xent(e) => {
                let export = matches!(pragma, Pragma::Xent(_));
                if self.symbols.top().is_some() {
                    return Err(Error::GlobalOnly(if export { "XENT" } else { "ENT" }));
                }
                match self.eval(e)? {
                    Evaluated::Ready(v) => {
                        let addr = v.as_word().ok_or(Error::NumericExpected)?;
                        if export {
                            self.export_entry = Some(addr);
                        } else {
                            self.entry = Some(addr);
                        }
                    }
                    Evaluated::Pending(_) => {
                        let kind = if export { FixupKind::Xent } else { FixupKind::Ent };
                        let seg = self.segments.len().saturating_sub(1);
                        self.add_fixup(kind, seg, 0, e.clone(), None);
                    }
                }
            }
            Pragma::Disp(e) => {
                let disp = self.eval_int(e)?;
                let seg = self.current_segment();
                self.segments[seg].displacement = Some(disp as i32);
            }
            Pragma::Equ(e) => self.emit_equ(e, label)?,
            Pragma::Var(e) => {
                let label = label.ok_or(Error::VarLabel)?;
                let value = self.eval_now(e)?;
                let (file, line) = self.pos;
                self.symbols.set_var(label, value, file, line)?;
            }
            Pragma::Skip(target, fill) => {
                let target = self.eval_int(target)?;
                let current = self.current_address();
                if target < current as i64 {
                    return Err(Error::SkipBackwards(target as u16, current));
                }
                let fill = match fill {
                    Some(fill) => self.eval_int(fill)? as u8,
                    None => 0xFF,
                };
                let count = self.fill_count(target - current as i64, 1)?;
                self.emit_bytes(&vec![fill; count])?;
            }
            Pragma::DefB(exprs) | Pragma::DefW(exprs) => {
                let kind = match pragma {
                    Pragma::DefB(_) => FixupKind::Bit8,
                    _ => FixupKind::Bit16,
                };
                let mut code = Code::new();
                for expr in exprs {
                    self.immediate(&mut code, expr, kind)?;
                }
                self.emit_code(code)?;
            }
            Pragma::DefM(e) => {
                let bytes = self.message_bytes(e)?;
                self.emit_bytes(&bytes)?;
            }
            Pragma::DefN(e) => {
                let mut bytes = self.message_bytes(e)?;
                bytes.push(0x00);
                self.emit_bytes(&bytes)?;
            }
            Pragma::DefC(e) => {
                let mut bytes = self.message_bytes(e)?;
                if let Some(last) = bytes.last_mut() {
                    *last |= 0x80;
                }
                self.emit_bytes(&bytes)?;
            }
            Pragma::DefH(e) => {
                let Value::String(hex) = self.eval_now(e)? else {
                    return Err(Error::DefhString);
                };
                if hex.len() % 2 != 0 || !hex.is_ascii() {
                    return Err(Error::DefhDigits);
                }
                let bytes = hex
                    .as_bytes()
                    .chunks(2)
                    .map(|pair| {
                        std::str::from_utf8(pair)
                            .ok()
                            .and_then(|s| u8::from_str_radix(s, 16).ok())
                            .ok_or(Error::DefhDigits)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.emit_bytes(&bytes)?;
            }
            Pragma::DefS(e) => {
                let count = self.eval_int(e)?;
                let count = self.fill_count(count, 1)?;
                self.emit_bytes(&vec![0; count])?;
            }
            Pragma::FillB(count, value) => {
                let count = self.eval_int(count)?;
                let count = self.fill_count(count, 1)?;
                let value = self.eval_int(value)? as u8;
                self.emit_bytes(&vec![value; count])?;
            }
            Pragma::FillW(count, value) => {
                let count = self.eval_int(count)?;
                let count = self.fill_count(count, 2)?;
                let [lo, hi] = (self.eval_int(value)? as u16).to_le_bytes();
                let bytes = [lo, hi].repeat(count);
                self.emit_bytes(&bytes)?;
            }
            Pragma::Model(name) => {
                if self.model.is_some() {
                    return Err(Error::ModelTwice);
                }
                let model = Model::parse(name).map_err(|_| Error::ModelValue)?;
                tracing::debug!(%model, "model selected");
                self.model = Some(model);
            }
            Pragma::Align(e) => {
                let alignment = match e {
                    Some(e) => {
                        let v = self.eval_int(e)?;
                        if !(1..=0x4000).contains(&v) {
                            return Err(Error::AlignValue(v));
                        }
                        v as usize
                    }
                    None => 0x100,
                };
                let current = self.current_address() as usize;
                let count = (alignment - current % alignment) % alignment;
                self.emit_bytes(&vec![0; count])?;
            }
            Pragma::Trace(hex, exprs) => {
                let mut message = String::new();
                for e in exprs {
                    match self.eval_now(e)? {
                        Value::Integer(i) if *hex && i > 0x10000 => message += &format!("{i:08X}"),
                        Value::Integer(i) if *hex => message += &format!("{i:04X}"),
                        Value::String(s) if *hex => {
                            message += &spectrum_bytes(&s).iter().map(|b| format!("{b:02X}")).join("")
                        }
                        v => message += &v.to_string(),
                    }
                }
                tracing::info!(%message, "trace");
                self.trace.push(message);
            }
            Pragma::RndSeed(e) => {
                self.rng = match e {
                    Some(e) => Rng::new(self.eval_int(e)? as u64),
                    None => Rng::from_time(),
                };
            }
            Pragma::DefG(e) | Pragma::DefGX(e) => {
                let Value::String(pattern) = self.eval_now(e)? else {
                    return Err(Error::StringExpected);
                };
                if pattern.trim().is_empty() {
                    return Err(Error::EmptyPattern);
                }
                let bytes = pattern_bytes(&pattern, matches!(pragma, Pragma::DefGX(_)));
                self.emit_bytes(&bytes)?;
            }
            Pragma::Error(e) => {
                let message = self.eval_now(e)?;
                return Err(Error::User(message.to_string()));
            }
            Pragma::IncludeBin(file, offset, length) => self.include_bin(file, offset, length)?,
        }
        Ok(())
    }

    /// Repeat count of a fill, refused before allocation when it cannot fit below #10000
    fn fill_count(&self, count: i64, unit: u64) -> Result<usize, Error> {
        let used = match self.segments.last() {
            Some(seg) => seg.start as u64 + seg.bytes.len() as u64,
            None => self.options.default_start_address as u64,
        };
        let count = count.max(0) as u64;
        if count.saturating_mul(unit) > 0x10000u64.saturating_sub(used) {
            return Err(Error::AddressOverflow);
        }
        Ok(count as usize)
    }

    fn emit_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut code = Code::new();
        code.extend(bytes);
        self.emit_code(code)
    }

    fn emit_equ(&mut self, expr: &Expr, label: Option<&str>) -> Result<(), Error> {
        let label = label.ok_or(Error::EquLabel)?;
        let (file, line) = self.pos;
        match self.eval(expr)? {
            Evaluated::Ready(value) => {
                self.symbols
                    .define(label, SymbolKind::Equ, Some(value), file, line)?;
            }
            Evaluated::Pending(names) => {
                tracing::debug!(label, pending = %names.join(","), "equ deferred");
                let slot = self
                    .symbols
                    .define(label, SymbolKind::Equ, None, file, line)?;
                let seg = self.segments.len().saturating_sub(1);
                let target = Some((slot, label.to_ascii_uppercase()));
                self.add_fixup(FixupKind::Equ, seg, 0, expr.clone(), target);
            }
        }
        Ok(())
    }

    /// String operand of the `.defm` family; literals keep the ZX Spectrum escapes
    fn message_bytes(&mut self, expr: &Expr) -> Result<Vec<u8>, Error> {
        if let Expr::Text(raw) = expr {
            return Ok(spectrum_bytes(raw));
        }
        match self.eval_now(expr)? {
            Value::String(s) => Ok(s.chars().map(|c| c as u32 as u8).collect()),
            _ => Err(Error::DefmString),
        }
    }

    fn include_bin(&mut self, file: &Expr, offset: &Option<Expr>, length: &Option<Expr>) -> Result<(), Error> {
        let Value::String(name) = self.eval_now(file)? else {
            return Err(Error::StringExpected);
        };
        let offset = match offset {
            Some(e) => match self.eval_now(e)? {
                v @ (Value::Integer(_) | Value::Bool(_)) => v.as_integer().unwrap_or_default(),
                _ => return Err(Error::IntegralExpected),
            },
            None => 0,
        };
        if offset < 0 {
            return Err(Error::IncludeBinOffset);
        }
        let length = match length {
            Some(e) => match self.eval_now(e)? {
                v @ (Value::Integer(_) | Value::Bool(_)) => Some(v.as_integer().unwrap_or_default()),
                _ => return Err(Error::IntegralExpected),
            },
            None => None,
        };
        if length.is_some_and(|l| l < 0) {
            return Err(Error::IncludeBinLength);
        }

        let path = match self.dirs.get(self.pos.0).cloned().flatten() {
            Some(dir) => dir.join(&name),
            None => PathBuf::from(&name),
        };
        let contents = std::fs::read(&path)
            .map_err(|e| Error::IncludeBinOpen(path.display().to_string(), e.to_string()))?;
        let offset = offset as usize;
        if offset >= contents.len() {
            return Err(Error::IncludeBinOffset);
        }
        let length = length.map_or(contents.len() - offset, |l| l as usize);
        if offset + length > contents.len() {
            return Err(Error::IncludeBinLength);
        }
        if self.current_address() as usize + length >= 0x10000 {
            return Err(Error::IncludeBinOverflow);
        }
        tracing::debug!(path = %path.display(), offset, length, "binary included");
        self.emit_bytes(&contents[offset..offset + length])
    }
}

#[cfg(test)]
mod tests {
    use super::pattern_bytes;
    use crate::emit::Assembler;
    use crate::grammer::parse_source;
    use crate::options::AssemblerOptions;
    use pretty_assertions::assert_eq;

    fn assemble(source: &str) -> Assembler {
        let (lines, errors) = parse_source(0, source);
        assert!(errors.is_empty(), "{errors:?}");
        let mut asm = Assembler::new(AssemblerOptions::default(), vec!["test.asm".into()], vec![None]);
        asm.run(&lines);
        asm
    }

    fn codes(asm: &Assembler) -> Vec<&str> {
        asm.errors.iter().map(|e| e.code.as_str()).collect()
    }

    #[test]
    fn patterns() {
        assert_eq!(pattern_bytes("XX..XX..", false), vec![0xCC]);
        assert_eq!(pattern_bytes("X", false), vec![0x80]);
        assert_eq!(pattern_bytes("> X X X", true), vec![0x07]);
        assert_eq!(pattern_bytes("XXXX XXXX X", true), vec![0xFF, 0x80]);
    }

    #[test]
    fn segments() {
        let asm = assemble(".org #6000\nnop\n.org #7000\nStart: .org #7100\nhalt");
        let starts = asm.segments.iter().map(|s| s.start).collect::<Vec<_>>();
        assert_eq!(starts, vec![0x6000, 0x7100]);
        assert!(codes(&asm).is_empty());
        assert_eq!(asm.symbols.export()["START"].value, Some(crate::value::Value::Integer(0x7100)));
    }

    #[test]
    fn data() {
        let asm = assemble(
            ".defb 1, #FF, \"A\"\n.defw #1234\n.defm \"AB\\i\"\n.defn \"x\"\n.defc \"ab\"\n.defh \"0aFF\"\n.fillw 2,#0102\n.defs 2",
        );
        assert_eq!(codes(&asm), vec!["Z0305"]);
        let asm = assemble(
            ".defw #1234\n.defm \"AB\\i\"\n.defn \"x\"\n.defc \"ab\"\n.defh \"0aFF\"\n.fillw 2,#0102\n.defs 2\n.skip $+2,0",
        );
        assert!(codes(&asm).is_empty());
        assert_eq!(
            asm.segments[0].bytes,
            vec![
                0x34, 0x12, b'A', b'B', 0x10, b'x', 0, b'a', b'b' | 0x80, 0x0A, 0xFF, 0x02, 0x01,
                0x02, 0x01, 0, 0, 0, 0
            ]
        );
    }

    #[test]
    fn huge_fills() {
        let asm = assemble(".defs #7FFFFFFFFFFFFFFF");
        assert_eq!(codes(&asm), vec!["Z0304"]);
        let asm = assemble(".fillb #100000000, 1");
        assert_eq!(codes(&asm), vec!["Z0304"]);
        let asm = assemble(".fillw #4000000000000000, 1");
        assert_eq!(codes(&asm), vec!["Z0304"]);
        let asm = assemble(".fillw #4001, 1");
        assert_eq!(codes(&asm), vec!["Z0304"]);
        let asm = assemble(".skip #7FFFFFFFFFFFFFFF");
        assert_eq!(codes(&asm), vec!["Z0304"]);
        assert!(asm.segments.iter().all(|s| s.bytes.is_empty()));

        let asm = assemble(".org #FFFE
.fillw 1, #0201");
        assert!(codes(&asm).is_empty());
        assert_eq!(asm.segments[0].bytes, vec![0x01, 0x02]);
    }

    #[test]
    fn alignment() {
        let asm = assemble("nop\n.align 4\nhalt");
        assert_eq!(asm.segments[0].bytes, vec![0x00, 0, 0, 0, 0x76]);
        let asm = assemble(".align 0");
        assert_eq!(codes(&asm), vec!["Z0092"]);
    }

    #[test]
    fn entries_and_models() {
        let asm = assemble(".ent Main\n.xent #9000\nMain: nop");
        assert_eq!(asm.entry, Some(0x8000));
        assert_eq!(asm.export_entry, Some(0x9000));
        let asm = assemble(".model next\n.model spectrum48\n.model c64");
        assert_eq!(codes(&asm), vec!["Z0088", "Z0088"]);
        let asm = assemble(".model c64");
        assert_eq!(codes(&asm), vec!["Z0089"]);
    }

    #[test]
    fn labels_required() {
        let asm = assemble(".equ 3\n.var 4\n.skip #7000");
        assert_eq!(codes(&asm), vec!["Z0082", "Z0086", "Z0081"]);
    }

    #[test]
    fn user_error_and_trace() {
        let asm = assemble(".error \"stop \" + str(3)\n.trace \"v=\", 2+3\n.tracehex 255, \"A\"");
        assert_eq!(codes(&asm), vec!["Z0500"]);
        assert_eq!(asm.errors[0].message, "ERROR: stop 3");
        assert_eq!(asm.trace, vec!["v=5".to_string(), "00FF41".to_string()]);
    }

    #[test]
    fn graphics() {
        let asm = assemble(".defg \"....XXXX\"\n.defgx \">XX\"\n.defg \"\"\n.defg 3");
        assert_eq!(asm.segments[0].bytes, vec![0x0F, 0x03]);
        assert_eq!(codes(&asm), vec!["Z0307", "Z0306"]);
    }

    #[test]
    fn include_bin() {
        let dir = std::env::temp_dir().join("zxasm_includebin");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("data.bin"), [1u8, 2, 3, 4]).unwrap();
        let (lines, _) = parse_source(0, ".includebin \"data.bin\", 1, 2\n.includebin \"data.bin\", 4\n.includebin \"missing.bin\"");
        let mut asm = Assembler::new(AssemblerOptions::default(), vec!["main.asm".into()], vec![Some(dir)]);
        asm.run(&lines);
        assert_eq!(asm.segments[0].bytes, vec![2, 3]);
        assert_eq!(codes(&asm), vec!["Z0424", "Z0423"]);
    }
}
