use super::Assembler;
use crate::error::Error;
use crate::eval::{evaluate, Evaluated};
use crate::symbols::fixup::{relative_distance, Fixup, FixupKind};
use crate::symbols::scope::ScopeId;
use crate::symbols::SymbolContext;
use crate::value::Value;

impl Assembler {
    /// Run the fixup queue until a pass makes no progress.
    ///
    /// With `scope` set, only fixups created inside that scope are tried and the ones
    /// still pending stay queued. The global pass (`None`) reports every leftover fixup.
    pub fn resolve_fixups(&mut self, scope: Option<ScopeId>) {
        let mut passes = 0;
        loop {
            passes += 1;
            let mut progress = false;
            // `.equ` values first, the patches may depend on them
            for equ_pass in [true, false] {
                for idx in 0..self.symbols.fixups.len() {
                    let fixup = &self.symbols.fixups[idx];
                    if fixup.resolved || (fixup.kind == FixupKind::Equ) != equ_pass {
                        continue;
                    }
                    if let Some(id) = scope {
                        if !self.symbols.encloses(fixup.scope, id) {
                            continue;
                        }
                    }
                    let fixup = fixup.clone();
                    let result = match self.eval_fixup(&fixup) {
                        Ok(Evaluated::Pending(_)) => continue,
                        Ok(Evaluated::Ready(value)) => self.apply_fixup(&fixup, value),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        self.report_at(e, fixup.file, fixup.line);
                    }
                    self.symbols.fixups[idx].resolved = true;
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }
        tracing::debug!(passes, local = scope.is_some(), "fixup passes");

        if scope.is_some() {
            return;
        }
        for idx in 0..self.symbols.fixups.len() {
            if self.symbols.fixups[idx].resolved {
                continue;
            }
            let fixup = self.symbols.fixups[idx].clone();
            let error = match self.eval_fixup(&fixup) {
                Ok(Evaluated::Pending(names)) => Error::NotEvaluable(names.join(", ")),
                Ok(Evaluated::Ready(_)) => Error::NotEvaluable(fixup.expr.to_string()),
                Err(e) => e,
            };
            self.report_at(error, fixup.file, fixup.line);
            self.symbols.fixups[idx].resolved = true;
        }
    }

    fn eval_fixup(&mut self, fixup: &Fixup) -> Result<Evaluated, Error> {
        let mut ctx = SymbolContext {
            table: &mut self.symbols,
            rng: &mut self.rng,
            scope: fixup.scope,
            module: fixup.module,
            origin: fixup.origin,
        };
        evaluate(&mut ctx, &fixup.expr).map_err(Error::from)
    }

    fn apply_fixup(&mut self, fixup: &Fixup, value: Value) -> Result<(), Error> {
        if fixup.kind == FixupKind::Equ {
            if let Some((slot, name)) = &fixup.target {
                self.symbols.assign(*slot, name, value);
            }
            return Ok(());
        }
        let word = match value {
            Value::String(_) => return Err(Error::NumericExpected),
            v => v.as_word().unwrap_or_default(),
        };
        match fixup.kind {
            FixupKind::Ent => self.entry = Some(word),
            FixupKind::Xent => self.export_entry = Some(word),
            FixupKind::Bit8 | FixupKind::StructBit8 => {
                self.patch(fixup.segment, fixup.offset, &[word as u8])
            }
            FixupKind::Bit16 | FixupKind::StructBit16 => {
                self.patch(fixup.segment, fixup.offset, &word.to_le_bytes())
            }
            FixupKind::Jr => {
                let Some(seg) = self.segments.get(fixup.segment) else {
                    return Ok(());
                };
                let addr = seg.address_at(fixup.offset) as u16;
                let dist = relative_distance(word as i64, addr)
                    .ok_or(Error::RelativeJump(word as i64 - (addr as i64 + 2)))?;
                self.patch(fixup.segment, fixup.offset + 1, &[dist]);
            }
            FixupKind::Equ => {}
        }
        Ok(())
    }

    fn patch(&mut self, segment: usize, offset: usize, bytes: &[u8]) {
        if let Some(target) = self
            .segments
            .get_mut(segment)
            .and_then(|seg| seg.bytes.get_mut(offset..offset + bytes.len()))
        {
            target.copy_from_slice(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::emit::Assembler;
    use crate::grammer::parse_source;
    use crate::options::AssemblerOptions;
    use crate::value::Value;
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
    fn chained_equs() {
        let asm = assemble("ld a,A1\nA1 .equ A2 + 1\nA2 .equ A3 * 2\nA3 .equ 3");
        assert!(codes(&asm).is_empty());
        assert_eq!(asm.segments[0].bytes, vec![0x3E, 7]);
        assert_eq!(asm.symbols.export()["A1"].value, Some(Value::Integer(7)));
    }

    #[test]
    fn circular_equs() {
        let asm = assemble("A1 .equ B1\nB1 .equ A1");
        assert_eq!(codes(&asm), vec!["Z0201", "Z0201"]);
        assert!(asm.errors[0].message.contains("B1"));
    }

    #[test]
    fn undefined_symbol() {
        let asm = assemble("ld hl,Nowhere\nld a,Nowhere");
        assert_eq!(codes(&asm), vec!["Z0201", "Z0201"]);
        assert_eq!(asm.errors[1].line, 1);
    }

    #[test]
    fn late_faults() {
        let asm = assemble("ld a,Text\njr Far\nText .equ \"abc\"\n.defs 200\nFar: nop");
        assert_eq!(codes(&asm), vec!["Z0305", "Z0022"]);
    }

    #[test]
    fn late_entry() {
        let asm = assemble(".xent Start\nnop\nStart: halt");
        assert_eq!(asm.export_entry, Some(0x8001));
    }
}
