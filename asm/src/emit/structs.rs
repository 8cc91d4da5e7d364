use super::Assembler;
use crate::error::Error;
use crate::grammer::ast::{Pragma, SourceLine, Stmt};
use crate::output::Segment;
use crate::symbols::fixup::FixupKind;
use crate::symbols::module::StructDef;
use crate::symbols::SymbolKind;
use crate::value::Value;
use indexmap::IndexMap;

/// The struct instance field assignments write into
#[derive(Debug, Clone)]
pub struct StructInvocation {
    pub name: String,
    pub size: usize,
    pub fields: IndexMap<String, usize>,
    pub segment: usize,
    /// Offset of the instance within its segment
    pub start: usize,
    /// Offset the next unnamed assignment writes to
    pub cursor: usize,
    /// First fixup queued by the instance
    pub fixup_start: usize,
}

impl Assembler {
    pub(super) fn define_struct(
        &mut self,
        name: Option<String>,
        body: &[SourceLine],
        end: &SourceLine,
    ) -> Result<(), Error> {
        let name = name.ok_or(Error::StructName)?;
        let key = name.to_ascii_uppercase();
        if self.symbols.modules[self.symbols.current].structs.contains_key(&key) {
            return Err(Error::StructDefined(name));
        }

        let mut valid = true;
        for line in body {
            if let Some(stmt) = &line.stmt {
                if !matches!(stmt, Stmt::Pragma(p) if p.emits_data()) {
                    self.report_at(Error::StructContent, line.file, line.line);
                    valid = false;
                }
            }
        }
        let dangling = body
            .iter()
            .rev()
            .find(|l| l.label.is_some() || l.stmt.is_some())
            .is_some_and(|l| l.stmt.is_none());
        if end.label.is_some() || dangling {
            self.report_at(Error::EndsLabel, end.file, end.line);
            valid = false;
        }
        if !valid {
            return Ok(());
        }

        let (size, fields) = self.measure_struct(body);
        let (file, line) = self.pos;
        self.symbols
            .define(&key, SymbolKind::Label, Some(Value::Integer(size as i64)), file, line)?;
        for (field, offset) in &fields {
            let value = Some(Value::Integer(*offset as i64));
            self.symbols
                .define(&format!("{key}.{field}"), SymbolKind::StructField, value, file, line)?;
        }
        tracing::debug!(name = %key, size, fields = fields.len(), "struct defined");
        let def = StructDef {
            name: key.clone(),
            size,
            fields,
            body: body.to_vec(),
        };
        self.symbols.modules[self.symbols.current].structs.insert(key, def);
        Ok(())
    }

    /// Emit the body into a scratch segment to learn its size and field offsets
    fn measure_struct(&mut self, body: &[SourceLine]) -> (usize, IndexMap<String, usize>) {
        let saved = std::mem::replace(&mut self.segments, vec![Segment::new(0)]);
        let fixups = self.symbols.fixups.len();
        let pos = self.pos;
        self.dry_run = true;

        let mut fields = IndexMap::new();
        for line in body {
            self.pos = (line.file, line.line);
            self.origin = self.current_address();
            if let Some(label) = &line.label {
                let offset = self.segments[0].bytes.len();
                if fields.insert(label.to_ascii_uppercase(), offset).is_some() {
                    self.report(Error::DuplicateField(label.clone()));
                }
            }
            if let Some(Stmt::Pragma(pragma)) = &line.stmt {
                if let Err(e) = self.emit_pragma(pragma, None) {
                    self.report(e);
                }
            }
        }
        let size = self.segments[0].bytes.len();

        self.dry_run = false;
        self.pos = pos;
        self.segments = saved;
        self.symbols.fixups.truncate(fixups);
        (size, fields)
    }

    /// Emit the default bytes of a struct and open it for field assignments
    pub(super) fn invoke_struct(&mut self, def: StructDef) -> Result<(), Error> {
        let segment = self.current_segment();
        let start = self.segments[segment].bytes.len();
        let fixup_start = self.symbols.fixups.len();
        let pos = self.pos;
        for line in &def.body {
            if let Some(Stmt::Pragma(pragma)) = &line.stmt {
                self.pos = (line.file, line.line);
                self.origin = self.current_address();
                if let Err(e) = self.emit_pragma(pragma, None) {
                    self.report(e);
                }
            }
        }
        self.pos = pos;
        self.struct_invocation = Some(StructInvocation {
            name: def.name,
            size: def.size,
            fields: def.fields,
            segment,
            start,
            cursor: 0,
            fixup_start,
        });
        Ok(())
    }

    /// `[field] -> pragma`: overwrite part of the struct instance above
    pub(super) fn assign_field(&mut self, field: Option<&str>, pragma: &Pragma) -> Result<(), Error> {
        let mut inv = self.struct_invocation.take().ok_or(Error::FieldOutside)?;
        let result = self.write_field(&mut inv, field, pragma);
        self.struct_invocation = Some(inv);
        result
    }

    fn write_field(&mut self, inv: &mut StructInvocation, field: Option<&str>, pragma: &Pragma) -> Result<(), Error> {
        if let Some(field) = field {
            inv.cursor = *inv
                .fields
                .get(&field.to_ascii_uppercase())
                .ok_or_else(|| Error::UnknownField(inv.name.clone(), field.to_string()))?;
        }
        if !pragma.emits_data() {
            return Err(Error::StructContent);
        }

        let seg = inv.segment;
        let end = self.segments[seg].bytes.len();
        let first_fixup = self.symbols.fixups.len();
        self.origin = self.segments[seg].address_at(inv.start + inv.cursor) as u16;
        let emitted = self.emit_pragma(pragma, None);
        let bytes = self.segments[seg].bytes.split_off(end);
        if let Err(e) = emitted {
            self.symbols.fixups.truncate(first_fixup);
            return Err(e);
        }

        let at = inv.start + inv.cursor;
        let len = bytes.len();
        if inv.cursor + len > inv.size {
            self.symbols.fixups.truncate(first_fixup);
            return Err(Error::StructOverflow(inv.name.clone(), inv.size, inv.cursor + len));
        }
        self.segments[seg].bytes[at..at + len].copy_from_slice(&bytes);

        // the earlier fixups of the overwritten bytes no longer apply
        let overwritten = at..at + len;
        for fixup in &mut self.symbols.fixups[inv.fixup_start..first_fixup] {
            let span = fixup.offset..fixup.offset + fixup.kind.span();
            if fixup.segment == seg && span.start < overwritten.end && overwritten.start < span.end {
                fixup.resolved = true;
            }
        }
        for fixup in &mut self.symbols.fixups[first_fixup..] {
            fixup.offset = fixup.offset - end + at;
            fixup.kind = match fixup.kind {
                FixupKind::Bit8 => FixupKind::StructBit8,
                FixupKind::Bit16 => FixupKind::StructBit16,
                kind => kind,
            };
        }
        inv.cursor += len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::emit::Assembler;
    use crate::grammer::parse_source;
    use crate::options::AssemblerOptions;
    use crate::symbols::fixup::FixupKind;
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

    const POINT: &str = "Point: .struct\nX: .defb 1\nY: .defw #0203\n.ends\n";

    #[test]
    fn definition() {
        let asm = assemble(POINT);
        assert!(codes(&asm).is_empty());
        assert!(asm.segments.is_empty() || asm.segments[0].bytes.is_empty());
        let symbols = asm.symbols.export();
        assert_eq!(symbols["POINT"].value, Some(Value::Integer(3)));
        assert_eq!(symbols["POINT.X"].value, Some(Value::Integer(0)));
        assert_eq!(symbols["POINT.Y"].value, Some(Value::Integer(1)));
    }

    #[test]
    fn instances() {
        let asm = assemble(&format!("{POINT}Point()\nY -> .defw #0A0B\nPoint()\n-> .defb 9"));
        assert!(codes(&asm).is_empty());
        assert_eq!(asm.segments[0].bytes, vec![1, 0x0B, 0x0A, 9, 3, 2]);
    }

    #[test]
    fn late_fields() {
        let asm = assemble(&format!("{POINT}Point()\nY -> .defw Later\nLater: nop"));
        assert!(codes(&asm).is_empty());
        assert_eq!(asm.segments[0].bytes, vec![1, 0x03, 0x80, 0]);
        assert!(asm
            .symbols
            .fixups
            .iter()
            .any(|f| f.kind == FixupKind::StructBit16));
    }

    #[test]
    fn overflow() {
        let asm = assemble(&format!("{POINT}Point()\nY -> .defw 1, 2"));
        assert_eq!(codes(&asm), vec!["Z0442"]);
        assert_eq!(asm.errors[0].message, "The .struct size of POINT is 3 byte(s). The invocation wants to emit 5 bytes.");
        assert_eq!(asm.segments[0].bytes, vec![1, 3, 2]);
    }

    #[test]
    fn faults() {
        let asm = assemble(".struct\n.ends");
        assert_eq!(codes(&asm), vec!["Z0432"]);
        let asm = assemble("S: .struct\nnop\n.ends");
        assert_eq!(codes(&asm), vec!["Z0435"]);
        let asm = assemble("S: .struct\n.defb 1\nE: .ends");
        assert_eq!(codes(&asm), vec!["Z0436"]);
        let asm = assemble("S: .struct\n.defb 1\nE:\n.ends");
        assert_eq!(codes(&asm), vec!["Z0436"]);
        let asm = assemble("S: .struct\nA: .defb 1\nA: .defb 2\n.ends");
        assert_eq!(codes(&asm), vec!["Z0438"]);
        let asm = assemble("S: .struct\n.ends\nS: .struct\n.ends");
        assert_eq!(codes(&asm), vec!["Z0434"]);
        let asm = assemble("S: .struct\n.defb 1\n.ends\nS(3)");
        assert_eq!(codes(&asm), vec!["Z0439"]);
        let asm = assemble("-> .defb 1");
        assert_eq!(codes(&asm), vec!["Z0440"]);
        let asm = assemble(&format!("{POINT}Point()\nZ -> .defb 1"));
        assert_eq!(codes(&asm), vec!["Z0441"]);
        let asm = assemble(&format!("{POINT}Point()\nnop\n-> .defb 1"));
        assert_eq!(codes(&asm), vec!["Z0440"]);
    }
}
