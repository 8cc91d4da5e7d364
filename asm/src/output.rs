use crate::error::AssemblerError;
use crate::symbols::{Symbol, SymbolKind};
use crate::value::Value;
use arch::model::Model;
use color_print::cformat;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Contiguous run of emitted bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: u16,
    pub displacement: Option<i32>,
    pub bytes: Vec<u8>,
}

impl Segment {
    pub fn new(start: u16) -> Self {
        Segment {
            start,
            displacement: None,
            bytes: Vec::new(),
        }
    }

    /// Address `$` reads after the emitted bytes, displacement included
    pub fn address_at(&self, offset: usize) -> i64 {
        self.start as i64 + self.displacement.unwrap_or(0) as i64 + offset as i64
    }
}

/// Everything a compilation produces
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub errors: Vec<AssemblerError>,
    pub segments: Vec<Segment>,
    pub symbols: IndexMap<String, Symbol>,
    pub entry_address: Option<u16>,
    pub export_entry_address: Option<u16>,
    /// Address to (file, line) of the operation emitted there
    pub source_map: IndexMap<u16, (usize, usize)>,
    /// (file, line) to every address it was emitted at
    pub address_map: IndexMap<(usize, usize), Vec<u16>>,
    pub source_files: Vec<String>,
    pub model: Option<Model>,
    pub trace_output: Vec<String>,
}

impl Output {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Segments concatenated in order
    pub fn bytes(&self) -> Vec<u8> {
        self.segments
            .iter()
            .flat_map(|s| s.bytes.iter().copied())
            .collect()
    }

    pub fn symbol_map(&self) -> SymbolMap {
        SymbolMap::generate(self)
    }

    /// Colored listing: address and up to 8 bytes per line
    pub fn listing(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for segment in &self.segments {
            for (idx, chunk) in segment.bytes.chunks(8).enumerate() {
                let addr = segment.start as usize + idx * 8;
                let hex = chunk.iter().map(|b| format!("{b:02X}")).join(" ");
                let src = self
                    .source_map
                    .get(&(addr as u16))
                    .and_then(|(file, line)| {
                        self.source_files
                            .get(*file)
                            .map(|name| format!("{name}:{}", line + 1))
                    })
                    .unwrap_or_default();
                lines.push(cformat!("<blue>{:04X}</> | {:<23} | <dim>{}</>", addr, hex, src));
            }
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMap {
    pub symbols: IndexMap<String, SymbolEntry>,
    pub segments: Vec<SegmentEntry>,
    pub entry: Option<u16>,
    pub export_entry: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub kind: SymbolKind,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub start: u16,
    pub length: usize,
}

impl SymbolMap {
    pub fn generate(output: &Output) -> Self {
        let symbols = output
            .symbols
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    SymbolEntry {
                        kind: s.kind,
                        value: s.value.clone(),
                    },
                )
            })
            .collect();
        let segments = output
            .segments
            .iter()
            .map(|s| SegmentEntry {
                start: s.start,
                length: s.bytes.len(),
            })
            .collect();
        SymbolMap {
            symbols,
            segments,
            entry: output.entry_address,
            export_entry: output.export_entry_address,
        }
    }

    /// Serialize to YAML string with hexadecimal numbers
    pub fn to_yaml(&self) -> String {
        let mut yaml = String::new();

        // Write symbols section
        yaml.push_str("symbols:\n");
        if self.symbols.is_empty() {
            yaml.push_str("  {}\n");
        }
        for (name, entry) in &self.symbols {
            yaml.push_str(&format!("  {}:\n", name));
            yaml.push_str(&format!("    kind: {:?}\n", entry.kind));
            let value = match &entry.value {
                Some(Value::Integer(i)) if *i >= 0 => format!("0x{:x}", i),
                Some(Value::String(s)) => format!("{:?}", s),
                Some(v) => v.to_string(),
                None => "~".to_string(),
            };
            yaml.push_str(&format!("    value: {}\n", value));
        }

        // Write segments section
        yaml.push_str("segments:\n");
        if self.segments.is_empty() {
            yaml.push_str("  []\n");
        }
        for segment in &self.segments {
            yaml.push_str(&format!("  - start: 0x{:x}\n", segment.start));
            yaml.push_str(&format!("    length: 0x{:x}\n", segment.length));
        }

        // Write entry addresses
        for (key, entry) in [("entry", self.entry), ("export_entry", self.export_entry)] {
            match entry {
                Some(addr) => yaml.push_str(&format!("{}: 0x{:x}\n", key, addr)),
                None => yaml.push_str(&format!("{}: ~\n", key)),
            }
        }

        yaml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn yaml() {
        let mut output = Output::default();
        output.segments.push(Segment {
            start: 0x8000,
            displacement: None,
            bytes: vec![0x3E, 0x01],
        });
        output.symbols.insert(
            "START".into(),
            Symbol {
                name: "START".into(),
                kind: SymbolKind::Label,
                value: Some(Value::Integer(0x8000)),
                file: 0,
                line: 0,
            },
        );
        output.entry_address = Some(0x8000);
        let yaml = output.symbol_map().to_yaml();
        assert_eq!(
            yaml,
            "symbols:\n  START:\n    kind: Label\n    value: 0x8000\nsegments:\n  - start: 0x8000\n    length: 0x2\nentry: 0x8000\nexport_entry: ~\n"
        );
    }
}
