use super::Symbol;
use crate::grammer::ast::SourceLine;
use indexmap::IndexMap;

pub type ModuleId = usize;

/// Named namespace. Module 0 is the global one.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub parent: Option<ModuleId>,
    pub children: IndexMap<String, ModuleId>,
    pub symbols: IndexMap<String, Symbol>,
    pub macros: IndexMap<String, MacroDef>,
    pub structs: IndexMap<String, StructDef>,
}

impl Module {
    pub fn new(name: &str, parent: Option<ModuleId>) -> Self {
        Module {
            name: name.to_string(),
            parent,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<SourceLine>,
    /// Label on the closing `.endm`, bound after each expansion
    pub end_label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub size: usize,
    /// Field name to byte offset
    pub fields: IndexMap<String, usize>,
    pub body: Vec<SourceLine>,
}
