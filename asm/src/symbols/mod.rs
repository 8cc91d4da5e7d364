pub mod fixup;
pub mod module;
pub mod scope;

use crate::error::Error;
use crate::eval::EvalContext;
use crate::functions::Rng;
use crate::grammer::ast::SymbolRef;
use crate::value::Value;
use fixup::{Fixup, Slot};
use indexmap::IndexMap;
use module::{MacroDef, Module, ModuleId, StructDef};
use scope::{LocalScope, ScopeId, ScopeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Label,
    Equ,
    Var,
    StructField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// `None` while a `.equ` waits for its fixup
    pub value: Option<Value>,
    pub file: usize,
    pub line: usize,
}

impl Symbol {
    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }
}

/// Modules, local scopes and the fixup queue of one compilation
#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub modules: Vec<Module>,
    pub scopes: Vec<LocalScope>,
    pub active: Vec<ScopeId>,
    pub current: ModuleId,
    pub fixups: Vec<Fixup>,
    /// Names referenced so far, for `.ifused`
    pub used: HashSet<String>,
    pub explicit_locals: bool,
}

impl SymbolTable {
    pub fn new(explicit_locals: bool) -> Self {
        SymbolTable {
            modules: vec![Module::new("", None)],
            scopes: Vec::new(),
            active: Vec::new(),
            current: 0,
            fixups: Vec::new(),
            used: HashSet::new(),
            explicit_locals,
        }
    }

    // ------------------------------------------------------------------------
    // Local scopes
    // ------------------------------------------------------------------------

    pub fn top(&self) -> Option<ScopeId> {
        self.active.last().copied()
    }

    pub fn top_scope(&self) -> Option<&LocalScope> {
        self.top().map(|id| &self.scopes[id])
    }

    pub fn top_scope_mut(&mut self) -> Option<&mut LocalScope> {
        let id = self.top()?;
        self.scopes.get_mut(id)
    }

    pub fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.len();
        self.scopes
            .push(LocalScope::new(kind, self.top(), self.current));
        self.active.push(id);
        id
    }

    /// Close the innermost scope. Its symbols are dropped unless a queued fixup may still need them.
    pub fn pop_scope(&mut self) {
        let Some(id) = self.active.pop() else {
            return;
        };
        let needed = self
            .fixups
            .iter()
            .any(|f| !f.resolved && self.chain(f.scope).any(|s| s == id));
        if !needed {
            self.scopes[id].symbols.clear();
        }
    }

    /// Scope `start` and its parents, innermost first
    fn chain(&self, start: Option<ScopeId>) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(start, |&id| self.scopes[id].parent)
    }

    /// True when `id` is `scope` or one of its parents
    pub fn encloses(&self, scope: Option<ScopeId>, id: ScopeId) -> bool {
        self.chain(scope).any(|s| s == id)
    }

    /// Innermost active scope of `kind`
    pub fn innermost(&self, kind: ScopeKind) -> Option<ScopeId> {
        self.active
            .iter()
            .rev()
            .copied()
            .find(|&id| self.scopes[id].kind == kind)
    }

    pub fn loop_counter(&self, scope: Option<ScopeId>) -> Option<i64> {
        self.chain(scope)
            .find(|&id| self.scopes[id].kind == ScopeKind::Iteration)
            .map(|id| self.scopes[id].counter)
    }

    // ------------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------------

    pub fn enter_module(&mut self, name: &str) -> Result<(), Error> {
        let key = name.to_ascii_uppercase();
        if self.modules[self.current].children.contains_key(&key) {
            return Err(Error::ModuleDefined(name.to_string()));
        }
        let id = self.modules.len();
        self.modules.push(Module::new(&key, Some(self.current)));
        self.modules[self.current].children.insert(key, id);
        self.current = id;
        Ok(())
    }

    pub fn leave_module(&mut self) {
        if let Some(parent) = self.modules[self.current].parent {
            self.current = parent;
        }
    }

    fn module_chain(&self, start: ModuleId) -> impl Iterator<Item = ModuleId> + '_ {
        std::iter::successors(Some(start), |&id| self.modules[id].parent)
    }

    /// Dotted prefix of a module's symbols in the output
    fn qualifier(&self, id: ModuleId) -> String {
        let mut names = self
            .module_chain(id)
            .filter(|&m| m != 0)
            .map(|m| self.modules[m].name.as_str())
            .collect::<Vec<_>>();
        names.reverse();
        names.iter().map(|n| format!("{n}.")).collect()
    }

    pub fn find_macro(&self, name: &str) -> Option<&MacroDef> {
        let key = name.to_ascii_uppercase();
        self.module_chain(self.current)
            .find_map(|m| self.modules[m].macros.get(&key))
    }

    pub fn find_struct(&self, name: &str) -> Option<&StructDef> {
        let key = name.to_ascii_uppercase();
        self.module_chain(self.current)
            .find_map(|m| self.modules[m].structs.get(&key))
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Resolve `symbol` as seen from `scope` within `module`
    pub fn lookup(&self, symbol: &SymbolRef, scope: Option<ScopeId>, module: ModuleId) -> Option<&Symbol> {
        if symbol.rooted {
            return self.resolve_in(0, &symbol.path);
        }
        let name = symbol.joined();
        self.chain(scope)
            .find_map(|id| self.scopes[id].symbols.get(&name))
            .or_else(|| {
                self.module_chain(module)
                    .find_map(|m| self.resolve_in(m, &symbol.path))
            })
    }

    fn resolve_in(&self, module: ModuleId, path: &[String]) -> Option<&Symbol> {
        let found = self.modules[module].symbols.get(&path.join("."));
        if found.is_some() || path.len() < 2 {
            return found;
        }
        let child = *self.modules[module].children.get(&path[0])?;
        self.resolve_in(child, &path[1..])
    }

    /// True when `name` can be seen from the current position
    pub fn is_visible(&self, name: &str) -> bool {
        self.lookup(&SymbolRef::parse(name), self.top(), self.current)
            .is_some()
    }

    // ------------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------------

    /// Table a new label of this name goes to
    pub fn label_slot(&self, name: &str) -> Slot {
        match (self.top(), self.top_scope()) {
            (Some(_), Some(scope))
                if self.explicit_locals
                    && scope.kind == ScopeKind::Proc
                    && !scope.locals.contains(name) =>
            {
                Slot::Module(self.current)
            }
            (Some(id), _) => Slot::Local(id),
            _ => Slot::Module(self.current),
        }
    }

    fn table_mut(&mut self, slot: Slot) -> &mut IndexMap<String, Symbol> {
        match slot {
            Slot::Local(id) => &mut self.scopes[id].symbols,
            Slot::Module(id) => &mut self.modules[id].symbols,
        }
    }

    fn table(&self, slot: Slot) -> &IndexMap<String, Symbol> {
        match slot {
            Slot::Local(id) => &self.scopes[id].symbols,
            Slot::Module(id) => &self.modules[id].symbols,
        }
    }

    /// Declare a label or `.equ` in the table its name belongs to
    pub fn define(
        &mut self,
        name: &str,
        kind: SymbolKind,
        value: Option<Value>,
        file: usize,
        line: usize,
    ) -> Result<Slot, Error> {
        let key = name.to_ascii_uppercase();
        let slot = self.label_slot(&key);
        self.define_in(slot, name, kind, value, file, line)?;
        Ok(slot)
    }

    pub fn define_in(
        &mut self,
        slot: Slot,
        name: &str,
        kind: SymbolKind,
        value: Option<Value>,
        file: usize,
        line: usize,
    ) -> Result<(), Error> {
        let key = name.to_ascii_uppercase();
        if self.table(slot).contains_key(&key) {
            return Err(Error::LabelDefined(name.to_string()));
        }
        let symbol = Symbol {
            name: key.clone(),
            kind,
            value,
            file,
            line,
        };
        self.table_mut(slot).insert(key, symbol);
        Ok(())
    }

    /// Bind the value of a symbol declared earlier
    pub fn assign(&mut self, slot: Slot, name: &str, value: Value) {
        if let Some(symbol) = self.table_mut(slot).get_mut(name) {
            symbol.value = Some(value);
        }
    }

    /// `.var` semantics: update a visible variable or create one in the innermost table
    pub fn set_var(&mut self, name: &str, value: Value, file: usize, line: usize) -> Result<(), Error> {
        let key = name.to_ascii_uppercase();
        let existing = self
            .active
            .iter()
            .rev()
            .map(|&id| Slot::Local(id))
            .chain(std::iter::once(Slot::Module(self.current)))
            .find(|&slot| self.table(slot).contains_key(&key));
        match existing {
            Some(slot) => {
                let symbol = self
                    .table_mut(slot)
                    .get_mut(&key)
                    .ok_or(Error::VarRedefine)?;
                if symbol.kind != SymbolKind::Var {
                    return Err(Error::VarRedefine);
                }
                symbol.value = Some(value);
                Ok(())
            }
            None => {
                let slot = match self.top() {
                    Some(id) => Slot::Local(id),
                    None => Slot::Module(self.current),
                };
                self.define_in(slot, name, SymbolKind::Var, Some(value), file, line)
            }
        }
    }

    /// Module symbols under their qualified names
    pub fn export(&self) -> IndexMap<String, Symbol> {
        let mut out = IndexMap::new();
        for (id, module) in self.modules.iter().enumerate() {
            let prefix = self.qualifier(id);
            for (name, symbol) in &module.symbols {
                out.insert(format!("{prefix}{name}"), symbol.clone());
            }
        }
        out
    }
}

/// Evaluation view of the table from one point of the source
pub struct SymbolContext<'a> {
    pub table: &'a mut SymbolTable,
    pub rng: &'a mut Rng,
    pub scope: Option<ScopeId>,
    pub module: ModuleId,
    pub origin: u16,
}

impl EvalContext for SymbolContext<'_> {
    fn symbol(&mut self, symbol: &SymbolRef) -> Option<Value> {
        self.table.used.insert(symbol.joined());
        self.table
            .lookup(symbol, self.scope, self.module)
            .and_then(|s| s.value.clone())
    }

    fn current_address(&self) -> u16 {
        self.origin
    }

    fn loop_counter(&self) -> Option<i64> {
        self.table.loop_counter(self.scope)
    }

    fn rng(&mut self) -> &mut Rng {
        self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Option<Value> {
        Some(Value::Integer(i))
    }

    fn value(table: &SymbolTable, name: &str) -> Option<Value> {
        table
            .lookup(&SymbolRef::parse(name), table.top(), table.current)
            .and_then(|s| s.value.clone())
    }

    #[test]
    fn modules() {
        let mut table = SymbolTable::new(false);
        table.define("Start", SymbolKind::Label, int(1), 0, 0).unwrap();
        table.enter_module("Game").unwrap();
        table.define("Start", SymbolKind::Label, int(2), 0, 1).unwrap();
        table.enter_module("Sprites").unwrap();
        table.define("Draw", SymbolKind::Label, int(3), 0, 2).unwrap();
        assert_eq!(value(&table, "Start"), int(2));
        assert_eq!(value(&table, "::Start"), int(1));
        table.leave_module();
        assert_eq!(value(&table, "Sprites.Draw"), int(3));
        table.leave_module();
        assert_eq!(value(&table, "Game.Sprites.Draw"), int(3));
        assert_eq!(value(&table, "Draw"), None);
        assert!(table.enter_module("game").is_err());
        assert!(table.export().contains_key("GAME.SPRITES.DRAW"));
    }

    #[test]
    fn scopes() {
        let mut table = SymbolTable::new(false);
        table.push_scope(ScopeKind::Proc);
        table.define("inner", SymbolKind::Label, int(5), 0, 0).unwrap();
        assert!(matches!(
            table.define("Inner", SymbolKind::Label, int(5), 0, 1),
            Err(Error::LabelDefined(_))
        ));
        assert_eq!(value(&table, "INNER"), int(5));
        table.pop_scope();
        assert_eq!(value(&table, "INNER"), None);
        assert!(table.export().is_empty());
    }

    #[test]
    fn explicit_locals() {
        let mut table = SymbolTable::new(true);
        table.push_scope(ScopeKind::Proc);
        table.top_scope_mut().unwrap().locals.insert("HIDDEN".into());
        table.define("Hidden", SymbolKind::Label, int(1), 0, 0).unwrap();
        table.define("Shown", SymbolKind::Label, int(2), 0, 1).unwrap();
        table.pop_scope();
        assert_eq!(value(&table, "Shown"), int(2));
        assert_eq!(value(&table, "Hidden"), None);
    }

    #[test]
    fn variables() {
        let mut table = SymbolTable::new(false);
        table.set_var("count", Value::Integer(1), 0, 0).unwrap();
        table.push_scope(ScopeKind::Iteration);
        table.set_var("count", Value::Integer(2), 0, 1).unwrap();
        table.pop_scope();
        assert_eq!(value(&table, "count"), int(2));
        table.define("Fixed", SymbolKind::Equ, int(3), 0, 2).unwrap();
        assert_eq!(
            table.set_var("fixed", Value::Integer(4), 0, 3),
            Err(Error::VarRedefine)
        );
    }
}
