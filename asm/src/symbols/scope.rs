use super::module::ModuleId;
use super::Symbol;
use indexmap::IndexMap;
use std::collections::HashSet;

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Proc,
    Macro,
    /// Whole loop; holds the `.for` variable
    Loop,
    /// One pass through a loop body
    Iteration,
}

/// Short-lived scope opened by a proc, a macro expansion or a loop
#[derive(Debug, Clone)]
pub struct LocalScope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub module: ModuleId,
    pub symbols: IndexMap<String, Symbol>,
    /// Names announced with `.local`
    pub locals: HashSet<String>,
    /// 1-based, iterations only
    pub counter: i64,
    pub break_requested: bool,
    pub continue_requested: bool,
}

impl LocalScope {
    pub fn new(kind: ScopeKind, parent: Option<ScopeId>, module: ModuleId) -> Self {
        LocalScope {
            kind,
            parent,
            module,
            symbols: IndexMap::new(),
            locals: HashSet::new(),
            counter: 0,
            break_requested: false,
            continue_requested: false,
        }
    }
}
