use super::Assembler;
use crate::error::Error;
use crate::grammer::ast::{Expr, Operand, Pragma, SourceLine, Statement, Stmt, SymbolRef};
use crate::symbols::module::MacroDef;
use crate::symbols::scope::ScopeKind;
use arch::reg::Reg8;

// ----------------------------------------------------------------------------
// Statement traversal
// ----------------------------------------------------------------------------

/// Generates a visitor over the top-level expressions and operands of a statement,
/// once for shared and once for mutable access
macro_rules! visitors {
    ($exprs:ident, $operands:ident, $($m:tt)*) => {
        fn $exprs(stmt: &$($m)* Stmt, f: &mut dyn FnMut(&$($m)* Expr)) {
            match stmt {
                Stmt::Op(op) => {
                    for operand in &$($m)* op.operands {
                        operand_expr!(operand, f);
                    }
                }
                Stmt::Call(_, args) => {
                    for operand in args {
                        operand_expr!(operand, f);
                    }
                }
                Stmt::Pragma(pragma) | Stmt::FieldAssign(_, pragma) => match pragma {
                    Pragma::Org(e)
                    | Pragma::Ent(e)
                    | Pragma::Xent(e)
                    | Pragma::Disp(e)
                    | Pragma::Equ(e)
                    | Pragma::Var(e)
                    | Pragma::DefM(e)
                    | Pragma::DefN(e)
                    | Pragma::DefC(e)
                    | Pragma::DefH(e)
                    | Pragma::DefS(e)
                    | Pragma::DefG(e)
                    | Pragma::DefGX(e)
                    | Pragma::Error(e) => f(e),
                    Pragma::Skip(a, b) => {
                        f(a);
                        if let Some(b) = b {
                            f(b);
                        }
                    }
                    Pragma::FillB(a, b) | Pragma::FillW(a, b) => {
                        f(a);
                        f(b);
                    }
                    Pragma::DefB(list) | Pragma::DefW(list) | Pragma::Trace(_, list) => {
                        for e in list {
                            f(e);
                        }
                    }
                    Pragma::Align(e) | Pragma::RndSeed(e) => {
                        if let Some(e) = e {
                            f(e);
                        }
                    }
                    Pragma::IncludeBin(a, b, c) => {
                        f(a);
                        for e in [b, c].into_iter().flatten() {
                            f(e);
                        }
                    }
                    Pragma::Model(_) => {}
                },
                Stmt::Statement(stmt) => match stmt {
                    Statement::If(e)
                    | Statement::Elif(e)
                    | Statement::Loop(e)
                    | Statement::While(e)
                    | Statement::Until(e) => f(e),
                    Statement::For(_, from, to, step) => {
                        f(from);
                        f(to);
                        if let Some(step) = step {
                            f(step);
                        }
                    }
                    _ => {}
                },
                Stmt::Directive(_) => {}
            }
        }

        fn $operands(stmt: &$($m)* Stmt, f: &mut dyn FnMut(&$($m)* Operand)) {
            match stmt {
                Stmt::Op(op) => {
                    for operand in &$($m)* op.operands {
                        f(operand);
                    }
                }
                Stmt::Call(_, args) => {
                    for operand in args {
                        f(operand);
                    }
                }
                _ => {}
            }
        }
    };
}

macro_rules! operand_expr {
    ($operand:expr, $f:expr) => {
        match $operand {
            Operand::Indexed(_, Some((_, e))) | Operand::Mem(e) | Operand::Expr(e) => $f(e),
            _ => {}
        }
    };
}

visitors!(exprs, operands, );
visitors!(exprs_mut, operands_mut, mut);

/// Names of the `{{param}}` placeholders inside a string literal
fn text_params(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        names.push(rest[start + 2..start + 2 + len].trim());
        rest = &rest[start + 2 + len + 2..];
    }
    names
}

/// Every macro parameter a statement refers to
fn params_of(stmt: &Stmt) -> Vec<String> {
    let mut names = Vec::new();
    operands(stmt, &mut |operand| {
        if let Operand::MacroParam(name) = operand {
            names.push(name.clone());
        }
    });
    exprs(stmt, &mut |expr| {
        expr.walk(&mut |e| match e {
            Expr::MacroParam(name) => names.push(name.clone()),
            Expr::Text(text) => names.extend(text_params(text).into_iter().map(String::from)),
            _ => {}
        })
    });
    names
}

/// True when the statement carries a `{{param}}` placeholder
pub fn has_macro_param(stmt: &Stmt) -> bool {
    let mut found = false;
    operands(stmt, &mut |operand| {
        found |= matches!(operand, Operand::MacroParam(_));
    });
    exprs(stmt, &mut |expr| {
        expr.walk(&mut |e| found |= matches!(e, Expr::MacroParam(_)));
    });
    found
}

// ----------------------------------------------------------------------------
// Substitution
// ----------------------------------------------------------------------------

/// Bound arguments of one macro expansion
struct Bindings<'a> {
    params: &'a [String],
    args: &'a [Operand],
}

impl Bindings<'_> {
    fn get(&self, name: &str) -> Operand {
        self.params
            .iter()
            .position(|p| p.eq_ignore_ascii_case(name))
            .and_then(|idx| self.args.get(idx))
            .cloned()
            .unwrap_or_else(|| Operand::Expr(Expr::Text(String::new())))
    }

    /// Argument used where an expression is expected
    fn expr(&self, name: &str) -> Expr {
        match self.get(name) {
            Operand::Expr(e) | Operand::Mem(e) => e,
            other => Expr::Symbol(SymbolRef::parse(&other.to_string())),
        }
    }

    /// Argument spelled out inside a string literal
    fn text(&self, name: &str) -> String {
        match self.get(name) {
            Operand::Expr(Expr::Text(s)) => s,
            other => other.to_string(),
        }
    }

    fn substitute(&self, stmt: &mut Stmt) {
        operands_mut(stmt, &mut |operand| {
            let replaced = match operand {
                Operand::MacroParam(name) => self.get(name),
                // `({{reg}})` becomes a register indirection
                Operand::Mem(Expr::MacroParam(name)) => match self.get(name) {
                    Operand::Reg16(r) => Operand::RegIndirect(r),
                    Operand::Idx(r) => Operand::Indexed(r, None),
                    Operand::Reg8(Reg8::C) => Operand::CPort,
                    _ => return,
                },
                _ => return,
            };
            *operand = replaced;
        });
        exprs_mut(stmt, &mut |expr| {
            expr.walk_mut(&mut |e| match e {
                Expr::MacroParam(name) => *e = self.expr(name),
                Expr::Text(text) => {
                    for name in text_params(text).into_iter().map(String::from).collect::<Vec<_>>() {
                        *text = text.replace(&format!("{{{{{name}}}}}"), &self.text(&name));
                    }
                }
                _ => {}
            })
        });
    }
}

// ----------------------------------------------------------------------------
// Definition and invocation
// ----------------------------------------------------------------------------

impl Assembler {
    pub(super) fn define_macro(
        &mut self,
        name: Option<String>,
        params: &[String],
        body: &[SourceLine],
        end: &SourceLine,
    ) -> Result<(), Error> {
        if body
            .iter()
            .any(|l| matches!(&l.stmt, Some(Stmt::Statement(Statement::Macro(_)))))
        {
            return Err(Error::NestedMacro);
        }
        let name = name.ok_or(Error::MacroName)?;
        for (idx, param) in params.iter().enumerate() {
            if params[..idx].iter().any(|p| p.eq_ignore_ascii_case(param)) {
                return Err(Error::DuplicateMacroArg(param.clone()));
            }
        }
        let key = name.to_ascii_uppercase();
        if self.symbols.modules[self.symbols.current].macros.contains_key(&key) {
            return Err(Error::MacroDefined(name));
        }

        let mut valid = true;
        for line in body {
            let Some(stmt) = &line.stmt else {
                continue;
            };
            for param in params_of(stmt) {
                if !params.iter().any(|p| p.eq_ignore_ascii_case(&param)) {
                    self.report_at(Error::UnknownMacroArg(param), line.file, line.line);
                    valid = false;
                }
            }
        }
        if !valid {
            return Ok(());
        }

        tracing::debug!(name = %key, params = params.len(), "macro defined");
        let def = MacroDef {
            name: key.clone(),
            params: params.to_vec(),
            body: body.to_vec(),
            end_label: end.label.clone(),
        };
        self.symbols.modules[self.symbols.current].macros.insert(key, def);
        Ok(())
    }

    /// `Name(args)`: expand a macro or emit a struct instance
    pub(super) fn invoke(&mut self, line: &SourceLine, name: &str, args: &[Operand]) -> Result<(), Error> {
        if let Some(def) = self.symbols.find_macro(name).cloned() {
            return self.expand_macro(line, def, args);
        }
        if let Some(def) = self.symbols.find_struct(name).cloned() {
            if !args.is_empty() {
                return Err(Error::StructArguments(def.name));
            }
            return self.invoke_struct(def);
        }
        Err(Error::UnknownMacro(name.to_string()))
    }

    fn expand_macro(&mut self, line: &SourceLine, def: MacroDef, args: &[Operand]) -> Result<(), Error> {
        if args.len() > def.params.len() {
            return Err(Error::TooManyMacroArgs(def.name, def.params.len(), args.len()));
        }
        if self.macro_depth >= self.options.max_macro_depth {
            return Err(Error::MacroDepth(def.name, self.options.max_macro_depth));
        }
        let bindings = Bindings {
            params: &def.params,
            args,
        };
        let mut body = def.body.clone();
        for stmt in body.iter_mut().filter_map(|l| l.stmt.as_mut()) {
            bindings.substitute(stmt);
        }
        tracing::debug!(name = %def.name, depth = self.macro_depth + 1, "macro expanded");

        let id = self.symbols.push_scope(ScopeKind::Macro);
        self.macro_depth += 1;
        self.emit_lines(&body);
        let end = SourceLine {
            file: line.file,
            line: line.line,
            label: def.end_label.clone(),
            stmt: None,
            comment: None,
        };
        self.bind_end_label(&end);
        self.resolve_fixups(Some(id));
        self.macro_depth -= 1;
        self.symbols.pop_scope();
        Ok(())
    }
}
