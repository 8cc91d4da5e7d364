use super::Assembler;
use crate::error::Error;
use crate::grammer::ast::{BinaryOp, Block, Expr, SourceLine, Statement, Stmt};
use crate::symbols::fixup::Slot;
use crate::symbols::scope::ScopeKind;
use crate::symbols::SymbolKind;
use crate::value::Value;

/// One `.if`/`.elif`/`.else` section: its header and body
struct Section<'a> {
    header: &'a Statement,
    line: Option<&'a SourceLine>,
    body: &'a [SourceLine],
}

impl Assembler {
    /// Emit a statement that owns a body, `line` being its opening line
    pub fn emit_block(&mut self, block: Block, line: &SourceLine, body: &[SourceLine], end: &SourceLine) {
        let Some(Stmt::Statement(open)) = &line.stmt else {
            return;
        };
        match (block, open) {
            (Block::Macro, Statement::Macro(params)) => {
                let name = self.take_label(line);
                if let Err(e) = self.define_macro(name, params, body, end) {
                    self.report(e);
                }
            }
            (Block::Struct, _) => {
                let name = self.take_label(line);
                if let Err(e) = self.define_struct(name, body, end) {
                    self.report(e);
                }
            }
            (Block::Module, Statement::Module(arg)) => {
                let name = match &line.label {
                    Some(label) => Some(label.clone()),
                    None => arg.clone().or_else(|| self.take_label(line)),
                };
                self.flush_hanging();
                self.emit_module(name, body, end);
            }
            _ => {
                self.bind_line_label(line);
                match (block, open) {
                    (Block::If, _) => self.emit_if(open, body),
                    (Block::Loop, Statement::Loop(count)) => self.emit_loop(count, body, end),
                    (Block::While, Statement::While(cond)) => {
                        self.iterate(body, end, |asm, _| asm.eval_bool(cond), |_| Ok(false))
                    }
                    (Block::Repeat, _) => self.emit_repeat(body, end),
                    (Block::For, Statement::For(var, from, to, step)) => {
                        self.emit_for(var, from, to, step.as_ref(), body, end)
                    }
                    (Block::Proc, _) => self.emit_proc(body, end),
                    _ => {}
                }
            }
        }
    }

    /// Body-less statements
    pub fn emit_statement(&mut self, stmt: &Statement) -> Result<(), Error> {
        match stmt {
            Statement::Break => {
                let scope = self
                    .symbols
                    .top_scope_mut()
                    .filter(|s| s.kind == ScopeKind::Iteration)
                    .ok_or(Error::BreakOutsideLoop)?;
                scope.break_requested = true;
                Ok(())
            }
            Statement::Continue => {
                let scope = self
                    .symbols
                    .top_scope_mut()
                    .filter(|s| s.kind == ScopeKind::Iteration)
                    .ok_or(Error::ContinueOutsideLoop)?;
                scope.continue_requested = true;
                Ok(())
            }
            Statement::Local(names) => self.declare_locals(names),
            // openers and closers are paired up by `emit_lines`
            _ => Ok(()),
        }
    }

    fn declare_locals(&mut self, names: &[String]) -> Result<(), Error> {
        let scope = self
            .symbols
            .top_scope_mut()
            .filter(|s| s.kind == ScopeKind::Proc)
            .ok_or(Error::LocalOutside)?;
        for name in names {
            let key = name.to_ascii_uppercase();
            if !scope.locals.insert(key) {
                return Err(Error::LocalDefined(name.clone()));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------------

    fn emit_if(&mut self, open: &Statement, body: &[SourceLine]) {
        let mut sections = vec![Section {
            header: open,
            line: None,
            body: &[],
        }];
        let mut depth = 0usize;
        let mut start = 0;
        let mut faulty = false;
        for (idx, line) in body.iter().enumerate() {
            let Some(Stmt::Statement(stmt)) = &line.stmt else {
                continue;
            };
            if stmt.opens().is_some() {
                depth += 1;
                continue;
            }
            if stmt.closes().is_some() {
                depth = depth.saturating_sub(1);
                continue;
            }
            let section = match stmt {
                Statement::Elif(_) => "ELIF",
                Statement::Else => "ELSE",
                _ => continue,
            };
            if depth > 0 {
                continue;
            }
            self.pos = (line.file, line.line);
            if matches!(sections.last().map(|s| s.header), Some(Statement::Else)) {
                self.report(Error::SectionAfterElse(section));
                faulty = true;
            }
            if line.label.is_some() {
                self.report(Error::SectionLabel(section));
                faulty = true;
            }
            if let Some(last) = sections.last_mut() {
                last.body = &body[start..idx];
            }
            sections.push(Section {
                header: stmt,
                line: Some(line),
                body: &[],
            });
            start = idx + 1;
        }
        if let Some(last) = sections.last_mut() {
            last.body = &body[start..];
        }
        if faulty {
            return;
        }

        for section in sections {
            if let Some(line) = section.line {
                self.pos = (line.file, line.line);
            }
            let taken = match section.header {
                Statement::If(cond) | Statement::Elif(cond) => self.eval_bool(cond),
                Statement::IfUsed(sym) => Ok(self.symbols.used.contains(&sym.joined())),
                Statement::IfNUsed(sym) => Ok(!self.symbols.used.contains(&sym.joined())),
                _ => Ok(true),
            };
            match taken {
                Ok(true) => {
                    self.emit_lines(section.body);
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    self.report(e);
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------------

    /// Drive the passes of a loop body.
    ///
    /// Each pass runs in a fresh iteration scope. `proceed` is asked before the body,
    /// `finished` after it; both see the pass's scope so `$cnt` is available.
    /// Only a pass beyond the iteration ceiling is an error.
    fn iterate(
        &mut self,
        body: &[SourceLine],
        end: &SourceLine,
        mut proceed: impl FnMut(&mut Self, i64) -> Result<bool, Error>,
        mut finished: impl FnMut(&mut Self) -> Result<bool, Error>,
    ) {
        let start = self.pos;
        let errors = self.errors.len();
        let mut counter = 0;
        loop {
            counter += 1;
            let id = self.symbols.push_scope(ScopeKind::Iteration);
            self.symbols.scopes[id].counter = counter;

            self.pos = start;
            self.origin = self.current_address();
            let go = proceed(self, counter).unwrap_or_else(|e| {
                self.report(e);
                false
            });
            if !go {
                self.symbols.pop_scope();
                break;
            }
            if counter > self.options.max_loop_iterations {
                self.symbols.pop_scope();
                self.report(Error::LoopOverflow);
                return;
            }

            self.emit_lines(body);
            self.bind_end_label(end);
            self.resolve_fixups(Some(id));

            let done = if self.symbols.scopes[id].break_requested {
                true
            } else {
                self.pos = (end.file, end.line);
                self.origin = self.current_address();
                finished(self).unwrap_or_else(|e| {
                    self.report(e);
                    true
                })
            };
            self.symbols.pop_scope();

            let cap = self.options.max_loop_errors_to_report;
            if cap > 0 && self.errors.len() - errors >= cap {
                self.pos = start;
                self.report(Error::TooManyLoopErrors);
                break;
            }
            if done {
                break;
            }
        }
        tracing::debug!(passes = counter, "loop done");
    }

    fn emit_loop(&mut self, count: &Expr, body: &[SourceLine], end: &SourceLine) {
        let count = match self.eval_int(count) {
            Ok(count) => count,
            Err(e) => return self.report(e),
        };
        if count > self.options.max_loop_iterations {
            return self.report(Error::LoopCount);
        }
        self.iterate(body, end, |_, pass| Ok(pass <= count), |_| Ok(false));
    }

    fn emit_repeat(&mut self, body: &[SourceLine], end: &SourceLine) {
        let Some(Stmt::Statement(Statement::Until(cond))) = &end.stmt else {
            return;
        };
        self.iterate(body, end, |_, _| Ok(true), |asm| asm.eval_bool(cond));
    }

    fn emit_for(
        &mut self,
        var: &str,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
        body: &[SourceLine],
        end: &SourceLine,
    ) {
        if self.symbols.is_visible(var) {
            return self.report(Error::ForVariable(var.to_string()));
        }
        let (from, to, step) = match self.for_bounds(from, to, step) {
            Ok(bounds) => bounds,
            Err(e) => return self.report(e),
        };
        let integral = from.is_integral() && to.is_integral() && step.is_integral();
        let normalize = |v: Value| match (integral, &v) {
            (true, v) => Value::Integer(v.as_integer().unwrap_or_default()),
            (false, v) => Value::Real(v.as_real().unwrap_or_default()),
        };
        let (from, to, step) = (normalize(from), normalize(to), normalize(step));
        let ascending = step.as_real().unwrap_or_default() > 0.0;

        let id = self.symbols.push_scope(ScopeKind::Loop);
        let slot = Slot::Local(id);
        let key = var.to_ascii_uppercase();
        let (file, line) = self.pos;
        let defined = self
            .symbols
            .define_in(slot, var, SymbolKind::Var, Some(from.clone()), file, line);
        if let Err(e) = defined {
            self.report(e);
            self.symbols.pop_scope();
            return;
        }

        let mut value = from;
        self.iterate(
            body,
            end,
            |asm, pass| {
                if pass > 1 {
                    value = value.binary(BinaryOp::Add, &step)?;
                }
                let past = if ascending { BinaryOp::Gt } else { BinaryOp::Lt };
                if value.binary(past, &to)?.as_bool() == Some(true) {
                    return Ok(false);
                }
                asm.symbols.assign(slot, &key, value.clone());
                Ok(true)
            },
            |_| Ok(false),
        );
        self.symbols.pop_scope();
    }

    fn for_bounds(&mut self, from: &Expr, to: &Expr, step: Option<&Expr>) -> Result<(Value, Value, Value), Error> {
        let from = self.eval_now(from)?;
        let to = self.eval_now(to)?;
        let step = match step {
            Some(step) => self.eval_now(step)?,
            None => Value::Integer(1),
        };
        if [&from, &to, &step].iter().any(|v| matches!(v, Value::String(_))) {
            return Err(Error::NumericExpected);
        }
        if step.as_real() == Some(0.0) {
            return Err(Error::ZeroStep);
        }
        Ok((from, to, step))
    }

    // ------------------------------------------------------------------------
    // Procs and modules
    // ------------------------------------------------------------------------

    fn emit_proc(&mut self, body: &[SourceLine], end: &SourceLine) {
        let id = self.symbols.push_scope(ScopeKind::Proc);
        self.emit_lines(body);
        self.bind_end_label(end);
        self.resolve_fixups(Some(id));
        self.symbols.pop_scope();
    }

    fn emit_module(&mut self, name: Option<String>, body: &[SourceLine], end: &SourceLine) {
        let Some(name) = name else {
            return self.report(Error::ModuleName);
        };
        if let Err(e) = self.symbols.enter_module(&name) {
            return self.report(e);
        }
        tracing::debug!(module = %name, "entering module");
        self.emit_lines(body);
        self.bind_end_label(end);
        self.symbols.leave_module();
    }
}

#[cfg(test)]
mod tests {
    use crate::emit::Assembler;
    use crate::grammer::parse_source;
    use crate::options::AssemblerOptions;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn assemble_with(options: AssemblerOptions, source: &str) -> Assembler {
        let (lines, errors) = parse_source(0, source);
        assert!(errors.is_empty(), "{errors:?}");
        let mut asm = Assembler::new(options, vec!["test.asm".into()], vec![None]);
        asm.run(&lines);
        asm
    }

    fn assemble(source: &str) -> Assembler {
        assemble_with(AssemblerOptions::default(), source)
    }

    fn codes(asm: &Assembler) -> Vec<&str> {
        asm.errors.iter().map(|e| e.code.as_str()).collect()
    }

    fn bytes(asm: &Assembler) -> Vec<u8> {
        asm.segments.iter().flat_map(|s| s.bytes.clone()).collect()
    }

    #[test]
    fn if_sections() {
        let asm = assemble("Cond .equ 2\n.if Cond == 1\nnop\n.elif Cond == 2\nhalt\n.else\ndi\n.endif");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm), vec![0x76]);

        let asm = assemble(".if false\nnop\n.else\n.if true\nei\n.endif\n.endif");
        assert_eq!(bytes(&asm), vec![0xFB]);
    }

    #[test]
    fn if_faults() {
        let asm = assemble(".if true\n.else\n.elif true\n.endif");
        assert_eq!(codes(&asm), vec!["Z0410"]);
        let asm = assemble(".if true\nLbl: .else\n.endif");
        assert_eq!(codes(&asm), vec!["Z0411"]);
        let asm = assemble(".if Later\n.endif\nLater .equ 1");
        assert_eq!(codes(&asm), vec!["Z0201"]);
    }

    #[test]
    fn if_used() {
        let asm = assemble("ld a,Value\nValue .equ 3\n.ifused Value\nnop\n.endif\n.ifnused Other\nhalt\n.endif");
        assert_eq!(bytes(&asm), vec![0x3E, 3, 0x00, 0x76]);
    }

    #[test]
    fn loops() {
        let asm = assemble(".loop 3\n.defb $cnt\n.endl");
        assert_eq!(bytes(&asm), vec![1, 2, 3]);

        let asm = assemble("Count .var 0\n.while Count < 2\nnop\nCount .var Count + 1\n.endw");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm), vec![0, 0]);

        let asm = assemble(".repeat\nnop\n.until true");
        assert_eq!(bytes(&asm), vec![0]);

        let asm = assemble(".repeat\n.defb $cnt\n.until $cnt == 3");
        assert_eq!(bytes(&asm), vec![1, 2, 3]);
    }

    #[test]
    fn loop_labels_are_local() {
        let asm = assemble(".loop 2\njr Skip\nnop\nSkip: .endl");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm), vec![0x18, 1, 0, 0x18, 1, 0]);
        assert!(!asm.symbols.export().contains_key("SKIP"));
    }

    #[test]
    fn for_loops() {
        let asm = assemble(".for _i = 1 .to 2\nld bc,#1234\n.next");
        assert_eq!(bytes(&asm).len(), 6);

        let asm = assemble(".for i = 6 .to 1 .step -2\n.defb i\n.next");
        assert_eq!(bytes(&asm), vec![6, 4, 2]);

        let asm = assemble(".for x = 0.5 .to 2\n.defb x * 2\n.next");
        assert_eq!(bytes(&asm), vec![1, 3]);
    }

    #[test]
    fn for_faults() {
        let asm = assemble("i .equ 1\n.for i = 1 .to 2\n.next");
        assert_eq!(codes(&asm), vec!["Z0414"]);
        let asm = assemble(".for i = 1 .to 2 .step 0\n.next");
        assert_eq!(codes(&asm), vec!["Z0413"]);
        let asm = assemble(".for i = \"a\" .to 2\n.next");
        assert_eq!(codes(&asm), vec!["Z0305"]);
    }

    #[test]
    fn break_and_continue() {
        let asm = assemble(".loop 5\n.if $cnt == 3\n.break\n.endif\n.defb $cnt\n.endl");
        assert_eq!(bytes(&asm), vec![1, 2]);

        let asm = assemble(".loop 3\n.if $cnt == 2\n.continue\n.endif\n.defb $cnt\n.endl");
        assert_eq!(bytes(&asm), vec![1, 3]);

        let asm = assemble(".break\n.continue");
        assert_eq!(codes(&asm), vec!["Z0415", "Z0416"]);
    }

    #[test]
    fn loop_ceilings() {
        let options = AssemblerOptions {
            max_loop_iterations: 10,
            ..Default::default()
        };
        let asm = assemble_with(options.clone(), ".loop 11\nnop\n.endl");
        assert_eq!(codes(&asm), vec!["Z0406"]);
        assert!(bytes(&asm).is_empty());

        let asm = assemble_with(options.clone(), ".while true\n.endw");
        assert_eq!(codes(&asm), vec!["Z0409"]);

        let asm = assemble_with(options.clone(), ".loop 10\nnop\n.endl");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm), vec![0; 10]);

        let asm = assemble_with(options.clone(), ".for i = 1 .to 10\n.defb i\n.next");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm), (1..=10).collect::<Vec<u8>>());

        let asm = assemble_with(options.clone(), "N .var 0\n.while N < 10\nN .var N + 1\nnop\n.endw");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm), vec![0; 10]);

        let asm = assemble_with(options.clone(), ".repeat\nnop\n.until $cnt == 10");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm).len(), 10);

        let asm = assemble(".loop #FFFF\n.endl");
        assert!(codes(&asm).is_empty());

        let options = AssemblerOptions {
            max_loop_errors_to_report: 3,
            ..Default::default()
        };
        let asm = assemble_with(options, ".loop 10\nld a,\"x\"\n.endl");
        assert_eq!(codes(&asm), vec!["Z0305", "Z0305", "Z0305", "Z0408"]);
    }

    #[test]
    fn counter_outside_loop() {
        let asm = assemble(".defb $cnt");
        assert_eq!(codes(&asm), vec!["Z0412"]);
    }

    #[test]
    fn procs() {
        let asm = assemble("Main: .proc\nLoop: djnz Loop\nret\n.endp\nLoop: nop");
        assert!(codes(&asm).is_empty());
        assert_eq!(bytes(&asm), vec![0x10, 0xFE, 0xC9, 0x00]);
        assert_eq!(asm.symbols.export()["LOOP"].value, Some(Value::Integer(0x8003)));
        assert_eq!(asm.symbols.export()["MAIN"].value, Some(Value::Integer(0x8000)));
    }

    #[test]
    fn explicit_locals() {
        let options = AssemblerOptions {
            proc_explicit_locals_only: true,
            ..Default::default()
        };
        let asm = assemble_with(options, ".proc\n.local Inner\nInner: nop\nOuter: nop\n.endp");
        assert!(codes(&asm).is_empty());
        let symbols = asm.symbols.export();
        assert!(symbols.contains_key("OUTER"));
        assert!(!symbols.contains_key("INNER"));

        let asm = assemble(".local x");
        assert_eq!(codes(&asm), vec!["Z0448"]);
        let asm = assemble(".proc\n.local x, X\n.endp");
        assert_eq!(codes(&asm), vec!["Z0449"]);
    }

    #[test]
    fn modules() {
        let asm = assemble("Game: .module\nStart: nop\n.endmodule\n.module Util\nStart: jp Game.Start\n.endmodule");
        assert!(codes(&asm).is_empty());
        let symbols = asm.symbols.export();
        assert_eq!(symbols["GAME.START"].value, Some(Value::Integer(0x8000)));
        assert_eq!(symbols["UTIL.START"].value, Some(Value::Integer(0x8001)));
        assert_eq!(bytes(&asm), vec![0x00, 0xC3, 0x00, 0x80]);

        let asm = assemble(".module\n.endmodule");
        assert_eq!(codes(&asm), vec!["Z0428"]);
        let asm = assemble(".module A\n.endmodule\n.module a\n.endmodule");
        assert_eq!(codes(&asm), vec!["Z0429"]);
    }

    #[test]
    fn orphans() {
        let asm = assemble(".endl\n.else\n.loop 2");
        assert_eq!(codes(&asm), vec!["Z0405", "Z0405", "Z0401"]);
    }
}
