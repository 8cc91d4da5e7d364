//! Code emitter: walks the parsed lines, produces segments and queues fixups.

pub mod macros;
pub mod ops;
pub mod pragmas;
pub mod resolve;
pub mod statements;
pub mod structs;

use crate::error::{AssemblerError, Error};
use crate::eval::{evaluate, Evaluated};
use crate::functions::Rng;
use crate::grammer::ast::{Block, Expr, SourceLine, Statement, Stmt};
use crate::options::AssemblerOptions;
use crate::output::{Output, Segment};
use crate::symbols::fixup::{Fixup, FixupKind, Slot};
use crate::symbols::{SymbolContext, SymbolKind, SymbolTable};
use crate::value::Value;
use arch::model::Model;
use indexmap::IndexMap;
use std::path::PathBuf;
use structs::StructInvocation;

/// Bytes of one operation or pragma, with the expressions still to be patched in
#[derive(Debug, Default)]
pub struct Code {
    pub bytes: Vec<u8>,
    pub fixups: Vec<(FixupKind, usize, Expr)>,
}

impl Code {
    pub fn new() -> Self {
        Code::default()
    }

    pub fn byte(&mut self, b: u8) {
        self.bytes.push(b);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The compilation context
pub struct Assembler {
    pub options: AssemblerOptions,
    pub files: Vec<String>,
    /// Directory `.includebin` paths are relative to, per file
    pub dirs: Vec<Option<PathBuf>>,
    pub segments: Vec<Segment>,
    pub symbols: SymbolTable,
    pub errors: Vec<AssemblerError>,
    pub rng: Rng,
    pub model: Option<Model>,
    pub entry: Option<u16>,
    pub export_entry: Option<u16>,
    pub source_map: IndexMap<u16, (usize, usize)>,
    pub address_map: IndexMap<(usize, usize), Vec<u16>>,
    pub trace: Vec<String>,
    /// Label waiting for the next emitting line
    hanging: Option<(String, usize, usize)>,
    macro_depth: usize,
    struct_invocation: Option<StructInvocation>,
    /// Set while a struct body is measured; keeps the maps clean
    dry_run: bool,
    /// (file, line) of the line being emitted
    pos: (usize, usize),
    /// `$` at the start of the line being emitted
    origin: u16,
}

impl Assembler {
    pub fn new(options: AssemblerOptions, files: Vec<String>, dirs: Vec<Option<PathBuf>>) -> Self {
        let symbols = SymbolTable::new(options.proc_explicit_locals_only);
        Assembler {
            origin: options.default_start_address,
            options,
            files,
            dirs,
            segments: Vec::new(),
            symbols,
            errors: Vec::new(),
            rng: Rng::from_time(),
            model: None,
            entry: None,
            export_entry: None,
            source_map: IndexMap::new(),
            address_map: IndexMap::new(),
            trace: Vec::new(),
            hanging: None,
            macro_depth: 0,
            struct_invocation: None,
            dry_run: false,
            pos: (0, 0),
        }
    }

    /// Emit the whole program and resolve every fixup
    pub fn run(&mut self, lines: &[SourceLine]) {
        self.emit_lines(lines);
        self.flush_hanging();
        self.resolve_fixups(None);
    }

    pub fn into_output(self, mut errors: Vec<AssemblerError>) -> Output {
        errors.extend(self.errors);
        Output {
            errors,
            segments: self.segments,
            symbols: self.symbols.export(),
            entry_address: self.entry,
            export_entry_address: self.export_entry,
            source_map: self.source_map,
            address_map: self.address_map,
            source_files: self.files,
            model: self.model,
            trace_output: self.trace,
        }
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    pub fn report(&mut self, error: Error) {
        let (file, line) = self.pos;
        self.report_at(error, file, line);
    }

    pub fn report_at(&mut self, error: Error, file: usize, line: usize) {
        let name = self.files.get(file).cloned().unwrap_or_default();
        let diag = AssemblerError::new(&error, &name, line);
        tracing::debug!(code = %diag.code, file = %name, line, "{}", diag.message);
        self.errors.push(diag);
    }

    // ------------------------------------------------------------------------
    // Segments
    // ------------------------------------------------------------------------

    /// Address the next byte is emitted at, displacement included
    pub fn current_address(&self) -> u16 {
        match self.segments.last() {
            Some(seg) => seg.address_at(seg.bytes.len()) as u16,
            None => self.options.default_start_address,
        }
    }

    /// Index of the segment being emitted, opened on demand
    pub fn current_segment(&mut self) -> usize {
        if self.segments.is_empty() {
            let start = self.options.default_start_address;
            tracing::debug!(start, "segment opened");
            self.segments.push(Segment::new(start));
        }
        self.segments.len() - 1
    }

    /// Append `code` to the current segment and queue its fixups
    pub fn emit_code(&mut self, code: Code) -> Result<(), Error> {
        if code.is_empty() {
            return Ok(());
        }
        let seg = self.current_segment();
        let base = self.segments[seg].bytes.len();
        if self.segments[seg].start as usize + base + code.len() > 0x10000 {
            return Err(Error::AddressOverflow);
        }
        self.segments[seg].bytes.extend_from_slice(&code.bytes);
        for (kind, offset, expr) in code.fixups {
            self.add_fixup(kind, seg, base + offset, expr, None);
        }
        Ok(())
    }

    pub fn add_fixup(
        &mut self,
        kind: FixupKind,
        segment: usize,
        offset: usize,
        expr: Expr,
        target: Option<(Slot, String)>,
    ) {
        let (file, line) = self.pos;
        self.symbols.fixups.push(Fixup {
            kind,
            segment,
            offset,
            expr,
            target,
            scope: self.symbols.top(),
            module: self.symbols.current,
            origin: self.origin,
            file,
            line,
            resolved: false,
        });
    }

    /// Record the line of an operation in the source and address maps
    fn map_source(&mut self, file: usize, line: usize) {
        if self.dry_run {
            return;
        }
        let addr = self.current_address();
        self.source_map.insert(addr, (file, line));
        self.address_map.entry((file, line)).or_default().push(addr);
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr) -> Result<Evaluated, Error> {
        let scope = self.symbols.top();
        let module = self.symbols.current;
        let mut ctx = SymbolContext {
            table: &mut self.symbols,
            rng: &mut self.rng,
            scope,
            module,
            origin: self.origin,
        };
        evaluate(&mut ctx, expr).map_err(Error::from)
    }

    /// Evaluate an expression that must have a value right now
    pub fn eval_now(&mut self, expr: &Expr) -> Result<Value, Error> {
        match self.eval(expr)? {
            Evaluated::Ready(value) => Ok(value),
            Evaluated::Pending(names) => Err(Error::NotEvaluable(names.join(", "))),
        }
    }

    /// Immediate numeric value; reals are truncated
    pub fn eval_int(&mut self, expr: &Expr) -> Result<i64, Error> {
        let value = self.eval_now(expr)?;
        match value {
            Value::String(_) => Err(Error::NumericExpected),
            Value::Real(r) => Ok(r as i64),
            v => Ok(v.as_integer().unwrap_or_default()),
        }
    }

    pub fn eval_bool(&mut self, expr: &Expr) -> Result<bool, Error> {
        self.eval_now(expr)?.as_bool().ok_or(Error::NumericExpected)
    }

    // ------------------------------------------------------------------------
    // Labels
    // ------------------------------------------------------------------------

    pub fn bind_label(&mut self, name: &str, addr: u16) {
        let (file, line) = self.pos;
        let value = Some(Value::Integer(addr as i64));
        if let Err(e) = self.symbols.define(name, SymbolKind::Label, value, file, line) {
            self.report(e);
        }
    }

    /// Bind a waiting label to the current address
    pub fn flush_hanging(&mut self) {
        if let Some((name, file, line)) = self.hanging.take() {
            let addr = self.current_address();
            let pos = std::mem::replace(&mut self.pos, (file, line));
            self.bind_label(&name, addr);
            self.pos = pos;
        }
    }

    /// Name a label-setting statement receives: its own label or the waiting one
    fn take_label(&mut self, line: &SourceLine) -> Option<String> {
        match &line.label {
            Some(label) => Some(label.clone()),
            None => self.hanging.take().map(|(name, _, _)| name),
        }
    }

    /// Bind the waiting label, then the line's own label, to the current address
    fn bind_line_label(&mut self, line: &SourceLine) {
        self.flush_hanging();
        if let Some(label) = &line.label {
            let addr = self.current_address();
            self.bind_label(label, addr);
        }
    }

    /// Label of a block's closing line, bound after the body
    fn bind_end_label(&mut self, end: &SourceLine) {
        self.flush_hanging();
        if let Some(label) = &end.label {
            self.pos = (end.file, end.line);
            let addr = self.current_address();
            self.bind_label(label, addr);
        }
    }

    // ------------------------------------------------------------------------
    // Lines
    // ------------------------------------------------------------------------

    /// True once `.break` or `.continue` stopped the innermost iteration
    fn interrupted(&self) -> bool {
        self.symbols
            .top_scope()
            .is_some_and(|s| s.break_requested || s.continue_requested)
    }

    pub fn emit_lines(&mut self, lines: &[SourceLine]) {
        let mut idx = 0;
        while idx < lines.len() {
            if self.interrupted() {
                return;
            }
            let line = &lines[idx];
            self.pos = (line.file, line.line);
            self.origin = self.current_address();
            if let Some(Stmt::Statement(stmt)) = &line.stmt {
                if let Some(block) = stmt.opens() {
                    self.struct_invocation = None;
                    let Some(end) = find_block_end(lines, idx, block) else {
                        self.report(Error::MissingEnd(block.closer()));
                        return;
                    };
                    self.emit_block(block, line, &lines[idx + 1..end], &lines[end]);
                    idx = end + 1;
                    continue;
                }
                if let Some(block) = stmt.closes() {
                    self.report(Error::Orphan(block.closer(), block.opener()));
                    idx += 1;
                    continue;
                }
                match stmt {
                    Statement::Elif(_) => {
                        self.report(Error::Orphan("ELIF", "IF"));
                        idx += 1;
                        continue;
                    }
                    Statement::Else => {
                        self.report(Error::Orphan("ELSE", "IF"));
                        idx += 1;
                        continue;
                    }
                    _ => {}
                }
            }
            self.emit_single_line(line);
            idx += 1;
        }
    }

    fn emit_single_line(&mut self, line: &SourceLine) {
        self.pos = (line.file, line.line);
        self.origin = self.current_address();
        let Some(stmt) = &line.stmt else {
            if let Some(label) = &line.label {
                self.flush_hanging();
                self.hanging = Some((label.clone(), line.file, line.line));
            }
            return;
        };

        if !matches!(stmt, Stmt::FieldAssign(..)) {
            self.struct_invocation = None;
        }
        if macros::has_macro_param(stmt) {
            if self.macro_depth > 0 && matches!(stmt, Stmt::Call(..)) {
                self.report(Error::MacroParamInArgument);
            } else {
                self.report(Error::MacroParamOutside);
            }
            return;
        }

        let result = match stmt {
            Stmt::Pragma(pragma) if pragma.sets_label() => {
                let label = self.take_label(line);
                self.flush_hanging();
                self.emit_pragma(pragma, label.as_deref())
            }
            Stmt::Pragma(pragma) => {
                self.bind_line_label(line);
                self.emit_pragma(pragma, None)
            }
            Stmt::Op(op) => {
                self.bind_line_label(line);
                self.map_source(line.file, line.line);
                self.emit_operation(op)
            }
            Stmt::Call(name, args) => {
                self.bind_line_label(line);
                self.map_source(line.file, line.line);
                self.invoke(line, name, args)
            }
            Stmt::FieldAssign(field, pragma) => {
                self.bind_line_label(line);
                self.assign_field(field.as_deref(), pragma)
            }
            Stmt::Statement(stmt) => {
                self.bind_line_label(line);
                self.emit_statement(stmt)
            }
            // consumed by the preprocessor
            Stmt::Directive(_) => Ok(()),
        };
        if let Err(e) = result {
            self.report(e);
        }
    }
}

/// Index of the line closing the block opened at `start`
pub fn find_block_end(lines: &[SourceLine], start: usize, block: Block) -> Option<usize> {
    let mut stack = Vec::new();
    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        let Some(Stmt::Statement(stmt)) = &line.stmt else {
            continue;
        };
        if let Some(inner) = stmt.opens() {
            stack.push(inner);
        } else if let Some(closed) = stmt.closes() {
            match stack.last() {
                Some(&top) if top == closed => {
                    stack.pop();
                }
                None if closed == block => return Some(idx),
                _ => {}
            }
        }
    }
    None
}
