//! `#` directives: conditional assembly and file inclusion, applied before emission.

use crate::error::{AssemblerError, Error};
use crate::eval::{evaluate, EvalContext, Evaluated};
use crate::functions::Rng;
use crate::grammer::ast::{Directive, SourceLine, Stmt, SymbolRef};
use crate::grammer::parse_source;
use crate::options::AssemblerOptions;
use crate::value::Value;
use arch::model::Model;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// `#if` view: defined names read as `true`, the rest as `false`
struct Defines<'a> {
    names: &'a HashSet<String>,
    rng: Rng,
}

impl EvalContext for Defines<'_> {
    fn symbol(&mut self, symbol: &SymbolRef) -> Option<Value> {
        Some(Value::Bool(self.names.contains(&symbol.joined())))
    }

    fn current_address(&self) -> u16 {
        0
    }

    fn loop_counter(&self) -> Option<i64> {
        None
    }

    fn rng(&mut self) -> &mut Rng {
        &mut self.rng
    }
}

/// One open `#if...#endif`
struct Conditional {
    /// Lines of the enclosing section are kept
    outer: bool,
    taken: bool,
    in_else: bool,
}

pub struct Preprocessor {
    model: Model,
    defines: HashSet<String>,
    /// Display names, indexed by `SourceLine::file`
    pub files: Vec<String>,
    /// Directory of each file, for relative paths
    pub dirs: Vec<Option<PathBuf>>,
    /// Raw lines per display name, for diagnostics
    pub sources: IndexMap<String, Vec<String>>,
    pub errors: Vec<AssemblerError>,
}

impl Preprocessor {
    pub fn new(options: &AssemblerOptions) -> Self {
        Preprocessor {
            model: options.current_model.unwrap_or_default(),
            defines: options
                .predefined_symbols
                .iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
            files: Vec::new(),
            dirs: Vec::new(),
            sources: IndexMap::new(),
            errors: Vec::new(),
        }
    }

    /// Parse the main source and everything it includes. `name` is the path of the
    /// main file when `dir` is given.
    pub fn process(&mut self, name: &str, dir: Option<PathBuf>, code: &str) -> Vec<SourceLine> {
        let chain = dir
            .as_ref()
            .and_then(|_| Path::new(name).canonicalize().ok())
            .into_iter()
            .collect::<Vec<_>>();
        self.process_file(name, dir, code, &chain)
    }

    fn report(&mut self, error: Error, file: usize, line: usize) {
        let name = self.files.get(file).cloned().unwrap_or_default();
        self.errors.push(AssemblerError::new(&error, &name, line));
    }

    fn process_file(&mut self, name: &str, dir: Option<PathBuf>, code: &str, chain: &[PathBuf]) -> Vec<SourceLine> {
        let file = self.files.len();
        self.files.push(name.to_string());
        self.dirs.push(dir.clone());
        self.sources
            .insert(name.to_string(), code.lines().map(String::from).collect());
        tracing::debug!(file = %name, "source parsed");

        let (lines, errors) = parse_source(file, code);
        for (line, error) in errors {
            self.report(error, file, line);
        }

        let mut out = Vec::new();
        let mut stack: Vec<Conditional> = Vec::new();
        let mut included = HashSet::new();
        let mut last = 0;
        for line in lines {
            last = line.line;
            let active = stack.last().map_or(true, |c| c.outer && c.taken);
            let Some(Stmt::Directive(directive)) = &line.stmt else {
                if active {
                    out.push(line);
                }
                continue;
            };
            match directive {
                Directive::Define(name) if active => {
                    self.defines.insert(name.to_ascii_uppercase());
                }
                Directive::Undef(name) if active => {
                    self.defines.remove(&name.to_ascii_uppercase());
                }
                Directive::IfDef(name) | Directive::IfNDef(name) => {
                    let defined = self.defines.contains(&name.to_ascii_uppercase());
                    let taken = defined == matches!(directive, Directive::IfDef(_));
                    stack.push(Conditional { outer: active, taken, in_else: false });
                }
                Directive::If(expr) => {
                    let mut ctx = Defines {
                        names: &self.defines,
                        rng: Rng::new(0),
                    };
                    let taken = match evaluate(&mut ctx, expr) {
                        Ok(Evaluated::Ready(value)) => value.as_bool().unwrap_or(false),
                        Ok(Evaluated::Pending(_)) => false,
                        Err(e) => {
                            if active {
                                self.report(e.into(), file, line.line);
                            }
                            false
                        }
                    };
                    stack.push(Conditional { outer: active, taken, in_else: false });
                }
                Directive::IfMod(model) | Directive::IfNMod(model) => {
                    let taken = match Model::parse(model) {
                        Ok(model) => (model == self.model) == matches!(directive, Directive::IfMod(_)),
                        Err(_) => {
                            self.report(Error::IfModValue, file, line.line);
                            false
                        }
                    };
                    stack.push(Conditional { outer: active, taken, in_else: false });
                }
                Directive::Else => match stack.last_mut() {
                    Some(c) if !c.in_else => {
                        c.in_else = true;
                        c.taken = !c.taken;
                    }
                    _ => self.report(Error::UnexpectedElse, file, line.line),
                },
                Directive::EndIf => {
                    if stack.pop().is_none() {
                        self.report(Error::UnexpectedEndif, file, line.line);
                    }
                }
                Directive::Include(path) if active => {
                    match self.include(path, dir.as_deref(), chain, &mut included) {
                        Ok(lines) => out.extend(lines),
                        Err(e) => self.report(e, file, line.line),
                    }
                }
                _ => {}
            }
        }
        if !stack.is_empty() {
            self.report(Error::MissingEndif, file, last);
        }
        out
    }

    fn include(
        &mut self,
        path: &str,
        dir: Option<&Path>,
        chain: &[PathBuf],
        included: &mut HashSet<PathBuf>,
    ) -> Result<Vec<SourceLine>, Error> {
        let full = match dir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        };
        let full = full
            .canonicalize()
            .map_err(|_| Error::IncludeNotFound(path.to_string()))?;
        if chain.contains(&full) {
            return Err(Error::IncludeCircular(path.to_string()));
        }
        if !included.insert(full.clone()) {
            return Err(Error::IncludeTwice(path.to_string()));
        }
        let code = std::fs::read_to_string(&full)
            .map_err(|e| Error::IncludeRead(path.to_string(), e.to_string()))?;

        let mut chain = chain.to_vec();
        chain.push(full.clone());
        let dir = full.parent().map(Path::to_path_buf);
        Ok(self.process_file(&full.to_string_lossy(), dir, &code, &chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(options: &AssemblerOptions, code: &str) -> (Vec<SourceLine>, Vec<String>) {
        let mut pre = Preprocessor::new(options);
        let lines = pre.process("main.asm", None, code);
        let codes = pre.errors.iter().map(|e| e.code.clone()).collect();
        (lines, codes)
    }

    fn kept(lines: &[SourceLine]) -> Vec<usize> {
        lines.iter().map(|l| l.line).collect()
    }

    #[test]
    fn conditionals() {
        let options = AssemblerOptions {
            predefined_symbols: vec!["Debug".into()],
            ..Default::default()
        };
        let (lines, errors) = run(
            &options,
            "#ifdef DEBUG\nnop\n#else\nhalt\n#endif\n#ifndef DEBUG\nei\n#endif\n#define X\n#if X & !Y\ndi\n#endif",
        );
        assert!(errors.is_empty());
        assert_eq!(kept(&lines), vec![1, 10]);

        let (lines, _) = run(&options, "#undef DEBUG\n#ifdef DEBUG\nnop\n#endif");
        assert!(lines.is_empty());
    }

    #[test]
    fn nested() {
        let (lines, errors) = run(
            &AssemblerOptions::default(),
            "#ifdef A\n#define B\n#ifndef C\nnop\n#endif\n#else\nhalt\n#endif\n#ifdef B\nei\n#endif",
        );
        assert!(errors.is_empty());
        assert_eq!(kept(&lines), vec![6]);
    }

    #[test]
    fn models() {
        let options = AssemblerOptions {
            current_model: Some(Model::NEXT),
            ..Default::default()
        };
        let (lines, errors) = run(&options, "#ifmod NEXT\nnop\n#endif\n#ifnmod spectrum48\nhalt\n#endif");
        assert!(errors.is_empty());
        assert_eq!(kept(&lines), vec![1, 4]);
        let (_, errors) = run(&options, "#ifmod C64\n#endif");
        assert_eq!(errors, vec!["Z0090"]);
    }

    #[test]
    fn faults() {
        let options = AssemblerOptions::default();
        let (_, errors) = run(&options, "#else\n#endif\n#ifdef A\n#else\n#else\n#endif\n#ifdef A");
        assert_eq!(errors, vec!["Z0060", "Z0061", "Z0060", "Z0062"]);
        let (_, errors) = run(&options, "#include \"no/such/file.asm\"");
        assert_eq!(errors, vec!["Z0300"]);
    }

    #[test]
    fn includes() {
        let dir = std::env::temp_dir().join(format!("zxasm-include-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::write(dir.join("lib/util.asm"), "ld a,1\n#include \"../self.asm\"").unwrap();
        std::fs::write(dir.join("self.asm"), "#include \"lib/util.asm\"").unwrap();
        std::fs::write(dir.join("main.asm"), "#include \"lib/util.asm\"\n#include \"lib/util.asm\"").unwrap();

        let mut pre = Preprocessor::new(&AssemblerOptions::default());
        let code = std::fs::read_to_string(dir.join("main.asm")).unwrap();
        let lines = pre.process("main.asm", Some(dir.clone()), &code);
        let codes = pre.errors.iter().map(|e| e.code.as_str()).collect::<Vec<_>>();
        assert_eq!(codes, vec!["Z0303", "Z0302"]);
        assert_eq!(lines.len(), 1);
        assert_eq!(pre.files.len(), 3);
        assert_eq!(lines[0].file, 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
