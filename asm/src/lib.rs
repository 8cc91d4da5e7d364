//! Z80 cross-assembler for the ZX Spectrum family.

pub mod emit;
pub mod error;
pub mod eval;
pub mod functions;
pub mod grammer;
pub mod options;
pub mod output;
pub mod preproc;
pub mod symbols;
pub mod value;

use emit::Assembler;
use error::{AssemblerError, Error};
use options::AssemblerOptions;
use output::Output;
use preproc::Preprocessor;
use std::path::{Path, PathBuf};
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a tracing subscriber when `RUST_LOG` is set
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Assemble a source text; includes resolve against the working directory
pub fn compile(source: &str, options: &AssemblerOptions) -> Output {
    assemble("<source>", None, source, options)
}

/// Assemble a file; includes resolve against its directory
pub fn compile_file(path: &str, options: &AssemblerOptions) -> Output {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            let error = Error::FileOpen(path.to_string(), e.to_string());
            return Output {
                errors: vec![AssemblerError::new(&error, path, 0)],
                source_files: vec![path.to_string()],
                ..Default::default()
            };
        }
    };
    let dir = Path::new(path)
        .parent()
        .map(|p| match p.as_os_str().is_empty() {
            true => PathBuf::from("."),
            false => p.to_path_buf(),
        });
    assemble(path, dir, &source, options)
}

fn assemble(name: &str, dir: Option<PathBuf>, source: &str, options: &AssemblerOptions) -> Output {
    tracing::info!(file = %name, "compile started");
    let mut pre = Preprocessor::new(options);
    let lines = pre.process(name, dir, source);
    let mut asm = Assembler::new(options.clone(), pre.files, pre.dirs);
    asm.run(&lines);
    let output = asm.into_output(pre.errors);
    tracing::info!(
        errors = output.error_count(),
        segments = output.segments.len(),
        "compile finished"
    );
    output
}
