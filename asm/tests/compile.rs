use arch::model::Model;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use zxasm::options::AssemblerOptions;
use zxasm::symbols::SymbolKind;
use zxasm::value::Value;
use zxasm::{compile, compile_file};

/// Scratch directory removed on drop
struct Workspace(PathBuf);

impl Workspace {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("zxasm-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Workspace(dir)
    }

    fn write(&self, name: &str, code: &str) -> String {
        let path = self.0.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, code).unwrap();
        path.to_string_lossy().into_owned()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn codes(output: &zxasm::output::Output) -> Vec<&str> {
    output.errors.iter().map(|e| e.code.as_str()).collect()
}

#[test]
fn segments_and_entry() {
    let output = compile(
        ".org #6000\nStart: ld a,1\n.ent Start\n.org #7000\nData: .defw Start\n.xent Data",
        &AssemblerOptions::default(),
    );
    assert_eq!(codes(&output), Vec::<&str>::new());
    assert_eq!(output.segments.len(), 2);
    assert_eq!(output.segments[0].start, 0x6000);
    assert_eq!(output.segments[1].start, 0x7000);
    assert_eq!(output.bytes(), vec![0x3E, 0x01, 0x00, 0x60]);
    assert_eq!(output.entry_address, Some(0x6000));
    assert_eq!(output.export_entry_address, Some(0x7000));
}

#[test]
fn default_start_address() {
    let options = AssemblerOptions {
        default_start_address: 0x4000,
        ..Default::default()
    };
    let output = compile("Here: jp Here", &options);
    assert_eq!(output.bytes(), vec![0xC3, 0x00, 0x40]);
    assert_eq!(output.symbols["HERE"].value, Some(Value::Integer(0x4000)));
}

#[test]
fn source_and_address_maps() {
    let output = compile("nop\n.loop 2\nld a,b\n.endl", &AssemblerOptions::default());
    assert_eq!(output.source_map[&0x8000], (0, 0));
    assert_eq!(output.source_map[&0x8001], (0, 2));
    assert_eq!(output.source_map[&0x8002], (0, 2));
    assert_eq!(output.address_map[&(0, 2)], vec![0x8001, 0x8002]);
}

#[test]
fn macro_calls_are_mapped() {
    let output = compile(
        "Twice: .macro()\nnop\nnop\n.endm\nhalt\nTwice()\nTwice()",
        &AssemblerOptions::default(),
    );
    assert_eq!(codes(&output), Vec::<&str>::new());
    assert_eq!(output.address_map[&(0, 5)], vec![0x8001]);
    assert_eq!(output.address_map[&(0, 6)], vec![0x8003]);
    assert_eq!(output.source_map[&0x8002], (0, 2));
}

#[test]
fn symbol_map() {
    let output = compile(
        "Size .equ 4\nCounter .var 1\nStart: nop\n.ent Start",
        &AssemblerOptions::default(),
    );
    let map = output.symbol_map();
    assert_eq!(map.symbols["SIZE"].kind, SymbolKind::Equ);
    assert_eq!(map.symbols["SIZE"].value, Some(Value::Integer(4)));
    assert_eq!(map.symbols["COUNTER"].kind, SymbolKind::Var);
    assert_eq!(map.entry, Some(0x8000));
    assert_eq!(map.segments.len(), 1);
    assert_eq!(map.segments[0].length, 1);
    assert!(map.to_yaml().contains("START:\n    kind: Label\n    value: 0x8000\n"));
}

#[test]
fn model_option_and_pragma() {
    let output = compile("swapnib", &AssemblerOptions::default());
    assert_eq!(codes(&output), vec!["Z0102"]);

    let next = AssemblerOptions {
        current_model: Some(Model::NEXT),
        ..Default::default()
    };
    let output = compile("swapnib", &next);
    assert_eq!(output.bytes(), vec![0xED, 0x23]);

    let output = compile(".model Next\nswapnib", &AssemblerOptions::default());
    assert_eq!(output.model, Some(Model::NEXT));
    assert_eq!(output.bytes(), vec![0xED, 0x23]);
}

#[test]
fn predefined_symbols() {
    let options = AssemblerOptions {
        predefined_symbols: vec!["debug".into()],
        ..Default::default()
    };
    let code = "#ifdef DEBUG\nhalt\n#else\nnop\n#endif";
    assert_eq!(compile(code, &options).bytes(), vec![0x76]);
    assert_eq!(compile(code, &AssemblerOptions::default()).bytes(), vec![0x00]);
}

#[test]
fn trace_and_user_errors() {
    let output = compile(
        ".trace \"size: \", 2*8\n.error \"stop\"",
        &AssemblerOptions::default(),
    );
    assert_eq!(output.trace_output, vec!["size: 16".to_string()]);
    assert_eq!(codes(&output), vec!["Z0500"]);
    assert_eq!(output.errors[0].line, 1);
}

#[test]
fn loop_error_cap() {
    let options = AssemblerOptions {
        max_loop_errors_to_report: 3,
        ..Default::default()
    };
    let output = compile(".loop 10\n.defb \"x\"+1\n.endl", &options);
    assert_eq!(codes(&output), vec!["Z0200", "Z0200", "Z0200", "Z0408"]);
}

#[test]
fn includes_resolve_against_the_including_file() {
    let ws = Workspace::new("compile-include");
    ws.write("lib/font.asm", "Glyph: .defb #18\n#include \"more.asm\"");
    ws.write("lib/more.asm", ".defb #3C");
    let main = ws.write("main.asm", "ld hl,Glyph\n#include \"lib/font.asm\"");

    let output = compile_file(&main, &AssemblerOptions::default());
    assert_eq!(codes(&output), Vec::<&str>::new());
    assert_eq!(output.bytes(), vec![0x21, 0x03, 0x80, 0x18, 0x3C]);
    assert_eq!(output.source_files.len(), 3);
    assert_eq!(output.source_map[&0x8000], (0, 0));
}

#[test]
fn include_faults() {
    let ws = Workspace::new("compile-include-faults");
    ws.write("a.asm", "#include \"b.asm\"");
    ws.write("b.asm", "#include \"a.asm\"");
    let main = ws.write("main.asm", "#include \"a.asm\"\n#include \"missing.asm\"");

    let output = compile_file(&main, &AssemblerOptions::default());
    assert_eq!(codes(&output), vec!["Z0303", "Z0300"]);
    assert!(output.errors[0].file.ends_with("b.asm"));
    assert_eq!(output.errors[1].line, 1);
}

#[test]
fn missing_main_file() {
    let output = compile_file("/no/such/dir/main.asm", &AssemblerOptions::default());
    assert_eq!(output.error_count(), 1);
    assert!(output.segments.is_empty());
}

#[test]
fn options_from_yaml() {
    let ws = Workspace::new("compile-options");
    let path = ws.write(
        "options.yaml",
        "predefined-symbols: [FAST]\nmax-loop-errors-to-report: 4\ndefault-start-address: 24576\n",
    );
    let options = AssemblerOptions::from_yaml_file(&path).unwrap();
    assert_eq!(options.predefined_symbols, vec!["FAST".to_string()]);
    assert_eq!(options.max_loop_errors_to_report, 4);
    assert_eq!(options.default_start_address, 0x6000);
    assert_eq!(options.max_loop_iterations, 0xFFFF);

    let bad = ws.write("bad.yaml", "max-loop-iterations: lots\n");
    assert!(AssemblerOptions::from_yaml_file(&bad).is_err());
}
