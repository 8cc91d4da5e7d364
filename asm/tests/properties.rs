use pretty_assertions::assert_eq;
use zxasm::compile;
use zxasm::options::AssemblerOptions;

fn assert_bytes(code: &str, expects: &[u8]) {
    let output = compile(code, &AssemblerOptions::default());
    let errors = output.errors.iter().map(|e| e.code.as_str()).collect::<Vec<_>>();
    assert_eq!(errors, Vec::<&str>::new(), "{}", code);
    assert_eq!(output.bytes(), expects, "{}", code);
}

fn assert_errors(code: &str, expects: &[&str]) {
    let output = compile(code, &AssemblerOptions::default());
    let errors = output.errors.iter().map(|e| e.code.as_str()).collect::<Vec<_>>();
    assert_eq!(errors, expects, "{}", code);
    assert_eq!(output.error_count(), expects.len());
}

macro_rules! emits {
    ($name:ident, $code:expr, $expects:expr) => {
        #[test]
        fn $name() {
            assert_bytes($code, &$expects);
        }
    };
}

macro_rules! fails {
    ($name:ident, $code:expr, $expects:expr) => {
        #[test]
        fn $name() {
            assert_errors($code, &$expects);
        }
    };
}

// Fixups
emits!(
    forward_jump,
    "jr nz,ForwAddr\nld b,#0A\nForwAddr: nop",
    [0x20, 0x02, 0x06, 0x0A, 0x00]
);
emits!(
    forward_equ_chain,
    "ld a,First\nFirst .equ Second + 1\nSecond .equ 4",
    [0x3E, 0x05]
);
fails!(circular_equ, "A .equ B\nB .equ A", ["Z0201", "Z0201"]);
fails!(undefined_symbol, "ld hl,Nowhere", ["Z0201"]);

// Values
fails!(string_plus_number, ".defb \"abc\"+1", ["Z0200"]);
emits!(bool_as_number, ".defb true+123==124", [0x01]);
emits!(real_equals_bool, ".defb 1.0==true", [0x01]);
emits!(string_concat, ".defm \"ab\"+\"c\"", [0x61, 0x62, 0x63]);

// Relative jumps
emits!(
    jr_forward_limit,
    "jr Target\n.defs 127\nTarget: nop",
    {
        let mut v = vec![0x18, 0x7F];
        v.extend([0u8; 128]);
        v
    }
);
emits!(
    jr_backward_limit,
    "Back: .defs 126\njr Back",
    {
        let mut v = vec![0u8; 126];
        v.extend([0x18, 0x80]);
        v
    }
);
fails!(jr_forward_overflow, "jr Target\n.defs 128\nTarget: nop", ["Z0022"]);
fails!(jr_backward_overflow, "Back: .defs 127\njr Back", ["Z0022"]);

// Loops
emits!(
    for_loop,
    ".for _i = 1 .to 2\nld bc,#1234\n.next",
    [0x01, 0x34, 0x12, 0x01, 0x34, 0x12]
);
emits!(repeat_runs_once, ".repeat\nnop\n.until true", [0x00]);
emits!(
    break_leaves_innermost,
    ".loop 2\n.loop 3\n.if $cnt == 2\n.break\n.endif\n.defb $cnt\n.endl\n.endl",
    [0x01, 0x01]
);
emits!(while_false_is_skipped, ".while false\nnop\n.endw\nhalt", [0x76]);
fails!(break_outside, ".break", ["Z0415"]);
fails!(continue_outside, ".continue", ["Z0416"]);
fails!(
    break_in_proc,
    ".loop 1\n.proc\n.break\n.endp\n.endl",
    ["Z0415"]
);

// Structs
fails!(
    struct_overflow,
    "Pair: .struct\n.defb 0, 0\n.ends\nPair()\n-> .defw 1, 2",
    ["Z0442"]
);
emits!(
    struct_fields,
    "Pair: .struct\nLo: .defb 0\nHi: .defb 0\n.ends\nPair()\nHi -> .defb 7",
    [0x00, 0x07]
);
