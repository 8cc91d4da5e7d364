use pretty_assertions::assert_eq;
use zxasm::compile;
use zxasm::options::AssemblerOptions;

fn assert(code: &str, expects: &[u8], errors: &[&str]) {
    let output = compile(code, &AssemblerOptions::default());
    let codes = output.errors.iter().map(|e| e.code.as_str()).collect::<Vec<_>>();
    assert_eq!(codes, errors, "{}", code);
    assert_eq!(output.bytes(), expects, "{}", code);
}

macro_rules! case {
    ($name:ident, $code:expr, $expects:expr) => {
        #[test]
        fn $name() {
            assert($code, &$expects, &[]);
        }
    };
    ($name:ident, $code:expr, $expects:expr, $errors:expr) => {
        #[test]
        fn $name() {
            assert($code, &$expects, &$errors);
        }
    };
}

case!(
    macro_with_loop,
    "Fill: .macro(count, value)\n.loop {{count}}\n.defb {{value}}\n.endl\n.endm\nFill(3, #AA)",
    [0xAA, 0xAA, 0xAA]
);

case!(
    module_proc,
    ".module Screen\nClear: .proc\nld hl,#4000\nLoop: djnz Loop\nret\n.endp\n.endmodule\ncall Screen.Clear",
    [0x21, 0x00, 0x40, 0x10, 0xFE, 0xC9, 0xCD, 0x00, 0x80]
);

case!(
    real_step,
    ".for x = 0 .to 1 .step 0.5\n.defb int(x * 2)\n.next",
    [0, 1, 2]
);

case!(
    loop_forward_reference,
    ".loop 2\nld a,Value\n.endl\nValue .equ 9",
    [0x3E, 9, 0x3E, 9]
);

case!(
    nested_counters,
    ".loop 2\n.loop 2\n.defb $cnt\n.endl\n.defb $cnt * 10\n.endl",
    [1, 2, 10, 1, 2, 20]
);

case!(
    var_accumulator,
    "Sum .var 0\n.for i = 1 .to 4\nSum .var Sum + i\n.next\n.defb Sum",
    [10]
);

case!(
    if_chain_in_loop,
    ".loop 3\n.if $cnt == 1\n.defb #11\n.elif $cnt == 2\n.defb #22\n.else\n.defb #33\n.endif\n.endl",
    [0x11, 0x22, 0x33]
);

case!(
    struct_table,
    "Sprite: .struct\nX: .defb 0\nY: .defb 0\nGfx: .defw 0\n.ends\n\
     Sprite()\nY -> .defb 5\nSprite()\nX -> .defb 1\nGfx -> .defw Art\nArt: nop",
    [0, 5, 0, 0, 1, 0, 0x08, 0x80, 0x00]
);

case!(
    loop_ceiling,
    ".loop #10000\nnop\n.endl",
    [],
    ["Z0406"]
);

case!(
    unclosed_block,
    ".proc\nnop",
    [],
    ["Z0401"]
);

case!(
    equ_in_loop_is_local,
    ".loop 2\nTmp .equ $cnt\n.defb Tmp\n.endl\n.defb 0",
    [1, 2, 0]
);
