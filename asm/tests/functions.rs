use pretty_assertions::assert_eq;
use zxasm::compile;
use zxasm::options::AssemblerOptions;

fn assert(code: &str, expects: Result<Vec<u8>, &str>) {
    let output = compile(code, &AssemblerOptions::default());
    match expects {
        Ok(bytes) => {
            assert_eq!(output.error_count(), 0, "{}: {:?}", code, output.errors);
            assert_eq!(output.bytes(), bytes, "{}", code);
        }
        Err(error) => {
            let errors = output.errors.iter().map(|e| e.code.as_str()).collect::<Vec<_>>();
            assert_eq!(errors, vec![error], "{}", code);
        }
    }
}

macro_rules! case {
    ($name:ident, $code:expr, [$($b:expr),* $(,)?]) => {
        #[test]
        fn $name() {
            assert($code, Ok(vec![$($b as u8),*]));
        }
    };
    ($name:ident, $code:expr, $error:literal) => {
        #[test]
        fn $name() {
            assert($code, Err($error));
        }
    };
}

// Numbers
case!(low_high, ".defb low(#1234), high(#1234)", [0x34, 0x12]);
case!(word, ".defw word(#12345)", [0x45, 0x23]);
case!(abs_int, ".defb abs(-5)", [5]);
case!(max_min, ".defb max(3, 7), min(3, 7)", [7, 3]);
case!(pow_real, ".defb int(pow(2, 3))", [8]);
case!(sqrt_real, ".defb int(sqrt(81.0))", [9]);
case!(round_half, ".defb int(round(2.5))", [3]);
case!(sign_of_real, ".defb sign(-0.5) + 2", [1]);
case!(case_insensitive, ".defb LOW(#0102)", [2]);
case!(unknown_function, ".defb frobnicate(1)", "Z0200");
case!(bad_arity, ".defb low(1, 2)", "Z0200");
case!(log_of_zero, ".defb int(log(0.0))", "Z0200");

// Strings
case!(length, ".defb length(\"hello\"), len(\"\")", [5, 0]);
case!(
    slices,
    ".defm left(\"hello\", 2) + right(\"hello\", 2) + mid(\"hello\", 1, 3)",
    [b'h', b'e', b'l', b'o', b'e', b'l', b'l']
);
case!(upper, ".defm ucase(\"ab\") + lcase(\"CD\")", [b'A', b'B', b'c', b'd']);
case!(to_string, ".defm str(12)", [b'1', b'2']);
case!(fill, ".defm fill(\"ab\", 3)", [b'a', b'b', b'a', b'b', b'a', b'b']);
case!(length_of_number, ".defb length(12)", "Z0200");

// Screen and attributes
case!(screen_top, ".defw scraddr(0, 0)", [0x00, 0x40]);
case!(screen_bottom, ".defw scraddr(191, 31)", [0xFF, 0x57]);
case!(screen_row, ".defw scraddr(9, 2)", [0x22, 0x41]);
case!(screen_out_of_range, ".defw scraddr(192, 0)", "Z0200");
case!(attribute_address, ".defw attraddr(8, 1)", [0x21, 0x58]);
case!(attributes, ".defb attr(1, 2), attr(7, 0, 1, 1)", [0x11, 0xC7]);
case!(attribute_parts, ".defb ink(2) | paper(5) | bright(1) | flash(0)", [0x6A]);
case!(ink_out_of_range, ".defb ink(8)", "Z0200");

// Random
case!(rnd_degenerate_range, ".rndseed 7\n.defb rnd(4, 4)", [4]);
case!(rnd_empty_range, ".defb rnd(5, 4)", "Z0200");
