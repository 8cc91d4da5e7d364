//! Built-in functions callable from expressions.
//!
//! Every function has one or more signatures; the first one whose parameters accept the
//! runtime types of the arguments is invoked.

use crate::value::{ExprError, Value, MAX_STRING};
use once_cell::sync::Lazy;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Param {
    Int,  // Bool | Integer
    Real, // Bool | Integer | Real
    Str,  // String
    Any,
}

impl Param {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Param::Int => value.is_integral(),
            Param::Real => !matches!(value, Value::String(_)),
            Param::Str => matches!(value, Value::String(_)),
            Param::Any => true,
        }
    }
}

type Body = fn(&[Value], &mut Rng) -> Result<Value, ExprError>;

struct Signature {
    name: &'static str,
    params: &'static [Param],
    body: Body,
}

fn int(args: &[Value], n: usize) -> i64 {
    args.get(n).and_then(Value::as_integer).unwrap_or_default()
}

fn real(args: &[Value], n: usize) -> f64 {
    args.get(n).and_then(Value::as_real).unwrap_or_default()
}

fn text(args: &[Value], n: usize) -> &str {
    args.get(n).and_then(Value::as_str).unwrap_or_default()
}

fn domain(name: &str) -> ExprError {
    ExprError::Domain(name.to_string())
}

fn checked_string(s: String) -> Result<Value, ExprError> {
    if s.chars().count() > MAX_STRING {
        Err(ExprError::StringTooLong(MAX_STRING))
    } else {
        Ok(Value::String(s))
    }
}

/// Check `value` lies in `range`, returning it
fn ranged(name: &str, value: i64, range: std::ops::RangeInclusive<i64>) -> Result<i64, ExprError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(domain(name))
    }
}

macro_rules! real_fn {
    ($name:literal, $f:expr) => {
        Signature {
            name: $name,
            params: &[Param::Real],
            body: |a, _| Ok(Value::Real($f(real(a, 0)))),
        }
    };
}

static FUNCTIONS: Lazy<Vec<Signature>> = Lazy::new(|| {
    use Param::*;
    vec![
        // Math
        Signature {
            name: "abs",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(int(a, 0).wrapping_abs())),
        },
        real_fn!("abs", f64::abs),
        real_fn!("acos", f64::acos),
        real_fn!("asin", f64::asin),
        real_fn!("atan", f64::atan),
        Signature {
            name: "atan2",
            params: &[Real, Real],
            body: |a, _| Ok(Value::Real(real(a, 0).atan2(real(a, 1)))),
        },
        real_fn!("ceiling", f64::ceil),
        real_fn!("cos", f64::cos),
        real_fn!("cosh", f64::cosh),
        real_fn!("exp", f64::exp),
        real_fn!("floor", f64::floor),
        real_fn!("log", f64::ln),
        Signature {
            name: "log",
            params: &[Real, Real],
            body: |a, _| Ok(Value::Real(real(a, 0).log(real(a, 1)))),
        },
        real_fn!("log10", f64::log10),
        Signature {
            name: "max",
            params: &[Int, Int],
            body: |a, _| Ok(Value::Integer(int(a, 0).max(int(a, 1)))),
        },
        Signature {
            name: "max",
            params: &[Real, Real],
            body: |a, _| Ok(Value::Real(real(a, 0).max(real(a, 1)))),
        },
        Signature {
            name: "min",
            params: &[Int, Int],
            body: |a, _| Ok(Value::Integer(int(a, 0).min(int(a, 1)))),
        },
        Signature {
            name: "min",
            params: &[Real, Real],
            body: |a, _| Ok(Value::Real(real(a, 0).min(real(a, 1)))),
        },
        Signature {
            name: "pow",
            params: &[Real, Real],
            body: |a, _| Ok(Value::Real(real(a, 0).powf(real(a, 1)))),
        },
        real_fn!("round", f64::round),
        Signature {
            name: "sign",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(int(a, 0).signum())),
        },
        Signature {
            name: "sign",
            params: &[Real],
            body: |a, _| {
                let r = real(a, 0);
                Ok(Value::Integer(if r > 0.0 {
                    1
                } else if r < 0.0 {
                    -1
                } else {
                    0
                }))
            },
        },
        real_fn!("sin", f64::sin),
        real_fn!("sinh", f64::sinh),
        real_fn!("sqrt", f64::sqrt),
        real_fn!("tan", f64::tan),
        real_fn!("tanh", f64::tanh),
        real_fn!("truncate", f64::trunc),
        Signature {
            name: "int",
            params: &[Real],
            body: |a, _| Ok(Value::Integer(real(a, 0).trunc() as i64)),
        },
        real_fn!("frac", f64::fract),
        Signature {
            name: "pi",
            params: &[],
            body: |_, _| Ok(Value::Real(std::f64::consts::PI)),
        },
        Signature {
            name: "nat",
            params: &[],
            body: |_, _| Ok(Value::Real(std::f64::consts::E)),
        },
        // Words
        Signature {
            name: "low",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(int(a, 0) & 0xFF)),
        },
        Signature {
            name: "high",
            params: &[Int],
            body: |a, _| Ok(Value::Integer((int(a, 0) >> 8) & 0xFF)),
        },
        Signature {
            name: "word",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(int(a, 0) & 0xFFFF)),
        },
        // Random
        Signature {
            name: "rnd",
            params: &[],
            body: |_, rng| Ok(Value::Integer(rng.next_u32() as i64)),
        },
        Signature {
            name: "rnd",
            params: &[Int, Int],
            body: |a, rng| {
                let (lo, hi) = (int(a, 0), int(a, 1));
                if lo > hi {
                    return Err(domain("rnd"));
                }
                Ok(Value::Integer(rng.range(lo, hi)))
            },
        },
        // Strings
        Signature {
            name: "length",
            params: &[Str],
            body: |a, _| Ok(Value::Integer(text(a, 0).chars().count() as i64)),
        },
        Signature {
            name: "len",
            params: &[Str],
            body: |a, _| Ok(Value::Integer(text(a, 0).chars().count() as i64)),
        },
        Signature {
            name: "left",
            params: &[Str, Int],
            body: |a, _| {
                let n = ranged("left", int(a, 1), 0..=i64::MAX)?;
                Ok(Value::String(text(a, 0).chars().take(n as usize).collect()))
            },
        },
        Signature {
            name: "right",
            params: &[Str, Int],
            body: |a, _| {
                let n = ranged("right", int(a, 1), 0..=i64::MAX)? as usize;
                let s = text(a, 0);
                let skip = s.chars().count().saturating_sub(n);
                Ok(Value::String(s.chars().skip(skip).collect()))
            },
        },
        Signature {
            name: "mid",
            params: &[Str, Int, Int],
            body: |a, _| {
                let start = ranged("mid", int(a, 1), 0..=i64::MAX)? as usize;
                let n = ranged("mid", int(a, 2), 0..=i64::MAX)? as usize;
                Ok(Value::String(text(a, 0).chars().skip(start).take(n).collect()))
            },
        },
        Signature {
            name: "lowercase",
            params: &[Str],
            body: |a, _| Ok(Value::String(text(a, 0).to_lowercase())),
        },
        Signature {
            name: "lcase",
            params: &[Str],
            body: |a, _| Ok(Value::String(text(a, 0).to_lowercase())),
        },
        Signature {
            name: "uppercase",
            params: &[Str],
            body: |a, _| Ok(Value::String(text(a, 0).to_uppercase())),
        },
        Signature {
            name: "ucase",
            params: &[Str],
            body: |a, _| Ok(Value::String(text(a, 0).to_uppercase())),
        },
        Signature {
            name: "str",
            params: &[Any],
            body: |a, _| checked_string(a.first().map(Value::to_string).unwrap_or_default()),
        },
        Signature {
            name: "fill",
            params: &[Str, Int],
            body: |a, _| {
                let s = text(a, 0);
                let n = ranged("fill", int(a, 1), 0..=i64::MAX)? as usize;
                if s.chars().count().saturating_mul(n) > MAX_STRING {
                    return Err(ExprError::StringTooLong(MAX_STRING));
                }
                Ok(Value::String(s.repeat(n)))
            },
        },
        // ZX Spectrum attributes and screen
        Signature {
            name: "ink",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(ranged("ink", int(a, 0), 0..=7)?)),
        },
        Signature {
            name: "paper",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(ranged("paper", int(a, 0), 0..=7)? << 3)),
        },
        Signature {
            name: "bright",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(ranged("bright", int(a, 0), 0..=1)? << 6)),
        },
        Signature {
            name: "flash",
            params: &[Int],
            body: |a, _| Ok(Value::Integer(ranged("flash", int(a, 0), 0..=1)? << 7)),
        },
        Signature {
            name: "attr",
            params: &[Int, Int],
            body: attr,
        },
        Signature {
            name: "attr",
            params: &[Int, Int, Int],
            body: attr,
        },
        Signature {
            name: "attr",
            params: &[Int, Int, Int, Int],
            body: attr,
        },
        Signature {
            name: "scraddr",
            params: &[Int, Int],
            body: |a, _| {
                let line = ranged("scraddr", int(a, 0), 0..=191)?;
                let col = ranged("scraddr", int(a, 1), 0..=31)?;
                Ok(Value::Integer(
                    0x4000 + ((line & 0xC0) << 5) + ((line & 0x07) << 8) + ((line & 0x38) << 2)
                        + col,
                ))
            },
        },
        Signature {
            name: "attraddr",
            params: &[Int, Int],
            body: |a, _| {
                let line = ranged("attraddr", int(a, 0), 0..=191)?;
                let col = ranged("attraddr", int(a, 1), 0..=31)?;
                Ok(Value::Integer(0x5800 + (line / 8) * 32 + col))
            },
        },
    ]
});

fn attr(a: &[Value], _: &mut Rng) -> Result<Value, ExprError> {
    let ink = ranged("attr", int(a, 0), 0..=7)?;
    let paper = ranged("attr", int(a, 1), 0..=7)?;
    let bright = ranged("attr", int(a, 2), 0..=1)?;
    let flash = ranged("attr", int(a, 3), 0..=1)?;
    Ok(Value::Integer(ink | paper << 3 | bright << 6 | flash << 7))
}

/// Invoke the function `name` (lower-case) with already evaluated arguments
pub fn call(name: &str, args: &[Value], rng: &mut Rng) -> Result<Value, ExprError> {
    let mut known = false;
    for sig in FUNCTIONS.iter().filter(|s| s.name == name) {
        known = true;
        if sig.params.len() == args.len()
            && sig.params.iter().zip(args).all(|(p, v)| p.accepts(v))
        {
            let value = (sig.body)(args, rng)?;
            if let Value::Real(r) = value {
                if !r.is_finite() {
                    return Err(domain(name));
                }
            }
            return Ok(value);
        }
    }
    if known {
        Err(ExprError::Signature(name.to_string()))
    } else {
        Err(ExprError::UnknownFunction(name.to_string()))
    }
}

/// Xorshift generator behind `rnd()`
#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        // zero is the only fixed point of xorshift
        Rng {
            state: seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1,
        }
    }

    /// Seeded from the clock
    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x2545_F491);
        Rng::new(nanos)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in `lo..=hi`
    pub fn range(&mut self, lo: i64, hi: i64) -> i64 {
        let span = (hi as i128 - lo as i128 + 1) as u128;
        (lo as i128 + (self.next_u64() as u128 % span) as i128) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(name: &str, args: &[Value]) -> Result<Value, ExprError> {
        call(name, args, &mut Rng::new(1))
    }

    #[test]
    fn signatures() {
        assert_eq!(run("abs", &[Value::Integer(-3)]), Ok(Value::Integer(3)));
        assert_eq!(run("abs", &[Value::Real(-1.5)]), Ok(Value::Real(1.5)));
        assert_eq!(
            run("max", &[Value::Integer(2), Value::Real(1.5)]),
            Ok(Value::Real(2.0))
        );
        assert_eq!(
            run("length", &[Value::Integer(3)]),
            Err(ExprError::Signature("length".into()))
        );
        assert_eq!(
            run("nosuch", &[]),
            Err(ExprError::UnknownFunction("nosuch".into()))
        );
        assert_eq!(run("sqrt", &[Value::Real(-1.0)]), Err(domain("sqrt")));
    }

    #[test]
    fn strings() {
        let s = Value::String("Hello".into());
        assert_eq!(
            run("left", &[s.clone(), Value::Integer(2)]),
            Ok(Value::String("He".into()))
        );
        assert_eq!(
            run("right", &[s.clone(), Value::Integer(3)]),
            Ok(Value::String("llo".into()))
        );
        assert_eq!(
            run("mid", &[s.clone(), Value::Integer(1), Value::Integer(3)]),
            Ok(Value::String("ell".into()))
        );
        assert_eq!(run("ucase", &[s.clone()]), Ok(Value::String("HELLO".into())));
        assert_eq!(run("str", &[Value::Bool(true)]), Ok(Value::String("true".into())));
        assert_eq!(
            run("fill", &[s, Value::Integer(5000)]),
            Err(ExprError::StringTooLong(MAX_STRING))
        );
    }

    #[test]
    fn spectrum() {
        assert_eq!(
            run("attr", &[Value::Integer(2), Value::Integer(7), Value::Integer(1)]),
            Ok(Value::Integer(0x7A))
        );
        assert_eq!(run("ink", &[Value::Integer(8)]), Err(domain("ink")));
        assert_eq!(
            run("scraddr", &[Value::Integer(0), Value::Integer(0)]),
            Ok(Value::Integer(0x4000))
        );
        assert_eq!(
            run("scraddr", &[Value::Integer(191), Value::Integer(31)]),
            Ok(Value::Integer(0x57FF))
        );
        assert_eq!(
            run("attraddr", &[Value::Integer(191), Value::Integer(31)]),
            Ok(Value::Integer(0x5AFF))
        );
        assert_eq!(run("high", &[Value::Integer(0x1234)]), Ok(Value::Integer(0x12)));
    }

    #[test]
    fn random() {
        let mut a = Rng::new(42);
        let mut b = Rng::new(42);
        for _ in 0..100 {
            let x = a.range(3, 5);
            assert!((3..=5).contains(&x));
            assert_eq!(x, b.range(3, 5));
        }
        assert_eq!(
            call("rnd", &[Value::Integer(5), Value::Integer(1)], &mut a),
            Err(domain("rnd"))
        );
    }
}
