use crate::functions::{self, Rng};
use crate::grammer::ast::{Expr, SymbolRef};
use crate::value::{ExprError, Value, MAX_STRING};

/// Outcome of an evaluation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Ready(Value),
    /// Names of the symbols without a value yet
    Pending(Vec<String>),
}

/// What an expression can see while it is evaluated
pub trait EvalContext {
    /// Value of a symbol, `None` while it is undefined or pending
    fn symbol(&mut self, symbol: &SymbolRef) -> Option<Value>;

    /// Address of the line being assembled (`$`)
    fn current_address(&self) -> u16;

    /// 1-based counter of the innermost loop iteration (`$cnt`)
    fn loop_counter(&self) -> Option<i64>;

    fn rng(&mut self) -> &mut Rng;
}

pub fn evaluate(ctx: &mut dyn EvalContext, expr: &Expr) -> Result<Evaluated, ExprError> {
    let mut pending: Vec<String> = Vec::new();
    let mut param = None;
    expr.walk(&mut |e| match e {
        Expr::Symbol(s) => {
            if ctx.symbol(s).is_none() {
                let name = s.to_string();
                if !pending.contains(&name) {
                    pending.push(name);
                }
            }
        }
        Expr::MacroParam(p) => {
            param.get_or_insert_with(|| p.clone());
        }
        _ => {}
    });
    if let Some(p) = param {
        return Err(ExprError::MacroParam(p));
    }
    if !pending.is_empty() {
        return Ok(Evaluated::Pending(pending));
    }
    eval(ctx, expr).map(Evaluated::Ready)
}

fn eval(ctx: &mut dyn EvalContext, expr: &Expr) -> Result<Value, ExprError> {
    match expr {
        Expr::Integer(i) => Ok(Value::Integer(*i)),
        Expr::Real(r) => Ok(Value::Real(*r)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Text(raw) => {
            let s = unescape(raw);
            if s.chars().count() > MAX_STRING {
                return Err(ExprError::StringTooLong(MAX_STRING));
            }
            Ok(Value::String(s))
        }
        // pending symbols were ruled out before
        Expr::Symbol(s) => Ok(ctx.symbol(s).unwrap_or(Value::Integer(0))),
        Expr::CurAddr => Ok(Value::Integer(ctx.current_address() as i64)),
        Expr::LoopCounter => ctx
            .loop_counter()
            .map(Value::Integer)
            .ok_or(ExprError::LoopCounter),
        Expr::MacroParam(p) => Err(ExprError::MacroParam(p.clone())),
        Expr::Unary(op, e) => eval(ctx, e)?.unary(*op),
        Expr::Binary(op, l, r) => {
            let l = eval(ctx, l)?;
            let r = eval(ctx, r)?;
            l.binary(*op, &r)
        }
        Expr::Cond(c, t, e) => match eval(ctx, c)?.as_bool() {
            Some(true) => eval(ctx, t),
            Some(false) => eval(ctx, e),
            None => Err(ExprError::Condition),
        },
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|a| eval(ctx, a))
                .collect::<Result<Vec<_>, _>>()?;
            functions::call(name, &args, ctx.rng())
        }
    }
}

/// Resolve the C-like escapes of a string literal used as a value
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(c) => out.push(c),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammer::lexer::LineLexer;
    use crate::grammer::parsercore::Parser;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct Ctx {
        symbols: HashMap<String, Value>,
        counter: Option<i64>,
        rng: Rng,
    }

    impl EvalContext for Ctx {
        fn symbol(&mut self, symbol: &SymbolRef) -> Option<Value> {
            self.symbols.get(&symbol.joined()).cloned()
        }
        fn current_address(&self) -> u16 {
            0x8000
        }
        fn loop_counter(&self) -> Option<i64> {
            self.counter
        }
        fn rng(&mut self) -> &mut Rng {
            &mut self.rng
        }
    }

    fn run(code: &str) -> Result<Evaluated, ExprError> {
        let tokens = LineLexer::new(code, 0, 0).parse();
        let expr = Parser::new(tokens.into_iter()).parse_expr().unwrap();
        let mut ctx = Ctx {
            symbols: HashMap::from([("ONE".to_string(), Value::Integer(1))]),
            counter: None,
            rng: Rng::new(0),
        };
        evaluate(&mut ctx, &expr)
    }

    fn ready(i: i64) -> Result<Evaluated, ExprError> {
        Ok(Evaluated::Ready(Value::Integer(i)))
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run("true + 123"), ready(124));
        assert_eq!(run("1.0 == true"), Ok(Evaluated::Ready(Value::Bool(true))));
        assert_eq!(run("(2 + 3) * [4 - 1]"), ready(15));
        assert_eq!(run("$ + one"), ready(0x8001));
        assert_eq!(run("one > 0 ? 10 : 20"), ready(10));
        assert_eq!(run("high(#1234) + low(#1234)"), ready(0x46));
        assert!(run("\"abc\" + 1").is_err());
    }

    #[test]
    fn pending_and_faults() {
        assert_eq!(
            run("Later + Other + Later"),
            Ok(Evaluated::Pending(vec!["LATER".into(), "OTHER".into()]))
        );
        assert_eq!(run("1 / (one - 1)"), Err(ExprError::DivideByZero));
        assert_eq!(run("$cnt"), Err(ExprError::LoopCounter));
        assert_eq!(run("{{p}} + 1"), Err(ExprError::MacroParam("p".into())));
    }
}
