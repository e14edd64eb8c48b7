//! Numeric functions

use tfunk_runtime::{Function, FunctionError, FunctionRegistry, Number, Param, Type, Value};

use crate::args::{int_arg, num_arg, number, str_arg};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("abs", unary(|n| match n {
        Number::Int(i) => i.checked_abs().map(Number::Int).or_else(|| Number::from_f64((i as f64).abs())),
        Number::Float(f) => Number::from_f64(f.abs()),
    }));
    registry.register("ceil", unary(|n| Number::from_f64(n.as_f64().ceil())));
    registry.register("floor", unary(|n| Number::from_f64(n.as_f64().floor())));
    registry.register("signum", unary(|n| {
        let s = match n {
            Number::Int(i) => i.signum(),
            Number::Float(f) if f > 0.0 => 1,
            Number::Float(f) if f < 0.0 => -1,
            Number::Float(_) => 0,
        };
        Some(Number::Int(s))
    }));

    registry.register(
        "log",
        Function::native(
            vec![Param::new("num", Type::Number), Param::new("base", Type::Number)],
            |args| {
                let num = num_arg(args, 0)?.as_f64();
                let base = num_arg(args, 1)?.as_f64();
                number(Number::from_f64(num.ln() / base.ln()))
            },
        ),
    );
    registry.register(
        "pow",
        Function::native(
            vec![Param::new("num", Type::Number), Param::new("power", Type::Number)],
            |args| {
                let base = num_arg(args, 0)?;
                let power = num_arg(args, 1)?;
                let exact = match (base, power) {
                    (Number::Int(b), Number::Int(p)) if (0..=u32::MAX as i64).contains(&p) => {
                        b.checked_pow(p as u32).map(Number::Int)
                    }
                    _ => None,
                };
                number(exact.or_else(|| Number::from_f64(base.as_f64().powf(power.as_f64()))))
            },
        ),
    );
    registry.register("max", extreme(true));
    registry.register("min", extreme(false));
    registry.register(
        "parseint",
        Function::native(
            vec![Param::new("number", Type::String), Param::new("base", Type::Number)],
            |args| {
                let text = str_arg(args, 0)?;
                let base = int_arg(args, 1)?;
                if !(2..=62).contains(&base) {
                    return Err(FunctionError::arg(
                        1,
                        "base must be a whole number between 2 and 62 inclusive",
                    ));
                }
                parse_int(text, base as u32).map(Value::int).ok_or_else(|| {
                    FunctionError::arg(
                        0,
                        format!("cannot parse {:?} as a base {} integer", text, base),
                    )
                })
            },
        ),
    );
}

fn unary(f: fn(Number) -> Option<Number>) -> Function {
    Function::native(vec![Param::new("num", Type::Number)], move |args| {
        number(f(num_arg(args, 0)?))
    })
}

fn extreme(max: bool) -> Function {
    Function::native(Vec::new(), move |args| {
        let mut best: Option<Number> = None;
        for i in 0..args.len() {
            let n = num_arg(args, i)?;
            best = Some(match best {
                Some(b) if (max && b >= n) || (!max && b <= n) => b,
                _ => n,
            });
        }
        best.map(Value::Number)
            .ok_or_else(|| FunctionError::failed("must pass at least one number"))
    })
    .with_variadic(Param::new("numbers", Type::Number))
}

/// Parse an integer in bases up to 62. Up to base 36 letters are case
/// insensitive; above it lowercase letters come before uppercase.
fn parse_int(text: &str, base: u32) -> Option<i64> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    if digits.is_empty() {
        return None;
    }

    let mut acc: i64 = 0;
    for c in digits.chars() {
        let d = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'a'..='z' => c as u32 - 'a' as u32 + 10,
            'A'..='Z' if base <= 36 => c as u32 - 'A' as u32 + 10,
            'A'..='Z' => c as u32 - 'A' as u32 + 36,
            _ => return None,
        };
        if d >= base {
            return None;
        }
        acc = acc.checked_mul(base as i64)?;
        acc = if negative {
            acc.checked_sub(d as i64)?
        } else {
            acc.checked_add(d as i64)?
        };
    }
    Some(acc)
}
