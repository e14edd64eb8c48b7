//! String functions

use regex::Regex;
use tfunk_runtime::{
    json::to_json, Attrs, Function, FunctionError, FunctionRegistry, Number, Param, Type, Value,
};

use crate::args::{int_arg, seq_arg, str_arg, string_fn, string_list};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("lower", string_fn(str::to_lowercase));
    registry.register("upper", string_fn(str::to_uppercase));
    registry.register("strrev", string_fn(|s| s.chars().rev().collect()));
    registry.register("trimspace", string_fn(|s| s.trim().to_string()));
    registry.register("chomp", string_fn(|s| s.trim_end_matches(['\n', '\r']).to_string()));
    registry.register("title", string_fn(title));

    registry.register("trim", two_strings("str", "cutset", |s, cutset| {
        Value::string(s.trim_matches(|c: char| cutset.contains(c)))
    }));
    registry.register("trimprefix", two_strings("str", "prefix", |s, prefix| {
        Value::string(s.strip_prefix(prefix).unwrap_or(s))
    }));
    registry.register("trimsuffix", two_strings("str", "suffix", |s, suffix| {
        Value::string(s.strip_suffix(suffix).unwrap_or(s))
    }));
    registry.register("startswith", two_strings("str", "prefix", |s, p| Value::Bool(s.starts_with(p))));
    registry.register("endswith", two_strings("str", "suffix", |s, p| Value::Bool(s.ends_with(p))));
    registry.register("strcontains", two_strings("str", "substr", |s, p| Value::Bool(s.contains(p))));
    registry.register("split", two_strings("separator", "str", |sep, s| {
        if sep.is_empty() {
            string_list(s.chars().map(String::from))
        } else {
            string_list(s.split(sep).map(String::from))
        }
    }));

    registry.register(
        "join",
        Function::native(vec![Param::new("separator", Type::String)], |args| {
            let sep = str_arg(args, 0)?;
            if args.len() < 2 {
                return Err(FunctionError::failed("at least one list is required"));
            }
            let mut parts = Vec::new();
            for (i, list) in args.iter().enumerate().skip(1) {
                for item in list.as_sequence().unwrap_or_default() {
                    let s = item
                        .as_str()
                        .ok_or_else(|| FunctionError::arg(i, "element is null; cannot concatenate null values"))?;
                    parts.push(s);
                }
            }
            Ok(Value::string(parts.join(sep)))
        })
        .with_variadic(Param::new("lists", Type::list(Type::String))),
    );

    registry.register(
        "indent",
        Function::native(
            vec![Param::new("spaces", Type::Number), Param::new("str", Type::String)],
            |args| {
                let spaces = int_arg(args, 0)?.max(0) as usize;
                let pad = format!("\n{}", " ".repeat(spaces));
                Ok(Value::string(str_arg(args, 1)?.replace('\n', &pad)))
            },
        ),
    );

    registry.register(
        "substr",
        Function::native(
            vec![
                Param::new("str", Type::String),
                Param::new("offset", Type::Number),
                Param::new("length", Type::Number),
            ],
            |args| {
                let chars: Vec<char> = str_arg(args, 0)?.chars().collect();
                let len = chars.len() as i64;
                let mut offset = int_arg(args, 1)?;
                let length = int_arg(args, 2)?;
                if offset < 0 {
                    offset = (len + offset).max(0);
                }
                if offset > len {
                    return Err(FunctionError::arg(1, "offset must not exceed the length of the string"));
                }
                let end = if length < 0 { len } else { offset.saturating_add(length).min(len) };
                Ok(Value::string(
                    chars[offset as usize..end as usize].iter().collect::<String>(),
                ))
            },
        ),
    );

    registry.register(
        "replace",
        Function::native(
            vec![
                Param::new("str", Type::String),
                Param::new("substr", Type::String),
                Param::new("replace", Type::String),
            ],
            |args| {
                let s = str_arg(args, 0)?;
                let substr = str_arg(args, 1)?;
                let replacement = str_arg(args, 2)?;
                // A substring wrapped in slashes is a regular expression
                if substr.len() > 1 && substr.starts_with('/') && substr.ends_with('/') {
                    let re = compile(&substr[1..substr.len() - 1], 1)?;
                    Ok(Value::string(re.replace_all(s, replacement)))
                } else {
                    Ok(Value::string(s.replace(substr, replacement)))
                }
            },
        ),
    );

    registry.register(
        "regex",
        Function::native(
            vec![Param::new("pattern", Type::String), Param::new("string", Type::String)],
            |args| {
                let re = compile(str_arg(args, 0)?, 0)?;
                let captures = re.captures(str_arg(args, 1)?).ok_or_else(|| {
                    FunctionError::failed("pattern did not match any part of the given string")
                })?;
                Ok(capture_value(&re, &captures))
            },
        ),
    );
    registry.register(
        "regexall",
        Function::native(
            vec![Param::new("pattern", Type::String), Param::new("string", Type::String)],
            |args| {
                let re = compile(str_arg(args, 0)?, 0)?;
                let matches: Vec<Value> = re
                    .captures_iter(str_arg(args, 1)?)
                    .map(|c| capture_value(&re, &c))
                    .collect();
                Ok(Value::list(capture_type(&re), matches))
            },
        ),
    );

    registry.register(
        "format",
        Function::native(vec![Param::new("format", Type::String)], |args| {
            format_values(str_arg(args, 0)?, &args[1..]).map(Value::string)
        })
        .with_variadic(Param::new("args", Type::Dynamic).nullable()),
    );
    registry.register(
        "formatlist",
        Function::native(vec![Param::new("format", Type::String)], |args| {
            let spec = str_arg(args, 0)?;
            let rest = &args[1..];

            let mut rows: Option<usize> = None;
            for (i, arg) in rest.iter().enumerate() {
                if let Some(items) = arg.as_sequence() {
                    match rows {
                        Some(n) if n != items.len() => {
                            return Err(FunctionError::arg(
                                i + 1,
                                format!("argument {} has length {}, which is inconsistent with {}", i + 1, items.len(), n),
                            ))
                        }
                        _ => rows = Some(items.len()),
                    }
                }
            }

            let mut out = Vec::new();
            for row in 0..rows.unwrap_or(1) {
                let row_args: Vec<Value> = rest
                    .iter()
                    .map(|arg| match arg.as_sequence() {
                        Some(items) => items[row].clone(),
                        None => arg.clone(),
                    })
                    .collect();
                out.push(format_values(spec, &row_args)?);
            }
            Ok(string_list(out))
        })
        .with_variadic(Param::new("args", Type::Dynamic).nullable()),
    );
}

fn two_strings(first: &str, second: &str, f: fn(&str, &str) -> Value) -> Function {
    Function::native(
        vec![Param::new(first, Type::String), Param::new(second, Type::String)],
        move |args| Ok(f(str_arg(args, 0)?, str_arg(args, 1)?)),
    )
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if !prev_letter {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_letter = c.is_alphanumeric() || c == '_' || c == '\'';
    }
    out
}

fn compile(pattern: &str, idx: usize) -> Result<Regex, FunctionError> {
    Regex::new(pattern)
        .map_err(|e| FunctionError::arg(idx, format!("invalid regular expression pattern: {}", e)))
}

/// Result shape of one match: the whole match when the pattern has no
/// groups, an object for named groups, a tuple otherwise
fn capture_value(re: &Regex, captures: &regex::Captures<'_>) -> Value {
    let text = |m: Option<regex::Match<'_>>| match m {
        Some(m) => Value::string(m.as_str()),
        None => Value::Null(Type::String),
    };

    if re.captures_len() == 1 {
        return text(captures.get(0));
    }
    if re.capture_names().flatten().next().is_some() {
        let attrs: Attrs = re
            .capture_names()
            .flatten()
            .map(|name| (name.to_string(), text(captures.name(name))))
            .collect();
        return Value::object(attrs);
    }
    Value::tuple((1..re.captures_len()).map(|i| text(captures.get(i))).collect())
}

fn capture_type(re: &Regex) -> Type {
    if re.captures_len() == 1 {
        Type::String
    } else if re.capture_names().flatten().next().is_some() {
        Type::object(re.capture_names().flatten().map(|n| (n.to_string(), Type::String)))
    } else {
        Type::Tuple(vec![Type::String; re.captures_len() - 1])
    }
}

// =============================================================================
// format
// =============================================================================

#[derive(Default)]
struct Verb {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Render `spec` with printf-style verbs against `values`
fn format_values(spec: &str, values: &[Value]) -> Result<String, FunctionError> {
    let mut out = String::new();
    let mut chars = spec.chars().peekable();
    let mut next_arg = 0;
    let mut explicit = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut verb = Verb::default();
        while let Some(&f) = chars.peek() {
            match f {
                '-' => verb.minus = true,
                '+' => verb.plus = true,
                ' ' => verb.space = true,
                '0' => verb.zero = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        verb.width = read_digits(&mut chars)?;
        if chars.peek() == Some(&'.') {
            chars.next();
            verb.precision = Some(read_digits(&mut chars)?.unwrap_or(0));
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            let n = read_digits(&mut chars)?
                .filter(|n| *n >= 1)
                .ok_or_else(|| FunctionError::failed("invalid explicit argument index"))?;
            if chars.next() != Some(']') {
                return Err(FunctionError::failed("unterminated explicit argument index"));
            }
            next_arg = n - 1;
            explicit = true;
        }

        let Some(kind) = chars.next() else {
            return Err(FunctionError::failed("format string ends with an incomplete verb"));
        };
        let value = values.get(next_arg).ok_or_else(|| {
            FunctionError::failed(format!("not enough arguments for \"%{}\" at {}", kind, next_arg + 1))
        })?;
        let rendered = render_verb(kind, &verb, value)
            .map_err(|msg| FunctionError::arg(next_arg + 1, msg))?;
        next_arg += 1;
        out.push_str(&pad(rendered, &verb, matches!(kind, 'd' | 'f' | 'e' | 'g' | 'b' | 'o' | 'x' | 'X')));
    }

    if !explicit && next_arg < values.len() {
        return Err(FunctionError::failed(format!(
            "too many arguments; only {} used by format string",
            next_arg
        )));
    }
    Ok(out)
}

/// Largest width, precision or argument index a verb may carry
const MAX_VERB_NUMBER: usize = u16::MAX as usize;

fn read_digits(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<Option<usize>, FunctionError> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        let next = n
            .unwrap_or(0)
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as usize))
            .filter(|v| *v <= MAX_VERB_NUMBER)
            .ok_or_else(|| {
                FunctionError::failed(format!(
                    "invalid format: width, precision and argument index must not exceed {}",
                    MAX_VERB_NUMBER
                ))
            })?;
        n = Some(next);
        chars.next();
    }
    Ok(n)
}

fn pad(s: String, verb: &Verb, numeric: bool) -> String {
    let Some(width) = verb.width else {
        return s;
    };
    let len = s.chars().count();
    if len >= width {
        return s;
    }
    let fill = width - len;
    if verb.minus {
        format!("{}{}", s, " ".repeat(fill))
    } else if verb.zero && numeric {
        match s.strip_prefix(['-', '+']) {
            Some(digits) => format!("{}{}{}", &s[..1], "0".repeat(fill), digits),
            None => format!("{}{}", "0".repeat(fill), s),
        }
    } else {
        format!("{}{}", " ".repeat(fill), s)
    }
}

fn render_verb(kind: char, verb: &Verb, value: &Value) -> Result<String, String> {
    if value.is_null() && kind != 'v' {
        return Err(format!("unsupported value for \"%{}\": null value cannot be formatted", kind));
    }
    match kind {
        'v' => match value {
            Value::Null(_) => Ok("null".to_string()),
            Value::String(s) => Ok(s.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Number(n) => Ok(n.to_string()),
            other => json_text(other),
        },
        's' => match tfunk_runtime::convert(value, &Type::String) {
            Ok(Value::String(s)) => Ok(s.to_string()),
            _ => Err("string required".to_string()),
        },
        'q' => match tfunk_runtime::convert(value, &Type::String) {
            Ok(v @ Value::String(_)) => json_text(&v),
            _ => Err("string required".to_string()),
        },
        't' => match tfunk_runtime::convert(value, &Type::Bool) {
            Ok(Value::Bool(b)) => Ok(b.to_string()),
            _ => Err("bool required".to_string()),
        },
        'd' => {
            let n = number_of(value)?;
            let i = n.as_i64().ok_or("a whole number is required")?;
            Ok(signed(i.to_string(), i >= 0, verb))
        }
        'b' | 'o' | 'x' | 'X' => {
            if let (Value::String(s), 'x' | 'X') = (value, kind) {
                let hex = hex::encode(s.as_bytes());
                return Ok(if kind == 'X' { hex.to_uppercase() } else { hex });
            }
            let i = number_of(value)?.as_i64().ok_or("a whole number is required")?;
            let digits = match kind {
                'b' => format!("{:b}", i.unsigned_abs()),
                'o' => format!("{:o}", i.unsigned_abs()),
                'x' => format!("{:x}", i.unsigned_abs()),
                _ => format!("{:X}", i.unsigned_abs()),
            };
            Ok(if i < 0 { format!("-{}", digits) } else { digits })
        }
        'f' => {
            let f = number_of(value)?.as_f64();
            Ok(signed(format!("{:.*}", verb.precision.unwrap_or(6), f), f >= 0.0, verb))
        }
        'e' => {
            let f = number_of(value)?.as_f64();
            Ok(signed(go_exponent(&format!("{:.*e}", verb.precision.unwrap_or(6), f)), f >= 0.0, verb))
        }
        'g' => {
            let n = number_of(value)?;
            Ok(signed(n.to_string(), n.as_f64() >= 0.0, verb))
        }
        other => Err(format!("unrecognized format verb \"%{}\"", other)),
    }
}

fn number_of(value: &Value) -> Result<Number, String> {
    match tfunk_runtime::convert(value, &Type::Number) {
        Ok(Value::Number(n)) => Ok(n),
        _ => Err("number required".to_string()),
    }
}

fn signed(s: String, non_negative: bool, verb: &Verb) -> String {
    match (non_negative, verb.plus, verb.space) {
        (true, true, _) => format!("+{}", s),
        (true, false, true) => format!(" {}", s),
        _ => s,
    }
}

/// `1.5e3` becomes `1.5e+03`
fn go_exponent(s: &str) -> String {
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s.to_string(),
    }
}

fn json_text(value: &Value) -> Result<String, String> {
    let json = to_json(value, &value.ty()).map_err(|e| e.to_string())?;
    serde_json::to_string(&json).map_err(|e| e.to_string())
}

pub(crate) fn string_items(args: &[Value], idx: usize) -> Result<Vec<String>, FunctionError> {
    seq_arg(args, idx)?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| FunctionError::arg(idx, "all elements must be strings"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(spec: &str, values: Vec<Value>) -> String {
        format_values(spec, &values).unwrap()
    }

    #[test]
    fn test_format_verbs() {
        assert_eq!(fmt("Hello, %s!", vec!["Ander".into()]), "Hello, Ander!");
        assert_eq!(fmt("%d items", vec![Value::int(3)]), "3 items");
        assert_eq!(fmt("%.2f", vec![Value::float(3.14159).unwrap()]), "3.14");
        assert_eq!(fmt("%5d|%-4s|", vec![Value::int(42), "ab".into()]), "   42|ab  |");
        assert_eq!(fmt("%03d", vec![Value::int(7)]), "007");
        assert_eq!(fmt("%q", vec!["a\"b".into()]), "\"a\\\"b\"");
        assert_eq!(fmt("%x", vec![Value::int(255)]), "ff");
        assert_eq!(fmt("%t", vec![Value::Bool(true)]), "true");
        assert_eq!(fmt("%e", vec![Value::int(1500)]), "1.500000e+03");
        assert_eq!(fmt("%v", vec![Value::tuple(vec![Value::int(1)])]), "[1]");
        assert_eq!(fmt("100%%", vec![]), "100%");
        assert_eq!(fmt("%[2]s %[1]s", vec!["a".into(), "b".into()]), "b a");
    }

    #[test]
    fn test_format_argument_errors() {
        assert!(format_values("%s %s", &[Value::from("a")]).is_err());
        assert!(format_values("%s", &[Value::from("a"), Value::from("b")]).is_err());
        assert!(format_values("%d", &[Value::from("x")]).is_err());
    }

    #[test]
    fn test_format_rejects_huge_width_and_precision() {
        let err = format_values("%.99999999999f", &[Value::int(1)]).unwrap_err();
        assert!(err.to_string().contains("invalid format"), "{}", err);
        let err = format_values("%99999999999999999999d", &[Value::int(1)]).unwrap_err();
        assert!(err.to_string().contains("invalid format"), "{}", err);
        assert_eq!(fmt("%8.3f", vec![Value::float(2.5).unwrap()]), "   2.500");
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        match &registry.get(name).unwrap().kind {
            tfunk_runtime::FunctionKind::Native(f) => f(&args),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_substr() {
        let abc = || Value::from("abc");
        assert_eq!(
            call("substr", vec![abc(), Value::int(1), Value::int(i64::MAX)]).unwrap(),
            Value::from("bc")
        );
        assert_eq!(
            call("substr", vec![abc(), Value::int(-2), Value::int(1)]).unwrap(),
            Value::from("b")
        );
        assert_eq!(
            call("substr", vec![abc(), Value::int(i64::MIN), Value::int(-1)]).unwrap(),
            Value::from("abc")
        );
        assert!(call("substr", vec![abc(), Value::int(4), Value::int(1)]).is_err());
    }

    #[test]
    fn test_title() {
        assert_eq!(title("hello world-wide"), "Hello World-Wide");
    }
}
