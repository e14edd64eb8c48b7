//! Encoding functions

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tfunk_runtime::json::{infer_from_json, to_json};
use tfunk_runtime::{Attrs, Function, FunctionError, FunctionRegistry, Param, Type, Value};

use crate::args::str_arg;

/// Characters left alone by `urlencode`
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(
        "base64encode",
        Function::native(vec![Param::new("str", Type::String)], |args| {
            Ok(Value::string(STANDARD.encode(str_arg(args, 0)?)))
        }),
    );
    registry.register(
        "base64decode",
        Function::native(vec![Param::new("str", Type::String)], |args| {
            let bytes = STANDARD
                .decode(str_arg(args, 0)?)
                .map_err(|e| FunctionError::arg(0, format!("failed to decode base64 data: {}", e)))?;
            String::from_utf8(bytes).map(Value::from).map_err(|_| {
                FunctionError::arg(0, "the result of decoding the provided string is not valid UTF-8")
            })
        }),
    );

    registry.register(
        "jsonencode",
        Function::native(vec![Param::new("val", Type::Dynamic).nullable()], |args| {
            let json = to_json(&args[0], &args[0].ty())
                .map_err(|e| FunctionError::arg(0, e.to_string()))?;
            serde_json::to_string(&json)
                .map(Value::from)
                .map_err(|e| FunctionError::failed(e.to_string()))
        }),
    );
    registry.register(
        "jsondecode",
        Function::native(vec![Param::new("str", Type::String)], |args| {
            let json: serde_json::Value = serde_json::from_str(str_arg(args, 0)?)
                .map_err(|e| FunctionError::arg(0, e.to_string()))?;
            infer_from_json(&json).map_err(|e| FunctionError::arg(0, e.to_string()))
        }),
    );

    registry.register(
        "yamlencode",
        Function::native(vec![Param::new("value", Type::Dynamic).nullable()], |args| {
            let json = to_json(&args[0], &args[0].ty())
                .map_err(|e| FunctionError::arg(0, e.to_string()))?;
            serde_yaml::to_string(&json)
                .map(Value::from)
                .map_err(|e| FunctionError::failed(e.to_string()))
        }),
    );
    registry.register(
        "yamldecode",
        Function::native(vec![Param::new("src", Type::String)], |args| {
            let yaml: serde_yaml::Value = serde_yaml::from_str(str_arg(args, 0)?)
                .map_err(|e| FunctionError::arg(0, e.to_string()))?;
            if has_non_finite(&yaml) {
                return Err(FunctionError::arg(0, "cannot represent .nan or .inf as a number"));
            }
            let json: serde_json::Value = serde_yaml::from_value(yaml)
                .map_err(|e| FunctionError::arg(0, e.to_string()))?;
            infer_from_json(&json).map_err(|e| FunctionError::arg(0, e.to_string()))
        }),
    );

    registry.register(
        "urlencode",
        Function::native(vec![Param::new("str", Type::String)], |args| {
            let encoded = utf8_percent_encode(str_arg(args, 0)?, QUERY).to_string();
            Ok(Value::string(encoded.replace("%20", "+")))
        }),
    );

    registry.register(
        "csvdecode",
        Function::native(vec![Param::new("str", Type::String)], |args| {
            let rows = parse_csv(str_arg(args, 0)?).map_err(|e| FunctionError::arg(0, e))?;
            let mut rows = rows.into_iter();
            let header = rows
                .next()
                .ok_or_else(|| FunctionError::arg(0, "missing header line"))?;

            let row_type = Type::object(header.iter().map(|h| (h.clone(), Type::String)));
            let mut records = Vec::new();
            for (line, row) in rows.enumerate() {
                if row.len() != header.len() {
                    return Err(FunctionError::arg(
                        0,
                        format!("record on line {} has {} fields, expected {}", line + 2, row.len(), header.len()),
                    ));
                }
                let attrs: Attrs = header
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(Value::from))
                    .collect();
                records.push(Value::object(attrs));
            }
            Ok(Value::list(row_type, records))
        }),
    );
}

/// Parse RFC 4180 CSV: comma separated, double-quoted fields may contain
/// commas, newlines and doubled quotes
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

/// Whether a YAML document holds a float with no JSON number equivalent
fn has_non_finite(yaml: &serde_yaml::Value) -> bool {
    match yaml {
        serde_yaml::Value::Number(n) => n.as_f64().is_some_and(|f| !f.is_finite()),
        serde_yaml::Value::Sequence(items) => items.iter().any(has_non_finite),
        serde_yaml::Value::Mapping(entries) => {
            entries.iter().any(|(k, v)| has_non_finite(k) || has_non_finite(v))
        }
        serde_yaml::Value::Tagged(tagged) => has_non_finite(&tagged.value),
        _ => false,
    }
}
