//! Collection functions

use tfunk_runtime::{
    convert, unify, Attrs, Function, FunctionError, FunctionRegistry, Number, Param, Type, Value,
};

use crate::args::{attrs_arg, int_arg, num_arg, seq_arg, sequence, str_arg, string_list};
use crate::string::string_items;

/// Upper bound on the number of elements `range` may produce
const MAX_RANGE: usize = 1024;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register("alltrue", bools(|items| items.iter().all(|b| *b)));
    registry.register("anytrue", bools(|items| items.iter().any(|b| *b)));

    registry.register(
        "length",
        Function::native(vec![Param::new("value", Type::Dynamic)], |args| {
            args[0]
                .length()
                .map(|n| Value::int(n as i64))
                .ok_or_else(|| {
                    FunctionError::arg(0, "argument must be a string, a collection type, or a structural type")
                })
        }),
    );

    registry.register(
        "chunklist",
        Function::native(
            vec![
                Param::new("list", Type::list(Type::Dynamic)),
                Param::new("size", Type::Number),
            ],
            |args| {
                let (elem, items) = list_parts(&args[0]);
                let size = int_arg(args, 1)?;
                if size < 0 {
                    return Err(FunctionError::arg(1, "the size argument must be positive"));
                }
                // A size of zero puts everything in one chunk
                let chunk_size = if size == 0 { items.len().max(1) } else { size as usize };
                let chunks: Vec<Value> = items
                    .chunks(chunk_size)
                    .map(|c| Value::list(elem.clone(), c.to_vec()))
                    .collect();
                Ok(Value::list(Type::list(elem), chunks))
            },
        ),
    );

    registry.register(
        "coalesce",
        Function::native(Vec::new(), |args| {
            let types: Vec<Type> = args.iter().filter(|v| !v.is_null()).map(Value::ty).collect();
            let ty = unify(&types)
                .ok_or_else(|| FunctionError::failed("all arguments must have the same type"))?;
            for arg in args {
                if arg.is_null() || arg.as_str() == Some("") {
                    continue;
                }
                return convert(arg, &ty).map_err(|e| FunctionError::failed(e.to_string()));
            }
            Err(FunctionError::failed("no non-null, non-empty-string arguments"))
        })
        .with_variadic(Param::new("vals", Type::Dynamic).nullable()),
    );
    registry.register(
        "coalescelist",
        Function::native(Vec::new(), |args| {
            for (i, arg) in args.iter().enumerate() {
                let items = seq_arg(args, i)?;
                if !items.is_empty() {
                    return Ok(arg.clone());
                }
            }
            Err(FunctionError::failed("no non-null arguments"))
        })
        .with_variadic(Param::new("vals", Type::Dynamic)),
    );
    registry.register(
        "compact",
        Function::native(vec![Param::new("list", Type::list(Type::String))], |args| {
            let kept = seq_arg(args, 0)?
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            Ok(string_list(kept))
        }),
    );
    registry.register(
        "concat",
        Function::native(Vec::new(), |args| {
            let mut items = Vec::new();
            for i in 0..args.len() {
                items.extend_from_slice(seq_arg(args, i)?);
            }
            if args.iter().any(|a| matches!(a, Value::Tuple(_))) {
                Ok(Value::tuple(items))
            } else {
                Ok(sequence(items))
            }
        })
        .with_variadic(Param::new("seqs", Type::Dynamic)),
    );
    registry.register(
        "contains",
        Function::native(
            vec![Param::new("list", Type::Dynamic), Param::new("value", Type::Dynamic).nullable()],
            |args| Ok(Value::Bool(seq_arg(args, 0)?.contains(&args[1]))),
        ),
    );
    registry.register(
        "distinct",
        Function::native(vec![Param::new("list", Type::list(Type::Dynamic))], |args| {
            let (elem, items) = list_parts(&args[0]);
            let mut seen: Vec<Value> = Vec::new();
            for item in items {
                if !seen.contains(item) {
                    seen.push(item.clone());
                }
            }
            Ok(Value::list(elem, seen))
        }),
    );
    registry.register(
        "element",
        Function::native(
            vec![Param::new("list", Type::Dynamic), Param::new("index", Type::Number)],
            |args| {
                let items = seq_arg(args, 0)?;
                let index = int_arg(args, 1)?;
                if items.is_empty() {
                    return Err(FunctionError::failed("cannot use element function with an empty list"));
                }
                if index < 0 {
                    return Err(FunctionError::arg(1, "cannot use element function with a negative index"));
                }
                Ok(items[index as usize % items.len()].clone())
            },
        ),
    );
    registry.register(
        "flatten",
        Function::native(vec![Param::new("list", Type::Dynamic)], |args| {
            let mut out = Vec::new();
            flatten_into(seq_arg(args, 0)?, &mut out);
            Ok(sequence(out))
        }),
    );
    registry.register(
        "index",
        Function::native(
            vec![Param::new("list", Type::Dynamic), Param::new("value", Type::Dynamic)],
            |args| {
                seq_arg(args, 0)?
                    .iter()
                    .position(|v| *v == args[1])
                    .map(|i| Value::int(i as i64))
                    .ok_or_else(|| FunctionError::failed("item not found"))
            },
        ),
    );
    registry.register(
        "keys",
        Function::native(vec![Param::new("inputMap", Type::Dynamic)], |args| {
            let keys = attrs_arg(args, 0)?.keys().cloned();
            Ok(match &args[0] {
                Value::Object(_) => Value::tuple(keys.map(Value::from).collect()),
                _ => string_list(keys),
            })
        }),
    );
    registry.register(
        "values",
        Function::native(vec![Param::new("mapping", Type::Dynamic)], |args| {
            let values: Vec<Value> = attrs_arg(args, 0)?.values().cloned().collect();
            Ok(match &args[0] {
                Value::Map { elem, .. } => Value::list(elem.clone(), values),
                _ => Value::tuple(values),
            })
        }),
    );
    registry.register(
        "lookup",
        Function::native(
            vec![Param::new("inputMap", Type::Dynamic), Param::new("key", Type::String)],
            |args| {
                let attrs = attrs_arg(args, 0)?;
                let key = str_arg(args, 1)?;
                if args.len() > 3 {
                    return Err(FunctionError::failed("lookup() takes at most three arguments"));
                }
                attrs
                    .get(key)
                    .cloned()
                    .or_else(|| args.get(2).cloned())
                    .ok_or_else(|| FunctionError::failed(format!("lookup failed to find key {:?}", key)))
            },
        )
        .with_variadic(Param::new("default", Type::Dynamic).nullable()),
    );
    registry.register(
        "merge",
        Function::native(Vec::new(), |args| {
            let mut merged = Attrs::new();
            let mut all_maps = true;
            for (i, arg) in args.iter().enumerate() {
                if arg.is_null() {
                    continue;
                }
                all_maps &= matches!(arg, Value::Map { .. });
                for (k, v) in attrs_arg(args, i)? {
                    merged.insert(k.clone(), v.clone());
                }
            }
            let object = Value::object(merged);
            if all_maps {
                Ok(convert(&object, &Type::map(Type::Dynamic)).unwrap_or(object))
            } else {
                Ok(object)
            }
        })
        .with_variadic(Param::new("maps", Type::Dynamic).nullable()),
    );
    registry.register(
        "one",
        Function::native(vec![Param::new("list", Type::Dynamic)], |args| {
            let items = seq_arg(args, 0)?;
            match items {
                [] => Ok(Value::null()),
                [only] => Ok(only.clone()),
                _ => Err(FunctionError::arg(0, "must be a list, set, or tuple value with either zero or one elements")),
            }
        }),
    );
    registry.register(
        "range",
        Function::native(Vec::new(), |args| {
            let (start, end, step) = match args.len() {
                1 => (Number::Int(0), num_arg(args, 0)?, None),
                2 => (num_arg(args, 0)?, num_arg(args, 1)?, None),
                3 => (num_arg(args, 0)?, num_arg(args, 1)?, Some(num_arg(args, 2)?)),
                _ => return Err(FunctionError::failed("must have one, two, or three arguments")),
            };
            let step = step.unwrap_or(if start <= end { Number::Int(1) } else { Number::Int(-1) });
            if step.as_f64() == 0.0 {
                return Err(FunctionError::failed("step must not be zero"));
            }
            if (step.as_f64() > 0.0 && start > end) || (step.as_f64() < 0.0 && start < end) {
                return Err(FunctionError::failed("step must move from start towards end"));
            }

            let mut out = Vec::new();
            let mut current = start;
            while (step.as_f64() > 0.0 && current < end) || (step.as_f64() < 0.0 && current > end) {
                if out.len() >= MAX_RANGE {
                    return Err(FunctionError::failed(format!("more than {} values were generated", MAX_RANGE)));
                }
                out.push(Value::Number(current));
                // Overflowing a number also means stepping past `end`
                match current.add(step) {
                    Ok(next) => current = next,
                    Err(_) => break,
                }
            }
            Ok(Value::list(Type::Number, out))
        })
        .with_variadic(Param::new("params", Type::Number)),
    );
    registry.register(
        "reverse",
        Function::native(vec![Param::new("list", Type::Dynamic)], |args| {
            let mut items = seq_arg(args, 0)?.to_vec();
            items.reverse();
            Ok(match &args[0] {
                Value::List { elem, .. } | Value::Set { elem, .. } => Value::list(elem.clone(), items),
                _ => Value::tuple(items),
            })
        }),
    );

    registry.register("setunion", set_op(|a, b| {
        let mut out = a.to_vec();
        out.extend_from_slice(b);
        out
    }));
    registry.register("setintersection", set_op(|a, b| a.iter().filter(|v| b.contains(v)).cloned().collect()));
    registry.register(
        "setsubtract",
        Function::native(
            vec![
                Param::new("a", Type::set(Type::Dynamic)),
                Param::new("b", Type::set(Type::Dynamic)),
            ],
            |args| {
                let (elem, a) = list_parts(&args[0]);
                let b = seq_arg(args, 1)?;
                Ok(Value::set(elem, a.iter().filter(|v| !b.contains(v)).cloned().collect()))
            },
        ),
    );

    registry.register(
        "slice",
        Function::native(
            vec![
                Param::new("list", Type::Dynamic),
                Param::new("start_index", Type::Number),
                Param::new("end_index", Type::Number),
            ],
            |args| {
                let items = seq_arg(args, 0)?;
                let start = int_arg(args, 1)?;
                let end = int_arg(args, 2)?;
                if start < 0 {
                    return Err(FunctionError::arg(1, "must not be less than zero"));
                }
                if end < 0 || end as usize > items.len() {
                    return Err(FunctionError::arg(2, "must not be greater than the length of the list"));
                }
                if start > end {
                    return Err(FunctionError::arg(1, "must not be greater than end index"));
                }
                let part = items[start as usize..end as usize].to_vec();
                Ok(match &args[0] {
                    Value::Tuple(_) => Value::tuple(part),
                    Value::List { elem, .. } | Value::Set { elem, .. } => Value::list(elem.clone(), part),
                    _ => sequence(part),
                })
            },
        ),
    );
    registry.register(
        "sort",
        Function::native(vec![Param::new("list", Type::list(Type::String))], |args| {
            let mut items = string_items(args, 0)?;
            items.sort();
            Ok(string_list(items))
        }),
    );
    registry.register(
        "sum",
        Function::native(vec![Param::new("list", Type::Dynamic)], |args| {
            let items = seq_arg(args, 0)?;
            if items.is_empty() {
                return Err(FunctionError::failed("cannot sum an empty list"));
            }
            let mut total = Number::Int(0);
            for item in items {
                let n = match convert(item, &Type::Number) {
                    Ok(Value::Number(n)) => n,
                    _ => return Err(FunctionError::arg(0, "argument must be list, set, or tuple of number values")),
                };
                total = total
                    .add(n)
                    .map_err(|e| FunctionError::failed(e.to_string()))?;
            }
            Ok(Value::Number(total))
        }),
    );
    registry.register(
        "zipmap",
        Function::native(
            vec![
                Param::new("keys", Type::list(Type::String)),
                Param::new("values", Type::Dynamic),
            ],
            |args| {
                let keys = string_items(args, 0)?;
                let values = seq_arg(args, 1)?;
                if keys.len() != values.len() {
                    return Err(FunctionError::failed(format!(
                        "number of keys ({}) does not match number of values ({})",
                        keys.len(),
                        values.len()
                    )));
                }
                let attrs: Attrs = keys.into_iter().zip(values.iter().cloned()).collect();
                Ok(match &args[1] {
                    Value::List { elem, .. } => Value::map(elem.clone(), attrs),
                    _ => Value::object(attrs),
                })
            },
        ),
    );
}

fn bools(f: fn(&[bool]) -> bool) -> Function {
    Function::native(vec![Param::new("list", Type::list(Type::Bool))], move |args| {
        let items: Vec<bool> = seq_arg(args, 0)?
            .iter()
            .map(|v| v.as_bool().unwrap_or(false))
            .collect();
        Ok(Value::Bool(f(&items)))
    })
}

/// Element type and items of a converted list or set argument
fn list_parts(value: &Value) -> (Type, &[Value]) {
    match value {
        Value::List { elem, items } | Value::Set { elem, items } => (elem.clone(), items.as_slice()),
        _ => (Type::Dynamic, &[]),
    }
}

fn set_op(f: fn(&[Value], &[Value]) -> Vec<Value>) -> Function {
    Function::native(vec![Param::new("first_set", Type::set(Type::Dynamic))], move |args| {
        let (mut elem, first) = list_parts(&args[0]);
        let mut acc = first.to_vec();
        for (i, other) in args.iter().enumerate().skip(1) {
            let (other_elem, items) = list_parts(other);
            elem = unify(&[elem, other_elem])
                .ok_or_else(|| FunctionError::arg(i, "given sets must all have compatible element types"))?;
            acc = f(&acc, items);
        }
        let converted = acc
            .iter()
            .map(|v| convert(v, &elem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FunctionError::failed(e.to_string()))?;
        Ok(Value::set(elem, converted))
    })
    .with_variadic(Param::new("other_sets", Type::set(Type::Dynamic)))
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item.as_sequence() {
            Some(nested) => flatten_into(nested, out),
            None => out.push(item.clone()),
        }
    }
}
