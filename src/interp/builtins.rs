//! Builtin functions and methods of builtin types

use std::io::Write;

use crate::error::{ErrorKind, ScriptError};
use crate::Value;

/// Builtin function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Repr,
    Int,
    Float,
    Bool,
    List,
    Tuple,
    Range,
    Abs,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("print", Builtin::Print),
    ("len", Builtin::Len),
    ("str", Builtin::Str),
    ("repr", Builtin::Repr),
    ("int", Builtin::Int),
    ("float", Builtin::Float),
    ("bool", Builtin::Bool),
    ("list", Builtin::List),
    ("tuple", Builtin::Tuple),
    ("range", Builtin::Range),
    ("abs", Builtin::Abs),
];

/// Upper bound on the length of a materialized `range`
const MAX_RANGE: i128 = 10_000_000;

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        BUILTINS.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }

    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|(_, b)| *b == self)
            .map(|(n, _)| *n)
            .unwrap_or("builtin")
    }
}

fn type_error(message: impl Into<String>) -> ScriptError {
    ScriptError::new(ErrorKind::Type, message)
}

fn value_error(message: impl Into<String>) -> ScriptError {
    ScriptError::new(ErrorKind::Value, message)
}

/// Truncate toward zero; non-finite or out-of-range floats are errors
fn float_to_int(x: f64) -> Result<i128, ScriptError> {
    if x.is_nan() {
        return Err(value_error("cannot convert float NaN to integer"));
    }
    let truncated = x.trunc();
    if truncated.abs() >= i128::MAX as f64 {
        return Err(ScriptError::new(
            ErrorKind::Overflow,
            "cannot convert float to integer: value out of range",
        ));
    }
    Ok(truncated as i128)
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(type_error(format!(
            "{}() takes {} argument(s) ({} given)",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

/// Elements produced by iterating `value`
pub(crate) fn iterate(value: &Value) -> Result<Vec<Value>, ScriptError> {
    match value {
        Value::Tuple(items) | Value::List(items) => Ok(items.clone()),
        Value::Set(items) => Ok(items.iter().cloned().collect()),
        Value::Dict(map) => Ok(map.keys().cloned().collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Bytes(bytes) => Ok(bytes.iter().map(|&b| Value::Int(i128::from(b))).collect()),
        other => Err(type_error(format!("'{}' object is not iterable", other.type_name()))),
    }
}

pub(crate) fn call_builtin(
    builtin: Builtin,
    args: Vec<Value>,
    output: &mut dyn Write,
) -> Result<Value, ScriptError> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(output, "{}", line)
                .map_err(|e| ScriptError::new(ErrorKind::Runtime, format!("print failed: {}", e)))?;
            Ok(Value::None)
        }
        Builtin::Len => {
            expect_args(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::Bytes(b) => b.len(),
                Value::Tuple(items) | Value::List(items) => items.len(),
                Value::Set(items) => items.len(),
                Value::Dict(map) => map.len(),
                other => {
                    return Err(type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i128))
        }
        Builtin::Str => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(|v| v.to_string()).unwrap_or_default()))
        }
        Builtin::Repr => {
            expect_args(name, &args, 1, 1)?;
            Ok(Value::Str(args[0].repr()))
        }
        Builtin::Int => {
            expect_args(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(n)) => Ok(Value::Int(*n)),
                Some(Value::Bool(b)) => Ok(Value::Int(i128::from(*b))),
                Some(Value::Float(x)) => float_to_int(*x).map(Value::Int),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<i128>()
                    .map(Value::Int)
                    .map_err(|_| value_error(format!("invalid literal for int(): '{}'", s))),
                Some(other) => Err(type_error(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Float => {
            expect_args(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Float(x)) => Ok(Value::Float(*x)),
                Some(Value::Int(n)) => Ok(Value::Float(*n as f64)),
                Some(Value::Bool(b)) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| value_error(format!("could not convert string to float: '{}'", s))),
                Some(other) => Err(type_error(format!(
                    "float() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Bool => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().map_or(false, Value::truthy)))
        }
        Builtin::List => {
            expect_args(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::List(Vec::new())),
                Some(v) => Ok(Value::List(iterate(v)?)),
            }
        }
        Builtin::Tuple => {
            expect_args(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Tuple(Vec::new())),
                Some(v) => Ok(Value::Tuple(iterate(v)?)),
            }
        }
        Builtin::Range => {
            expect_args(name, &args, 1, 3)?;
            let mut bounds = Vec::with_capacity(args.len());
            for arg in &args {
                bounds.push(arg.as_int().ok_or_else(|| {
                    type_error(format!("'{}' object cannot be interpreted as an integer", arg.type_name()))
                })?);
            }
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked above"),
            };
            if step == 0 {
                return Err(value_error("range() arg 3 must not be zero"));
            }
            let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
            if span / step.saturating_abs() > MAX_RANGE {
                return Err(value_error("range() is too large"));
            }
            let mut items = Vec::new();
            let mut current = start;
            while (step > 0 && current < stop) || (step < 0 && current > stop) {
                items.push(Value::Int(current));
                match current.checked_add(step) {
                    Some(next) => current = next,
                    None => break,
                }
            }
            Ok(Value::List(items))
        }
        Builtin::Abs => {
            expect_args(name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(n) => n
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::new(ErrorKind::Overflow, "integer overflow in abs()")),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
    }
}

const STR_METHODS: &[&str] = &[
    "split", "join", "upper", "lower", "strip", "replace", "startswith", "endswith", "encode",
];
const BYTES_METHODS: &[&str] = &["decode"];
const DICT_METHODS: &[&str] = &["keys", "values", "items", "get"];
const LIST_METHODS: &[&str] = &["count", "index"];

/// Static name of a builtin method of `value`, if it has one
pub(crate) fn lookup_method(value: &Value, name: &str) -> Option<&'static str> {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::Bytes(_) => BYTES_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::List(_) | Value::Tuple(_) => LIST_METHODS,
        _ => return None,
    };
    table.iter().copied().find(|m| *m == name)
}

fn str_arg<'a>(method: &str, args: &'a [Value], index: usize) -> Result<&'a str, ScriptError> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        type_error(format!("{}() argument {} must be str", method, index + 1))
    })
}

pub(crate) fn call_method(
    receiver: &Value,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match (receiver, method) {
        (Value::Str(s), "split") => {
            expect_args(method, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::str).collect(),
                Some(_) => {
                    let sep = str_arg(method, &args, 0)?;
                    if sep.is_empty() {
                        return Err(value_error("empty separator"));
                    }
                    s.split(sep).map(Value::str).collect()
                }
            };
            Ok(Value::List(parts))
        }
        (Value::Str(s), "join") => {
            expect_args(method, &args, 1, 1)?;
            let mut parts = Vec::new();
            for item in iterate(&args[0])? {
                match item {
                    Value::Str(part) => parts.push(part),
                    other => {
                        return Err(type_error(format!(
                            "sequence item: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::Str(parts.join(s.as_str())))
        }
        (Value::Str(s), "upper") => Ok(Value::Str(s.to_uppercase())),
        (Value::Str(s), "lower") => Ok(Value::Str(s.to_lowercase())),
        (Value::Str(s), "strip") => Ok(Value::Str(s.trim().to_string())),
        (Value::Str(s), "replace") => {
            expect_args(method, &args, 2, 2)?;
            Ok(Value::Str(s.replace(str_arg(method, &args, 0)?, str_arg(method, &args, 1)?)))
        }
        (Value::Str(s), "startswith") => {
            expect_args(method, &args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(str_arg(method, &args, 0)?)))
        }
        (Value::Str(s), "endswith") => {
            expect_args(method, &args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(str_arg(method, &args, 0)?)))
        }
        (Value::Str(s), "encode") => Ok(Value::Bytes(s.as_bytes().to_vec())),
        (Value::Bytes(b), "decode") => String::from_utf8(b.clone())
            .map(Value::Str)
            .map_err(|_| value_error("bytes are not valid UTF-8")),
        (Value::Dict(map), "keys") => Ok(Value::List(map.keys().cloned().collect())),
        (Value::Dict(map), "values") => Ok(Value::List(map.values().cloned().collect())),
        (Value::Dict(map), "items") => Ok(Value::List(
            map.iter()
                .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        (Value::Dict(map), "get") => {
            expect_args(method, &args, 1, 2)?;
            Ok(map
                .get(&args[0])
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        (Value::List(items) | Value::Tuple(items), "count") => {
            expect_args(method, &args, 1, 1)?;
            Ok(Value::Int(items.iter().filter(|v| **v == args[0]).count() as i128))
        }
        (Value::List(items) | Value::Tuple(items), "index") => {
            expect_args(method, &args, 1, 1)?;
            items
                .iter()
                .position(|v| *v == args[0])
                .map(|i| Value::Int(i as i128))
                .ok_or_else(|| value_error(format!("{} is not in list", args[0].repr())))
        }
        _ => Err(ScriptError::new(
            ErrorKind::Attribute,
            format!("'{}' object has no attribute '{}'", receiver.type_name(), method),
        )),
    }
}
