//! Dynamic values - everything the interpreter can hold
//!
//! Design: scalars and containers are plain data, heap objects that need
//! identity (modules, types, handles, callables) are shared through `Rc`.
//! Dicts and sets keep insertion order through `indexmap`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::interop::Capsule;
use crate::object::{Callable, Instance, ModuleObject, TypeObject};

/// Insertion-ordered dict contents
pub type DictMap = IndexMap<Value, Value>;

/// Insertion-ordered set contents
pub type SetItems = IndexSet<Value>;

/// Interpreter value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    /// Wide enough for every native integer up to 64 bits, signed or not
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Dict(DictMap),
    Set(SetItems),
    Capsule(Capsule),
    /// Handle to an exposed native instance
    Object(Rc<Instance>),
    Module(Rc<ModuleObject>),
    Type(Rc<TypeObject>),
    Function(Rc<Callable>),
}

impl Value {
    /// Name of the dynamic type, as shown in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Capsule(_) => "capsule",
            Value::Object(_) => "object",
            Value::Module(_) => "module",
            Value::Type(_) => "type",
            Value::Function(_) => "function",
        }
    }

    /// Type name including the class of handle objects
    pub fn describe(&self) -> String {
        match self {
            Value::Object(instance) => instance.class().qualified_name(),
            Value::Module(module) => format!("module '{}'", module.name()),
            other => other.type_name().to_string(),
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truthiness for conditions and `bool()`
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Tuple(items) | Value::List(items) => !items.is_empty(),
            Value::Set(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
            _ => true,
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// Build a set, dropping duplicates
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(items.into_iter().collect())
    }

    /// Build a dict, later keys replacing earlier ones
    pub fn dict(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Dict(pairs.into_iter().collect())
    }

    /// Borrow the elements of a tuple or list
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Python-style `repr()`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(x) => out.push_str(&format_float(*x)),
            Value::Str(s) => {
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        c => out.push(c),
                    }
                }
                out.push('\'');
            }
            Value::Bytes(bytes) => {
                out.push_str("b'");
                for &b in bytes {
                    match b {
                        b'\'' => out.push_str("\\'"),
                        b'\\' => out.push_str("\\\\"),
                        b'\n' => out.push_str("\\n"),
                        0x20..=0x7e => out.push(b as char),
                        other => out.push_str(&format!("\\x{:02x}", other)),
                    }
                }
                out.push('\'');
            }
            Value::Tuple(items) => {
                out.push('(');
                write_items(items, out);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::List(items) => {
                out.push('[');
                write_items(items, out);
                out.push(']');
            }
            Value::Set(items) if items.is_empty() => out.push_str("set()"),
            Value::Set(items) => {
                out.push('{');
                write_items(items, out);
                out.push('}');
            }
            Value::Dict(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out);
                    out.push_str(": ");
                    value.write_repr(out);
                }
                out.push('}');
            }
            Value::Capsule(capsule) => out.push_str(&format!("{:?}", capsule)),
            Value::Object(instance) => out.push_str(&format!(
                "<{} object at {:#x}>",
                instance.class().qualified_name(),
                instance.capsule().addr()
            )),
            Value::Module(module) => out.push_str(&format!("<module '{}'>", module.name())),
            Value::Type(ty) => out.push_str(&format!("<class '{}'>", ty.qualified_name())),
            Value::Function(callable) => out.push_str(&format!("<{}>", callable.describe())),
        }
    }
}

fn write_items<'a>(items: impl IntoIterator<Item = &'a Value>, out: &mut String) {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out);
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        let sign = if x > 0.0 { "" } else { "-" };
        format!("{}inf", sign)
    } else if x == x.trunc() && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

/// Exact integer value of a float, when it has one
fn integral(x: f64) -> Option<i128> {
    // i128::MAX as f64 rounds up to 2^127, which is itself out of range
    let bound = i128::MAX as f64;
    if x.is_finite() && x.fract() == 0.0 && x >= -bound && x < bound {
        Some(x as i128)
    } else {
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                integral(*b) == Some(*a)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => a == b,
            // Both compare as unordered collections
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Capsule(a), Value::Capsule(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// Equal values hash alike: an integral float hashes as the matching int.
// NaN never equals itself, same as in scripts.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fn addr<T>(rc: &Rc<T>) -> usize {
            Rc::as_ptr(rc) as *const () as usize
        }

        match self {
            Value::None => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(n) => {
                state.write_u8(2);
                n.hash(state);
            }
            Value::Float(x) => match integral(*x) {
                Some(n) => {
                    state.write_u8(2);
                    n.hash(state);
                }
                None => {
                    state.write_u8(3);
                    x.to_bits().hash(state);
                }
            },
            Value::Str(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::Bytes(b) => {
                state.write_u8(5);
                b.hash(state);
            }
            Value::Tuple(items) | Value::List(items) => {
                state.write_u8(6);
                items.hash(state);
            }
            Value::Dict(map) => {
                state.write_u8(7);
                map.len().hash(state);
            }
            Value::Set(items) => {
                state.write_u8(8);
                items.len().hash(state);
            }
            Value::Capsule(capsule) => {
                state.write_u8(9);
                capsule.addr().hash(state);
            }
            Value::Object(rc) => addr(rc).hash(state),
            Value::Module(rc) => addr(rc).hash(state),
            Value::Type(rc) => addr(rc).hash(state),
            Value::Function(rc) => addr(rc).hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// `str()` semantics: strings print raw, everything else as `repr()`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}
