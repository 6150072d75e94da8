//! Functions reachable through `CALL`. The compiler asks [`builtin_arity`]
//! before lowering a call, the runner dispatches through [`call_builtin`].

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::{Value, loosely_equal};

use super::{VmError, VmErrorKind};

/// Accepted argument counts, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    pub fn accepts(self, argc: usize) -> bool {
        (self.min..=self.max).contains(&argc)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{} to {}", self.min, self.max)
        }
    }
}

type BuiltinHandler = fn(Vec<Value>) -> Result<Value, VmError>;

macro_rules! builtins {
    ($(($name:literal, $min:literal, $max:literal, $handler:path)),+ $(,)?) => {
        /// Argument counts of a builtin, or `None` when `name` is not one.
        pub fn builtin_arity(name: &str) -> Option<Arity> {
            match name {
                $($name => Some(Arity { min: $min, max: $max }),)+
                _ => None,
            }
        }

        fn handler(name: &str) -> Option<BuiltinHandler> {
            match name {
                $($name => Some($handler),)+
                _ => None,
            }
        }

        /// Every builtin name, in table order.
        pub fn builtin_names() -> &'static [&'static str] {
            &[$($name),+]
        }
    };
}

builtins! {
    ("length", 1, 1, length),
    ("upper", 1, 1, upper),
    ("lower", 1, 1, lower),
    ("trim", 1, 1, trim),
    ("split", 2, 2, split),
    ("join", 2, 2, join),
    ("contains", 2, 2, contains),
    ("replace", 3, 3, replace),
    ("substring", 3, 3, substring),
    ("starts_with", 2, 2, starts_with),
    ("ends_with", 2, 2, ends_with),
    ("index_of", 2, 2, index_of),
    ("parse_int", 1, 1, parse_int),
    ("parse_float", 1, 1, parse_float),
    ("to_string", 1, 1, to_string),
    ("abs", 1, 1, abs),
    ("min", 2, 2, min),
    ("max", 2, 2, max),
    ("keys", 1, 1, keys),
    ("values", 1, 1, values),
    ("now", 0, 0, now),
    ("time.now", 0, 0, now),
}

pub(super) fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, VmError> {
    let (Some(arity), Some(handler)) = (builtin_arity(name), handler(name)) else {
        return Err(VmError::new(
            VmErrorKind::UnknownBuiltin,
            format!("Unknown builtin `{name}`"),
        ));
    };
    if !arity.accepts(args.len()) {
        return Err(VmError::new(
            VmErrorKind::ArityMismatch,
            format!("{name} expects {arity} argument(s), got {}", args.len()),
        ));
    }
    handler(args)
}

fn type_error(name: &str, expected: &str, args: &[Value]) -> VmError {
    let got: Vec<&str> = args.iter().map(Value::type_name).collect();
    VmError::new(
        VmErrorKind::TypeMismatch,
        format!("{name} expects {expected}, got ({})", got.join(", ")),
    )
}

fn failed(message: impl Into<String>) -> VmError {
    VmError::new(VmErrorKind::BuiltinFailed, message)
}

/// Text form used by `to_string` and `join`: strings bare, everything else as JSON.
fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn length(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::Int(s.chars().count() as i64)),
        [Value::Array(items)] => Ok(Value::Int(items.len() as i64)),
        [Value::Object(fields)] => Ok(Value::Int(fields.len() as i64)),
        _ => Err(type_error("length", "string, array or object", &args)),
    }
}

fn upper(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
        _ => Err(type_error("upper", "string", &args)),
    }
}

fn lower(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::String(s.to_lowercase())),
        _ => Err(type_error("lower", "string", &args)),
    }
}

fn trim(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::String(s.trim().to_string())),
        _ => Err(type_error("trim", "string", &args)),
    }
}

fn split(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s), Value::String(delim)] => {
            let parts = if delim.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(delim.as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect()
            };
            Ok(Value::Array(parts))
        }
        _ => Err(type_error("split", "(string, string)", &args)),
    }
}

fn join(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::Array(items), Value::String(delim)] => Ok(Value::String(
            items.iter().map(text_of).collect::<Vec<_>>().join(delim.as_str()),
        )),
        _ => Err(type_error("join", "(array, string)", &args)),
    }
}

fn contains(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s), Value::String(needle)] => Ok(Value::Bool(s.contains(needle.as_str()))),
        [Value::Array(items), needle] => {
            Ok(Value::Bool(items.iter().any(|v| loosely_equal(v, needle))))
        }
        [Value::Object(fields), Value::String(key)] => Ok(Value::Bool(fields.contains_key(key))),
        _ => Err(type_error(
            "contains",
            "(string, string), (array, any) or (object, string)",
            &args,
        )),
    }
}

fn replace(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s), Value::String(from), Value::String(to)] => {
            Ok(Value::String(s.replace(from.as_str(), to)))
        }
        _ => Err(type_error("replace", "(string, string, string)", &args)),
    }
}

/// Character-indexed, end exclusive.
fn substring(args: Vec<Value>) -> Result<Value, VmError> {
    let [Value::String(s), Value::Int(start), Value::Int(end)] = args.as_slice() else {
        return Err(type_error("substring", "(string, int, int)", &args));
    };
    if *start < 0 || *end < 0 {
        return Err(failed("substring indices must be non-negative"));
    }
    if start > end {
        return Err(failed(format!(
            "substring start {start} is greater than end {end}"
        )));
    }
    let len = s.chars().count() as i64;
    if *end > len {
        return Err(failed(format!(
            "substring end {end} is out of bounds for length {len}"
        )));
    }
    Ok(Value::String(
        s.chars()
            .skip(*start as usize)
            .take((*end - *start) as usize)
            .collect(),
    ))
}

fn starts_with(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s), Value::String(prefix)] => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        _ => Err(type_error("starts_with", "(string, string)", &args)),
    }
}

fn ends_with(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s), Value::String(suffix)] => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
        _ => Err(type_error("ends_with", "(string, string)", &args)),
    }
}

/// Character position for strings, element position for arrays, `-1` when absent.
fn index_of(args: Vec<Value>) -> Result<Value, VmError> {
    let found = match args.as_slice() {
        [Value::String(s), Value::String(needle)] => s
            .find(needle.as_str())
            .map(|byte| s[..byte].chars().count()),
        [Value::Array(items), needle] => items.iter().position(|v| loosely_equal(v, needle)),
        _ => return Err(type_error("index_of", "(string, string) or (array, any)", &args)),
    };
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

fn parse_int(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s)] => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| failed(format!("parse_int cannot parse {s:?}"))),
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [Value::Float(f)] if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        _ => Err(type_error("parse_int", "string or number", &args)),
    }
}

fn parse_float(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::String(s)] => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| failed(format!("parse_float cannot parse {s:?}"))),
        [Value::Int(n)] => Ok(Value::Float(*n as f64)),
        [Value::Float(f)] => Ok(Value::Float(*f)),
        _ => Err(type_error("parse_float", "string or number", &args)),
    }
}

fn to_string(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [v] => Ok(Value::String(text_of(v))),
        _ => Err(type_error("to_string", "one value", &args)),
    }
}

fn abs(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::Int(n)] => Ok(n
            .checked_abs()
            .map(Value::Int)
            .unwrap_or(Value::Float((*n as f64).abs()))),
        [Value::Float(f)] => Ok(Value::Float(f.abs())),
        _ => Err(type_error("abs", "number", &args)),
    }
}

fn pick(name: &str, args: &[Value], want_max: bool) -> Result<Value, VmError> {
    let choose = |a: f64, b: f64| if (b > a) == want_max { b } else { a };
    match args {
        [Value::Int(a), Value::Int(b)] => Ok(Value::Int(if want_max {
            *a.max(b)
        } else {
            *a.min(b)
        })),
        [Value::Int(a), Value::Float(b)] => Ok(Value::Float(choose(*a as f64, *b))),
        [Value::Float(a), Value::Int(b)] => Ok(Value::Float(choose(*a, *b as f64))),
        [Value::Float(a), Value::Float(b)] => Ok(Value::Float(choose(*a, *b))),
        _ => Err(type_error(name, "two numbers", args)),
    }
}

fn min(args: Vec<Value>) -> Result<Value, VmError> {
    pick("min", &args, false)
}

fn max(args: Vec<Value>) -> Result<Value, VmError> {
    pick("max", &args, true)
}

fn keys(args: Vec<Value>) -> Result<Value, VmError> {
    match args.as_slice() {
        [Value::Object(fields)] => Ok(Value::Array(
            fields.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        _ => Err(type_error("keys", "object", &args)),
    }
}

fn values(args: Vec<Value>) -> Result<Value, VmError> {
    match args.into_iter().next() {
        Some(Value::Object(fields)) => Ok(Value::Array(fields.into_values().collect())),
        Some(other) => Err(type_error("values", "object", &[other])),
        None => Err(type_error("values", "object", &[])),
    }
}

/// Unix time in seconds.
fn now(_args: Vec<Value>) -> Result<Value, VmError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| Value::Int(d.as_secs() as i64))
        .map_err(|e| failed(format!("system clock before unix epoch: {e}")))
}
