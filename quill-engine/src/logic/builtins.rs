//! The built-in function allow-list
//!
//! Expressions may only call the functions listed here. There is no other way
//! to reach host code from a template. Each entry point returns `None` when
//! the name is not on the list, so the evaluator can report
//! `UnknownFunction`, and `Some(Err(reason))` when the call itself fails.

use crate::logic::operators::power;
use quill_core::{number_to_string, to_int32, Value};

pub type BuiltinResult = Option<Result<Value, String>>;

const GLOBAL_FUNCTIONS: &[&str] = &[
    "String",
    "Number",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
];

const NAMESPACES: &[&str] = &["Math", "JSON", "Object", "Array"];

const STRING_METHODS: &[&str] = &[
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "includes",
    "startsWith",
    "endsWith",
    "indexOf",
    "slice",
    "split",
    "replace",
    "replaceAll",
    "repeat",
    "padStart",
    "padEnd",
    "charAt",
    "at",
    "concat",
    "toString",
];

const ARRAY_METHODS: &[&str] = &[
    "includes", "indexOf", "join", "slice", "concat", "at", "reverse", "flat", "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

/// Results larger than this many UTF-16 units are refused.
const MAX_STRING_UNITS: usize = 1 << 24;

static UNDEFINED: Value = Value::Undefined;

pub fn is_global_function(name: &str) -> bool {
    GLOBAL_FUNCTIONS.contains(&name)
}

pub fn is_namespace(name: &str) -> bool {
    NAMESPACES.contains(&name)
}

/// Identifiers that resolve without being bound.
pub fn global_constant(name: &str) -> Option<Value> {
    match name {
        "NaN" => Some(Value::Number(f64::NAN)),
        "Infinity" => Some(Value::Number(f64::INFINITY)),
        _ => None,
    }
}

/// Non-function members of a namespace, such as `Math.PI`.
pub fn namespace_constant(namespace: &str, name: &str) -> Option<Value> {
    match (namespace, name) {
        ("Math", "PI") => Some(Value::Number(std::f64::consts::PI)),
        ("Math", "E") => Some(Value::Number(std::f64::consts::E)),
        _ => None,
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&UNDEFINED)
}

fn number(args: &[Value], index: usize) -> f64 {
    arg(args, index).to_number()
}

// ============================================================================
// GLOBAL FUNCTIONS
// ============================================================================

pub fn call_function(name: &str, args: &[Value]) -> BuiltinResult {
    let value = match name {
        "String" => match args.first() {
            Some(value) => Value::String(value.to_js_string()),
            None => Value::string(""),
        },
        "Number" => match args.first() {
            Some(value) => Value::Number(value.to_number()),
            None => Value::Number(0.0),
        },
        "Boolean" => Value::Bool(arg(args, 0).is_truthy()),
        "parseInt" => Value::Number(parse_int(&arg(args, 0).to_js_string(), arg(args, 1))),
        "parseFloat" => Value::Number(parse_float(&arg(args, 0).to_js_string())),
        "isNaN" => Value::Bool(number(args, 0).is_nan()),
        "isFinite" => Value::Bool(number(args, 0).is_finite()),
        _ => return None,
    };
    Some(Ok(value))
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

fn parse_int(input: &str, radix: &Value) -> f64 {
    let mut text = input.trim_start_matches(is_js_whitespace);
    let mut sign = 1.0;
    if let Some(rest) = text.strip_prefix('-') {
        sign = -1.0;
        text = rest;
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest;
    }

    let mut radix = to_int32(radix.to_number());
    let mut strip_prefix = true;
    if radix != 0 {
        if !(2..=36).contains(&radix) {
            return f64::NAN;
        }
        strip_prefix = radix == 16;
    } else {
        radix = 10;
    }
    if strip_prefix {
        if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            text = rest;
            radix = 16;
        }
    }

    let mut value = 0.0f64;
    let mut any = false;
    for c in text.chars() {
        match c.to_digit(radix as u32) {
            Some(d) => {
                value = value * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    if any {
        sign * value
    } else {
        f64::NAN
    }
}

fn parse_float(input: &str) -> f64 {
    let text = input.trim_start_matches(is_js_whitespace);
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    if unsigned.starts_with("Infinity") {
        return if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let bytes = text.as_bytes();
    let mut end = text.len() - unsigned.len();
    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    text[..end].parse().unwrap_or(f64::NAN)
}

// ============================================================================
// NAMESPACES
// ============================================================================

pub fn call_namespace(namespace: &str, name: &str, args: &[Value]) -> BuiltinResult {
    match namespace {
        "Math" => math(name, args).map(|n| Ok(Value::Number(n))),
        "JSON" => json(name, args),
        "Object" => object(name, args),
        "Array" => match name {
            "isArray" => Some(Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))),
            _ => None,
        },
        _ => None,
    }
}

fn math(name: &str, args: &[Value]) -> Option<f64> {
    let x = number(args, 0);
    let value = match name {
        "abs" => x.abs(),
        "ceil" => x.ceil(),
        "floor" => x.floor(),
        "round" => {
            // Halves round toward +Infinity.
            let floor = x.floor();
            if x - floor >= 0.5 {
                floor + 1.0
            } else {
                floor
            }
        }
        "trunc" => x.trunc(),
        "sign" => {
            if x.is_nan() || x == 0.0 {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "pow" => power(x, number(args, 1)),
        "min" => fold_numbers(args, f64::INFINITY, f64::min),
        "max" => fold_numbers(args, f64::NEG_INFINITY, f64::max),
        _ => return None,
    };
    Some(value)
}

fn fold_numbers(args: &[Value], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = pick(acc, n);
    }
    acc
}

fn json(name: &str, args: &[Value]) -> BuiltinResult {
    match name {
        "stringify" => Some(json_stringify(args)),
        "parse" => Some(
            serde_json::from_str::<serde_json::Value>(&arg(args, 0).to_js_string())
                .map(Value::from)
                .map_err(|e| e.to_string()),
        ),
        _ => None,
    }
}

fn json_stringify(args: &[Value]) -> Result<Value, String> {
    let value = arg(args, 0);
    if matches!(value, Value::Undefined) {
        return Ok(Value::Undefined);
    }
    if !arg(args, 1).is_nullish() {
        return Err("replacer arguments are not supported".to_string());
    }

    let indent = match arg(args, 2) {
        Value::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let json = value.to_json();
    if indent.is_empty() {
        return Ok(Value::String(json.to_string()));
    }

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(&json, &mut serializer).map_err(|e| e.to_string())?;
    String::from_utf8(out)
        .map(Value::String)
        .map_err(|e| e.to_string())
}

fn object(name: &str, args: &[Value]) -> BuiltinResult {
    if !matches!(name, "keys" | "values" | "entries") {
        return None;
    }
    let entries: Vec<(String, Value)> = match arg(args, 0) {
        Value::Undefined | Value::Null => {
            return Some(Err("cannot convert undefined or null to object".to_string()))
        }
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
            .collect(),
        _ => Vec::new(),
    };
    let items = entries
        .into_iter()
        .map(|(key, value)| match name {
            "keys" => Value::String(key),
            "values" => value,
            _ => Value::Array(vec![Value::String(key), value]),
        })
        .collect();
    Some(Ok(Value::Array(items)))
}

// ============================================================================
// METHODS
// ============================================================================

/// True if `receiver.name(...)` is on the allow-list.
pub fn has_method(receiver: &Value, name: &str) -> bool {
    let methods = match receiver {
        Value::String(_) => STRING_METHODS,
        Value::Array(_) => ARRAY_METHODS,
        Value::Number(_) => NUMBER_METHODS,
        _ => return false,
    };
    methods.contains(&name)
}

/// Call a method on a receiver. Only strings, arrays and numbers have any.
pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> BuiltinResult {
    match receiver {
        Value::String(s) => string_method(s, name, args),
        Value::Array(items) => array_method(items, name, args),
        Value::Number(n) => number_method(*n, name, args),
        _ => None,
    }
}

/// Resolve a possibly negative relative index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

fn checked_len(len: usize) -> Result<(), String> {
    if len > MAX_STRING_UNITS {
        Err("result string is too long".to_string())
    } else {
        Ok(())
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> BuiltinResult {
    let text = |index: usize| arg(args, index).to_js_string();
    let value = match name {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::string(s.trim_matches(is_js_whitespace)),
        "trimStart" => Value::string(s.trim_start_matches(is_js_whitespace)),
        "trimEnd" => Value::string(s.trim_end_matches(is_js_whitespace)),
        "includes" => Value::Bool(s.contains(text(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text(0).as_str())),
        "indexOf" => {
            let haystack = units(s);
            let needle = units(&text(0));
            let from = number(args, 1);
            let from = if from.is_nan() {
                0
            } else {
                from.clamp(0.0, haystack.len() as f64) as usize
            };
            let found = (from..=haystack.len().saturating_sub(needle.len()))
                .find(|&i| haystack[i..].starts_with(&needle));
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "slice" => {
            let all = units(s);
            let start = relative_index(arg(args, 0), all.len(), 0);
            let end = relative_index(arg(args, 1), all.len(), all.len());
            Value::String(if start < end {
                from_units(&all[start..end])
            } else {
                String::new()
            })
        }
        "split" => {
            let limit = match arg(args, 1) {
                Value::Undefined => usize::MAX,
                other => quill_core::to_uint32(other.to_number()) as usize,
            };
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::string(s)],
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        s.chars().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::string).collect()
                    }
                }
            };
            Value::Array(parts.into_iter().take(limit).collect())
        }
        "replace" => Value::String(s.replacen(text(0).as_str(), &text(1), 1)),
        "replaceAll" => Value::String(s.replace(text(0).as_str(), &text(1))),
        "repeat" => {
            let count = number(args, 0);
            if count < 0.0 || count.is_infinite() {
                return Some(Err(format!("invalid count value: {}", number_to_string(count))));
            }
            let count = if count.is_nan() { 0 } else { count as usize };
            if let Err(e) = checked_len(s.len().saturating_mul(count)) {
                return Some(Err(e));
            }
            Value::String(s.repeat(count))
        }
        "padStart" | "padEnd" => {
            let current = units(s);
            let target = number(args, 0);
            let target = if target.is_nan() { 0 } else { target.max(0.0) as usize };
            if let Err(e) = checked_len(target) {
                return Some(Err(e));
            }
            let fill = match arg(args, 1) {
                Value::Undefined => vec![b' ' as u16],
                other => units(&other.to_js_string()),
            };
            if target <= current.len() || fill.is_empty() {
                return Some(Ok(Value::string(s)));
            }
            let padding: Vec<u16> = fill
                .iter()
                .copied()
                .cycle()
                .take(target - current.len())
                .collect();
            let joined = if name == "padStart" {
                [padding, current].concat()
            } else {
                [current, padding].concat()
            };
            Value::String(from_units(&joined))
        }
        "charAt" => {
            let all = units(s);
            let index = number(args, 0);
            let index = if index.is_nan() { 0.0 } else { index.trunc() };
            if index < 0.0 || index >= all.len() as f64 {
                Value::string("")
            } else {
                Value::String(from_units(&all[index as usize..index as usize + 1]))
            }
        }
        "at" => {
            let all = units(s);
            match at_index(arg(args, 0), all.len()) {
                Some(i) => Value::String(from_units(&all[i..i + 1])),
                None => Value::Undefined,
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                out.push_str(&value.to_js_string());
            }
            Value::String(out)
        }
        "toString" => Value::string(s),
        _ => return None,
    };
    Some(Ok(value))
}

/// `at()` indexing: negative counts from the end, out of range is `None`.
fn at_index(value: &Value, len: usize) -> Option<usize> {
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let index = if n < 0.0 { len as f64 + n } else { n };
    if index < 0.0 || index >= len as f64 {
        None
    } else {
        Some(index as usize)
    }
}

fn array_method(items: &[Value], name: &str, args: &[Value]) -> BuiltinResult {
    let value = match name {
        "includes" => Value::Bool(items.contains(arg(args, 0))),
        "indexOf" => {
            let needle = arg(args, 0);
            let found = items.iter().position(|item| item.strict_equals(needle));
            Value::Number(found.map_or(-1.0, |i| i as f64))
        }
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            Value::String(
                items
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.to_js_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        "slice" => {
            let start = relative_index(arg(args, 0), items.len(), 0);
            let end = relative_index(arg(args, 1), items.len(), items.len());
            Value::Array(if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            })
        }
        "concat" => {
            let mut out = items.to_vec();
            for value in args {
                match value {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        "at" => at_index(arg(args, 0), items.len())
            .map(|i| items[i].clone())
            .unwrap_or_default(),
        // Returns a reversed copy; values are never shared, so there is no
        // receiver to mutate.
        "reverse" => Value::Array(items.iter().rev().cloned().collect()),
        "flat" => {
            let depth = match arg(args, 0) {
                Value::Undefined => 1.0,
                other => other.to_number(),
            };
            let depth = if depth.is_nan() { 0.0 } else { depth.max(0.0) };
            let mut out = Vec::new();
            flatten(items, depth, &mut out);
            Value::Array(out)
        }
        "toString" => Value::String(Value::Array(items.to_vec()).to_js_string()),
        _ => return None,
    };
    Some(Ok(value))
}

fn flatten(items: &[Value], depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => flatten(inner, depth - 1.0, out),
            other => out.push(other.clone()),
        }
    }
}

fn number_method(n: f64, name: &str, args: &[Value]) -> BuiltinResult {
    match name {
        "toFixed" => {
            let digits = number(args, 0);
            let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
            if !(0.0..=100.0).contains(&digits) {
                return Some(Err("toFixed() digits argument must be between 0 and 100".to_string()));
            }
            Some(Ok(Value::String(to_fixed(n, digits as usize))))
        }
        "toString" => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10.0,
                other => other.to_number().trunc(),
            };
            if !(2.0..=36.0).contains(&radix) {
                return Some(Err("toString() radix must be between 2 and 36".to_string()));
            }
            Some(to_radix_string(n, radix as u32).map(Value::String))
        }
        _ => None,
    }
}

/// `Number.prototype.toFixed`: ties round away from zero on the exact
/// binary value, where `format!` would round them to even.
fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return number_to_string(n);
    }
    const GUARD: usize = 30;
    let exact = format!("{:.*}", digits + GUARD, n.abs());
    let (head, tail) = exact.split_at(exact.len() - GUARD);
    let is_tie = tail.starts_with('5') && tail[1..].bytes().all(|b| b == b'0');

    let mut text = if is_tie {
        round_up(head.trim_end_matches('.'))
    } else {
        format!("{:.*}", digits, n.abs())
    };
    if n < 0.0 {
        text.insert(0, '-');
    }
    text
}

/// Add one unit in the last place to a plain decimal string.
fn round_up(digits: &str) -> String {
    let mut bytes = digits.as_bytes().to_vec();
    let mut i = bytes.len();
    while i > 0 {
        i -= 1;
        match bytes[i] {
            b'.' => continue,
            b'9' => bytes[i] = b'0',
            d => {
                bytes[i] = d + 1;
                return String::from_utf8_lossy(&bytes).into_owned();
            }
        }
    }
    let mut out = String::from("1");
    out.push_str(&String::from_utf8_lossy(&bytes));
    out
}

fn to_radix_string(n: f64, radix: u32) -> Result<String, String> {
    if radix == 10 || !n.is_finite() {
        return Ok(number_to_string(n));
    }
    if n.fract() != 0.0 {
        return Err("only integers can be formatted in a radix other than 10".to_string());
    }
    let mut magnitude = n.abs();
    let mut digits = Vec::new();
    while magnitude >= 1.0 {
        let digit = (magnitude % radix as f64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        magnitude = (magnitude / radix as f64).floor();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(digits.into_iter().rev().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn call(receiver: Value, name: &str, args: &[Value]) -> Value {
        call_method(&receiver, name, args)
            .expect("allow-listed")
            .expect("call succeeds")
    }

    #[test]
    fn test_unknown_names_are_not_callable() {
        assert!(call_function("eval", &[]).is_none());
        assert!(call_namespace("Math", "random", &[]).is_none());
        assert!(call_namespace("process", "exit", &[]).is_none());
        assert!(call_method(&s("x"), "constructor", &[]).is_none());
        assert!(call_method(&Value::object([("f", num(1.0))]), "f", &[]).is_none());
    }

    #[test]
    fn test_global_conversions() {
        assert_eq!(call_function("String", &[num(1e21)]), Some(Ok(s("1e+21"))));
        assert_eq!(call_function("String", &[]), Some(Ok(s(""))));
        assert_eq!(call_function("Number", &[s(" 0x10 ")]), Some(Ok(num(16.0))));
        assert_eq!(call_function("Boolean", &[s("0")]), Some(Ok(Value::Bool(true))));
        assert_eq!(call_function("isNaN", &[s("abc")]), Some(Ok(Value::Bool(true))));
        assert_eq!(call_function("isFinite", &[s("12")]), Some(Ok(Value::Bool(true))));
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("  42px", &Value::Undefined), 42.0);
        assert_eq!(parse_int("-0x1A", &Value::Undefined), -26.0);
        assert_eq!(parse_int("101", &num(2.0)), 5.0);
        assert_eq!(parse_int("0x10", &num(10.0)), 0.0);
        assert!(parse_int("px", &Value::Undefined).is_nan());
        assert!(parse_int("1", &num(40.0)).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("  -.5"), -0.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("1e"), 1.0);
        assert_eq!(parse_float("-Infinityx"), f64::NEG_INFINITY);
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_math() {
        let m = |name: &str, args: &[Value]| call_namespace("Math", name, args);
        assert_eq!(m("round", &[num(2.5)]), Some(Ok(num(3.0))));
        assert_eq!(m("round", &[num(-2.5)]), Some(Ok(num(-2.0))));
        assert_eq!(m("round", &[num(0.49999999999999994)]), Some(Ok(num(0.0))));
        assert_eq!(m("max", &[num(1.0), s("7"), num(3.0)]), Some(Ok(num(7.0))));
        assert_eq!(m("min", &[]), Some(Ok(num(f64::INFINITY))));
        assert!(matches!(m("max", &[num(1.0), s("x")]), Some(Ok(Value::Number(n))) if n.is_nan()));
        assert_eq!(m("sign", &[num(-3.0)]), Some(Ok(num(-1.0))));
        assert_eq!(m("trunc", &[num(-4.7)]), Some(Ok(num(-4.0))));
    }

    #[test]
    fn test_json() {
        let value = Value::object([("b", num(1.0)), ("a", Value::Array(vec![Value::Null]))]);
        assert_eq!(
            call_namespace("JSON", "stringify", &[value]),
            Some(Ok(s(r#"{"a":[null],"b":1}"#)))
        );
        assert_eq!(
            call_namespace("JSON", "stringify", &[Value::Array(vec![num(1.0)]), Value::Null, num(2.0)]),
            Some(Ok(s("[\n  1\n]")))
        );
        assert_eq!(
            call_namespace("JSON", "parse", &[s(r#"{"x": [1, "y"]}"#)]),
            Some(Ok(Value::object([(
                "x",
                Value::Array(vec![num(1.0), s("y")])
            )])))
        );
        assert!(matches!(call_namespace("JSON", "parse", &[s("{")]), Some(Err(_))));
    }

    #[test]
    fn test_object_and_array_namespaces() {
        let value = Value::object([("b", num(2.0)), ("a", num(1.0))]);
        assert_eq!(
            call_namespace("Object", "keys", &[value.clone()]),
            Some(Ok(Value::Array(vec![s("a"), s("b")])))
        );
        assert_eq!(
            call_namespace("Object", "entries", &[value]),
            Some(Ok(Value::Array(vec![
                Value::Array(vec![s("a"), num(1.0)]),
                Value::Array(vec![s("b"), num(2.0)]),
            ])))
        );
        assert!(matches!(call_namespace("Object", "keys", &[Value::Null]), Some(Err(_))));
        assert_eq!(
            call_namespace("Array", "isArray", &[Value::Array(vec![])]),
            Some(Ok(Value::Bool(true)))
        );
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call(s(" Hi "), "trim", &[]), s("Hi"));
        assert_eq!(call(s("abc"), "toUpperCase", &[]), s("ABC"));
        assert_eq!(call(s("hello"), "slice", &[num(-3.0)]), s("llo"));
        assert_eq!(call(s("hello"), "slice", &[num(1.0), num(-1.0)]), s("ell"));
        assert_eq!(call(s("a,b,c"), "split", &[s(",")]), Value::Array(vec![s("a"), s("b"), s("c")]));
        assert_eq!(call(s("a,b,c"), "split", &[s(","), num(2.0)]), Value::Array(vec![s("a"), s("b")]));
        assert_eq!(call(s("aXbX"), "replace", &[s("X"), s("-")]), s("a-bX"));
        assert_eq!(call(s("aXbX"), "replaceAll", &[s("X"), s("-")]), s("a-b-"));
        assert_eq!(call(s("5"), "padStart", &[num(3.0), s("0")]), s("005"));
        assert_eq!(call(s("ab"), "padEnd", &[num(5.0), s("xy")]), s("abxyx"));
        assert_eq!(call(s("abc"), "at", &[num(-1.0)]), s("c"));
        assert_eq!(call(s("abc"), "at", &[num(5.0)]), Value::Undefined);
        assert_eq!(call(s("abc"), "charAt", &[num(5.0)]), s(""));
        assert_eq!(call(s("banana"), "indexOf", &[s("na")]), num(2.0));
        assert_eq!(call(s("banana"), "indexOf", &[s("na"), num(3.0)]), num(4.0));
        assert_eq!(call(s("banana"), "indexOf", &[s("x")]), num(-1.0));
        assert_eq!(call(s("ab"), "repeat", &[num(3.0)]), s("ababab"));
        assert!(matches!(call_method(&s("ab"), "repeat", &[num(-1.0)]), Some(Err(_))));
        assert_eq!(call(s("a"), "concat", &[num(1.0), Value::Null]), s("a1null"));
    }

    #[test]
    fn test_array_methods() {
        let list = Value::Array(vec![num(1.0), num(2.0), num(3.0)]);
        assert_eq!(call(list.clone(), "join", &[s(" | ")]), s("1 | 2 | 3"));
        assert_eq!(call(list.clone(), "includes", &[num(2.0)]), Value::Bool(true));
        assert_eq!(call(list.clone(), "indexOf", &[s("2")]), num(-1.0));
        assert_eq!(call(list.clone(), "at", &[num(-1.0)]), num(3.0));
        assert_eq!(call(list.clone(), "slice", &[num(1.0)]), Value::Array(vec![num(2.0), num(3.0)]));
        assert_eq!(
            call(list.clone(), "reverse", &[]),
            Value::Array(vec![num(3.0), num(2.0), num(1.0)])
        );
        assert_eq!(
            call(Value::Array(vec![num(1.0)]), "concat", &[Value::Array(vec![num(2.0)]), num(3.0)]),
            list
        );
        let nested = Value::Array(vec![num(1.0), Value::Array(vec![num(2.0), Value::Array(vec![num(3.0)])])]);
        assert_eq!(
            call(nested, "flat", &[]),
            Value::Array(vec![num(1.0), num(2.0), Value::Array(vec![num(3.0)])])
        );
        assert!(matches!(
            call(Value::Array(vec![num(f64::NAN)]), "includes", &[num(f64::NAN)]),
            Value::Bool(true)
        ));
    }

    #[test]
    fn test_to_fixed_rounds_ties_up() {
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(0.25, 1), "0.3");
        assert_eq!(to_fixed(9.95, 1), "9.9"); // 9.95 is slightly below the tie
        assert_eq!(to_fixed(9.5, 0), "10");
        assert_eq!(to_fixed(-1.005, 2), "-1.00");
        assert_eq!(to_fixed(1.45, 1), "1.4");
        assert_eq!(to_fixed(3.0, 2), "3.00");
        assert_eq!(to_fixed(1e21, 2), "1e+21");
    }

    #[test]
    fn test_number_to_string_radix() {
        assert_eq!(call(num(255.0), "toString", &[num(16.0)]), s("ff"));
        assert_eq!(call(num(-5.0), "toString", &[num(2.0)]), s("-101"));
        assert_eq!(call(num(0.5), "toString", &[]), s("0.5"));
        assert!(matches!(call_method(&num(0.5), "toString", &[num(2.0)]), Some(Err(_))));
    }
}
