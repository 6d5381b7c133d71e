//! Operator semantics
//!
//! Everything here works on already evaluated operands. Coercions come from
//! [`quill_core::Value`]; this module only decides which coercion each
//! operator applies.

use quill_core::{to_int32, to_uint32, Value};
use quill_dsl::{BinaryOperator, UnaryOperator};
use std::cmp::Ordering;

/// Why an operator could not be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandError(pub String);

/// Apply a binary operator.
pub fn binary(operator: BinaryOperator, left: &Value, right: &Value) -> Result<Value, OperandError> {
    use BinaryOperator::*;

    let value = match operator {
        Add => add(left, right),
        Sub => Value::Number(left.to_number() - right.to_number()),
        Mul => Value::Number(left.to_number() * right.to_number()),
        Div => Value::Number(left.to_number() / right.to_number()),
        // f64 `%` truncates toward zero like the ECMAScript remainder.
        Rem => Value::Number(left.to_number() % right.to_number()),
        Exp => Value::Number(power(left.to_number(), right.to_number())),
        Eq => Value::Bool(left.loose_equals(right)),
        NotEq => Value::Bool(!left.loose_equals(right)),
        StrictEq => Value::Bool(left.strict_equals(right)),
        StrictNotEq => Value::Bool(!left.strict_equals(right)),
        Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        In => Value::Bool(has_property(right, left)?),
        BitAnd => int32(to_int32(left.to_number()) & to_int32(right.to_number())),
        BitOr => int32(to_int32(left.to_number()) | to_int32(right.to_number())),
        BitXor => int32(to_int32(left.to_number()) ^ to_int32(right.to_number())),
        Shl => int32(to_int32(left.to_number()).wrapping_shl(shift_count(right))),
        Shr => int32(to_int32(left.to_number()).wrapping_shr(shift_count(right))),
        UShr => Value::Number((to_uint32(left.to_number()) >> shift_count(right)) as f64),
    };
    Ok(value)
}

/// Apply a unary operator. `typeof` and `void` are handled here too, but the
/// evaluator special-cases `typeof` on unbound identifiers.
pub fn unary(operator: UnaryOperator, argument: &Value) -> Value {
    match operator {
        UnaryOperator::Not => Value::Bool(!argument.is_truthy()),
        UnaryOperator::Minus => Value::Number(-argument.to_number()),
        UnaryOperator::Plus => Value::Number(argument.to_number()),
        UnaryOperator::BitNot => int32(!to_int32(argument.to_number())),
        UnaryOperator::Typeof => Value::string(argument.type_of()),
        UnaryOperator::Void => Value::Undefined,
    }
}

/// `Number::exponentiate`, which differs from `powf` for a few NaN and
/// infinity cases.
pub fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() {
        return f64::NAN;
    }
    if base.abs() == 1.0 && exponent.is_infinite() {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn add(left: &Value, right: &Value) -> Value {
    let left = left.to_primitive();
    let right = right.to_primitive();
    if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
        let mut text = left.to_js_string();
        text.push_str(&right.to_js_string());
        Value::String(text)
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

/// Abstract relational comparison. `None` when either side is `NaN`.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let left = left.to_primitive();
    let right = right.to_primitive();
    match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn int32(n: i32) -> Value {
    Value::Number(n as f64)
}

fn shift_count(value: &Value) -> u32 {
    to_uint32(value.to_number()) & 31
}

/// The `in` operator: `key in container`.
fn has_property(container: &Value, key: &Value) -> Result<bool, OperandError> {
    let key = key.to_js_string();
    match container {
        Value::Object(map) => Ok(map.contains_key(&key)),
        Value::Array(items) => Ok(key == "length" || array_index(&key).is_some_and(|i| i < items.len())),
        other => Err(OperandError(format!(
            "cannot search for '{}' in {}",
            key,
            other.type_of()
        ))),
    }
}

/// Parse a canonical array index (`"0"`, `"12"`, but not `"01"` or `"1.0"`).
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    fn bin(op: BinaryOperator, l: Value, r: Value) -> Value {
        binary(op, &l, &r).expect("operator applies")
    }

    #[test]
    fn test_addition_coercions() {
        assert_eq!(bin(BinaryOperator::Add, num(1.0), num(2.0)), num(3.0));
        assert_eq!(bin(BinaryOperator::Add, s("1"), num(2.0)), s("12"));
        assert_eq!(bin(BinaryOperator::Add, num(1.0), Value::Null), num(1.0));
        assert!(matches!(
            bin(BinaryOperator::Add, num(1.0), Value::Undefined),
            Value::Number(n) if n.is_nan()
        ));
        assert_eq!(bin(BinaryOperator::Add, Value::Bool(true), num(1.0)), num(2.0));
        assert_eq!(
            bin(BinaryOperator::Add, Value::Array(vec![num(1.0), num(2.0)]), s("!")),
            s("1,2!")
        );
        assert_eq!(
            bin(BinaryOperator::Add, Value::object([("a", num(1.0))]), s("")),
            s("[object Object]")
        );
    }

    #[test]
    fn test_arithmetic_is_ieee() {
        assert_eq!(bin(BinaryOperator::Sub, s("5"), num(2.0)), num(3.0));
        assert_eq!(bin(BinaryOperator::Mul, s("3"), s("4")), num(12.0));
        assert_eq!(bin(BinaryOperator::Div, num(1.0), num(0.0)), num(f64::INFINITY));
        assert_eq!(bin(BinaryOperator::Rem, num(-7.0), num(2.0)), num(-1.0));
        assert_eq!(bin(BinaryOperator::Rem, num(5.5), num(2.0)), num(1.5));
        assert!(matches!(bin(BinaryOperator::Rem, num(1.0), num(0.0)), Value::Number(n) if n.is_nan()));
        assert_eq!(bin(BinaryOperator::Add, num(0.1), num(0.2)), num(0.30000000000000004));
    }

    #[test]
    fn test_exponent_edge_cases() {
        assert_eq!(power(2.0, 10.0), 1024.0);
        assert!(power(1.0, f64::NAN).is_nan());
        assert!(power(-1.0, f64::INFINITY).is_nan());
        assert_eq!(power(f64::NAN, 0.0), 1.0);
    }

    #[test]
    fn test_equality() {
        assert_eq!(bin(BinaryOperator::Eq, s("1"), num(1.0)), Value::Bool(true));
        assert_eq!(bin(BinaryOperator::StrictEq, s("1"), num(1.0)), Value::Bool(false));
        assert_eq!(bin(BinaryOperator::Eq, Value::Null, Value::Undefined), Value::Bool(true));
        assert_eq!(bin(BinaryOperator::Eq, Value::Null, num(0.0)), Value::Bool(false));
        assert_eq!(bin(BinaryOperator::NotEq, num(f64::NAN), num(f64::NAN)), Value::Bool(true));
        assert_eq!(bin(BinaryOperator::Eq, Value::Bool(true), s("1")), Value::Bool(true));
    }

    #[test]
    fn test_relational() {
        assert_eq!(bin(BinaryOperator::Lt, s("10"), s("9")), Value::Bool(true));
        assert_eq!(bin(BinaryOperator::Lt, s("10"), num(9.0)), Value::Bool(false));
        assert_eq!(bin(BinaryOperator::Le, Value::Null, num(0.0)), Value::Bool(true));
        assert_eq!(bin(BinaryOperator::Ge, Value::Undefined, num(0.0)), Value::Bool(false));
        assert_eq!(bin(BinaryOperator::Le, num(f64::NAN), num(f64::NAN)), Value::Bool(false));
        // UTF-16 order puts U+FF61 before U+1F600, unlike code point order.
        assert_eq!(bin(BinaryOperator::Lt, s("\u{FF61}"), s("\u{1F600}")), Value::Bool(false));
    }

    #[test]
    fn test_bitwise_and_shifts() {
        assert_eq!(bin(BinaryOperator::BitOr, num(1.5), num(0.0)), num(1.0));
        assert_eq!(bin(BinaryOperator::BitAnd, num(6.0), num(3.0)), num(2.0));
        assert_eq!(bin(BinaryOperator::BitXor, num(5.0), num(1.0)), num(4.0));
        assert_eq!(bin(BinaryOperator::Shl, num(1.0), num(33.0)), num(2.0));
        assert_eq!(bin(BinaryOperator::Shr, num(-8.0), num(1.0)), num(-4.0));
        assert_eq!(bin(BinaryOperator::UShr, num(-1.0), num(0.0)), num(4294967295.0));
        assert_eq!(bin(BinaryOperator::Shl, num(1.0), num(31.0)), num(-2147483648.0));
        assert_eq!(unary(UnaryOperator::BitNot, &num(0.0)), num(-1.0));
    }

    #[test]
    fn test_in_operator() {
        let obj = Value::object([("a", num(1.0))]);
        assert_eq!(bin(BinaryOperator::In, s("a"), obj.clone()), Value::Bool(true));
        assert_eq!(bin(BinaryOperator::In, s("b"), obj), Value::Bool(false));
        let list = Value::Array(vec![num(1.0)]);
        assert_eq!(bin(BinaryOperator::In, num(0.0), list.clone()), Value::Bool(true));
        assert_eq!(bin(BinaryOperator::In, num(1.0), list), Value::Bool(false));
        assert!(binary(BinaryOperator::In, &s("a"), &s("abc")).is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOperator::Not, &s("")), Value::Bool(true));
        assert_eq!(unary(UnaryOperator::Minus, &s("3")), num(-3.0));
        assert_eq!(unary(UnaryOperator::Plus, &Value::Bool(true)), num(1.0));
        assert_eq!(unary(UnaryOperator::Typeof, &Value::Null), s("object"));
        assert_eq!(unary(UnaryOperator::Void, &num(1.0)), Value::Undefined);
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("1.0"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index(""), None);
    }
}
