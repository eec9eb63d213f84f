//! Operator implementations for the Machine Dialect runtime
//!
//! Uniform operator semantics across all execution modes. The compiler's
//! constant folder calls these directly; an `Err` means the operation traps
//! at runtime and therefore must not be folded away.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;

/// Addition operator (+)
///
/// String concatenation when either operand is a string (the other operand
/// is coerced with the display rules), numeric addition otherwise. Integer
/// type is preserved when both operands are integers.
pub fn add(a: &Value, b: &Value) -> RuntimeResult<Value> {
    if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
        return Ok(Value::Str(a.to_display_string() + &b.to_display_string()));
    }

    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(match x.checked_add(*y) {
            Some(sum) => Value::Int(sum),
            None => Value::Float(*x as f64 + *y as f64),
        }),
        _ if a.is_numeric() && b.is_numeric() => Ok(Value::Float(a.to_float()? + b.to_float()?)),
        _ => Err(RuntimeError::unsupported_binary(
            "+",
            a.type_name(),
            b.type_name(),
        )),
    }
}

/// Subtraction operator (-)
pub fn subtract(a: &Value, b: &Value) -> RuntimeResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(match x.checked_sub(*y) {
            Some(diff) => Value::Int(diff),
            None => Value::Float(*x as f64 - *y as f64),
        }),
        _ if a.is_numeric() && b.is_numeric() => Ok(Value::Float(a.to_float()? - b.to_float()?)),
        _ => Err(RuntimeError::unsupported_binary(
            "-",
            a.type_name(),
            b.type_name(),
        )),
    }
}

/// Multiplication operator (*)
pub fn multiply(a: &Value, b: &Value) -> RuntimeResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(match x.checked_mul(*y) {
            Some(product) => Value::Int(product),
            None => Value::Float(*x as f64 * *y as f64),
        }),
        _ if a.is_numeric() && b.is_numeric() => Ok(Value::Float(a.to_float()? * b.to_float()?)),
        _ => Err(RuntimeError::unsupported_binary(
            "*",
            a.type_name(),
            b.type_name(),
        )),
    }
}

/// Division operator (/)
///
/// Always true division: the result is a float even for two integers.
pub fn divide(a: &Value, b: &Value) -> RuntimeResult<Value> {
    if !a.is_numeric() || !b.is_numeric() {
        return Err(RuntimeError::unsupported_binary(
            "/",
            a.type_name(),
            b.type_name(),
        ));
    }

    let divisor = b.to_float()?;
    if divisor == 0.0 {
        return Err(RuntimeError::division_by_zero());
    }

    Ok(Value::Float(a.to_float()? / divisor))
}

/// Modulo operator (%)
///
/// Floor modulo: the result takes the sign of the divisor, for both integer
/// and float operands.
pub fn modulo(a: &Value, b: &Value) -> RuntimeResult<Value> {
    if !a.is_numeric() || !b.is_numeric() {
        return Err(RuntimeError::unsupported_binary(
            "%",
            a.type_name(),
            b.type_name(),
        ));
    }

    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if *y == 0 {
                return Err(RuntimeError::modulo_by_zero());
            }
            let mut r = x % y;
            if r != 0 && (r < 0) != (*y < 0) {
                r += y;
            }
            Ok(Value::Int(r))
        }
        _ => {
            let x = a.to_float()?;
            let y = b.to_float()?;
            if y == 0.0 {
                return Err(RuntimeError::modulo_by_zero());
            }
            let mut r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r += y;
            }
            Ok(Value::Float(r))
        }
    }
}

/// Exponentiation operator (**)
///
/// Integer result when both operands are integers and the exponent is
/// non-negative; promotes to float on overflow or a negative exponent.
pub fn power(a: &Value, b: &Value) -> RuntimeResult<Value> {
    if !a.is_numeric() || !b.is_numeric() {
        return Err(RuntimeError::unsupported_binary(
            "**",
            a.type_name(),
            b.type_name(),
        ));
    }

    if let (Value::Int(base), Value::Int(exp)) = (a, b) {
        if *exp >= 0 {
            if let Ok(exp32) = u32::try_from(*exp) {
                if let Some(result) = base.checked_pow(exp32) {
                    return Ok(Value::Int(result));
                }
            }
        }
    }

    Ok(Value::Float(a.to_float()?.powf(b.to_float()?)))
}

/// Negation operator (unary -)
///
/// Normalizes negative zero so `-0` prints as `0`.
pub fn negate(value: &Value) -> RuntimeResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Int(n.checked_neg().unwrap_or(i64::MIN))),
        Value::Float(f) => Ok(Value::Float(if *f == 0.0 { 0.0 } else { -*f })),
        _ => Err(RuntimeError::unsupported_unary("-", value.type_name())),
    }
}

/// Logical NOT operator (not)
pub fn logical_not(value: &Value) -> Value {
    Value::Bool(!value.is_truthy())
}

/// Logical AND operator
pub fn logical_and(a: &Value, b: &Value) -> Value {
    Value::Bool(a.is_truthy() && b.is_truthy())
}

/// Logical OR operator
pub fn logical_or(a: &Value, b: &Value) -> Value {
    Value::Bool(a.is_truthy() || b.is_truthy())
}

/// Value equality operator (==)
pub fn equals(a: &Value, b: &Value) -> Value {
    Value::Bool(a.loose_eq(b))
}

/// Value inequality operator (!=)
pub fn not_equals(a: &Value, b: &Value) -> Value {
    Value::Bool(!a.loose_eq(b))
}

/// Strict equality operator (===)
pub fn strict_equals(a: &Value, b: &Value) -> Value {
    Value::Bool(a.strict_eq(b))
}

/// Strict inequality operator (!==)
pub fn strict_not_equals(a: &Value, b: &Value) -> Value {
    Value::Bool(!a.strict_eq(b))
}

fn numeric_pair(op: &str, a: &Value, b: &Value) -> RuntimeResult<(f64, f64)> {
    if !a.is_numeric() || !b.is_numeric() {
        return Err(RuntimeError::unsupported_binary(
            op,
            a.type_name(),
            b.type_name(),
        ));
    }
    Ok((a.to_float()?, b.to_float()?))
}

/// Less than operator (<)
pub fn less_than(a: &Value, b: &Value) -> RuntimeResult<Value> {
    let (x, y) = numeric_pair("<", a, b)?;
    Ok(Value::Bool(x < y))
}

/// Greater than operator (>)
pub fn greater_than(a: &Value, b: &Value) -> RuntimeResult<Value> {
    let (x, y) = numeric_pair(">", a, b)?;
    Ok(Value::Bool(x > y))
}

/// Less than or equal operator (<=)
pub fn less_than_or_equal(a: &Value, b: &Value) -> RuntimeResult<Value> {
    let (x, y) = numeric_pair("<=", a, b)?;
    Ok(Value::Bool(x <= y))
}

/// Greater than or equal operator (>=)
pub fn greater_than_or_equal(a: &Value, b: &Value) -> RuntimeResult<Value> {
    let (x, y) = numeric_pair(">=", a, b)?;
    Ok(Value::Bool(x >= y))
}

/// Bitwise AND (&), integers only
pub fn bit_and(a: &Value, b: &Value) -> RuntimeResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x & y)),
        _ => Err(RuntimeError::unsupported_binary(
            "&",
            a.type_name(),
            b.type_name(),
        )),
    }
}

/// Bitwise OR (|), integers only
pub fn bit_or(a: &Value, b: &Value) -> RuntimeResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x | y)),
        _ => Err(RuntimeError::unsupported_binary(
            "|",
            a.type_name(),
            b.type_name(),
        )),
    }
}

/// Bitwise XOR (^), integers only
pub fn bit_xor(a: &Value, b: &Value) -> RuntimeResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x ^ y)),
        _ => Err(RuntimeError::unsupported_binary(
            "^",
            a.type_name(),
            b.type_name(),
        )),
    }
}

/// Bitwise NOT (~), integers only
pub fn bit_not(value: &Value) -> RuntimeResult<Value> {
    match value {
        Value::Int(n) => Ok(Value::Int(!n)),
        _ => Err(RuntimeError::unsupported_unary("~", value.type_name())),
    }
}

/// Left shift (<<), integers only; shift counts outside [0, 63] trap
pub fn shift_left(a: &Value, b: &Value) -> RuntimeResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let shift = u32::try_from(*y)
                .ok()
                .filter(|s| *s < 64)
                .ok_or_else(|| RuntimeError::ValueError(format!("Invalid shift count: {}", y)))?;
            Ok(Value::Int(x.wrapping_shl(shift)))
        }
        _ => Err(RuntimeError::unsupported_binary(
            "<<",
            a.type_name(),
            b.type_name(),
        )),
    }
}

/// Right shift (>>), arithmetic, integers only
pub fn shift_right(a: &Value, b: &Value) -> RuntimeResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let shift = u32::try_from(*y)
                .ok()
                .filter(|s| *s < 64)
                .ok_or_else(|| RuntimeError::ValueError(format!("Invalid shift count: {}", y)))?;
            Ok(Value::Int(x.wrapping_shr(shift)))
        }
        _ => Err(RuntimeError::unsupported_binary(
            ">>",
            a.type_name(),
            b.type_name(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_preserves_int() {
        assert_eq!(add(&Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(
            add(&Value::Int(2), &Value::Float(3.0)).unwrap(),
            Value::Float(5.0)
        );
    }

    #[test]
    fn test_add_concatenates_strings() {
        assert_eq!(
            add(&Value::Str("a".into()), &Value::Int(1)).unwrap(),
            Value::Str("a1".into())
        );
        assert_eq!(
            add(&Value::Bool(true), &Value::Str("!".into())).unwrap(),
            Value::Str("Yes!".into())
        );
        assert_eq!(
            add(&Value::Empty, &Value::Str("".into())).unwrap(),
            Value::Str("empty".into())
        );
    }

    #[test]
    fn test_add_rejects_bool_pair() {
        assert!(add(&Value::Bool(true), &Value::Bool(false)).is_err());
    }

    #[test]
    fn test_division_always_float() {
        assert_eq!(
            divide(&Value::Int(10), &Value::Int(4)).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            divide(&Value::Int(10), &Value::Int(5)).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn test_division_by_zero_traps() {
        let err = divide(&Value::Int(10), &Value::Int(0)).unwrap_err();
        assert_eq!(err.to_string(), "Division by zero");
        let err = modulo(&Value::Int(10), &Value::Int(0)).unwrap_err();
        assert_eq!(err.to_string(), "Modulo by zero");
    }

    #[test]
    fn test_floor_modulo() {
        assert_eq!(
            modulo(&Value::Int(-7), &Value::Int(3)).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            modulo(&Value::Int(7), &Value::Int(-3)).unwrap(),
            Value::Int(-2)
        );
        assert_eq!(
            modulo(&Value::Float(-7.5), &Value::Float(2.0)).unwrap(),
            Value::Float(0.5)
        );
    }

    #[test]
    fn test_power() {
        assert_eq!(
            power(&Value::Int(2), &Value::Int(10)).unwrap(),
            Value::Int(1024)
        );
        assert_eq!(
            power(&Value::Int(2), &Value::Int(-1)).unwrap(),
            Value::Float(0.5)
        );
        // overflow promotes to float
        let big = power(&Value::Int(10), &Value::Int(40)).unwrap();
        assert!(matches!(big, Value::Float(_)));
    }

    #[test]
    fn test_negate_normalizes_zero() {
        assert_eq!(negate(&Value::Int(5)).unwrap(), Value::Int(-5));
        let zero = negate(&Value::Float(0.0)).unwrap();
        assert_eq!(zero, Value::Float(0.0));
        if let Value::Float(f) = zero {
            assert!(f.is_sign_positive());
        }
    }

    #[test]
    fn test_logical_ops_use_truthiness() {
        assert_eq!(
            logical_and(&Value::Int(1), &Value::Str("x".into())),
            Value::Bool(true)
        );
        assert_eq!(
            logical_or(&Value::Int(0), &Value::Empty),
            Value::Bool(false)
        );
        assert_eq!(logical_not(&Value::Float(0.0)), Value::Bool(true));
    }

    #[test]
    fn test_comparisons_numeric_only() {
        assert_eq!(
            less_than(&Value::Int(1), &Value::Float(1.5)).unwrap(),
            Value::Bool(true)
        );
        assert!(less_than(&Value::Str("a".into()), &Value::Str("b".into())).is_err());
    }

    #[test]
    fn test_bitwise_and_shifts() {
        assert_eq!(
            bit_and(&Value::Int(0b1100), &Value::Int(0b1010)).unwrap(),
            Value::Int(0b1000)
        );
        assert_eq!(
            shift_left(&Value::Int(3), &Value::Int(2)).unwrap(),
            Value::Int(12)
        );
        assert_eq!(
            shift_right(&Value::Int(-8), &Value::Int(1)).unwrap(),
            Value::Int(-4)
        );
        assert!(shift_left(&Value::Int(1), &Value::Int(64)).is_err());
        assert!(shift_left(&Value::Int(1), &Value::Int(-1)).is_err());
    }

    proptest::proptest! {
        /// Floor modulo: the result is zero or takes the divisor's sign,
        /// and a == b * (a - r) / b + r reconstructs for in-range inputs.
        #[test]
        fn prop_floor_modulo_sign(a in -10_000i64..10_000, b in -100i64..100) {
            proptest::prop_assume!(b != 0);
            let r = match modulo(&Value::Int(a), &Value::Int(b)).unwrap() {
                Value::Int(r) => r,
                other => panic!("unexpected result {:?}", other),
            };
            proptest::prop_assert!(r == 0 || (r < 0) == (b < 0));
            proptest::prop_assert!(r.abs() < b.abs());
            proptest::prop_assert_eq!((a - r) % b, 0);
        }
    }

    #[test]
    fn test_equality_operators() {
        assert_eq!(equals(&Value::Int(1), &Value::Float(1.0)), Value::Bool(true));
        assert_eq!(
            strict_equals(&Value::Int(1), &Value::Float(1.0)),
            Value::Bool(false)
        );
        let nan = Value::Float(f64::NAN);
        assert_eq!(equals(&nan, &nan), Value::Bool(false));
        assert_eq!(not_equals(&nan, &nan), Value::Bool(true));
        assert_eq!(strict_not_equals(&nan, &nan), Value::Bool(true));
    }
}
