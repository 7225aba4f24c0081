//! Identity / equality utility.
//!
//! Every dependency comparison in the runtime goes through [`is_same`]:
//! observers use it to skip redundant notifications, the update queue uses
//! it to detect unchanged state, and memo/context/effect deps compare with it.
//!
//! Semantics are IEEE "same value":
//! - `+0` and `-0` are different
//! - `NaN` equals `NaN`
//! - containers and proxies compare by reference

use std::rc::Rc;

use super::value::Value;

/// Same-value comparison of two numbers.
#[inline]
pub fn same_number(a: f64, b: f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

/// Returns true iff `a` and `b` are the same value.
pub fn is_same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => same_number(*x, *y),
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Proxy(x), Value::Proxy(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Same-value-zero: like [`is_same`] but `+0` equals `-0`.
///
/// Map and Set keys use this relation.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if *x == 0.0 && *y == 0.0 => true,
        _ => is_same(a, b),
    }
}

/// Element-wise [`is_same`] over two dependency lists.
pub fn same_deps(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| is_same(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::value::RawObject;
    use proptest::prelude::*;

    #[test]
    fn test_zero_signs_differ() {
        assert!(!is_same(&Value::from(0.0), &Value::from(-0.0)));
        assert!(same_value_zero(&Value::from(0.0), &Value::from(-0.0)));
    }

    #[test]
    fn test_nan_is_same_as_nan() {
        assert!(is_same(&Value::from(f64::NAN), &Value::from(f64::NAN)));
    }

    #[test]
    fn test_primitives() {
        assert!(is_same(&Value::from(1), &Value::from(1)));
        assert!(is_same(&Value::from("a"), &Value::from("a".to_string())));
        assert!(!is_same(&Value::from(1), &Value::from("1")));
        assert!(!is_same(&Value::Undefined, &Value::Null));
    }

    #[test]
    fn test_objects_compare_by_reference() {
        let a = RawObject::object();
        let b = RawObject::object();
        assert!(!is_same(&Value::Object(a.clone()), &Value::Object(b)));
        assert!(is_same(&Value::Object(a.clone()), &Value::Object(a)));
    }

    #[test]
    fn test_same_deps() {
        let a = vec![Value::from(1), Value::from(f64::NAN)];
        let b = vec![Value::from(1), Value::from(f64::NAN)];
        assert!(same_deps(&a, &b));
        assert!(!same_deps(&a, &b[..1]));
    }

    proptest! {
        #[test]
        fn prop_reflexive(x in any::<f64>()) {
            prop_assert!(is_same(&Value::from(x), &Value::from(x)));
        }

        #[test]
        fn prop_symmetric(x in any::<f64>(), y in any::<f64>()) {
            let (a, b) = (Value::from(x), Value::from(y));
            prop_assert_eq!(is_same(&a, &b), is_same(&b, &a));
        }

        #[test]
        fn prop_agrees_with_bits_for_non_nan(x in any::<f64>(), y in any::<f64>()) {
            prop_assume!(!x.is_nan() && !y.is_nan());
            prop_assert_eq!(is_same(&Value::from(x), &Value::from(y)), x.to_bits() == y.to_bits());
        }
    }
}
