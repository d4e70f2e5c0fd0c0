// Value model: equality, ordering, coercion and formatting at the
// integer/float boundaries.

use crate::lua_value::{
    float_to_int, float_to_lua_string, int_fits_float, str_to_number, FloatToInt, LuaValue,
};

#[test]
fn test_int_float_equality_exact() {
    assert!(LuaValue::Integer(1).raw_eq(&LuaValue::Float(1.0)));
    assert!(LuaValue::Integer(0).raw_eq(&LuaValue::Float(-0.0)));
    assert!(!LuaValue::Integer(1).raw_eq(&LuaValue::Float(1.5)));
    // 2^53 round-trips exactly.
    let p53 = 1i64 << 53;
    assert!(LuaValue::Integer(p53).raw_eq(&LuaValue::Float(p53 as f64)));
}

#[test]
fn test_int_float_equality_boundary() {
    // i64::MAX as f64 rounds up to 2^63, which is not i64::MAX.
    assert!(!LuaValue::Integer(i64::MAX).raw_eq(&LuaValue::Float(i64::MAX as f64)));
    // i64::MIN as f64 is exactly -2^63 and round-trips.
    assert!(LuaValue::Integer(i64::MIN).raw_eq(&LuaValue::Float(i64::MIN as f64)));
    assert!(!LuaValue::Integer(i64::MAX - 1).raw_eq(&LuaValue::Float(9.3e18)));
}

#[test]
fn test_nan_semantics() {
    let nan = LuaValue::Float(f64::NAN);
    assert!(!nan.raw_eq(&nan));
    assert!(!LuaValue::Integer(0).raw_eq(&LuaValue::Float(f64::NAN)));
}

#[test]
fn test_float_to_int_modes() {
    assert_eq!(float_to_int(2.0, FloatToInt::Exact), Some(2));
    assert_eq!(float_to_int(2.5, FloatToInt::Exact), None);
    assert_eq!(float_to_int(2.5, FloatToInt::Floor), Some(2));
    assert_eq!(float_to_int(2.5, FloatToInt::Ceil), Some(3));
    assert_eq!(float_to_int(-2.5, FloatToInt::Floor), Some(-3));
    assert_eq!(float_to_int(f64::NAN, FloatToInt::Floor), None);
    // 2^63 is out of range; -2^63 is in range.
    assert_eq!(float_to_int(9_223_372_036_854_775_808.0, FloatToInt::Exact), None);
    assert_eq!(
        float_to_int(-9_223_372_036_854_775_808.0, FloatToInt::Exact),
        Some(i64::MIN)
    );
}

#[test]
fn test_ordering_across_subtypes() {
    use crate::lua_value::{num_le, num_lt};
    assert!(num_lt(&LuaValue::Integer(1), &LuaValue::Float(1.5)));
    assert!(num_lt(&LuaValue::Float(0.5), &LuaValue::Integer(1)));
    assert!(num_le(&LuaValue::Integer(2), &LuaValue::Float(2.0)));
    // Beyond 2^53 the naive cast would lie; the exact path must not.
    let big = (1i64 << 53) + 1;
    assert!(!num_lt(&LuaValue::Integer(big), &LuaValue::Float(big as f64)));
    assert!(num_lt(&LuaValue::Integer(big), &LuaValue::Float(1e17)));
    // i64::MAX < 2^63 as float.
    assert!(num_lt(
        &LuaValue::Integer(i64::MAX),
        &LuaValue::Float(9_223_372_036_854_775_808.0)
    ));
    assert!(!num_lt(
        &LuaValue::Float(9_223_372_036_854_775_808.0),
        &LuaValue::Integer(i64::MAX)
    ));
    // NaN comparisons are all false.
    assert!(!num_lt(&LuaValue::Integer(0), &LuaValue::Float(f64::NAN)));
    assert!(!num_le(&LuaValue::Float(f64::NAN), &LuaValue::Integer(0)));
}

#[test]
fn test_int_fits_float() {
    assert!(int_fits_float(1 << 53));
    assert!(int_fits_float(-(1 << 53)));
    assert!(!int_fits_float((1 << 53) + 1));
    assert!(!int_fits_float(i64::MAX));
}

#[test]
fn test_truthiness() {
    assert!(!LuaValue::Nil.is_truthy());
    assert!(!LuaValue::Boolean(false).is_truthy());
    assert!(LuaValue::Boolean(true).is_truthy());
    assert!(LuaValue::Integer(0).is_truthy());
    assert!(LuaValue::Float(0.0).is_truthy());
}

#[test]
fn test_float_formatting() {
    assert_eq!(float_to_lua_string(1.0), "1.0");
    assert_eq!(float_to_lua_string(-1.0), "-1.0");
    assert_eq!(float_to_lua_string(1.5), "1.5");
    assert_eq!(float_to_lua_string(0.1), "0.1");
    assert_eq!(float_to_lua_string(100.0), "100.0");
    assert_eq!(float_to_lua_string(1e15), "1e+15");
    assert_eq!(float_to_lua_string(f64::INFINITY), "inf");
    assert_eq!(float_to_lua_string(f64::NEG_INFINITY), "-inf");
    assert_eq!(float_to_lua_string(f64::NAN), "nan");
}

#[test]
fn test_integer_display() {
    assert_eq!(LuaValue::Integer(42).display_string(), "42");
    assert_eq!(LuaValue::Integer(i64::MIN).display_string(), "-9223372036854775808");
}

#[test]
fn test_str_to_number() {
    assert_eq!(str_to_number(b"42"), Some(LuaValue::Integer(42)));
    assert_eq!(str_to_number(b"  -7  "), Some(LuaValue::Integer(-7)));
    assert_eq!(str_to_number(b"1.5"), Some(LuaValue::Float(1.5)));
    assert_eq!(str_to_number(b"0x10"), Some(LuaValue::Integer(16)));
    assert_eq!(str_to_number(b"1e2"), Some(LuaValue::Float(100.0)));
    assert_eq!(str_to_number(b""), None);
    assert_eq!(str_to_number(b"abc"), None);
    assert_eq!(str_to_number(b"1.5x"), None);
}

#[test]
fn test_coerce_integer() {
    assert_eq!(LuaValue::Float(3.0).coerce_integer(), Some(3));
    assert_eq!(LuaValue::Float(3.5).coerce_integer(), None);
    assert_eq!(LuaValue::Integer(3).coerce_integer(), Some(3));
    assert_eq!(LuaValue::Nil.coerce_integer(), None);
}

#[test]
fn test_reference_identity() {
    let mut vm = crate::lua_vm::LuaVM::new();
    let t1 = vm.create_table(0, 0);
    let t2 = vm.create_table(0, 0);
    assert!(t1.raw_eq(&t1.clone()));
    assert!(!t1.raw_eq(&t2));
    let s1 = vm.create_string("hello");
    let s2 = vm.create_string("hello");
    // Interned: equal by content (and identity).
    assert!(s1.raw_eq(&s2));
}
