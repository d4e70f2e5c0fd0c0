// Table semantics: array/hash split, border, key normalization and
// stateless iteration.

use crate::lua_value::{LuaTable, LuaValue, TableKeyError};

fn s(vm: &mut crate::LuaVM, text: &str) -> LuaValue {
    vm.create_string(text)
}

#[test]
fn test_array_part_basics() {
    let mut t = LuaTable::new();
    t.raw_seti(1, LuaValue::Integer(10));
    t.raw_seti(2, LuaValue::Integer(20));
    t.raw_seti(3, LuaValue::Integer(30));
    assert_eq!(t.raw_geti(2), LuaValue::Integer(20));
    assert_eq!(t.len(), 3);
    assert_eq!(t.raw_geti(4), LuaValue::Nil);
}

#[test]
fn test_nil_write_deletes() {
    let mut t = LuaTable::new();
    t.raw_seti(1, LuaValue::Integer(10));
    t.raw_seti(1, LuaValue::Nil);
    assert_eq!(t.raw_geti(1), LuaValue::Nil);
    assert_eq!(t.len(), 0);
}

#[test]
fn test_hash_to_array_migration() {
    let mut t = LuaTable::new();
    // 2 and 3 land in the hash part first.
    t.raw_seti(2, LuaValue::Integer(2));
    t.raw_seti(3, LuaValue::Integer(3));
    assert_eq!(t.len(), 0);
    // Appending 1 migrates them into the array part.
    t.raw_seti(1, LuaValue::Integer(1));
    assert_eq!(t.len(), 3);
    assert_eq!(t.raw_geti(3), LuaValue::Integer(3));
}

#[test]
fn test_nil_key_rejected_nan_key_rejected() {
    let mut t = LuaTable::new();
    assert_eq!(
        t.raw_set(&LuaValue::Nil, LuaValue::Integer(1)),
        Err(TableKeyError::NilIndex)
    );
    assert_eq!(
        t.raw_set(&LuaValue::Float(f64::NAN), LuaValue::Integer(1)),
        Err(TableKeyError::NanIndex)
    );
    // Reads with bad keys are just nil.
    assert_eq!(t.raw_get(&LuaValue::Nil), LuaValue::Nil);
    assert_eq!(t.raw_get(&LuaValue::Float(f64::NAN)), LuaValue::Nil);
}

#[test]
fn test_float_key_normalization() {
    let mut t = LuaTable::new();
    // t[2.0] and t[2] are the same slot.
    t.raw_set(&LuaValue::Float(2.0), LuaValue::Integer(99)).unwrap();
    assert_eq!(t.raw_geti(2), LuaValue::Integer(99));
    // -0.0 normalizes to 0.
    t.raw_set(&LuaValue::Float(-0.0), LuaValue::Integer(7)).unwrap();
    assert_eq!(t.raw_geti(0), LuaValue::Integer(7));
}

#[test]
fn test_string_keys() {
    let mut vm = crate::LuaVM::new();
    let mut t = LuaTable::new();
    let k1 = s(&mut vm, "alpha");
    let k2 = s(&mut vm, "alpha");
    t.raw_set(&k1, LuaValue::Integer(5)).unwrap();
    // Content equality, not identity.
    assert_eq!(t.raw_get(&k2), LuaValue::Integer(5));
}

#[test]
fn test_reference_keys_by_identity() {
    let mut vm = crate::LuaVM::new();
    let mut t = LuaTable::new();
    let a = vm.create_table(0, 0);
    let b = vm.create_table(0, 0);
    t.raw_set(&a, LuaValue::Integer(1)).unwrap();
    assert_eq!(t.raw_get(&a), LuaValue::Integer(1));
    assert_eq!(t.raw_get(&b), LuaValue::Nil);
}

#[test]
fn test_border_with_trailing_nil() {
    let mut t = LuaTable::new();
    for i in 1..=5 {
        t.raw_seti(i, LuaValue::Integer(i));
    }
    t.raw_seti(5, LuaValue::Nil);
    let border = t.len();
    // A border: t[border] non-nil (or 0), t[border+1] nil.
    assert!(border == 4);
}

#[test]
fn test_next_covers_all_entries() {
    let mut vm = crate::LuaVM::new();
    let mut t = LuaTable::new();
    t.raw_seti(1, LuaValue::Integer(100));
    t.raw_seti(2, LuaValue::Integer(200));
    let name = s(&mut vm, "x");
    t.raw_set(&name, LuaValue::Integer(300)).unwrap();

    let mut seen = Vec::new();
    let mut key = LuaValue::Nil;
    while let Some((k, v)) = t.next(&key).unwrap() {
        seen.push(v.clone());
        key = k;
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_next_survives_deletion() {
    let mut vm = crate::LuaVM::new();
    let mut t = LuaTable::new();
    let ka = s(&mut vm, "a");
    let kb = s(&mut vm, "b");
    let kc = s(&mut vm, "c");
    t.raw_set(&ka, LuaValue::Integer(1)).unwrap();
    t.raw_set(&kb, LuaValue::Integer(2)).unwrap();
    t.raw_set(&kc, LuaValue::Integer(3)).unwrap();

    // Delete the current key mid-iteration, as Lua allows.
    let (first, _) = t.next(&LuaValue::Nil).unwrap().unwrap();
    t.raw_set(&first, LuaValue::Nil).unwrap();
    let mut count = 1;
    let mut key = first;
    while let Some((k, _)) = t.next(&key).unwrap() {
        count += 1;
        key = k;
    }
    assert_eq!(count, 3); // visited all three slots, one now deleted
}

#[test]
fn test_next_invalid_key() {
    let t = LuaTable::new();
    assert_eq!(
        t.next(&LuaValue::Integer(42)),
        Err(TableKeyError::InvalidNext)
    );
}

#[test]
fn test_unbound_hash_border() {
    let mut t = LuaTable::new();
    // No array part at all: border found through the hash part.
    let mut u = LuaTable::new();
    u.raw_seti(10, LuaValue::Integer(1));
    assert_eq!(u.len(), 0);
    t.raw_seti(1, LuaValue::Integer(1));
    assert_eq!(t.len(), 1);
}
