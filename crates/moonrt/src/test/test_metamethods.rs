// Metamethod resolution: __index/__newindex chains, arithmetic events,
// __eq identity, comparison and __call.

use crate::lua_value::LuaValue;
use crate::lua_vm::dispatcher::{index_value, newindex_value, values_eq, values_lt};
use crate::lua_vm::{CallArgs, LuaResult, LuaVM, OpCode};

use super::support::{int, new_vm, set_meta_field, table_with_meta, ChunkBuilder};

#[test]
fn test_index_table_chain() {
    let mut vm = new_vm();
    let (t, mt) = table_with_meta(&mut vm);
    let fallback = vm.create_table(0, 1);
    let key = vm.create_string("k");
    if let Some(f) = fallback.as_table() {
        f.borrow_mut().raw_set(&key, int(7)).unwrap();
    }
    set_meta_field(&mut vm, &mt, "__index", fallback);

    let v = index_value(&mut vm, t.clone(), key.clone()).unwrap();
    assert_eq!(v, int(7));

    // A raw hit shadows the chain.
    if let Some(tt) = t.as_table() {
        tt.borrow_mut().raw_set(&key, int(1)).unwrap();
    }
    let v = index_value(&mut vm, t, key).unwrap();
    assert_eq!(v, int(1));
}

#[test]
fn test_index_function_handler() {
    fn index_fn(_vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        // returns the key doubled when it is an integer
        let k = a.arg(1).coerce_integer().unwrap_or(0);
        Ok(vec![int(k * 2)])
    }
    let mut vm = new_vm();
    let (t, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("index_fn", index_fn);
    set_meta_field(&mut vm, &mt, "__index", handler);

    let v = index_value(&mut vm, t, int(21)).unwrap();
    assert_eq!(v, int(42));
}

#[test]
fn test_index_non_table_errors_without_handler() {
    let mut vm = new_vm();
    let err = index_value(&mut vm, int(3), int(1)).unwrap_err();
    assert!(vm
        .describe_error(&err)
        .contains("attempt to index a number value"));
}

#[test]
fn test_newindex_function_handler() {
    fn newindex_fn(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        // records the write into a side table stored as a global
        let log = vm.get_global("log");
        if let Some(t) = log.as_table() {
            t.borrow_mut().raw_set(&a.arg(1), a.arg(2)).unwrap();
        }
        Ok(Vec::new())
    }
    let mut vm = new_vm();
    let log = vm.create_table(0, 1);
    vm.set_global("log", log.clone());
    let (t, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("newindex_fn", newindex_fn);
    set_meta_field(&mut vm, &mt, "__newindex", handler);

    newindex_value(&mut vm, t.clone(), int(1), int(10)).unwrap();
    // The handler intercepted: the table itself stays empty.
    assert_eq!(t.as_table().unwrap().borrow().raw_geti(1), LuaValue::Nil);
    assert_eq!(log.as_table().unwrap().borrow().raw_geti(1), int(10));

    // Existing keys bypass __newindex.
    if let Some(tt) = t.as_table() {
        tt.borrow_mut().raw_seti(2, int(1));
    }
    newindex_value(&mut vm, t.clone(), int(2), int(99)).unwrap();
    assert_eq!(t.as_table().unwrap().borrow().raw_geti(2), int(99));
}

#[test]
fn test_arith_metamethod() {
    fn add_fn(_vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        Ok(vec![int(1000)])
    }
    let mut vm = new_vm();
    let (t, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("add_fn", add_fn);
    set_meta_field(&mut vm, &mt, "__add", handler);
    vm.set_global("t", t);

    let mut b = ChunkBuilder::new("main").env_upvalue();
    let kt = b.k_str(&mut vm, "t");
    let k1 = b.k_int(1);
    let rk1 = b.rk(k1);
    b.abx(OpCode::GetGlobal, 0, kt);
    b.abc(OpCode::Add, 1, 0, rk1); // t + 1 -> __add
    b.abc(OpCode::Add, 2, rk1, 0); // 1 + t -> right operand's __add
    b.ret(1, 2);
    let r = vm.execute(b.build()).unwrap();
    assert_eq!(r, vec![int(1000), int(1000)]);
}

#[test]
fn test_arith_without_metamethod_errors() {
    let mut vm = new_vm();
    let t = vm.create_table(0, 0);
    vm.set_global("t", t);
    let mut b = ChunkBuilder::new("main").env_upvalue();
    let kt = b.k_str(&mut vm, "t");
    let k1 = b.k_int(1);
    let rk1 = b.rk(k1);
    b.abx(OpCode::GetGlobal, 0, kt);
    b.abc(OpCode::Add, 1, 0, rk1);
    b.ret_none();
    let err = vm.execute(b.build()).unwrap_err();
    assert!(vm
        .describe_error(&err)
        .contains("attempt to perform arithmetic on a table value"));
}

#[test]
fn test_eq_requires_same_metatable() {
    fn always_true(_vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        Ok(vec![LuaValue::Boolean(true)])
    }
    let mut vm = new_vm();

    let (a, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("always_true", always_true);
    set_meta_field(&mut vm, &mt, "__eq", handler);

    // b shares the same metatable reference: __eq fires.
    let b = vm.create_table(0, 0);
    if let Some(bt) = b.as_table() {
        bt.borrow_mut().set_metatable(Some(mt.clone()));
    }
    assert!(values_eq(&mut vm, &a, &b).unwrap());

    // c has a different metatable carrying the same handler: no __eq.
    let (c, mt2) = table_with_meta(&mut vm);
    let handler2 = vm.create_native("always_true", always_true);
    set_meta_field(&mut vm, &mt2, "__eq", handler2);
    assert!(!values_eq(&mut vm, &a, &c).unwrap());

    // Identity still short-circuits.
    assert!(values_eq(&mut vm, &a, &a.clone()).unwrap());
}

#[test]
fn test_lt_metamethod_and_error() {
    fn lt_fn(_vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        // compare by array slot 1
        let rank = |v: &LuaValue| {
            v.as_table()
                .map(|t| t.borrow().raw_geti(1).coerce_integer().unwrap_or(0))
                .unwrap_or(0)
        };
        let l = rank(&a.arg(0));
        let r = rank(&a.arg(1));
        Ok(vec![LuaValue::Boolean(l < r)])
    }
    let mut vm = new_vm();
    let (a, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("lt_fn", lt_fn);
    set_meta_field(&mut vm, &mt, "__lt", handler);
    let b = vm.create_table(0, 0);
    if let Some(t) = a.as_table() {
        t.borrow_mut().raw_seti(1, int(1));
    }
    if let Some(t) = b.as_table() {
        t.borrow_mut().raw_seti(1, int(2));
    }
    assert!(values_lt(&mut vm, &a, &b).unwrap());
    assert!(!values_lt(&mut vm, &b, &a).unwrap());

    // Comparing across unrelated types without a handler errors.
    let s = vm.create_string("x");
    let err = values_lt(&mut vm, &int(1), &s).unwrap_err();
    assert!(vm
        .describe_error(&err)
        .contains("attempt to compare number with string"));
}

#[test]
fn test_call_metamethod() {
    fn invoked(_vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        // first argument is the callee value itself
        assert!(a.arg(0).is_table());
        Ok(vec![a.arg(1)])
    }
    let mut vm = new_vm();
    let (t, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("invoked", invoked);
    set_meta_field(&mut vm, &mt, "__call", handler);

    let r = vm.call(t, vec![int(5)]).unwrap();
    assert_eq!(r, vec![int(5)]);
}

#[test]
fn test_len_metamethod() {
    fn len_fn(_vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        Ok(vec![int(1234)])
    }
    let mut vm = new_vm();
    let (t, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("len_fn", len_fn);
    set_meta_field(&mut vm, &mt, "__len", handler);
    vm.set_global("t", t);

    let mut b = ChunkBuilder::new("main").env_upvalue();
    let kt = b.k_str(&mut vm, "t");
    b.abx(OpCode::GetGlobal, 0, kt);
    b.abc(OpCode::Len, 1, 0, 0);
    b.ret(1, 1);
    let r = vm.execute(b.build()).unwrap();
    assert_eq!(r, vec![int(1234)]);
}

#[test]
fn test_concat_metamethod() {
    fn concat_fn(vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
        Ok(vec![vm.create_string("glued")])
    }
    let mut vm = new_vm();
    let (t, mt) = table_with_meta(&mut vm);
    let handler = vm.create_native("concat_fn", concat_fn);
    set_meta_field(&mut vm, &mt, "__concat", handler);
    vm.set_global("t", t);

    let mut b = ChunkBuilder::new("main").env_upvalue();
    let kt = b.k_str(&mut vm, "t");
    let ks = b.k_str(&mut vm, "s");
    b.abx(OpCode::GetGlobal, 0, kt);
    b.abx(OpCode::LoadK, 1, ks);
    b.abc(OpCode::Concat, 2, 0, 1);
    b.ret(2, 1);
    let r = vm.execute(b.build()).unwrap();
    assert_eq!(r[0].display_string(), "glued");
}
