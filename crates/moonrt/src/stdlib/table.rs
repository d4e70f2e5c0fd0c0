// Table library
// Implements: insert, remove, concat, unpack, pack

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::{CallArgs, LuaResult, LuaVM};

pub fn create_table_lib() -> LibraryModule {
    crate::lib_module!("table", {
        "insert" => table_insert,
        "remove" => table_remove,
        "concat" => table_concat,
        "unpack" => table_unpack,
        "pack" => table_pack,
    })
}

fn check_table(
    vm: &mut LuaVM,
    a: &CallArgs,
    who: &str,
) -> LuaResult<std::rc::Rc<std::cell::RefCell<crate::lua_value::LuaTable>>> {
    match a.arg(0).as_table() {
        Some(t) => Ok(t.clone()),
        None => Err(vm.rt_error(format!(
            "bad argument #1 to '{}' (table expected, got {})",
            who,
            a.arg(0).type_name()
        ))),
    }
}

fn table_insert(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, "insert")?;
    let len = t.borrow().len();
    match a.args.len() {
        2 => {
            t.borrow_mut().raw_seti(len + 1, a.arg(1));
        }
        3 => {
            let Some(pos) = a.arg(1).coerce_integer() else {
                return Err(vm.rt_error("bad argument #2 to 'insert' (number expected)"));
            };
            if pos < 1 || pos > len + 1 {
                return Err(vm.rt_error("bad argument #2 to 'insert' (position out of bounds)"));
            }
            let mut tb = t.borrow_mut();
            let mut i = len;
            while i >= pos {
                let v = tb.raw_geti(i);
                tb.raw_seti(i + 1, v);
                i -= 1;
            }
            tb.raw_seti(pos, a.arg(2));
        }
        _ => return Err(vm.rt_error("wrong number of arguments to 'insert'")),
    }
    Ok(Vec::new())
}

fn table_remove(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, "remove")?;
    let len = t.borrow().len();
    let pos = match a.args.get(1) {
        Some(p) => match p.coerce_integer() {
            Some(p) => p,
            None => return Err(vm.rt_error("bad argument #2 to 'remove' (number expected)")),
        },
        None => len,
    };
    if len == 0 && a.args.len() < 2 {
        return Ok(vec![LuaValue::Nil]);
    }
    if len > 0 && (pos < 1 || pos > len + 1) {
        return Err(vm.rt_error("bad argument #2 to 'remove' (position out of bounds)"));
    }
    let mut tb = t.borrow_mut();
    let removed = tb.raw_geti(pos);
    let mut i = pos;
    while i < len {
        let v = tb.raw_geti(i + 1);
        tb.raw_seti(i, v);
        i += 1;
    }
    if pos <= len {
        tb.raw_seti(len, LuaValue::Nil);
    }
    Ok(vec![removed])
}

fn table_concat(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, "concat")?;
    let sep: Vec<u8> = match a.args.get(1) {
        Some(LuaValue::String(s)) => s.as_bytes().to_vec(),
        Some(v) if v.is_number() => v.display_string().into_bytes(),
        _ => Vec::new(),
    };
    let len = t.borrow().len();
    let i = match a.args.get(2) {
        Some(v) => v.coerce_integer().unwrap_or(1),
        None => 1,
    };
    let j = match a.args.get(3) {
        Some(v) => v.coerce_integer().unwrap_or(len),
        None => len,
    };
    let mut out: Vec<u8> = Vec::new();
    let mut k = i;
    while k <= j {
        let v = t.borrow().raw_geti(k);
        match &v {
            LuaValue::String(s) => out.extend_from_slice(s.as_bytes()),
            LuaValue::Integer(_) | LuaValue::Float(_) => {
                out.extend_from_slice(v.display_string().as_bytes());
            }
            _ => {
                return Err(vm.rt_error(format!(
                    "invalid value (at index {}) in table for 'concat'",
                    k
                )));
            }
        }
        if k < j {
            out.extend_from_slice(&sep);
        }
        k += 1;
    }
    Ok(vec![vm.create_string_owned(out)])
}

fn table_unpack(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, "unpack")?;
    let len = t.borrow().len();
    let i = match a.args.get(1) {
        Some(v) => v.coerce_integer().unwrap_or(1),
        None => 1,
    };
    let j = match a.args.get(2) {
        Some(v) => v.coerce_integer().unwrap_or(len),
        None => len,
    };
    if j - i >= 1_000_000 {
        return Err(vm.rt_error("too many results to unpack"));
    }
    let mut out = Vec::new();
    let mut k = i;
    while k <= j {
        out.push(t.borrow().raw_geti(k));
        k += 1;
    }
    Ok(out)
}

fn table_pack(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let n = a.args.len();
    let t = vm.create_table(n, 1);
    if let Some(tt) = t.as_table() {
        let mut tb = tt.borrow_mut();
        for (i, v) in a.args.into_iter().enumerate() {
            tb.raw_seti(i as i64 + 1, v);
        }
    }
    let n_key = vm.create_string("n");
    if let Some(tt) = t.as_table() {
        let _ = tt.borrow_mut().raw_set(&n_key, LuaValue::Integer(n as i64));
    }
    Ok(vec![t])
}
