// Base library - global functions
// Implements: print, type, tostring, tonumber, raw*, metatable access,
// iteration, select, assert, error, pcall, xpcall.

use crate::lib_registry::{LibraryEntry, LibraryModule};
use crate::lua_value::{str_to_number, LuaValue};
use crate::lua_vm::dispatcher::index_value;
use crate::lua_vm::{get_metatable, CallArgs, LuaResult, LuaVM};

pub fn create_basic_lib() -> LibraryModule {
    let mut module = crate::lib_module!("_G", {
        "print" => basic_print,
        "type" => basic_type,
        "tostring" => basic_tostring,
        "tonumber" => basic_tonumber,
        "rawget" => basic_rawget,
        "rawset" => basic_rawset,
        "rawequal" => basic_rawequal,
        "rawlen" => basic_rawlen,
        "setmetatable" => basic_setmetatable,
        "getmetatable" => basic_getmetatable,
        "next" => basic_next,
        "pairs" => basic_pairs,
        "ipairs" => basic_ipairs,
        "select" => basic_select,
        "assert" => basic_assert,
        "error" => basic_error,
        "pcall" => basic_pcall,
        "xpcall" => basic_xpcall,
    });
    module
        .entries
        .push(("_VERSION", LibraryEntry::Value(|vm| vm.create_string("Lua 5.4"))));
    module
}

/// tostring with the __tostring / __name protocol.
pub fn tostring_value(vm: &mut LuaVM, v: &LuaValue) -> LuaResult<LuaValue> {
    if let Some(mt) = get_metatable(vm, v) {
        let key = LuaValue::String(vm.const_strings.tm_tostring.clone());
        let handler = mt
            .as_table()
            .map(|t| t.borrow().raw_get(&key))
            .unwrap_or(LuaValue::Nil);
        if !handler.is_nil() {
            let results = vm.call(handler, vec![v.clone()])?;
            let first = results.into_iter().next().unwrap_or(LuaValue::Nil);
            if !first.is_string() {
                return Err(vm.rt_error("'__tostring' must return a string"));
            }
            return Ok(first);
        }
    }
    if let Some(mt) = get_metatable(vm, v) {
        let name_key = LuaValue::String(vm.const_strings.tm_name.clone());
        if let Some(t) = mt.as_table() {
            let name = t.borrow().raw_get(&name_key);
            if let LuaValue::String(s) = name {
                let text = format!("{}: 0x{:012x}", s, v.identity_addr());
                return Ok(vm.create_string(&text));
            }
        }
    }
    let text = v.display_string();
    Ok(vm.create_string(&text))
}

fn basic_print(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let mut line = String::new();
    for (i, v) in a.args.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        let s = tostring_value(vm, v)?;
        line.push_str(&s.display_string());
    }
    println!("{}", line);
    Ok(Vec::new())
}

fn basic_type(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    if a.args.is_empty() {
        return Err(vm.rt_error("bad argument #1 to 'type' (value expected)"));
    }
    let name = a.arg(0).type_name();
    Ok(vec![vm.create_string(name)])
}

fn basic_tostring(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = a.arg(0);
    Ok(vec![tostring_value(vm, &v)?])
}

fn basic_tonumber(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = a.arg(0);
    if a.args.len() < 2 || a.arg(1).is_nil() {
        let r = match &v {
            LuaValue::Integer(_) | LuaValue::Float(_) => v.clone(),
            LuaValue::String(s) => str_to_number(s.as_bytes()).unwrap_or(LuaValue::Nil),
            _ => LuaValue::Nil,
        };
        return Ok(vec![r]);
    }
    let base = match a.arg(1).coerce_integer() {
        Some(b) if (2..=36).contains(&b) => b as u32,
        _ => return Err(vm.rt_error("bad argument #2 to 'tonumber' (base out of range)")),
    };
    let LuaValue::String(s) = v else {
        return Err(vm.rt_error("bad argument #1 to 'tonumber' (string expected)"));
    };
    let text = match s.to_str() {
        Some(t) => t.trim(),
        None => return Ok(vec![LuaValue::Nil]),
    };
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() {
        return Ok(vec![LuaValue::Nil]);
    }
    let mut acc: i64 = 0;
    for ch in digits.chars() {
        let Some(d) = ch.to_digit(base) else {
            return Ok(vec![LuaValue::Nil]);
        };
        acc = acc.wrapping_mul(base as i64).wrapping_add(d as i64);
    }
    Ok(vec![LuaValue::Integer(if neg { acc.wrapping_neg() } else { acc })])
}

fn check_table(vm: &mut LuaVM, a: &CallArgs, i: usize, who: &str) -> LuaResult<LuaValue> {
    let v = a.arg(i);
    if v.is_table() {
        Ok(v)
    } else {
        Err(vm.rt_error(format!(
            "bad argument #{} to '{}' (table expected, got {})",
            i + 1,
            who,
            v.type_name()
        )))
    }
}

fn basic_rawget(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, 0, "rawget")?;
    let v = match t.as_table() {
        Some(t) => t.borrow().raw_get(&a.arg(1)),
        None => LuaValue::Nil,
    };
    Ok(vec![v])
}

fn basic_rawset(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, 0, "rawset")?;
    if let Some(tt) = t.as_table() {
        let result = tt.borrow_mut().raw_set(&a.arg(1), a.arg(2));
        result.map_err(|e| vm.rt_error(e.message()))?;
    }
    Ok(vec![t])
}

fn basic_rawequal(_vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    Ok(vec![LuaValue::Boolean(a.arg(0).raw_eq(&a.arg(1)))])
}

fn basic_rawlen(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = a.arg(0);
    let len = match &v {
        LuaValue::String(s) => s.len() as i64,
        LuaValue::Table(t) => t.borrow().len(),
        _ => {
            return Err(vm.rt_error("table or string expected"));
        }
    };
    Ok(vec![LuaValue::Integer(len)])
}

fn basic_setmetatable(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, 0, "setmetatable")?;
    let mt = a.arg(1);
    if !mt.is_nil() && !mt.is_table() {
        return Err(vm.rt_error("bad argument #2 to 'setmetatable' (nil or table expected)"));
    }
    // A protected metatable cannot be replaced.
    if let Some(old) = get_metatable(vm, &t) {
        let key = LuaValue::String(vm.const_strings.tm_metatable.clone());
        if let Some(old_t) = old.as_table() {
            if !old_t.borrow().raw_get(&key).is_nil() {
                return Err(vm.rt_error("cannot change a protected metatable"));
            }
        }
    }
    if let Some(tt) = t.as_table() {
        tt.borrow_mut()
            .set_metatable(if mt.is_nil() { None } else { Some(mt) });
    }
    Ok(vec![t])
}

fn basic_getmetatable(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = a.arg(0);
    let Some(mt) = get_metatable(vm, &v) else {
        return Ok(vec![LuaValue::Nil]);
    };
    let key = LuaValue::String(vm.const_strings.tm_metatable.clone());
    if let Some(t) = mt.as_table() {
        let protected = t.borrow().raw_get(&key);
        if !protected.is_nil() {
            return Ok(vec![protected]);
        }
    }
    Ok(vec![mt])
}

fn basic_next(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = check_table(vm, &a, 0, "next")?;
    let key = a.arg(1);
    let result = match t.as_table() {
        Some(tt) => tt.borrow().next(&key),
        None => Ok(None),
    };
    match result {
        Ok(Some((k, v))) => Ok(vec![k, v]),
        Ok(None) => Ok(vec![LuaValue::Nil]),
        Err(e) => Err(vm.rt_error(e.message())),
    }
}

fn basic_pairs(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = a.arg(0);
    let pairs_key = vm.const_strings.tm_pairs.clone();
    if let Some(mt) = get_metatable(vm, &t) {
        if let Some(mtt) = mt.as_table() {
            let handler = mtt.borrow().raw_get(&LuaValue::String(pairs_key));
            if !handler.is_nil() {
                let mut results = vm.call(handler, vec![t])?;
                results.resize(3, LuaValue::Nil);
                return Ok(results);
            }
        }
    }
    if !t.is_table() {
        return Err(vm.rt_error(format!(
            "bad argument #1 to 'pairs' (table expected, got {})",
            t.type_name()
        )));
    }
    let next = vm.create_native("next", basic_next);
    Ok(vec![next, t, LuaValue::Nil])
}

fn ipairs_iterator(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = a.arg(0);
    let i = a.arg(1).coerce_integer().unwrap_or(0) + 1;
    let v = index_value(vm, t, LuaValue::Integer(i))?;
    if v.is_nil() {
        Ok(vec![LuaValue::Nil])
    } else {
        Ok(vec![LuaValue::Integer(i), v])
    }
}

fn basic_ipairs(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let t = a.arg(0);
    if t.is_nil() {
        return Err(vm.rt_error("bad argument #1 to 'ipairs' (table expected, got nil)"));
    }
    let iter = vm.create_native("ipairs_iterator", ipairs_iterator);
    Ok(vec![iter, t, LuaValue::Integer(0)])
}

fn basic_select(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let n = a.arg(0);
    if let LuaValue::String(s) = &n {
        if s.as_bytes() == b"#" {
            return Ok(vec![LuaValue::Integer(a.args.len() as i64 - 1)]);
        }
    }
    let Some(mut i) = n.coerce_integer() else {
        return Err(vm.rt_error("bad argument #1 to 'select' (number expected)"));
    };
    let rest = a.args.len() as i64 - 1;
    if i < 0 {
        i += rest + 1;
    }
    if i < 1 {
        return Err(vm.rt_error("bad argument #1 to 'select' (index out of range)"));
    }
    Ok(a.args.into_iter().skip(i as usize).collect())
}

fn basic_assert(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    if a.arg(0).is_truthy() {
        return Ok(a.args);
    }
    match a.args.get(1) {
        Some(msg) => Err(vm.error_from_value(msg.clone())),
        None => Err(vm.rt_error("assertion failed!")),
    }
}

/// error(v, level): string values get a "source:line:" prefix for the
/// frame `level` levels up (level 0 suppresses the annotation).
fn basic_error(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = a.arg(0);
    let level = a.arg(1).coerce_integer().unwrap_or(1);
    if level > 0 {
        if let LuaValue::String(s) = &v {
            if let Some((source, line)) = vm.location_at_level(level as usize - 1) {
                let text = format!("{}:{}: {}", source, line, s);
                let annotated = vm.create_string(&text);
                return Err(vm.error_from_value(annotated));
            }
        }
    }
    Err(vm.error_from_value(v))
}

fn basic_pcall(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    if a.args.is_empty() {
        return Err(vm.rt_error("bad argument #1 to 'pcall' (value expected)"));
    }
    let mut args = a.args;
    let func = args.remove(0);
    let (ok, mut values) = vm.protected_call(func, args)?;
    let mut out = Vec::with_capacity(values.len() + 1);
    out.push(LuaValue::Boolean(ok));
    out.append(&mut values);
    Ok(out)
}

fn basic_xpcall(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    if a.args.len() < 2 {
        return Err(vm.rt_error("bad argument #2 to 'xpcall' (value expected)"));
    }
    let mut args = a.args;
    let func = args.remove(0);
    let handler = args.remove(0);
    let (ok, mut values) = vm.protected_call_with_handler(func, args, handler)?;
    let mut out = Vec::with_capacity(values.len() + 1);
    out.push(LuaValue::Boolean(ok));
    out.append(&mut values);
    Ok(out)
}
