// Debug library
// Implements: traceback, getinfo, sethook, gethook

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::debug_info::stack_view;
use crate::lua_vm::{CallArgs, LuaResult, LuaVM};

pub fn create_debug_lib() -> LibraryModule {
    crate::lib_module!("debug", {
        "traceback" => debug_traceback,
        "getinfo" => debug_getinfo,
        "sethook" => debug_sethook,
        "gethook" => debug_gethook,
    })
}

fn debug_traceback(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let msg = match a.args.first() {
        Some(LuaValue::String(s)) => Some(s.to_string()),
        Some(v) if !v.is_nil() => {
            // Non-string messages pass through untouched, per reference.
            return Ok(vec![a.arg(0)]);
        }
        _ => None,
    };
    let mut out = String::new();
    if let Some(m) = msg {
        out.push_str(&m);
        out.push('\n');
    }
    out.push_str("stack traceback:");
    for frame in stack_view(vm)? {
        out.push_str(&format!(
            "\n\t{}:{}: in function <{}>",
            frame.source, frame.line, frame.name
        ));
    }
    Ok(vec![vm.create_string(&out)])
}

/// getinfo(level) -> table with source, currentline, what, name.
fn debug_getinfo(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let Some(level) = a.arg(0).coerce_integer() else {
        return Err(vm.rt_error("bad argument #1 to 'getinfo' (number expected)"));
    };
    if level < 0 {
        return Err(vm.rt_error("bad argument #1 to 'getinfo' (level out of range)"));
    }
    let frames = stack_view(vm)?;
    // Level 0 is getinfo's caller, the running Lua frame.
    let Some(frame) = frames.get(level as usize) else {
        return Ok(vec![LuaValue::Nil]);
    };
    let frame = frame.clone();
    let t = vm.create_table(0, 5);
    let entries: Vec<(&str, LuaValue)> = vec![
        ("source", vm.create_string(&format!("@{}", frame.source))),
        ("short_src", vm.create_string(frame.source.as_str())),
        ("currentline", LuaValue::Integer(frame.line as i64)),
        ("what", vm.create_string(frame.what)),
        ("name", vm.create_string(frame.name.as_str())),
    ];
    if let Some(tt) = t.as_table() {
        for (k, v) in entries {
            let key = LuaValue::String(vm.intern(k));
            let _ = tt.borrow_mut().raw_set(&key, v);
        }
    }
    Ok(vec![t])
}

/// sethook(f, mask, count) arms the current thread's hook; sethook()
/// clears it.
fn debug_sethook(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    if a.args.is_empty() || a.arg(0).is_nil() {
        vm.set_hook(None, "", 0, None)?;
        return Ok(Vec::new());
    }
    let func = a.arg(0);
    if !func.is_function() {
        return Err(vm.rt_error("bad argument #1 to 'sethook' (function expected)"));
    }
    let mask = match a.arg(1) {
        LuaValue::String(s) => s.to_str().unwrap_or("").to_string(),
        _ => String::new(),
    };
    let count = a.arg(2).coerce_integer().unwrap_or(0).max(0) as u32;
    vm.set_hook(None, &mask, count, Some(func))?;
    Ok(Vec::new())
}

fn debug_gethook(vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let current = vm.current_thread();
    let Some(t) = current.as_thread() else {
        return Ok(vec![LuaValue::Nil]);
    };
    let (func, mask, count) = {
        let th = t.borrow();
        let mut mask = String::new();
        if th.hooks.mask.call {
            mask.push('c');
        }
        if th.hooks.mask.ret {
            mask.push('r');
        }
        if th.hooks.mask.line {
            mask.push('l');
        }
        (th.hooks.func.clone(), mask, th.hooks.count)
    };
    match func {
        Some(f) => Ok(vec![
            f,
            vm.create_string(&mask),
            LuaValue::Integer(count as i64),
        ]),
        None => Ok(vec![LuaValue::Nil]),
    }
}
