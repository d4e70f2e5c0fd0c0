// Coroutine library
// Implements: create, resume, yield, status, running, isyieldable, wrap, close

use std::rc::Rc;

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, ThreadStatus};
use crate::lua_vm::{CallArgs, LuaError, LuaResult, LuaVM};

pub fn create_coroutine_lib() -> LibraryModule {
    crate::lib_module!("coroutine", {
        "create" => coroutine_create,
        "resume" => coroutine_resume,
        "yield" => coroutine_yield,
        "status" => coroutine_status,
        "running" => coroutine_running,
        "isyieldable" => coroutine_isyieldable,
        "wrap" => coroutine_wrap,
        "close" => coroutine_close,
    })
}

fn check_thread(vm: &mut LuaVM, a: &CallArgs, who: &str) -> LuaResult<LuaValue> {
    let v = a.arg(0);
    if v.is_thread() {
        Ok(v)
    } else {
        Err(vm.rt_error(format!(
            "bad argument #1 to '{}' (coroutine expected)",
            who
        )))
    }
}

fn coroutine_create(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let func = a.arg(0);
    if !func.is_function() {
        return Err(vm.rt_error("bad argument #1 to 'create' (function expected)"));
    }
    Ok(vec![vm.create_thread(func)?])
}

/// resume never raises for errors inside the coroutine: they surface as
/// (false, error value).
fn coroutine_resume(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let thread = check_thread(vm, &a, "resume")?;
    let args = a.args.into_iter().skip(1).collect();
    match vm.resume_thread(thread, args) {
        Ok((_finished, mut values)) => {
            let mut out = Vec::with_capacity(values.len() + 1);
            out.push(LuaValue::Boolean(true));
            out.append(&mut values);
            Ok(out)
        }
        Err(LuaError::Runtime(e)) => Ok(vec![LuaValue::Boolean(false), e.value]),
        Err(y) => Err(y),
    }
}

fn coroutine_yield(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    Err(vm.do_yield(a.args))
}

fn coroutine_status(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let thread = check_thread(vm, &a, "status")?;
    let name = if let (Some(t), Some(cur)) = (thread.as_thread(), vm.current_thread().as_thread())
    {
        if Rc::ptr_eq(t, cur) {
            "running"
        } else {
            t.borrow().status.name()
        }
    } else {
        ThreadStatus::Dead.name()
    };
    Ok(vec![vm.create_string(name)])
}

fn coroutine_running(vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let current = vm.current_thread();
    let is_main = current
        .as_thread()
        .map(|t| t.borrow().is_main)
        .unwrap_or(true);
    Ok(vec![current, LuaValue::Boolean(is_main)])
}

fn coroutine_isyieldable(vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    Ok(vec![LuaValue::Boolean(vm.can_yield())])
}

/// The wrapped resume: errors re-raise in the caller instead of
/// returning a status flag.
fn wrap_invoke(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let thread = a.upvalue(0);
    vm.resume_thread(thread, a.args).map(|(_, values)| values)
}

fn coroutine_wrap(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let func = a.arg(0);
    if !func.is_function() {
        return Err(vm.rt_error("bad argument #1 to 'wrap' (function expected)"));
    }
    let thread = vm.create_thread(func)?;
    Ok(vec![vm.create_native_closure("wrap", wrap_invoke, vec![thread])])
}

fn coroutine_close(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let thread = check_thread(vm, &a, "close")?;
    match vm.close_thread(thread) {
        Ok(()) => Ok(vec![LuaValue::Boolean(true)]),
        Err(LuaError::Runtime(e)) => Ok(vec![LuaValue::Boolean(false), e.value]),
        Err(y) => Err(y),
    }
}
