// Debug hooks and stack inspection.
//
// Hooks are per-thread: a mask over {call, return, line, count} plus a
// count period. The trampoline calls in here around dispatch; a hook
// running suppresses further hooks until it returns.

use smol_str::SmolStr;

use crate::lua_value::{LuaFunction, LuaValue};
use crate::lua_vm::execute::call::call_function;
use crate::lua_vm::{ExecContext, LuaResult, LuaVM};

/// One level of the inspectable stack, innermost first.
#[derive(Clone)]
pub struct DebugFrame {
    pub source: SmolStr,
    pub line: u32,
    pub what: &'static str,
    pub name: SmolStr,
}

/// The current thread's stack as `debug.getinfo` sees it. Because every
/// live frame (including __close owner frames and any frames a running
/// hook has pushed) sits in the exec stack or is current, this view is
/// already the composition the hook model asks for.
pub fn stack_view(vm: &mut LuaVM) -> LuaResult<Vec<DebugFrame>> {
    let mut out = Vec::new();
    if let Some(fid) = vm.current_frame {
        out.push(frame_info(vm, fid)?);
    }
    for ctx in vm.exec_stack.iter().rev() {
        let fid = match ctx {
            ExecContext::Call { frame, .. } => *frame,
            ExecContext::Close(cs) => cs.frame,
        };
        out.push(frame_info(vm, fid)?);
    }
    Ok(out)
}

fn frame_info(vm: &LuaVM, fid: crate::lua_vm::FrameId) -> LuaResult<DebugFrame> {
    let frame = vm.frame(fid);
    let name = match frame.function.as_function().map(|f| &**f) {
        Some(LuaFunction::Lua(c)) => c.chunk.source.clone(),
        Some(LuaFunction::Native(n)) => n.name.clone(),
        None => SmolStr::new("?"),
    };
    Ok(DebugFrame {
        source: frame.chunk.source.clone(),
        line: frame.line(),
        what: "Lua",
        name,
    })
}

/// Count and line hooks, fired before dispatching one instruction.
pub fn instruction_hooks(vm: &mut LuaVM) -> LuaResult<()> {
    let thread = vm.current_thread.clone();
    let Some(thread) = thread.as_thread() else {
        return Ok(());
    };

    let (count_due, line_due, line) = {
        let mut th = thread.borrow_mut();
        if th.hooks.in_hook || !th.hooks.is_set() {
            return Ok(());
        }
        let mut count_due = false;
        if th.hooks.count > 0 {
            th.hooks.counter += 1;
            if th.hooks.counter >= th.hooks.count {
                th.hooks.counter = 0;
                count_due = true;
            }
        }
        let mut line_due = false;
        let mut line = 0;
        if th.hooks.mask.line {
            if let Some(fid) = vm.current_frame {
                line = vm.frame(fid).line();
                if th.hooks.last_line != Some(line) {
                    th.hooks.last_line = Some(line);
                    line_due = true;
                }
            }
        }
        (count_due, line_due, line)
    };

    if count_due {
        fire_hook(vm, "count", None)?;
    }
    if line_due {
        fire_hook(vm, "line", Some(line))?;
    }
    Ok(())
}

pub fn hook_call(vm: &mut LuaVM) -> LuaResult<()> {
    if masked(vm, |m| m.call) {
        fire_hook(vm, "call", None)?;
    }
    Ok(())
}

pub fn hook_return(vm: &mut LuaVM) -> LuaResult<()> {
    if masked(vm, |m| m.ret) {
        fire_hook(vm, "return", None)?;
    }
    Ok(())
}

fn masked(vm: &LuaVM, pick: impl Fn(&crate::lua_value::HookMask) -> bool) -> bool {
    match vm.current_thread.as_thread() {
        Some(t) => {
            let th = t.borrow();
            !th.hooks.in_hook && th.hooks.func.is_some() && pick(&th.hooks.mask)
        }
        None => false,
    }
}

/// Invoke the hook function with (event, line). Re-entrance is
/// suppressed for the duration; hook errors propagate as runtime errors.
fn fire_hook(vm: &mut LuaVM, event: &str, line: Option<u32>) -> LuaResult<()> {
    let thread = vm.current_thread.clone();
    let Some(thread) = thread.as_thread() else {
        return Ok(());
    };
    let func = {
        let mut th = thread.borrow_mut();
        let Some(f) = th.hooks.func.clone() else {
            return Ok(());
        };
        th.hooks.in_hook = true;
        f
    };
    let event_val = vm.create_string(event);
    let line_val = match line {
        Some(l) => LuaValue::Integer(l as i64),
        None => LuaValue::Nil,
    };
    let result = call_function(vm, func, vec![event_val, line_val]);
    thread.borrow_mut().hooks.in_hook = false;
    result.map(|_| ())
}
