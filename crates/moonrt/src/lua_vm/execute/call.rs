// Call plumbing shared by the dispatcher, the trampoline and native code.
//
// Native functions run directly on the host stack. Lua closures called
// from native code (pcall, metamethods, hooks) re-enter the trampoline
// with a watermark; that re-entry is a C-call boundary for yields.

use crate::lua_value::{LuaFunction, LuaValue};
use crate::lua_vm::opcode::{Instruction, OpCode};
use crate::lua_vm::{CallArgs, FrameId, LuaResult, LuaVM};

use super::lua_execute;
use super::metamethod::{get_metamethod_event, TmKind};
use super::Entry;

/// Resolve a value to something invocable, following the __call chain by
/// prepending the callee to the argument list.
pub fn resolve_callable(
    vm: &mut LuaVM,
    mut func: LuaValue,
    args: &mut Vec<LuaValue>,
) -> LuaResult<LuaValue> {
    let mut hops = 0;
    while !func.is_function() {
        hops += 1;
        if hops > vm.limits.max_meta_chain {
            return Err(vm.rt_error("'__call' chain too long; possible loop"));
        }
        match get_metamethod_event(vm, &func, TmKind::Call) {
            Some(handler) => {
                args.insert(0, func);
                func = handler;
            }
            None => {
                return Err(vm.rt_error(format!(
                    "attempt to call a {} value",
                    func.type_name()
                )));
            }
        }
    }
    Ok(func)
}

/// Invoke a native function. `func` must hold LuaFunction::Native.
pub fn call_native(
    vm: &mut LuaVM,
    func: &LuaValue,
    args: Vec<LuaValue>,
) -> LuaResult<Vec<LuaValue>> {
    vm.check_call_depth()?;
    let (f, upvalues) = match func.as_function().map(|f| &**f) {
        Some(LuaFunction::Native(n)) => (n.func, n.upvalues.clone()),
        _ => return Err(vm.rt_error("attempt to call a non-native value natively")),
    };
    vm.native_depth += 1;
    let result = f(vm, CallArgs { args, upvalues });
    vm.native_depth -= 1;
    result
}

/// Build a frame for a Lua closure and make it current. `func` must hold
/// LuaFunction::Lua.
pub fn push_lua_frame(vm: &mut LuaVM, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<FrameId> {
    let (chunk, upvalues) = match func.as_function().map(|f| &**f) {
        Some(LuaFunction::Lua(c)) => (c.chunk.clone(), c.upvalues.clone()),
        _ => return Err(vm.rt_error("attempt to execute a non-Lua function")),
    };
    let frame = crate::lua_vm::LuaFrame::new(func, chunk, upvalues, args);
    let fid = vm.frames.insert(frame);
    vm.current_frame = Some(fid);
    Ok(fid)
}

/// Call any value from native context and run it to completion. This is
/// the protected-call workhorse: errors inside unwind only frames pushed
/// here, and a yield crossing this boundary is refused by `do_yield`.
pub fn call_function(
    vm: &mut LuaVM,
    func: LuaValue,
    mut args: Vec<LuaValue>,
) -> LuaResult<Vec<LuaValue>> {
    let func = resolve_callable(vm, func, &mut args)?;
    let is_native = matches!(func.as_function().map(|f| &**f), Some(LuaFunction::Native(_)));
    if is_native {
        return call_native(vm, &func, args);
    }

    vm.check_call_depth()?;
    let saved_frame = vm.current_frame.take();
    let watermark = vm.exec_stack.len();
    vm.native_depth += 1;
    vm.c_boundary += 1;

    let result = match push_lua_frame(vm, func, args) {
        Ok(_) => lua_execute(vm, watermark, Entry::Dispatch),
        Err(e) => Err(e),
    };

    vm.c_boundary -= 1;
    vm.native_depth -= 1;
    vm.current_frame = saved_frame;
    result
}

/// The ResultStorage protocol: write a callee's results into the caller
/// frame as the instruction at `call_pc` demands.
///
/// Fixed wanted count (CALL with C > 0): exactly C-1 slots starting at A,
/// nil padded, surplus callee results cleared, `top` reset. Variable
/// (C == 0): all results, `top` = A + len.
pub fn store_call_results(
    vm: &mut LuaVM,
    fid: FrameId,
    call_pc: usize,
    results: Vec<LuaValue>,
) -> LuaResult<()> {
    let Some(instr) = vm.frame(fid).chunk.code.get(call_pc).copied() else {
        return Err(vm.rt_error("call site out of code bounds"));
    };
    let op = Instruction::get_opcode(instr);
    let a = Instruction::get_a(instr);
    let c = Instruction::get_c(instr);
    match op {
        OpCode::Call => {
            let frame = vm.frame_mut(fid);
            if c == 0 {
                let n = results.len();
                for (i, v) in results.into_iter().enumerate() {
                    frame.set_reg(a + i, v);
                }
                frame.top = a + n;
            } else {
                let want = c - 1;
                let got = results.len();
                let mut it = results.into_iter();
                for i in 0..want {
                    let v = it.next().unwrap_or(LuaValue::Nil);
                    frame.set_reg(a + i, v);
                }
                for i in want..got {
                    frame.set_reg(a + i, LuaValue::Nil);
                }
                frame.top = 0;
            }
            Ok(())
        }
        OpCode::TForCall => {
            let frame = vm.frame_mut(fid);
            let mut it = results.into_iter();
            for i in 0..c {
                let v = it.next().unwrap_or(LuaValue::Nil);
                frame.set_reg(a + 4 + i, v);
            }
            frame.top = 0;
            Ok(())
        }
        other => Err(vm.rt_error(format!("cannot store call results at opcode {:?}", other))),
    }
}
