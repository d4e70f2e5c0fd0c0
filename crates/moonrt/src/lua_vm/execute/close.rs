// The to-be-closed engine.
//
// Handlers fire in reverse declaration order. A handler is a call driven
// by the trampoline itself: its continuation lives on the exec stack as
// ExecContext::Close, which is what lets a yield inside __close suspend
// the whole machine and resume exactly where it left off.
//
// Error chaining: the inbound error (nil on normal scope exit) is passed
// to each handler; a raising handler replaces it for the handlers that
// follow, and the final error is rethrown once the scope is drained.

use crate::lua_value::{LuaFunction, LuaValue};
use crate::lua_vm::{CloseAction, CloseState, ExecContext, FrameId, LuaError, LuaResult, LuaVM};

use super::call::{call_native, push_lua_frame};
use super::metamethod::{get_metamethod_event, TmKind};
use super::{finish_return, perform_tail_call, Flow, Step};

/// Enter close processing for a scope. Current frame becomes the owner.
pub fn begin_close(vm: &mut LuaVM, cs: CloseState, watermark: usize) -> LuaResult<Flow> {
    vm.current_frame = Some(cs.frame);
    continue_close(vm, cs, watermark)
}

/// A __close handler frame finished normally: drop its entry and keep
/// closing. Called from the trampoline when it pops an ExecContext::Close.
pub fn finish_handler(vm: &mut LuaVM, cs: CloseState, watermark: usize) -> LuaResult<Flow> {
    remove_in_flight_entry(vm, cs.frame);
    vm.current_frame = Some(cs.frame);
    continue_close(vm, cs, watermark)
}

/// A __close handler was unwound by an error (or thread close): drop its
/// entry; the caller chains the error into the state before continuing.
pub fn abandon_handler(vm: &mut LuaVM, cs: &CloseState) {
    remove_in_flight_entry(vm, cs.frame);
}

fn remove_in_flight_entry(vm: &mut LuaVM, fid: FrameId) {
    let frame = vm.frame_mut(fid);
    if let Some(idx) = frame.tbc.iter().rposition(|e| e.in_flight) {
        frame.tbc.remove(idx);
    }
}

/// Run handlers until one needs a Lua frame (handed to the trampoline)
/// or the scope is drained (after-action decides what happens next).
pub fn continue_close(vm: &mut LuaVM, mut cs: CloseState, watermark: usize) -> LuaResult<Flow> {
    loop {
        let next = vm
            .frame(cs.frame)
            .tbc
            .iter()
            .rposition(|e| e.register >= cs.threshold && !e.in_flight);

        let Some(idx) = next else {
            return finish_scope(vm, cs, watermark);
        };

        let value = vm.frame(cs.frame).tbc[idx].value.clone();
        let err_arg = cs
            .error
            .as_ref()
            .map(|e| e.value.clone())
            .unwrap_or(LuaValue::Nil);

        let handler = get_metamethod_event(vm, &value, TmKind::Close);
        let Some(handler) = handler else {
            // The metatable lost its __close since declaration.
            vm.frame_mut(cs.frame).tbc.remove(idx);
            let e = vm.rt_error_value(format!(
                "attempt to close non-closable {} value",
                value.type_name()
            ));
            cs.error = Some(e);
            continue;
        };

        let is_lua = matches!(
            handler.as_function().map(|f| &**f),
            Some(LuaFunction::Lua(_))
        );
        if is_lua {
            vm.check_call_depth()?;
            vm.frame_mut(cs.frame).tbc[idx].in_flight = true;
            vm.exec_stack.push(ExecContext::Close(cs));
            push_lua_frame(vm, handler, vec![value, err_arg])?;
            return Ok(Flow::Step(Step::Dispatch));
        }

        if !handler.is_function() {
            vm.frame_mut(cs.frame).tbc.remove(idx);
            let e = vm.rt_error_value(format!(
                "attempt to call a {} value (metamethod '__close')",
                handler.type_name()
            ));
            cs.error = Some(e);
            continue;
        }

        // Native handler: runs to completion right here. It may not
        // yield (no continuation to resume into).
        vm.frame_mut(cs.frame).tbc[idx].in_flight = true;
        vm.non_yieldable += 1;
        let result = call_native(vm, &handler, vec![value, err_arg]);
        vm.non_yieldable -= 1;
        remove_in_flight_entry(vm, cs.frame);
        match result {
            Ok(_) => {}
            Err(LuaError::Runtime(re)) => cs.error = Some(re),
            Err(y @ LuaError::Yield(_)) => return Err(y),
        }
    }
}

/// All eligible entries are gone; do what the scope exit was doing.
fn finish_scope(vm: &mut LuaVM, cs: CloseState, watermark: usize) -> LuaResult<Flow> {
    // coroutine.close drains scopes but never resumes execution.
    if vm.closing_thread {
        return Ok(Flow::Step(Step::Unwind(cs.error)));
    }
    match cs.after {
        CloseAction::Resume => match cs.error {
            Some(e) => Ok(Flow::Step(Step::Unwind(Some(e)))),
            None => Ok(Flow::Step(Step::Dispatch)),
        },
        CloseAction::Return => match cs.error {
            // A raising handler wins over the captured return values.
            Some(e) => Ok(Flow::Step(Step::Unwind(Some(e)))),
            None => {
                let vals = vm
                    .frame_mut(cs.frame)
                    .captured_returns
                    .take()
                    .unwrap_or_default();
                finish_return(vm, vals, watermark)
            }
        },
        CloseAction::Rethrow => Ok(Flow::Step(Step::Unwind(cs.error))),
        CloseAction::TailCall { func, args } => match cs.error {
            Some(e) => Ok(Flow::Step(Step::Unwind(Some(e)))),
            None => {
                perform_tail_call(vm, cs.frame, func, args)?;
                Ok(Flow::Step(Step::Dispatch))
            }
        },
    }
}
