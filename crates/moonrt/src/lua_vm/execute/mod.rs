/*----------------------------------------------------------------------
  The trampoline.

  One loop drives everything: regular calls push a context and swap the
  current frame, tail calls replace the frame in place, returns pop and
  store results, close scopes interleave __close handler calls, and
  errors unwind frame by frame running to-be-closed handlers on the way.
  No opcode handler ever recursively drives the loop for a Lua call, so
  Lua-level recursion depth never touches the host stack.

  Re-entry happens only from native code (pcall, metamethods, hooks)
  through call::call_function, delimited by an exec-stack watermark.
----------------------------------------------------------------------*/

pub mod call;
pub mod close;
pub(crate) mod helper;
pub mod metamethod;

pub use metamethod::{get_metamethod_event, get_metatable, TmKind};

use crate::lua_value::LuaValue;
use crate::lua_vm::dispatcher::{dispatch_instruction, DispatchResult};
use crate::lua_vm::opcode::{Instruction, OpCode};
use crate::lua_vm::{
    CloseAction, CloseState, ExecContext, FrameId, LuaError, LuaResult, LuaVM, RuntimeError,
};

use call::{push_lua_frame, store_call_results};
use helper::close_frame_upvalues;

/// How a trampoline run starts.
pub enum Entry {
    /// Dispatch the current frame's instruction (fresh call).
    Dispatch,
    /// Resume delivery: hand `values` to the call site the current frame
    /// is suspended on, then continue.
    Deliver(Vec<LuaValue>),
    /// Unwind immediately (coroutine close drains scopes this way).
    Unwind(Option<Box<RuntimeError>>),
}

/// What the loop does next.
pub(crate) enum Step {
    Dispatch,
    /// Pop the current frame after draining its TBC list; None means a
    /// non-error unwind (thread close).
    Unwind(Option<Box<RuntimeError>>),
}

pub(crate) enum Flow {
    Step(Step),
    Finished(Vec<LuaValue>),
}

/// Run until the frame at `watermark` depth returns (its values are the
/// result), an error unwinds past the watermark, or a yield escapes.
pub fn lua_execute(vm: &mut LuaVM, watermark: usize, entry: Entry) -> LuaResult<Vec<LuaValue>> {
    let mut step = match entry {
        Entry::Dispatch => Step::Dispatch,
        Entry::Unwind(e) => Step::Unwind(e),
        Entry::Deliver(values) => match deliver_resume_values(vm, values, watermark)? {
            Flow::Step(s) => s,
            Flow::Finished(vals) => return Ok(vals),
        },
    };
    loop {
        match step {
            Step::Dispatch => {
                let outcome = if vm.hooks_armed {
                    crate::lua_vm::debug_info::instruction_hooks(vm)
                        .and_then(|()| dispatch_instruction(vm))
                } else {
                    dispatch_instruction(vm)
                };
                // Errors out of dispatch AND out of directive handling
                // (depth checks, result storage) unwind through TBC;
                // only the yield sentinel passes straight out.
                let applied = match outcome {
                    Ok(directive) => apply_directive(vm, directive, watermark),
                    Err(e) => Err(e),
                };
                match applied {
                    Ok(Flow::Step(s)) => step = s,
                    Ok(Flow::Finished(vals)) => return Ok(vals),
                    Err(LuaError::Yield(vals)) => return Err(LuaError::Yield(vals)),
                    Err(LuaError::Runtime(re)) => step = Step::Unwind(Some(re)),
                }
            }
            Step::Unwind(err) => match unwind_once(vm, err, watermark)? {
                Flow::Step(s) => step = s,
                Flow::Finished(vals) => return Ok(vals),
            },
        }
    }
}

/// Deliver resume arguments to the call site the frame is parked on. The
/// pc still points at the CALL/TFORCALL (or TAILCALL) whose native callee
/// yielded.
fn deliver_resume_values(
    vm: &mut LuaVM,
    values: Vec<LuaValue>,
    watermark: usize,
) -> LuaResult<Flow> {
    let fid = vm.cur()?;
    let pc = vm.frame(fid).pc;
    let Some(instr) = vm.frame(fid).chunk.code.get(pc).copied() else {
        return Err(vm.rt_error("resume site out of code bounds"));
    };
    match Instruction::get_opcode(instr) {
        OpCode::Call | OpCode::TForCall => {
            store_call_results(vm, fid, pc, values)?;
            vm.frame_mut(fid).pc = pc + 1;
            Ok(Flow::Step(Step::Dispatch))
        }
        // A native tail call that yielded: its eventual results are the
        // frame's return values.
        OpCode::TailCall => apply_directive(vm, DispatchResult::Return(values), watermark),
        other => Err(vm.rt_error(format!("cannot resume at opcode {:?}", other))),
    }
}

fn apply_directive(vm: &mut LuaVM, d: DispatchResult, watermark: usize) -> LuaResult<Flow> {
    let fid = vm.cur()?;
    match d {
        DispatchResult::Continue => {
            vm.frame_mut(fid).pc += 1;
            Ok(Flow::Step(Step::Dispatch))
        }
        DispatchResult::SkipNext => {
            vm.frame_mut(fid).pc += 2;
            Ok(Flow::Step(Step::Dispatch))
        }
        DispatchResult::Jump(target) => {
            vm.frame_mut(fid).pc = target;
            Ok(Flow::Step(Step::Dispatch))
        }
        DispatchResult::CloseScope { threshold } => {
            vm.frame_mut(fid).pc += 1;
            if vm.frame(fid).has_pending_tbc(threshold) {
                let cs = CloseState {
                    frame: fid,
                    threshold,
                    error: None,
                    after: CloseAction::Resume,
                };
                close::begin_close(vm, cs, watermark)
            } else {
                Ok(Flow::Step(Step::Dispatch))
            }
        }
        DispatchResult::Return(values) => {
            crate::lua_vm::debug_info::hook_return(vm)?;
            if vm.frame(fid).has_pending_tbc(0) {
                // Capture returns before any handler runs so a yielding
                // handler can still deliver them on final resume.
                vm.frame_mut(fid).captured_returns = Some(values);
                let cs = CloseState {
                    frame: fid,
                    threshold: 0,
                    error: None,
                    after: CloseAction::Return,
                };
                close::begin_close(vm, cs, watermark)
            } else {
                finish_return(vm, values, watermark)
            }
        }
        DispatchResult::CallTrampoline { func, args } => {
            vm.check_call_depth()?;
            let call_pc = vm.frame(fid).pc;
            vm.exec_stack.push(ExecContext::Call {
                frame: fid,
                call_pc,
            });
            push_lua_frame(vm, func, args)?;
            crate::lua_vm::debug_info::hook_call(vm)?;
            Ok(Flow::Step(Step::Dispatch))
        }
        DispatchResult::TailCallTrampoline { func, args } => {
            if vm.frame(fid).has_pending_tbc(0) {
                let cs = CloseState {
                    frame: fid,
                    threshold: 0,
                    error: None,
                    after: CloseAction::TailCall { func, args },
                };
                close::begin_close(vm, cs, watermark)
            } else {
                perform_tail_call(vm, fid, func, args)?;
                Ok(Flow::Step(Step::Dispatch))
            }
        }
    }
}

/// Pop the finished current frame and hand `values` to whatever waits
/// below: a caller's call site, a close continuation, or (at the
/// watermark) the native code that entered the trampoline.
pub(crate) fn finish_return(
    vm: &mut LuaVM,
    values: Vec<LuaValue>,
    watermark: usize,
) -> LuaResult<Flow> {
    let fid = vm.cur()?;
    close_frame_upvalues(vm, fid, 0);
    vm.frames.remove(fid);
    if vm.exec_stack.len() == watermark {
        vm.current_frame = None;
        return Ok(Flow::Finished(values));
    }
    match vm.exec_stack.pop() {
        Some(ExecContext::Call { frame, call_pc }) => {
            vm.current_frame = Some(frame);
            store_call_results(vm, frame, call_pc, values)?;
            vm.frame_mut(frame).pc = call_pc + 1;
            Ok(Flow::Step(Step::Dispatch))
        }
        Some(ExecContext::Close(cs)) => {
            // A __close handler returned; its values are discarded.
            close::finish_handler(vm, cs, watermark)
        }
        None => Err(vm.rt_error("exec stack underflow")),
    }
}

/// One unwind step: drain the current frame's TBC list, then pop it and
/// propagate into whatever context is below.
fn unwind_once(
    vm: &mut LuaVM,
    err: Option<Box<RuntimeError>>,
    watermark: usize,
) -> LuaResult<Flow> {
    let fid = vm.cur()?;
    if vm.frame(fid).has_pending_tbc(0) {
        let cs = CloseState {
            frame: fid,
            threshold: 0,
            error: err,
            after: CloseAction::Rethrow,
        };
        return close::begin_close(vm, cs, watermark);
    }
    close_frame_upvalues(vm, fid, 0);
    vm.frames.remove(fid);
    if vm.exec_stack.len() == watermark {
        vm.current_frame = None;
        return match err {
            Some(e) => Err(LuaError::Runtime(e)),
            None => Ok(Flow::Finished(Vec::new())),
        };
    }
    match vm.exec_stack.pop() {
        Some(ExecContext::Call { frame, .. }) => {
            vm.current_frame = Some(frame);
            Ok(Flow::Step(Step::Unwind(err)))
        }
        Some(ExecContext::Close(mut cs)) => {
            // The error escaped a __close handler body: it replaces the
            // chained error for the handlers that remain.
            close::abandon_handler(vm, &cs);
            if err.is_some() {
                cs.error = err;
            }
            vm.current_frame = Some(cs.frame);
            close::continue_close(vm, cs, watermark)
        }
        None => Err(vm.rt_error("exec stack underflow")),
    }
}

/// Frame replacement for TCO: exec stack depth is untouched, the frame
/// slot and register allocation are reused.
pub(crate) fn perform_tail_call(
    vm: &mut LuaVM,
    fid: FrameId,
    func: LuaValue,
    args: Vec<LuaValue>,
) -> LuaResult<()> {
    use crate::lua_value::LuaFunction;
    close_frame_upvalues(vm, fid, 0);
    let (chunk, upvalues) = match func.as_function().map(|f| &**f) {
        Some(LuaFunction::Lua(c)) => (c.chunk.clone(), c.upvalues.clone()),
        _ => return Err(vm.rt_error("attempt to tail-call a non-Lua function")),
    };
    vm.frame_mut(fid)
        .replace_for_tail_call(func, chunk, upvalues, args);
    vm.current_frame = Some(fid);
    crate::lua_vm::debug_info::hook_call(vm)?;
    Ok(())
}
