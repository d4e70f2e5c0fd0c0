// Execution frame: the per-call mutable state, plus the exec-stack
// context records the trampoline keeps while a callee runs.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::lua_value::{Chunk, LuaValue, UpvaluePtr};

use super::frame_arena::FrameId;
use super::lua_error::RuntimeError;

/// A to-be-closed local: the register it was declared in and the value
/// snapshotted at declaration. `in_flight` marks the entry whose __close
/// handler is currently running, so unwinding through the handler cannot
/// invoke it twice; entries are removed once their handler completes.
pub struct TbcEntry {
    pub register: usize,
    pub value: LuaValue,
    pub in_flight: bool,
}

pub struct LuaFrame {
    pub chunk: Rc<Chunk>,
    pub upvalues: Vec<UpvaluePtr>,
    /// The closure value being executed (debug info, identity).
    pub function: LuaValue,
    /// Parameters first, then locals/temporaries. Grows on demand past
    /// the prototype's max_stack hint.
    pub registers: Vec<LuaValue>,
    /// Index of the instruction being dispatched.
    pub pc: usize,
    /// Non-zero only between a variable-result producer and its consumer:
    /// one past the last live register of an open value sequence.
    pub top: usize,
    pub varargs: Vec<LuaValue>,
    /// Open cells aliasing this frame's registers, keyed by register.
    pub open_upvalues: BTreeMap<usize, UpvaluePtr>,
    /// Append-only while in scope; drained LIFO by the close engine.
    pub tbc: Vec<TbcEntry>,
    /// RETURN's value list, captured just before __close handlers run so
    /// a yield inside a handler can still deliver them on final resume.
    pub captured_returns: Option<Vec<LuaValue>>,
}

impl LuaFrame {
    pub fn new(
        function: LuaValue,
        chunk: Rc<Chunk>,
        upvalues: Vec<UpvaluePtr>,
        mut args: Vec<LuaValue>,
    ) -> Self {
        let nparams = chunk.param_count;
        let varargs = if chunk.is_vararg && args.len() > nparams {
            args.split_off(nparams)
        } else {
            Vec::new()
        };
        args.truncate(nparams);
        let mut registers = args;
        registers.resize(nparams.max(chunk.max_stack), LuaValue::Nil);
        LuaFrame {
            chunk,
            upvalues,
            function,
            registers,
            pc: 0,
            top: 0,
            varargs,
            open_upvalues: BTreeMap::new(),
            tbc: Vec::new(),
            captured_returns: None,
        }
    }

    /// Tail-call frame replacement: same slot, same register allocation,
    /// new callee. Caller must have closed upvalues and drained TBC.
    pub fn replace_for_tail_call(
        &mut self,
        function: LuaValue,
        chunk: Rc<Chunk>,
        upvalues: Vec<UpvaluePtr>,
        args: Vec<LuaValue>,
    ) {
        debug_assert!(self.open_upvalues.is_empty());
        debug_assert!(self.tbc.is_empty());
        let nparams = chunk.param_count;
        self.registers.clear();
        self.registers.extend(args);
        if chunk.is_vararg && self.registers.len() > nparams {
            self.varargs = self.registers.split_off(nparams);
        } else {
            self.registers.truncate(nparams);
            self.varargs = Vec::new();
        }
        self.registers
            .resize(nparams.max(chunk.max_stack), LuaValue::Nil);
        self.chunk = chunk;
        self.upvalues = upvalues;
        self.function = function;
        self.pc = 0;
        self.top = 0;
        self.captured_returns = None;
    }

    #[inline]
    pub fn reg(&self, i: usize) -> LuaValue {
        match self.registers.get(i) {
            Some(v) => v.clone(),
            None => LuaValue::Nil,
        }
    }

    #[inline]
    pub fn set_reg(&mut self, i: usize, value: LuaValue) {
        if i >= self.registers.len() {
            self.registers.resize(i + 1, LuaValue::Nil);
        }
        self.registers[i] = value;
    }

    /// Any TBC entry at or above `threshold` that is not already being
    /// closed?
    pub fn has_pending_tbc(&self, threshold: usize) -> bool {
        self.tbc
            .iter()
            .any(|e| e.register >= threshold && !e.in_flight)
    }

    pub fn line(&self) -> u32 {
        self.chunk.line_at(self.pc)
    }
}

/// What the trampoline pushed when control moved down a level.
pub enum ExecContext {
    /// A Lua caller suspended at its CALL/TFORCALL instruction, waiting
    /// for results to be stored there.
    Call { frame: FrameId, call_pc: usize },
    /// A scope-close in progress: when the current __close handler
    /// returns (or raises), close-stepping continues from this state.
    Close(CloseState),
}

/// The close engine's continuation for one closing scope.
pub struct CloseState {
    /// Frame whose scope is closing.
    pub frame: FrameId,
    /// Close TBC entries with register >= threshold.
    pub threshold: usize,
    /// Error being chained through handlers: None on normal scope exit.
    /// A raising handler replaces it (the last error wins).
    pub error: Option<Box<RuntimeError>>,
    pub after: CloseAction,
}

/// What happens once every eligible handler has run.
pub enum CloseAction {
    /// CLOSE mid-function: resume the owner frame at its (already
    /// advanced) pc.
    Resume,
    /// RETURN: deliver the owner frame's captured_returns.
    Return,
    /// Error unwind (or coroutine close): keep unwinding with the final
    /// chained error.
    Rethrow,
    /// TAILCALL pending on this scope's close.
    TailCall { func: LuaValue, args: Vec<LuaValue> },
}
