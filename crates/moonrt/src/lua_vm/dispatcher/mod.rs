// Instruction dispatcher.
//
// Decodes exactly one instruction and either mutates frame state or
// returns a control directive for the trampoline. Handlers never drive
// the execution loop themselves; anything that needs a Lua call reports
// it upward.

mod arithmetic_instructions;
mod control_instructions;
mod load_instructions;
mod loop_instructions;
mod table_instructions;
mod upvalue_instructions;

pub use arithmetic_instructions::{arith, arith_unm, bitwise, concat_values, length_of};
pub use control_instructions::{values_eq, values_le, values_lt};
pub use table_instructions::{index_value, newindex_value};

use arithmetic_instructions::*;
use control_instructions::*;
use load_instructions::*;
use loop_instructions::*;
use table_instructions::*;
use upvalue_instructions::*;

use crate::lua_value::LuaValue;
use crate::lua_vm::opcode::{Instruction, OpCode};
use crate::lua_vm::{LuaResult, LuaVM};

/// Control directive returned by one dispatch.
pub enum DispatchResult {
    /// Fall through to pc + 1.
    Continue,
    /// Skip the following instruction (comparison / TEST / LOADBOOL).
    SkipNext,
    /// Absolute jump.
    Jump(usize),
    /// The current frame is done.
    Return(Vec<LuaValue>),
    /// Push a context and enter this Lua callee.
    CallTrampoline { func: LuaValue, args: Vec<LuaValue> },
    /// Replace the current frame with this Lua callee (TCO).
    TailCallTrampoline { func: LuaValue, args: Vec<LuaValue> },
    /// CLOSE: upvalues are already closed; run __close for TBC entries
    /// with register >= threshold.
    CloseScope { threshold: usize },
}

pub fn dispatch_instruction(vm: &mut LuaVM) -> LuaResult<DispatchResult> {
    let fid = vm.cur()?;
    let instr = {
        let frame = vm.frame(fid);
        match frame.chunk.code.get(frame.pc) {
            Some(i) => *i,
            None => return Err(vm.rt_error("instruction pointer out of bounds")),
        }
    };

    match Instruction::get_opcode(instr) {
        // Data movement
        OpCode::Move => exec_move(vm, instr),
        OpCode::LoadK => exec_loadk(vm, instr),
        OpCode::LoadI => exec_loadi(vm, instr),
        OpCode::LoadBool => exec_loadbool(vm, instr),
        OpCode::LoadNil => exec_loadnil(vm, instr),
        OpCode::Vararg => exec_vararg(vm, instr),

        // Upvalues, globals, closures, scopes
        OpCode::GetUpval => exec_getupval(vm, instr),
        OpCode::SetUpval => exec_setupval(vm, instr),
        OpCode::GetGlobal => exec_getglobal(vm, instr),
        OpCode::SetGlobal => exec_setglobal(vm, instr),
        OpCode::Closure => exec_closure(vm, instr),
        OpCode::Close => exec_close(vm, instr),
        OpCode::Tbc => exec_tbc(vm, instr),

        // Tables
        OpCode::GetTable => exec_gettable(vm, instr),
        OpCode::SetTable => exec_settable(vm, instr),
        OpCode::NewTable => exec_newtable(vm, instr),
        OpCode::Self_ => exec_self(vm, instr),
        OpCode::SetList => exec_setlist(vm, instr),

        // Arithmetic and friends
        OpCode::Add => exec_arith(vm, instr, super::execute::TmKind::Add),
        OpCode::Sub => exec_arith(vm, instr, super::execute::TmKind::Sub),
        OpCode::Mul => exec_arith(vm, instr, super::execute::TmKind::Mul),
        OpCode::Div => exec_arith(vm, instr, super::execute::TmKind::Div),
        OpCode::Mod => exec_arith(vm, instr, super::execute::TmKind::Mod),
        OpCode::Pow => exec_arith(vm, instr, super::execute::TmKind::Pow),
        OpCode::IDiv => exec_arith(vm, instr, super::execute::TmKind::IDiv),
        OpCode::BAnd => exec_bitwise(vm, instr, super::execute::TmKind::BAnd),
        OpCode::BOr => exec_bitwise(vm, instr, super::execute::TmKind::BOr),
        OpCode::BXor => exec_bitwise(vm, instr, super::execute::TmKind::BXor),
        OpCode::Shl => exec_bitwise(vm, instr, super::execute::TmKind::Shl),
        OpCode::Shr => exec_bitwise(vm, instr, super::execute::TmKind::Shr),
        OpCode::Unm => exec_unm(vm, instr),
        OpCode::BNot => exec_bnot(vm, instr),
        OpCode::Not => exec_not(vm, instr),
        OpCode::Len => exec_len(vm, instr),
        OpCode::Concat => exec_concat(vm, instr),

        // Control
        OpCode::Jmp => exec_jmp(vm, instr),
        OpCode::Eq => exec_eq(vm, instr),
        OpCode::Lt => exec_lt(vm, instr),
        OpCode::Le => exec_le(vm, instr),
        OpCode::Test => exec_test(vm, instr),
        OpCode::TestSet => exec_testset(vm, instr),
        OpCode::Call => exec_call(vm, instr),
        OpCode::TailCall => exec_tailcall(vm, instr),
        OpCode::Return => exec_return(vm, instr),

        // Loops
        OpCode::ForPrep => exec_forprep(vm, instr),
        OpCode::ForLoop => exec_forloop(vm, instr),
        OpCode::TForCall => exec_tforcall(vm, instr),
        OpCode::TForLoop => exec_tforloop(vm, instr),
    }
}
