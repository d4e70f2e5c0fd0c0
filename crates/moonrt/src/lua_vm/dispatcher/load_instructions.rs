// MOVE / LOADK / LOADI / LOADBOOL / LOADNIL / VARARG

use crate::lua_value::LuaValue;
use crate::lua_vm::opcode::Instruction;
use crate::lua_vm::{LuaResult, LuaVM};

use super::DispatchResult;

pub fn exec_move(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let v = vm.reg(b)?;
    vm.set_reg(a, v)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_loadk(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let bx = Instruction::get_bx(instr);
    let k = vm.constant(bx)?;
    vm.set_reg(a, k)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_loadi(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let sbx = Instruction::get_sbx(instr);
    vm.set_reg(a, LuaValue::Integer(sbx as i64))?;
    Ok(DispatchResult::Continue)
}

pub fn exec_loadbool(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let c = Instruction::get_c(instr);
    vm.set_reg(a, LuaValue::Boolean(b != 0))?;
    if c != 0 {
        Ok(DispatchResult::SkipNext)
    } else {
        Ok(DispatchResult::Continue)
    }
}

pub fn exec_loadnil(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    for i in a..=a + b {
        vm.set_reg(i, LuaValue::Nil)?;
    }
    Ok(DispatchResult::Continue)
}

/// VARARG A B: B == 0 copies all varargs and publishes `top`; otherwise
/// copies exactly B-1, nil padded.
pub fn exec_vararg(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let fid = vm.cur()?;
    let varargs = vm.frame(fid).varargs.clone();
    if b == 0 {
        let n = varargs.len();
        for (i, v) in varargs.into_iter().enumerate() {
            vm.set_reg(a + i, v)?;
        }
        vm.frame_mut(fid).top = a + n;
    } else {
        for i in 0..b - 1 {
            let v = varargs.get(i).cloned().unwrap_or(LuaValue::Nil);
            vm.set_reg(a + i, v)?;
        }
        vm.frame_mut(fid).top = 0;
    }
    Ok(DispatchResult::Continue)
}
