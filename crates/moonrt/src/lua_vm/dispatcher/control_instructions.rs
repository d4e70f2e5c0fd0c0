// Jumps, comparisons, tests, calls and returns.
//
// Comparison opcodes implement the skip pattern: when the computed truth
// differs from operand A the following (always a JMP) is skipped.

use crate::lua_value::{num_le, num_lt, LuaFunction, LuaValue};
use crate::lua_vm::execute::call::{call_native, resolve_callable, store_call_results};
use crate::lua_vm::execute::metamethod::{call_tm_res, eq_metamethod, get_binop_metamethod, TmKind};
use crate::lua_vm::opcode::Instruction;
use crate::lua_vm::{LuaResult, LuaVM};

use super::DispatchResult;

pub fn exec_jmp(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let fid = vm.cur()?;
    let pc = vm.frame(fid).pc;
    let sbx = Instruction::get_sbx(instr);
    let target = pc as i64 + 1 + sbx as i64;
    if target < 0 {
        return Err(vm.rt_error("jump out of code bounds"));
    }
    Ok(DispatchResult::Jump(target as usize))
}

/// Equality with the __eq identity rule.
pub fn values_eq(vm: &mut LuaVM, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if a.raw_eq(b) {
        return Ok(true);
    }
    if let Some(handler) = eq_metamethod(vm, a, b) {
        let r = call_tm_res(vm, handler, a.clone(), b.clone())?;
        return Ok(r.is_truthy());
    }
    Ok(false)
}

/// a < b: numbers by value, strings bytewise, otherwise __lt.
pub fn values_lt(vm: &mut LuaVM, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if a.is_number() && b.is_number() {
        return Ok(num_lt(a, b));
    }
    if let (LuaValue::String(x), LuaValue::String(y)) = (a, b) {
        return Ok(x.as_bytes() < y.as_bytes());
    }
    match get_binop_metamethod(vm, a, b, TmKind::Lt) {
        Some(handler) => {
            let r = call_tm_res(vm, handler, a.clone(), b.clone())?;
            Ok(r.is_truthy())
        }
        None => Err(compare_error(vm, a, b)),
    }
}

/// a <= b.
pub fn values_le(vm: &mut LuaVM, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if a.is_number() && b.is_number() {
        return Ok(num_le(a, b));
    }
    if let (LuaValue::String(x), LuaValue::String(y)) = (a, b) {
        return Ok(x.as_bytes() <= y.as_bytes());
    }
    match get_binop_metamethod(vm, a, b, TmKind::Le) {
        Some(handler) => {
            let r = call_tm_res(vm, handler, a.clone(), b.clone())?;
            Ok(r.is_truthy())
        }
        None => Err(compare_error(vm, a, b)),
    }
}

fn compare_error(vm: &mut LuaVM, a: &LuaValue, b: &LuaValue) -> crate::lua_vm::LuaError {
    let (ta, tb) = (a.type_name(), b.type_name());
    if ta == tb {
        vm.rt_error(format!("attempt to compare two {} values", ta))
    } else {
        vm.rt_error(format!("attempt to compare {} with {}", ta, tb))
    }
}

fn skip_when(cond: bool, expected: bool) -> DispatchResult {
    if cond != expected {
        DispatchResult::SkipNext
    } else {
        DispatchResult::Continue
    }
}

pub fn exec_eq(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let expected = Instruction::get_a(instr) != 0;
    let lhs = vm.rk(Instruction::get_b(instr))?;
    let rhs = vm.rk(Instruction::get_c(instr))?;
    let cond = values_eq(vm, &lhs, &rhs)?;
    Ok(skip_when(cond, expected))
}

pub fn exec_lt(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let expected = Instruction::get_a(instr) != 0;
    let lhs = vm.rk(Instruction::get_b(instr))?;
    let rhs = vm.rk(Instruction::get_c(instr))?;
    let cond = values_lt(vm, &lhs, &rhs)?;
    Ok(skip_when(cond, expected))
}

pub fn exec_le(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let expected = Instruction::get_a(instr) != 0;
    let lhs = vm.rk(Instruction::get_b(instr))?;
    let rhs = vm.rk(Instruction::get_c(instr))?;
    let cond = values_le(vm, &lhs, &rhs)?;
    Ok(skip_when(cond, expected))
}

pub fn exec_test(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let expected = Instruction::get_c(instr) != 0;
    let cond = vm.reg(a)?.is_truthy();
    Ok(skip_when(cond, expected))
}

pub fn exec_testset(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let expected = Instruction::get_c(instr) != 0;
    let v = vm.reg(b)?;
    if v.is_truthy() == expected {
        vm.set_reg(a, v)?;
        Ok(DispatchResult::Continue)
    } else {
        Ok(DispatchResult::SkipNext)
    }
}

/// Collect call arguments: B == 0 means "up to top" (a variable-result
/// producer ran just before), otherwise exactly B-1.
fn collect_args(vm: &mut LuaVM, a: usize, b: usize) -> LuaResult<Vec<LuaValue>> {
    let fid = vm.cur()?;
    let nargs = if b == 0 {
        let top = vm.frame(fid).top;
        top.saturating_sub(a + 1)
    } else {
        b - 1
    };
    let mut args = Vec::with_capacity(nargs);
    for i in 0..nargs {
        args.push(vm.reg(a + 1 + i)?);
    }
    vm.frame_mut(fid).top = 0;
    Ok(args)
}

pub fn exec_call(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let mut args = collect_args(vm, a, b)?;
    let func = vm.reg(a)?;
    let func = resolve_callable(vm, func, &mut args)?;

    let is_native = matches!(func.as_function().map(|f| &**f), Some(LuaFunction::Native(_)));
    if is_native {
        // Native callees share the host stack. A yield raised inside
        // unwinds through here with the pc still on this CALL, which is
        // exactly what resume delivery needs.
        let results = call_native(vm, &func, args)?;
        let fid = vm.cur()?;
        let pc = vm.frame(fid).pc;
        store_call_results(vm, fid, pc, results)?;
        return Ok(DispatchResult::Continue);
    }
    Ok(DispatchResult::CallTrampoline { func, args })
}

pub fn exec_tailcall(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let mut args = collect_args(vm, a, b)?;
    let func = vm.reg(a)?;
    let func = resolve_callable(vm, func, &mut args)?;

    let is_native = matches!(func.as_function().map(|f| &**f), Some(LuaFunction::Native(_)));
    if is_native {
        // A tail call to a native function degenerates to returning its
        // results.
        let results = call_native(vm, &func, args)?;
        return Ok(DispatchResult::Return(results));
    }
    Ok(DispatchResult::TailCallTrampoline { func, args })
}

pub fn exec_return(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let fid = vm.cur()?;
    let nvals = if b == 0 {
        let top = vm.frame(fid).top;
        top.saturating_sub(a)
    } else {
        b - 1
    };
    let mut values = Vec::with_capacity(nvals);
    for i in 0..nvals {
        values.push(vm.reg(a + i)?);
    }
    Ok(DispatchResult::Return(values))
}
