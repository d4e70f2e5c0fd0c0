// Numeric and generic for loops.
//
// Numeric loops are counted: FORPREP validates the three control values,
// computes the trip count for integer loops (immune to wraparound at the
// i64 edges) and skips the whole loop when it cannot run. Layout is
//   FORPREP A Bx ... body ... FORLOOP A Bx
// where FORLOOP jumps back Bx to the body start and FORPREP jumps
// forward Bx+2 past the FORLOOP when the loop is skipped.
//
// R[A] = control value, R[A+1] = limit (trip count once prepared, for
// integer loops), R[A+2] = step, R[A+3] = user-visible loop variable.

use crate::lua_value::{LuaFunction, LuaValue};
use crate::lua_vm::execute::call::{call_native, resolve_callable, store_call_results};
use crate::lua_vm::opcode::Instruction;
use crate::lua_vm::{LuaResult, LuaVM};

use super::DispatchResult;

fn for_number(vm: &mut LuaVM, v: LuaValue, what: &str) -> LuaResult<LuaValue> {
    match v.coerce_number() {
        Some(n) => Ok(n),
        None => Err(vm.rt_error(format!("'for' {} must be a number", what))),
    }
}

pub fn exec_forprep(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let bx = Instruction::get_bx(instr);
    let init = vm.reg(a)?;
    let limit = vm.reg(a + 1)?;
    let step = vm.reg(a + 2)?;
    let init = for_number(vm, init, "initial value")?;
    let limit = for_number(vm, limit, "limit")?;
    let step = for_number(vm, step, "step")?;

    let fid = vm.cur()?;
    let pc = vm.frame(fid).pc;
    let skip = DispatchResult::Jump(pc + bx + 2);

    if let (LuaValue::Integer(i0), LuaValue::Integer(l), LuaValue::Integer(s)) =
        (&init, &limit, &step)
    {
        let (i0, l, s) = (*i0, *l, *s);
        if s == 0 {
            return Err(vm.rt_error("'for' step is zero"));
        }
        if (s > 0 && i0 > l) || (s < 0 && i0 < l) {
            return Ok(skip);
        }
        // Trip count in unsigned space: |l - i0| / |s| never overflows.
        let diff = if s > 0 {
            (l as u64).wrapping_sub(i0 as u64)
        } else {
            (i0 as u64).wrapping_sub(l as u64)
        };
        let count = diff / s.unsigned_abs();
        vm.set_reg(a, LuaValue::Integer(i0))?;
        vm.set_reg(a + 1, LuaValue::Integer(count as i64))?;
        vm.set_reg(a + 2, LuaValue::Integer(s))?;
        vm.set_reg(a + 3, LuaValue::Integer(i0))?;
        return Ok(DispatchResult::Continue);
    }

    // Float loop.
    let i0 = to_f64(&init);
    let l = to_f64(&limit);
    let s = to_f64(&step);
    if s == 0.0 {
        return Err(vm.rt_error("'for' step is zero"));
    }
    let runs = if s > 0.0 { i0 <= l } else { i0 >= l };
    if !runs {
        return Ok(skip);
    }
    vm.set_reg(a, LuaValue::Float(i0))?;
    vm.set_reg(a + 1, LuaValue::Float(l))?;
    vm.set_reg(a + 2, LuaValue::Float(s))?;
    vm.set_reg(a + 3, LuaValue::Float(i0))?;
    Ok(DispatchResult::Continue)
}

pub fn exec_forloop(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let bx = Instruction::get_bx(instr);
    let fid = vm.cur()?;
    let pc = vm.frame(fid).pc;

    let control = vm.reg(a)?;
    match control {
        LuaValue::Integer(i) => {
            let count = match vm.reg(a + 1)? {
                LuaValue::Integer(c) => c as u64,
                _ => return Err(vm.rt_error("corrupt 'for' loop state")),
            };
            if count == 0 {
                return Ok(DispatchResult::Continue);
            }
            let step = match vm.reg(a + 2)? {
                LuaValue::Integer(s) => s,
                _ => return Err(vm.rt_error("corrupt 'for' loop state")),
            };
            let next = i.wrapping_add(step);
            vm.set_reg(a, LuaValue::Integer(next))?;
            vm.set_reg(a + 1, LuaValue::Integer((count - 1) as i64))?;
            vm.set_reg(a + 3, LuaValue::Integer(next))?;
            Ok(DispatchResult::Jump(pc - bx))
        }
        LuaValue::Float(f) => {
            let limit = to_f64(&vm.reg(a + 1)?);
            let step = to_f64(&vm.reg(a + 2)?);
            let next = f + step;
            let continues = if step > 0.0 { next <= limit } else { next >= limit };
            if continues {
                vm.set_reg(a, LuaValue::Float(next))?;
                vm.set_reg(a + 3, LuaValue::Float(next))?;
                Ok(DispatchResult::Jump(pc - bx))
            } else {
                Ok(DispatchResult::Continue)
            }
        }
        _ => Err(vm.rt_error("corrupt 'for' loop state")),
    }
}

/// TFORCALL A C: call the iterator R[A](R[A+1], R[A+2]) and store C
/// results from R[A+4]. R[A+3] is the loop's closing slot and is left
/// alone.
pub fn exec_tforcall(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let mut args = vec![vm.reg(a + 1)?, vm.reg(a + 2)?];
    let func = vm.reg(a)?;
    let func = resolve_callable(vm, func, &mut args)?;

    let is_native = matches!(func.as_function().map(|f| &**f), Some(LuaFunction::Native(_)));
    if is_native {
        let results = call_native(vm, &func, args)?;
        let fid = vm.cur()?;
        let pc = vm.frame(fid).pc;
        store_call_results(vm, fid, pc, results)?;
        return Ok(DispatchResult::Continue);
    }
    Ok(DispatchResult::CallTrampoline { func, args })
}

/// TFORLOOP A Bx: loop while the iterator's first result is non-nil.
pub fn exec_tforloop(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let bx = Instruction::get_bx(instr);
    let first = vm.reg(a + 4)?;
    if first.is_nil() {
        return Ok(DispatchResult::Continue);
    }
    let fid = vm.cur()?;
    let pc = vm.frame(fid).pc;
    vm.set_reg(a + 2, first)?;
    Ok(DispatchResult::Jump(pc - bx))
}

fn to_f64(v: &LuaValue) -> f64 {
    match v {
        LuaValue::Integer(i) => *i as f64,
        LuaValue::Float(f) => *f,
        _ => f64::NAN,
    }
}
