// Table access: GETTABLE/SETTABLE with metamethod chains, globals
// through the _ENV upvalue, NEWTABLE, SELF and SETLIST.

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::execute::helper::read_upvalue;
use crate::lua_vm::execute::metamethod::{get_metamethod_event, TmKind};
use crate::lua_vm::execute::call::call_function;
use crate::lua_vm::opcode::{Instruction, FIELDS_PER_FLUSH};
use crate::lua_vm::{LuaResult, LuaVM};

use super::DispatchResult;

/// obj[key] with the __index protocol: raw hit wins; a function handler
/// is called; a table handler restarts the lookup on it.
pub fn index_value(vm: &mut LuaVM, obj: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
    let mut cur = obj;
    for _ in 0..vm.limits.max_meta_chain {
        let table = cur.as_table().cloned();
        if let Some(t) = &table {
            let v = t.borrow().raw_get(&key);
            if !v.is_nil() {
                return Ok(v);
            }
        }
        let handler = match get_metamethod_event(vm, &cur, TmKind::Index) {
            Some(h) => h,
            None if table.is_some() => return Ok(LuaValue::Nil),
            None => {
                return Err(vm.rt_error(format!(
                    "attempt to index a {} value",
                    cur.type_name()
                )));
            }
        };
        if handler.is_function() {
            let results = call_function(vm, handler, vec![cur, key])?;
            return Ok(results.into_iter().next().unwrap_or(LuaValue::Nil));
        }
        cur = handler;
    }
    Err(vm.rt_error("'__index' chain too long; possible loop"))
}

/// obj[key] = value with the __newindex protocol.
pub fn newindex_value(
    vm: &mut LuaVM,
    obj: LuaValue,
    key: LuaValue,
    value: LuaValue,
) -> LuaResult<()> {
    let mut cur = obj;
    for _ in 0..vm.limits.max_meta_chain {
        let table = cur.as_table().cloned();
        if let Some(t) = &table {
            let existing = t.borrow().raw_get(&key);
            if !existing.is_nil() || get_metamethod_event(vm, &cur, TmKind::NewIndex).is_none() {
                let result = t.borrow_mut().raw_set(&key, value);
                return result.map_err(|e| vm.rt_error(e.message()));
            }
        }
        let handler = match get_metamethod_event(vm, &cur, TmKind::NewIndex) {
            Some(h) => h,
            None => {
                return Err(vm.rt_error(format!(
                    "attempt to index a {} value",
                    cur.type_name()
                )));
            }
        };
        if handler.is_function() {
            call_function(vm, handler, vec![cur, key, value])?;
            return Ok(());
        }
        cur = handler;
    }
    Err(vm.rt_error("'__newindex' chain too long; possible loop"))
}

pub fn exec_gettable(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let obj = vm.reg(Instruction::get_b(instr))?;
    let key = vm.rk(Instruction::get_c(instr))?;
    let v = index_value(vm, obj, key)?;
    vm.set_reg(a, v)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_settable(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let obj = vm.reg(Instruction::get_a(instr))?;
    let key = vm.rk(Instruction::get_b(instr))?;
    let value = vm.rk(Instruction::get_c(instr))?;
    newindex_value(vm, obj, key, value)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_newtable(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let narr = Instruction::get_b(instr);
    let nhash = Instruction::get_c(instr);
    let t = vm.alloc_table(LuaTable::with_capacity(narr, nhash));
    vm.set_reg(a, t)?;
    Ok(DispatchResult::Continue)
}

/// SELF A B C: R[A+1] := R[B]; R[A] := R[B][RK(C)].
pub fn exec_self(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let obj = vm.reg(Instruction::get_b(instr))?;
    let key = vm.rk(Instruction::get_c(instr))?;
    vm.set_reg(a + 1, obj.clone())?;
    let method = index_value(vm, obj, key)?;
    vm.set_reg(a, method)?;
    Ok(DispatchResult::Continue)
}

/// GETGLOBAL: _ENV is upvalue 0; plain tables short-circuit to a raw get.
pub fn exec_getglobal(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let bx = Instruction::get_bx(instr);
    let key = vm.constant(bx)?;
    let env = env_upvalue(vm)?;
    let v = match env.as_table().cloned() {
        Some(t) if t.borrow().metatable().is_none() => t.borrow().raw_get(&key),
        _ => index_value(vm, env, key)?,
    };
    vm.set_reg(a, v)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_setglobal(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let bx = Instruction::get_bx(instr);
    let key = vm.constant(bx)?;
    let value = vm.reg(a)?;
    let env = env_upvalue(vm)?;
    newindex_value(vm, env, key, value)?;
    Ok(DispatchResult::Continue)
}

fn env_upvalue(vm: &mut LuaVM) -> LuaResult<LuaValue> {
    let fid = vm.cur()?;
    let cell = match vm.frame(fid).upvalues.first() {
        Some(c) => c.clone(),
        None => return Err(vm.rt_error("function has no _ENV upvalue")),
    };
    Ok(read_upvalue(vm, &cell))
}

/// SETLIST A B C: bulk-move R[A+1..A+B] into the array part of R[A]
/// starting at (C-1)*FPF + 1. B == 0 consumes up to `top`.
pub fn exec_setlist(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let c = Instruction::get_c(instr);
    let fid = vm.cur()?;
    let n = if b == 0 {
        let top = vm.frame(fid).top;
        if top < a + 1 {
            0
        } else {
            top - a - 1
        }
    } else {
        b
    };
    let base = (c.max(1) - 1) * FIELDS_PER_FLUSH;
    let table = vm.reg(a)?;
    let Some(t) = table.as_table() else {
        return Err(vm.rt_error(format!(
            "attempt to index a {} value",
            table.type_name()
        )));
    };
    let t = t.clone();
    for i in 1..=n {
        let v = vm.reg(a + i)?;
        t.borrow_mut().raw_seti((base + i) as i64, v);
    }
    vm.frame_mut(fid).top = 0;
    Ok(DispatchResult::Continue)
}
