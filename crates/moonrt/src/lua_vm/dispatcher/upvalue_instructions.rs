// Upvalue access, closure instantiation, scope close and TBC marking.

use std::rc::Rc;

use crate::lua_value::{LuaClosure, LuaFunction, LuaValue, UpvalSource};
use crate::lua_vm::execute::helper::{
    close_frame_upvalues, get_or_create_open_upvalue, read_upvalue, write_upvalue,
};
use crate::lua_vm::execute::metamethod::{get_metamethod_event, TmKind};
use crate::lua_vm::lua_frame::TbcEntry;
use crate::lua_vm::opcode::Instruction;
use crate::lua_vm::{LuaResult, LuaVM};

use super::DispatchResult;

pub fn exec_getupval(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let fid = vm.cur()?;
    let cell = match vm.frame(fid).upvalues.get(b) {
        Some(c) => c.clone(),
        None => return Err(vm.rt_error(format!("no upvalue at index {}", b))),
    };
    let v = read_upvalue(vm, &cell);
    vm.set_reg(a, v)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_setupval(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let fid = vm.cur()?;
    let cell = match vm.frame(fid).upvalues.get(b) {
        Some(c) => c.clone(),
        None => return Err(vm.rt_error(format!("no upvalue at index {}", b))),
    };
    let v = vm.reg(a)?;
    write_upvalue(vm, &cell, v);
    Ok(DispatchResult::Continue)
}

/// CLOSURE A Bx: instantiate nested prototype Bx, binding each upvalue
/// per its descriptor. Captures from a parent register go through the
/// frame's open-cell map, so sibling closures share cells.
pub fn exec_closure(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let bx = Instruction::get_bx(instr);
    let fid = vm.cur()?;
    let proto = match vm.frame(fid).chunk.protos.get(bx) {
        Some(p) => p.clone(),
        None => return Err(vm.rt_error(format!("no nested prototype {}", bx))),
    };
    let mut upvalues = Vec::with_capacity(proto.upvalues.len());
    for desc in &proto.upvalues {
        match desc.source {
            UpvalSource::ParentRegister(r) => {
                upvalues.push(get_or_create_open_upvalue(vm, fid, r));
            }
            UpvalSource::ParentUpvalue(i) => match vm.frame(fid).upvalues.get(i) {
                Some(c) => upvalues.push(c.clone()),
                None => return Err(vm.rt_error(format!("no parent upvalue {}", i))),
            },
        }
    }
    let func = LuaValue::Function(Rc::new(LuaFunction::Lua(LuaClosure {
        chunk: proto,
        upvalues,
    })));
    vm.set_reg(a, func)?;
    Ok(DispatchResult::Continue)
}

/// CLOSE A: close open upvalues for registers >= A here; the trampoline
/// then drives __close handlers for covered TBC entries.
pub fn exec_close(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let fid = vm.cur()?;
    close_frame_upvalues(vm, fid, a);
    Ok(DispatchResult::CloseScope { threshold: a })
}

/// TBC A: register R[A] as to-be-closed. Nil and false are permitted and
/// never closed; anything else must have a __close metamethod now.
pub fn exec_tbc(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let value = vm.reg(a)?;
    if matches!(value, LuaValue::Nil | LuaValue::Boolean(false)) {
        return Ok(DispatchResult::Continue);
    }
    if get_metamethod_event(vm, &value, TmKind::Close).is_none() {
        let fid = vm.cur()?;
        let name = {
            let frame = vm.frame(fid);
            frame
                .chunk
                .local_name(a, frame.pc)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        };
        return Err(vm.rt_error(format!(
            "variable '{}' got a non-closable value",
            name
        )));
    }
    let fid = vm.cur()?;
    vm.frame_mut(fid).tbc.push(TbcEntry {
        register: a,
        value,
        in_flight: false,
    });
    Ok(DispatchResult::Continue)
}
