// Upvalue cell plumbing.

use std::cell::RefCell;
use std::rc::Rc;

use crate::lua_value::{LuaValue, Upvalue, UpvaluePtr};
use crate::lua_vm::{FrameId, LuaVM};

/// The open cell for `register` of `frame`, creating it if absent.
/// Idempotent per register: every CLOSURE capturing the same parent slot
/// shares one cell.
pub fn get_or_create_open_upvalue(vm: &mut LuaVM, fid: FrameId, register: usize) -> UpvaluePtr {
    let frame = vm.frame_mut(fid);
    frame
        .open_upvalues
        .entry(register)
        .or_insert_with(|| {
            Rc::new(RefCell::new(Upvalue::Open {
                frame: fid,
                register,
            }))
        })
        .clone()
}

/// Close every open cell of `fid` with register >= `from`: copy the
/// register value into the cell and forget the alias. Irreversible.
pub fn close_frame_upvalues(vm: &mut LuaVM, fid: FrameId, from: usize) {
    let closing = {
        let frame = vm.frame_mut(fid);
        frame.open_upvalues.split_off(&from)
    };
    for (register, cell) in closing {
        let value = vm.frame(fid).reg(register);
        *cell.borrow_mut() = Upvalue::Closed(value);
    }
}

/// Read through a cell: open cells alias a live frame's register.
pub fn read_upvalue(vm: &LuaVM, cell: &UpvaluePtr) -> LuaValue {
    match &*cell.borrow() {
        Upvalue::Closed(v) => v.clone(),
        Upvalue::Open { frame, register } => vm.frame(*frame).reg(*register),
    }
}

/// Write through a cell.
pub fn write_upvalue(vm: &mut LuaVM, cell: &UpvaluePtr, value: LuaValue) {
    let open_target = match &*cell.borrow() {
        Upvalue::Open { frame, register } => Some((*frame, *register)),
        Upvalue::Closed(_) => None,
    };
    match open_target {
        Some((fid, register)) => vm.frame_mut(fid).set_reg(register, value),
        None => *cell.borrow_mut() = Upvalue::Closed(value),
    }
}
