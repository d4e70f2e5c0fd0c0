// Function values and upvalue cells.
//
// Both compiled closures and native functions are called through the same
// trampoline machinery; only closures get an execution frame.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use super::chunk::Chunk;
use super::lua_value::LuaValue;
use crate::lua_vm::{CFunction, FrameId};

/// An upvalue cell. Open cells alias a live frame's register slot; the
/// open -> closed transition is irreversible and happens when the owning
/// frame exits or a CLOSE instruction covers the register.
pub enum Upvalue {
    Open { frame: FrameId, register: usize },
    Closed(LuaValue),
}

/// Cells are shared by identity: closures created from the same CLOSURE
/// instruction capture the same `Rc`.
pub type UpvaluePtr = Rc<RefCell<Upvalue>>;

pub struct LuaClosure {
    pub chunk: Rc<Chunk>,
    pub upvalues: Vec<UpvaluePtr>,
}

pub struct LuaNative {
    pub name: SmolStr,
    pub func: CFunction,
    /// Values captured at creation (coroutine.wrap stores its thread
    /// here). Immutable after construction.
    pub upvalues: Vec<LuaValue>,
}

pub enum LuaFunction {
    Lua(LuaClosure),
    Native(LuaNative),
}

impl LuaFunction {
    pub fn is_native(&self) -> bool {
        matches!(self, LuaFunction::Native(_))
    }

    /// Name for error messages and debug info.
    pub fn name(&self) -> &str {
        match self {
            LuaFunction::Lua(c) => c.chunk.source.as_str(),
            LuaFunction::Native(n) => n.name.as_str(),
        }
    }
}

/// Host-defined opaque data with an optional metatable.
pub struct LuaUserdata {
    pub data: Box<dyn Any>,
    pub metatable: Option<LuaValue>,
}

impl LuaUserdata {
    pub fn new(data: Box<dyn Any>) -> Self {
        LuaUserdata {
            data,
            metatable: None,
        }
    }
}
