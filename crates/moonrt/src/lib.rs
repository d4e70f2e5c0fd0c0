// Lua Runtime Core
// A register-based Lua 5.4 VM: trampoline dispatch, coroutines and
// to-be-closed variables. Compilation is a host concern (ChunkCompiler).

#[cfg(test)]
mod test;

pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

pub use lib_registry::{LibraryModule, LibraryRegistry};
pub use lua_value::{
    Chunk, LocalVar, LuaFunction, LuaStr, LuaTable, LuaThread, LuaUserdata, LuaValue,
    ThreadStatus, UpvalDesc, UpvalSource, Upvalue, UpvaluePtr,
};
pub use lua_vm::{
    CFunction, CallArgs, ChunkCompiler, FrameId, Instruction, LuaError, LuaLimits, LuaResult,
    LuaVM, OpCode, RuntimeError,
};
pub use stdlib::Stdlib;
