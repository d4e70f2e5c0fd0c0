// Lua value model: tagged values, strings, tables, functions, prototypes
// and coroutine objects.

mod chunk;
mod lua_function;
mod lua_string;
mod lua_table;
mod lua_thread;
#[allow(clippy::module_inception)]
mod lua_value;

pub use chunk::{Chunk, LocalVar, UpvalDesc, UpvalSource};
pub use lua_function::{LuaClosure, LuaFunction, LuaNative, LuaUserdata, Upvalue, UpvaluePtr};
pub use lua_string::{LuaStr, StringInterner};
pub use lua_table::{LuaKey, LuaTable, TableKeyError};
pub use lua_thread::{HookMask, HookState, LuaThread, ResumeMode, ResumptionState, ThreadStatus};
pub use lua_value::{
    float_to_int, float_to_lua_string, int_fits_float, str_to_number, FloatToInt, LuaValue,
};
pub(crate) use lua_value::{num_le, num_lt};
