// Error model.
//
// Errors are Lua values. String errors raised by the VM and by `error()`
// carry a "source:line:" prefix; other values pass through untouched. The
// Yield variant is not an error at all: it is the control-flow sentinel a
// yield uses to unwind native callbacks up to the trampoline.

use std::fmt;

use smol_str::SmolStr;

use crate::lua_value::LuaValue;

pub type LuaResult<T> = Result<T, LuaError>;

pub enum LuaError {
    /// A runtime error unwinding toward the nearest pcall barrier.
    Runtime(Box<RuntimeError>),
    /// Yield sentinel carrying the yielded values. Intercepted by the
    /// resume machinery; surfacing to a host means a yield escaped the
    /// outermost coroutine boundary.
    Yield(Vec<LuaValue>),
}

impl LuaError {
    pub fn runtime(value: LuaValue, traceback: Vec<TraceFrame>) -> LuaError {
        LuaError::Runtime(Box::new(RuntimeError { value, traceback }))
    }

    /// The error value, for pcall-style reporting. Yield sentinels have
    /// no value; they must not reach this point.
    pub fn value(&self) -> LuaValue {
        match self {
            LuaError::Runtime(e) => e.value.clone(),
            LuaError::Yield(_) => LuaValue::Nil,
        }
    }
}

pub struct RuntimeError {
    pub value: LuaValue,
    /// Innermost first. Native frames are kept (shown as [C]) so
    /// debug.traceback can render the full chain.
    pub traceback: Vec<TraceFrame>,
}

#[derive(Clone)]
pub struct TraceFrame {
    pub source: SmolStr,
    pub line: u32,
    pub is_native: bool,
}

impl RuntimeError {
    pub fn message(&self) -> String {
        self.value.display_string()
    }

    pub fn traceback_string(&self) -> String {
        let mut out = String::from("stack traceback:");
        for f in &self.traceback {
            if f.is_native {
                out.push_str("\n\t[C]: in ?");
            } else {
                out.push_str(&format!("\n\t{}:{}: in function", f.source, f.line));
            }
        }
        out
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())?;
        if !self.traceback.is_empty() {
            write!(f, "\n{}", self.traceback_string())?;
        }
        Ok(())
    }
}

impl fmt::Debug for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaError::Runtime(e) => write!(f, "{}", e),
            LuaError::Yield(_) => write!(f, "coroutine yield"),
        }
    }
}

impl fmt::Debug for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl std::error::Error for LuaError {}
