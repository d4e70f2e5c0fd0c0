// Chunk: an immutable compiled function prototype.

use smol_str::SmolStr;
use std::rc::Rc;

use super::lua_value::LuaValue;

/// Where a CLOSURE instruction captures an upvalue from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalSource {
    /// A register of the enclosing frame (creates or reuses an open cell).
    ParentRegister(usize),
    /// An upvalue of the enclosing closure (shares the cell).
    ParentUpvalue(usize),
}

#[derive(Debug, Clone)]
pub struct UpvalDesc {
    pub name: SmolStr,
    pub source: UpvalSource,
}

/// Debug record for a local variable's live range.
#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: SmolStr,
    pub register: usize,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// A compiled function prototype. Immutable after emission and shared by
/// every closure instantiated from it.
pub struct Chunk {
    pub source: SmolStr,
    pub code: Vec<u32>,
    pub constants: Vec<LuaValue>,
    pub upvalues: Vec<UpvalDesc>,
    pub protos: Vec<Rc<Chunk>>,
    pub param_count: usize,
    pub is_vararg: bool,
    /// Register count hint; frames may grow past it.
    pub max_stack: usize,
    /// pc -> source line. May be shorter than `code` (trailing pcs map to
    /// the last known line) or empty (line 0).
    pub line_info: Vec<u32>,
    pub locals: Vec<LocalVar>,
}

impl Chunk {
    pub fn line_at(&self, pc: usize) -> u32 {
        match self.line_info.get(pc) {
            Some(line) => *line,
            None => self.line_info.last().copied().unwrap_or(0),
        }
    }

    /// Debug name of the local in `register` at `pc`, when known.
    pub fn local_name(&self, register: usize, pc: usize) -> Option<&SmolStr> {
        self.locals
            .iter()
            .find(|l| {
                l.register == register && (l.start_pc as usize) <= pc && pc < l.end_pc as usize
            })
            .map(|l| &l.name)
    }
}
