// Test support: a small bytecode assembler for building prototypes by
// hand, since compilation is a host concern.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::{Chunk, LocalVar, LuaValue, UpvalDesc, UpvalSource};
use crate::lua_vm::{Instruction, LuaVM, OpCode};
use crate::stdlib::Stdlib;

pub struct ChunkBuilder {
    source: String,
    code: Vec<u32>,
    constants: Vec<LuaValue>,
    protos: Vec<Rc<Chunk>>,
    upvalues: Vec<UpvalDesc>,
    param_count: usize,
    is_vararg: bool,
    max_stack: usize,
    line_info: Vec<u32>,
    locals: Vec<LocalVar>,
}

impl ChunkBuilder {
    pub fn new(source: &str) -> Self {
        ChunkBuilder {
            source: source.to_string(),
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            param_count: 0,
            is_vararg: false,
            max_stack: 16,
            line_info: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn params(mut self, n: usize) -> Self {
        self.param_count = n;
        self
    }

    pub fn vararg(mut self) -> Self {
        self.is_vararg = true;
        self
    }

    pub fn max_stack(mut self, n: usize) -> Self {
        self.max_stack = n;
        self
    }

    /// Declare an _ENV upvalue captured from the enclosing closure's
    /// upvalue 0 (the layout `LuaVM::execute` sets up for main chunks).
    pub fn env_upvalue(mut self) -> Self {
        self.upvalues.push(UpvalDesc {
            name: SmolStr::new("_ENV"),
            source: UpvalSource::ParentUpvalue(0),
        });
        self
    }

    pub fn upvalue_from_register(mut self, name: &str, register: usize) -> Self {
        self.upvalues.push(UpvalDesc {
            name: SmolStr::new(name),
            source: UpvalSource::ParentRegister(register),
        });
        self
    }

    pub fn upvalue_from_upvalue(mut self, name: &str, index: usize) -> Self {
        self.upvalues.push(UpvalDesc {
            name: SmolStr::new(name),
            source: UpvalSource::ParentUpvalue(index),
        });
        self
    }

    pub fn local_var(mut self, name: &str, register: usize) -> Self {
        self.locals.push(LocalVar {
            name: SmolStr::new(name),
            register,
            start_pc: 0,
            end_pc: u32::MAX,
        });
        self
    }

    // ============ constants ============

    pub fn k(&mut self, v: LuaValue) -> u32 {
        self.constants.push(v);
        (self.constants.len() - 1) as u32
    }

    pub fn k_int(&mut self, i: i64) -> u32 {
        self.k(LuaValue::Integer(i))
    }

    pub fn k_float(&mut self, f: f64) -> u32 {
        self.k(LuaValue::Float(f))
    }

    pub fn k_str(&mut self, vm: &mut LuaVM, s: &str) -> u32 {
        let v = vm.create_string(s);
        self.k(v)
    }

    /// Constant index as an RK operand.
    pub fn rk(&self, k: u32) -> u32 {
        Instruction::rk_const(k)
    }

    pub fn proto(&mut self, chunk: Rc<Chunk>) -> u32 {
        self.protos.push(chunk);
        (self.protos.len() - 1) as u32
    }

    // ============ emission ============

    pub fn abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> &mut Self {
        self.code.push(Instruction::abc(op, a, b, c));
        self.line_info.push(self.code.len() as u32);
        self
    }

    pub fn abx(&mut self, op: OpCode, a: u32, bx: u32) -> &mut Self {
        self.code.push(Instruction::abx(op, a, bx));
        self.line_info.push(self.code.len() as u32);
        self
    }

    pub fn asbx(&mut self, op: OpCode, a: u32, sbx: i32) -> &mut Self {
        self.code.push(Instruction::asbx(op, a, sbx));
        self.line_info.push(self.code.len() as u32);
        self
    }

    /// RETURN with a fixed value count.
    pub fn ret(&mut self, a: u32, nvals: u32) -> &mut Self {
        self.abc(OpCode::Return, a, nvals + 1, 0)
    }

    pub fn ret_none(&mut self) -> &mut Self {
        self.ret(0, 0)
    }

    pub fn pc(&self) -> usize {
        self.code.len()
    }

    pub fn build(self) -> Rc<Chunk> {
        Rc::new(Chunk {
            source: SmolStr::new(&self.source),
            code: self.code,
            constants: self.constants,
            upvalues: self.upvalues,
            protos: self.protos,
            param_count: self.param_count,
            is_vararg: self.is_vararg,
            max_stack: self.max_stack,
            line_info: self.line_info,
            locals: self.locals,
        })
    }
}

/// A VM with the full stdlib open.
pub fn new_vm() -> Box<LuaVM> {
    let mut vm = LuaVM::new();
    vm.open_stdlib(Stdlib::All).expect("stdlib load failed");
    vm
}


/// Build a closure over the globals environment without running it.
pub fn closure_with_env(vm: &mut LuaVM, chunk: Rc<Chunk>) -> LuaValue {
    let env = vm.create_closed_upvalue(vm.globals());
    vm.create_closure(chunk, vec![env])
}

pub fn int(i: i64) -> LuaValue {
    LuaValue::Integer(i)
}



/// Table with a metatable, both fresh; returns (table, metatable).
pub fn table_with_meta(vm: &mut LuaVM) -> (LuaValue, LuaValue) {
    let t = vm.create_table(0, 0);
    let mt = vm.create_table(0, 2);
    if let Some(tt) = t.as_table() {
        tt.borrow_mut().set_metatable(Some(mt.clone()));
    }
    (t, mt)
}

/// Set mt[event] = handler.
pub fn set_meta_field(vm: &mut LuaVM, mt: &LuaValue, event: &str, handler: LuaValue) {
    let key = vm.create_string(event);
    if let Some(t) = mt.as_table() {
        let _ = t.borrow_mut().raw_set(&key, handler);
    }
}
