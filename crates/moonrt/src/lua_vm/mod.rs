// The virtual machine.
//
// LuaVM owns everything global: the globals table, the string interner,
// the frame arena, and the execution registers of whichever thread is
// running. Execution itself lives in `execute` (trampoline), `dispatcher`
// (per-instruction semantics) and `coroutine` (thread switching).

mod const_string;
mod coroutine;
pub(crate) mod debug_info;
pub mod dispatcher;
pub mod execute;
mod frame_arena;
mod lua_error;
mod lua_frame;
mod lua_limits;
pub mod opcode;

use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::{
    Chunk, HookMask, LuaClosure, LuaFunction, LuaNative, LuaStr, LuaTable, LuaThread, LuaValue,
    StringInterner, Upvalue, UpvaluePtr,
};

pub(crate) use const_string::ConstString;
use coroutine::SavedThreadExec;
pub use execute::{get_metamethod_event, get_metatable, TmKind};
pub use frame_arena::{FrameArena, FrameId};
pub use lua_error::{LuaError, LuaResult, RuntimeError, TraceFrame};
pub use lua_frame::{CloseAction, CloseState, ExecContext, LuaFrame, TbcEntry};
pub use lua_limits::LuaLimits;
pub use opcode::{Instruction, OpCode};

use execute::call::call_function;
use opcode::Instruction as Ins;

/// Native function: takes the VM and its arguments, returns its results.
pub type CFunction = fn(&mut LuaVM, CallArgs) -> LuaResult<Vec<LuaValue>>;

/// What a native function receives: positional arguments plus the values
/// captured when the native closure was created.
pub struct CallArgs {
    pub args: Vec<LuaValue>,
    pub upvalues: Vec<LuaValue>,
}

impl CallArgs {
    /// Argument `i` (zero-based), nil when absent.
    pub fn arg(&self, i: usize) -> LuaValue {
        self.args.get(i).cloned().unwrap_or(LuaValue::Nil)
    }

    pub fn upvalue(&self, i: usize) -> LuaValue {
        self.upvalues.get(i).cloned().unwrap_or(LuaValue::Nil)
    }
}

/// Seam for the external compiler pipeline: hosts that want
/// `execute_source` install one.
pub trait ChunkCompiler {
    fn compile(&mut self, vm: &mut LuaVM, source: &[u8], chunk_name: &str) -> LuaResult<Chunk>;
}

pub struct LuaVM {
    pub(crate) globals: LuaValue,
    pub(crate) interner: StringInterner,
    pub(crate) const_strings: ConstString,
    pub(crate) frames: FrameArena,
    /// Shared metatable for all strings (the string library installs it).
    pub(crate) string_mt: Option<LuaValue>,
    pub(crate) limits: LuaLimits,

    // Execution registers of the running thread.
    pub(crate) current_thread: LuaValue,
    pub(crate) main_thread: LuaValue,
    pub(crate) exec_stack: Vec<ExecContext>,
    pub(crate) current_frame: Option<FrameId>,
    /// Parked execution states of threads down the resume chain.
    pub(crate) thread_stack: Vec<SavedThreadExec>,

    /// Native nesting (direct calls and trampoline re-entries); bounds
    /// recursion together with the exec stack.
    pub(crate) native_depth: usize,
    /// Trampoline re-entries from native code since the last thread
    /// switch: non-zero means a yield cannot reach its resume point.
    pub(crate) c_boundary: usize,
    /// Sections that must not yield (native __close, native coroutine
    /// bodies, thread close).
    pub(crate) non_yieldable: usize,
    /// coroutine.close drains scopes without resuming execution.
    pub(crate) closing_thread: bool,
    /// Mirror of the current thread's "has hooks" bit, checked per
    /// instruction without touching the RefCell.
    pub(crate) hooks_armed: bool,

    pub(crate) compiler: Option<Box<dyn ChunkCompiler>>,
    pub(crate) rng: rand::rngs::StdRng,
}

impl LuaVM {
    pub fn new() -> Box<Self> {
        Self::with_limits(LuaLimits::default())
    }

    pub fn with_limits(limits: LuaLimits) -> Box<Self> {
        let mut interner = StringInterner::new();
        let const_strings = ConstString::new(&mut interner);
        let main_thread = LuaValue::Thread(Rc::new(RefCell::new(LuaThread::new_main())));
        let globals = LuaValue::Table(Rc::new(RefCell::new(LuaTable::with_capacity(0, 32))));

        let mut vm = Box::new(LuaVM {
            globals: globals.clone(),
            interner,
            const_strings,
            frames: FrameArena::new(),
            string_mt: None,
            limits,
            current_thread: main_thread.clone(),
            main_thread,
            exec_stack: Vec::new(),
            current_frame: None,
            thread_stack: Vec::new(),
            native_depth: 0,
            c_boundary: 0,
            non_yieldable: 0,
            closing_thread: false,
            hooks_armed: false,
            compiler: None,
            rng: rand::SeedableRng::seed_from_u64(0x2545_f491_4f6c_dd1d),
        });

        vm.set_global("_G", globals);
        vm
    }

    /// Load the selected standard library modules into the globals.
    pub fn open_stdlib(&mut self, lib: crate::stdlib::Stdlib) -> LuaResult<()> {
        crate::lib_registry::create_standard_registry(lib).load_all(self)
    }

    // ============ execution surface ============

    /// Run a compiled chunk in the main thread. The chunk gets an `_ENV`
    /// upvalue bound to the globals table, per Lua 5.4 convention.
    pub fn execute(&mut self, chunk: Rc<Chunk>) -> LuaResult<Vec<LuaValue>> {
        let env = self.create_closed_upvalue(self.globals.clone());
        let func = self.create_closure(chunk, vec![env]);
        call_function(self, func, Vec::new())
    }

    /// Compile through the installed `ChunkCompiler`, then execute.
    pub fn execute_source(&mut self, source: &[u8], chunk_name: &str) -> LuaResult<Vec<LuaValue>> {
        let Some(mut compiler) = self.compiler.take() else {
            return Err(self.rt_error("no compiler installed (see LuaVM::set_compiler)"));
        };
        let compiled = compiler.compile(self, source, chunk_name);
        self.compiler = Some(compiler);
        self.execute(Rc::new(compiled?))
    }

    pub fn set_compiler(&mut self, compiler: Box<dyn ChunkCompiler>) {
        self.compiler = Some(compiler);
    }

    /// Call any callable value with arguments.
    pub fn call(&mut self, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        call_function(self, func, args)
    }

    /// pcall semantics: (true, results) or (false, error value). Yields
    /// pass through untouched.
    pub fn protected_call(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<(bool, Vec<LuaValue>)> {
        match call_function(self, func, args) {
            Ok(values) => Ok((true, values)),
            Err(LuaError::Runtime(e)) => Ok((false, vec![e.value])),
            Err(y) => Err(y),
        }
    }

    /// xpcall semantics: the message handler runs inside the protected
    /// context; a failing handler degrades to a fixed message.
    pub fn protected_call_with_handler(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        handler: LuaValue,
    ) -> LuaResult<(bool, Vec<LuaValue>)> {
        match call_function(self, func, args) {
            Ok(values) => Ok((true, values)),
            Err(LuaError::Runtime(e)) => match call_function(self, handler, vec![e.value]) {
                Ok(hv) => Ok((false, vec![hv.into_iter().next().unwrap_or(LuaValue::Nil)])),
                Err(LuaError::Runtime(_)) => {
                    let msg = self.create_string("error in error handling");
                    Ok((false, vec![msg]))
                }
                Err(y) => Err(y),
            },
            Err(y) => Err(y),
        }
    }

    // ============ globals ============

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        let key = self.create_string(name);
        if let Some(t) = self.globals.as_table() {
            // Globals writes from the host bypass metamethods.
            let _ = t.borrow_mut().raw_set(&key, value);
        }
    }

    pub fn get_global(&mut self, name: &str) -> LuaValue {
        let key = self.create_string(name);
        match self.globals.as_table() {
            Some(t) => t.borrow().raw_get(&key),
            None => LuaValue::Nil,
        }
    }

    pub fn globals(&self) -> LuaValue {
        self.globals.clone()
    }

    // ============ value constructors ============

    pub fn intern(&mut self, s: &str) -> LuaStr {
        self.interner.intern_str(s)
    }

    pub fn create_string(&mut self, s: &str) -> LuaValue {
        LuaValue::String(self.interner.intern_str(s))
    }

    pub fn create_string_bytes(&mut self, bytes: &[u8]) -> LuaValue {
        LuaValue::String(self.interner.intern(bytes))
    }

    pub fn create_string_owned(&mut self, bytes: Vec<u8>) -> LuaValue {
        LuaValue::String(self.interner.intern_owned(bytes))
    }

    pub fn create_table(&mut self, narr: usize, nhash: usize) -> LuaValue {
        self.alloc_table(LuaTable::with_capacity(narr, nhash))
    }

    pub fn alloc_table(&mut self, table: LuaTable) -> LuaValue {
        LuaValue::Table(Rc::new(RefCell::new(table)))
    }

    pub(crate) fn alloc_thread(&mut self, thread: LuaThread) -> LuaValue {
        LuaValue::Thread(Rc::new(RefCell::new(thread)))
    }

    pub fn create_closure(&mut self, chunk: Rc<Chunk>, upvalues: Vec<UpvaluePtr>) -> LuaValue {
        LuaValue::Function(Rc::new(LuaFunction::Lua(LuaClosure { chunk, upvalues })))
    }

    pub fn create_closed_upvalue(&mut self, value: LuaValue) -> UpvaluePtr {
        Rc::new(RefCell::new(Upvalue::Closed(value)))
    }

    pub fn create_native(&mut self, name: &str, func: CFunction) -> LuaValue {
        self.create_native_closure(name, func, Vec::new())
    }

    /// Native closure with captured values (coroutine.wrap style).
    pub fn create_native_closure(
        &mut self,
        name: &str,
        func: CFunction,
        upvalues: Vec<LuaValue>,
    ) -> LuaValue {
        LuaValue::Function(Rc::new(LuaFunction::Native(LuaNative {
            name: SmolStr::new(name),
            func,
            upvalues,
        })))
    }

    pub fn create_userdata(&mut self, data: Box<dyn std::any::Any>) -> LuaValue {
        LuaValue::Userdata(Rc::new(RefCell::new(crate::lua_value::LuaUserdata::new(
            data,
        ))))
    }

    /// Install the shared string metatable (string library setup).
    pub fn set_string_metatable(&mut self, mt: LuaValue) {
        self.string_mt = Some(mt);
    }

    pub fn main_thread(&self) -> LuaValue {
        self.main_thread.clone()
    }

    pub fn current_thread(&self) -> LuaValue {
        self.current_thread.clone()
    }

    // ============ hooks ============

    /// Configure the debug hook of `thread` (None = current thread).
    /// `mask` uses the conventional "crl" spec letters; `count` > 0 arms
    /// the count hook.
    pub fn set_hook(
        &mut self,
        thread: Option<LuaValue>,
        mask: &str,
        count: u32,
        func: Option<LuaValue>,
    ) -> LuaResult<()> {
        let target = thread.unwrap_or_else(|| self.current_thread.clone());
        let Some(t) = target.as_thread() else {
            return Err(self.rt_error("cannot set hook on a non-thread value"));
        };
        {
            let mut th = t.borrow_mut();
            let mut m = HookMask::from_spec(mask);
            m.count = count > 0;
            th.hooks.mask = m;
            th.hooks.count = count;
            th.hooks.counter = 0;
            th.hooks.last_line = None;
            th.hooks.func = func;
        }
        self.refresh_hook_flag();
        Ok(())
    }

    pub(crate) fn refresh_hook_flag(&mut self) {
        self.hooks_armed = match self.current_thread.as_thread() {
            Some(t) => t.borrow().hooks.is_set(),
            None => false,
        };
    }

    // ============ frame plumbing ============

    #[inline]
    pub(crate) fn frame(&self, fid: FrameId) -> &LuaFrame {
        self.frames.get(fid)
    }

    #[inline]
    pub(crate) fn frame_mut(&mut self, fid: FrameId) -> &mut LuaFrame {
        self.frames.get_mut(fid)
    }

    #[inline]
    pub(crate) fn cur(&mut self) -> LuaResult<FrameId> {
        match self.current_frame {
            Some(fid) => Ok(fid),
            None => Err(self.rt_error("no active frame")),
        }
    }

    #[inline]
    pub(crate) fn reg(&mut self, i: usize) -> LuaResult<LuaValue> {
        let fid = self.cur()?;
        Ok(self.frame(fid).reg(i))
    }

    #[inline]
    pub(crate) fn set_reg(&mut self, i: usize, value: LuaValue) -> LuaResult<()> {
        let fid = self.cur()?;
        self.frame_mut(fid).set_reg(i, value);
        Ok(())
    }

    pub(crate) fn constant(&mut self, index: usize) -> LuaResult<LuaValue> {
        let fid = self.cur()?;
        match self.frame(fid).chunk.constants.get(index) {
            Some(k) => Ok(k.clone()),
            None => Err(self.rt_error(format!("no constant at index {}", index))),
        }
    }

    /// RK operand: register when bit 8 is clear, constant otherwise.
    pub(crate) fn rk(&mut self, operand: usize) -> LuaResult<LuaValue> {
        if Ins::is_k(operand) {
            self.constant(Ins::rk_index(operand))
        } else {
            self.reg(operand)
        }
    }

    pub(crate) fn check_call_depth(&mut self) -> LuaResult<()> {
        if self.exec_stack.len() + self.native_depth >= self.limits.max_call_depth {
            return Err(self.rt_error("C stack overflow"));
        }
        Ok(())
    }

    // ============ errors ============

    /// Current Lua source location, when a Lua frame is active.
    pub(crate) fn current_location(&self) -> Option<(SmolStr, u32)> {
        let fid = self.current_frame?;
        let frame = self.frame(fid);
        Some((frame.chunk.source.clone(), frame.line()))
    }

    /// Location `level` Lua frames up: 0 is the running frame.
    pub fn location_at_level(&self, level: usize) -> Option<(SmolStr, u32)> {
        let mut n = level;
        if let Some(fid) = self.current_frame {
            if n == 0 {
                let f = self.frame(fid);
                return Some((f.chunk.source.clone(), f.line()));
            }
            n -= 1;
        }
        for ctx in self.exec_stack.iter().rev() {
            let fid = match ctx {
                ExecContext::Call { frame, .. } => *frame,
                ExecContext::Close(cs) => cs.frame,
            };
            if n == 0 {
                let f = self.frame(fid);
                return Some((f.chunk.source.clone(), f.line()));
            }
            n -= 1;
        }
        None
    }

    pub(crate) fn build_traceback(&self) -> Vec<TraceFrame> {
        let mut frames = Vec::new();
        if let Some(fid) = self.current_frame {
            let f = self.frame(fid);
            frames.push(TraceFrame {
                source: f.chunk.source.clone(),
                line: f.line(),
                is_native: false,
            });
        }
        for ctx in self.exec_stack.iter().rev() {
            let fid = match ctx {
                ExecContext::Call { frame, .. } => *frame,
                ExecContext::Close(cs) => cs.frame,
            };
            let f = self.frame(fid);
            frames.push(TraceFrame {
                source: f.chunk.source.clone(),
                line: f.line(),
                is_native: false,
            });
        }
        frames
    }

    /// A runtime error with the conventional "source:line:" prefix and a
    /// traceback of the current stack.
    pub(crate) fn rt_error_value(&mut self, msg: impl Into<String>) -> Box<RuntimeError> {
        let msg = msg.into();
        let annotated = match self.current_location() {
            Some((source, line)) => format!("{}:{}: {}", source, line, msg),
            None => msg,
        };
        let value = self.create_string(&annotated);
        Box::new(RuntimeError {
            value,
            traceback: self.build_traceback(),
        })
    }

    pub(crate) fn rt_error(&mut self, msg: impl Into<String>) -> LuaError {
        LuaError::Runtime(self.rt_error_value(msg))
    }

    /// An error carrying `value` untouched (the `error(v)` path for
    /// non-string values, or pre-annotated strings).
    pub fn error_from_value(&mut self, value: LuaValue) -> LuaError {
        LuaError::Runtime(Box::new(RuntimeError {
            value,
            traceback: self.build_traceback(),
        }))
    }

    /// Render an error the way the reference interpreter reports it.
    pub fn describe_error(&self, e: &LuaError) -> String {
        match e {
            LuaError::Runtime(re) => re.to_string(),
            LuaError::Yield(_) => "attempt to yield from outside a coroutine".to_string(),
        }
    }

    // ============ misc ============

    pub(crate) fn reseed_random(&mut self, seed: u64) {
        self.rng = rand::SeedableRng::seed_from_u64(seed);
    }
}
