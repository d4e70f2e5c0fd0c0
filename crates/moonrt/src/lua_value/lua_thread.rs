// Coroutine objects.
//
// A suspended coroutine owns a ResumptionState: the trampoline's exec
// stack (including any in-flight close-scope contexts), the frame that
// was dispatching when the yield unwound, and how resume arguments are to
// be delivered. Frames themselves stay in the VM frame arena; the thread
// only holds handles.

use crate::lua_value::LuaValue;
use crate::lua_vm::{ExecContext, FrameId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Not started, or yielded.
    Suspended,
    /// The thread currently executing.
    Running,
    /// Resumed another coroutine and is waiting for it.
    Normal,
    /// Returned, errored, or closed.
    Dead,
}

impl ThreadStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ThreadStatus::Suspended => "suspended",
            ThreadStatus::Running => "running",
            ThreadStatus::Normal => "normal",
            ThreadStatus::Dead => "dead",
        }
    }
}

/// How resume arguments reach the suspended execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// The yield unwound from a call site in the current frame (the pc
    /// still points at the CALL/TFORCALL): store the arguments through
    /// ResultStorage there, advance past it, continue.
    DeliverCall,
}

pub struct ResumptionState {
    pub exec_stack: Vec<ExecContext>,
    pub current_frame: FrameId,
    pub mode: ResumeMode,
}

/// Hook events a thread can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookMask {
    pub call: bool,
    pub ret: bool,
    pub line: bool,
    pub count: bool,
}

impl HookMask {
    pub fn from_spec(spec: &str) -> HookMask {
        HookMask {
            call: spec.contains('c'),
            ret: spec.contains('r'),
            line: spec.contains('l'),
            count: false,
        }
    }

    pub fn any(&self) -> bool {
        self.call || self.ret || self.line || self.count
    }
}

/// Per-thread hook configuration and firing state.
#[derive(Default)]
pub struct HookState {
    pub mask: HookMask,
    pub count: u32,
    pub counter: u32,
    pub func: Option<LuaValue>,
    /// Re-entrance suppression: no hooks fire while a hook runs.
    pub in_hook: bool,
    pub last_line: Option<u32>,
}

impl HookState {
    pub fn is_set(&self) -> bool {
        self.func.is_some() && (self.mask.any() || self.count > 0)
    }
}

pub struct LuaThread {
    pub status: ThreadStatus,
    pub is_main: bool,
    /// The body function, consumed by the first resume.
    pub entry: Option<LuaValue>,
    pub resumption: Option<ResumptionState>,
    /// Error that killed the thread, for status reporting.
    pub death_error: Option<LuaValue>,
    pub hooks: HookState,
}

impl LuaThread {
    pub fn new_main() -> Self {
        LuaThread {
            status: ThreadStatus::Running,
            is_main: true,
            entry: None,
            resumption: None,
            death_error: None,
            hooks: HookState::default(),
        }
    }

    pub fn new_coroutine(entry: LuaValue) -> Self {
        LuaThread {
            status: ThreadStatus::Suspended,
            is_main: false,
            entry: Some(entry),
            resumption: None,
            death_error: None,
            hooks: HookState::default(),
        }
    }
}
