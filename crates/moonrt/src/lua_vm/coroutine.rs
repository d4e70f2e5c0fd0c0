// Coroutine scheduling: resume, yield, close.
//
// Resume swaps the whole per-thread execution state (exec stack, current
// frame, yield-legality counters) and runs the trampoline at watermark
// zero. A yield surfaces there as the Yield sentinel; the state is then
// snapshotted into the thread and the outer state swapped back. Frames
// stay in the arena across suspension.

use crate::lua_value::{LuaFunction, LuaThread, LuaValue, ResumeMode, ResumptionState, ThreadStatus};
use crate::lua_vm::execute::call::{call_native, push_lua_frame};
use crate::lua_vm::execute::{lua_execute, Entry};
use crate::lua_vm::{ExecContext, FrameId, LuaError, LuaResult, LuaVM};

/// The running thread's execution registers, parked while it resumes
/// another thread (or is being closed).
pub(crate) struct SavedThreadExec {
    pub thread: LuaValue,
    pub exec_stack: Vec<ExecContext>,
    pub current_frame: Option<FrameId>,
    pub c_boundary: usize,
    pub non_yieldable: usize,
    pub closing_thread: bool,
}

impl LuaVM {
    /// coroutine.create: a Suspended thread with `func` pending.
    pub fn create_thread(&mut self, func: LuaValue) -> LuaResult<LuaValue> {
        if !func.is_function() {
            return Err(self.rt_error("cannot create coroutine from a non-function value"));
        }
        Ok(self.alloc_thread(LuaThread::new_coroutine(func)))
    }

    /// Is a yield legal right now? Requires a running coroutine and no
    /// native re-entry between here and its resume point.
    pub fn can_yield(&self) -> bool {
        !self.thread_stack.is_empty() && self.c_boundary == 0 && self.non_yieldable == 0
    }

    /// coroutine.yield: produce the sentinel that unwinds to resume, or
    /// the error explaining why it cannot.
    pub fn do_yield(&mut self, values: Vec<LuaValue>) -> LuaError {
        if self.thread_stack.is_empty() {
            return self.rt_error("attempt to yield from outside a coroutine");
        }
        if self.c_boundary > 0 || self.non_yieldable > 0 {
            return self.rt_error("attempt to yield across C-call boundary");
        }
        LuaError::Yield(values)
    }

    /// coroutine.resume. Ok((true, values)) means the coroutine
    /// finished; Ok((false, values)) means it yielded; Err carries an
    /// error raised inside it (the thread is then dead).
    pub fn resume_thread(
        &mut self,
        thread_val: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<(bool, Vec<LuaValue>)> {
        let Some(thread) = thread_val.as_thread().cloned() else {
            return Err(self.rt_error("cannot resume a non-thread value"));
        };
        {
            let th = thread.borrow();
            match th.status {
                ThreadStatus::Suspended => {}
                ThreadStatus::Dead => return Err(self.rt_error("cannot resume dead coroutine")),
                ThreadStatus::Running | ThreadStatus::Normal => {
                    return Err(self.rt_error("cannot resume non-suspended coroutine"));
                }
            }
        }

        self.switch_to_thread(&thread_val, false);
        thread.borrow_mut().status = ThreadStatus::Running;

        let entry_func = thread.borrow_mut().entry.take();
        let resumption = if entry_func.is_some() {
            None
        } else {
            thread.borrow_mut().resumption.take()
        };
        let outcome = match (entry_func, resumption) {
            (Some(func), _) => self.start_thread_body(func, args),
            (None, Some(state)) => {
                self.exec_stack = state.exec_stack;
                self.current_frame = Some(state.current_frame);
                debug_assert!(matches!(state.mode, ResumeMode::DeliverCall));
                lua_execute(self, 0, Entry::Deliver(args))
            }
            (None, None) => Err(self.rt_error("cannot resume dead coroutine")),
        };

        match outcome {
            Ok(values) => {
                thread.borrow_mut().status = ThreadStatus::Dead;
                self.switch_back();
                Ok((true, values))
            }
            Err(LuaError::Yield(values)) => {
                let exec_stack = std::mem::take(&mut self.exec_stack);
                let Some(current_frame) = self.current_frame.take() else {
                    self.switch_back();
                    return Err(self.rt_error("yield with no active frame"));
                };
                {
                    let mut th = thread.borrow_mut();
                    th.status = ThreadStatus::Suspended;
                    th.resumption = Some(ResumptionState {
                        exec_stack,
                        current_frame,
                        mode: ResumeMode::DeliverCall,
                    });
                }
                self.switch_back();
                Ok((false, values))
            }
            Err(e) => {
                {
                    let mut th = thread.borrow_mut();
                    th.status = ThreadStatus::Dead;
                    th.death_error = Some(e.value());
                }
                self.switch_back();
                Err(e)
            }
        }
    }

    /// First resume: run the body function with the resume arguments as
    /// its parameters. Native bodies run to completion and may not yield.
    fn start_thread_body(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        let is_native = matches!(func.as_function().map(|f| &**f), Some(LuaFunction::Native(_)));
        if is_native {
            self.non_yieldable += 1;
            let r = call_native(self, &func, args);
            self.non_yieldable -= 1;
            return r;
        }
        push_lua_frame(self, func, args)?;
        lua_execute(self, 0, Entry::Dispatch)
    }

    /// coroutine.close: drive the suspended thread's pending __close
    /// chain to completion and mark it dead. Errors raised by handlers
    /// surface here (chained, last one wins).
    pub fn close_thread(&mut self, thread_val: LuaValue) -> LuaResult<()> {
        let Some(thread) = thread_val.as_thread().cloned() else {
            return Err(self.rt_error("cannot close a non-thread value"));
        };
        {
            let th = thread.borrow();
            match th.status {
                ThreadStatus::Dead => return Ok(()),
                ThreadStatus::Suspended => {}
                ThreadStatus::Running | ThreadStatus::Normal => {
                    return Err(self.rt_error("cannot close a running coroutine"));
                }
            }
        }

        // Never started: nothing pending.
        let never_started = {
            let mut th = thread.borrow_mut();
            if th.entry.take().is_some() {
                th.status = ThreadStatus::Dead;
                true
            } else {
                false
            }
        };
        if never_started {
            return Ok(());
        }

        let state = thread.borrow_mut().resumption.take();
        let Some(state) = state else {
            thread.borrow_mut().status = ThreadStatus::Dead;
            return Ok(());
        };

        self.switch_to_thread(&thread_val, true);
        thread.borrow_mut().status = ThreadStatus::Running;
        self.exec_stack = state.exec_stack;
        self.current_frame = Some(state.current_frame);
        self.non_yieldable += 1;

        let outcome = lua_execute(self, 0, Entry::Unwind(None));

        self.non_yieldable -= 1;
        thread.borrow_mut().status = ThreadStatus::Dead;
        self.switch_back();
        outcome.map(|_| ())
    }

    /// Park the running thread's execution state and make `thread_val`
    /// current with a clean slate.
    fn switch_to_thread(&mut self, thread_val: &LuaValue, closing: bool) {
        let saved = SavedThreadExec {
            thread: self.current_thread.clone(),
            exec_stack: std::mem::take(&mut self.exec_stack),
            current_frame: self.current_frame.take(),
            c_boundary: self.c_boundary,
            non_yieldable: self.non_yieldable,
            closing_thread: self.closing_thread,
        };
        if let Some(prev) = saved.thread.as_thread() {
            let mut th = prev.borrow_mut();
            if th.status == ThreadStatus::Running {
                th.status = ThreadStatus::Normal;
            }
        }
        self.thread_stack.push(saved);
        self.current_thread = thread_val.clone();
        self.c_boundary = 0;
        self.non_yieldable = 0;
        self.closing_thread = closing;
        self.refresh_hook_flag();
    }

    /// Undo `switch_to_thread`.
    fn switch_back(&mut self) {
        let Some(saved) = self.thread_stack.pop() else {
            return;
        };
        self.current_thread = saved.thread;
        self.exec_stack = saved.exec_stack;
        self.current_frame = saved.current_frame;
        self.c_boundary = saved.c_boundary;
        self.non_yieldable = saved.non_yieldable;
        self.closing_thread = saved.closing_thread;
        if let Some(cur) = self.current_thread.as_thread() {
            let mut th = cur.borrow_mut();
            if th.status == ThreadStatus::Normal {
                th.status = ThreadStatus::Running;
            }
        }
        self.refresh_hook_flag();
    }
}
