// Coroutines: resume/yield round trips, state transitions, yields from
// inside __close handlers, and close semantics.

use std::rc::Rc;

use crate::lua_value::{Chunk, LuaValue, ThreadStatus};
use crate::lua_vm::{LuaVM, OpCode};

use super::support::{closure_with_env, int, new_vm, set_meta_field, table_with_meta, ChunkBuilder};

fn thread_status(co: &LuaValue) -> ThreadStatus {
    co.as_thread().expect("thread").borrow().status
}

/// S1 body: function(a, b) local c = coroutine.yield(a + b); return c * 2 end
fn s1_body(vm: &mut LuaVM) -> Rc<Chunk> {
    let mut b = ChunkBuilder::new("co_body").params(2).env_upvalue();
    let kco = b.k_str(vm, "coroutine");
    let kyield = b.k_str(vm, "yield");
    let k2 = b.k_int(2);
    let rkyield = b.rk(kyield);
    let rk2 = b.rk(k2);
    b.abx(OpCode::GetGlobal, 2, kco);
    b.abc(OpCode::GetTable, 2, 2, rkyield);
    b.abc(OpCode::Add, 3, 0, 1);
    b.abc(OpCode::Call, 2, 2, 2); // c = yield(a+b)
    b.abc(OpCode::Mul, 3, 2, rk2);
    b.ret(3, 1);
    b.build()
}

#[test]
fn test_basic_coroutine_round_trip() {
    let mut vm = new_vm();
    let body = s1_body(&mut vm);
    let func = closure_with_env(&mut vm, body);
    let co = vm.create_thread(func).unwrap();

    assert_eq!(thread_status(&co), ThreadStatus::Suspended);

    let (finished, vals) = vm.resume_thread(co.clone(), vec![int(3), int(4)]).unwrap();
    assert!(!finished);
    assert_eq!(vals, vec![int(7)]);
    assert_eq!(thread_status(&co), ThreadStatus::Suspended);

    let (finished, vals) = vm.resume_thread(co.clone(), vec![int(10)]).unwrap();
    assert!(finished);
    assert_eq!(vals, vec![int(20)]);
    assert_eq!(thread_status(&co), ThreadStatus::Dead);
}

#[test]
fn test_resume_dead_coroutine_errors() {
    let mut vm = new_vm();
    let body = s1_body(&mut vm);
    let func = closure_with_env(&mut vm, body);
    let co = vm.create_thread(func).unwrap();
    vm.resume_thread(co.clone(), vec![int(1), int(2)]).unwrap();
    vm.resume_thread(co.clone(), vec![int(0)]).unwrap();
    let err = vm.resume_thread(co, vec![]).unwrap_err();
    assert!(vm.describe_error(&err).contains("cannot resume dead coroutine"));
}

#[test]
fn test_resume_running_coroutine_errors() {
    // A coroutine that tries to resume itself.
    fn resume_self(vm: &mut LuaVM, a: crate::lua_vm::CallArgs) -> crate::lua_vm::LuaResult<Vec<LuaValue>> {
        let me = a.upvalue(0);
        vm.resume_thread(me, vec![]).map(|(_, v)| v)
    }
    let mut vm = new_vm();
    // Build the thread around a placeholder, then swap in the real body
    // that knows its own thread value.
    let placeholder = vm.create_native("noop", |_vm, _a| Ok(Vec::new()));
    let co = vm.create_thread(placeholder).unwrap();
    let body = vm.create_native_closure("resume_self", resume_self, vec![co.clone()]);
    if let Some(t) = co.as_thread() {
        t.borrow_mut().entry = Some(body);
    }
    let err = vm.resume_thread(co, vec![]).unwrap_err();
    assert!(vm
        .describe_error(&err)
        .contains("cannot resume non-suspended coroutine"));
}

#[test]
fn test_multi_value_yield_and_return() {
    // Round trip: resume args become yield results; yields surface in
    // order; the final return closes with Dead.
    let mut vm = new_vm();
    let mut b = ChunkBuilder::new("multi").env_upvalue();
    let kco = b.k_str(&mut vm, "coroutine");
    let kyield = b.k_str(&mut vm, "yield");
    let k1 = b.k_int(1);
    let k2 = b.k_int(2);
    let rkyield = b.rk(kyield);
    b.abx(OpCode::GetGlobal, 0, kco);
    b.abc(OpCode::GetTable, 0, 0, rkyield);
    b.abx(OpCode::LoadK, 1, k1);
    b.abx(OpCode::LoadK, 2, k2);
    b.abc(OpCode::Call, 0, 3, 0); // yield(1, 2), keep all results
    b.abc(OpCode::Return, 0, 0, 0); // return resume args
    let func = closure_with_env(&mut vm, b.build());
    let co = vm.create_thread(func).unwrap();

    let (finished, vals) = vm.resume_thread(co.clone(), vec![]).unwrap();
    assert!(!finished);
    assert_eq!(vals, vec![int(1), int(2)]);

    let (finished, vals) = vm
        .resume_thread(co, vec![int(30), int(40), int(50)])
        .unwrap();
    assert!(finished);
    assert_eq!(vals, vec![int(30), int(40), int(50)]);
}

#[test]
fn test_yield_inside_close_handler() {
    // S4: a __close that yields suspends the machine mid-close; the
    // captured return value arrives on the final resume.
    let mut vm = new_vm();

    // handler: function(self, err) coroutine.yield("mid") end
    let mut h = ChunkBuilder::new("closer").params(2).env_upvalue();
    let kco = h.k_str(&mut vm, "coroutine");
    let kyield = h.k_str(&mut vm, "yield");
    let kmid = h.k_str(&mut vm, "mid");
    let rkyield = h.rk(kyield);
    h.abx(OpCode::GetGlobal, 2, kco);
    h.abc(OpCode::GetTable, 2, 2, rkyield);
    h.abx(OpCode::LoadK, 3, kmid);
    h.abc(OpCode::Call, 2, 2, 1); // yield("mid")
    h.ret_none();
    let handler = closure_with_env(&mut vm, h.build());

    let (t, mt) = table_with_meta(&mut vm);
    set_meta_field(&mut vm, &mt, "__close", handler);

    // body: function(x) local x <close>; return "done" end
    let mut b = ChunkBuilder::new("body").params(1).env_upvalue();
    let kdone = b.k_str(&mut vm, "done");
    b.abc(OpCode::Tbc, 0, 0, 0);
    b.abx(OpCode::LoadK, 1, kdone);
    b.ret(1, 1);
    let func = closure_with_env(&mut vm, b.build());
    let co = vm.create_thread(func).unwrap();

    let (finished, vals) = vm.resume_thread(co.clone(), vec![t]).unwrap();
    assert!(!finished);
    assert_eq!(vals[0].display_string(), "mid");
    assert_eq!(thread_status(&co), ThreadStatus::Suspended);

    let (finished, vals) = vm.resume_thread(co.clone(), vec![]).unwrap();
    assert!(finished);
    assert_eq!(vals[0].display_string(), "done");
    assert_eq!(thread_status(&co), ThreadStatus::Dead);
}

#[test]
fn test_yield_from_outside_coroutine_errors() {
    let mut vm = new_vm();
    let mut b = ChunkBuilder::new("main").env_upvalue();
    let kco = b.k_str(&mut vm, "coroutine");
    let kyield = b.k_str(&mut vm, "yield");
    let rkyield = b.rk(kyield);
    b.abx(OpCode::GetGlobal, 0, kco);
    b.abc(OpCode::GetTable, 0, 0, rkyield);
    b.abc(OpCode::Call, 0, 1, 1);
    b.ret_none();
    let err = vm.execute(b.build()).unwrap_err();
    assert!(vm
        .describe_error(&err)
        .contains("attempt to yield from outside a coroutine"));
}

#[test]
fn test_yield_across_pcall_boundary_errors() {
    // pcall re-enters the trampoline from native code; a yield inside
    // cannot cross it.
    let mut vm = new_vm();

    // inner: function() coroutine.yield() end
    let mut inner = ChunkBuilder::new("inner").env_upvalue();
    let kco = inner.k_str(&mut vm, "coroutine");
    let kyield = inner.k_str(&mut vm, "yield");
    let rkyield = inner.rk(kyield);
    inner.abx(OpCode::GetGlobal, 0, kco);
    inner.abc(OpCode::GetTable, 0, 0, rkyield);
    inner.abc(OpCode::Call, 0, 1, 1);
    inner.ret_none();
    let inner = inner.build();

    // body: function() return pcall(inner) end
    let mut b = ChunkBuilder::new("body").env_upvalue();
    let kpcall = b.k_str(&mut vm, "pcall");
    let kp = b.proto(inner);
    b.abx(OpCode::GetGlobal, 0, kpcall);
    b.abx(OpCode::Closure, 1, kp);
    b.abc(OpCode::Call, 0, 2, 0);
    b.abc(OpCode::Return, 0, 0, 0);
    let func = closure_with_env(&mut vm, b.build());
    let co = vm.create_thread(func).unwrap();

    let (finished, vals) = vm.resume_thread(co, vec![]).unwrap();
    assert!(finished);
    // pcall reports (false, "attempt to yield across C-call boundary").
    assert_eq!(vals[0], LuaValue::Boolean(false));
    assert!(vals[1]
        .display_string()
        .contains("attempt to yield across C-call boundary"));
}

#[test]
fn test_coroutine_error_kills_thread() {
    let mut vm = new_vm();
    let mut b = ChunkBuilder::new("bad").env_upvalue();
    let kerr = b.k_str(&mut vm, "error");
    let kmsg = b.k_str(&mut vm, "exploded");
    b.abx(OpCode::GetGlobal, 0, kerr);
    b.abx(OpCode::LoadK, 1, kmsg);
    b.abc(OpCode::Call, 0, 2, 1);
    b.ret_none();
    let func = closure_with_env(&mut vm, b.build());
    let co = vm.create_thread(func).unwrap();

    let err = vm.resume_thread(co.clone(), vec![]).unwrap_err();
    assert!(vm.describe_error(&err).contains("exploded"));
    assert_eq!(thread_status(&co), ThreadStatus::Dead);
}

#[test]
fn test_close_suspended_coroutine_runs_pending_close() {
    // Close a coroutine parked inside a __close yield: the remaining
    // handlers must run, then the thread dies.
    let mut vm = new_vm();
    let log = vm.create_table(2, 0);
    vm.set_global("log", log.clone());

    // first closable: logs 1 (native, runs during coroutine.close)
    fn log_one(vm: &mut LuaVM, _a: crate::lua_vm::CallArgs) -> crate::lua_vm::LuaResult<Vec<LuaValue>> {
        let log = vm.get_global("log");
        if let Some(t) = log.as_table() {
            let len = t.borrow().len();
            t.borrow_mut().raw_seti(len + 1, int(1));
        }
        Ok(Vec::new())
    }
    let (t1, mt1) = table_with_meta(&mut vm);
    let c1 = vm.create_native("log_one", log_one);
    set_meta_field(&mut vm, &mt1, "__close", c1);

    // second closable: a Lua handler that yields
    let mut h = ChunkBuilder::new("yielding_closer").params(2).env_upvalue();
    let kco = h.k_str(&mut vm, "coroutine");
    let kyield = h.k_str(&mut vm, "yield");
    let rkyield = h.rk(kyield);
    h.abx(OpCode::GetGlobal, 2, kco);
    h.abc(OpCode::GetTable, 2, 2, rkyield);
    h.abc(OpCode::Call, 2, 1, 1);
    h.ret_none();
    let yielding = closure_with_env(&mut vm, h.build());
    let (t2, mt2) = table_with_meta(&mut vm);
    set_meta_field(&mut vm, &mt2, "__close", yielding);

    // body(a, b): both <close>, then return
    let mut b = ChunkBuilder::new("body").params(2).env_upvalue();
    b.abc(OpCode::Tbc, 0, 0, 0);
    b.abc(OpCode::Tbc, 1, 0, 0);
    b.ret_none();
    let func = closure_with_env(&mut vm, b.build());
    let co = vm.create_thread(func).unwrap();

    // First resume: runs to RETURN, second closable yields mid-close.
    let (finished, _) = vm.resume_thread(co.clone(), vec![t1, t2]).unwrap();
    assert!(!finished);
    assert_eq!(thread_status(&co), ThreadStatus::Suspended);

    // coroutine.close drives the rest of the chain synchronously.
    vm.close_thread(co.clone()).unwrap();
    assert_eq!(thread_status(&co), ThreadStatus::Dead);
    let logged = log.as_table().unwrap().borrow().raw_geti(1);
    assert_eq!(logged, int(1));
}

#[test]
fn test_close_fresh_and_dead_coroutines() {
    let mut vm = new_vm();
    let noop = vm.create_native("noop", |_vm, _a| Ok(Vec::new()));
    let co = vm.create_thread(noop).unwrap();
    // Never started: close succeeds immediately.
    vm.close_thread(co.clone()).unwrap();
    assert_eq!(thread_status(&co), ThreadStatus::Dead);
    // Closing a dead coroutine is a no-op.
    vm.close_thread(co).unwrap();
}

#[test]
fn test_coroutine_stdlib_surface() {
    // Drive the whole thing through the library functions, as a script
    // would: create/resume/status.
    let mut vm = new_vm();
    let body = s1_body(&mut vm);
    let body_fn = closure_with_env(&mut vm, body);
    vm.set_global("f", body_fn);

    let mut b = ChunkBuilder::new("main").env_upvalue();
    let kco = b.k_str(&mut vm, "coroutine");
    let kcreate = b.k_str(&mut vm, "create");
    let kresume = b.k_str(&mut vm, "resume");
    let kstatus = b.k_str(&mut vm, "status");
    let kf = b.k_str(&mut vm, "f");
    let k3 = b.k_int(3);
    let k4 = b.k_int(4);
    let k10 = b.k_int(10);
    let (rkcreate, rkresume, rkstatus) = (b.rk(kcreate), b.rk(kresume), b.rk(kstatus));
    b.abx(OpCode::GetGlobal, 0, kco);
    b.abc(OpCode::GetTable, 1, 0, rkcreate);
    b.abx(OpCode::GetGlobal, 2, kf);
    b.abc(OpCode::Call, 1, 2, 2); // co = coroutine.create(f) -> R1
    b.abc(OpCode::GetTable, 2, 0, rkresume);
    b.abc(OpCode::Move, 3, 1, 0);
    b.abx(OpCode::LoadK, 4, k3);
    b.abx(OpCode::LoadK, 5, k4);
    b.abc(OpCode::Call, 2, 4, 3); // ok1, v1 = resume(co, 3, 4) -> R2, R3
    b.abc(OpCode::GetTable, 4, 0, rkresume);
    b.abc(OpCode::Move, 5, 1, 0);
    b.abx(OpCode::LoadK, 6, k10);
    b.abc(OpCode::Call, 4, 3, 3); // ok2, v2 = resume(co, 10) -> R4, R5
    b.abc(OpCode::GetTable, 6, 0, rkstatus);
    b.abc(OpCode::Move, 7, 1, 0);
    b.abc(OpCode::Call, 6, 2, 2); // s = status(co) -> R6
    b.ret(2, 5); // ok1, v1, ok2, v2, s
    let r = vm.execute(b.build()).unwrap();
    assert_eq!(r[0], LuaValue::Boolean(true));
    assert_eq!(r[1], int(7));
    assert_eq!(r[2], LuaValue::Boolean(true));
    assert_eq!(r[3], int(20));
    assert_eq!(r[4].display_string(), "dead");
}

#[test]
fn test_coroutine_wrap() {
    let mut vm = new_vm();
    let body = s1_body(&mut vm);
    let body_fn = closure_with_env(&mut vm, body);
    vm.set_global("f", body_fn);

    let mut b = ChunkBuilder::new("main").env_upvalue();
    let kco = b.k_str(&mut vm, "coroutine");
    let kwrap = b.k_str(&mut vm, "wrap");
    let kf = b.k_str(&mut vm, "f");
    let k3 = b.k_int(3);
    let k4 = b.k_int(4);
    let k10 = b.k_int(10);
    let rkwrap = b.rk(kwrap);
    b.abx(OpCode::GetGlobal, 0, kco);
    b.abc(OpCode::GetTable, 0, 0, rkwrap);
    b.abx(OpCode::GetGlobal, 1, kf);
    b.abc(OpCode::Call, 0, 2, 2); // g = wrap(f)
    b.abc(OpCode::Move, 1, 0, 0);
    b.abx(OpCode::LoadK, 2, k3);
    b.abx(OpCode::LoadK, 3, k4);
    b.abc(OpCode::Call, 1, 3, 2); // g(3, 4) -> 7 (no ok flag)
    b.abc(OpCode::Move, 2, 0, 0);
    b.abx(OpCode::LoadK, 3, k10);
    b.abc(OpCode::Call, 2, 2, 2); // g(10) -> 20
    b.ret(1, 2);
    let r = vm.execute(b.build()).unwrap();
    assert_eq!(r, vec![int(7), int(20)]);
}

#[test]
fn test_normal_status_during_nested_resume() {
    // While co2 runs, co1 (which resumed it) reports "normal".
    fn probe(vm: &mut LuaVM, a: crate::lua_vm::CallArgs) -> crate::lua_vm::LuaResult<Vec<LuaValue>> {
        let co1 = a.upvalue(0);
        let status = thread_status(&co1);
        let _ = vm;
        Ok(vec![LuaValue::Boolean(status == ThreadStatus::Normal)])
    }
    let mut vm = new_vm();
    let placeholder = vm.create_native("noop", |_vm, _a| Ok(Vec::new()));
    let co1 = vm.create_thread(placeholder).unwrap();
    let co2_body = vm.create_native_closure("probe", probe, vec![co1.clone()]);
    let co2 = vm.create_thread(co2_body).unwrap();

    fn outer(vm: &mut LuaVM, a: crate::lua_vm::CallArgs) -> crate::lua_vm::LuaResult<Vec<LuaValue>> {
        let co2 = a.upvalue(0);
        vm.resume_thread(co2, vec![]).map(|(_, v)| v)
    }
    let co1_body = vm.create_native_closure("outer", outer, vec![co2]);
    if let Some(t) = co1.as_thread() {
        t.borrow_mut().entry = Some(co1_body);
    }
    let (finished, vals) = vm.resume_thread(co1, vec![]).unwrap();
    assert!(finished);
    assert_eq!(vals, vec![LuaValue::Boolean(true)]);
}
