// Metamethod resolution.
//
// Binary events look on the left operand first, then the right. __eq has
// the extra identity rule: it fires only when both operands share the
// same metatable reference.

use std::rc::Rc;

use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaResult, LuaVM};

use super::call::call_function;

/// Tag-method kinds, in event-name array order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TmKind {
    Index = 0,
    NewIndex,
    Eq,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
    Len,
    Concat,
    Call,
    Close,
}

impl TmKind {
    pub const COUNT: usize = TmKind::Close as usize + 1;

    pub fn from_usize(i: usize) -> TmKind {
        debug_assert!(i < Self::COUNT);
        unsafe { std::mem::transmute(i) }
    }

    /// The metatable field name for this event.
    pub fn event(self) -> &'static str {
        match self {
            TmKind::Index => "__index",
            TmKind::NewIndex => "__newindex",
            TmKind::Eq => "__eq",
            TmKind::Lt => "__lt",
            TmKind::Le => "__le",
            TmKind::Add => "__add",
            TmKind::Sub => "__sub",
            TmKind::Mul => "__mul",
            TmKind::Div => "__div",
            TmKind::Mod => "__mod",
            TmKind::Pow => "__pow",
            TmKind::IDiv => "__idiv",
            TmKind::BAnd => "__band",
            TmKind::BOr => "__bor",
            TmKind::BXor => "__bxor",
            TmKind::Shl => "__shl",
            TmKind::Shr => "__shr",
            TmKind::Unm => "__unm",
            TmKind::BNot => "__bnot",
            TmKind::Len => "__len",
            TmKind::Concat => "__concat",
            TmKind::Call => "__call",
            TmKind::Close => "__close",
        }
    }

    /// Operator text used in "attempt to perform arithmetic" style
    /// messages.
    pub fn op_name(self) -> &'static str {
        &self.event()[2..]
    }
}

/// The metatable of a value, if any. Strings share one VM-wide metatable.
pub fn get_metatable(vm: &LuaVM, value: &LuaValue) -> Option<LuaValue> {
    match value {
        LuaValue::Table(t) => t.borrow().metatable(),
        LuaValue::Userdata(u) => u.borrow().metatable.clone(),
        LuaValue::String(_) => vm.string_mt.clone(),
        _ => None,
    }
}

/// Raw lookup of an event handler on a value's metatable.
pub fn get_metamethod_event(vm: &LuaVM, value: &LuaValue, tm: TmKind) -> Option<LuaValue> {
    let mt = get_metatable(vm, value)?;
    let name = vm.const_strings.event_name(tm);
    let handler = mt
        .as_table()?
        .borrow()
        .raw_get(&LuaValue::String(name));
    if handler.is_nil() { None } else { Some(handler) }
}

/// Handler for a binary event: left operand first, then right.
pub fn get_binop_metamethod(
    vm: &LuaVM,
    left: &LuaValue,
    right: &LuaValue,
    tm: TmKind,
) -> Option<LuaValue> {
    get_metamethod_event(vm, left, tm).or_else(|| get_metamethod_event(vm, right, tm))
}

/// Call a metamethod with two operands and take its first result.
pub fn call_tm_res(
    vm: &mut LuaVM,
    handler: LuaValue,
    left: LuaValue,
    right: LuaValue,
) -> LuaResult<LuaValue> {
    if !handler.is_function() {
        return Err(vm.rt_error(format!(
            "attempt to call a {} value (metamethod)",
            handler.type_name()
        )));
    }
    let results = call_function(vm, handler, vec![left, right])?;
    Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
}

/// Binary arithmetic/bitwise/concat fallback: resolve and call, or raise
/// the conventional error for the event.
pub fn try_bin_tm(
    vm: &mut LuaVM,
    left: LuaValue,
    right: LuaValue,
    tm: TmKind,
) -> LuaResult<LuaValue> {
    match get_binop_metamethod(vm, &left, &right, tm) {
        Some(handler) => call_tm_res(vm, handler, left, right),
        None => {
            let bad = pick_bad_operand(&left, &right, tm);
            let msg = match tm {
                TmKind::Concat => {
                    format!("attempt to concatenate a {} value", bad.type_name())
                }
                TmKind::BAnd | TmKind::BOr | TmKind::BXor | TmKind::Shl | TmKind::Shr
                | TmKind::BNot => {
                    format!(
                        "attempt to perform bitwise operation on a {} value",
                        bad.type_name()
                    )
                }
                _ => format!(
                    "attempt to perform arithmetic on a {} value",
                    bad.type_name()
                ),
            };
            Err(vm.rt_error(msg))
        }
    }
}

/// __eq fires only when both operands are tables (or both userdata) with
/// the identical metatable reference.
pub fn eq_metamethod(vm: &LuaVM, left: &LuaValue, right: &LuaValue) -> Option<LuaValue> {
    let same_kind = matches!(
        (left, right),
        (LuaValue::Table(_), LuaValue::Table(_)) | (LuaValue::Userdata(_), LuaValue::Userdata(_))
    );
    if !same_kind {
        return None;
    }
    let lmt = get_metatable(vm, left)?;
    let rmt = get_metatable(vm, right)?;
    let (lt, rt) = (lmt.as_table()?, rmt.as_table()?);
    if !Rc::ptr_eq(lt, rt) {
        return None;
    }
    get_metamethod_event(vm, left, TmKind::Eq)
}

/// Which operand gets blamed in an error message: the one that is not a
/// number (or, for concat, neither string nor number).
fn pick_bad_operand<'a>(left: &'a LuaValue, right: &'a LuaValue, tm: TmKind) -> &'a LuaValue {
    let ok = |v: &LuaValue| match tm {
        TmKind::Concat => v.is_number() || v.is_string(),
        TmKind::BAnd | TmKind::BOr | TmKind::BXor | TmKind::Shl | TmKind::Shr | TmKind::BNot => {
            v.coerce_integer().is_some()
        }
        _ => v.coerce_number().is_some(),
    };
    if !ok(left) { left } else { right }
}
