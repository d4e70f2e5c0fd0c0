// Arithmetic, bitwise, unary, length and concatenation.
//
// Promotion follows Lua 5.4: integer ops stay integer (wrapping), any
// float operand promotes, DIV and POW always produce floats. Numeric
// strings coerce; everything else falls through to metamethods.

use crate::lua_value::LuaValue;
use crate::lua_vm::execute::metamethod::{call_tm_res, get_metamethod_event, try_bin_tm, TmKind};
use crate::lua_vm::opcode::Instruction;
use crate::lua_vm::{LuaResult, LuaVM};

use super::DispatchResult;

pub fn exec_arith(vm: &mut LuaVM, instr: u32, tm: TmKind) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let lhs = vm.rk(Instruction::get_b(instr))?;
    let rhs = vm.rk(Instruction::get_c(instr))?;
    let v = arith(vm, tm, lhs, rhs)?;
    vm.set_reg(a, v)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_bitwise(vm: &mut LuaVM, instr: u32, tm: TmKind) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let lhs = vm.rk(Instruction::get_b(instr))?;
    let rhs = vm.rk(Instruction::get_c(instr))?;
    let v = bitwise(vm, tm, lhs, rhs)?;
    vm.set_reg(a, v)?;
    Ok(DispatchResult::Continue)
}

/// Binary arithmetic with metamethod fallback.
pub fn arith(vm: &mut LuaVM, tm: TmKind, lhs: LuaValue, rhs: LuaValue) -> LuaResult<LuaValue> {
    let (Some(x), Some(y)) = (lhs.coerce_number(), rhs.coerce_number()) else {
        return try_bin_tm(vm, lhs, rhs, tm);
    };
    arith_numbers(vm, tm, x, y)
}

fn arith_numbers(vm: &mut LuaVM, tm: TmKind, x: LuaValue, y: LuaValue) -> LuaResult<LuaValue> {
    use LuaValue::{Float, Integer};
    // DIV and POW work on floats regardless of operand subtype.
    if matches!(tm, TmKind::Div | TmKind::Pow) {
        let (a, b) = (number_as_f64(&x), number_as_f64(&y));
        let r = match tm {
            TmKind::Div => a / b,
            _ => a.powf(b),
        };
        return Ok(Float(r));
    }
    match (x, y) {
        (Integer(a), Integer(b)) => match tm {
            TmKind::Add => Ok(Integer(a.wrapping_add(b))),
            TmKind::Sub => Ok(Integer(a.wrapping_sub(b))),
            TmKind::Mul => Ok(Integer(a.wrapping_mul(b))),
            TmKind::Mod => {
                if b == 0 {
                    return Err(vm.rt_error("attempt to perform 'n%0'"));
                }
                Ok(Integer(lua_imod(a, b)))
            }
            TmKind::IDiv => {
                if b == 0 {
                    return Err(vm.rt_error("attempt to perform 'n//0'"));
                }
                Ok(Integer(lua_idiv(a, b)))
            }
            _ => Err(vm.rt_error("bad arithmetic event")),
        },
        (x, y) => {
            let (a, b) = (number_as_f64(&x), number_as_f64(&y));
            let r = match tm {
                TmKind::Add => a + b,
                TmKind::Sub => a - b,
                TmKind::Mul => a * b,
                TmKind::Mod => lua_fmod(a, b),
                TmKind::IDiv => (a / b).floor(),
                _ => return Err(vm.rt_error("bad arithmetic event")),
            };
            Ok(Float(r))
        }
    }
}

/// Unary minus preserves the numeric subtype.
pub fn arith_unm(vm: &mut LuaVM, operand: LuaValue) -> LuaResult<LuaValue> {
    match operand.coerce_number() {
        Some(LuaValue::Integer(i)) => Ok(LuaValue::Integer(i.wrapping_neg())),
        Some(LuaValue::Float(f)) => Ok(LuaValue::Float(-f)),
        _ => match get_metamethod_event(vm, &operand, TmKind::Unm) {
            Some(h) => call_tm_res(vm, h, operand.clone(), operand),
            None => Err(vm.rt_error(format!(
                "attempt to perform arithmetic on a {} value",
                operand.type_name()
            ))),
        },
    }
}

/// Bitwise binary op on 64-bit integers; floats allowed when exact.
pub fn bitwise(vm: &mut LuaVM, tm: TmKind, lhs: LuaValue, rhs: LuaValue) -> LuaResult<LuaValue> {
    let (Some(a), Some(b)) = (lhs.coerce_integer(), rhs.coerce_integer()) else {
        // Numbers that merely fail the exactness test get a dedicated
        // message instead of the metamethod path.
        if lhs.is_number() && rhs.is_number() {
            return Err(vm.rt_error("number has no integer representation"));
        }
        return try_bin_tm(vm, lhs, rhs, tm);
    };
    let r = match tm {
        TmKind::BAnd => a & b,
        TmKind::BOr => a | b,
        TmKind::BXor => a ^ b,
        TmKind::Shl => lua_shiftl(a, b),
        TmKind::Shr => lua_shiftl(a, b.wrapping_neg()),
        _ => return Err(vm.rt_error("bad bitwise event")),
    };
    Ok(LuaValue::Integer(r))
}

pub fn exec_unm(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let v = vm.reg(Instruction::get_b(instr))?;
    let r = arith_unm(vm, v)?;
    vm.set_reg(a, r)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_bnot(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let v = vm.reg(Instruction::get_b(instr))?;
    let r = match v.coerce_integer() {
        Some(i) => LuaValue::Integer(!i),
        None => match get_metamethod_event(vm, &v, TmKind::BNot) {
            Some(h) => call_tm_res(vm, h, v.clone(), v)?,
            None => {
                if v.is_number() {
                    return Err(vm.rt_error("number has no integer representation"));
                }
                return Err(vm.rt_error(format!(
                    "attempt to perform bitwise operation on a {} value",
                    v.type_name()
                )));
            }
        },
    };
    vm.set_reg(a, r)?;
    Ok(DispatchResult::Continue)
}

pub fn exec_not(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let v = vm.reg(Instruction::get_b(instr))?;
    vm.set_reg(a, LuaValue::Boolean(!v.is_truthy()))?;
    Ok(DispatchResult::Continue)
}

/// Length: byte count for strings, border for tables (unless __len).
pub fn length_of(vm: &mut LuaVM, v: LuaValue) -> LuaResult<LuaValue> {
    if let LuaValue::String(s) = &v {
        return Ok(LuaValue::Integer(s.len() as i64));
    }
    if let Some(h) = get_metamethod_event(vm, &v, TmKind::Len) {
        return call_tm_res(vm, h, v.clone(), v);
    }
    if let Some(t) = v.as_table() {
        return Ok(LuaValue::Integer(t.borrow().len()));
    }
    Err(vm.rt_error(format!(
        "attempt to get length of a {} value",
        v.type_name()
    )))
}

pub fn exec_len(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let v = vm.reg(Instruction::get_b(instr))?;
    let r = length_of(vm, v)?;
    vm.set_reg(a, r)?;
    Ok(DispatchResult::Continue)
}

/// CONCAT A B C: fold R[B] .. ... .. R[C] right to left so __concat sees
/// the same associativity as the reference VM.
pub fn exec_concat(vm: &mut LuaVM, instr: u32) -> LuaResult<DispatchResult> {
    let a = Instruction::get_a(instr);
    let b = Instruction::get_b(instr);
    let c = Instruction::get_c(instr);
    let mut vals = Vec::with_capacity(c - b + 1);
    for i in b..=c {
        vals.push(vm.reg(i)?);
    }
    let r = concat_values(vm, vals)?;
    vm.set_reg(a, r)?;
    Ok(DispatchResult::Continue)
}

pub fn concat_values(vm: &mut LuaVM, mut vals: Vec<LuaValue>) -> LuaResult<LuaValue> {
    while vals.len() > 1 {
        let right = vals.pop().unwrap_or(LuaValue::Nil);
        let left = vals.pop().unwrap_or(LuaValue::Nil);
        let joined = if concatable(&left) && concatable(&right) {
            let mut bytes = concat_bytes(&left);
            bytes.extend_from_slice(&concat_bytes(&right));
            LuaValue::String(vm.interner.intern_owned(bytes))
        } else {
            try_bin_tm(vm, left, right, TmKind::Concat)?
        };
        vals.push(joined);
    }
    Ok(vals.pop().unwrap_or(LuaValue::Nil))
}

fn concatable(v: &LuaValue) -> bool {
    v.is_string() || v.is_number()
}

fn concat_bytes(v: &LuaValue) -> Vec<u8> {
    match v {
        LuaValue::String(s) => s.as_bytes().to_vec(),
        other => other.display_string().into_bytes(),
    }
}

// ============ numeric primitives ============

fn number_as_f64(v: &LuaValue) -> f64 {
    match v {
        LuaValue::Integer(i) => *i as f64,
        LuaValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

/// Floor division with the sign rules of Lua (quotient rounds toward
/// negative infinity).
pub(crate) fn lua_idiv(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// a - floor(a/b)*b for integers: remainder takes the divisor's sign.
pub(crate) fn lua_imod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

/// Float modulo with the divisor's sign.
pub(crate) fn lua_fmod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

/// Shift left by `n` (negative reverses direction); shifts of 64 or more
/// in either direction produce 0. Right shifts are logical.
pub(crate) fn lua_shiftl(a: i64, n: i64) -> i64 {
    if n >= 0 {
        if n >= 64 { 0 } else { ((a as u64) << n) as i64 }
    } else if n <= -64 {
        0
    } else {
        ((a as u64) >> -n) as i64
    }
}
