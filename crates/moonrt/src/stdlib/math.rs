// Math library
// Integer/float distinctions follow Lua 5.4: floor/ceil produce integers
// when they fit, abs preserves subtype, math.type reports the subtype.

use rand::Rng;

use crate::lib_registry::{LibraryEntry, LibraryModule};
use crate::lua_value::{float_to_int, FloatToInt, LuaValue};
use crate::lua_vm::{CallArgs, LuaResult, LuaVM};

pub fn create_math_lib() -> LibraryModule {
    let mut module = crate::lib_module!("math", {
        "floor" => math_floor,
        "ceil" => math_ceil,
        "abs" => math_abs,
        "sqrt" => math_sqrt,
        "sin" => math_sin,
        "cos" => math_cos,
        "tan" => math_tan,
        "exp" => math_exp,
        "log" => math_log,
        "fmod" => math_fmod,
        "modf" => math_modf,
        "max" => math_max,
        "min" => math_min,
        "tointeger" => math_tointeger,
        "type" => math_type,
        "random" => math_random,
        "randomseed" => math_randomseed,
    });
    module.entries.push((
        "pi",
        LibraryEntry::Value(|_| LuaValue::Float(std::f64::consts::PI)),
    ));
    module
        .entries
        .push(("huge", LibraryEntry::Value(|_| LuaValue::Float(f64::INFINITY))));
    module.entries.push((
        "maxinteger",
        LibraryEntry::Value(|_| LuaValue::Integer(i64::MAX)),
    ));
    module.entries.push((
        "mininteger",
        LibraryEntry::Value(|_| LuaValue::Integer(i64::MIN)),
    ));
    module
}

fn check_number(vm: &mut LuaVM, a: &CallArgs, i: usize, who: &str) -> LuaResult<LuaValue> {
    match a.arg(i).coerce_number() {
        Some(n) => Ok(n),
        None => Err(vm.rt_error(format!(
            "bad argument #{} to '{}' (number expected, got {})",
            i + 1,
            who,
            a.arg(i).type_name()
        ))),
    }
}

fn check_f64(vm: &mut LuaVM, a: &CallArgs, i: usize, who: &str) -> LuaResult<f64> {
    match check_number(vm, a, i, who)? {
        LuaValue::Integer(n) => Ok(n as f64),
        LuaValue::Float(f) => Ok(f),
        _ => Ok(f64::NAN),
    }
}

fn math_floor(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = check_number(vm, &a, 0, "floor")?;
    let r = match v {
        LuaValue::Integer(i) => LuaValue::Integer(i),
        LuaValue::Float(f) => match float_to_int(f, FloatToInt::Floor) {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Float(f.floor()),
        },
        other => other,
    };
    Ok(vec![r])
}

fn math_ceil(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = check_number(vm, &a, 0, "ceil")?;
    let r = match v {
        LuaValue::Integer(i) => LuaValue::Integer(i),
        LuaValue::Float(f) => match float_to_int(f, FloatToInt::Ceil) {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Float(f.ceil()),
        },
        other => other,
    };
    Ok(vec![r])
}

fn math_abs(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let v = check_number(vm, &a, 0, "abs")?;
    let r = match v {
        LuaValue::Integer(i) => LuaValue::Integer(i.wrapping_abs()),
        LuaValue::Float(f) => LuaValue::Float(f.abs()),
        other => other,
    };
    Ok(vec![r])
}

fn math_sqrt(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let f = check_f64(vm, &a, 0, "sqrt")?;
    Ok(vec![LuaValue::Float(f.sqrt())])
}

fn math_sin(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let f = check_f64(vm, &a, 0, "sin")?;
    Ok(vec![LuaValue::Float(f.sin())])
}

fn math_cos(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let f = check_f64(vm, &a, 0, "cos")?;
    Ok(vec![LuaValue::Float(f.cos())])
}

fn math_tan(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let f = check_f64(vm, &a, 0, "tan")?;
    Ok(vec![LuaValue::Float(f.tan())])
}

fn math_exp(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let f = check_f64(vm, &a, 0, "exp")?;
    Ok(vec![LuaValue::Float(f.exp())])
}

fn math_log(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let x = check_f64(vm, &a, 0, "log")?;
    let r = if a.args.len() > 1 {
        let base = check_f64(vm, &a, 1, "log")?;
        x.log(base)
    } else {
        x.ln()
    };
    Ok(vec![LuaValue::Float(r)])
}

fn math_fmod(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let x = check_f64(vm, &a, 0, "fmod")?;
    let y = check_f64(vm, &a, 1, "fmod")?;
    Ok(vec![LuaValue::Float(x % y)])
}

fn math_modf(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let f = check_f64(vm, &a, 0, "modf")?;
    let int_part = f.trunc();
    let int_value = match float_to_int(int_part, FloatToInt::Exact) {
        Some(i) => LuaValue::Integer(i),
        None => LuaValue::Float(int_part),
    };
    Ok(vec![int_value, LuaValue::Float(f - int_part)])
}

fn fold_extreme(
    vm: &mut LuaVM,
    a: CallArgs,
    who: &str,
    pick_right: impl Fn(&LuaValue, &LuaValue) -> bool,
) -> LuaResult<Vec<LuaValue>> {
    if a.args.is_empty() {
        return Err(vm.rt_error(format!("bad argument #1 to '{}' (number expected)", who)));
    }
    let mut best = check_number(vm, &a, 0, who)?;
    for i in 1..a.args.len() {
        let v = check_number(vm, &a, i, who)?;
        if pick_right(&best, &v) {
            best = v;
        }
    }
    Ok(vec![best])
}

fn math_max(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    fold_extreme(vm, a, "max", |best, v| crate::lua_value::num_lt(best, v))
}

fn math_min(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    fold_extreme(vm, a, "min", |best, v| crate::lua_value::num_lt(v, best))
}

fn math_tointeger(_vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let r = match a.arg(0) {
        LuaValue::Integer(i) => LuaValue::Integer(i),
        LuaValue::Float(f) => match float_to_int(f, FloatToInt::Exact) {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Nil,
        },
        _ => LuaValue::Nil,
    };
    Ok(vec![r])
}

fn math_type(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let r = match a.arg(0) {
        LuaValue::Integer(_) => vm.create_string("integer"),
        LuaValue::Float(_) => vm.create_string("float"),
        _ => LuaValue::Nil,
    };
    Ok(vec![r])
}

/// math.random(): float in [0,1); (m): integer in [1,m]; (m,n): integer
/// in [m,n].
fn math_random(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    match a.args.len() {
        0 => {
            let f: f64 = vm.rng.gen();
            Ok(vec![LuaValue::Float(f)])
        }
        1 => {
            let m = match a.arg(0).coerce_integer() {
                Some(m) if m >= 1 => m,
                _ => return Err(vm.rt_error("bad argument #1 to 'random' (interval is empty)")),
            };
            let r = vm.rng.gen_range(1..=m);
            Ok(vec![LuaValue::Integer(r)])
        }
        _ => {
            let m = a.arg(0).coerce_integer();
            let n = a.arg(1).coerce_integer();
            let (Some(m), Some(n)) = (m, n) else {
                return Err(vm.rt_error("bad argument to 'random' (number expected)"));
            };
            if m > n {
                return Err(vm.rt_error("bad argument #2 to 'random' (interval is empty)"));
            }
            let r = vm.rng.gen_range(m..=n);
            Ok(vec![LuaValue::Integer(r)])
        }
    }
}

fn math_randomseed(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let seed = match a.arg(0) {
        LuaValue::Integer(i) => i as u64,
        LuaValue::Float(f) => f.to_bits(),
        _ => 0x853c_49e6_748f_ea9b,
    };
    vm.reseed_random(seed);
    Ok(Vec::new())
}
