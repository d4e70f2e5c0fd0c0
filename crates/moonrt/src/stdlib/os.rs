// OS library
// Implements: clock, time, date, getenv. Wall-clock parts go through
// chrono; os.clock measures elapsed process time.

use std::sync::OnceLock;
use std::time::Instant;

use chrono::{Datelike, Local, TimeZone, Timelike, Utc};

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::{CallArgs, LuaResult, LuaVM};

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

pub fn create_os_lib() -> LibraryModule {
    PROCESS_START.get_or_init(Instant::now);
    crate::lib_module!("os", {
        "clock" => os_clock,
        "time" => os_time,
        "date" => os_date,
        "getenv" => os_getenv,
    })
}

fn os_clock(_vm: &mut LuaVM, _a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let start = PROCESS_START.get_or_init(Instant::now);
    Ok(vec![LuaValue::Float(start.elapsed().as_secs_f64())])
}

fn os_time(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    match a.args.first() {
        None | Some(LuaValue::Nil) => Ok(vec![LuaValue::Integer(Utc::now().timestamp())]),
        Some(LuaValue::Table(t)) => {
            let t = t.clone();
            let mut get = |vm: &mut LuaVM, name: &str, default: i64| -> i64 {
                let key = vm.create_string(name);
                t.borrow().raw_get(&key).coerce_integer().unwrap_or(default)
            };
            let (year, month, day) = (
                get(vm, "year", 1970),
                get(vm, "month", 1),
                get(vm, "day", 1),
            );
            let (hour, min, sec) = (get(vm, "hour", 12), get(vm, "min", 0), get(vm, "sec", 0));
            let stamp = Local
                .with_ymd_and_hms(
                    year as i32,
                    month as u32,
                    day as u32,
                    hour as u32,
                    min as u32,
                    sec as u32,
                )
                .single()
                .map(|dt| dt.timestamp());
            match stamp {
                Some(s) => Ok(vec![LuaValue::Integer(s)]),
                None => Ok(vec![LuaValue::Nil]),
            }
        }
        Some(other) => Err(vm.rt_error(format!(
            "bad argument #1 to 'time' (table expected, got {})",
            other.type_name()
        ))),
    }
}

fn os_date(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let spec = match a.args.first() {
        Some(LuaValue::String(s)) => s.to_str().unwrap_or("%c").to_string(),
        _ => "%c".to_string(),
    };
    let when = match a.args.get(1) {
        Some(v) => v.coerce_integer().unwrap_or_else(|| Utc::now().timestamp()),
        None => Utc::now().timestamp(),
    };
    let (utc, fmt) = match spec.strip_prefix('!') {
        Some(rest) => (true, rest.to_string()),
        None => (false, spec),
    };

    if fmt.starts_with("*t") {
        let (y, mo, d, h, mi, s, wday, yday) = if utc {
            let dt = match Utc.timestamp_opt(when, 0).single() {
                Some(dt) => dt,
                None => return Ok(vec![LuaValue::Nil]),
            };
            (
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
                dt.weekday().number_from_sunday(),
                dt.ordinal(),
            )
        } else {
            let dt = match Local.timestamp_opt(when, 0).single() {
                Some(dt) => dt,
                None => return Ok(vec![LuaValue::Nil]),
            };
            (
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
                dt.weekday().number_from_sunday(),
                dt.ordinal(),
            )
        };
        let t = vm.create_table(0, 9);
        let fields: [(&str, i64); 8] = [
            ("year", y as i64),
            ("month", mo as i64),
            ("day", d as i64),
            ("hour", h as i64),
            ("min", mi as i64),
            ("sec", s as i64),
            ("wday", wday as i64),
            ("yday", yday as i64),
        ];
        for (name, value) in fields {
            let key = vm.create_string(name);
            if let Some(tt) = t.as_table() {
                let _ = tt.borrow_mut().raw_set(&key, LuaValue::Integer(value));
            }
        }
        let isdst_key = vm.create_string("isdst");
        if let Some(tt) = t.as_table() {
            let _ = tt.borrow_mut().raw_set(&isdst_key, LuaValue::Boolean(false));
        }
        return Ok(vec![t]);
    }

    let rendered = if utc {
        match Utc.timestamp_opt(when, 0).single() {
            Some(dt) => dt.format(&fmt).to_string(),
            None => return Ok(vec![LuaValue::Nil]),
        }
    } else {
        match Local.timestamp_opt(when, 0).single() {
            Some(dt) => dt.format(&fmt).to_string(),
            None => return Ok(vec![LuaValue::Nil]),
        }
    };
    Ok(vec![vm.create_string(&rendered)])
}

fn os_getenv(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let LuaValue::String(name) = a.arg(0) else {
        return Err(vm.rt_error("bad argument #1 to 'getenv' (string expected)"));
    };
    let Some(name) = name.to_str().map(|s| s.to_string()) else {
        return Ok(vec![LuaValue::Nil]);
    };
    match std::env::var(&name) {
        Ok(v) => Ok(vec![vm.create_string(&v)]),
        Err(_) => Ok(vec![LuaValue::Nil]),
    }
}
