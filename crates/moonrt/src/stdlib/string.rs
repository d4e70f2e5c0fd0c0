// String library - byte-string subset (no pattern matching)
// Implements: len, sub, upper, lower, rep, reverse, byte, char, format

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaStr, LuaValue};
use crate::lua_vm::{CallArgs, LuaResult, LuaVM};

use super::basic::tostring_value;

pub fn create_string_lib() -> LibraryModule {
    let module = crate::lib_module!("string", {
        "len" => string_len,
        "sub" => string_sub,
        "upper" => string_upper,
        "lower" => string_lower,
        "rep" => string_rep,
        "reverse" => string_reverse,
        "byte" => string_byte,
        "char" => string_char,
        "format" => string_format,
    });
    // Strings share one metatable with __index = string library, so
    // s:upper() works.
    module.with_initializer(|vm, lib_table| {
        let mt = vm.create_table(0, 1);
        let index_key = vm.create_string("__index");
        if let Some(t) = mt.as_table() {
            let _ = t.borrow_mut().raw_set(&index_key, lib_table);
        }
        vm.set_string_metatable(mt);
        Ok(())
    })
}

fn check_str(vm: &mut LuaVM, a: &CallArgs, i: usize, who: &str) -> LuaResult<LuaStr> {
    match a.arg(i) {
        LuaValue::String(s) => Ok(s),
        LuaValue::Integer(_) | LuaValue::Float(_) => {
            let text = a.arg(i).display_string();
            Ok(vm.intern(&text))
        }
        other => Err(vm.rt_error(format!(
            "bad argument #{} to '{}' (string expected, got {})",
            i + 1,
            who,
            other.type_name()
        ))),
    }
}

/// Translate a 1-based, possibly negative string position.
fn str_pos(len: usize, pos: i64, default: i64) -> i64 {
    let p = if pos == 0 { default } else { pos };
    if p >= 0 { p } else { len as i64 + p + 1 }
}

fn string_len(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(vm, &a, 0, "len")?;
    Ok(vec![LuaValue::Integer(s.len() as i64)])
}

fn string_sub(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(vm, &a, 0, "sub")?;
    let len = s.len();
    let i = str_pos(len, a.arg(1).coerce_integer().unwrap_or(1), 1).max(1);
    let j = str_pos(len, a.arg(2).coerce_integer().unwrap_or(-1), -1).min(len as i64);
    let out = if i > j {
        Vec::new()
    } else {
        s.as_bytes()[(i - 1) as usize..j as usize].to_vec()
    };
    Ok(vec![vm.create_string_owned(out)])
}

fn string_upper(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(vm, &a, 0, "upper")?;
    let out: Vec<u8> = s.as_bytes().iter().map(|b| b.to_ascii_uppercase()).collect();
    Ok(vec![vm.create_string_owned(out)])
}

fn string_lower(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(vm, &a, 0, "lower")?;
    let out: Vec<u8> = s.as_bytes().iter().map(|b| b.to_ascii_lowercase()).collect();
    Ok(vec![vm.create_string_owned(out)])
}

fn string_rep(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(vm, &a, 0, "rep")?;
    let n = a.arg(1).coerce_integer().unwrap_or(0);
    let sep = match a.args.get(2) {
        Some(LuaValue::String(sep)) => sep.as_bytes().to_vec(),
        _ => Vec::new(),
    };
    if n <= 0 {
        return Ok(vec![vm.create_string("")]);
    }
    let mut out = Vec::with_capacity(s.len() * n as usize);
    for i in 0..n {
        if i > 0 {
            out.extend_from_slice(&sep);
        }
        out.extend_from_slice(s.as_bytes());
    }
    Ok(vec![vm.create_string_owned(out)])
}

fn string_reverse(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(vm, &a, 0, "reverse")?;
    let mut out = s.as_bytes().to_vec();
    out.reverse();
    Ok(vec![vm.create_string_owned(out)])
}

fn string_byte(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let s = check_str(vm, &a, 0, "byte")?;
    let len = s.len();
    let i = str_pos(len, a.arg(1).coerce_integer().unwrap_or(1), 1).max(1);
    let j = str_pos(len, a.arg(2).coerce_integer().unwrap_or(i), i).min(len as i64);
    let mut out = Vec::new();
    let bytes = s.as_bytes();
    let mut k = i;
    while k <= j {
        out.push(LuaValue::Integer(bytes[(k - 1) as usize] as i64));
        k += 1;
    }
    Ok(out)
}

fn string_char(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let mut out = Vec::with_capacity(a.args.len());
    for (i, v) in a.args.iter().enumerate() {
        match v.coerce_integer() {
            Some(b) if (0..=255).contains(&b) => out.push(b as u8),
            _ => {
                return Err(vm.rt_error(format!(
                    "bad argument #{} to 'char' (value out of range)",
                    i + 1
                )));
            }
        }
    }
    Ok(vec![vm.create_string_owned(out)])
}

/// string.format with the numeric/string directives (%d %i %u %c %x %X
/// %o %f %g %G %e %s %q %%). Width/precision flags pass through for the
/// common cases.
fn string_format(vm: &mut LuaVM, a: CallArgs) -> LuaResult<Vec<LuaValue>> {
    let fmt = check_str(vm, &a, 0, "format")?;
    let fmt = fmt.as_bytes().to_vec();
    let mut out: Vec<u8> = Vec::with_capacity(fmt.len());
    let mut argi = 1usize;
    let mut it = fmt.iter().copied().peekable();
    while let Some(b) = it.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }
        // Collect the directive: flags, width, precision, conversion.
        let mut spec = String::from("%");
        while let Some(&c) = it.peek() {
            if matches!(c, b'-' | b'+' | b' ' | b'#' | b'0'..=b'9' | b'.') {
                spec.push(c as char);
                it.next();
            } else {
                break;
            }
        }
        let Some(conv) = it.next() else {
            return Err(vm.rt_error("invalid format string to 'format'"));
        };
        if conv == b'%' {
            out.push(b'%');
            continue;
        }
        let arg = a.arg(argi);
        argi += 1;
        let rendered = format_one(vm, &spec, conv, &arg)?;
        out.extend_from_slice(&rendered);
    }
    Ok(vec![vm.create_string_owned(out)])
}

fn format_one(vm: &mut LuaVM, spec: &str, conv: u8, arg: &LuaValue) -> LuaResult<Vec<u8>> {
    let (width, precision, zero_pad, left) = parse_spec(spec);
    let text: String = match conv {
        b'd' | b'i' => {
            let Some(i) = arg.coerce_integer() else {
                return Err(vm.rt_error(format!(
                    "bad argument to 'format' (number expected, got {})",
                    arg.type_name()
                )));
            };
            let mut buf = itoa::Buffer::new();
            buf.format(i).to_string()
        }
        b'u' => {
            let i = arg.coerce_integer().unwrap_or(0);
            let mut buf = itoa::Buffer::new();
            buf.format(i as u64).to_string()
        }
        b'x' => format!("{:x}", arg.coerce_integer().unwrap_or(0)),
        b'X' => format!("{:X}", arg.coerce_integer().unwrap_or(0)),
        b'o' => format!("{:o}", arg.coerce_integer().unwrap_or(0)),
        b'c' => {
            let b = arg.coerce_integer().unwrap_or(0) as u8;
            return Ok(vec![b]);
        }
        b'f' | b'F' => {
            let f = number_arg(vm, arg)?;
            format!("{:.*}", precision.unwrap_or(6), f)
        }
        b'e' | b'E' => {
            let f = number_arg(vm, arg)?;
            let s = format!("{:.*e}", precision.unwrap_or(6), f);
            if conv == b'E' { s.to_uppercase() } else { s }
        }
        b'g' | b'G' => {
            let f = number_arg(vm, arg)?;
            let s = crate::lua_value::float_to_lua_string(f);
            let s = s.trim_end_matches(".0").to_string();
            if conv == b'G' { s.to_uppercase() } else { s }
        }
        b's' => tostring_value(vm, arg)?.display_string(),
        b'q' => {
            let mut q = String::from("\"");
            for &b in arg.display_string().as_bytes() {
                match b {
                    b'"' => q.push_str("\\\""),
                    b'\\' => q.push_str("\\\\"),
                    b'\n' => q.push_str("\\n"),
                    b'\r' => q.push_str("\\r"),
                    0 => q.push_str("\\0"),
                    _ => q.push(b as char),
                }
            }
            q.push('"');
            q
        }
        other => {
            return Err(vm.rt_error(format!(
                "invalid conversion '%{}' to 'format'",
                other as char
            )));
        }
    };
    let padded = pad(text, width, zero_pad, left);
    Ok(padded.into_bytes())
}

fn number_arg(vm: &mut LuaVM, arg: &LuaValue) -> LuaResult<f64> {
    match arg.coerce_number() {
        Some(LuaValue::Integer(i)) => Ok(i as f64),
        Some(LuaValue::Float(f)) => Ok(f),
        _ => Err(vm.rt_error(format!(
            "bad argument to 'format' (number expected, got {})",
            arg.type_name()
        ))),
    }
}

fn parse_spec(spec: &str) -> (usize, Option<usize>, bool, bool) {
    let body = &spec[1..];
    let left = body.contains('-');
    let mut rest = body.trim_start_matches(['-', '+', ' ', '#']);
    let zero_pad = rest.starts_with('0');
    rest = rest.trim_start_matches('0');
    let (wpart, ppart) = match rest.split_once('.') {
        Some((w, p)) => (w, Some(p)),
        None => (rest, None),
    };
    let width = wpart.parse().unwrap_or(0);
    let precision = ppart.and_then(|p| p.parse().ok());
    (width, precision, zero_pad, left)
}

fn pad(text: String, width: usize, zero_pad: bool, left: bool) -> String {
    if text.len() >= width {
        return text;
    }
    let fill = width - text.len();
    if left {
        let mut t = text;
        t.extend(std::iter::repeat(' ').take(fill));
        t
    } else if zero_pad && !text.starts_with('-') {
        format!("{}{}", "0".repeat(fill), text)
    } else if zero_pad {
        format!("-{}{}", "0".repeat(fill), &text[1..])
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}
