//! The string library (no pattern matching). Installs the shared string
//! metatable so `("x"):len()`-style calls resolve through `__index`.

use crate::lua_value::{number_to_string, LuaTable, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};
use crate::stdlib::set_native;

pub fn open(vm: &mut LuaVM) {
    let mut t = LuaTable::new();
    set_native(&mut t, "len", lua_len);
    set_native(&mut t, "sub", lua_sub);
    set_native(&mut t, "upper", lua_upper);
    set_native(&mut t, "lower", lua_lower);
    set_native(&mut t, "rep", lua_rep);
    set_native(&mut t, "reverse", lua_reverse);
    set_native(&mut t, "byte", lua_byte);
    set_native(&mut t, "char", lua_char);
    set_native(&mut t, "format", lua_format);
    let table_value = LuaValue::from_table(t);

    let mut mt = LuaTable::new();
    mt.set_str("__index", table_value.clone());
    if let LuaValue::Table(mtref) = LuaValue::from_table(mt) {
        vm.set_string_metatable(mtref);
    }
    vm.set_global("string", table_value);
}

/// Clamp Lua's 1-based, negative-from-the-end range onto byte indexes.
fn str_range(len: usize, i: i64, j: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if i < 0 { (len + i + 1).max(1) } else { i.max(1) };
    let end = if j < 0 { len + j + 1 } else { j.min(len) };
    if start > end {
        None
    } else {
        Some((start as usize, end as usize))
    }
}

fn lua_len(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    vm.push(LuaValue::Number(s.len() as f64))?;
    Ok(1)
}

fn lua_sub(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    let i = vm.opt_number(2, 1.0)? as i64;
    let j = vm.opt_number(3, -1.0)? as i64;
    let out = match str_range(s.len(), i, j) {
        Some((a, b)) => String::from_utf8_lossy(&s.as_bytes()[a - 1..b]).into_owned(),
        None => String::new(),
    };
    vm.push(LuaValue::from_string(out))?;
    Ok(1)
}

fn lua_upper(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    vm.push(LuaValue::from_string(s.to_ascii_uppercase()))?;
    Ok(1)
}

fn lua_lower(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    vm.push(LuaValue::from_string(s.to_ascii_lowercase()))?;
    Ok(1)
}

fn lua_rep(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    let n = vm.check_number(2)? as i64;
    if n > 0 && s.len() as i64 * n > 64 * 1024 * 1024 {
        return Err(vm.rt_error("resulting string too large"));
    }
    let out = if n <= 0 {
        String::new()
    } else {
        s.repeat(n as usize)
    };
    vm.push(LuaValue::from_string(out))?;
    Ok(1)
}

fn lua_reverse(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    let out: String = s.chars().rev().collect();
    vm.push(LuaValue::from_string(out))?;
    Ok(1)
}

fn lua_byte(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    let i = vm.opt_number(2, 1.0)? as i64;
    let j = vm.opt_number(3, i as f64)? as i64;
    let mut count = 0;
    if let Some((a, b)) = str_range(s.len(), i, j) {
        let bytes = s.as_bytes();
        for k in a..=b {
            vm.push(LuaValue::Number(bytes[k - 1] as f64))?;
            count += 1;
        }
    }
    Ok(count)
}

fn lua_char(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    let mut bytes = Vec::with_capacity(n);
    for i in 1..=n {
        let c = vm.check_number(i)? as i64;
        if !(0..=255).contains(&c) {
            return Err(vm.arg_error(i, "invalid value"));
        }
        bytes.push(c as u8);
    }
    let out = String::from_utf8_lossy(&bytes).into_owned();
    vm.push(LuaValue::from_string(out))?;
    Ok(1)
}

#[derive(Default)]
struct FormatSpec {
    minus: bool,
    plus: bool,
    zero: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

fn pad(spec: &FormatSpec, mut s: String, numeric: bool) -> String {
    if numeric && spec.plus && !s.starts_with('-') {
        s.insert(0, '+');
    } else if numeric && spec.space && !s.starts_with('-') {
        s.insert(0, ' ');
    }
    if s.len() >= spec.width {
        return s;
    }
    let fill = spec.width - s.len();
    if spec.minus {
        s + &" ".repeat(fill)
    } else if spec.zero && numeric {
        let (sign, digits) = match s.strip_prefix('-') {
            Some(d) => ("-", d),
            None => match s.strip_prefix('+') {
                Some(d) => ("+", d),
                None => ("", s.as_str()),
            },
        };
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        " ".repeat(fill) + &s
    }
}

/// `%e` output in printf style: sign always present, exponent at least
/// two digits.
fn exp_format(n: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision, n);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s,
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn lua_format(vm: &mut LuaVM) -> LuaResult<usize> {
    let fmt = vm.check_str(1)?;
    let chars: Vec<char> = fmt.chars().collect();
    let mut out = String::new();
    let mut k = 0;
    let mut argi = 1;
    while k < chars.len() {
        if chars[k] != '%' {
            out.push(chars[k]);
            k += 1;
            continue;
        }
        k += 1;
        if k < chars.len() && chars[k] == '%' {
            out.push('%');
            k += 1;
            continue;
        }
        let mut spec = FormatSpec::default();
        while k < chars.len() {
            match chars[k] {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' => spec.space = true,
                '#' => {}
                _ => break,
            }
            k += 1;
        }
        while k < chars.len() && chars[k].is_ascii_digit() {
            spec.width = spec.width * 10 + chars[k] as usize - '0' as usize;
            k += 1;
        }
        if k < chars.len() && chars[k] == '.' {
            k += 1;
            let mut p = 0;
            while k < chars.len() && chars[k].is_ascii_digit() {
                p = p * 10 + chars[k] as usize - '0' as usize;
                k += 1;
            }
            spec.precision = Some(p);
        }
        let directive = match chars.get(k) {
            Some(c) => *c,
            None => return Err(vm.rt_error("invalid format string to 'format'")),
        };
        k += 1;
        argi += 1;
        let piece = match directive {
            'd' | 'i' => {
                let n = vm.check_number(argi)? as i64;
                pad(&spec, n.to_string(), true)
            }
            'u' => {
                let n = vm.check_number(argi)? as i64 as u64;
                pad(&spec, n.to_string(), true)
            }
            'c' => {
                let n = vm.check_number(argi)? as i64;
                if !(0..=255).contains(&n) {
                    return Err(vm.arg_error(argi, "invalid value"));
                }
                pad(&spec, (n as u8 as char).to_string(), false)
            }
            'x' => {
                let n = vm.check_number(argi)? as i64;
                pad(&spec, format!("{:x}", n), true)
            }
            'X' => {
                let n = vm.check_number(argi)? as i64;
                pad(&spec, format!("{:X}", n), true)
            }
            'o' => {
                let n = vm.check_number(argi)? as i64;
                pad(&spec, format!("{:o}", n), true)
            }
            'f' | 'F' => {
                let n = vm.check_number(argi)?;
                pad(&spec, format!("{:.*}", spec.precision.unwrap_or(6), n), true)
            }
            'e' | 'E' => {
                let n = vm.check_number(argi)?;
                let mut s = exp_format(n, spec.precision.unwrap_or(6));
                if directive == 'E' {
                    s = s.to_ascii_uppercase();
                }
                pad(&spec, s, true)
            }
            'g' | 'G' => {
                let n = vm.check_number(argi)?;
                let mut s = number_to_string(n);
                if directive == 'G' {
                    s = s.to_ascii_uppercase();
                }
                pad(&spec, s, true)
            }
            's' => {
                let v = vm.arg(argi);
                let mut s = vm.tostring_value(&v)?;
                if let Some(p) = spec.precision {
                    s.truncate(p);
                }
                pad(&spec, s, false)
            }
            'q' => {
                let s = vm.check_str(argi)?;
                quote(&s)
            }
            other => {
                return Err(vm.rt_error(format!(
                    "invalid option '%{}' to 'format'",
                    other
                )))
            }
        };
        out.push_str(&piece);
    }
    vm.push(LuaValue::from_string(out))?;
    Ok(1)
}
