//! The base library: globals installed directly into the environment.

use std::rc::Rc;

use crate::lua_value::{LuaClosure, LuaFunction, LuaValue};
use crate::lua_vm::{LuaError, LuaResult, LuaVM};

pub fn open(vm: &mut LuaVM) {
    vm.register_native("print", lua_print);
    vm.register_native("type", lua_type);
    vm.register_native("tostring", lua_tostring);
    vm.register_native("tonumber", lua_tonumber);
    vm.register_native("ipairs", lua_ipairs);
    vm.register_native("pairs", lua_pairs);
    vm.register_native("next", lua_next);
    vm.register_native("select", lua_select);
    vm.register_native("unpack", lua_unpack);
    vm.register_native("rawget", lua_rawget);
    vm.register_native("rawset", lua_rawset);
    vm.register_native("rawequal", lua_rawequal);
    vm.register_native("setmetatable", lua_setmetatable);
    vm.register_native("getmetatable", lua_getmetatable);
    vm.register_native("assert", lua_assert);
    vm.register_native("error", lua_error);
    vm.register_native("pcall", lua_pcall);
    vm.register_native("xpcall", lua_xpcall);
    vm.register_native("loadstring", lua_loadstring);
    vm.register_native("collectgarbage", lua_collectgarbage);
    vm.register_native("setfenv", lua_setfenv);
    vm.register_native("getfenv", lua_getfenv);
    let globals = vm.globals();
    globals
        .borrow_mut()
        .set_str("_G", LuaValue::Table(vm.globals()));
    vm.set_global("_VERSION", LuaValue::from_string("Lua 5.1"));
}

fn lua_print(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    let mut out = String::new();
    for i in 1..=n {
        if i > 1 {
            out.push('\t');
        }
        let v = vm.arg(i);
        let s = vm.tostring_value(&v)?;
        out.push_str(&s);
    }
    println!("{}", out);
    Ok(0)
}

fn lua_type(vm: &mut LuaVM) -> LuaResult<usize> {
    if vm.arg_count() == 0 {
        return Err(vm.arg_error(1, "value expected"));
    }
    let name = vm.arg(1).type_name();
    vm.push(LuaValue::from_string(name))?;
    Ok(1)
}

fn lua_tostring(vm: &mut LuaVM) -> LuaResult<usize> {
    if vm.arg_count() == 0 {
        return Err(vm.arg_error(1, "value expected"));
    }
    let v = vm.arg(1);
    let s = vm.tostring_value(&v)?;
    vm.push(LuaValue::from_string(s))?;
    Ok(1)
}

fn lua_tonumber(vm: &mut LuaVM) -> LuaResult<usize> {
    let base = vm.opt_number(2, 10.0)? as u32;
    let result = if base == 10 {
        vm.arg(1).coerce_number().map(LuaValue::Number)
    } else {
        if !(2..=36).contains(&base) {
            return Err(vm.arg_error(2, "base out of range"));
        }
        let s = vm.check_str(1)?;
        i64::from_str_radix(s.trim(), base)
            .ok()
            .map(|n| LuaValue::Number(n as f64))
    };
    vm.push(result.unwrap_or(LuaValue::Nil))?;
    Ok(1)
}

fn ipairs_iterator(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let i = vm.check_number(2)? as usize + 1;
    let v = t.borrow().get_int(i);
    if v.is_nil() {
        vm.push(LuaValue::Nil)?;
        Ok(1)
    } else {
        vm.push(LuaValue::Number(i as f64))?;
        vm.push(v)?;
        Ok(2)
    }
}

fn lua_ipairs(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    vm.push(LuaValue::native("ipairs iterator", ipairs_iterator))?;
    vm.push(LuaValue::Table(t))?;
    vm.push(LuaValue::Number(0.0))?;
    Ok(3)
}

fn lua_pairs(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    vm.push(LuaValue::native("next", lua_next))?;
    vm.push(LuaValue::Table(t))?;
    vm.push(LuaValue::Nil)?;
    Ok(3)
}

fn lua_next(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let key = vm.arg(2);
    let step = t.borrow().next(&key).map_err(|m| vm.rt_error(m))?;
    match step {
        Some((k, v)) => {
            vm.push(k)?;
            vm.push(v)?;
            Ok(2)
        }
        None => {
            vm.push(LuaValue::Nil)?;
            Ok(1)
        }
    }
}

fn lua_select(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    if vm.arg(1).as_str() == Some("#") {
        vm.push(LuaValue::Number((n as f64) - 1.0))?;
        return Ok(1);
    }
    let i = vm.check_integer(1)?;
    let idx = if i < 0 {
        let idx = n as i64 + i;
        if idx < 1 {
            return Err(vm.arg_error(1, "index out of range"));
        }
        idx
    } else if i == 0 {
        return Err(vm.arg_error(1, "index out of range"));
    } else {
        i
    };
    let mut count = 0;
    for j in (idx as usize + 1)..=n {
        let v = vm.arg(j);
        vm.push(v)?;
        count += 1;
    }
    Ok(count)
}

fn lua_unpack(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let i = vm.opt_number(2, 1.0)? as i64;
    let j = if vm.arg(3).is_nil() {
        t.borrow().len() as i64
    } else {
        vm.check_number(3)? as i64
    };
    if j - i >= 1_000_000 {
        return Err(vm.rt_error("too many results to unpack"));
    }
    let mut count = 0;
    for k in i..=j {
        let v = t.borrow().get(&LuaValue::Number(k as f64));
        vm.push(v)?;
        count += 1;
    }
    Ok(count)
}

fn lua_rawget(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let k = vm.arg(2);
    let v = t.borrow().get(&k);
    vm.push(v)?;
    Ok(1)
}

fn lua_rawset(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let k = vm.arg(2);
    let v = vm.arg(3);
    t.borrow_mut().set(k, v).map_err(|m| vm.rt_error(m))?;
    vm.push(LuaValue::Table(t))?;
    Ok(1)
}

fn lua_rawequal(vm: &mut LuaVM) -> LuaResult<usize> {
    let eq = vm.arg(1) == vm.arg(2);
    vm.push(LuaValue::Boolean(eq))?;
    Ok(1)
}

fn lua_setmetatable(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let mt = match vm.arg(2) {
        LuaValue::Nil => None,
        LuaValue::Table(m) => Some(m),
        _ => return Err(vm.arg_error(2, "nil or table expected")),
    };
    let protected = t
        .borrow()
        .metatable()
        .map(|cur| !cur.borrow().get_str("__metatable").is_nil())
        .unwrap_or(false);
    if protected {
        return Err(vm.rt_error("cannot change a protected metatable"));
    }
    t.borrow_mut().set_metatable(mt);
    vm.push(LuaValue::Table(t))?;
    Ok(1)
}

fn lua_getmetatable(vm: &mut LuaVM) -> LuaResult<usize> {
    let v = vm.arg(1);
    match vm.metatable_of(&v) {
        Some(mt) => {
            let guard = mt.borrow().get_str("__metatable");
            if guard.is_nil() {
                vm.push(LuaValue::Table(mt))?;
            } else {
                vm.push(guard)?;
            }
        }
        None => vm.push(LuaValue::Nil)?,
    }
    Ok(1)
}

fn lua_assert(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    if n == 0 {
        return Err(vm.arg_error(1, "value expected"));
    }
    if vm.arg(1).is_truthy() {
        for i in 1..=n {
            let v = vm.arg(i);
            vm.push(v)?;
        }
        return Ok(n);
    }
    let msg = vm.arg(2);
    if msg.is_nil() {
        Err(vm.rt_error("assertion failed!"))
    } else {
        Err(LuaError::Runtime(msg))
    }
}

fn lua_error(vm: &mut LuaVM) -> LuaResult<usize> {
    let v = vm.arg(1);
    let level = vm.opt_number(2, 1.0)? as i64;
    let value = match (&v, level) {
        (LuaValue::String(s), l) if l > 0 => {
            LuaValue::from_string(format!("{}{}", vm.where_prefix(), s))
        }
        _ => v,
    };
    Err(LuaError::Runtime(value))
}

fn lua_pcall(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    if n == 0 {
        return Err(vm.arg_error(1, "value expected"));
    }
    let f = vm.arg(1);
    let args: Vec<LuaValue> = (2..=n).map(|i| vm.arg(i)).collect();
    match vm.pcall_value(&f, &args) {
        Ok(results) => {
            vm.push(LuaValue::Boolean(true))?;
            let count = results.len();
            for r in results {
                vm.push(r)?;
            }
            Ok(1 + count)
        }
        Err(e) => {
            vm.push(LuaValue::Boolean(false))?;
            vm.push(e)?;
            Ok(2)
        }
    }
}

fn lua_xpcall(vm: &mut LuaVM) -> LuaResult<usize> {
    let f = vm.arg(1);
    let handler = vm.arg(2);
    match vm.pcall_value(&f, &[]) {
        Ok(results) => {
            vm.push(LuaValue::Boolean(true))?;
            let count = results.len();
            for r in results {
                vm.push(r)?;
            }
            Ok(1 + count)
        }
        Err(e) => {
            let handled = match vm.pcall_value(&handler, &[e]) {
                Ok(rs) => rs.into_iter().next().unwrap_or(LuaValue::Nil),
                Err(e2) => e2,
            };
            vm.push(LuaValue::Boolean(false))?;
            vm.push(handled)?;
            Ok(2)
        }
    }
}

fn lua_loadstring(vm: &mut LuaVM) -> LuaResult<usize> {
    let s = vm.check_str(1)?;
    let name = vm.opt_str(2, "loadstring")?;
    match vm.load(s.as_bytes(), &name) {
        Ok(f) => {
            vm.push(f)?;
            Ok(1)
        }
        Err(e) => {
            vm.push(LuaValue::Nil)?;
            vm.push(e.value())?;
            Ok(2)
        }
    }
}

fn lua_collectgarbage(vm: &mut LuaVM) -> LuaResult<usize> {
    // reference counting collects as it goes; report zero usage
    let opt = vm.opt_str(1, "collect")?;
    let _ = opt;
    vm.push(LuaValue::Number(0.0))?;
    Ok(1)
}

/// Closure named by a setfenv/getfenv first argument: either a function
/// value or a stack level counting out from the caller.
fn target_closure(vm: &mut LuaVM, i: usize) -> LuaResult<Rc<LuaClosure>> {
    match vm.arg(i) {
        LuaValue::Function(LuaFunction::Closure(c)) => Ok(c),
        LuaValue::Function(LuaFunction::Native(_)) => {
            Err(vm.rt_error("cannot change environment of the given object"))
        }
        LuaValue::Number(n) => {
            let level = n as usize;
            if level == 0 || level > vm.exec.frames.len() {
                return Err(vm.arg_error(i, "invalid level"));
            }
            let frame = &vm.exec.frames[vm.exec.frames.len() - level];
            Ok(frame.closure.clone())
        }
        _ => Err(vm.arg_error(i, "function expected")),
    }
}

fn lua_setfenv(vm: &mut LuaVM) -> LuaResult<usize> {
    let c = target_closure(vm, 1)?;
    let t = vm.check_table(2)?;
    *c.env.borrow_mut() = t;
    vm.push(LuaValue::Function(LuaFunction::Closure(c)))?;
    Ok(1)
}

fn lua_getfenv(vm: &mut LuaVM) -> LuaResult<usize> {
    if vm.arg(1).is_nil() {
        // default level 1: the function that called getfenv
        let env = match vm.exec.frames.last() {
            Some(f) => f.closure.env.borrow().clone(),
            None => vm.globals(),
        };
        vm.push(LuaValue::Table(env))?;
        return Ok(1);
    }
    let c = target_closure(vm, 1)?;
    let env = c.env.borrow().clone();
    vm.push(LuaValue::Table(env))?;
    Ok(1)
}
