//! The table library.

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};
use crate::stdlib::set_native;

pub fn open(vm: &mut LuaVM) {
    let mut t = LuaTable::new();
    set_native(&mut t, "insert", lua_insert);
    set_native(&mut t, "remove", lua_remove);
    set_native(&mut t, "concat", lua_concat);
    set_native(&mut t, "getn", lua_getn);
    vm.set_global("table", LuaValue::from_table(t));
}

fn lua_insert(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let n = t.borrow().len();
    match vm.arg_count() {
        2 => {
            let v = vm.arg(2);
            t.borrow_mut().set_int(n + 1, v);
        }
        3 => {
            let pos = vm.check_number(2)? as i64;
            if pos < 1 || pos as usize > n + 1 {
                return Err(vm.arg_error(2, "position out of bounds"));
            }
            let pos = pos as usize;
            let v = vm.arg(3);
            let mut tb = t.borrow_mut();
            for i in (pos..=n).rev() {
                let moved = tb.get_int(i);
                tb.set_int(i + 1, moved);
            }
            tb.set_int(pos, v);
        }
        _ => return Err(vm.rt_error("wrong number of arguments to 'insert'")),
    }
    Ok(0)
}

fn lua_remove(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let n = t.borrow().len();
    let pos = vm.opt_number(2, n as f64)? as i64;
    if n == 0 && vm.arg(2).is_nil() {
        vm.push(LuaValue::Nil)?;
        return Ok(1);
    }
    if pos < 1 || pos as usize > n {
        return Err(vm.arg_error(2, "position out of bounds"));
    }
    let pos = pos as usize;
    let removed = {
        let mut tb = t.borrow_mut();
        let removed = tb.get_int(pos);
        for i in pos..n {
            let moved = tb.get_int(i + 1);
            tb.set_int(i, moved);
        }
        tb.set_int(n, LuaValue::Nil);
        removed
    };
    vm.push(removed)?;
    Ok(1)
}

fn lua_concat(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let sep = vm.opt_str(2, "")?;
    let i = vm.opt_number(3, 1.0)? as i64;
    let j = if vm.arg(4).is_nil() {
        t.borrow().len() as i64
    } else {
        vm.check_number(4)? as i64
    };
    let mut out = String::new();
    for k in i..=j {
        let v = if k >= 1 {
            t.borrow().get_int(k as usize)
        } else {
            t.borrow().get(&LuaValue::Number(k as f64))
        };
        let piece = match &v {
            LuaValue::String(s) => s.to_string(),
            LuaValue::Number(n) => crate::lua_value::number_to_string(*n),
            _ => {
                return Err(vm.rt_error(format!(
                    "invalid value (at index {}) in table for 'concat'",
                    k
                )))
            }
        };
        if k > i {
            out.push_str(&sep);
        }
        out.push_str(&piece);
    }
    vm.push(LuaValue::from_string(out))?;
    Ok(1)
}

fn lua_getn(vm: &mut LuaVM) -> LuaResult<usize> {
    let t = vm.check_table(1)?;
    let n = t.borrow().len();
    vm.push(LuaValue::Number(n as f64))?;
    Ok(1)
}
