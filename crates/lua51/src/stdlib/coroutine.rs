//! The coroutine library. Resume/yield plumbing lives in the VM; this
//! module only shapes the Lua-visible surface.

use std::cell::RefCell;
use std::rc::Rc;

use crate::lua_value::{LuaFunction, LuaTable, LuaThread, LuaValue, NativeFunction};
use crate::lua_vm::{LuaError, LuaResult, LuaVM, Resume};
use crate::stdlib::set_native;

pub fn open(vm: &mut LuaVM) {
    let mut t = LuaTable::new();
    set_native(&mut t, "create", lua_create);
    set_native(&mut t, "resume", lua_resume);
    set_native(&mut t, "yield", lua_yield);
    set_native(&mut t, "status", lua_status);
    set_native(&mut t, "wrap", lua_wrap);
    set_native(&mut t, "running", lua_running);
    vm.set_global("coroutine", LuaValue::from_table(t));
}

fn check_body(vm: &mut LuaVM, i: usize) -> LuaResult<LuaValue> {
    match vm.arg(i) {
        v @ LuaValue::Function(LuaFunction::Closure(_)) => Ok(v),
        _ => Err(vm.arg_error(i, "Lua function expected")),
    }
}

fn lua_create(vm: &mut LuaVM) -> LuaResult<usize> {
    let body = check_body(vm, 1)?;
    let thread = Rc::new(RefCell::new(LuaThread::new(body)));
    vm.push(LuaValue::Thread(thread))?;
    Ok(1)
}

fn lua_resume(vm: &mut LuaVM) -> LuaResult<usize> {
    let co = vm.check_thread(1)?;
    let n = vm.arg_count();
    let args: Vec<LuaValue> = (2..=n).map(|i| vm.arg(i)).collect();
    match vm.resume(&co, args) {
        Resume::Return(values) | Resume::Yield(values) => {
            vm.push(LuaValue::Boolean(true))?;
            let count = values.len();
            for v in values {
                vm.push(v)?;
            }
            Ok(1 + count)
        }
        Resume::Error(e) => {
            vm.push(LuaValue::Boolean(false))?;
            vm.push(e)?;
            Ok(2)
        }
    }
}

fn lua_yield(vm: &mut LuaVM) -> LuaResult<usize> {
    let n = vm.arg_count();
    let values: Vec<LuaValue> = (1..=n).map(|i| vm.arg(i)).collect();
    // the dispatch loop suspends (or rejects) once this native returns
    vm.yield_values(values);
    Ok(0)
}

fn lua_status(vm: &mut LuaVM) -> LuaResult<usize> {
    let co = vm.check_thread(1)?;
    let status = co.borrow().status;
    vm.push(LuaValue::from_string(status.as_str()))?;
    Ok(1)
}

fn lua_running(vm: &mut LuaVM) -> LuaResult<usize> {
    match vm.current_thread() {
        Some(t) => vm.push(LuaValue::Thread(t))?,
        None => vm.push(LuaValue::Nil)?,
    }
    Ok(1)
}

fn lua_wrap(vm: &mut LuaVM) -> LuaResult<usize> {
    let body = check_body(vm, 1)?;
    let thread = Rc::new(RefCell::new(LuaThread::new(body)));
    let callback = Rc::new(move |vm: &mut LuaVM| -> LuaResult<usize> {
        let n = vm.arg_count();
        let args: Vec<LuaValue> = (1..=n).map(|i| vm.arg(i)).collect();
        match vm.resume(&thread, args) {
            Resume::Return(values) | Resume::Yield(values) => {
                let count = values.len();
                for v in values {
                    vm.push(v)?;
                }
                Ok(count)
            }
            Resume::Error(e) => Err(LuaError::Runtime(e)),
        }
    });
    let f = NativeFunction::from_callback("wrapped coroutine", callback);
    vm.push(LuaValue::Function(LuaFunction::Native(f)))?;
    Ok(1)
}
