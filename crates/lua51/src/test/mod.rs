//! Script-driven engine tests. Most cases compile and run a Lua snippet
//! that asserts its own results; the helpers only surface failures.

mod test_basic;
mod test_chunk;
mod test_closures;
mod test_control_flow;
mod test_coroutine;
mod test_errors;
mod test_hooks;
mod test_metamethods;
mod test_operators;
mod test_stdlib;
mod test_table;

use crate::lib_registry::open_stdlib;
use crate::lua_value::LuaValue;
use crate::lua_vm::LuaVM;

pub(crate) fn new_vm() -> LuaVM {
    let mut vm = LuaVM::new();
    open_stdlib(&mut vm);
    vm
}

pub(crate) fn eval(script: &str) -> Vec<LuaValue> {
    let mut vm = new_vm();
    match vm.execute_named(script, "test") {
        Ok(values) => values,
        Err(e) => panic!("script failed: {}", e.message()),
    }
}

pub(crate) fn run(script: &str) {
    eval(script);
}

/// Run a script expected to fail outside any pcall; returns the message.
pub(crate) fn fails(script: &str) -> String {
    let mut vm = new_vm();
    match vm.execute_named(script, "test") {
        Ok(_) => panic!("script unexpectedly succeeded"),
        Err(e) => e.message(),
    }
}
